//! End-to-end alarm behaviour through the public API

use yard_sentinel::domain::{AlarmKey, AlarmKind, Crane, Entity, InvalidRegion, Position, Region, Role, Snapshot};
use yard_sentinel::services::rules::STEELMAKING_SEQUENCE;
use yard_sentinel::services::{AlarmEngine, AlarmLedger, AlarmNotification};

fn ground(id: &str, role: Role, x: f64, y: f64) -> Entity {
    Entity::new(id, role, Position::new(x, y, 0.0), 0)
}

fn kinds(stream: &[AlarmNotification]) -> Vec<(String, AlarmKind, bool)> {
    stream.iter().map(|n| (n.key().entity.to_string(), n.key().kind, n.is_activation())).collect()
}

#[test]
fn test_square_geofence() {
    let square = Region::geofence([(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)]).unwrap();
    let engine = AlarmEngine::default();
    let mut ledger = AlarmLedger::new(Vec::new());

    let snapshot = Snapshot::new(STEELMAKING_SEQUENCE, 0)
        .with_geofence(square)
        .with_entity(ground("inside", Role::Operator, 5.0, 5.0))
        .with_entity(ground("outside", Role::Operator, 15.0, 15.0));
    engine.run_tick(&snapshot, &mut ledger);

    assert!(ledger.is_active(&AlarmKey::new("inside", AlarmKind::Geofence)));
    assert!(!ledger.is_active(&AlarmKey::new("outside", AlarmKind::Geofence)));
}

#[test]
fn test_crane_zone_radius_is_height() {
    let engine = AlarmEngine::default();
    let mut ledger = AlarmLedger::new(Vec::new());

    let snapshot = Snapshot::new(STEELMAKING_SEQUENCE, 0)
        .with_crane(Crane::new("C1", 0.0, 0.0, 3.0))
        .with_entity(ground("near", Role::Operator, 2.0, 0.0))
        .with_entity(ground("far", Role::Forklift, 4.0, 0.0));
    engine.run_tick(&snapshot, &mut ledger);

    assert!(ledger.is_active(&AlarmKey::new("near", AlarmKind::CraneZone)));
    assert!(!ledger.is_active(&AlarmKey::new("far", AlarmKind::CraneZone)));
}

#[test]
fn test_forklift_operator_activates_then_clears() {
    let engine = AlarmEngine::default();
    let mut ledger = AlarmLedger::new(Vec::new());

    let close = Snapshot::new(STEELMAKING_SEQUENCE, 0)
        .with_entity(ground("F1", Role::Forklift, 0.0, 0.0))
        .with_entity(ground("O1", Role::Operator, 2.0, 0.0));
    let apart = Snapshot::new(STEELMAKING_SEQUENCE, 100)
        .with_entity(ground("F1", Role::Forklift, 0.0, 0.0))
        .with_entity(ground("O1", Role::Operator, 4.0, 0.0));

    engine.run_tick(&close, &mut ledger);
    engine.run_tick(&close, &mut ledger);
    engine.run_tick(&apart, &mut ledger);

    assert_eq!(
        kinds(ledger.notifier()),
        vec![
            ("F1".to_string(), AlarmKind::ForkliftOperatorProximity, true),
            ("F1".to_string(), AlarmKind::ForkliftOperatorProximity, false),
        ]
    );
}

#[test]
fn test_crane_pair_triggers_and_clears_both() {
    let engine = AlarmEngine::default();
    let mut ledger = AlarmLedger::new(Vec::new());

    let close = Snapshot::new(STEELMAKING_SEQUENCE, 0)
        .with_crane(Crane::new("C1", 0.0, 0.0, 0.0))
        .with_crane(Crane::new("C2", 4.0, 0.0, 0.0));
    let apart = Snapshot::new(STEELMAKING_SEQUENCE, 100)
        .with_crane(Crane::new("C1", 0.0, 0.0, 0.0))
        .with_crane(Crane::new("C2", 6.0, 0.0, 0.0));

    let report = engine.run_tick(&close, &mut ledger);
    assert_eq!(report.activated, 2);
    assert!(ledger.is_active(&AlarmKey::new("C1", AlarmKind::CraneProximity)));
    assert!(ledger.is_active(&AlarmKey::new("C2", AlarmKind::CraneProximity)));

    let report = engine.run_tick(&apart, &mut ledger);
    assert_eq!(report.cleared, 2);
    assert!(ledger.is_empty());
}

#[test]
fn test_collinear_quadrilateral_rejected() {
    let result = Region::geofence([(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]);
    assert!(matches!(result, Err(InvalidRegion::Collinear(..))));
}

#[test]
fn test_edge_triggered_notification_stream() {
    let engine = AlarmEngine::default();
    let mut ledger = AlarmLedger::new(Vec::new());
    let square = Region::geofence([(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)]).unwrap();

    for (tick, inside) in [false, true, true, false, true].into_iter().enumerate() {
        let x = if inside { 5.0 } else { 20.0 };
        let snapshot = Snapshot::new(STEELMAKING_SEQUENCE, tick as u64 * 100)
            .with_geofence(square.clone())
            .with_entity(ground("O1", Role::Operator, x, 5.0));
        engine.run_tick(&snapshot, &mut ledger);
    }

    let stream: Vec<bool> = ledger.notifier().iter().map(|n| n.is_activation()).collect();
    assert_eq!(stream, vec![true, false, true]);
}

#[test]
fn test_double_trigger_is_idempotent() {
    let mut ledger = AlarmLedger::new(Vec::new());
    let key = AlarmKey::new("F1", AlarmKind::CraneZone);

    ledger.trigger(key.clone(), "inside", 0);
    ledger.trigger(key.clone(), "inside", 100);

    assert_eq!(ledger.notifier().len(), 1);
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.get(&key).unwrap().activated_at, 0);
}
