//! Alarm evaluation for one snapshot
//!
//! `AlarmEngine::run_tick` resolves the rules for the active sequence, runs
//! the containment and proximity checks, and drives the ledger. It performs no
//! IO of its own; every side effect goes through the ledger's notifier.
//!
//! Conditions are aggregated before the ledger is touched: a forklift is in
//! alarm if it is close to any operator, a crane if it is close to any other
//! crane. Each key is touched at most once per tick.

use crate::domain::geometry::{Circle, Point};
use crate::domain::types::{AlarmKey, AlarmKind, Entity, EntityId, Position, Role, Snapshot};
use crate::services::ledger::{AlarmLedger, Notifier};
use crate::services::proximity::nearest_within;
use crate::services::rules::SequenceRuleTable;
use tracing::debug;


/// Outcome of one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Rising edges produced this tick
    pub activated: usize,
    /// Falling edges produced this tick
    pub cleared: usize,
    /// Entities and cranes skipped for lack of a usable position
    pub skipped: Vec<EntityId>,
    /// False when the sequence name was unknown and the permissive default applied
    pub known_sequence: bool,
}

impl TickReport {
    fn record(&mut self, condition: bool, transitioned: bool) {
        if transitioned {
            if condition {
                self.activated += 1;
            } else {
                self.cleared += 1;
            }
        }
    }
}

/// Stateless evaluator; alarm state lives in the caller's `AlarmLedger`
pub struct AlarmEngine {
    rules: SequenceRuleTable,
}

impl AlarmEngine {
    pub fn new(rules: SequenceRuleTable) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &SequenceRuleTable {
        &self.rules
    }

    /// Evaluate one snapshot and apply the resulting transitions to `ledger`.
    ///
    /// Ticks must be serialized: the ledger is mutated in place.
    ///
    /// An entity without a usable position is skipped, and it never clears
    /// another entity's alarm: a pairwise or crane-zone alarm with no partner
    /// in range is held while some partner of that kind was skipped.
    pub fn run_tick<N: Notifier>(
        &self,
        snapshot: &Snapshot,
        ledger: &mut AlarmLedger<N>,
    ) -> TickReport {
        let resolved = self.rules.resolve(&snapshot.sequence);
        let rules = resolved.rules;
        let now = snapshot.now_ms;
        let mut report = TickReport { known_sequence: resolved.known, ..Default::default() };

        // Ground entities with a usable position, in id order for a stable notification order
        let mut ground: Vec<(&Entity, Position)> = Vec::new();
        let mut operator_skipped = false;
        for entity in snapshot.entities.values().filter(|e| e.role.is_ground()) {
            match entity.position() {
                Ok(pos) => ground.push((entity, pos)),
                Err(e) => {
                    debug!(entity = %entity.id, error = %e, "entity_missing_position");
                    operator_skipped |= entity.role == Role::Operator;
                    report.skipped.push(entity.id.clone());
                }
            }
        }
        ground.sort_unstable_by(|a, b| a.0.id.cmp(&b.0.id));

        let mut cranes: Vec<(&EntityId, Position)> = Vec::with_capacity(snapshot.cranes.len());
        let mut crane_skipped = false;
        for crane in &snapshot.cranes {
            if crane.position.is_finite() {
                cranes.push((&crane.id, crane.position));
            } else {
                debug!(crane = %crane.id, "crane_missing_position");
                crane_skipped = true;
                report.skipped.push(crane.id.clone());
            }
        }
        report.skipped.sort_unstable();

        // Zone containment
        for &(entity, pos) in &ground {
            let point = Point::from(pos);

            let key = AlarmKey::new(entity.id.clone(), AlarmKind::Geofence);
            if rules.geofence.applies_to(entity.role) {
                let inside = snapshot.geofences.iter().any(|region| region.contains(point));
                let changed = ledger.observe(
                    key,
                    inside,
                    || format!("{} {} entered restricted zone", entity.role.label(), entity.id),
                    now,
                );
                report.record(inside, changed);
            } else {
                report.record(false, ledger.clear(&key));
            }

            let key = AlarmKey::new(entity.id.clone(), AlarmKind::CraneZone);
            if rules.crane_zone.applies_to(entity.role) {
                let crane = cranes
                    .iter()
                    .find(|(_, crane_pos)| Circle::crane_zone(*crane_pos).contains(point))
                    .map(|(id, _)| *id);
                match crane {
                    Some(crane_id) => {
                        let changed = ledger.trigger_with(
                            key,
                            || {
                                format!(
                                    "{} {} inside exclusion zone of crane {}",
                                    entity.role.label(),
                                    entity.id,
                                    crane_id
                                )
                            },
                            now,
                        );
                        report.record(true, changed);
                    }
                    None if crane_skipped => {}
                    None => report.record(false, ledger.clear(&key)),
                }
            } else {
                report.record(false, ledger.clear(&key));
            }
        }

        // Forklift to operator proximity, OR over all operators
        let forklifts = ground.iter().filter(|(e, _)| e.role == Role::Forklift);
        match rules.forklift_operator {
            Some(threshold) => {
                let operators: Vec<(&EntityId, Position)> = ground
                    .iter()
                    .filter(|(e, _)| e.role == Role::Operator)
                    .map(|(e, pos)| (&e.id, *pos))
                    .collect();

                for &(forklift, pos) in forklifts {
                    let key = AlarmKey::new(forklift.id.clone(), AlarmKind::ForkliftOperatorProximity);
                    match nearest_within(pos, operators.iter().copied(), threshold) {
                        Some((operator, d)) => {
                            let changed = ledger.trigger_with(
                                key,
                                || format!("Forklift {} within {:.1} m of operator {}", forklift.id, d, operator),
                                now,
                            );
                            report.record(true, changed);
                        }
                        None if operator_skipped => {}
                        None => report.record(false, ledger.clear(&key)),
                    }
                }
            }
            None => {
                for &(forklift, _) in forklifts {
                    let key = AlarmKey::new(forklift.id.clone(), AlarmKind::ForkliftOperatorProximity);
                    report.record(false, ledger.clear(&key));
                }
            }
        }

        // Crane to crane proximity, keyed by crane id, OR over all other cranes
        match rules.crane_proximity {
            Some(threshold) => {
                for (i, &(crane_id, pos)) in cranes.iter().enumerate() {
                    let others = cranes
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .map(|(_, &(id, other_pos))| (id, other_pos));
                    let key = AlarmKey::new(crane_id.clone(), AlarmKind::CraneProximity);
                    match nearest_within(pos, others, threshold) {
                        Some((other, d)) => {
                            let changed = ledger.trigger_with(
                                key,
                                || format!("Crane {} within {:.1} m of crane {}", crane_id, d, other),
                                now,
                            );
                            report.record(true, changed);
                        }
                        None if crane_skipped => {}
                        None => report.record(false, ledger.clear(&key)),
                    }
                }
            }
            None => {
                for &(crane_id, _) in &cranes {
                    let key = AlarmKey::new(crane_id.clone(), AlarmKind::CraneProximity);
                    report.record(false, ledger.clear(&key));
                }
            }
        }

        report
    }
}

impl Default for AlarmEngine {
    fn default() -> Self {
        Self::new(SequenceRuleTable::default())
    }
}
