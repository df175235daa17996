//! Edge-triggered alarm ledger
//!
//! Holds the set of currently active alarms for one monitoring session,
//! keyed by (entity, alarm kind). Each key is a two-state machine:
//! - Inactive (no record) -> Active on `trigger`, notifying "activated" once
//! - Active -> Inactive on `clear`, notifying "cleared" once
//!
//! Repeated `trigger` on an active key and `clear` on an inactive key are
//! no-ops, so a persisting hazard produces exactly one notification.

use crate::domain::types::{AlarmKey, AlarmKind, AlarmRecord, EntityId};
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use tracing::debug;

/// Receiver of alarm transitions (persistence, egress, UI...)
///
/// Called synchronously from inside `trigger`/`clear`; any latency here
/// stalls the tick.
pub trait Notifier {
    fn on_alarm_activated(&mut self, entity: &EntityId, kind: AlarmKind, message: &str, timestamp_ms: u64);
    fn on_alarm_cleared(&mut self, entity: &EntityId, kind: AlarmKind);
}

impl<N: Notifier + ?Sized> Notifier for &mut N {
    fn on_alarm_activated(&mut self, entity: &EntityId, kind: AlarmKind, message: &str, timestamp_ms: u64) {
        (**self).on_alarm_activated(entity, kind, message, timestamp_ms);
    }

    fn on_alarm_cleared(&mut self, entity: &EntityId, kind: AlarmKind) {
        (**self).on_alarm_cleared(entity, kind);
    }
}

/// A recorded alarm transition
#[derive(Debug, Clone, PartialEq)]
pub enum AlarmNotification {
    Activated { key: AlarmKey, message: String, timestamp_ms: u64 },
    Cleared { key: AlarmKey },
}

impl AlarmNotification {
    pub fn key(&self) -> &AlarmKey {
        match self {
            AlarmNotification::Activated { key, .. } | AlarmNotification::Cleared { key } => key,
        }
    }

    pub fn is_activation(&self) -> bool {
        matches!(self, AlarmNotification::Activated { .. })
    }
}

/// Collects transitions in order
impl Notifier for Vec<AlarmNotification> {
    fn on_alarm_activated(&mut self, entity: &EntityId, kind: AlarmKind, message: &str, timestamp_ms: u64) {
        self.push(AlarmNotification::Activated {
            key: AlarmKey::new(entity.clone(), kind),
            message: message.to_string(),
            timestamp_ms,
        });
    }

    fn on_alarm_cleared(&mut self, entity: &EntityId, kind: AlarmKind) {
        self.push(AlarmNotification::Cleared { key: AlarmKey::new(entity.clone(), kind) });
    }
}

/// Active alarms for one monitoring session
pub struct AlarmLedger<N> {
    active: FxHashMap<AlarmKey, AlarmRecord>,
    notifier: N,
}

impl<N: Notifier> AlarmLedger<N> {
    pub fn new(notifier: N) -> Self {
        Self { active: FxHashMap::default(), notifier }
    }

    /// Raise the alarm for `key`. Returns true on a rising edge.
    pub fn trigger(&mut self, key: AlarmKey, message: impl Into<String>, now_ms: u64) -> bool {
        match self.active.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let record = AlarmRecord { message: message.into(), activated_at: now_ms };
                let key = slot.key();
                debug!(entity = %key.entity, kind = %key.kind, "ledger_activated");
                self.notifier.on_alarm_activated(&key.entity, key.kind, &record.message, now_ms);
                slot.insert(record);
                true
            }
        }
    }

    /// Like `trigger`, but the message is only built on a rising edge.
    pub fn trigger_with<F>(&mut self, key: AlarmKey, message: F, now_ms: u64) -> bool
    where
        F: FnOnce() -> String,
    {
        if self.active.contains_key(&key) {
            return false;
        }
        self.trigger(key, message(), now_ms)
    }

    /// Drop the alarm for `key`. Returns true on a falling edge.
    pub fn clear(&mut self, key: &AlarmKey) -> bool {
        match self.active.remove(key) {
            Some(_) => {
                debug!(entity = %key.entity, kind = %key.kind, "ledger_cleared");
                self.notifier.on_alarm_cleared(&key.entity, key.kind);
                true
            }
            None => false,
        }
    }

    /// Drive `key` from one observation of its condition.
    ///
    /// The message is only built on a rising edge.
    pub fn observe<F>(&mut self, key: AlarmKey, condition: bool, message: F, now_ms: u64) -> bool
    where
        F: FnOnce() -> String,
    {
        if condition {
            self.trigger_with(key, message, now_ms)
        } else {
            self.clear(&key)
        }
    }

    pub fn get(&self, key: &AlarmKey) -> Option<&AlarmRecord> {
        self.active.get(key)
    }

    pub fn is_active(&self, key: &AlarmKey) -> bool {
        self.active.contains_key(key)
    }

    /// Number of active alarms
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Active alarms, sorted by key for stable output
    pub fn active(&self) -> Vec<(&AlarmKey, &AlarmRecord)> {
        let mut alarms: Vec<_> = self.active.iter().collect();
        alarms.sort_unstable_by(|a, b| a.0.cmp(b.0));
        alarms
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }
}
