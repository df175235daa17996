//! Per-sequence rule selection
//!
//! Each operating sequence enables a subset of the hazard checks. Names that
//! the table does not know fall back to a permissive default where every
//! check is on; the caller is expected to warn about it.

use crate::domain::types::Role;
use rustc_hash::FxHashMap;

pub const STEELMAKING_SEQUENCE: &str = "Steelmaking Sequence";
pub const TANDEM_LIFT: &str = "Tandem Lift";
pub const BRICKLAYERS_LIFT: &str = "Bricklayers Lift";

/// Default forklift to operator separation (meters)
pub const DEFAULT_FORKLIFT_OPERATOR_M: f64 = 3.0;

/// Default crane to crane separation (meters)
pub const DEFAULT_CRANE_CRANE_M: f64 = 5.0;

/// Which ground roles a zone check applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleScope {
    Disabled,
    ForkliftOnly,
    Ground,
}

impl RoleScope {
    #[inline]
    pub fn applies_to(&self, role: Role) -> bool {
        match self {
            RoleScope::Disabled => false,
            RoleScope::ForkliftOnly => role == Role::Forklift,
            RoleScope::Ground => role.is_ground(),
        }
    }
}

/// Tunable proximity thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub forklift_operator_m: f64,
    pub crane_crane_m: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            forklift_operator_m: DEFAULT_FORKLIFT_OPERATOR_M,
            crane_crane_m: DEFAULT_CRANE_CRANE_M,
        }
    }
}

/// Checks enabled for one sequence. Proximity checks carry their threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceRules {
    pub geofence: RoleScope,
    pub crane_zone: RoleScope,
    pub crane_proximity: Option<f64>,
    pub forklift_operator: Option<f64>,
}

impl SequenceRules {
    /// Everything on for forklifts and operators, both proximity checks on
    pub fn permissive(thresholds: Thresholds) -> Self {
        Self {
            geofence: RoleScope::Ground,
            crane_zone: RoleScope::Ground,
            crane_proximity: Some(thresholds.crane_crane_m),
            forklift_operator: Some(thresholds.forklift_operator_m),
        }
    }
}

/// Rules resolved for a sequence name
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    pub rules: &'a SequenceRules,
    /// False when the name was unknown and the permissive default applies
    pub known: bool,
}

/// Static mapping from sequence name to enabled checks
#[derive(Debug, Clone)]
pub struct SequenceRuleTable {
    sequences: FxHashMap<String, SequenceRules>,
    fallback: SequenceRules,
    thresholds: Thresholds,
}

impl SequenceRuleTable {
    /// Build the canonical table for the given thresholds
    pub fn new(thresholds: Thresholds) -> Self {
        let mut sequences = FxHashMap::default();

        sequences.insert(STEELMAKING_SEQUENCE.to_string(), SequenceRules::permissive(thresholds));
        sequences.insert(
            TANDEM_LIFT.to_string(),
            SequenceRules {
                geofence: RoleScope::Ground,
                crane_zone: RoleScope::Disabled,
                crane_proximity: None,
                forklift_operator: None,
            },
        );
        sequences.insert(
            BRICKLAYERS_LIFT.to_string(),
            SequenceRules {
                geofence: RoleScope::ForkliftOnly,
                crane_zone: RoleScope::ForkliftOnly,
                crane_proximity: Some(thresholds.crane_crane_m),
                forklift_operator: None,
            },
        );

        Self { sequences, fallback: SequenceRules::permissive(thresholds), thresholds }
    }

    /// Resolve the rules for `sequence`, falling back to the permissive default
    pub fn resolve(&self, sequence: &str) -> Resolved<'_> {
        match self.sequences.get(sequence) {
            Some(rules) => Resolved { rules, known: true },
            None => Resolved { rules: &self.fallback, known: false },
        }
    }

    pub fn is_known(&self, sequence: &str) -> bool {
        self.sequences.contains_key(sequence)
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Known sequence names, sorted
    pub fn sequence_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sequences.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for SequenceRuleTable {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steelmaking_enables_everything() {
        let table = SequenceRuleTable::default();
        let resolved = table.resolve(STEELMAKING_SEQUENCE);
        assert!(resolved.known);
        assert!(resolved.rules.geofence.applies_to(Role::Operator));
        assert!(resolved.rules.crane_zone.applies_to(Role::Forklift));
        assert_eq!(resolved.rules.crane_proximity, Some(5.0));
        assert_eq!(resolved.rules.forklift_operator, Some(3.0));
    }

    #[test]
    fn test_tandem_lift_geofence_only() {
        let table = SequenceRuleTable::default();
        let rules = table.resolve(TANDEM_LIFT).rules;
        assert!(rules.geofence.applies_to(Role::Operator));
        assert!(rules.geofence.applies_to(Role::Forklift));
        assert!(!rules.crane_zone.applies_to(Role::Forklift));
        assert_eq!(rules.crane_proximity, None);
        assert_eq!(rules.forklift_operator, None);
    }

    #[test]
    fn test_bricklayers_lift_forklift_only() {
        let table = SequenceRuleTable::default();
        let rules = table.resolve(BRICKLAYERS_LIFT).rules;
        assert!(rules.geofence.applies_to(Role::Forklift));
        assert!(!rules.geofence.applies_to(Role::Operator));
        assert!(rules.crane_zone.applies_to(Role::Forklift));
        assert!(!rules.crane_zone.applies_to(Role::Operator));
        assert_eq!(rules.crane_proximity, Some(5.0));
        assert_eq!(rules.forklift_operator, None);
    }

    #[test]
    fn test_unknown_sequence_is_permissive() {
        let table = SequenceRuleTable::default();
        let resolved = table.resolve("Ladle Transfer");
        assert!(!resolved.known);
        assert_eq!(*resolved.rules, SequenceRules::permissive(Thresholds::default()));
        assert!(!table.is_known("Ladle Transfer"));
    }

    #[test]
    fn test_scope_never_covers_cranes_or_other() {
        for scope in [RoleScope::Disabled, RoleScope::ForkliftOnly, RoleScope::Ground] {
            assert!(!scope.applies_to(Role::Crane));
            assert!(!scope.applies_to(Role::Other));
        }
    }

    #[test]
    fn test_custom_thresholds_flow_into_rules() {
        let table =
            SequenceRuleTable::new(Thresholds { forklift_operator_m: 4.5, crane_crane_m: 8.0 });
        assert_eq!(table.resolve(STEELMAKING_SEQUENCE).rules.forklift_operator, Some(4.5));
        assert_eq!(table.resolve(BRICKLAYERS_LIFT).rules.crane_proximity, Some(8.0));
        assert_eq!(table.resolve("anything").rules.crane_proximity, Some(8.0));
        assert_eq!(table.thresholds().crane_crane_m, 8.0);
    }

    #[test]
    fn test_sequence_names_sorted() {
        let table = SequenceRuleTable::default();
        assert_eq!(table.sequence_names(), vec![BRICKLAYERS_LIFT, STEELMAKING_SEQUENCE, TANDEM_LIFT]);
    }
}
