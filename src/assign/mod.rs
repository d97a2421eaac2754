//! Variant assignment for visitor sessions.
//!
//! Resolution order for a (session, component) pair: explicit per-component
//! override, explicit global override, existing session assignment, fresh
//! uniform random draw. Assignments are written into the session's map and
//! are stable for the session's lifetime unless an override forces them.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::storage::{VariantLabel, VisitorSession};

/// Query-parameter prefix for per-component overrides
/// (`variant_<componentId>=a|b`).
const COMPONENT_OVERRIDE_PREFIX: &str = "variant_";
/// Query-parameter name for the global override (`variant=a|b`).
const GLOBAL_OVERRIDE_PARAM: &str = "variant";

/// Explicit variant overrides parsed from the request query string.
#[derive(Debug, Clone, Default)]
pub struct AssignmentOverrides {
    global: Option<VariantLabel>,
    per_component: HashMap<String, VariantLabel>,
}

impl AssignmentOverrides {
    /// Parse overrides from query parameters.
    ///
    /// Unparseable values are ignored rather than rejected; a preview link
    /// with a typo falls back to normal assignment.
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        let mut overrides = Self::default();

        for (key, value) in params {
            let Ok(label) = value.parse::<VariantLabel>() else {
                continue;
            };
            if key == GLOBAL_OVERRIDE_PARAM {
                overrides.global = Some(label);
            } else if let Some(component_id) = key.strip_prefix(COMPONENT_OVERRIDE_PREFIX) {
                if !component_id.is_empty() {
                    overrides.per_component.insert(component_id.to_string(), label);
                }
            }
        }

        overrides
    }

    /// The override for a component: per-component beats global.
    pub fn for_component(&self, component_id: &str) -> Option<VariantLabel> {
        self.per_component
            .get(component_id)
            .copied()
            .or(self.global)
    }

    /// Whether any override is present
    pub fn is_empty(&self) -> bool {
        self.global.is_none() && self.per_component.is_empty()
    }
}

/// How an assignment was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentSource {
    /// Forced by a URL override.
    Override,
    /// Reused from the session's existing map (session affinity).
    Existing,
    /// Fresh uniform random draw.
    Fresh,
}

/// A resolved (session, component) assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub label: VariantLabel,
    pub source: AssignmentSource,
}

/// Stateless variant assigner.
#[derive(Debug, Clone, Copy, Default)]
pub struct VariantAssigner;

impl VariantAssigner {
    /// Resolve the variant for a component and record it in the session.
    ///
    /// The caller persists the mutated session; two near-simultaneous first
    /// requests may race, which is accepted - whichever cookie wins, later
    /// requests converge on it.
    pub fn assign<R: Rng>(
        &self,
        session: &mut VisitorSession,
        component_id: &str,
        overrides: &AssignmentOverrides,
        rng: &mut R,
    ) -> Assignment {
        if let Some(label) = overrides.for_component(component_id) {
            session.assignments.insert(component_id.to_string(), label);
            return Assignment {
                label,
                source: AssignmentSource::Override,
            };
        }

        if let Some(label) = session.assignment_for(component_id) {
            return Assignment {
                label,
                source: AssignmentSource::Existing,
            };
        }

        // Uniform 50/50, no ramping or stratification.
        let label = if rng.gen::<f64>() < 0.5 {
            VariantLabel::A
        } else {
            VariantLabel::B
        };
        session.assignments.insert(component_id.to_string(), label);

        Assignment {
            label,
            source: AssignmentSource::Fresh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn repeated_assignment_is_stable() {
        let assigner = VariantAssigner;
        let mut session = VisitorSession::new("lp-1");
        let overrides = AssignmentOverrides::default();
        let mut rng = StdRng::seed_from_u64(7);

        let first = assigner.assign(&mut session, "c1", &overrides, &mut rng);
        assert_eq!(first.source, AssignmentSource::Fresh);

        for _ in 0..10 {
            let again = assigner.assign(&mut session, "c1", &overrides, &mut rng);
            assert_eq!(again.label, first.label);
            assert_eq!(again.source, AssignmentSource::Existing);
        }
    }

    #[test]
    fn per_component_override_beats_global() {
        let assigner = VariantAssigner;
        let mut session = VisitorSession::new("lp-1");
        let overrides = AssignmentOverrides::from_query(&query(&[
            ("variant", "a"),
            ("variant_c1", "b"),
        ]));
        let mut rng = StdRng::seed_from_u64(7);

        let c1 = assigner.assign(&mut session, "c1", &overrides, &mut rng);
        assert_eq!(c1.label, VariantLabel::B);
        assert_eq!(c1.source, AssignmentSource::Override);

        // Components without an explicit entry take the global override.
        let c2 = assigner.assign(&mut session, "c2", &overrides, &mut rng);
        assert_eq!(c2.label, VariantLabel::A);
        assert_eq!(c2.source, AssignmentSource::Override);
    }

    #[test]
    fn override_replaces_existing_assignment() {
        let assigner = VariantAssigner;
        let mut session = VisitorSession::new("lp-1");
        session.assignments.insert("c1".to_string(), VariantLabel::A);
        let overrides = AssignmentOverrides::from_query(&query(&[("variant_c1", "b")]));
        let mut rng = StdRng::seed_from_u64(7);

        let assignment = assigner.assign(&mut session, "c1", &overrides, &mut rng);
        assert_eq!(assignment.label, VariantLabel::B);
        assert_eq!(session.assignment_for("c1"), Some(VariantLabel::B));
    }

    #[test]
    fn malformed_override_values_are_ignored() {
        let overrides =
            AssignmentOverrides::from_query(&query(&[("variant", "c"), ("variant_c1", "x")]));
        assert!(overrides.is_empty());
    }

    #[test]
    fn fresh_draws_cover_both_variants() {
        let assigner = VariantAssigner;
        let overrides = AssignmentOverrides::default();
        let mut rng = StdRng::seed_from_u64(42);

        let mut seen_a = false;
        let mut seen_b = false;
        for i in 0..100 {
            let mut session = VisitorSession::new("lp-1");
            let assignment =
                assigner.assign(&mut session, &format!("c{}", i), &overrides, &mut rng);
            match assignment.label {
                VariantLabel::A => seen_a = true,
                VariantLabel::B => seen_b = true,
            }
        }
        assert!(seen_a && seen_b);
    }
}
