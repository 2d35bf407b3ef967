//! # Differentials
//!
//! Structural comparison of two capability maps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::capability::Capability;
use crate::rsop::{CapabilityMap, PathGrants};

/// The difference between a "before" and an "after" capability map.
///
/// An empty side is always `None`, never `Some` of an empty map, so
/// `Differential::default()` is exactly "no change".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Differential {
    /// Grants present after but not before.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added: Option<CapabilityMap>,

    /// Grants present before but not after.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<CapabilityMap>,
}

/// Change metrics for a [`Differential`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffMetrics {
    /// Total policy attributions added or removed.
    ///
    /// A capability granted by three policies counts as three changes.
    pub capability_changes: usize,
}

/// Whether a row of a differential was added or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Granted after but not before.
    Added,
    /// Granted before but not after.
    Removed,
}

/// One capability change, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry<'a> {
    /// Path of the change.
    pub path: &'a str,
    /// Direction of the change.
    pub change: ChangeKind,
    /// Capability that changed.
    pub capability: Capability,
    /// Policies attributed to the grant.
    pub policies: &'a [String],
}

impl Differential {
    /// Create a differential, normalizing empty maps to `None`.
    pub fn new(added: CapabilityMap, removed: CapabilityMap) -> Self {
        Self {
            added: non_empty(added),
            removed: non_empty(removed),
        }
    }

    /// Differential for an identity that lost every grant it had.
    pub fn deleted(before: CapabilityMap) -> Self {
        Self::new(CapabilityMap::new(), before)
    }

    /// Whether there are any effective changes.
    pub fn is_empty(&self) -> bool {
        self.added.is_none() && self.removed.is_none()
    }

    /// Whether an optional differential has any effective changes.
    ///
    /// A missing differential is vacuously empty.
    pub fn is_none_or_empty(diff: Option<&Self>) -> bool {
        diff.map_or(true, Self::is_empty)
    }

    /// Changeset metrics like the total count of changes.
    ///
    /// # Example
    ///
    /// ```
    /// use rsop_policy::{Capability, CapabilityMap, Differential};
    ///
    /// let mut added = CapabilityMap::new();
    /// added.grant("p1", Capability::Read, "polA");
    /// added.grant("p1", Capability::Read, "polB");
    /// let mut removed = CapabilityMap::new();
    /// removed.grant("p2", Capability::Update, "polC");
    ///
    /// let diff = Differential::new(added, removed);
    /// assert_eq!(diff.metrics().capability_changes, 3);
    /// ```
    pub fn metrics(&self) -> DiffMetrics {
        let count = |side: &Option<CapabilityMap>| side.as_ref().map_or(0, CapabilityMap::attribution_count);
        DiffMetrics {
            capability_changes: count(&self.added) + count(&self.removed),
        }
    }

    /// Every path touched by the differential, in lexical order.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths = BTreeSet::new();
        for side in [&self.added, &self.removed].into_iter().flatten() {
            paths.extend(side.paths());
        }
        paths.into_iter().collect()
    }

    /// Every change in display order.
    ///
    /// Paths ascend lexically. Within a path, added entries come before
    /// removed ones and capabilities follow their display order.
    pub fn entries(&self) -> Vec<DiffEntry<'_>> {
        let mut entries = Vec::new();
        for path in self.paths() {
            for (change, side) in [(ChangeKind::Added, &self.added), (ChangeKind::Removed, &self.removed)] {
                let Some(grants) = side.as_ref().and_then(|m| m.get(path)) else {
                    continue;
                };
                for (capability, policies) in grants {
                    entries.push(DiffEntry {
                        path,
                        change,
                        capability: *capability,
                        policies,
                    });
                }
            }
        }
        entries
    }
}

impl CapabilityMap {
    /// Generate the differential from `self` (before) to `after`.
    ///
    /// An empty `after` is the deletion sentinel: the whole of `self` is
    /// reported as removed without comparing path by path.
    ///
    /// Comparison is presence-based on capability keys only. A capability
    /// that is still granted, but by a different policy, is unchanged.
    pub fn diff(&self, after: &CapabilityMap) -> Differential {
        if after.is_empty() {
            return Differential::deleted(self.clone());
        }

        Differential::new(missing_from(after, self), missing_from(self, after))
    }
}

/// Grants in `source` whose capability is absent from `other` on the same path.
fn missing_from(source: &CapabilityMap, other: &CapabilityMap) -> CapabilityMap {
    let mut missing = CapabilityMap::new();
    for (path, grants) in source {
        match other.get(path) {
            Some(other_grants) if !other_grants.is_empty() => {
                let delta: PathGrants = grants
                    .iter()
                    .filter(|(capability, _)| !other_grants.contains_key(capability))
                    .map(|(capability, policies)| (*capability, policies.clone()))
                    .collect();
                if !delta.is_empty() {
                    missing.insert(path.clone(), delta);
                }
            }
            _ => missing.insert(path.clone(), grants.clone()),
        }
    }
    missing
}

fn non_empty(map: CapabilityMap) -> Option<CapabilityMap> {
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{PathRule, Policy};
    use crate::rsop::Rsop;

    fn map(entries: &[(&str, Capability, &[&str])]) -> CapabilityMap {
        let mut map = CapabilityMap::new();
        for (path, capability, policies) in entries {
            for policy in *policies {
                map.grant(path, *capability, policy);
            }
        }
        map
    }

    fn sample() -> CapabilityMap {
        map(&[
            ("auth/token/lookup-self", Capability::Read, &["default"]),
            ("cubbyhole/*", Capability::Create, &["default"]),
            ("cubbyhole/*", Capability::Read, &["default", "extra"]),
            ("sys/renew", Capability::Update, &["default"]),
        ])
    }

    #[test]
    fn test_no_change() {
        let capmap = sample();
        assert_eq!(capmap.diff(&capmap), Differential::default());
        assert!(capmap.diff(&capmap).is_empty());
    }

    #[test]
    fn test_added() {
        let before = Rsop::new(vec![Policy::new(
            "before",
            vec![PathRule::new("modified", [Capability::Create])],
        )]);
        let after = Rsop::new(vec![Policy::new(
            "after",
            vec![
                PathRule::new("modified", [Capability::Create, Capability::Delete]),
                PathRule::new("new", [Capability::Sudo]),
            ],
        )]);

        let diff = before.capability_map().diff(&after.capability_map());
        assert_eq!(
            diff,
            Differential {
                added: Some(map(&[
                    ("modified", Capability::Delete, &["after"]),
                    ("new", Capability::Sudo, &["after"]),
                ])),
                removed: None,
            }
        );
    }

    #[test]
    fn test_removed() {
        let before = Rsop::new(vec![
            Policy::new(
                "before",
                vec![PathRule::new("modified", [Capability::Create, Capability::List])],
            ),
            Policy::new(
                "before2",
                vec![PathRule::new("removed", [Capability::Sudo, Capability::Subscribe])],
            ),
        ]);
        let after = Rsop::new(vec![Policy::new(
            "before",
            vec![PathRule::new("modified", [Capability::Create])],
        )]);

        let diff = before.capability_map().diff(&after.capability_map());
        assert_eq!(
            diff,
            Differential {
                added: None,
                removed: Some(map(&[
                    ("modified", Capability::List, &["before"]),
                    ("removed", Capability::Sudo, &["before2"]),
                    ("removed", Capability::Subscribe, &["before2"]),
                ])),
            }
        );
    }

    #[test]
    fn test_deletion_sentinel() {
        let before = sample();
        let diff = before.diff(&CapabilityMap::new());
        assert_eq!(diff.added, None);
        assert_eq!(diff.removed, Some(before));
    }

    #[test]
    fn test_empty_to_empty_is_no_change() {
        assert!(CapabilityMap::new().diff(&CapabilityMap::new()).is_empty());
    }

    #[test]
    fn test_from_nothing_is_all_added() {
        let after = sample();
        let diff = CapabilityMap::new().diff(&after);
        assert_eq!(diff.added, Some(after));
        assert_eq!(diff.removed, None);
    }

    #[test]
    fn test_disjoint_symmetry() {
        let a = map(&[("a/1", Capability::Read, &["x"]), ("a/2", Capability::List, &["y"])]);
        let b = map(&[("b/1", Capability::Update, &["z", "w"])]);
        let diff = a.diff(&b);
        assert_eq!(diff.added, Some(b));
        assert_eq!(diff.removed, Some(a));
    }

    #[test]
    fn test_regrant_by_other_policy_is_unchanged() {
        let before = map(&[("p", Capability::Read, &["old"])]);
        let after = map(&[("p", Capability::Read, &["new"])]);
        assert!(before.diff(&after).is_empty());
    }

    #[test]
    fn test_none_is_empty() {
        assert!(Differential::is_none_or_empty(None));
        assert!(Differential::is_none_or_empty(Some(&Differential::default())));
        let diff = Differential::deleted(sample());
        assert!(!Differential::is_none_or_empty(Some(&diff)));
    }

    #[test]
    fn test_new_normalizes_empty_sides() {
        let diff = Differential::new(CapabilityMap::new(), CapabilityMap::new());
        assert_eq!(diff, Differential::default());
        assert_eq!(serde_json::to_string(&diff).unwrap(), "{}");
    }

    #[test]
    fn test_metrics_count_attributions() {
        let diff = Differential::new(
            map(&[("p1", Capability::Read, &["polA", "polB"])]),
            map(&[("p2", Capability::Update, &["polC"])]),
        );
        assert_eq!(diff.metrics().capability_changes, 3);
        assert_eq!(Differential::default().metrics().capability_changes, 0);
    }

    #[test]
    fn test_entries_order() {
        let diff = Differential::new(
            map(&[
                ("b", Capability::Sudo, &["n"]),
                ("a", Capability::List, &["n"]),
                ("a", Capability::Create, &["n"]),
            ]),
            map(&[("a", Capability::Read, &["o"]), ("c", Capability::Deny, &["o"])]),
        );

        let rows: Vec<(&str, ChangeKind, Capability)> = diff
            .entries()
            .iter()
            .map(|e| (e.path, e.change, e.capability))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("a", ChangeKind::Added, Capability::Create),
                ("a", ChangeKind::Added, Capability::List),
                ("a", ChangeKind::Removed, Capability::Read),
                ("b", ChangeKind::Added, Capability::Sudo),
                ("c", ChangeKind::Removed, Capability::Deny),
            ]
        );
        assert_eq!(diff.paths(), vec!["a", "b", "c"]);
    }
}
