//! # Resultant Set of Policy
//!
//! Merges every policy bound to one identity into a single
//! path -> capability -> granting policies map.

use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

use crate::capability::Capability;
use crate::policy::Policy;

/// Capabilities granted on one path, each with the policies that grant it.
pub type PathGrants = BTreeMap<Capability, Vec<String>>;

/// A map of path -> capability -> names of the policies that grant it.
///
/// Paths iterate in lexical order and capabilities in display order, so two
/// maps built from the same input are identical, including serialized form.
///
/// Granting policy names are kept in accumulation order and are not
/// deduplicated: a policy granting the same capability twice shows up twice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityMap(BTreeMap<String, PathGrants>);

impl CapabilityMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Record that `policy` grants `capability` on `path`.
    pub fn grant(&mut self, path: &str, capability: Capability, policy: &str) {
        self.0
            .entry(path.to_string())
            .or_default()
            .entry(capability)
            .or_default()
            .push(policy.to_string());
    }

    /// Set every grant for a path, replacing what was there.
    pub fn insert(&mut self, path: impl Into<String>, grants: PathGrants) {
        self.0.insert(path.into(), grants);
    }

    /// Grants for a path, if any.
    pub fn get(&self, path: &str) -> Option<&PathGrants> {
        self.0.get(path)
    }

    /// Policies granting a capability on a path.
    pub fn granted_by(&self, path: &str, capability: Capability) -> Option<&[String]> {
        self.0
            .get(path)
            .and_then(|grants| grants.get(&capability))
            .map(Vec::as_slice)
    }

    /// Check if a path is present.
    pub fn contains_path(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    /// Paths in lexical order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterate over `(path, grants)` in lexical path order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, PathGrants> {
        self.0.iter()
    }

    /// Number of paths.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of policy attributions across every path and capability.
    pub fn attribution_count(&self) -> usize {
        self.0
            .values()
            .flat_map(|grants| grants.values())
            .map(Vec::len)
            .sum()
    }
}

impl<'a> IntoIterator for &'a CapabilityMap {
    type Item = (&'a String, &'a PathGrants);
    type IntoIter = btree_map::Iter<'a, String, PathGrants>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for CapabilityMap {
    type Item = (String, PathGrants);
    type IntoIter = btree_map::IntoIter<String, PathGrants>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(String, PathGrants)> for CapabilityMap {
    fn from_iter<T: IntoIterator<Item = (String, PathGrants)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Outcome of resolving an [`Rsop`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// The effective capability map, after deny collapse.
    pub capabilities: CapabilityMap,

    /// Grants discarded by deny collapse, keyed by the path that was denied.
    pub preempted: CapabilityMap,
}

/// Resultant Set of Policy: every policy bound to one identity.
///
/// Policies are sorted ascending by name on construction and the set is
/// immutable afterwards.
///
/// # Example
///
/// ```
/// use rsop_policy::{Capability, PathRule, Policy, Rsop};
///
/// let rsop = Rsop::new(vec![
///     Policy::new("reader", vec![PathRule::new("secret/*", [Capability::Read])]),
///     Policy::new("blocker", vec![PathRule::new("secret/*", [Capability::Deny])]),
/// ]);
///
/// let map = rsop.capability_map();
/// assert_eq!(map.granted_by("secret/*", Capability::Deny), Some(&["blocker".to_string()][..]));
/// assert_eq!(map.granted_by("secret/*", Capability::Read), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Rsop {
    policies: Vec<Policy>,
}

impl Rsop {
    /// Create a set from policies, sorting them by name.
    pub fn new(mut policies: Vec<Policy>) -> Self {
        policies.sort_by(|a, b| a.name().cmp(b.name()));
        Self { policies }
    }

    /// The policies in name order.
    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    /// Names of the policies in name order.
    pub fn policy_names(&self) -> Vec<&str> {
        self.policies.iter().map(Policy::name).collect()
    }

    /// Check if the set has no policies.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Build the effective capability map.
    pub fn capability_map(&self) -> CapabilityMap {
        self.resolve().capabilities
    }

    /// Build the effective capability map along with the grants deny
    /// preempted.
    ///
    /// Every capability of every rule appends its policy name to
    /// `map[path][capability]`. Then, on any path with more than one
    /// capability where one of them is deny, everything but deny is dropped.
    pub fn resolve(&self) -> Resolution {
        let mut capabilities = CapabilityMap::new();
        for policy in &self.policies {
            for rule in policy.rules() {
                for capability in &rule.capabilities {
                    capabilities.grant(&rule.path, *capability, policy.name());
                }
            }
        }

        let mut preempted = CapabilityMap::new();
        for (path, grants) in capabilities.0.iter_mut() {
            if grants.len() > 1 && grants.contains_key(&Capability::Deny) {
                let deniers = grants.remove(&Capability::Deny).unwrap_or_default();
                let discarded = std::mem::replace(grants, BTreeMap::from([(Capability::Deny, deniers)]));
                preempted.insert(path.clone(), discarded);
            }
        }

        Resolution {
            capabilities,
            preempted,
        }
    }
}
