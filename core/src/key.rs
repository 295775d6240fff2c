//! Query keys for cached reads.
//!
//! A [`QueryKey`] identifies one cached query result: the resource being read
//! plus every filter parameter that affects the result. Filters are stored in
//! a sorted map so the order in which a caller adds them never produces a
//! second cache entry for a logically identical query.
//!
//! The key is also the only input the remote client uses to build the request
//! (see [`QueryKey::query_pairs`]), so a filter cannot influence the response
//! without also being part of the key.

use crate::resource::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A single filter parameter value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Free text (search terms, slugs)
    Text(String),
    /// Integer parameter (page, limit, ids)
    Number(i64),
    /// Boolean switch
    Flag(bool),
    /// Unordered set of values (e.g. several statuses)
    Many(BTreeSet<String>),
}

impl FilterValue {
    /// Build a set-valued filter; duplicates and ordering are normalized away
    pub fn many<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Many(values.into_iter().map(Into::into).collect())
    }

    /// Whether the value places no constraint on the result
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Many(values) => values.is_empty(),
            Self::Number(_) | Self::Flag(_) => false,
        }
    }

    /// Render the value as it appears in a query string
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Number(n) => n.to_string(),
            Self::Flag(flag) => flag.to_string(),
            Self::Many(values) => values.iter().cloned().collect::<Vec<_>>().join(","),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<u32> for FilterValue {
    fn from(value: u32) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(values: Vec<String>) -> Self {
        Self::many(values)
    }
}

/// Normalized set of filter parameters
///
/// Parameters are kept sorted by name. Values that place no constraint on
/// the result (empty text, empty sets) are dropped, so `{search: ""}` and
/// `{}` share a cache entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filters(BTreeMap<String, FilterValue>);

impl Filters {
    /// Empty filter set
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Add (or replace) a filter parameter, builder style
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Add (or replace) a filter parameter
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FilterValue>) {
        let name = name.into();
        let value = value.into();
        if value.is_empty() {
            self.0.remove(&name);
        } else {
            self.0.insert(name, value);
        }
    }

    /// Remove a filter parameter
    pub fn remove(&mut self, name: &str) -> Option<FilterValue> {
        self.0.remove(name)
    }

    /// Look up a filter parameter
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FilterValue> {
        self.0.get(name)
    }

    /// Number of constraining parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no parameter constrains the query
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate parameters in normalized (name) order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl<K, V> FromIterator<(K, V)> for Filters
where
    K: Into<String>,
    V: Into<FilterValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut filters = Self::new();
        for (name, value) in iter {
            filters.insert(name, value);
        }
        filters
    }
}

/// Identity of one cached query result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey {
    resource: ResourceKind,
    filters: Filters,
}

impl QueryKey {
    /// Key for a filtered read of `resource`
    #[must_use]
    pub const fn new(resource: ResourceKind, filters: Filters) -> Self {
        Self { resource, filters }
    }

    /// Key for an unfiltered read of `resource`
    #[must_use]
    pub const fn all(resource: ResourceKind) -> Self {
        Self::new(resource, Filters::new())
    }

    /// Key for a single entity, addressed by an `id` filter
    #[must_use]
    pub fn entity(resource: ResourceKind, id: impl Into<String>) -> Self {
        Self::new(resource, Filters::new().with("id", id.into()))
    }

    /// The resource this key reads
    #[must_use]
    pub const fn resource(&self) -> ResourceKind {
        self.resource
    }

    /// The normalized filters of this key
    #[must_use]
    pub const fn filters(&self) -> &Filters {
        &self.filters
    }

    /// Query string pairs for the remote request, in normalized order
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.filters
            .iter()
            .map(|(name, value)| (name.to_string(), value.render()))
            .collect()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource.as_str())?;
        for (index, (name, value)) in self.filters.iter().enumerate() {
            let separator = if index == 0 { '?' } else { '&' };
            write!(f, "{separator}{name}={}", value.render())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(key: &QueryKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_filter_order_is_normalized() {
        let a = QueryKey::new(
            ResourceKind::Tickets,
            Filters::new().with("event", "expo-2025").with("active", true),
        );
        let b = QueryKey::new(
            ResourceKind::Tickets,
            Filters::new().with("active", true).with("event", "expo-2025"),
        );
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(a.to_string(), "tickets?active=true&event=expo-2025");
    }

    #[test]
    fn test_empty_values_do_not_constrain() {
        let filtered = QueryKey::new(
            ResourceKind::Companies,
            Filters::new().with("search", "").with("tags", Vec::<String>::new()),
        );
        assert_eq!(filtered, QueryKey::all(ResourceKind::Companies));
    }

    #[test]
    fn test_many_is_a_set() {
        let a = FilterValue::many(["paid", "pending", "paid"]);
        let b = FilterValue::many(["pending", "paid"]);
        assert_eq!(a, b);
        assert_eq!(a.render(), "paid,pending");
    }

    #[test]
    fn test_same_filters_different_resource() {
        let filters = Filters::new().with("search", "acme");
        let companies = QueryKey::new(ResourceKind::Companies, filters.clone());
        let exhibitors = QueryKey::new(ResourceKind::Exhibitors, filters);
        assert_ne!(companies, exhibitors);
    }

    #[test]
    fn test_query_pairs_cover_every_filter() {
        let key = QueryKey::new(
            ResourceKind::Staff,
            Filters::new().with("role", "security").with("page", 3),
        );
        assert_eq!(
            key.query_pairs(),
            vec![
                ("page".to_string(), "3".to_string()),
                ("role".to_string(), "security".to_string()),
            ]
        );
    }

    #[test]
    fn test_entity_key() {
        let key = QueryKey::entity(ResourceKind::Companies, "c-42");
        assert_eq!(key.to_string(), "companies?id=c-42");
    }

    proptest! {
        #[test]
        fn prop_insertion_order_never_matters(
            pairs in proptest::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{1,6}", 0..8)
        ) {
            let forward: Filters = pairs.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let backward: Filters = pairs.iter().rev().map(|(k, v)| (k.clone(), v.clone())).collect();
            prop_assert_eq!(
                QueryKey::new(ResourceKind::Companies, forward),
                QueryKey::new(ResourceKind::Companies, backward)
            );
        }

        #[test]
        fn prop_differing_filters_differ(
            name in "[a-z]{1,6}",
            a in "[a-z0-9]{1,6}",
            b in "[a-z0-9]{1,6}",
        ) {
            prop_assume!(a != b);
            let ka = QueryKey::new(ResourceKind::Companies, Filters::new().with(name.clone(), a));
            let kb = QueryKey::new(ResourceKind::Companies, Filters::new().with(name, b));
            prop_assert_ne!(ka, kb);
        }
    }
}
