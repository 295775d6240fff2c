//! Remote resource kinds.
//!
//! Every remote collection the platform talks to is enumerated here. The
//! wire name doubles as the URL path segment and as the cache namespace, so
//! a typed read and the invalidation after a typed write always agree on
//! which entries they touch.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named remote entity collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Companies registered for an event
    Companies,
    /// Exhibitors (company booths on the floor plan)
    Exhibitors,
    /// Uploaded media files
    Media,
    /// Ticket types on sale
    Tickets,
    /// Event staff members
    Staff,
    /// Staff roles and their permissions
    Roles,
    /// Platform users
    Users,
    /// Venue floor plans
    FloorPlans,
    /// Public landing pages
    LandingPages,
}

impl ResourceKind {
    /// All resource kinds, in declaration order
    pub const ALL: [Self; 9] = [
        Self::Companies,
        Self::Exhibitors,
        Self::Media,
        Self::Tickets,
        Self::Staff,
        Self::Roles,
        Self::Users,
        Self::FloorPlans,
        Self::LandingPages,
    ];

    /// Stable wire name, used as URL path segment and cache namespace
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Companies => "companies",
            Self::Exhibitors => "exhibitors",
            Self::Media => "media",
            Self::Tickets => "tickets",
            Self::Staff => "staff",
            Self::Roles => "roles",
            Self::Users => "users",
            Self::FloorPlans => "floor-plans",
            Self::LandingPages => "landing-pages",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown resource name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown resource: {0}")]
pub struct UnknownResource(pub String);

impl FromStr for ResourceKind {
    type Err = UnknownResource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownResource(s.to_string()))
    }
}

/// Binds an entity type to the remote collection it lives in
///
/// Typed reads and writes use `KIND` to pick the endpoint and the cache
/// namespace.
///
/// # Example
///
/// ```ignore
/// impl Resource for Company {
///     const KIND: ResourceKind = ResourceKind::Companies;
///
///     fn id(&self) -> Option<&str> {
///         self.id.as_deref()
///     }
/// }
/// ```
pub trait Resource: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The collection this entity belongs to
    const KIND: ResourceKind;

    /// Server-assigned identifier, `None` before the first save
    fn id(&self) -> Option<&str>;
}
