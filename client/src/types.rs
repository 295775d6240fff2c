//! Entity types exchanged with the EventDesk API
//!
//! Every field is spelled out; there are no free-form JSON bags. Permission
//! lists are a closed enum so an unknown permission is a decode error rather
//! than a silently ignored string.

use eventdesk_core::resource::{Resource, ResourceKind};
use eventdesk_core::validation::{Validate, ValidationErrors};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an uploaded file that is not yet attached to an entity
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempMediaId(pub String);

impl TempMediaId {
    /// Create an id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TempMediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server's answer to a successful upload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempMediaHandle {
    /// Temporary identifier
    pub id: TempMediaId,
    /// Preview URL, if the server exposes one
    #[serde(default)]
    pub url: Option<String>,
    /// Original file name
    pub file_name: String,
    /// MIME type
    pub mime_type: String,
    /// Size in bytes
    pub size: u64,
}

impl TempMediaHandle {
    /// Reference to embed in an entity payload when saving
    #[must_use]
    pub fn to_ref(&self) -> MediaRef {
        MediaRef(self.id.0.clone())
    }
}

/// Reference to a media file from an entity payload
///
/// Holds either a permanent media id or a temporary id that the server
/// promotes when the owning entity is saved.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(pub String);

/// A file to upload
#[derive(Clone, PartialEq, Eq)]
pub struct MediaUpload {
    /// File name sent in the multipart part
    pub file_name: String,
    /// MIME type
    pub mime_type: String,
    /// File contents
    pub bytes: Vec<u8>,
}

impl MediaUpload {
    /// Create an upload
    #[must_use]
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }
}

// File contents are not useful in logs
impl fmt::Debug for MediaUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaUpload")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A stored media file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    /// Permanent id
    pub id: String,
    /// Public URL
    pub url: String,
    /// Original file name
    pub file_name: String,
    /// MIME type
    pub mime_type: String,
}

impl Resource for MediaFile {
    const KIND: ResourceKind = ResourceKind::Media;

    fn id(&self) -> Option<&str> {
        Some(&self.id)
    }
}

/// Staff permission
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Create and edit companies
    ManageCompanies,
    /// Assign exhibitors to booths
    ManageExhibitors,
    /// Configure ticket types
    ManageTickets,
    /// Invite and edit staff
    ManageStaff,
    /// Edit roles and permissions
    ManageRoles,
    /// Upload and remove media
    ManageMedia,
    /// Edit floor plans
    ManageFloorPlans,
    /// Publish landing pages
    ManageLandingPages,
    /// Read sales and attendance reports
    ViewReports,
}

/// A company taking part in an event
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    /// Server id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name
    pub name: String,
    /// Contact email
    #[serde(default)]
    pub email: Option<String>,
    /// Website URL
    #[serde(default)]
    pub website: Option<String>,
    /// Short description
    #[serde(default)]
    pub description: Option<String>,
    /// Logo
    #[serde(default)]
    pub logo: Option<MediaRef>,
}

impl Resource for Company {
    const KIND: ResourceKind = ResourceKind::Companies;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl Validate for Company {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("name", &self.name);
        if let Some(email) = &self.email {
            errors.email("email", email);
        }
        errors.into_result()
    }
}

/// A company's presence on the floor
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exhibitor {
    /// Server id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Owning company
    pub company_id: String,
    /// Booth label on the floor plan
    #[serde(default)]
    pub booth: Option<String>,
    /// Floor plan the booth is on
    #[serde(default)]
    pub floor_plan_id: Option<String>,
}

impl Resource for Exhibitor {
    const KIND: ResourceKind = ResourceKind::Exhibitors;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl Validate for Exhibitor {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("company_id", &self.company_id);
        errors.into_result()
    }
}

/// A ticket type on sale
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Server id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name
    pub name: String,
    /// Price in minor currency units
    pub price_cents: i64,
    /// ISO 4217 currency code
    pub currency: String,
    /// Number available, `None` for unlimited
    #[serde(default)]
    pub quantity: Option<u32>,
    /// Whether the ticket is on sale
    #[serde(default)]
    pub active: bool,
}

impl Resource for Ticket {
    const KIND: ResourceKind = ResourceKind::Tickets;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl Validate for Ticket {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("name", &self.name);
        errors.non_negative("price_cents", self.price_cents);
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            errors.push("currency", "must be a three-letter currency code");
        }
        errors.into_result()
    }
}

/// A platform user
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserModel {
    /// Server id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Login email
    pub email: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Assigned role id
    #[serde(default)]
    pub role_id: Option<String>,
    /// Effective permissions
    #[serde(default)]
    pub permissions: Vec<Permission>,
    /// Profile picture
    #[serde(default)]
    pub avatar: Option<MediaRef>,
}

impl UserModel {
    /// Whether the user holds `permission`
    #[must_use]
    pub fn can(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

impl Resource for UserModel {
    const KIND: ResourceKind = ResourceKind::Users;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl Validate for UserModel {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("email", &self.email);
        errors.email("email", &self.email);
        errors.require("first_name", &self.first_name);
        errors.require("last_name", &self.last_name);
        errors.into_result()
    }
}

/// A staff member working an event
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    /// Server id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Contact email
    pub email: String,
    /// Assigned role id
    pub role_id: String,
}

impl Resource for StaffMember {
    const KIND: ResourceKind = ResourceKind::Staff;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl Validate for StaffMember {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("first_name", &self.first_name);
        errors.require("last_name", &self.last_name);
        errors.require("email", &self.email);
        errors.email("email", &self.email);
        errors.require("role_id", &self.role_id);
        errors.into_result()
    }
}

/// A named set of permissions
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Server id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name
    pub name: String,
    /// Granted permissions
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl Resource for Role {
    const KIND: ResourceKind = ResourceKind::Roles;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl Validate for Role {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("name", &self.name);
        errors.into_result()
    }
}

/// A venue floor plan
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorPlan {
    /// Server id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name
    pub name: String,
    /// Plan image
    #[serde(default)]
    pub image: Option<MediaRef>,
}

impl Resource for FloorPlan {
    const KIND: ResourceKind = ResourceKind::FloorPlans;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl Validate for FloorPlan {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("name", &self.name);
        errors.into_result()
    }
}

/// A public event landing page
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandingPage {
    /// Server id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// URL slug
    pub slug: String,
    /// Page title
    pub title: String,
    /// Whether the page is publicly visible
    #[serde(default)]
    pub published: bool,
    /// Hero image
    #[serde(default)]
    pub hero: Option<MediaRef>,
}

impl Resource for LandingPage {
    const KIND: ResourceKind = ResourceKind::LandingPages;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl Validate for LandingPage {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("title", &self.title);
        errors.require("slug", &self.slug);
        if !self
            .slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            errors.push("slug", "may only contain lowercase letters, digits and dashes");
        }
        errors.into_result()
    }
}

/// Session credentials returned by the login endpoint
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthModel {
    /// Bearer token for API calls
    pub api_token: String,
    /// Token used to obtain a new `api_token`
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl fmt::Debug for AuthModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthModel")
            .field("api_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
