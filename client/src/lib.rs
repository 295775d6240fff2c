//! # EventDesk API Client
//!
//! Rust client library for the EventDesk event-management API: companies,
//! exhibitors, tickets, staff, roles, floor plans, landing pages and media.
//!
//! ## Example
//!
//! ```no_run
//! use eventdesk_client::{Api, ClientConfig, HttpResourceClient};
//! use eventdesk_client::types::Company;
//! use eventdesk_core::key::Filters;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Create client from EVENTDESK_API_URL / EVENTDESK_API_TOKEN
//!     let client = HttpResourceClient::from_env()?;
//!     let api = Api::new(Arc::new(client));
//!
//!     let companies: Vec<Company> = api.list(Filters::new().with("search", "acme")).await?;
//!     println!("Found {} companies", companies.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - Object-safe [`ResourceClient`] trait, so the runtime and tests can swap transports
//! - Typed, fully enumerated entity models
//! - Error taxonomy: network, validation (with field messages), authorization
//! - Multipart upload of temporary media
//! - No hidden retries

pub mod api;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod types;

// Re-export main types for convenience
pub use api::Api;
pub use client::{HttpResourceClient, ResourceClient};
pub use config::{ClientConfig, ConfigError};
pub use error::ClientError;
pub use types::{MediaRef, MediaUpload, TempMediaHandle, TempMediaId};
