//! Typed, uncached access to the API
//!
//! Thin layer over any [`ResourceClient`]: payloads are validated before
//! they are sent and responses are decoded into entity types. Cached reads
//! and tracked mutations live in `eventdesk-runtime`.

use crate::client::ResourceClient;
use crate::codec::{decode_collection, decode_entity, encode_entity};
use crate::error::ClientError;
use eventdesk_core::key::{Filters, QueryKey};
use eventdesk_core::resource::Resource;
use eventdesk_core::validation::Validate;
use std::sync::Arc;

/// Typed facade over a [`ResourceClient`]
#[derive(Clone)]
pub struct Api {
    client: Arc<dyn ResourceClient>,
}

impl Api {
    /// Wrap a client
    #[must_use]
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self { client }
    }

    /// The wrapped client
    #[must_use]
    pub fn client(&self) -> &Arc<dyn ResourceClient> {
        &self.client
    }

    /// List entities matching `filters`
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on request or decode failure.
    pub async fn list<T: Resource>(&self, filters: Filters) -> Result<Vec<T>, ClientError> {
        let key = QueryKey::new(T::KIND, filters);
        decode_collection(self.client.fetch(&key).await?)
    }

    /// Create `entity`; validation failures never reach the network
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on validation, request or decode failure.
    pub async fn create<T: Resource + Validate>(&self, entity: &T) -> Result<T, ClientError> {
        let payload = encode_entity(entity)?;
        decode_entity(self.client.create(T::KIND, payload).await?)
    }

    /// Update `entity`, which must carry an id
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on validation, request or decode failure.
    pub async fn update<T: Resource + Validate>(&self, entity: &T) -> Result<T, ClientError> {
        let payload = encode_entity(entity)?;
        let id = require_id(entity)?;
        decode_entity(self.client.update(T::KIND, id, payload).await?)
    }

    /// Delete `entity`, which must carry an id
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on request failure.
    pub async fn delete<T: Resource>(&self, entity: &T) -> Result<(), ClientError> {
        self.client.delete(T::KIND, require_id(entity)?).await
    }
}

/// The entity's id, or a validation error for unsaved entities
///
/// # Errors
///
/// Returns [`ClientError::Validation`] if the entity has never been saved.
pub fn require_id<T: Resource>(entity: &T) -> Result<&str, ClientError> {
    entity.id().ok_or_else(|| ClientError::Validation {
        status: None,
        message: format!("{} entity has no id", T::KIND),
        fields: Vec::new(),
    })
}
