//! Remote resource client implementation

use crate::{
    config::{ClientConfig, ConfigError},
    error::ClientError,
    types::{MediaUpload, TempMediaHandle, TempMediaId},
};
use async_trait::async_trait;
use eventdesk_core::key::QueryKey;
use eventdesk_core::resource::ResourceKind;
use reqwest::{Client, RequestBuilder, Response, multipart};
use serde_json::Value;
use tracing::debug;

/// Operations against the remote API
///
/// All calls are single attempts: nothing is retried here, callers decide.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Read the collection (or entity) identified by `key`
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport, authorization or API failures.
    async fn fetch(&self, key: &QueryKey) -> Result<Value, ClientError>;

    /// Create an entity
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport, authorization or API failures.
    async fn create(&self, resource: ResourceKind, payload: Value) -> Result<Value, ClientError>;

    /// Replace an entity
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport, authorization or API failures.
    async fn update(
        &self,
        resource: ResourceKind,
        id: &str,
        payload: Value,
    ) -> Result<Value, ClientError>;

    /// Delete an entity
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport, authorization or API failures.
    async fn delete(&self, resource: ResourceKind, id: &str) -> Result<(), ClientError>;

    /// Upload a file to temporary storage
    ///
    /// Either a handle or an error is returned, never both.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport, authorization or API failures.
    async fn upload_media(&self, upload: MediaUpload) -> Result<TempMediaHandle, ClientError>;

    /// Delete a temporary upload that will not be attached to an entity
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport, authorization or API failures.
    async fn delete_temp_media(&self, id: &TempMediaId) -> Result<(), ClientError>;
}

/// HTTP implementation of [`ResourceClient`]
///
/// Endpoints, relative to the configured base URL:
///
/// | call                | request                          |
/// |---------------------|----------------------------------|
/// | `fetch`             | `GET /{resource}?{filters}`      |
/// | `create`            | `POST /{resource}`               |
/// | `update`            | `PUT /{resource}/{id}`           |
/// | `delete`            | `DELETE /{resource}/{id}`        |
/// | `upload_media`      | `POST /media/temp` (multipart)   |
/// | `delete_temp_media` | `DELETE /media/temp/{id}`        |
#[derive(Clone)]
pub struct HttpResourceClient {
    client: Client,
    api_url: String,
    api_token: Option<String>,
}

impl HttpResourceClient {
    /// Build a client from validated configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid or the
    /// underlying HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ConfigError::Build(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.root().to_string(),
            api_token: config.api_token.clone(),
        })
    }

    /// Build a client from `EVENTDESK_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(&ClientConfig::from_env()?)
    }

    /// Replace the bearer token (e.g. after login or refresh)
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.api_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = self
            .authorize(request)
            .header("accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = ClientError::from_response(status.as_u16(), &body);
        debug!(status = status.as_u16(), error = %err, "Request failed");
        Err(err)
    }

    async fn send_json(&self, request: RequestBuilder) -> Result<Value, ClientError> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;

        // 204 and empty 200s carry no entity
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| ClientError::ResponseParseFailed(e.to_string()))
    }
}

impl std::fmt::Debug for HttpResourceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResourceClient")
            .field("api_url", &self.api_url)
            .field("authorized", &self.api_token.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ResourceClient for HttpResourceClient {
    async fn fetch(&self, key: &QueryKey) -> Result<Value, ClientError> {
        debug!(key = %key, "GET");
        let request = self
            .client
            .get(self.url(key.resource().as_str()))
            .query(&key.query_pairs());
        self.send_json(request).await
    }

    async fn create(&self, resource: ResourceKind, payload: Value) -> Result<Value, ClientError> {
        debug!(resource = %resource, "POST");
        let request = self.client.post(self.url(resource.as_str())).json(&payload);
        self.send_json(request).await
    }

    async fn update(
        &self,
        resource: ResourceKind,
        id: &str,
        payload: Value,
    ) -> Result<Value, ClientError> {
        debug!(resource = %resource, id, "PUT");
        let request = self
            .client
            .put(self.url(&format!("{}/{id}", resource.as_str())))
            .json(&payload);
        self.send_json(request).await
    }

    async fn delete(&self, resource: ResourceKind, id: &str) -> Result<(), ClientError> {
        debug!(resource = %resource, id, "DELETE");
        let request = self
            .client
            .delete(self.url(&format!("{}/{id}", resource.as_str())));
        self.send(request).await?;
        Ok(())
    }

    async fn upload_media(&self, upload: MediaUpload) -> Result<TempMediaHandle, ClientError> {
        debug!(file_name = %upload.file_name, size = upload.bytes.len(), "Uploading media");
        let part = multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.mime_type)
            .map_err(|e| ClientError::Validation {
                status: None,
                message: format!("Invalid MIME type {}: {e}", upload.mime_type),
                fields: Vec::new(),
            })?;

        let request = self
            .client
            .post(self.url("media/temp"))
            .multipart(multipart::Form::new().part("file", part));

        let body = self.send_json(request).await?;
        serde_json::from_value(body).map_err(|e| ClientError::ResponseParseFailed(e.to_string()))
    }

    async fn delete_temp_media(&self, id: &TempMediaId) -> Result<(), ClientError> {
        debug!(id = %id, "Deleting temporary media");
        let request = self.client.delete(self.url(&format!("media/temp/{id}")));
        self.send(request).await?;
        Ok(())
    }
}
