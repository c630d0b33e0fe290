//! Request/response channel.
//!
//! A form endpoint returns the field collection on GET and accepts a partial
//! update on POST:
//!
//! ```text
//! GET  {base_url}/{form}   -> {"description": "...", "fields": [{"rate": 12, "o": "number;rw"}]}
//! POST {base_url}/{form}   <- {"rate": 13}
//! ```

use async_trait::async_trait;
use field_core::{FieldSet, ReconciliationCache, SeriesStore};
use field_types::{FormData, Payload, Source};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::config::RestConfig;

/// Request/response errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// HTTP request failed or returned an error status.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint rejected the request.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Transport for reading and updating a form's state.
#[async_trait]
pub trait StateTransport: Send + Sync {
    /// Fetch the field collection.
    async fn read_state(&self) -> Result<FormData, StateError>;

    /// Send a partial update verbatim. Returns the endpoint's response body.
    async fn update_state(&self, patch: &Payload) -> Result<Value, StateError>;
}

/// Fetch a form and decode it against the shared stores.
pub async fn load<S: StateTransport + ?Sized>(
    transport: &S,
    cache: &ReconciliationCache,
    series: &SeriesStore,
    default_max_points: i64,
) -> Result<FieldSet, StateError> {
    let form = transport.read_state().await?;
    tracing::debug!("Loaded {} fields", form.fields.len());
    Ok(FieldSet::from_form_capped(
        &form,
        cache,
        series,
        default_max_points,
    ))
}

/// Save a patch.
///
/// The patch is written to the cache as request-sourced first, stamped in
/// patch order, then sent. Send failures are returned to the caller; the
/// cache keeps the optimistic values until something newer arrives.
pub async fn save<S: StateTransport + ?Sized>(
    transport: &S,
    cache: &ReconciliationCache,
    patch: &Payload,
) -> Result<Value, StateError> {
    let accepted = cache.put_bulk(
        patch.iter().map(|(key, value)| (key.as_str(), value.clone())),
        Source::Request,
    );
    tracing::debug!("Saving {} fields ({} accepted locally)", patch.len(), accepted);
    transport.update_state(patch).await
}

/// HTTP form endpoint.
#[derive(Debug, Clone)]
pub struct HttpStateTransport {
    client: reqwest::Client,
    url: String,
    access_token: Option<String>,
}

impl HttpStateTransport {
    /// Create a transport for `form` under the configured base URL.
    pub fn new(config: &RestConfig, form: &str) -> Result<Self, StateError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self {
            client,
            url: config.form_url(form),
            access_token: (!config.access_token.is_empty()).then(|| config.access_token.clone()),
        })
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl StateTransport for HttpStateTransport {
    async fn read_state(&self) -> Result<FormData, StateError> {
        let response = self
            .authorize(self.client.get(&self.url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<FormData>().await?)
    }

    async fn update_state(&self, patch: &Payload) -> Result<Value, StateError> {
        let response = self
            .authorize(self.client.post(&self.url))
            .json(patch)
            .send()
            .await?
            .error_for_status()?;

        // Some endpoints answer with an empty body
        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|e| StateError::Rejected(e.to_string()))
    }
}

/// In-memory form endpoint for testing.
///
/// Updates are applied to the stored form so later reads reflect them.
#[derive(Debug, Default, Clone)]
pub struct MockStateTransport {
    inner: Arc<Mutex<MockStateInner>>,
}

#[derive(Debug, Default)]
struct MockStateInner {
    form: FormData,
    updates: Vec<Payload>,
    fail_next: Option<String>,
}

impl MockStateTransport {
    /// Create an endpoint serving `form`.
    pub fn new(form: FormData) -> Self {
        let transport = Self::default();
        transport.inner.lock().unwrap().form = form;
        transport
    }

    /// Every patch received so far.
    pub fn updates(&self) -> Vec<Payload> {
        self.inner.lock().unwrap().updates.clone()
    }

    /// Cause the next request to fail with the given error.
    pub fn fail_next(&self, error: &str) {
        self.inner.lock().unwrap().fail_next = Some(error.to_string());
    }
}

#[async_trait]
impl StateTransport for MockStateTransport {
    async fn read_state(&self) -> Result<FormData, StateError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next.take() {
            return Err(StateError::Rejected(error));
        }
        Ok(inner.form.clone())
    }

    async fn update_state(&self, patch: &Payload) -> Result<Value, StateError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next.take() {
            return Err(StateError::Rejected(error));
        }
        for field in &mut inner.form.fields {
            if let Some(value) = patch.get(&field.name) {
                field.value = value.clone();
            }
        }
        inner.updates.push(patch.clone());
        Ok(Value::Object(patch.clone()))
    }
}
