//! Dashboard resources on top of the query cache.
//!
//! [`Dashboard`] turns REST endpoints into cache queries and mutations:
//! it knows each resource's key layout, freshness preset, polling interval
//! and which prefixes a write invalidates. Transport is left to a
//! [`DashboardApi`] implementation.

mod admins;
mod analytics;
mod calls;
pub mod keys;
mod managers;
mod namespaces;
mod processes;
mod settings;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callboard_api_types::Acknowledgement;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::query::{MutationOptions, Namespace, QueryClient, QueryError, QueryKey, QueryOptions};

pub use calls::dropdown_options;
pub use keys::{CallFilter, ProcessFilter};
pub use namespaces::*;

/// Data that changes often (lists, comments).
pub const SHORT_STALE_TIME: Duration = Duration::from_secs(2 * 60);
/// Data that rarely changes (profiles, transcripts, analytics).
pub const LONG_STALE_TIME: Duration = Duration::from_secs(5 * 60);
/// Polling period of the live analytics widgets.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Response body of write endpoints.
pub type Ack = Acknowledgement<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

/// One call against the dashboard REST API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub params: Vec<(&'static str, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            params: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(path)
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            ..Self::get(path)
        }
    }

    pub fn param(mut self, name: &'static str, value: impl ToString) -> Self {
        self.params.push((name, value.to_string()));
        self
    }

    /// Adds the parameter only when `value` is set.
    pub fn param_opt(self, name: &'static str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.param(name, value),
            None => self,
        }
    }

    pub fn json(mut self, body: &impl Serialize) -> Result<Self, QueryError> {
        self.body = Some(serde_json::to_value(body).map_err(|err| {
            QueryError::from_status(400, format!("request body rejected: {err}"))
        })?);
        Ok(self)
    }
}

/// Transport used to reach the dashboard backend.
///
/// Implementations map HTTP failures with [`QueryError::from_status`] and
/// network failures with [`QueryError::transient`].
#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<Value, QueryError>;
}

/// Query and mutation factory for every dashboard resource.
#[derive(Clone)]
pub struct Dashboard {
    client: QueryClient,
    api: Arc<dyn DashboardApi>,
}

impl Dashboard {
    pub fn new(client: QueryClient, api: Arc<dyn DashboardApi>) -> Self {
        Self { client, api }
    }

    pub fn client(&self) -> &QueryClient {
        &self.client
    }

    /// Query whose body is decoded through namespace `N`.
    fn fetch<N: Namespace>(&self, key: QueryKey, request: ApiRequest) -> QueryOptions<N::Response> {
        let api = Arc::clone(&self.api);
        QueryOptions::decoded::<N, _, _>(key, move || {
            let api = Arc::clone(&api);
            let request = request.clone();
            async move { api.send(request).await }
        })
    }

    /// Mutation built from `to_request`, invalidating `invalidates` on success.
    fn write<I, F>(&self, invalidates: Vec<QueryKey>, to_request: F) -> MutationOptions<I, Ack>
    where
        I: Send + 'static,
        F: Fn(I) -> Result<ApiRequest, QueryError> + Send + Sync + 'static,
    {
        let api = Arc::clone(&self.api);
        let options = MutationOptions::new(move |input: I| {
            let api = Arc::clone(&api);
            let request = to_request(input);
            async move { decode_body::<Ack>(api.send(request?).await?) }
        });
        invalidates
            .into_iter()
            .fold(options, |options, prefix| options.invalidates(prefix))
    }
}

impl fmt::Debug for Dashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dashboard")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

fn decode_body<T: DeserializeOwned>(body: Value) -> Result<T, QueryError> {
    Ok(serde_json::from_value(body)?)
}
