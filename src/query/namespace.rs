//! Typed key namespaces.
//!
//! A namespace owns the first key segment and declares the type its
//! payloads decode into. Raw JSON bodies are checked here, before anything
//! is written to the store.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::QueryError;
use super::keys::{KeySegment, QueryKey};

pub trait Namespace {
    /// Leading key segment.
    const NAME: &'static str;

    type Response: DeserializeOwned + Send + Sync + 'static;

    /// Extra checks a deserialized response has to pass.
    fn validate(_response: &Self::Response) -> Result<(), QueryError> {
        Ok(())
    }

    fn decode(body: Value) -> Result<Self::Response, QueryError> {
        let response: Self::Response = serde_json::from_value(body)
            .map_err(|err| QueryError::decode(format!("{}: {err}", Self::NAME)))?;
        Self::validate(&response)?;
        Ok(response)
    }

    /// Prefix covering every key of this namespace.
    fn root() -> QueryKey {
        QueryKey::new([KeySegment::from(Self::NAME)])
    }
}
