//! Asynchronous query cache.
//!
//! Values are cached per [`QueryKey`]. Reads go through [`Query`] handles,
//! which fetch missing or stale entries once per key no matter how many
//! handles ask. Writes go through [`Mutation`]s, which invalidate the key
//! prefixes they touch so observed entries refetch on their own.
//!
//! ```no_run
//! use callboard::query::{QueryClient, QueryConfig, QueryOptions};
//! use callboard::query_key;
//!
//! # async fn demo() -> Result<(), callboard::query::QueryError> {
//! let client = QueryClient::new(QueryConfig::default());
//! let query = client.query(QueryOptions::new(query_key!["managers", 1, 10, ""], || async {
//!     Ok(42_u64)
//! }));
//! assert_eq!(*query.settled().await?, 42);
//! # Ok(())
//! # }
//! ```

mod bus;
mod client;
mod config;
mod error;
mod fetch;
mod gc;
mod keys;
mod lock;
mod mutation;
mod namespace;
mod observer;
mod retry;
mod store;

pub use bus::{Callback, Epoch, Notification, NotificationBus, SubscriberId};
pub use client::QueryClient;
pub use config::QueryConfig;
pub use error::QueryError;
pub use fetch::{FetchExecutor, InFlight};
pub use gc::{Collector, SweepReport};
pub use keys::{KeySegment, QueryKey, encode};
pub use mutation::{Mutation, MutationOptions, MutationRecord, MutationStatus};
pub use namespace::Namespace;
pub use observer::{Query, QueryOptions, QueryState};
pub use retry::{Backoff, RetryPolicy};
pub use store::{
    EntryPatch, EntrySnapshot, EntryStore, FetchFn, FetchOptions, Fetcher, Invalidation, Payload,
    QueryStatus, Subscription,
};
