//! fib-state — backends for the Fibonacci service.
//!
//! Three external collaborators sit behind capability traits:
//!
//! ```text
//! IndexStore           PostgreSQL `indices(number INTEGER PRIMARY KEY)`
//! ResultCache          Redis `values.<index>` string keys
//! NotificationChannel  Redis PUBLISH/SUBSCRIBE on `insert`
//! ```
//!
//! [`Backends`] bundles one of each and is the context object handed to
//! the coordinator, the query surface, the worker, and the health check.
//! In-memory implementations with fault injection back tests and the
//! standalone daemon mode.

pub mod backend;
pub mod bootstrap;
pub mod context;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod redis_backend;

pub use backend::{IndexStore, NotificationChannel, ResultCache, Subscription};
pub use context::{Backends, MemoryBackends};
pub use error::{StateError, StateResult};
