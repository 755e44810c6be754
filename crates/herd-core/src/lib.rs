//! herd-core
//!
//! Message-dispatch router over a durable, at-least-once delivery queue.
//! Producers enqueue `(path, body, headers)` envelopes; a single consumer
//! loop validates each delivered value, routes it to the first matching
//! handler, and on failure lets the queue drive redelivery and dead-letter
//! writes.
//!
//! # Module layout
//! - **domain**: message envelope, queue keys, IDs, error taxonomy
//! - **matcher / route / context**: pattern compilation and the match surface
//! - **router**: registration, enqueue policy, dispatch state machine
//! - **backoff**: jittered redelivery schedules
//! - **registry**: one router per store handle
//! - **ports**: queue store and clock boundaries
//! - **impls**: in-memory store for development and tests
//! - **plugin**: setup-time extension hook

pub mod backoff;
pub mod context;
pub mod domain;
pub mod impls;
pub mod matcher;
pub mod plugin;
pub mod ports;
pub mod registry;
pub mod route;
pub mod router;

pub use context::DispatchContext;
pub use domain::{BoxError, DispatchError, Message, MessageDefect, PatternError, StoreError};
pub use matcher::{MatchOptions, PathMatcher, PathParams};
pub use registry::{RouterRegistry, router_for};
pub use route::{Handler, Route};
pub use router::{EnqueueInit, ListenOptions, Router, RouterOptions};
