//! Ports: interface boundaries to external collaborators.
//!
//! The dispatch core only ever talks to the durable queue and to wall-clock
//! time through these traits; swapping the backing implementation is a
//! construction-time decision.

pub mod clock;
pub mod store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::store::{CommitResult, DeliveryHandler, EnqueueOptions, QueueStore};
