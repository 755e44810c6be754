//! Domain model (message envelope, queue keys, IDs, error taxonomy).

pub mod errors;
pub mod ids;
pub mod key;
pub mod message;

pub use self::errors::{BoxError, DispatchError, MessageDefect, PatternError, StoreError};
pub use self::ids::MessageId;
pub use self::key::{KeyPart, QueueKey};
pub use self::message::Message;
