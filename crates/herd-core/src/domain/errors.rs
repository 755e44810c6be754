use thiserror::Error;

/// Opaque handler failure. Handlers report whatever error type they like;
/// the router carries it through to the queue untouched.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a delivered value failed message-shape validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageDefect {
    #[error("delivered value is not an object")]
    NotAnObject,

    #[error("message path is missing or not a string")]
    PathNotString,

    #[error("message body key is missing")]
    MissingBody,

    #[error("message headers are missing or not a string map")]
    InvalidHeaders,
}

/// Route-pattern compilation failure. Raised by `Router::on`, never on the
/// dispatch path.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("empty parameter name in pattern `{pattern}`")]
    EmptyParamName { pattern: String },

    #[error("unbalanced group in pattern `{pattern}`")]
    UnbalancedGroup { pattern: String },

    #[error("named capture inside a group in pattern `{pattern}`")]
    NamedNestedCapture { pattern: String },

    #[error("pattern `{pattern}` compiled to an invalid expression")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Failure of one dispatch, surfaced to the queue store. The store owns retry
/// scheduling and dead-lettering; the router never retries internally.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("malformed message: {0}")]
    Malformed(#[from] MessageDefect),

    #[error("no route matched path `{0}`")]
    NoRouteMatched(String),

    #[error("handler failed")]
    Handler(#[source] BoxError),
}

/// Failure reported by a queue store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("queue store is closed")]
    Closed,

    #[error("encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store backend: {0}")]
    Backend(String),
}
