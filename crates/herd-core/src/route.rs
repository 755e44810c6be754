//! A route: a compiled path pattern bound to a handler.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::DispatchContext;
use crate::domain::errors::{BoxError, PatternError};
use crate::matcher::{MatchOptions, PathMatcher, PathParams};

/// Callback bound to a route. Invoked once per matched delivery with a
/// read-only context; returning `Err` makes the queue redeliver the message
/// per its backoff schedule.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: DispatchContext) -> Result<(), BoxError>;
}

/// One `(pattern, handler)` binding as stored by the router.
///
/// `matches` returns the extracted parameters directly instead of stashing
/// them on the route, so a match and the handler invocation it feeds carry no
/// ordering protocol between them and dispatches never share mutable state.
#[derive(Clone)]
pub struct Route {
    pattern: String,
    matcher: PathMatcher,
    handler: Arc<dyn Handler>,
}

impl Route {
    pub fn new(
        pattern: &str,
        handler: Arc<dyn Handler>,
        options: MatchOptions,
    ) -> Result<Self, PatternError> {
        Ok(Self {
            pattern: pattern.to_string(),
            matcher: PathMatcher::compile(pattern, options)?,
            handler,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Anchored match; `Some` carries the decoded parameter map consumed by
    /// the handler invocation.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        self.matcher.captures(path)
    }

    /// Invoke the bound handler. Failures propagate untransformed.
    pub async fn handle(&self, ctx: DispatchContext) -> Result<(), BoxError> {
        self.handler.handle(ctx).await
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}
