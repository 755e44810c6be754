//! Read-only view handed to a handler for one dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::Message;
use crate::matcher::PathParams;
use crate::router::Router;

/// Everything a handler may read about the message it was matched for, plus a
/// back-reference to the router so handlers can enqueue follow-up messages.
///
/// Built once per successful match and dropped when the handler returns.
#[derive(Clone)]
pub struct DispatchContext {
    path: String,
    body: Value,
    headers: HashMap<String, String>,
    params: PathParams,
    router: Arc<Router>,
}

impl DispatchContext {
    pub(crate) fn new(message: Message, params: PathParams, router: Arc<Router>) -> Self {
        Self {
            path: message.path,
            body: message.body,
            headers: message.headers,
            params,
            router,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }
}
