//! Plugin capability: setup-time router extension.
//!
//! Plugins run once during wiring, before `listen` starts; nothing here is
//! ever invoked on the dispatch hot path.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::BoxError;
use crate::router::Router;

/// A capability installed into a router at setup time, typically to register
/// a group of routes.
#[async_trait]
pub trait Plugin: Send + Sync {
    async fn init(&self, router: Arc<Router>) -> Result<(), BoxError>;
}

/// Run each plugin's `init` against `router`, stopping at the first failure.
pub async fn install(router: &Arc<Router>, plugins: &[&dyn Plugin]) -> Result<(), BoxError> {
    for plugin in plugins {
        plugin.init(Arc::clone(router)).await?;
    }
    Ok(())
}
