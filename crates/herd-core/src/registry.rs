//! Identity-keyed router registry: one router per queue-store handle.
//!
//! The registry is an explicit component with its own storage rather than
//! ambient global state, so tests build isolated instances; a process-wide
//! default is provided for the common case.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing::warn;

use crate::ports::store::QueueStore;
use crate::router::{Router, RouterOptions};

pub struct RouterRegistry {
    routers: Mutex<HashMap<usize, Arc<Router>>>,
}

impl RouterRegistry {
    pub fn new() -> Self {
        Self {
            routers: Mutex::new(HashMap::new()),
        }
    }

    /// Return the router for `store`, constructing it on first call.
    ///
    /// A later call for the same handle returns the identical instance; any
    /// options supplied then are ignored with a warning rather than silently
    /// reconfiguring a router that is already dispatching.
    ///
    /// Keys are `Arc` data-pointer identities. An entry keeps its store alive
    /// through the router it holds, so an address is never reused while its
    /// entry exists.
    pub fn obtain(&self, store: Arc<dyn QueueStore>, options: Option<RouterOptions>) -> Arc<Router> {
        let key = Arc::as_ptr(&store) as *const () as usize;
        let mut routers = self.routers.lock().unwrap();
        if let Some(existing) = routers.get(&key) {
            if options.is_some() {
                warn!("router already constructed for this store handle; supplied options ignored");
            }
            return Arc::clone(existing);
        }

        let router = Router::new(store, options.unwrap_or_default());
        routers.insert(key, Arc::clone(&router));
        router
    }

    pub fn len(&self) -> usize {
        self.routers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routers.lock().unwrap().is_empty()
    }
}

impl Default for RouterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT_REGISTRY: Lazy<RouterRegistry> = Lazy::new(RouterRegistry::new);

/// The process-wide registry.
pub fn router_for(store: Arc<dyn QueueStore>, options: Option<RouterOptions>) -> Arc<Router> {
    DEFAULT_REGISTRY.obtain(store, options)
}
