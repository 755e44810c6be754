//! Demo wiring: in-memory store, one flaky route, DLQ inspection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use herd_core::impls::InMemoryStore;
use herd_core::{
    BoxError, DispatchContext, EnqueueInit, Handler, ListenOptions, RouterOptions, RouterRegistry,
};

struct GreetHandler {
    remaining_failures: AtomicU32,
}

#[async_trait]
impl Handler for GreetHandler {
    async fn handle(&self, ctx: DispatchContext) -> Result<(), BoxError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(format!("intentional failure (left={left})").into());
        }
        info!(
            name = ctx.param("name").unwrap_or("unknown"),
            body = %ctx.body(),
            "greeting handled"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store = Arc::new(InMemoryStore::new());
    let registry = RouterRegistry::new();
    let router = registry.obtain(
        store.clone(),
        Some(RouterOptions {
            enable_dlq: true,
            ..RouterOptions::default()
        }),
    );

    // Two failures before success: exercises redelivery without dead-lettering.
    router.on(
        "/greet/:name",
        Arc::new(GreetHandler {
            remaining_failures: AtomicU32::new(2),
        }),
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listen = tokio::spawn(router.clone().listen(ListenOptions {
        shutdown: Some(shutdown_rx),
    }));

    let commit = router
        .enqueue(
            "/greet/world",
            EnqueueInit {
                body: json!({ "greeting": "hello" }),
                backoff_schedule: Some(vec![
                    Duration::from_millis(100),
                    Duration::from_millis(200),
                ]),
                ..EnqueueInit::default()
            },
        )
        .await?;
    info!(id = %commit.id, "enqueued");

    // No matching route: with default policy this retries and dead-letters.
    router
        .enqueue(
            "/unroutable",
            EnqueueInit {
                body: json!(null),
                backoff_schedule: Some(vec![Duration::from_millis(50)]),
                ..EnqueueInit::default()
            },
        )
        .await?;

    tokio::time::sleep(Duration::from_secs(1)).await;

    for key in store.dead_letter_keys().await {
        warn!(%key, "dead-lettered");
    }

    shutdown_tx.send(true)?;
    listen.await??;
    Ok(())
}
