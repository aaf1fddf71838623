//! Process supervision shared by both binaries.
//!
//! The dispatcher runs in its own task while the calling task waits for a
//! shutdown signal. A signal only cancels the dispatcher's token; the
//! dispatcher finishes the event it is working on and shuts the proxy down
//! itself. When the proxy terminates on its own the dispatcher is left
//! alone: the event stream closes behind the last event the proxy
//! delivered, so every one of them is still handled. The proxy is shut
//! down once more on the way out; shutdown is idempotent.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::dispatcher::{EventHandler, Outcome, dispatch};
use crate::event::Event;
use crate::proxy::MailProxy;

/// Run `handler` over `events` until the proxy terminates or `signal`
/// resolves.
pub async fn supervise<P, H, S>(
    proxy: Arc<P>,
    events: mpsc::UnboundedReceiver<Event>,
    handler: H,
    signal: S,
) -> Result<Outcome>
where
    P: MailProxy + 'static,
    H: EventHandler<P> + 'static,
    S: Future<Output = std::io::Result<()>>,
{
    let cancel = CancellationToken::new();

    let mut dispatcher = tokio::spawn({
        let proxy = proxy.clone();
        let cancel = cancel.clone();
        async move { dispatch(&*proxy, events, cancel, handler).await }
    });

    tokio::pin!(signal);
    let mut signal_error = None;
    let mut proxy_gone = false;
    let joined = loop {
        tokio::select! {
            result = &mut signal, if !cancel.is_cancelled() => {
                match result {
                    Ok(()) => info!("Received shutdown signal"),
                    Err(e) => signal_error = Some(e),
                }
                cancel.cancel();
            }
            _ = proxy.wait(), if !proxy_gone => {
                info!("Proxy terminated, handling its remaining events");
                proxy_gone = true;
            }
            joined = &mut dispatcher => break joined,
        }
    };

    let outcome = joined.context("event loop panicked")?;
    proxy.shutdown();
    proxy.wait().await;

    if let Some(e) = signal_error {
        return Err(e).context("failed to listen for shutdown signals");
    }

    Ok(outcome?)
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
pub async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
