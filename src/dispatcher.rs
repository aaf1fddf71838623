//! The event loop.
//!
//! [`dispatch`] is the single consumer of the proxy's event stream. Each
//! event is handed to an [`EventHandler`] and handled to completion,
//! including any requests the handler makes to the proxy, before the next
//! event is looked at. Handlers therefore never see interleaved events and
//! need no locking.
//!
//! The loop ends when:
//!
//! - the cancellation token fires (checked between events, never in the
//!   middle of one);
//! - the handler returns [`Flow::Exit`];
//! - the handler returns an error;
//! - the event stream closes because the proxy went away.
//!
//! In the first three cases the proxy is shut down before returning.

use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::event::Event;
use crate::proxy::{MailProxy, ProxyError};

/// What the dispatcher should do after an event has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Why [`dispatch`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Cancelled from outside, usually by a signal.
    Cancelled,
    /// The handler reached a terminal state.
    Finished,
    /// The event stream closed under us.
    Disconnected,
}

/// The proxy did something a handler cannot make sense of.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unexpected {event} event while {state}")]
    UnexpectedEvent {
        event: &'static str,
        state: &'static str,
    },

    #[error("service request failed: {0}")]
    ServiceRequest(#[source] ProxyError),
}

/// A state machine driven by proxy events.
pub trait EventHandler<P: MailProxy>: Send {
    fn handle_event(
        &mut self,
        proxy: &P,
        event: Event,
    ) -> impl Future<Output = Result<Flow, ProtocolError>> + Send;
}

/// Feed `events` into `handler` until cancelled, finished or disconnected.
pub async fn dispatch<P, H>(
    proxy: &P,
    mut events: mpsc::UnboundedReceiver<Event>,
    cancel: CancellationToken,
    mut handler: H,
) -> Result<Outcome, ProtocolError>
where
    P: MailProxy,
    H: EventHandler<P>,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Event loop cancelled");
                proxy.shutdown();
                return Ok(Outcome::Cancelled);
            }

            event = events.recv() => {
                let Some(event) = event else {
                    info!("Event stream closed");
                    return Ok(Outcome::Disconnected);
                };

                info!("Received event: {event}");

                match handler.handle_event(proxy, event).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Exit) => {
                        proxy.shutdown();
                        return Ok(Outcome::Finished);
                    }
                    Err(e) => {
                        error!("Protocol violation: {}", e);
                        proxy.shutdown();
                        return Err(e);
                    }
                }
            }
        }
    }
}
