//! The mixnet mail proxy, as seen by the clients.
//!
//! [`MailProxy`] is the contract the state machines are written against.
//! [`ProxyClient`] implements it by talking to a locally running proxy
//! daemon over its line-delimited JSON control socket (see [`wire`]).

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::account::Account;
use crate::event::MessageId;

mod client;
pub mod wire;

pub use client::ProxyClient;

/// A message fetched from an account's receive queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// The raw IMF message.
    pub payload: Vec<u8>,
}

/// A service (Kaetzchen) endpoint: a service name hosted by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceAddress {
    pub service: String,
    pub provider: String,
}

impl ServiceAddress {
    pub fn new(service: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            provider: provider.into(),
        }
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.service, self.provider)
    }
}

/// Errors returned by proxy operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("proxy has been shut down")]
    Shutdown,

    #[error("connection to the proxy was lost")]
    ConnectionLost,

    /// The daemon answered the request with an error, e.g. an empty queue.
    #[error("proxy rejected the request: {0}")]
    Rejected(String),

    #[error("malformed proxy reply: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Errors constructing a proxy client.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// Keys were generated and nothing else was asked for. Not a failure.
    #[error("keys generated, not starting the proxy")]
    GenerateOnly,

    #[error("failed to connect to the proxy at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// Operations the clients need from the mixnet proxy.
pub trait MailProxy: Send + Sync {
    /// Stop all background activity. Calling it again is a no-op.
    fn shutdown(&self);

    /// Resolves once the proxy has terminated, either through
    /// [`MailProxy::shutdown`] or because it went away. The event stream
    /// handed out with the proxy closes after its last event once the
    /// proxy has terminated.
    fn wait(&self) -> impl Future<Output = ()> + Send;

    /// Pop the oldest message from `account`'s receive queue.
    fn receive_pop(
        &self,
        account: &Account,
    ) -> impl Future<Output = Result<Envelope, ProxyError>> + Send;

    /// Queue `payload` for delivery from `sender` to `recipient`.
    fn send_message(
        &self,
        sender: &Account,
        recipient: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<MessageId, ProxyError>> + Send;

    /// Queue a one-shot request to a service.
    fn send_kaetzchen_request(
        &self,
        sender: &Account,
        service: &ServiceAddress,
        payload: Vec<u8>,
        want_response: bool,
    ) -> impl Future<Output = Result<MessageId, ProxyError>> + Send;
}
