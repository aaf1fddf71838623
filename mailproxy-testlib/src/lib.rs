//! Test doubles for the mail proxy clients.
//!
//! - [`RecordingProxy`] is an in-memory [`MailProxy`](mailproxy_clients::MailProxy)
//!   with a scripted receive queue that records every call made to it.
//! - [`FakeDaemon`] listens on a local TCP port and plays the daemon side of
//!   the control socket protocol, so the real `ProxyClient` can be driven
//!   line by line.

use std::time::Duration;

use mailproxy_clients::Event;
use mailproxy_clients::account::Account;
use mailproxy_clients::config::{Config, LoggingConfig, ProxyConfig};
use tokio::sync::mpsc;

mod daemon;
mod recording;

pub use daemon::{DaemonConnection, FakeDaemon, RawRequest};
pub use recording::{ProxyCall, RecordingProxy};

/// How long tests wait for something that should happen promptly.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Route `tracing` output through the test harness. Safe to call from every
/// test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// An event stream that yields `events` and then closes.
pub fn closed_stream(events: impl IntoIterator<Item = Event>) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    for event in events {
        let _ = tx.send(event);
    }
    rx
}

/// An event stream that yields `events` and then stays open for as long as
/// the returned sender lives.
pub fn open_stream(
    events: impl IntoIterator<Item = Event>,
) -> (mpsc::UnboundedSender<Event>, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    for event in events {
        let _ = tx.send(event);
    }
    (tx, rx)
}

/// A minimal IMF message from `from`.
pub fn imf_message(from: &str, body: &str) -> Vec<u8> {
    format!("From: {from}\r\nTo: alice@provider1\r\nSubject: ping\r\n\r\n{body}\r\n").into_bytes()
}

/// A configuration pointing at `address` with a single `alice@provider1`
/// account.
pub fn test_config(address: &str) -> Config {
    Config {
        proxy: ProxyConfig {
            address: address.to_string(),
            data_dir: None,
        },
        logging: LoggingConfig::default(),
        accounts: vec![Account::new("alice", "provider1")],
    }
}
