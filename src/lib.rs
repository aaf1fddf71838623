//! Mixnet mail proxy clients
//!
//! Two small control loops that sit on top of a running mixnet mail proxy:
//!
//! - `pong`, an autoresponder that answers every inbound message with a
//!   fixed reply ([`autoresponder::Autoresponder`]).
//! - `wallet-proxy`, which waits for the proxy to come online, submits a
//!   single transaction to a remote service and exits once delivery is
//!   confirmed ([`submitter::Submitter`]).
//!
//! Both binaries share the same plumbing:
//!
//! 1. Load the TOML configuration ([`config::Config`])
//! 2. Connect to the proxy daemon ([`proxy::ProxyClient`]), which yields a
//!    stream of [`event::Event`]s
//! 3. Run the [`dispatcher`] in its own task, feeding events one at a time
//!    into a state machine
//! 4. Wait for a shutdown signal or for the proxy to go away
//!    ([`supervisor::supervise`])

pub mod account;
pub mod address;
pub mod autoresponder;
pub mod config;
pub mod dispatcher;
pub mod encoder;
pub mod event;
pub mod logging;
pub mod proxy;
pub mod submitter;
pub mod supervisor;

pub use account::Account;
pub use config::Config;
pub use dispatcher::{EventHandler, Flow, Outcome, ProtocolError};
pub use event::{Event, MessageId};
pub use proxy::{MailProxy, ProxyClient, ProxyError, SpawnError};
