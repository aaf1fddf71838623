//! Transaction submitter (`wallet-proxy`).
//!
//! Waits for the proxy to connect, submits one `zcash` service request and
//! stops once the proxy reports the request as sent.
//!
//! ```text
//! AwaitConnection --connected--> (send request) --> AwaitConfirmation --sent--> Terminated
//!        |                                                 |
//!        +--disconnected--> Terminated                     +--disconnected--> Terminated
//! ```
//!
//! The request is sent at most once: reconnects after the request went
//! out are ignored. Events that make no sense in the current state abort
//! the program rather than being skipped.

use tracing::{debug, info, warn};

use crate::account::Account;
use crate::dispatcher::{EventHandler, Flow, ProtocolError};
use crate::encoder::{EncodeError, RequestEncoder, ServiceRequest};
use crate::event::Event;
use crate::proxy::{MailProxy, ServiceAddress};

/// Environment variable holding the configuration file path.
pub const WALLET_CONFIG_ENV: &str = "WALLETCFG";

pub const SENDER_ID: &str = "anonymous";
pub const PROVIDER_ID: &str = "provider2";

pub const SERVICE_ID: &str = "zcash";
pub const SERVICE_PROVIDER: &str = "zcash1";

/// The account transactions are sent from.
pub fn sender_account() -> Account {
    Account::new(SENDER_ID, PROVIDER_ID)
}

/// The service transactions are sent to.
pub fn zcash_service() -> ServiceAddress {
    ServiceAddress::new(SERVICE_ID, SERVICE_PROVIDER)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitState {
    AwaitConnection,
    AwaitConfirmation,
    Terminated,
}

impl SubmitState {
    fn describe(self) -> &'static str {
        match self {
            SubmitState::AwaitConnection => "awaiting connection",
            SubmitState::AwaitConfirmation => "awaiting confirmation",
            SubmitState::Terminated => "terminated",
        }
    }
}

pub struct Submitter {
    sender: Account,
    service: ServiceAddress,
    payload: Vec<u8>,
    transaction_len: usize,
    state: SubmitState,
}

impl Submitter {
    /// Encode `request` once; the resulting payload is what gets sent.
    pub fn new(
        sender: Account,
        service: ServiceAddress,
        request: &ServiceRequest,
        encoder: &RequestEncoder,
    ) -> Result<Self, EncodeError> {
        Ok(Self {
            sender,
            service,
            payload: encoder.encode(request)?,
            transaction_len: request.transaction().len(),
            state: SubmitState::AwaitConnection,
        })
    }

    pub fn state(&self) -> SubmitState {
        self.state
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn unexpected(&mut self, event: &Event) -> ProtocolError {
        let state = self.state.describe();
        self.state = SubmitState::Terminated;
        ProtocolError::UnexpectedEvent {
            event: event.kind(),
            state,
        }
    }

    fn terminate(&mut self) -> Flow {
        self.state = SubmitState::Terminated;
        Flow::Exit
    }
}

impl<P: MailProxy> EventHandler<P> for Submitter {
    async fn handle_event(&mut self, proxy: &P, event: Event) -> Result<Flow, ProtocolError> {
        match (self.state, &event) {
            (SubmitState::Terminated, _) => {
                debug!("Ignoring {} after termination", event.kind());
                Ok(Flow::Exit)
            }

            (SubmitState::AwaitConnection, Event::ConnectionStatus { connected: true }) => {
                info!(
                    "Sending tx blob of size {} to {}",
                    self.transaction_len, self.service
                );
                // Leave the waiting state before the request goes out so a
                // failure can never lead to a second attempt.
                self.state = SubmitState::AwaitConfirmation;
                let sent = proxy
                    .send_kaetzchen_request(&self.sender, &self.service, self.payload.clone(), false)
                    .await;
                match sent {
                    Ok(id) => {
                        info!("Service request queued as {}", id);
                        Ok(Flow::Continue)
                    }
                    Err(e) => {
                        self.state = SubmitState::Terminated;
                        Err(ProtocolError::ServiceRequest(e))
                    }
                }
            }
            (SubmitState::AwaitConnection, Event::ConnectionStatus { connected: false }) => {
                info!("Not connected, nothing to send");
                Ok(self.terminate())
            }
            (SubmitState::AwaitConnection, Event::MessageReceived)
            | (SubmitState::AwaitConnection, Event::ServiceReply { .. }) => {
                debug!("Ignoring {} while awaiting connection", event.kind());
                Ok(Flow::Continue)
            }
            (SubmitState::AwaitConnection, Event::MessageSent { .. }) => {
                Err(self.unexpected(&event))
            }

            (SubmitState::AwaitConfirmation, Event::MessageSent { id }) => {
                info!("Service request {} sent", id);
                Ok(self.terminate())
            }
            (SubmitState::AwaitConfirmation, Event::ConnectionStatus { connected: false }) => {
                warn!("Disconnected before the service request was confirmed");
                Ok(self.terminate())
            }
            (SubmitState::AwaitConfirmation, Event::ConnectionStatus { connected: true }) => {
                debug!("Reconnected, service request already submitted");
                Ok(Flow::Continue)
            }
            (SubmitState::AwaitConfirmation, Event::MessageReceived)
            | (SubmitState::AwaitConfirmation, Event::ServiceReply { .. }) => {
                Err(self.unexpected(&event))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_encoded_once_up_front() {
        let request = ServiceRequest::from_hex("cafe").unwrap();
        let submitter = Submitter::new(
            sender_account(),
            zcash_service(),
            &request,
            &RequestEncoder::new(),
        )
        .unwrap();

        assert_eq!(submitter.state(), SubmitState::AwaitConnection);
        assert_eq!(submitter.payload(), br#"{"Version":0,"Tx":"cafe"}"#);
    }

    #[test]
    fn test_fixed_endpoints() {
        assert_eq!(sender_account().address(), "anonymous@provider2");
        assert_eq!(zcash_service().to_string(), "zcash@zcash1");
    }
}
