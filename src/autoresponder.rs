//! Autoresponder (`pong`).
//!
//! Every `MessageReceived` event is answered the same way:
//!
//! 1. pop the oldest message from the account's receive queue
//! 2. parse it as IMF and pull the bare address out of its `From` header
//! 3. compose the fixed reply and send it back to that address
//!
//! Any step can fail for a single message (empty queue, garbage payload,
//! odd sender header, transport error). Failures are logged and the loop
//! carries on with the next event; nothing is retried, since the message
//! has already been popped from the queue.

use chrono::{DateTime, Utc};
use mail_builder::MessageBuilder;
use mail_builder::headers::date::Date;
use mailparse::MailHeaderMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::account::Account;
use crate::address::{AddressFormatError, extract_address};
use crate::dispatcher::{EventHandler, Flow, ProtocolError};
use crate::event::{Event, MessageId};
use crate::proxy::{MailProxy, ProxyError};

pub const REPLY_SUBJECT: &str = "important announcement";
pub const REPLY_BODY: &str = "the quick brown fox jumped\nover the lazy brown dog";

/// Reasons a single inbound message goes unanswered.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("ReceivePop error: {0}")]
    Fetch(#[source] ProxyError),

    #[error("IMF parse error: {0}")]
    Parse(#[from] mailparse::MailParseError),

    #[error(transparent)]
    Address(#[from] AddressFormatError),

    #[error("sender address {0:?} contains control characters")]
    InvalidRecipient(String),

    #[error("failed to compose reply: {0}")]
    Compose(#[source] std::io::Error),

    #[error("SendMessage error: {0}")]
    Send(#[source] ProxyError),
}

/// Answers every message received by `account`.
pub struct Autoresponder {
    account: Account,
}

impl Autoresponder {
    pub fn new(account: Account) -> Self {
        Self { account }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Fetch, parse, compose and send for one `MessageReceived` event.
    pub async fn respond<P: MailProxy>(&self, proxy: &P) -> Result<MessageId, ReplyError> {
        let envelope = proxy
            .receive_pop(&self.account)
            .await
            .map_err(ReplyError::Fetch)?;

        let recipient = reply_recipient(&envelope.payload)?;
        info!("Sender is {}", recipient);

        let reply = compose_reply(&self.account, &recipient, Utc::now())?;

        proxy
            .send_message(&self.account, &recipient, reply)
            .await
            .map_err(ReplyError::Send)
    }
}

impl<P: MailProxy> EventHandler<P> for Autoresponder {
    async fn handle_event(&mut self, proxy: &P, event: Event) -> Result<Flow, ProtocolError> {
        match event {
            Event::ConnectionStatus { connected } => {
                debug!(connected, "connection status changed");
            }
            Event::MessageSent { id } => {
                debug!(%id, "message left the proxy");
            }
            Event::MessageReceived => match self.respond(proxy).await {
                Ok(id) => info!("Replied with message ID: {}", id),
                Err(e) => warn!("Not replying: {}", e),
            },
            Event::ServiceReply { payload } => {
                info!(
                    "Service reply payload: {}",
                    String::from_utf8_lossy(&payload)
                );
            }
        }

        Ok(Flow::Continue)
    }
}

/// The bare address to reply to, taken from the `From` header of `payload`.
///
/// A message without a `From` header is treated like an empty one. The
/// header is used as written, without decoding encoded-words.
pub fn reply_recipient(payload: &[u8]) -> Result<String, ReplyError> {
    let message = mailparse::parse_mail(payload)?;
    let sender = message
        .headers
        .get_first_header("from")
        .map(|header| String::from_utf8_lossy(header.get_value_raw()).into_owned())
        .unwrap_or_default();

    let address = extract_address(&sender)?;
    if address.chars().any(char::is_control) {
        return Err(ReplyError::InvalidRecipient(address.to_string()));
    }
    Ok(address.to_string())
}

/// Build the fixed reply from `account` to `recipient`, dated `date`.
pub fn compose_reply(
    account: &Account,
    recipient: &str,
    date: DateTime<Utc>,
) -> Result<Vec<u8>, ReplyError> {
    let from = account.address();

    MessageBuilder::new()
        .from(from.as_str())
        .to(recipient)
        .subject(REPLY_SUBJECT)
        .date(Date::new(date.timestamp()))
        .text_body(REPLY_BODY)
        .write_to_vec()
        .map_err(ReplyError::Compose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use indoc::indoc;

    fn header(message: &mailparse::ParsedMail<'_>, name: &str) -> String {
        message.headers.get_first_value(name).unwrap()
    }

    #[test]
    fn test_reply_recipient() {
        let payload = indoc! {"
            From: Bob <bob@provider2>
            To: alice@provider1
            Subject: ping

            hello
        "};
        assert_eq!(reply_recipient(payload.as_bytes()).unwrap(), "bob@provider2");
    }

    #[test]
    fn test_reply_recipient_ignores_encoded_words() {
        // Decoded, the display name would add a second '<' and a line break.
        let payload = "From: =?utf-8?q?a=3Cx=0D=0Ay=3E?= <bob@provider2>\r\n\r\nbody\r\n";
        assert_eq!(reply_recipient(payload.as_bytes()).unwrap(), "bob@provider2");
    }

    #[test]
    fn test_reply_recipient_rejects_control_characters() {
        let payload = "From: <bob\x01@provider2>\r\n\r\nbody\r\n";
        assert_matches!(
            reply_recipient(payload.as_bytes()),
            Err(ReplyError::InvalidRecipient(address)) if address == "bob\u{1}@provider2"
        );
    }

    #[test]
    fn test_reply_recipient_header_case() {
        let payload = "fRoM: <carol@provider3>\r\n\r\nbody\r\n";
        assert_eq!(reply_recipient(payload.as_bytes()).unwrap(), "carol@provider3");
    }

    #[test]
    fn test_reply_recipient_without_from() {
        let payload = "Subject: anonymous\r\n\r\nbody\r\n";
        assert_matches!(
            reply_recipient(payload.as_bytes()),
            Err(ReplyError::Address(AddressFormatError::OpeningBracket(_)))
        );
    }

    #[test]
    fn test_reply_recipient_bare_address() {
        let payload = "From: bob@provider2\r\n\r\nbody\r\n";
        assert_matches!(
            reply_recipient(payload.as_bytes()),
            Err(ReplyError::Address(_))
        );
    }

    #[test]
    fn test_compose_reply() {
        let account = Account::new("alice", "provider1");
        let date = Utc.with_ymd_and_hms(2018, 3, 1, 12, 30, 0).unwrap();

        let reply = compose_reply(&account, "bob@provider2", date).unwrap();
        let message = mailparse::parse_mail(&reply).unwrap();

        assert_eq!(extract_address(&header(&message, "From")), Ok("alice@provider1"));
        assert_eq!(extract_address(&header(&message, "To")), Ok("bob@provider2"));
        assert_eq!(header(&message, "Subject"), REPLY_SUBJECT);
        assert_eq!(
            mailparse::dateparse(&header(&message, "Date")).unwrap(),
            date.timestamp()
        );

        let body = message.get_body().unwrap().replace("\r\n", "\n");
        assert_eq!(body.trim_end(), REPLY_BODY);
    }

    #[test]
    fn test_compose_reply_is_deterministic_in_content() {
        let account = Account::new("alice", "provider1");
        let date = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

        let first = compose_reply(&account, "bob@provider2", date).unwrap();
        let second = compose_reply(&account, "bob@provider2", date).unwrap();
        let first = mailparse::parse_mail(&first).unwrap();
        let second = mailparse::parse_mail(&second).unwrap();

        for name in ["From", "To", "Subject", "Date"] {
            assert_eq!(header(&first, name), header(&second, name), "{name}");
        }
        assert_eq!(first.get_body().unwrap(), second.get_body().unwrap());
    }
}
