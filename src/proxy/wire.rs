//! Control socket protocol spoken with the proxy daemon.
//!
//! Every message is a single JSON object on its own line.
//!
//! ```text
//! client → daemon   {"id":1,"method":"receive_pop","params":{"account":"alice@provider1"}}
//! daemon → client   {"id":1,"result":{"payload":[...]}}
//! daemon → client   {"id":2,"error":"receive queue is empty"}
//! daemon → client   {"event":{"type":"message_received"}}
//! ```
//!
//! Replies carry the `id` of the request they answer; events carry no id
//! and arrive in the order the daemon emits them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// A request line sent to the daemon.
#[derive(Debug, Serialize)]
pub struct Request {
    pub id: u64,

    #[serde(flatten)]
    pub call: Call,
}

/// The operation requested, with its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Call {
    GenerateKeys {
        accounts: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data_dir: Option<PathBuf>,
    },
    ReceivePop {
        account: String,
    },
    SendMessage {
        sender: String,
        recipient: String,
        payload: Vec<u8>,
    },
    SendKaetzchenRequest {
        sender: String,
        service: String,
        provider: String,
        payload: Vec<u8>,
        want_response: bool,
    },
}

/// A line received from the daemon.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Incoming {
    Reply {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Event {
        event: Event,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MessageId;
    use assert_matches::assert_matches;
    use expect_test::expect;

    #[test]
    fn test_request_line() {
        let request = Request {
            id: 7,
            call: Call::ReceivePop {
                account: "alice@provider1".to_string(),
            },
        };

        expect![[r#"{"id":7,"method":"receive_pop","params":{"account":"alice@provider1"}}"#]]
            .assert_eq(&serde_json::to_string(&request).unwrap());
    }

    #[test]
    fn test_kaetzchen_request_line() {
        let request = Request {
            id: 1,
            call: Call::SendKaetzchenRequest {
                sender: "anonymous@provider2".to_string(),
                service: "zcash".to_string(),
                provider: "zcash1".to_string(),
                payload: b"{}".to_vec(),
                want_response: false,
            },
        };

        expect![[r#"{"id":1,"method":"send_kaetzchen_request","params":{"sender":"anonymous@provider2","service":"zcash","provider":"zcash1","payload":[123,125],"want_response":false}}"#]]
            .assert_eq(&serde_json::to_string(&request).unwrap());
    }

    #[test]
    fn test_incoming_reply_and_error() {
        let ok: Incoming = serde_json::from_str(r#"{"id":3,"result":"abc"}"#).unwrap();
        assert_matches!(ok, Incoming::Reply { id: 3, result: Some(_), error: None });

        let err: Incoming = serde_json::from_str(r#"{"id":4,"error":"queue empty"}"#).unwrap();
        assert_matches!(err, Incoming::Reply { id: 4, result: None, error: Some(msg) } if msg == "queue empty");
    }

    #[test]
    fn test_incoming_event() {
        let line = r#"{"event":{"type":"message_sent","id":"m-1"}}"#;
        let incoming: Incoming = serde_json::from_str(line).unwrap();
        assert_matches!(
            incoming,
            Incoming::Event { event: Event::MessageSent { id } } if id == MessageId::new("m-1")
        );
    }

    #[test]
    fn test_incoming_garbage() {
        assert!(serde_json::from_str::<Incoming>(r#"{"hello":"world"}"#).is_err());
        assert!(serde_json::from_str::<Incoming>(r#"{"event":{"type":"bogus"}}"#).is_err());
    }
}
