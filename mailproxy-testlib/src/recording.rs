use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use mailproxy_clients::{Event, MessageId};
use mailproxy_clients::account::Account;
use mailproxy_clients::proxy::{Envelope, MailProxy, ProxyError, ServiceAddress};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A call made to a [`RecordingProxy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyCall {
    ReceivePop {
        account: Account,
    },
    SendMessage {
        sender: Account,
        recipient: String,
        payload: Vec<u8>,
    },
    SendKaetzchenRequest {
        sender: Account,
        service: ServiceAddress,
        payload: Vec<u8>,
        want_response: bool,
    },
}

/// In-memory proxy.
///
/// `receive_pop` serves the scripted inbox front to back; an exhausted
/// inbox is rejected the way the daemon rejects an empty queue. Calls made
/// after shutdown fail with [`ProxyError::Shutdown`] but are still
/// recorded. A stream taken from [`RecordingProxy::event_stream`] closes on
/// shutdown, like the real client's.
#[derive(Default)]
pub struct RecordingProxy {
    inbox: Mutex<VecDeque<Result<Vec<u8>, String>>>,
    calls: Mutex<Vec<ProxyCall>>,
    fail_sends: AtomicBool,
    next_id: AtomicU64,
    shutdowns: AtomicUsize,
    stopped: AtomicBool,
    stop: CancellationToken,
    events: Mutex<Option<mpsc::UnboundedSender<Event>>>,
}

impl RecordingProxy {
    pub fn new() -> Self {
        Self::default()
    }

    /// An event stream that yields `events`, stays open for further
    /// [`RecordingProxy::emit`] calls and closes when the proxy shuts down.
    pub fn event_stream(
        &self,
        events: impl IntoIterator<Item = Event>,
    ) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        for event in events {
            let _ = tx.send(event);
        }
        if !self.stopped.load(Ordering::SeqCst) {
            *self.lock_events() = Some(tx);
        }
        rx
    }

    /// Deliver `event` on the stream from [`RecordingProxy::event_stream`].
    pub fn emit(&self, event: Event) {
        if let Some(tx) = self.lock_events().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// Queue a message for `receive_pop`.
    pub fn push_message(&self, payload: impl Into<Vec<u8>>) {
        self.lock_inbox().push_back(Ok(payload.into()));
    }

    /// Make the next unserved `receive_pop` fail with `message`.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.lock_inbox().push_back(Err(message.into()));
    }

    /// Make `send_message` and `send_kaetzchen_request` fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ProxyCall> {
        self.lock_calls().clone()
    }

    pub fn pops(&self) -> usize {
        self.lock_calls()
            .iter()
            .filter(|call| matches!(call, ProxyCall::ReceivePop { .. }))
            .count()
    }

    /// `(recipient, payload)` of every `send_message` call.
    pub fn sent_messages(&self) -> Vec<(String, Vec<u8>)> {
        self.lock_calls()
            .iter()
            .filter_map(|call| match call {
                ProxyCall::SendMessage {
                    recipient, payload, ..
                } => Some((recipient.clone(), payload.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn service_requests(&self) -> Vec<ProxyCall> {
        self.lock_calls()
            .iter()
            .filter(|call| matches!(call, ProxyCall::SendKaetzchenRequest { .. }))
            .cloned()
            .collect()
    }

    /// Number of shutdowns that actually took effect.
    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.stop.is_cancelled()
    }

    fn record(&self, call: ProxyCall) -> Result<(), ProxyError> {
        self.lock_calls().push(call);
        if self.stop.is_cancelled() {
            return Err(ProxyError::Shutdown);
        }
        Ok(())
    }

    fn send_result(&self) -> Result<MessageId, ProxyError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ProxyError::Rejected("send failed".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MessageId::new(format!("msg-{id}")))
    }

    fn lock_inbox(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<Vec<u8>, String>>> {
        self.inbox.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_events(&self) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedSender<Event>>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<ProxyCall>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MailProxy for RecordingProxy {
    fn shutdown(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            self.lock_events().take();
            self.stop.cancel();
        }
    }

    async fn wait(&self) {
        self.stop.cancelled().await
    }

    async fn receive_pop(&self, account: &Account) -> Result<Envelope, ProxyError> {
        self.record(ProxyCall::ReceivePop {
            account: account.clone(),
        })?;
        let next = self.lock_inbox().pop_front();
        match next {
            Some(Ok(payload)) => Ok(Envelope { payload }),
            Some(Err(message)) => Err(ProxyError::Rejected(message)),
            None => Err(ProxyError::Rejected("receive queue is empty".into())),
        }
    }

    async fn send_message(
        &self,
        sender: &Account,
        recipient: &str,
        payload: Vec<u8>,
    ) -> Result<MessageId, ProxyError> {
        self.record(ProxyCall::SendMessage {
            sender: sender.clone(),
            recipient: recipient.to_string(),
            payload,
        })?;
        self.send_result()
    }

    async fn send_kaetzchen_request(
        &self,
        sender: &Account,
        service: &ServiceAddress,
        payload: Vec<u8>,
        want_response: bool,
    ) -> Result<MessageId, ProxyError> {
        self.record(ProxyCall::SendKaetzchenRequest {
            sender: sender.clone(),
            service: service.clone(),
            payload,
            want_response,
        })?;
        self.send_result()
    }
}
