//! TCP client for the proxy daemon's control socket.
//!
//! One connection carries both request/reply traffic and the event stream.
//! Two background tasks own the halves of the connection:
//!
//! - the writer drains an unbounded queue of encoded request lines;
//! - the reader routes replies to the caller waiting on that request id and
//!   forwards events, in arrival order, to the event channel.
//!
//! Replies and events never block each other, so a handler may await a
//! request while further events pile up in the channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::wire::{Call, Incoming, Request};
use super::{Envelope, MailProxy, ProxyError, ServiceAddress, SpawnError};
use crate::account::Account;
use crate::config::Config;
use crate::event::{Event, MessageId};

type ReplyTx = oneshot::Sender<Result<serde_json::Value, ProxyError>>;
type PendingMap = Arc<Mutex<HashMap<u64, ReplyTx>>>;

const CONNECT_ATTEMPTS: u32 = 10;

/// Handle to a connected proxy daemon.
pub struct ProxyClient {
    next_id: AtomicU64,
    outgoing: mpsc::UnboundedSender<String>,
    pending: PendingMap,
    stop: CancellationToken,
    stopped: AtomicBool,
}

impl ProxyClient {
    /// Connect to the daemon named in `config`.
    ///
    /// With `generate_only` set, the daemon is asked to generate keys for
    /// every configured account and [`SpawnError::GenerateOnly`] is
    /// returned once it has done so.
    pub async fn spawn(
        config: &Config,
        generate_only: bool,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Event>), SpawnError> {
        let address = config.proxy.address.as_str();
        let stream = connect_with_retry(address)
            .await
            .map_err(|source| SpawnError::Connect {
                address: address.to_string(),
                source,
            })?;
        let (client, events) = Self::from_stream(stream);

        if generate_only {
            let accounts = config.accounts.iter().map(Account::address).collect();
            client
                .call(Call::GenerateKeys {
                    accounts,
                    data_dir: config.proxy.data_dir.clone(),
                })
                .await?;
            info!("Generated keys for {} account(s)", config.accounts.len());
            client.shutdown();
            return Err(SpawnError::GenerateOnly);
        }

        Ok((client, events))
    }

    /// Run the client over an already established connection.
    pub fn from_stream<S>(stream: S) -> (Self, mpsc::UnboundedReceiver<Event>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pending: PendingMap = Default::default();
        let stop = CancellationToken::new();

        tokio::spawn(write_loop(write_half, outgoing_rx, stop.clone()));
        tokio::spawn(read_loop(read_half, pending.clone(), events_tx, stop.clone()));

        let client = ProxyClient {
            next_id: AtomicU64::new(1),
            outgoing: outgoing_tx,
            pending,
            stop,
            stopped: AtomicBool::new(false),
        };
        (client, events_rx)
    }

    async fn call(&self, call: Call) -> Result<serde_json::Value, ProxyError> {
        if self.stop.is_cancelled() {
            return Err(ProxyError::Shutdown);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&Request { id, call })?;
        debug!(id, "proxy request: {line}");

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().await.insert(id, reply_tx);

        if self.outgoing.send(line).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(ProxyError::ConnectionLost);
        }

        tokio::select! {
            biased;
            reply = reply_rx => reply.map_err(|_| ProxyError::ConnectionLost)?,
            _ = self.stop.cancelled() => {
                self.pending.lock().await.remove(&id);
                Err(ProxyError::Shutdown)
            }
        }
    }

    async fn call_for<T: DeserializeOwned>(&self, call: Call) -> Result<T, ProxyError> {
        let value = self.call(call).await?;
        Ok(serde_json::from_value(value)?)
    }
}

impl MailProxy for ProxyClient {
    fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!("proxy client already shut down");
            return;
        }
        info!("Shutting down proxy client");
        self.stop.cancel();
    }

    async fn wait(&self) {
        self.stop.cancelled().await
    }

    async fn receive_pop(&self, account: &Account) -> Result<Envelope, ProxyError> {
        self.call_for(Call::ReceivePop {
            account: account.address(),
        })
        .await
    }

    async fn send_message(
        &self,
        sender: &Account,
        recipient: &str,
        payload: Vec<u8>,
    ) -> Result<MessageId, ProxyError> {
        self.call_for(Call::SendMessage {
            sender: sender.address(),
            recipient: recipient.to_string(),
            payload,
        })
        .await
    }

    async fn send_kaetzchen_request(
        &self,
        sender: &Account,
        service: &ServiceAddress,
        payload: Vec<u8>,
        want_response: bool,
    ) -> Result<MessageId, ProxyError> {
        self.call_for(Call::SendKaetzchenRequest {
            sender: sender.address(),
            service: service.service.clone(),
            provider: service.provider.clone(),
            payload,
            want_response,
        })
        .await
    }
}

async fn write_loop<W: AsyncWrite>(
    write_half: W,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    stop: CancellationToken,
) {
    tokio::pin!(write_half);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            line = outgoing.recv() => {
                let Some(line) = line else { break };
                let result = async {
                    write_half.write_all(line.as_bytes()).await?;
                    write_half.write_all(b"\n").await?;
                    write_half.flush().await
                }
                .await;

                if let Err(e) = result {
                    warn!("Failed to write to proxy: {}", e);
                    stop.cancel();
                    break;
                }
            }
        }
    }

    let _ = write_half.shutdown().await;
}

async fn read_loop<R: AsyncRead>(
    read_half: R,
    pending: PendingMap,
    events: mpsc::UnboundedSender<Event>,
    stop: CancellationToken,
) {
    let reader = BufReader::new(read_half);
    tokio::pin!(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        tokio::select! {
            _ = stop.cancelled() => break,
            result = reader.read_until(b'\n', &mut line) => {
                match result {
                    Ok(0) => {
                        info!("Proxy closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Failed to read from proxy: {}", e);
                        break;
                    }
                }

                // Invalid UTF-8 is skipped like any other undecodable line.
                let incoming: Incoming = match serde_json::from_slice(&line) {
                    Ok(incoming) => incoming,
                    Err(e) => {
                        warn!(
                            "Skipping undecodable line from proxy: {}: {}",
                            e,
                            String::from_utf8_lossy(&line).trim_end()
                        );
                        continue;
                    }
                };

                match incoming {
                    Incoming::Reply { id, result, error } => {
                        let reply = match error {
                            Some(message) => Err(ProxyError::Rejected(message)),
                            None => Ok(result.unwrap_or(serde_json::Value::Null)),
                        };
                        match pending.lock().await.remove(&id) {
                            Some(reply_tx) => {
                                // The caller may have given up already.
                                let _ = reply_tx.send(reply);
                            }
                            None => warn!(id, "Reply for unknown request"),
                        }
                    }
                    Incoming::Event { event } => {
                        debug!(%event, "proxy event");
                        // Nobody listening any more is not our problem.
                        let _ = events.send(event);
                    }
                }
            }
        }
    }

    // Fails every outstanding request and wakes up `wait`.
    pending.lock().await.clear();
    stop.cancel();
}

/// Connect to the daemon, retrying with exponential backoff.
async fn connect_with_retry(address: &str) -> std::io::Result<TcpStream> {
    let mut attempt = 1;
    let mut retry_delay_ms = 50;

    loop {
        match TcpStream::connect(address).await {
            Ok(stream) => {
                info!("Connected to proxy at {} on attempt {}", address, attempt);
                return Ok(stream);
            }
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                debug!(
                    "Connection attempt {} failed: {}, retrying in {}ms",
                    attempt, e, retry_delay_ms
                );
                tokio::time::sleep(tokio::time::Duration::from_millis(retry_delay_ms)).await;
                retry_delay_ms = (retry_delay_ms * 2).min(1000);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
