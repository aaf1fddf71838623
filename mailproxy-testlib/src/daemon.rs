use anyhow::{Context, Result, bail};
use mailproxy_clients::Event;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::TIMEOUT;

/// The daemon side of the control socket, bound to an ephemeral local port.
pub struct FakeDaemon {
    listener: TcpListener,
    address: String,
}

impl FakeDaemon {
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?.to_string();
        Ok(Self { listener, address })
    }

    /// `host:port` to put in the client's configuration.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Wait for the client to connect.
    pub async fn accept(&self) -> Result<DaemonConnection> {
        let (stream, _) = tokio::time::timeout(TIMEOUT, self.listener.accept())
            .await
            .context("timed out waiting for the client to connect")??;
        Ok(DaemonConnection::new(stream))
    }
}

/// A request line as the daemon sees it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRequest {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// One accepted client connection.
pub struct DaemonConnection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl DaemonConnection {
    fn new(stream: TcpStream) -> Self {
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    /// Read the next request the client sent.
    pub async fn next_request(&mut self) -> Result<RawRequest> {
        let line = tokio::time::timeout(TIMEOUT, self.lines.next_line())
            .await
            .context("timed out waiting for a request")??;
        let Some(line) = line else {
            bail!("client closed the connection");
        };
        serde_json::from_str(&line).with_context(|| format!("bad request line: {line}"))
    }

    pub async fn reply(&mut self, id: u64, result: Value) -> Result<()> {
        self.send_value(json!({ "id": id, "result": result })).await
    }

    pub async fn reject(&mut self, id: u64, message: &str) -> Result<()> {
        self.send_value(json!({ "id": id, "error": message })).await
    }

    pub async fn push_event(&mut self, event: &Event) -> Result<()> {
        self.send_value(json!({ "event": event })).await
    }

    /// Write `line` verbatim, followed by a newline.
    pub async fn send_raw(&mut self, line: &str) -> Result<()> {
        self.send_raw_bytes(line.as_bytes()).await
    }

    /// Write `line` verbatim, followed by a newline. `line` need not be
    /// UTF-8.
    pub async fn send_raw_bytes(&mut self, line: &[u8]) -> Result<()> {
        self.writer.write_all(line).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Hang up on the client.
    pub async fn close(mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    async fn send_value(&mut self, value: Value) -> Result<()> {
        self.send_raw(&value.to_string()).await
    }
}
