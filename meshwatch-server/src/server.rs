//! Live subscriber server.
//!
//! Each TCP connection is one viewer. The server writes one JSON
//! [`Message`](meshwatch_core::Message) per line, starting with the full
//! state, and reads command lines back from the viewer.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use meshwatch_core::{Aggregator, Command, CommandError, CommandResponse, Message, SubscriberId};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::source::{not_connected, CommandLink};

/// Pause after a failed accept, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts viewer connections and streams updates to them.
#[derive(Debug)]
pub struct SubscriberServer {
    listener: TcpListener,
    aggregator: Aggregator,
    commands: Option<CommandLink>,
    write_timeout: Duration,
}

impl SubscriberServer {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        aggregator: Aggregator,
        write_timeout: Duration,
    ) -> std::io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
            aggregator,
            commands: None,
            write_timeout,
        })
    }

    /// Forward viewer commands through `link`.
    pub fn with_commands(mut self, link: Option<CommandLink>) -> Self {
        self.commands = link;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept viewers indefinitely. Accept errors are logged and retried.
    pub async fn serve(self) -> std::io::Result<()> {
        let addr = self.listener.local_addr()?;
        tracing::info!(%addr, "subscriber server listening");

        loop {
            let (stream, peer) = accept_with_backoff(|| self.listener.accept()).await;
            let aggregator = self.aggregator.clone();
            let commands = self.commands.clone();
            let write_timeout = self.write_timeout;

            tokio::spawn(async move {
                handle_connection(stream, peer, aggregator, commands, write_timeout).await;
            });
        }
    }

    /// Serve on a background task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.serve().await {
                tracing::error!(error = %e, "subscriber server stopped");
            }
        })
    }
}

/// Retry `accept` until it yields a connection.
async fn accept_with_backoff<F, Fut, T>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(conn) => return conn,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    aggregator: Aggregator,
    commands: Option<CommandLink>,
    write_timeout: Duration,
) {
    let mut subscription = aggregator.subscribe();
    let id = subscription.id();
    tracing::info!(%peer, subscriber = %id, "viewer connected");

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            message = subscription.recv() => {
                let Some(message) = message else {
                    break;
                };
                if let Err(e) = write_message(&mut writer, &message, write_timeout).await {
                    tracing::info!(%peer, subscriber = %id, error = %e, "viewer write failed");
                    break;
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_command(&aggregator, id, commands.as_ref(), &line),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(%peer, subscriber = %id, error = %e, "viewer read failed");
                    break;
                }
            }
        }
    }

    aggregator.unsubscribe(id);
    tracing::info!(%peer, subscriber = %id, "viewer disconnected");
}

/// Write one message as a JSON line, giving up after `timeout`.
async fn write_message<W>(writer: &mut W, message: &Message, timeout: Duration) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');

    match tokio::time::timeout(timeout, writer.write_all(&bytes)).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "write timed out",
        )),
    }
}

fn handle_command(
    aggregator: &Aggregator,
    id: SubscriberId,
    commands: Option<&CommandLink>,
    line: &str,
) {
    let response = match Command::parse_line(line) {
        Ok(command) => {
            tracing::info!(subscriber = %id, command = command.name(), "command received");
            match commands {
                Some(link) => link.submit(&command),
                None => not_connected(&command),
            }
        }
        Err(CommandError::NotACommand) => {
            tracing::debug!(subscriber = %id, "ignoring viewer input");
            return;
        }
        Err(CommandError::Unknown(name)) => {
            CommandResponse::failed(name.clone(), format!("Unknown command: {name}"))
        }
        Err(e @ CommandError::OutOfRange { .. }) => CommandResponse::failed("settime", e.to_string()),
    };

    aggregator.respond(id, response);
}
