//! Server network layer handling TCP connections and the event loop

use crate::client_manager::ClientId;
use crate::config::ServerConfig;
use crate::lobby::Lobby;
use crate::outbox::Outbox;
use log::{debug, error, info, warn};
use shared::line::{Frame, LineBuffer};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

const READ_CHUNK: usize = 1024;

/// Messages sent from connection tasks to the main server loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Line { client_id: ClientId, line: String },
    Overlong { client_id: ClientId },
    Closed { client_id: ClientId },
    Shutdown,
}

/// Task handles and outbound queue of one open connection
struct Connection {
    sender: mpsc::Sender<String>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Main server coordinating connections and the lobby
pub struct Server {
    listener: TcpListener,
    lobby: Lobby,
    connections: HashMap<ClientId, Connection>,
    outbound_capacity: usize,

    // Communication channels
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    pub async fn bind(config: &ServerConfig, lobby: Lobby) -> io::Result<Self> {
        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            lobby,
            connections: HashMap::new(),
            outbound_capacity: config.outbound_capacity.max(1),
            event_tx,
            event_rx,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn lobby(&self) -> &Lobby {
        &self.lobby
    }

    /// Sender that can stop the loop with [`ServerEvent::Shutdown`]
    pub fn events(&self) -> mpsc::UnboundedSender<ServerEvent> {
        self.event_tx.clone()
    }

    /// Main server loop: accepts connections and processes their lines one
    /// at a time until shut down.
    pub async fn run(&mut self) -> io::Result<()> {
        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.handle_accept(stream, addr),
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                },

                event = self.event_rx.recv() => {
                    match event {
                        Some(ServerEvent::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                        Some(event) => self.handle_event(event),
                    }
                },
            }
        }

        for (_, connection) in self.connections.drain() {
            connection.reader.abort();
        }
        Ok(())
    }

    fn handle_accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        let mut out = Outbox::new();
        let Some(client_id) = self.lobby.connect(addr, &mut out) else {
            warn!("Rejecting connection from {}: server full", addr);
            tokio::spawn(reject(stream));
            return;
        };

        let (read_half, write_half) = stream.into_split();
        let (sender, receiver) = mpsc::channel(self.outbound_capacity);
        let reader = tokio::spawn(read_lines(client_id, read_half, self.event_tx.clone()));
        let writer = tokio::spawn(write_lines(write_half, receiver));

        self.connections.insert(
            client_id,
            Connection {
                sender,
                reader,
                writer,
            },
        );
        self.deliver(out);
    }

    fn handle_event(&mut self, event: ServerEvent) {
        let mut out = Outbox::new();

        match event {
            ServerEvent::Line { client_id, line } => {
                debug!("Client {} <- {:?}", client_id, line);
                self.lobby.handle_line(client_id, &line, &mut out);
            }
            ServerEvent::Overlong { client_id } => {
                warn!("Client {} exceeded the line length limit", client_id);
                self.lobby.reject_overlong(client_id, &mut out);
            }
            ServerEvent::Closed { client_id } => {
                self.connections.remove(&client_id);
                self.lobby.disconnect(client_id, &mut out);
            }
            ServerEvent::Shutdown => {}
        }

        self.deliver(out);
    }

    /// Hands queued lines to the writer tasks. A client whose queue is full
    /// or gone is torn down, which may queue more lines for others.
    fn deliver(&mut self, mut out: Outbox) {
        loop {
            let mut stalled: Vec<ClientId> = Vec::new();

            for (client_id, line) in out.take_messages() {
                if stalled.contains(&client_id) {
                    continue;
                }
                let Some(connection) = self.connections.get(&client_id) else {
                    continue;
                };
                match connection.sender.try_send(line) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("Client {} is not reading, dropping it", client_id);
                        stalled.push(client_id);
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("Client {} writer already gone", client_id);
                        stalled.push(client_id);
                    }
                }
            }

            // Requested closes keep the writer alive so queued lines flush
            for client_id in out.take_closing() {
                if let Some(connection) = self.connections.remove(&client_id) {
                    info!("Closing connection of client {}", client_id);
                    connection.reader.abort();
                }
            }

            if stalled.is_empty() {
                break;
            }
            for client_id in stalled {
                if let Some(connection) = self.connections.remove(&client_id) {
                    connection.reader.abort();
                    connection.writer.abort();
                }
                self.lobby.disconnect(client_id, &mut out);
            }
        }
    }
}

/// Tells a client there is no room and closes the socket
async fn reject(mut stream: TcpStream) {
    if let Err(e) = stream.write_all(b"Server full\n").await {
        debug!("Failed to send rejection: {}", e);
    }
    if let Err(e) = stream.shutdown().await {
        debug!("Failed to close rejected connection: {}", e);
    }
}

/// Frames incoming bytes into lines and forwards them to the main loop.
/// Always ends with a [`ServerEvent::Closed`] for this client.
pub async fn read_lines<R>(
    client_id: ClientId,
    mut reader: R,
    events: mpsc::UnboundedSender<ServerEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut framer = LineBuffer::default();
    let mut buffer = [0u8; READ_CHUNK];

    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(len) => {
                for frame in framer.push(&buffer[..len]) {
                    let event = match frame {
                        Frame::Line(line) => ServerEvent::Line { client_id, line },
                        Frame::Overlong => ServerEvent::Overlong { client_id },
                    };
                    if events.send(event).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                debug!("Error reading from client {}: {}", client_id, e);
                break;
            }
        }
    }

    if framer.buffered() > 0 {
        debug!(
            "Client {} closed with {} unterminated bytes",
            client_id,
            framer.buffered()
        );
    }
    if let Err(e) = events.send(ServerEvent::Closed { client_id }) {
        debug!("Main loop gone before close of client {}: {}", client_id, e);
    }
}

/// Writes each queued line followed by `\n`, then shuts the stream down
/// once the queue is closed.
pub async fn write_lines<W>(mut writer: W, mut lines: mpsc::Receiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(mut line) = lines.recv().await {
        line.push('\n');
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            debug!("Failed to write to client: {}", e);
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Failed to shut down connection: {}", e);
    }
}
