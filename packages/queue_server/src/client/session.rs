//! Reconnecting watcher session for one teacher room.
//!
//! Connects to the queue WebSocket, joins the room, and keeps a
//! [`PromotionDriver`] in sync with it. The caller receives [`SessionEvent`]s
//! to render and sends [`SessionCommand`]s for the teacher panel.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use conference_queue::{EntryId, RenderState, TeacherId};

use crate::config::ClientConfig;
use crate::ws::{ClientMessage, ServerMessage};

use super::promoter::PromotionDriver;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("server is unavailable")]
    Unavailable,

    #[error(transparent)]
    WebSocket(#[from] tungstenite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        let is_connect = match &err {
            tungstenite::Error::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => true,
            _ => false,
        };
        if is_connect {
            Self::Unavailable
        } else {
            Self::WebSocket(err)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Reconnecting,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => f.write_str("connected"),
            Self::Disconnected => f.write_str("disconnected"),
            Self::Reconnecting => f.write_str("reconnecting"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Status(ConnectionStatus),
    /// The displayed queue changed.
    Render(RenderState),
    /// Something to tell the teacher that is not a queue change.
    Notice(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Complete,
    Skip,
}

/// Exponential reconnect delay, doubled per failure up to a ceiling.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            next: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

/// Ignores a second teacher action issued too soon after the previous one.
#[derive(Debug, Clone)]
pub struct ActionCooldown {
    window: Duration,
    last: Option<Instant>,
}

impl ActionCooldown {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// True if an action may go out at `now`; records it if so.
    pub fn try_begin(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.duration_since(last) < self.window {
                return false;
            }
        }
        self.last = Some(now);
        true
    }
}

enum ConnectionEnd {
    Cancelled,
    Lost,
}

pub async fn connect(url: &str) -> Result<WsStream, SessionError> {
    let (stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(SessionError::from_tungstenite)?;
    Ok(stream)
}

/// Follow one teacher room until `cancel` fires.
///
/// A lost or refused connection is retried with backoff. Only errors that a
/// retry cannot fix are returned.
pub async fn run_watch_session(
    config: ClientConfig,
    teacher_id: TeacherId,
    mut commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
) -> Result<(), SessionError> {
    let url = config.ws_url();
    let mut driver = PromotionDriver::new(teacher_id.clone(), config.confirm_delay);
    let mut backoff = Backoff::new(config.reconnect_initial, config.reconnect_max);
    let mut cooldown = ActionCooldown::new(config.action_cooldown);

    loop {
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            res = connect(&url) => res,
        };

        match connected {
            Ok(stream) => {
                info!(%url, teacher = %teacher_id, "Connected");
                backoff.reset();
                let _ = events.send(SessionEvent::Status(ConnectionStatus::Connected)).await;

                let end = run_connection(
                    stream,
                    &config,
                    &mut driver,
                    &mut cooldown,
                    &mut commands,
                    &events,
                    &cancel,
                )
                .await?;
                if let ConnectionEnd::Cancelled = end {
                    return Ok(());
                }
                warn!(teacher = %teacher_id, "Connection lost");
                driver.reset_for_reconnect();
                let _ = events
                    .send(SessionEvent::Status(ConnectionStatus::Disconnected))
                    .await;
                // Show the last confirmed queue, not the dropped guess.
                let _ = events.send(SessionEvent::Render(driver.render_state())).await;
            }
            Err(SessionError::Unavailable) => {
                debug!(%url, "Server unavailable");
            }
            Err(err) => return Err(err),
        }

        let delay = backoff.next_delay();
        debug!(delay_ms = delay.as_millis() as u64, "Reconnecting");
        let _ = events
            .send(SessionEvent::Status(ConnectionStatus::Reconnecting))
            .await;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn run_connection(
    stream: WsStream,
    config: &ClientConfig,
    driver: &mut PromotionDriver,
    cooldown: &mut ActionCooldown,
    commands: &mut mpsc::Receiver<SessionCommand>,
    events: &mpsc::Sender<SessionEvent>,
    cancel: &CancellationToken,
) -> Result<ConnectionEnd, SessionError> {
    let (mut ws_write, mut ws_read) = stream.split();

    let join = ClientMessage::JoinRoom {
        teacher_id: driver.teacher_id().clone(),
    };
    if send(&mut ws_write, &join).await.is_err() {
        return Ok(ConnectionEnd::Lost);
    }

    let mut heartbeat = tokio::time::interval_at(
        Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );

    loop {
        let outgoing = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = ws_write.send(tungstenite::Message::Close(None)).await;
                return Ok(ConnectionEnd::Cancelled);
            }

            msg = ws_read.next() => match msg {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(server_msg) => handle_server_message(driver, events, server_msg).await,
                        Err(e) => warn!("Unparseable server message: {}", e),
                    }
                    None
                }
                Some(Ok(tungstenite::Message::Close(_))) | Some(Err(_)) | None => {
                    return Ok(ConnectionEnd::Lost);
                }
                Some(Ok(_)) => None,
            },

            Some(fired) = driver.next_fired() => driver.confirm_due(&fired),

            Some(cmd) = commands.recv() => {
                if cooldown.try_begin(Instant::now()) {
                    Some(teacher_command(driver, cmd))
                } else {
                    debug!(?cmd, "Action ignored during cooldown");
                    None
                }
            }

            _ = heartbeat.tick() => Some(ClientMessage::Heartbeat),
        };

        if let Some(msg) = outgoing {
            if send(&mut ws_write, &msg).await.is_err() {
                return Ok(ConnectionEnd::Lost);
            }
        }
    }
}

async fn handle_server_message(
    driver: &mut PromotionDriver,
    events: &mpsc::Sender<SessionEvent>,
    msg: ServerMessage,
) {
    match &msg {
        ServerMessage::QueueSnapshot { .. } | ServerMessage::PromotionRejected { .. } => {
            if driver.handle_server_message(&msg) {
                let _ = events.send(SessionEvent::Render(driver.render_state())).await;
            }
        }
        ServerMessage::ActionRejected {
            action,
            message,
            nothing_to_do,
            ..
        } => {
            let notice = if *nothing_to_do {
                format!("Nothing to {}: {}", action, message)
            } else {
                format!("Could not {}: {}", action, message)
            };
            let _ = events.send(SessionEvent::Notice(notice)).await;
        }
        ServerMessage::HeartbeatAck { server_time } => {
            trace!(%server_time, "Heartbeat acknowledged");
        }
        ServerMessage::Error { message, .. } => {
            let _ = events.send(SessionEvent::Notice(message.clone())).await;
        }
    }
}

/// Teacher actions name the party the server last reported as current.
fn teacher_command(driver: &PromotionDriver, cmd: SessionCommand) -> ClientMessage {
    let teacher_id = driver.teacher_id().clone();
    let entry_id: Option<EntryId> = driver
        .queue()
        .authoritative()
        .iter()
        .find(|e| e.is_current())
        .map(|e| e.id.clone());
    match cmd {
        SessionCommand::Complete => ClientMessage::Complete {
            teacher_id,
            entry_id,
        },
        SessionCommand::Skip => ClientMessage::Skip {
            teacher_id,
            entry_id,
        },
    }
}

async fn send<S>(sink: &mut S, msg: &ClientMessage) -> Result<(), SessionError>
where
    S: futures::Sink<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(msg)?;
    sink.send(tungstenite::Message::Text(json.into()))
        .await
        .map_err(SessionError::from_tungstenite)
}
