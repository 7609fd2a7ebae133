use std::{net::SocketAddr, sync::OnceLock};

use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tracing::{debug, info, warn};

use crate::{
    frame::{EXIT_TOKEN, FrameError, read_frame, write_frame},
    registry::Registry,
};

pub type SessionId = u64;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("session {0} is no longer accepting messages")]
    Closed(SessionId),
}

/// Server-side state for one connected client.
///
/// The socket's write half belongs to the writer task started with
/// [`run_writer`]; everyone else reaches it through [`Session::send_message`],
/// which queues the message so frames from concurrent senders never
/// interleave on the wire.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    peer: Option<SocketAddr>,
    login: OnceLock<String>,
    outbound: mpsc::UnboundedSender<String>,
}

impl Session {
    pub fn new(
        id: SessionId,
        peer: Option<SocketAddr>,
    ) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (outbound, queue) = mpsc::unbounded_channel();
        let session = Self {
            id,
            peer,
            login: OnceLock::new(),
            outbound,
        };
        (session, queue)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Login announced by the client, once the session is active.
    pub fn login(&self) -> Option<&str> {
        self.login.get().map(String::as_str)
    }

    pub(crate) fn set_login(&self, login: String) {
        if self.login.set(login).is_err() {
            warn!(session = self.id, "login already assigned; ignoring");
        }
    }

    /// Queues `message` for delivery to this client. Empty messages are dropped.
    pub fn send_message(&self, message: &str) -> Result<(), SendError> {
        if message.is_empty() {
            return Ok(());
        }
        self.outbound
            .send(message.to_string())
            .map_err(|_| SendError::Closed(self.id))
    }
}

/// Why a session's read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent the exit token.
    Exited,
    /// The client closed the connection without saying goodbye.
    Disconnected,
}

pub fn joined_notice(login: &str) -> String {
    format!("{login} joined the conversation")
}

pub fn left_notice(login: &str) -> String {
    format!("{login} left the conversation")
}

pub fn tagged_message(login: &str, text: &str) -> String {
    format!("{login}: \t{text}")
}

/// Drives one session from login to termination.
///
/// The first frame is the login and is never broadcast as chat. Every frame
/// after that is tagged with the login and fanned out to the other sessions
/// until the client sends [`EXIT_TOKEN`] or the stream ends. Unregistering
/// the session is left to the caller.
pub async fn run_session<R>(
    session: &Session,
    reader: &mut R,
    registry: &Registry,
) -> Result<SessionEnd, FrameError>
where
    R: AsyncRead + Unpin,
{
    let Some(login) = read_frame(reader).await? else {
        return Ok(SessionEnd::Disconnected);
    };

    info!(session = session.id(), peer = ?session.peer(), %login, "client connected");
    registry.broadcast(session.id(), &joined_notice(&login)).await;
    // Set after the join notice is queued: a session with a login has always
    // announced itself.
    session.set_login(login.clone());

    loop {
        let Some(frame) = read_frame(reader).await? else {
            return Ok(SessionEnd::Disconnected);
        };

        if frame == EXIT_TOKEN {
            registry.broadcast(session.id(), &left_notice(&login)).await;
            return Ok(SessionEnd::Exited);
        }

        registry
            .broadcast(session.id(), &tagged_message(&login, &frame))
            .await;
    }
}

/// Writes every queued message to `writer` as one frame.
///
/// Stops on the first write failure, which closes the queue and makes later
/// [`Session::send_message`] calls fail. When the queue is closed by the
/// other side, the write half is shut down so the client sees end of stream.
pub async fn run_writer<W>(
    id: SessionId,
    mut writer: W,
    mut queue: mpsc::UnboundedReceiver<String>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = queue.recv().await {
        match write_frame(&mut writer, &message).await {
            Ok(()) => {}
            Err(FrameError::TooLong { len }) => {
                warn!(session = id, len, "dropping message that does not fit in a frame");
            }
            Err(error) => {
                debug!(session = id, ?error, "failed to deliver message to client");
                return;
            }
        }
    }

    if let Err(error) = writer.shutdown().await {
        debug!(session = id, ?error, "failed to shut down client writer cleanly");
    }
}
