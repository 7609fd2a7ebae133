use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{debug, info, warn};

use crate::{
    registry::Registry,
    session::{Session, SessionEnd, run_session, run_writer},
};

pub struct Server {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl Server {
    pub fn new(listener: TcpListener) -> Self {
        Self {
            listener,
            registry: Arc::new(Registry::new()),
        }
    }

    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Ok(Self::new(listener))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared handle to the live-session registry.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// Sessions that are already running keep going after the listener stops.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, registry } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    let live = registry.len().await;
                    info!(live, "server no longer accepting connections");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &registry).await;
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

async fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    registry: &Arc<Registry>,
) {
    match result {
        Ok((stream, peer)) => start_session(stream, peer, registry).await,
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

/// Registers a session for `stream` and spawns its reader and writer tasks.
async fn start_session(stream: TcpStream, peer: SocketAddr, registry: &Arc<Registry>) {
    let (reader, writer) = stream.into_split();
    let (session, queue) = Session::new(registry.next_id(), Some(peer));
    let session = Arc::new(session);

    tokio::spawn(run_writer(session.id(), writer, queue));
    registry.register(Arc::clone(&session)).await;
    debug!(session = session.id(), %peer, "accepted connection");

    let registry = Arc::clone(registry);
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let result = run_session(&session, &mut reader, &registry).await;
        registry.unregister(session.id()).await;

        let login = session.login().unwrap_or("<pending>");
        match result {
            Ok(SessionEnd::Exited) => info!(session = session.id(), %peer, login, "client left"),
            Ok(SessionEnd::Disconnected) => {
                info!(session = session.id(), %peer, login, "client disconnected")
            }
            Err(error) => warn!(
                session = session.id(),
                %peer,
                login,
                error = ?error,
                "client connection closed with error"
            ),
        }
    });
}
