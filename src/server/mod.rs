//! TCP front end for the scheduler.
//!
//! The server accepts connections and hands each one to a
//! [`ConnectionHandler`]. Connections are independent: each has its own
//! queue, tracker and worker pool.
//!
//! # Example
//!
//! ```no_run
//! use queueserve::config::ServerConfig;
//! use queueserve::server::Server;
//!
//! # async fn example() -> Result<(), queueserve::server::ServerError> {
//! let config = ServerConfig::new().with_port(2222).with_once(true);
//! let server = Server::bind(config).await?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod protocol;
pub mod report;

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::ConfigError;
use crate::metrics::export_metrics;

pub use connection::{ConnectionError, ConnectionHandler, SessionReport};
pub use protocol::{Ack, RequestRecord, ResponseRecord, REQUEST_SIZE, RESPONSE_SIZE};
pub use report::{Reporter, REPORT_TARGET};

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("Connection failed: {0}")]
    Connection(#[from] ConnectionError),
}

/// Listening server.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    handler: ConnectionHandler,
    once: bool,
    print_metrics: bool,
}

impl Server {
    /// Validates `config` and binds the listener.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            handler: ConnectionHandler::new(&config),
            once: config.once,
            print_metrics: false,
        })
    }

    /// Log the Prometheus export after every finished session.
    pub fn with_metrics_dump(mut self, enabled: bool) -> Self {
        self.print_metrics = enabled;
        self
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts and serves exactly one connection.
    pub async fn serve_one(&self) -> Result<SessionReport, ServerError> {
        let (stream, peer) = self.listener.accept().await.map_err(ServerError::Accept)?;
        info!(peer = %peer, "Accepted connection");
        let report = self.handler.handle(stream, peer.to_string()).await?;
        self.after_session();
        Ok(report)
    }

    /// Serves connections until interrupted, or until the first connection
    /// ends when configured with `once`.
    pub async fn run(self) -> Result<(), ServerError> {
        if let Ok(addr) = self.local_addr() {
            info!(addr = %addr, once = self.once, "Listening");
        }

        if self.once {
            self.serve_one().await?;
            return Ok(());
        }

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted.map_err(ServerError::Accept)?;
                    info!(peer = %peer, "Accepted connection");
                    self.spawn_session(stream, peer);
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, no longer accepting connections");
                    return Ok(());
                }
            }
        }
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        let handler = self.handler.clone();
        let print_metrics = self.print_metrics;
        tokio::spawn(async move {
            match handler.handle(stream, peer.to_string()).await {
                Ok(_) if print_metrics => log_metrics(),
                Ok(_) => {}
                Err(e) => error!(peer = %peer, error = %e, "Session failed"),
            }
        });
    }

    fn after_session(&self) {
        if self.print_metrics {
            log_metrics();
        }
    }
}

fn log_metrics() {
    info!("Metrics:\n{}", export_metrics());
}
