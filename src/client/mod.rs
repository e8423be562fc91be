//! Load generator speaking the server's wire protocol.
//!
//! The client sends requests on a Poisson schedule while a separate task
//! reads responses. It keeps its side of the connection open until every
//! request has been answered, so the server never abandons queued work.

pub mod workload;

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ProtocolError;
use crate::scheduler::Timestamp;
use crate::server::protocol::{self, Ack, RequestRecord};

pub use workload::{LoadProfile, PlannedRequest, Workload};

/// Errors that can occur while generating load.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid load profile: {0}")]
    InvalidProfile(String),

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Response reader failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Outcome of a load run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientReport {
    pub sent: u64,
    pub completed: u64,
    pub rejected: u64,
    /// Mean time from send to response over completed requests.
    pub mean_response: Duration,
    /// Wall time from the first send to the last response.
    pub elapsed: Duration,
}

impl fmt::Display for ClientReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sent: {}, Completed: {}, Rejected: {}, Average Response Time: {:.6}s, Elapsed: {:.3}s",
            self.sent,
            self.completed,
            self.rejected,
            self.mean_response.as_secs_f64(),
            self.elapsed.as_secs_f64()
        )
    }
}

/// Connects to `addr` and runs `profile` against it.
pub async fn run(addr: &str, profile: &LoadProfile) -> Result<ClientReport, ClientError> {
    let workload = Workload::new(profile)?;
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| ClientError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "Failed to disable Nagle");
    }
    info!(addr = %addr, count = profile.count, "Connected");

    let (mut reader, mut writer) = stream.into_split();
    let expected = profile.count;

    let responses = tokio::spawn(async move {
        let mut received = Vec::new();
        while (received.len() as u64) < expected {
            match protocol::read_response(&mut reader).await {
                Ok(Some(response)) => received.push((response, Instant::now())),
                Ok(None) => {
                    warn!(received = received.len(), "Server closed the connection early");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read response");
                    break;
                }
            }
        }
        received
    });

    let started = Instant::now();
    let mut due = started;
    let mut sent_at = HashMap::new();
    for planned in workload {
        due += planned.gap;
        tokio::time::sleep_until(due).await;

        let request = RequestRecord {
            id: planned.id,
            sent: Timestamp::now(),
            length: planned.length,
        };
        protocol::write_request(&mut writer, &request).await?;
        sent_at.insert(planned.id, Instant::now());
        debug!(job_id = planned.id, length_ms = planned.length.as_millis() as u64, "Sent");
    }

    let received = responses.await?;
    let elapsed = started.elapsed();
    drop(writer);

    let mut report = ClientReport {
        sent: sent_at.len() as u64,
        elapsed,
        ..Default::default()
    };
    let mut response_total = Duration::ZERO;
    for (response, at) in received {
        match response.ack {
            Ack::Completed => {
                report.completed += 1;
                if let Some(sent) = sent_at.get(&response.id) {
                    response_total += at.saturating_duration_since(*sent);
                }
            }
            Ack::Rejected => report.rejected += 1,
        }
    }
    if report.completed > 0 {
        report.mean_response = response_total / report.completed as u32;
    }

    info!(
        completed = report.completed,
        rejected = report.rejected,
        "Load run finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_display() {
        let report = ClientReport {
            sent: 10,
            completed: 8,
            rejected: 2,
            mean_response: Duration::from_millis(125),
            elapsed: Duration::from_secs(2),
        };
        let text = report.to_string();
        assert!(text.contains("Completed: 8"));
        assert!(text.contains("Rejected: 2"));
        assert!(text.contains("0.125000s"));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to obtain a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let profile = LoadProfile {
            count: 1,
            seed: Some(1),
            ..LoadProfile::default()
        };
        let err = run(&addr, &profile).await.unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }));
    }
}
