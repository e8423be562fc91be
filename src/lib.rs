//! queueserve: bounded job queue server with FIFO and SJN scheduling.
//!
//! Clients submit timed jobs over TCP. Each connection gets a fixed-capacity
//! queue that rejects work when full, a pool of worker threads that
//! busy-wait for each job's requested duration, and a tracker that reports
//! time-weighted queue length and utilization when the connection ends.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod scheduler;
pub mod server;

// Re-export commonly used error types
pub use error::{ConfigError, ProtocolError};
