//! Fixed-size binary records exchanged with clients.
//!
//! All integers are little-endian.
//!
//! ```text
//! request  (40 bytes): id u64 | sent.secs i64 | sent.nanos i64 | len.secs i64 | len.nanos i64
//! response (24 bytes): id u64 | reserved u64 | ack u8 | padding [u8; 7]
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;
use crate::scheduler::Timestamp;

/// Size of an encoded request.
pub const REQUEST_SIZE: usize = 40;

/// Size of an encoded response.
pub const RESPONSE_SIZE: usize = 24;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A job submission as sent by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestRecord {
    pub id: u64,
    /// Client-side send time.
    pub sent: Timestamp,
    /// Requested processing time.
    pub length: Duration,
}

/// Outcome reported back for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Completed = 0,
    Rejected = 1,
}

impl Ack {
    fn from_byte(byte: u8) -> Self {
        if byte == 0 {
            Ack::Completed
        } else {
            Ack::Rejected
        }
    }
}

/// A response as sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseRecord {
    pub id: u64,
    pub ack: Ack,
}

impl ResponseRecord {
    pub fn completed(id: u64) -> Self {
        Self {
            id,
            ack: Ack::Completed,
        }
    }

    pub fn rejected(id: u64) -> Self {
        Self {
            id,
            ack: Ack::Rejected,
        }
    }
}

fn duration_to_timespec(d: Duration) -> (i64, i64) {
    (
        i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        i64::from(d.subsec_nanos()),
    )
}

fn timespec_to_duration(id: u64, secs: i64, nanos: i64) -> Result<Duration, ProtocolError> {
    if secs < 0 || !(0..NANOS_PER_SEC).contains(&nanos) {
        return Err(ProtocolError::InvalidTimespec { id, secs, nanos });
    }
    Ok(Duration::new(secs as u64, nanos as u32))
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

fn read_i64(buf: &[u8], at: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    i64::from_le_bytes(bytes)
}

impl RequestRecord {
    pub fn encode(&self) -> [u8; REQUEST_SIZE] {
        let mut buf = [0u8; REQUEST_SIZE];
        let (sent_secs, sent_nanos) = duration_to_timespec(self.sent.as_duration());
        let (len_secs, len_nanos) = duration_to_timespec(self.length);

        buf[0..8].copy_from_slice(&self.id.to_le_bytes());
        buf[8..16].copy_from_slice(&sent_secs.to_le_bytes());
        buf[16..24].copy_from_slice(&sent_nanos.to_le_bytes());
        buf[24..32].copy_from_slice(&len_secs.to_le_bytes());
        buf[32..40].copy_from_slice(&len_nanos.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; REQUEST_SIZE]) -> Result<Self, ProtocolError> {
        let id = read_u64(buf, 0);
        let sent = timespec_to_duration(id, read_i64(buf, 8), read_i64(buf, 16))?;
        let length = timespec_to_duration(id, read_i64(buf, 24), read_i64(buf, 32))?;

        Ok(Self {
            id,
            sent: Timestamp::from_duration(sent),
            length,
        })
    }
}

impl ResponseRecord {
    pub fn encode(&self) -> [u8; RESPONSE_SIZE] {
        let mut buf = [0u8; RESPONSE_SIZE];
        buf[0..8].copy_from_slice(&self.id.to_le_bytes());
        buf[16] = self.ack as u8;
        buf
    }

    pub fn decode(buf: &[u8; RESPONSE_SIZE]) -> Self {
        Self {
            id: read_u64(buf, 0),
            ack: Ack::from_byte(buf[16]),
        }
    }
}

/// Fills `buf` completely. Returns `Ok(false)` if the stream ended before
/// the first byte, and an `UnexpectedEof` error if it ended part way.
async fn read_record<R>(reader: &mut R, buf: &mut [u8]) -> Result<bool, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("stream ended after {} of {} bytes", filled, buf.len()),
            )
            .into());
        }
        filled += n;
    }
    Ok(true)
}

/// Reads the next request, or `None` at a clean end of stream.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<RequestRecord>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; REQUEST_SIZE];
    if !read_record(reader, &mut buf).await? {
        return Ok(None);
    }
    RequestRecord::decode(&buf).map(Some)
}

/// Reads the next response, or `None` at a clean end of stream.
pub async fn read_response<R>(reader: &mut R) -> Result<Option<ResponseRecord>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; RESPONSE_SIZE];
    if !read_record(reader, &mut buf).await? {
        return Ok(None);
    }
    Ok(Some(ResponseRecord::decode(&buf)))
}

pub async fn write_request<W>(writer: &mut W, request: &RequestRecord) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&request.encode()).await?;
    Ok(())
}

pub async fn write_response<W>(
    writer: &mut W,
    response: &ResponseRecord,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&response.encode()).await?;
    Ok(())
}
