//! The framing read state machine (spec §4.3):
//! `ReadStart → ReadMode → ReadLength → ReadPayload → ReadEnd → deliver`.
//!
//! Any tag mismatch at any position restarts the search from
//! `ReadStart` without closing the connection — exactly one log line
//! per resync (spec §9 "Resynchronizing reader"), and the discarded
//! byte count is surfaced in that log line.

use super::{Frame, FrameTags, Mode, TAG_LEN};
use crate::error::Result;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Drives the read state machine against any `AsyncRead` byte source.
pub struct FrameReader {
    tags: FrameTags,
    chunk_size: usize,
}

/// The result of one `read_frame` call: a delivered frame.
/// I/O errors surface as `Err`; the caller maps them to
/// `disconnected()` per spec §4.3.
pub type ReadOutcome = Frame;

impl FrameReader {
    pub fn new(tags: FrameTags) -> Self {
        FrameReader {
            tags,
            chunk_size: 4096,
        }
    }

    pub fn with_chunk_size(tags: FrameTags, chunk_size: usize) -> Self {
        FrameReader {
            tags,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Reads one complete, tag-valid frame, resyncing past any
    /// malformed attempt. Returns `Err` only on an underlying I/O
    /// error; a malformed frame never surfaces as an `Err` — it is
    /// logged and the search restarts.
    pub async fn read_frame<R>(&self, stream: &mut R) -> Result<Frame>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            if let Some(frame) = self.try_read_one(stream).await? {
                return Ok(frame);
            }
        }
    }

    /// Attempts to read exactly one frame. Returns `Ok(None)` when a
    /// resync was needed (mode byte or end tag mismatched) so the
    /// caller's loop restarts the search; `Ok(Some(frame))` on success.
    async fn try_read_one<R>(&self, stream: &mut R) -> Result<Option<Frame>>
    where
        R: AsyncRead + Unpin,
    {
        self.read_start_tag(stream).await?;

        let mode_byte = read_u8(stream).await?;
        let mode = match Mode::from_byte(mode_byte) {
            Some(mode) => mode,
            None => {
                tracing::error!(mode_byte, "invalid frame mode byte, resyncing");
                return Ok(None);
            }
        };

        let mut len_bytes = [0u8; 4];
        stream.read_exact(&mut len_bytes).await?;
        let length = u32::from_le_bytes(len_bytes) as usize;

        let payload = self.read_payload(stream, length).await?;

        let mut end_bytes = [0u8; TAG_LEN];
        stream.read_exact(&mut end_bytes).await?;
        if end_bytes.iter().any(|&b| b != self.tags.end_tag) {
            tracing::error!("frame end tag mismatch, resyncing");
            return Ok(None);
        }

        Ok(Some(Frame { mode, payload }))
    }

    /// Scans byte-by-byte for four consecutive `start_tag` bytes.
    async fn read_start_tag<R>(&self, stream: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut consecutive = 0usize;
        let mut discarded = 0usize;
        while consecutive < TAG_LEN {
            let b = read_u8(stream).await?;
            if b == self.tags.start_tag {
                consecutive += 1;
            } else {
                discarded += consecutive + 1;
                consecutive = 0;
            }
        }
        if discarded > 0 {
            tracing::error!(discarded, "frame resync: discarded bytes before start tag");
        }
        Ok(())
    }

    async fn read_payload<R>(&self, stream: &mut R, length: usize) -> Result<Vec<u8>>
    where
        R: AsyncRead + Unpin,
    {
        let mut payload = Vec::with_capacity(length);
        let mut remaining = length;
        let mut buf = vec![0u8; self.chunk_size];
        while remaining > 0 {
            let to_read = remaining.min(buf.len());
            stream.read_exact(&mut buf[..to_read]).await?;
            payload.extend_from_slice(&buf[..to_read]);
            remaining -= to_read;
        }
        Ok(payload)
    }
}

async fn read_u8<R>(stream: &mut R) -> Result<u8>
where
    R: AsyncRead + Unpin,
{
    let mut b = [0u8; 1];
    stream.read_exact(&mut b).await?;
    Ok(b[0])
}
