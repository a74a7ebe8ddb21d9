//! Composes the codec pipeline with framing (spec §4.3):
//!
//! - `packet` mode: serialize container → (compress) → (encrypt) → send.
//! - `file` mode: read file bytes → (compress) → (encrypt) → send.
//! - `binary` mode: caller bytes → (compress) → (encrypt) → send.
//!
//! Inbound traverses the inverse. Compression and encryption are each
//! optional and negotiated during handshake (spec §4.3); an empty
//! [`crate::codec::Pipeline`] is the identity transform, so "neither
//! negotiated" falls out of the same code path as "both negotiated".

use crate::codec::Pipeline;
use crate::container::ValueContainer;
use crate::error::Result;
use crate::framing::{write_frame, Frame, FrameTags, Mode};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Encodes a container as a `packet`-mode frame payload: serialize,
/// then run it through the negotiated pipeline.
pub fn encode_packet(container: &ValueContainer, pipeline: &Pipeline) -> Result<Vec<u8>> {
    pipeline.encode(container.serialize().as_bytes())
}

/// Reverses [`encode_packet`]: run the pipeline inverse, then parse the
/// wire text back into a container.
pub fn decode_packet(payload: &[u8], pipeline: &Pipeline) -> Result<ValueContainer> {
    let decoded = pipeline.decode(payload)?;
    let text = String::from_utf8_lossy(&decoded).replace(['\r', '\n'], "");
    ValueContainer::deserialize(&text)
}

/// Encodes arbitrary bytes (file or binary mode) through the pipeline.
pub fn encode_bytes(bytes: &[u8], pipeline: &Pipeline) -> Result<Vec<u8>> {
    pipeline.encode(bytes)
}

pub fn decode_bytes(payload: &[u8], pipeline: &Pipeline) -> Result<Vec<u8>> {
    pipeline.decode(payload)
}

/// Sends a fully pipeline-encoded frame on `stream`.
pub async fn send_frame<W>(
    stream: &mut W,
    tags: FrameTags,
    mode: Mode,
    encoded_payload: &[u8],
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_frame(stream, tags, mode, encoded_payload).await
}

/// Decodes a delivered frame's payload back into a container, assuming
/// `packet` mode. Callers handling `file`/`binary` frames use
/// [`decode_bytes`] directly on `frame.payload`.
pub fn decode_packet_frame(frame: &Frame, pipeline: &Pipeline) -> Result<ValueContainer> {
    decode_packet(&frame.payload, pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::compress::Lz4BlockStage;
    use crate::codec::encrypt::AesGcmStage;
    use crate::value::Value;

    #[test]
    fn packet_round_trips_through_compress_and_encrypt() {
        let (aes, _material) = AesGcmStage::generated();
        let pipeline = Pipeline::new()
            .push(Box::new(Lz4BlockStage::new(64)))
            .push(Box::new(aes));

        let mut container = ValueContainer::new();
        container.add_root(Value::int("n", 99));
        container.add_root(Value::string("s", "round trip"));

        let encoded = encode_packet(&container, &pipeline).unwrap();
        let decoded = decode_packet(&encoded, &pipeline).unwrap();
        assert_eq!(decoded.roots().len(), 2);
        assert_eq!(decoded.roots()[0].lock().to_i64(), 99);
    }
}
