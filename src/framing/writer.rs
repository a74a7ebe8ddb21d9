//! The framing write path (spec §4.3): `send_on_tcp` writes the five
//! segments in order. Each segment is one `write_all` call — exactly
//! five calls per frame regardless of payload size (scenario S5).

use super::{FrameTags, Mode, TAG_LEN};
use crate::error::Result;
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub async fn write_frame<W>(
    stream: &mut W,
    tags: FrameTags,
    mode: Mode,
    payload: &[u8],
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(&[tags.start_tag; TAG_LEN]).await?;
    stream.write_all(&[mode.to_byte()]).await?;
    stream
        .write_all(&(payload.len() as u32).to_le_bytes())
        .await?;
    stream.write_all(payload).await?;
    stream.write_all(&[tags.end_tag; TAG_LEN]).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::FrameReader;
    use tokio::io::duplex;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let tags = FrameTags::default();
        let (mut client, mut server) = duplex(64 * 1024);

        let payload = vec![7u8; 4096];
        let payload_clone = payload.clone();
        let writer = tokio::spawn(async move {
            write_frame(&mut client, tags, Mode::Binary, &payload_clone)
                .await
                .unwrap();
        });

        let reader = FrameReader::new(tags);
        let frame = reader.read_frame(&mut server).await.unwrap();
        writer.await.unwrap();

        assert_eq!(frame.mode, Mode::Binary);
        assert_eq!(frame.payload, payload);
    }
}
