//! Frame write/read round trips over a real duplex stream (spec §4.3),
//! including resync across a corrupted frame sitting between two good
//! ones and an invalid mode byte.

use messaging_core::framing::pipeline::{encode_bytes, encode_packet, decode_packet};
use messaging_core::framing::{write_frame, FrameReader, FrameTags, Mode};
use messaging_core::codec::Pipeline;
use messaging_core::container::ValueContainer;
use messaging_core::value::Value;
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn three_frames_survive_a_corrupted_frame_in_the_middle() {
    let tags = FrameTags::default();
    let (mut client, mut server) = tokio::io::duplex(64 * 1024);

    let writer = tokio::spawn(async move {
        write_frame(&mut client, tags, Mode::Binary, b"first").await.unwrap();

        // Hand-crafted frame with a corrupted end tag: the reader must
        // resync past this without losing the frame that follows.
        client
            .write_all(&[tags.start_tag; 4])
            .await
            .unwrap();
        client.write_all(&[Mode::Binary.to_byte()]).await.unwrap();
        client.write_all(&6u32.to_le_bytes()).await.unwrap();
        client.write_all(b"broken").await.unwrap();
        client.write_all(&[0u8; 4]).await.unwrap();

        write_frame(&mut client, tags, Mode::Binary, b"third").await.unwrap();
        client.flush().await.unwrap();
    });

    let reader = FrameReader::new(tags);
    let first = reader.read_frame(&mut server).await.unwrap();
    assert_eq!(first.payload, b"first");

    let third = reader.read_frame(&mut server).await.unwrap();
    assert_eq!(third.payload, b"third");

    writer.await.unwrap();
}

#[tokio::test]
async fn resyncs_past_an_invalid_mode_byte() {
    let tags = FrameTags::default();
    let (mut client, mut server) = tokio::io::duplex(64 * 1024);

    tokio::spawn(async move {
        client.write_all(&[tags.start_tag; 4]).await.unwrap();
        client.write_all(&[9u8]).await.unwrap(); // invalid mode
        write_frame(&mut client, tags, Mode::Packet, b"ok").await.unwrap();
    });

    let reader = FrameReader::new(tags);
    let frame = reader.read_frame(&mut server).await.unwrap();
    assert_eq!(frame.payload, b"ok");
}

#[tokio::test]
async fn packet_mode_frame_carries_a_full_container_round_trip() {
    let tags = FrameTags::default();
    let (mut client, mut server) = tokio::io::duplex(64 * 1024);
    let pipeline = Pipeline::new();

    let mut container = ValueContainer::new();
    container.add_root(Value::string("greeting", "hello over the wire"));

    let encoded = encode_packet(&container, &pipeline).unwrap();
    tokio::spawn(async move {
        write_frame(&mut client, tags, Mode::Packet, &encoded).await.unwrap();
    });

    let reader = FrameReader::new(tags);
    let frame = reader.read_frame(&mut server).await.unwrap();
    let decoded = decode_packet(&frame.payload, &pipeline).unwrap();
    assert_eq!(
        decoded.find("greeting").unwrap().lock().to_string(true),
        "hello over the wire"
    );
}

#[tokio::test]
async fn binary_mode_frame_carries_raw_bytes_through_a_pipeline() {
    let tags = FrameTags::default();
    let (mut client, mut server) = tokio::io::duplex(64 * 1024);
    let pipeline = Pipeline::new();

    let payload = encode_bytes(b"raw payload bytes", &pipeline).unwrap();
    tokio::spawn(async move {
        write_frame(&mut client, tags, Mode::Binary, &payload).await.unwrap();
    });

    let reader = FrameReader::new(tags);
    let frame = reader.read_frame(&mut server).await.unwrap();
    assert_eq!(frame.payload, payload);
}
