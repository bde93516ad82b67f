use nzb_core::{ByteStream, ConcatenatedStream, LengthLimitedStream};
use tokio_util::sync::CancellationToken;

fn memory_future(data: &'static [u8]) -> std::pin::Pin<Box<dyn std::future::Future<Output = nzb_core::Result<Box<dyn ByteStream>>> + Send>> {
    Box::pin(async move {
        Ok(Box::new(nzb_core::stream::MemoryStream::new(data.to_vec())) as Box<dyn ByteStream>)
    })
}

async fn drain(stream: &mut dyn ByteStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 8];
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

#[tokio::test]
async fn concatenated_stream_reassembles_segments_in_order() {
    let futures = vec![memory_future(b"hello, "), memory_future(b"usenet"), memory_future(b" world")];
    let mut stream = ConcatenatedStream::new(futures, 2, 20, CancellationToken::new());
    assert_eq!(drain(&mut stream).await, b"hello, usenet world");
}

#[tokio::test]
async fn length_limited_stream_truncates_a_longer_concatenation() {
    let futures = vec![memory_future(b"0123456789")];
    let concatenated = ConcatenatedStream::new(futures, 1, 10, CancellationToken::new());
    let mut limited = LengthLimitedStream::new(Box::new(concatenated), 4);
    assert_eq!(drain(&mut limited).await, b"0123");
}

#[tokio::test]
async fn cancellation_surfaces_before_any_bytes_are_read() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut stream = ConcatenatedStream::new(vec![memory_future(b"x")], 1, 1, cancel);
    let mut buf = [0u8; 1];
    let err = stream.read(&mut buf).await.unwrap_err();
    assert!(matches!(err, nzb_core::Error::Cancelled));
}
