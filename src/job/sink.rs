use std::io::{self, Write};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::io::AsyncWrite;

/// Destination for streamed container output.
///
/// Implementations must be safe to call from several tasks at once; each call
/// writes one chunk as a unit.
pub trait LogSink: Send + Sync + 'static {
    fn write_chunk(&self, chunk: &[u8]) -> io::Result<()>;
}

/// Writes to the process standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write_chunk(&self, chunk: &[u8]) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(chunk)?;
        out.flush()
    }
}

/// Adapts a [`LogSink`] to `AsyncWrite` so log streams can be copied into it.
pub(crate) struct SinkWriter {
    sink: Arc<dyn LogSink>,
}

impl SinkWriter {
    pub(crate) fn new(sink: Arc<dyn LogSink>) -> Self {
        SinkWriter { sink }
    }
}

impl AsyncWrite for SinkWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(self.sink.write_chunk(buf).map(|()| buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct BufferSink {
        buf: Mutex<Vec<u8>>,
    }

    impl BufferSink {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
        }
    }

    impl LogSink for BufferSink {
        fn write_chunk(&self, chunk: &[u8]) -> io::Result<()> {
            self.buf.lock().unwrap().extend_from_slice(chunk);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::AsyncWriteExt;

    use super::fixtures::BufferSink;
    use super::*;

    #[tokio::test]
    async fn test_sink_writer_forwards_chunks() {
        let sink = Arc::new(BufferSink::default());
        let mut writer = SinkWriter::new(sink.clone());
        writer.write_all(b"hello ").await.unwrap();
        writer.write_all(b"world\n").await.unwrap();
        assert_eq!(sink.contents(), "hello world\n");
    }
}
