//! Serialized output sink shared by all workers.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// A writer behind one mutex. Each [`OutputSink::emit`] writes a whole block
/// while holding the lock, so blocks never interleave.
pub struct OutputSink<W> {
    writer: Arc<Mutex<W>>,
}

impl<W> Clone for OutputSink<W> {
    fn clone(&self) -> Self {
        Self {
            writer: self.writer.clone(),
        }
    }
}

impl<W> OutputSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Write `block` atomically and flush.
    pub async fn emit(&self, block: &str) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(block.as_bytes()).await?;
        writer.flush().await
    }
}

impl OutputSink<tokio::io::Stdout> {
    /// Sink over the process's standard output.
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl OutputSink<Vec<u8>> {
    /// Sink that collects everything in memory.
    pub fn buffer() -> Self {
        Self::new(Vec::new())
    }

    /// Everything written so far.
    pub async fn contents(&self) -> String {
        String::from_utf8_lossy(&self.writer.lock().await).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_blocks_stay_contiguous() {
        let sink = OutputSink::buffer();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let sink = sink.clone();
                tokio::spawn(async move {
                    let block: String = (0..50).map(|line| format!("block {} line {}\n", i, line)).collect();
                    sink.emit(&block).await.unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let contents = sink.contents().await;
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 16 * 50);
        for chunk in lines.chunks(50) {
            let owner = chunk[0].split(' ').nth(1).unwrap();
            assert!(chunk.iter().all(|line| line.split(' ').nth(1) == Some(owner)));
        }
    }
}
