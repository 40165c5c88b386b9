//! Newline delimited JSON framing, shared by both ends of a worker pipe

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};

#[derive(Error, Debug)]
pub enum WireError {
    #[error("pipe io: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

pub struct MessageReader<R> {
    lines: Lines<BufReader<R>>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }

    /// The next message that decodes, or `None` once the pipe is closed.
    /// Lines that fail to decode are logged and skipped.
    /// Cancel safe, so it can sit in a `select!` loop.
    pub async fn next<T: DeserializeOwned>(&mut self) -> Result<Option<T>, WireError> {
        while let Some(line) = self.lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(message) => return Ok(Some(message)),
                Err(err) => tracing::warn!("Skipping malformed message ({err}): {line}"),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deployer_types::WorkerResponse;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn skips_garbage_between_messages() {
        let (mut tx, rx) = tokio::io::duplex(1024);
        let mut reader = MessageReader::new(rx);

        tx.write_all(b"not json\n\n").await.unwrap();
        write_message(&mut tx, &WorkerResponse::Ready).await.unwrap();
        drop(tx);

        let message: Option<WorkerResponse> = reader.next().await.unwrap();
        assert_eq!(message, Some(WorkerResponse::Ready));

        let eof: Option<WorkerResponse> = reader.next().await.unwrap();
        assert!(eof.is_none());
    }
}
