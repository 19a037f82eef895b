use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

/// Spawn a task forwarding each line of `reader` to `tx`.
///
/// Invalid UTF-8 is replaced rather than rejected. The task ends at EOF, on a
/// read error, or when the receiver is dropped.
pub fn spawn_lines<R>(
    reader: R,
    tx: mpsc::Sender<String>,
    description: &str,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let desc = description.to_string();

    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => {
                    tracing::info!(source = %desc, "end of input");
                    break;
                }
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    let text = text.trim_end_matches(['\r', '\n']);
                    if text.is_empty() {
                        continue;
                    }
                    if tx.send(text.to_string()).await.is_err() {
                        // Receiver dropped
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(source = %desc, error = %e, "read error");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_lines_are_forwarded() {
        let data = b"{\"type\":\"beacon\"}\r\n\nplain text\n\xffbad\nlast".to_vec();
        let (tx, mut rx) = mpsc::channel(16);

        spawn_lines(Cursor::new(data), tx, "test").await.unwrap();

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        assert_eq!(
            lines,
            vec![
                "{\"type\":\"beacon\"}".to_string(),
                "plain text".to_string(),
                "\u{fffd}bad".to_string(),
                "last".to_string(),
            ]
        );
    }
}
