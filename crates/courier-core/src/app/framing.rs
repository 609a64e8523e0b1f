//! read_lines - パイプ出力を行単位に読む
//!
//! read の境界は行の境界と一致しない。BufReader が改行までをバッファするので、
//! 割れて届いた行も 1 行として取り出せる。改行のない末尾は EOF で 1 行として扱う。
//! 行はバイト列のまま切り出してから decode する（マルチバイト文字が割れても壊れない）。

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Read `reader` to EOF, calling `on_line` for every non-blank line.
/// Returns how many lines were emitted.
pub async fn read_lines<R, F>(reader: R, mut on_line: F) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut emitted = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        if let Some(line) = decode(&buf) {
            on_line(line);
            emitted += 1;
        }
    }
    Ok(emitted)
}

/// CRLF tolerant, lossy UTF-8; `None` for blank lines.
fn decode(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    if line.trim().is_empty() {
        None
    } else {
        Some(line.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn collect(input: &[u8]) -> Vec<String> {
        let mut seen = Vec::new();
        read_lines(input, |line| seen.push(line)).await.unwrap();
        seen
    }

    /// Feed `chunks` through a tiny pipe, one write (and flush) at a time.
    async fn collect_chunked(chunks: Vec<Vec<u8>>) -> Vec<String> {
        let (mut tx, rx) = tokio::io::duplex(8);
        let writer = tokio::spawn(async move {
            for chunk in chunks {
                tx.write_all(&chunk).await.unwrap();
                tx.flush().await.unwrap();
                tokio::task::yield_now().await;
            }
        });
        let mut seen = Vec::new();
        read_lines(rx, |line| seen.push(line)).await.unwrap();
        writer.await.unwrap();
        seen
    }

    #[tokio::test]
    async fn split_line_is_reassembled() {
        assert_eq!(
            collect_chunked(vec![
                b"{\"type\":\"assi".to_vec(),
                b"stant\"}\n{\"a\":1}\n".to_vec(),
            ])
            .await,
            vec![r#"{"type":"assistant"}"#, r#"{"a":1}"#]
        );
    }

    #[tokio::test]
    async fn blank_lines_and_crlf() {
        assert_eq!(collect(b"one\r\n\r\n   \ntwo\n").await, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn unterminated_tail_is_a_line() {
        assert_eq!(collect(b"first\nno newline").await, vec!["first", "no newline"]);
    }

    #[tokio::test]
    async fn multibyte_char_split_across_chunks() {
        let bytes = "日本語\n".as_bytes();
        let (head, tail) = bytes.split_at(4);
        assert_eq!(
            collect_chunked(vec![head.to_vec(), tail.to_vec()]).await,
            vec!["日本語"]
        );
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        assert_eq!(collect(b"ok \xff\n").await, vec!["ok \u{fffd}"]);
    }

    #[tokio::test]
    async fn long_line_through_a_small_pipe() {
        let long = "x".repeat(64 * 1024);
        let (mut tx, rx) = tokio::io::duplex(16);
        let payload = format!("{long}\nsecond");
        let writer = tokio::spawn(async move {
            tx.write_all(payload.as_bytes()).await.unwrap();
        });

        let mut seen = Vec::new();
        let n = read_lines(rx, |line| seen.push(line)).await.unwrap();
        writer.await.unwrap();

        assert_eq!(n, 2);
        assert_eq!(seen, vec![long, "second".to_string()]);
    }
}
