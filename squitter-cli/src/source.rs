//! Input readers for the CLI.
//!
//! A reader task turns a file or stdin into [`InputFrame`]s on a bounded
//! channel. Text input is one frame per line; `--beast` input is a binary
//! Beast byte stream.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use squitter_core::{unix_now, BeastDecoder, InputFrame, Result};

type Reader = Box<dyn AsyncRead + Unpin + Send>;

/// Start reading `path` (`-` for stdin) in the background.
///
/// The task stops early, without error, when the receiver is dropped.
pub fn spawn(
    path: PathBuf,
    beast: bool,
    capacity: usize,
) -> (mpsc::Receiver<InputFrame>, JoinHandle<Result<()>>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(async move {
        let reader = open(&path).await?;
        if beast {
            read_beast(reader, tx).await
        } else {
            read_lines(reader, tx).await
        }
    });
    (rx, handle)
}

async fn open(path: &Path) -> Result<Reader> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(tokio::io::stdin()));
    }
    Ok(Box::new(File::open(path).await?))
}

async fn read_lines(reader: Reader, tx: mpsc::Sender<InputFrame>) -> Result<()> {
    let mut lines = BufReader::new(reader).lines();
    let mut count = 0u64;
    while let Some(line) = lines.next_line().await? {
        let Some(frame) = parse_line(&line) else {
            continue;
        };
        if tx.send(frame).await.is_err() {
            break;
        }
        count += 1;
    }
    debug!(frames = count, "text input finished");
    Ok(())
}

async fn read_beast(mut reader: Reader, tx: mpsc::Sender<InputFrame>) -> Result<()> {
    let mut decoder = BeastDecoder::new();
    let mut buf = vec![0u8; 4096];
    let mut count = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let now = unix_now();
        for record in decoder.feed(&buf[..n]) {
            // Positions an MLAT server computed, not something we heard
            if record.is_synthetic_mlat() {
                trace!(%record, "skipping synthetic MLAT record");
                continue;
            }
            let Some(frame) = InputFrame::from_beast(&record, now) else {
                trace!(%record, "skipping non Mode S record");
                continue;
            };
            if tx.send(frame).await.is_err() {
                return Ok(());
            }
            count += 1;
        }
    }
    if decoder.pending() > 0 {
        debug!(bytes = decoder.pending(), "partial Beast record at end of input");
    }
    debug!(frames = count, "Beast input finished");
    Ok(())
}

/// Turn one text line into a frame stamped with the current time.
///
/// Blank lines and `#` comments are skipped. A trailing `;<unix seconds>`
/// (as in recorded captures) replaces the read time.
pub fn parse_line(line: &str) -> Option<InputFrame> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (body, timestamp) = split_timestamp(line);
    Some(InputFrame::from_line(body, timestamp.unwrap_or_else(unix_now)))
}

fn split_timestamp(line: &str) -> (&str, Option<f64>) {
    if let Some((body, tail)) = line.rsplit_once(';') {
        if let Ok(ts) = tail.trim().parse::<f64>() {
            return (body, Some(ts));
        }
    }
    (line, None)
}
