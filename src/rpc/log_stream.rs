//! Log tailing for the `StreamLogs` RPC (§4.I): non-follow mode replays
//! matching historical entries then closes; follow mode seeks to EOF and
//! tails new lines, reopening on rotation.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::rpc::envelope::{LogEntry, LogStreamRequest};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn matches(entry: &LogEntry, request: &LogStreamRequest) -> bool {
    if let Some(levels) = &request.levels {
        if !levels.iter().any(|l| l.eq_ignore_ascii_case(&entry.level)) {
            return false;
        }
    }
    let epoch = entry.timestamp.timestamp();
    if let Some(start) = request.start_epoch {
        if epoch < start {
            return false;
        }
    }
    if let Some(end) = request.end_epoch {
        if epoch > end {
            return false;
        }
    }
    if let Some(search) = &request.search {
        let needle = search.to_lowercase();
        let haystack = format!(
            "{} {} {} {}",
            entry.message,
            entry.service,
            entry.operation.as_deref().unwrap_or(""),
            entry.error.as_deref().unwrap_or(""),
        )
        .to_lowercase();
        if !haystack.contains(&needle) {
            return false;
        }
    }
    true
}

fn parse_lines(buffer: &str, request: &LogStreamRequest, out: &mut Vec<LogEntry>) {
    for line in buffer.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(entry) = serde_json::from_str::<LogEntry>(line) {
            if matches(&entry, request) {
                out.push(entry);
            }
        }
    }
}

/// Streams entries to `tx` until the file is exhausted (non-follow) or
/// `shutdown` fires (follow). Returns normally in both terminating cases;
/// the caller sends the `StreamEnd` envelope once this returns.
pub async fn stream_log_entries(
    log_path: &str,
    request: LogStreamRequest,
    tx: mpsc::Sender<LogEntry>,
    shutdown: CancellationToken,
) {
    let mut file = match tokio::fs::File::open(log_path).await {
        Ok(f) => f,
        Err(_) => return,
    };

    let mut content = String::new();
    if file.read_to_string(&mut content).await.is_err() {
        return;
    }
    let mut offset = content.len() as u64;

    let max_lines = request.max_lines.unwrap_or(1000);
    let mut historical = Vec::new();
    parse_lines(&content, &request, &mut historical);
    for entry in historical.into_iter().take(max_lines) {
        if tx.send(entry).await.is_err() {
            return;
        }
    }

    if !request.follow {
        return;
    }

    let mut interval = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = interval.tick() => {}
        }

        let metadata = match tokio::fs::metadata(log_path).await {
            Ok(m) => m,
            Err(_) => continue,
        };
        if metadata.len() < offset {
            // Rotation detected: the file shrank under us. Reopen and
            // resume from the new end, accepting that a straddling entry
            // may be lost (§4.I, §9 design note).
            file = match tokio::fs::File::open(log_path).await {
                Ok(f) => f,
                Err(_) => continue,
            };
            offset = metadata.len();
            continue;
        }
        if metadata.len() == offset {
            continue;
        }

        if file.seek(SeekFrom::Start(offset)).await.is_err() {
            continue;
        }
        let mut new_bytes = String::new();
        if file.read_to_string(&mut new_bytes).await.is_err() {
            continue;
        }
        offset = metadata.len();

        let mut fresh = Vec::new();
        parse_lines(&new_bytes, &request, &mut fresh);
        for entry in fresh {
            if tx.send(entry).await.is_err() {
                return;
            }
        }
    }
}
