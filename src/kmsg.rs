use futures::future;
use futures::stream::{BoxStream, StreamExt};
use std::io::{self, ErrorKind};
use std::path::Path;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, trace, warn};

/// One record from `/dev/kmsg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmsgRecord {
    pub priority: u32,
    pub sequence: u64,
    /// Microseconds since boot
    pub timestamp_us: u64,
    pub message: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum KmsgError {
    #[error("invalid kmsg record, must contain a ';'")]
    MissingSeparator,
    #[error("invalid kmsg record, expected at least 3 ',' separated header fields")]
    ShortHeader,
    #[error("invalid kmsg {field} '{value}'")]
    BadField { field: &'static str, value: String },
}

/// Parse a `PRIORITY,SEQUENCE,TIMESTAMP,FLAGS;MESSAGE` record.
///
/// Continuation lines (dictionary entries, leading space) yield `Ok(None)`.
pub fn parse_record(line: &str) -> Result<Option<KmsgRecord>, KmsgError> {
    if line.starts_with(' ') {
        return Ok(None);
    }

    let (header, message) = line.split_once(';').ok_or(KmsgError::MissingSeparator)?;
    let fields: Vec<&str> = header.split(',').collect();
    if fields.len() < 3 {
        return Err(KmsgError::ShortHeader);
    }

    Ok(Some(KmsgRecord {
        priority: parse_field("priority", fields[0])?,
        sequence: parse_field("sequence", fields[1])?,
        timestamp_us: parse_field("timestamp", fields[2])?,
        message: message.to_string(),
    }))
}

fn parse_field<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, KmsgError> {
    value.parse().map_err(|_| KmsgError::BadField {
        field,
        value: value.to_string(),
    })
}

/// Kernel uptime in microseconds, from the first field of `/proc/uptime`.
pub fn parse_uptime(contents: &str) -> Option<u64> {
    let seconds: f64 = contents.split_whitespace().next()?.parse().ok()?;
    (seconds >= 0.0).then(|| (seconds * 1_000_000.0) as u64)
}

async fn boot_relative_now() -> u64 {
    match tokio::fs::read_to_string("/proc/uptime").await {
        Ok(contents) => parse_uptime(&contents).unwrap_or_else(|| {
            warn!("Could not parse /proc/uptime, replaying the whole kernel log");
            0
        }),
        Err(e) => {
            warn!(
                "Could not read /proc/uptime, replaying the whole kernel log: {}",
                e
            );
            0
        }
    }
}

/// Open the kernel log and stream the message text of records written from now on.
///
/// Records already in the ring buffer at startup were seen by a previous run.
pub async fn watch(path: &Path) -> anyhow::Result<BoxStream<'static, anyhow::Result<String>>> {
    let start_us = boot_relative_now().await;
    watch_from(path, start_us).await
}

/// Stream the message text of records stamped at or after `start_us` since boot.
pub async fn watch_from(
    path: &Path,
    start_us: u64,
) -> anyhow::Result<BoxStream<'static, anyhow::Result<String>>> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| anyhow::anyhow!("Could not open kernel log {}: {}", path.display(), e))?;
    let lines = LinesStream::new(BufReader::new(file).lines());

    let messages = lines
        .filter_map(move |line| future::ready(message_from_line(line, start_us)))
        .boxed();

    Ok(messages)
}

/// Turn one raw read into a message to process, nothing, or a fatal error.
///
/// Ring buffer overruns are logged and skipped; any other read error ends
/// the stream with that error.
pub fn message_from_line(
    line: io::Result<String>,
    start_us: u64,
) -> Option<anyhow::Result<String>> {
    match line {
        Ok(raw) => match parse_record(&raw) {
            Ok(Some(record)) if record.timestamp_us < start_us => {
                trace!("Skipping kmsg #{} from before startup", record.sequence);
                None
            }
            Ok(Some(record)) => {
                trace!(
                    "kmsg #{} priority {} at {}us",
                    record.sequence, record.priority, record.timestamp_us
                );
                Some(Ok(record.message))
            }
            Ok(None) => None,
            Err(e) => {
                debug!("Skipping kernel log record: {}", e);
                None
            }
        },
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            warn!("Kernel log ring buffer overran the reader, some records were lost");
            None
        }
        Err(e) => Some(Err(anyhow::anyhow!("Reading kernel log failed: {}", e))),
    }
}
