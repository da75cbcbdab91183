//! JSON-lines transport between the process streams and the bus.
//!
//! Inbound: one `{"key": "...", "value": {...}}` object per line on stdin.
//! Outbound: one `{"topic": "...", "key": "...", "value": {...}}` object
//! per produced message on stdout.

use async_trait::async_trait;
use buildcommit_core::metrics::METRICS;
use buildcommit_core::{BusError, InMemoryBus, MessageProducer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error};

#[derive(Debug, Deserialize)]
struct InboundLine {
    #[serde(default)]
    key: Option<String>,
    value: Value,
}

#[derive(Debug, Serialize)]
struct OutboundLine<'a> {
    topic: &'a str,
    key: &'a str,
    value: Value,
}

/// Split an inbound line into its bus key and raw payload.
///
/// Without an explicit key the request's `build.id` is used. A string
/// `value` is taken as an already-encoded payload.
pub fn parse_inbound_line(line: &str) -> serde_json::Result<(String, Vec<u8>)> {
    let InboundLine { key, value } = serde_json::from_str(line)?;
    let key = key
        .or_else(|| {
            value
                .pointer("/build/id")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_default();
    let payload = match value {
        Value::String(raw) => raw.into_bytes(),
        other => serde_json::to_vec(&other)?,
    };
    Ok((key, payload))
}

/// Counts from one pass over the input stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedSummary {
    pub accepted: u64,
    pub rejected: u64,
}

/// Produce every line of `reader` onto `topic` until end of input.
///
/// Lines that are not UTF-8 or not a readable envelope are counted and
/// skipped; intake continues with the next line.
pub async fn feed_lines<R>(
    mut reader: R,
    bus: &InMemoryBus,
    topic: &str,
) -> anyhow::Result<FeedSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = FeedSummary::default();
    let mut buf = Vec::new();
    let mut line_no = 0u64;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        line_no += 1;
        let parsed = std::str::from_utf8(&buf)
            .map_err(|e| e.to_string())
            .and_then(|line| {
                let line = line.trim();
                if line.is_empty() {
                    return Ok(None);
                }
                parse_inbound_line(line)
                    .map(Some)
                    .map_err(|e| e.to_string())
            });
        match parsed {
            Ok(None) => {}
            Ok(Some((key, payload))) => {
                let (partition, offset) = bus.produce(topic, &key, payload).await?;
                debug!(line = line_no, key = %key, partition, offset, "Inbound message queued");
                summary.accepted += 1;
            }
            Err(e) => {
                METRICS.inc_malformed_messages();
                error!(
                    event = "request.malformed",
                    line = line_no,
                    error = %e,
                    "Unreadable input line"
                );
                summary.rejected += 1;
            }
        }
    }
    Ok(summary)
}

/// Message sink writing JSON lines to an async writer.
pub struct JsonLinesProducer<W> {
    out: Mutex<W>,
}

impl<W> JsonLinesProducer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W> MessageProducer for JsonLinesProducer<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn emit(&self, topic: &str, key: &str, value: Vec<u8>) -> Result<(), BusError> {
        let delivery = |reason: String| BusError::Delivery {
            topic: topic.to_string(),
            reason,
        };
        let value = serde_json::from_slice(&value)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&value).into_owned()));
        let mut line = serde_json::to_vec(&OutboundLine { topic, key, value })
            .map_err(|e| delivery(e.to_string()))?;
        line.push(b'\n');

        let mut out = self.out.lock().await;
        out.write_all(&line).await.map_err(|e| delivery(e.to_string()))?;
        out.flush().await.map_err(|e| delivery(e.to_string()))
    }
}
