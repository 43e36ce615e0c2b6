//! Incremental `usage_metadata` extraction from a server-sent event stream.
//!
//! The extractor sees the same chunks that are relayed to the caller, in
//! arrival order, and never holds more than one incomplete event in memory.
//! Chunk boundaries are arbitrary: they can split a line, a JSON document or
//! a multi-byte UTF-8 character.
//!
//! Per chunk:
//! 1. decode UTF-8 (invalid sequences are skipped, a character cut at the end
//!    of the chunk is completed by the next one) and append to the buffer;
//! 2. cut every complete event (terminated by a blank line) off the front of
//!    the buffer;
//! 3. for each `data:` line of an event that mentions `usage_metadata`, parse
//!    it as JSON and search it at any depth for a non-empty usage object;
//! 4. the last object found wins.
//!
//! Text after the last blank line is never parsed; [`SseUsageExtractor::finish`]
//! drops it.

use {
    serde_json::{Map, Value},
    tracing::trace,
};

/// Key of the usage-accounting object inside event payloads.
pub const USAGE_KEY: &str = "usage_metadata";

/// Keys that name the model which produced a usage report.
const MODEL_KEYS: &[&str] = &["model_name", "ls_model_name"];

const EVENT_DELIMITER: &str = "\n\n";
const DATA_PREFIX: &str = "data:";

/// Usage found in a stream, ready to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedUsage {
    pub usage: Map<String, Value>,
    pub model_name: Option<String>,
}

#[derive(Debug, Default)]
struct Latest {
    usage: Option<Map<String, Value>>,
    model_name: Option<String>,
}

/// Per-run stream state. Owned by exactly one proxied request.
#[derive(Debug, Default)]
pub struct SseUsageExtractor {
    buffer: String,
    /// Leading bytes of a UTF-8 character cut off at the end of a chunk.
    utf8_tail: Vec<u8>,
    latest: Latest,
}

impl SseUsageExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk of the relayed stream.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.decode_into_buffer(chunk);

        let mut consumed = 0;
        while let Some(rel) = self.buffer[consumed..].find(EVENT_DELIMITER) {
            let end = consumed + rel;
            scan_event(&self.buffer[consumed..end], &mut self.latest);
            consumed = end + EVENT_DELIMITER.len();
        }
        if consumed > 0 {
            self.buffer.drain(..consumed);
        }
    }

    /// Most recent non-empty usage object seen so far.
    pub fn last_usage(&self) -> Option<&Map<String, Value>> {
        self.latest.usage.as_ref()
    }

    /// Model name reported alongside the most recent usage object.
    pub fn model_name(&self) -> Option<&str> {
        self.latest.model_name.as_deref()
    }

    /// Bytes of text held back waiting for an event delimiter.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() + self.utf8_tail.len()
    }

    /// End of stream. Any incomplete trailing event is discarded.
    pub fn finish(self) -> Option<ExtractedUsage> {
        if !self.buffer.is_empty() {
            trace!(
                bytes = self.buffer.len(),
                "discarding unterminated trailing event"
            );
        }
        let Latest { usage, model_name } = self.latest;
        usage.map(|usage| ExtractedUsage { usage, model_name })
    }

    fn decode_into_buffer(&mut self, chunk: &[u8]) {
        let joined;
        let mut bytes: &[u8] = if self.utf8_tail.is_empty() {
            chunk
        } else {
            let mut pending = std::mem::take(&mut self.utf8_tail);
            pending.extend_from_slice(chunk);
            joined = pending;
            &joined
        };

        loop {
            match std::str::from_utf8(bytes) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                },
                Err(e) => {
                    let (valid, rest) = bytes.split_at(e.valid_up_to());
                    self.buffer
                        .push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        // Invalid sequence: skip it and keep decoding.
                        Some(len) => bytes = &rest[len..],
                        // Truncated character: wait for the next chunk.
                        None => {
                            self.utf8_tail = rest.to_vec();
                            return;
                        },
                    }
                },
            }
        }
    }
}

fn scan_event(event: &str, latest: &mut Latest) {
    for line in event.split('\n') {
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            continue;
        };
        let data = data.trim();
        if !data.contains(USAGE_KEY) {
            continue;
        }
        let value: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                trace!(error = %e, "skipping undecodable data line");
                continue;
            },
        };
        if let Some(usage) = find_usage(&value) {
            latest.usage = Some(usage.clone());
            latest.model_name = find_model_name(&value).map(String::from);
        }
    }
}

/// Depth-first search for a non-empty `usage_metadata` object. A mapping's
/// own key is checked before its children.
pub fn find_usage(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(map) => {
            if let Some(Value::Object(usage)) = map.get(USAGE_KEY)
                && !usage.is_empty()
            {
                return Some(usage);
            }
            map.values().find_map(find_usage)
        },
        Value::Array(items) => items.iter().find_map(find_usage),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => None,
    }
}

fn find_model_name(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) => MODEL_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .filter(|name| !name.is_empty())
            .or_else(|| map.values().find_map(find_model_name)),
        Value::Array(items) => items.iter().find_map(find_model_name),
        _ => None,
    }
}
