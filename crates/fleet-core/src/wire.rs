use crate::model::{parse_leading_int, Node, Timestamp, Workunit};
use std::fmt;
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;

/// Delete payload that marks a successfully finished work unit.
pub const COMPLETION_MARKER: &str = "FINISHED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Create,
    Update,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Create => "CREATE",
            Verb::Update => "UPDATE",
            Verb::Delete => "DELETE",
        }
    }

    fn parse(token: &str) -> Result<Self, WireError> {
        match token {
            "CREATE" => Ok(Verb::Create),
            "UPDATE" => Ok(Verb::Update),
            "DELETE" => Ok(Verb::Delete),
            other => Err(WireError::UnknownVerb(other.to_string())),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Worker,
    Workunit,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Worker => "WORKER",
            ItemType::Workunit => "WORKUNIT",
        }
    }

    fn parse(token: &str) -> Result<Self, WireError> {
        match token {
            "WORKER" => Ok(ItemType::Worker),
            "WORKUNIT" => Ok(ItemType::Workunit),
            other => Err(WireError::UnknownItemType(other.to_string())),
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("empty message")]
    Empty,
    #[error("message has no item type")]
    MissingItemType,
    #[error("message has no id")]
    MissingId,
    #[error("unknown verb '{0}'")]
    UnknownVerb(String),
    #[error("unknown item type '{0}'")]
    UnknownItemType(String),
    #[error("unparseable clock reference '{0}'")]
    BadTimestamp(String),
    #[error("payload rejected: {0}")]
    Payload(String),
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("buffer exceeds max size without delimiter: {size} > {max}")]
    OversizedBuffer { size: usize, max: usize },
    #[error("frame is not valid utf-8")]
    Utf8,
}

/// One message as it appeared on the stream, payload still raw.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamLine {
    /// Server clock reference, seconds since the epoch.
    Date(Timestamp),
    Delta(DeltaMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaMessage {
    pub verb: Verb,
    pub item_type: ItemType,
    pub id: String,
    pub payload: String,
}

/// A delta with its payload decoded for the item type it addresses.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    UpsertWorker(Node),
    DeleteWorker { id: String },
    UpsertWorkunit { verb: Verb, unit: Workunit },
    DeleteWorkunit { id: String, completion: String },
}

impl DeltaMessage {
    /// Decode the payload: a plain status token for deletes, a JSON record
    /// otherwise.
    pub fn decode(&self) -> Result<Delta, WireError> {
        let payload_err = |err: serde_json::Error| WireError::Payload(err.to_string());
        match (self.verb, self.item_type) {
            (Verb::Delete, ItemType::Worker) => Ok(Delta::DeleteWorker {
                id: self.id.clone(),
            }),
            (Verb::Delete, ItemType::Workunit) => Ok(Delta::DeleteWorkunit {
                id: self.id.clone(),
                completion: self.payload.trim().to_string(),
            }),
            (verb, ItemType::Worker) => Node::from_payload(&self.id, &self.payload)
                .map(Delta::UpsertWorker)
                .map_err(|err| {
                    tracing::trace!(event = "worker_payload_rejected", %verb, error = %err);
                    payload_err(err)
                }),
            (verb, ItemType::Workunit) => Workunit::from_payload(&self.id, &self.payload)
                .map(|unit| Delta::UpsertWorkunit { verb, unit })
                .map_err(payload_err),
        }
    }
}

/// Parse `VERB ITEMTYPE ID PAYLOAD`, where the payload is everything after
/// the third space and may itself contain spaces.
///
/// `DATE` lines carry a clock reference instead: `DATE _ 1700000000`. The
/// short form `DATE 1700000000` is accepted too.
pub fn parse_stream_line(line: &str) -> Result<StreamLine, WireError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(WireError::Empty);
    }
    let mut parts = line.splitn(4, ' ');
    let verb = parts.next().unwrap_or_default();
    let item_type = parts.next().filter(|token| !token.is_empty());
    let id = parts.next().filter(|token| !token.is_empty());
    let payload = parts.next().unwrap_or_default();

    if verb == "DATE" {
        return id
            .and_then(parse_reference)
            .or_else(|| item_type.and_then(parse_reference))
            .map(StreamLine::Date)
            .ok_or_else(|| WireError::BadTimestamp(line.to_string()));
    }

    let verb = Verb::parse(verb)?;
    let item_type = ItemType::parse(item_type.ok_or(WireError::MissingItemType)?)?;
    let id = id.ok_or(WireError::MissingId)?;
    Ok(StreamLine::Delta(DeltaMessage {
        verb,
        item_type,
        id: id.to_string(),
        payload: payload.to_string(),
    }))
}

fn parse_reference(token: &str) -> Option<Timestamp> {
    let token = token.trim();
    token
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .or_else(|| parse_leading_int(token).map(|value| value as f64))
}

/// How message lines are framed on the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// One message per newline-terminated line.
    #[default]
    Lines,
    /// `text/event-stream`: messages travel in `data:` fields.
    EventStream,
}

#[derive(Debug, Clone, Default)]
pub struct DecodeReport {
    pub lines: Vec<String>,
    pub errors: Vec<WireError>,
}

/// Splits arbitrary byte chunks into message lines.
pub struct StreamFrameDecoder {
    framing: Framing,
    max_frame_bytes: usize,
    pending: Vec<u8>,
}

impl StreamFrameDecoder {
    pub fn new(framing: Framing, max_frame_bytes: usize) -> Self {
        Self {
            framing,
            max_frame_bytes,
            pending: Vec::new(),
        }
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) -> DecodeReport {
        let mut report = DecodeReport::default();
        if !chunk.is_empty() {
            self.pending.extend_from_slice(chunk);
        }

        while let Some(newline_idx) = self.pending.iter().position(|byte| *byte == b'\n') {
            let mut frame = self.pending.drain(..=newline_idx).collect::<Vec<u8>>();
            frame.pop();
            if frame.ends_with(b"\r") {
                frame.pop();
            }
            if frame.is_empty() {
                continue;
            }
            self.decode_raw_frame(&frame, &mut report);
        }

        if self.pending.len() > self.max_frame_bytes {
            report.errors.push(WireError::OversizedBuffer {
                size: self.pending.len(),
                max: self.max_frame_bytes,
            });
            self.pending.clear();
        }

        report
    }

    /// Flush a final unterminated line, e.g. when the peer closes.
    pub fn finish(&mut self) -> DecodeReport {
        let mut report = DecodeReport::default();
        if self.pending.is_empty() {
            return report;
        }
        let mut frame = std::mem::take(&mut self.pending);
        if frame.ends_with(b"\r") {
            frame.pop();
        }
        if !frame.is_empty() {
            self.decode_raw_frame(&frame, &mut report);
        }
        report
    }

    fn decode_raw_frame(&self, frame: &[u8], report: &mut DecodeReport) {
        if frame.len() > self.max_frame_bytes {
            report.errors.push(WireError::OversizedFrame {
                size: frame.len(),
                max: self.max_frame_bytes,
            });
            return;
        }
        let Ok(text) = std::str::from_utf8(frame) else {
            report.errors.push(WireError::Utf8);
            return;
        };
        match self.framing {
            Framing::Lines => report.lines.push(text.to_string()),
            Framing::EventStream => {
                // Comments and the other SSE fields (event, id, retry) carry no message.
                if let Some(data) = text.strip_prefix("data:") {
                    let data = data.strip_prefix(' ').unwrap_or(data);
                    if !data.is_empty() {
                        report.lines.push(data.to_string());
                    }
                }
            }
        }
    }
}

impl Default for StreamFrameDecoder {
    fn default() -> Self {
        Self::new(Framing::Lines, DEFAULT_MAX_FRAME_BYTES)
    }
}
