//! Live-updates wire protocol.
//!
//! Every frame on the updates channel is a JSON text frame of the form
//! `{"type": "<kind>", "data": <payload>}`. Payloads are owned by the backend
//! and passed through as [`serde_json::Value`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::ProtocolError;

/// Path of the updates endpoint, relative to the API base.
pub const UPDATES_PATH: &str = "/ws/updates";

/// Health check endpoints exposed by the backend.
pub const HEALTH_PATH: &str = "/health";
pub const SONAR_HEALTH_PATH: &str = "/api/health/sonar";

/// Profile management root.
pub const PROFILES_PATH: &str = "/api/v1/profiles";

/// Raw `{type, data}` wrapper around every inbound frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

/// Event kinds the dashboard understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PipelineUpdate,
    LogEntry,
    ProfileChange,
    ScheduleUpdate,
    QueueUpdate,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::PipelineUpdate,
        EventKind::LogEntry,
        EventKind::ProfileChange,
        EventKind::ScheduleUpdate,
        EventKind::QueueUpdate,
    ];

    /// Wire name used in the envelope's `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PipelineUpdate => "pipeline_update",
            EventKind::LogEntry => "log_entry",
            EventKind::ProfileChange => "profile_change",
            EventKind::ScheduleUpdate => "schedule_update",
            EventKind::QueueUpdate => "queue_update",
        }
    }

    pub fn from_wire(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == kind)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recognised server event with its opaque payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    PipelineUpdate(Value),
    LogEntry(Value),
    ProfileChange(Value),
    ScheduleUpdate(Value),
    QueueUpdate(Value),
}

impl ServerEvent {
    pub fn new(kind: EventKind, data: Value) -> Self {
        match kind {
            EventKind::PipelineUpdate => ServerEvent::PipelineUpdate(data),
            EventKind::LogEntry => ServerEvent::LogEntry(data),
            EventKind::ProfileChange => ServerEvent::ProfileChange(data),
            EventKind::ScheduleUpdate => ServerEvent::ScheduleUpdate(data),
            EventKind::QueueUpdate => ServerEvent::QueueUpdate(data),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::PipelineUpdate(_) => EventKind::PipelineUpdate,
            ServerEvent::LogEntry(_) => EventKind::LogEntry,
            ServerEvent::ProfileChange(_) => EventKind::ProfileChange,
            ServerEvent::ScheduleUpdate(_) => EventKind::ScheduleUpdate,
            ServerEvent::QueueUpdate(_) => EventKind::QueueUpdate,
        }
    }

    pub fn data(&self) -> &Value {
        match self {
            ServerEvent::PipelineUpdate(data)
            | ServerEvent::LogEntry(data)
            | ServerEvent::ProfileChange(data)
            | ServerEvent::ScheduleUpdate(data)
            | ServerEvent::QueueUpdate(data) => data,
        }
    }

    /// Deserialize the payload into a caller-chosen shape.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        T::deserialize(self.data()).map_err(|e| ProtocolError::Payload {
            kind: self.kind().as_str(),
            reason: e.to_string(),
        })
    }

    /// Convert an envelope, returning `None` for kinds this client does not know.
    pub fn from_envelope(envelope: Envelope) -> Option<Self> {
        let kind = EventKind::from_wire(&envelope.kind)?;
        Some(Self::new(kind, envelope.data))
    }

    pub fn into_envelope(self) -> Envelope {
        let kind = self.kind();
        let data = match self {
            ServerEvent::PipelineUpdate(data)
            | ServerEvent::LogEntry(data)
            | ServerEvent::ProfileChange(data)
            | ServerEvent::ScheduleUpdate(data)
            | ServerEvent::QueueUpdate(data) => data,
        };
        Envelope::new(kind.as_str(), data)
    }

    /// Encode as a JSON text frame.
    pub fn to_frame(&self) -> String {
        serde_json::json!({ "type": self.kind().as_str(), "data": self.data() }).to_string()
    }
}

/// Outcome of decoding one text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Event(ServerEvent),
    /// Well-formed envelope with a `type` this client does not handle.
    Unknown(Envelope),
}

/// Decode a text frame into an event.
///
/// Frames that are not JSON objects with a string `type` are malformed;
/// unrecognised types decode to [`Decoded::Unknown`].
pub fn decode_frame(text: &str) -> Result<Decoded, ProtocolError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    match EventKind::from_wire(&envelope.kind) {
        Some(kind) => Ok(Decoded::Event(ServerEvent::new(kind, envelope.data))),
        None => Ok(Decoded::Unknown(envelope)),
    }
}

/// Derive the updates endpoint from the HTTP API base.
///
/// `http` maps to `ws` and `https` to `wss`; a `ws`/`wss` base keeps its
/// scheme. [`UPDATES_PATH`] is appended to whatever path the base carries.
pub fn updates_url(api_base: &str) -> Result<Url, ProtocolError> {
    let mut url = Url::parse(api_base.trim())
        .map_err(|e| ProtocolError::InvalidUrl(format!("{api_base}: {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ProtocolError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| ProtocolError::UnsupportedScheme(url.scheme().to_string()))?;

    let path = format!("{}{}", url.path().trim_end_matches('/'), UPDATES_PATH);
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}
