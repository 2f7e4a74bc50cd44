use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of envelope kinds that cross the wire in either direction.
///
/// Unknown values fail to deserialize rather than silently falling back to a
/// default — callers on the wire boundary should reject the frame instead of
/// guessing intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvelopeType {
    // client -> server
    Chat,
    GetAgents,
    SelectAgent,
    Cancel,
    AnalyzeCode,
    ScanWorkspace,
    QueryContext,
    Ping,
    // server -> client
    ChatResponse,
    StreamStart,
    StreamChunk,
    StreamEnd,
    AgentList,
    AgentStatus,
    Error,
    AnalysisResult,
    SecurityFindings,
    QueryResult,
    Pong,
}

/// One client/server unit on the wire: `{type, id?, data, timestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn new(kind: EnvelopeType, data: Value) -> Self {
        Self {
            kind,
            id: None,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builds an `error` envelope correlated to `id`.
    pub fn error(id: Option<String>, message: impl Into<String>, code: Option<&str>) -> Self {
        let mut data = serde_json::json!({ "message": message.into() });
        if let Some(code) = code {
            data["code"] = Value::String(code.to_string());
        }
        Self {
            kind: EnvelopeType::Error,
            id,
            data,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let env = Envelope::new(EnvelopeType::Ping, Value::Null).with_id("req-1");
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id.as_deref(), Some("req-1"));
        assert!(matches!(back.kind, EnvelopeType::Ping));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let raw = r#"{"type":"not-a-real-type","data":null,"timestamp":"2024-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<Envelope>(raw).is_err());
    }
}
