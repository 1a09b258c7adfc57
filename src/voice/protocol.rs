//! RELAY wire format
//!
//! JSON-RPC 2.0 frames exchanged with SignalWire RELAY: request builders for
//! the calling commands used by the IVR and parsers for the frames and
//! `signalwire.event` payloads the server sends back.

use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::call::{CallState, PromptOptions, RecordOptions};
use super::{Result, VoiceError};

pub const JSONRPC_VERSION: &str = "2.0";

/// RELAY v3 handshake version, as sent by the `@signalwire/realtime-api` SDK
const PROTOCOL_MAJOR: u32 = 3;
const PROTOCOL_MINOR: u32 = 0;
const PROTOCOL_REVISION: u32 = 0;

/// Outbound JSON-RPC request
#[derive(Debug, Clone, serde::Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: String,
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: Uuid::new_v4().to_string(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: Value,
    #[serde(default)]
    pub message: String,
}

/// An inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Response to one of our requests
    Response {
        id: String,
        outcome: std::result::Result<Value, RpcError>,
    },
    /// Server-initiated request (events, pings, disconnect notices)
    Request {
        id: Value,
        method: String,
        params: Value,
    },
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Parse one text frame
pub fn parse_frame(text: &str) -> Result<Frame> {
    let raw: RawFrame = serde_json::from_str(text)?;
    if let Some(method) = raw.method {
        return Ok(Frame::Request {
            id: raw.id.unwrap_or(Value::Null),
            method,
            params: raw.params.unwrap_or(Value::Null),
        });
    }

    let id = match raw.id {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let outcome = match raw.error {
        Some(error) => Err(error),
        None => Ok(raw.result.unwrap_or(Value::Null)),
    };
    Ok(Frame::Response { id, outcome })
}

/// Empty success result acknowledging a server request
pub fn ack(id: &Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": {},
    })
}

/// Calling commands answer with `{"code": "200", "message": ...}`; anything
/// outside the 2xx range is a rejection. Results without a code are accepted.
pub fn check_result(method: &str, result: &Value) -> Result<()> {
    let code = match result.get("code") {
        Some(Value::String(code)) => code.clone(),
        Some(Value::Number(code)) => code.to_string(),
        _ => return Ok(()),
    };
    if code.starts_with('2') {
        return Ok(());
    }
    let message = result
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or_default()
        .to_string();
    Err(VoiceError::Rejected {
        method: method.to_string(),
        code,
        message,
    })
}

pub fn connect_params(project: &str, token: &str) -> Value {
    json!({
        "version": {
            "major": PROTOCOL_MAJOR,
            "minor": PROTOCOL_MINOR,
            "revision": PROTOCOL_REVISION,
        },
        "authentication": {
            "project": project,
            "token": token,
        },
        "agent": concat!("attendant/", env!("CARGO_PKG_VERSION")),
    })
}

pub fn receive_params(contexts: &[String]) -> Value {
    json!({ "contexts": contexts })
}

/// Node and call IDs addressing a call in every calling command
#[derive(Debug, Clone, Copy)]
pub struct CallRef<'a> {
    pub node_id: &'a str,
    pub call_id: &'a str,
}

impl CallRef<'_> {
    fn base(&self) -> serde_json::Map<String, Value> {
        let mut params = serde_json::Map::new();
        params.insert("node_id".to_string(), json!(self.node_id));
        params.insert("call_id".to_string(), json!(self.call_id));
        params
    }

    pub fn answer(&self) -> Value {
        Value::Object(self.base())
    }

    pub fn end(&self) -> Value {
        let mut params = self.base();
        params.insert("reason".to_string(), json!("hangup"));
        Value::Object(params)
    }

    pub fn play_tts(&self, control_id: &str, text: &str) -> Value {
        let mut params = self.base();
        params.insert("control_id".to_string(), json!(control_id));
        params.insert("play".to_string(), json!([tts_media(text)]));
        Value::Object(params)
    }

    pub fn prompt_tts(&self, control_id: &str, text: &str, options: &PromptOptions) -> Value {
        let mut digits = json!({
            "max": options.digit_count,
            "digit_timeout": options.per_digit_timeout.as_secs_f64(),
        });
        if let Some(ref terminators) = options.terminators {
            digits["terminators"] = json!(terminators);
        }

        let mut params = self.base();
        params.insert("control_id".to_string(), json!(control_id));
        params.insert("play".to_string(), json!([tts_media(text)]));
        params.insert("collect".to_string(), json!({ "digits": digits }));
        Value::Object(params)
    }

    pub fn record_audio(&self, control_id: &str, options: &RecordOptions) -> Value {
        let mut params = self.base();
        params.insert("control_id".to_string(), json!(control_id));
        params.insert(
            "record".to_string(),
            json!({
                "audio": {
                    "beep": options.beep,
                    "terminators": options.terminators,
                }
            }),
        );
        Value::Object(params)
    }
}

fn tts_media(text: &str) -> Value {
    json!({ "type": "tts", "params": { "text": text } })
}

/// Kind of a call control operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Play,
    Collect,
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Playing,
    Paused,
    Finished,
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Recording,
    Paused,
    Finished,
    NoInput,
    #[serde(other)]
    Unknown,
}

/// Result of a collect operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectResult {
    Digits {
        digits: String,
        terminator: Option<String>,
    },
    Speech(String),
    NoInput,
    NoMatch,
    StartOfInput,
    Error,
    Unknown(String),
}

impl CollectResult {
    fn from_value(result: &Value) -> Self {
        let kind = result.get("type").and_then(|t| t.as_str()).unwrap_or("");
        let params = result.get("params");
        let param = |name: &str| {
            params
                .and_then(|p| p.get(name))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        };
        match kind {
            "digit" => Self::Digits {
                digits: param("digits").unwrap_or_default(),
                terminator: param("terminator").filter(|t| !t.is_empty()),
            },
            "speech" => Self::Speech(param("text").unwrap_or_default()),
            "no_input" => Self::NoInput,
            "no_match" => Self::NoMatch,
            "start_of_input" => Self::StartOfInput,
            "error" => Self::Error,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, Self::StartOfInput)
    }
}

/// Who is calling, as announced by `calling.call.receive`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDescriptor {
    pub call_id: String,
    pub node_id: String,
    pub context: Option<String>,
    pub from: String,
    pub to: String,
}

/// A decoded `signalwire.event`
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    CallReceived(CallDescriptor),
    CallState {
        call_id: String,
        state: CallState,
    },
    Play {
        call_id: String,
        control_id: String,
        state: PlayState,
    },
    Collect {
        call_id: String,
        control_id: String,
        result: CollectResult,
    },
    Record {
        call_id: String,
        control_id: String,
        state: RecordState,
        url: Option<String>,
        duration: Option<f64>,
        size: Option<u64>,
    },
    Other(String),
}

impl RelayEvent {
    /// Call the event belongs to
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Self::CallReceived(desc) => Some(&desc.call_id),
            Self::CallState { call_id, .. }
            | Self::Play { call_id, .. }
            | Self::Collect { call_id, .. }
            | Self::Record { call_id, .. } => Some(call_id),
            Self::Other(_) => None,
        }
    }

    /// Control this event completes, if it is the last event for it
    pub fn final_control(&self) -> Option<(ControlKind, &str)> {
        match self {
            Self::Play {
                control_id, state, ..
            } if matches!(state, PlayState::Finished | PlayState::Error) => {
                Some((ControlKind::Play, control_id))
            }
            Self::Collect {
                control_id, result, ..
            } if result.is_final() => Some((ControlKind::Collect, control_id)),
            Self::Record {
                control_id, state, ..
            } if matches!(state, RecordState::Finished | RecordState::NoInput) => {
                Some((ControlKind::Record, control_id))
            }
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct EventEnvelope {
    event_type: String,
    #[serde(default)]
    params: Value,
}

#[derive(Deserialize)]
struct ReceiveParams {
    call_id: String,
    node_id: String,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    device: Option<Device>,
}

#[derive(Deserialize)]
struct Device {
    #[serde(default)]
    params: DeviceParams,
}

#[derive(Deserialize, Default)]
struct DeviceParams {
    #[serde(default)]
    from_number: String,
    #[serde(default)]
    to_number: String,
}

#[derive(Deserialize)]
struct StateParams {
    call_id: String,
    call_state: String,
}

#[derive(Deserialize)]
struct PlayParams {
    call_id: String,
    control_id: String,
    state: PlayState,
}

#[derive(Deserialize)]
struct CollectParams {
    call_id: String,
    control_id: String,
    #[serde(default)]
    result: Value,
}

#[derive(Deserialize)]
struct RecordParams {
    call_id: String,
    control_id: String,
    state: RecordState,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    size: Option<u64>,
}

/// Decode the params of a `signalwire.event` request
pub fn parse_event(params: &Value) -> Result<RelayEvent> {
    let envelope = EventEnvelope::deserialize(params)?;
    let inner = &envelope.params;
    let event = match envelope.event_type.as_str() {
        "calling.call.receive" => {
            let p = ReceiveParams::deserialize(inner)?;
            let device = p.device.map(|d| d.params).unwrap_or_default();
            RelayEvent::CallReceived(CallDescriptor {
                call_id: p.call_id,
                node_id: p.node_id,
                context: p.context,
                from: device.from_number,
                to: device.to_number,
            })
        }
        "calling.call.state" => {
            let p = StateParams::deserialize(inner)?;
            match CallState::parse(&p.call_state) {
                Some(state) => RelayEvent::CallState {
                    call_id: p.call_id,
                    state,
                },
                None => RelayEvent::Other(format!("calling.call.state:{}", p.call_state)),
            }
        }
        "calling.call.play" => {
            let p = PlayParams::deserialize(inner)?;
            RelayEvent::Play {
                call_id: p.call_id,
                control_id: p.control_id,
                state: p.state,
            }
        }
        "calling.call.collect" => {
            let p = CollectParams::deserialize(inner)?;
            RelayEvent::Collect {
                call_id: p.call_id,
                control_id: p.control_id,
                result: CollectResult::from_value(&p.result),
            }
        }
        "calling.call.record" => {
            let p = RecordParams::deserialize(inner)?;
            RelayEvent::Record {
                call_id: p.call_id,
                control_id: p.control_id,
                state: p.state,
                url: p.url,
                duration: p.duration,
                size: p.size,
            }
        }
        other => RelayEvent::Other(other.to_string()),
    };
    Ok(event)
}
