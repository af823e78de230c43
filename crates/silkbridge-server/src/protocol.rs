//! Typed message schema for the bridge protocol.
//!
//! Every message is identified by a numeric [`MessageType`] and carries a
//! JSON object payload. The client sends [`Request`]s (types 0-2); the
//! server answers each with exactly one [`Response`] (types 10-12, 255).
//!
//! | Type | Name               | Direction |
//! |------|--------------------|-----------|
//! | 0    | `INITIALIZE`       | in        |
//! | 1    | `GET_ACTION`       | in        |
//! | 2    | `STORE_TRANSITION` | in        |
//! | 10   | `INIT_RESPONSE`    | out       |
//! | 11   | `ACTION_RESPONSE`  | out       |
//! | 12   | `TRANSITION_ACK`   | out       |
//! | 255  | `ERROR`            | out       |
//!
//! Request payloads are decoded field by field so that a missing or
//! ill-typed field produces a [`RequestError`] naming it. Field names are
//! snake_case; camelCase spellings (`taskId`, `nextState`, ...) and the
//! names used by existing game clients (`boss_name`, ...) are accepted too.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use silkbridge_core::task::InitOutcome;
use silkbridge_core::types::{Layout, TaskSpec};
use thiserror::Error;

use crate::framing::Frame;

/// Largest accepted frame length (type byte plus payload).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// Numeric message tag carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Initialize = 0,
    GetAction = 1,
    StoreTransition = 2,
    InitResponse = 10,
    ActionResponse = 11,
    TransitionAck = 12,
    Error = 255,
}

impl MessageType {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Protocol name, e.g. `"GET_ACTION"`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Initialize => "INITIALIZE",
            Self::GetAction => "GET_ACTION",
            Self::StoreTransition => "STORE_TRANSITION",
            Self::InitResponse => "INIT_RESPONSE",
            Self::ActionResponse => "ACTION_RESPONSE",
            Self::TransitionAck => "TRANSITION_ACK",
            Self::Error => "ERROR",
        }
    }

    /// Whether clients may send this type.
    #[must_use]
    pub const fn is_request(self) -> bool {
        matches!(
            self,
            Self::Initialize | Self::GetAction | Self::StoreTransition
        )
    }
}

#[allow(clippy::use_self)]
impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            0 => Ok(MessageType::Initialize),
            1 => Ok(MessageType::GetAction),
            2 => Ok(MessageType::StoreTransition),
            10 => Ok(MessageType::InitResponse),
            11 => Ok(MessageType::ActionResponse),
            12 => Ok(MessageType::TransitionAck),
            255 => Ok(MessageType::Error),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that end a session. None of these are reported to the peer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    #[error("Invalid frame length {length} (must be between 1 and {max})")]
    InvalidLength { length: usize, max: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} cannot be decoded as a response")]
    WrongDirection(MessageType),

    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: crate::state_machine::SessionPhase,
        to: crate::state_machine::SessionPhase,
    },
}

/// A request payload that could not be decoded. Reported to the client as
/// an `ERROR` response; the session continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("missing required field '{field}' in {message}")]
    MissingField {
        field: &'static str,
        message: MessageType,
    },

    #[error("invalid field '{field}' in {message}: {reason}")]
    InvalidField {
        field: &'static str,
        message: MessageType,
        reason: String,
    },

    #[error("malformed JSON payload in {message}: {reason}")]
    MalformedJson {
        message: MessageType,
        reason: String,
    },

    #[error("{0} is not a client request")]
    UnexpectedMessage(MessageType),
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Payload of a `STORE_TRANSITION` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionPayload {
    pub state: Vec<f32>,
    pub action: Vec<u32>,
    pub reward: f32,
    pub next_state: Vec<f32>,
    pub done: bool,
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Initialize(TaskSpec),
    GetAction { state: Vec<f32>, deterministic: bool },
    StoreTransition(TransitionPayload),
}

impl Request {
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Initialize(_) => MessageType::Initialize,
            Self::GetAction { .. } => MessageType::GetAction,
            Self::StoreTransition(_) => MessageType::StoreTransition,
        }
    }

    /// Decode a request from a received frame.
    ///
    /// An empty payload is treated as an empty object, so it reports the
    /// first missing required field.
    pub fn from_frame(frame: &Frame) -> Result<Self, RequestError> {
        let message = frame.message_type;
        if !message.is_request() {
            return Err(RequestError::UnexpectedMessage(message));
        }
        let map = parse_object(message, &frame.payload)?;
        let fields = Fields { message, map: &map };

        match message {
            MessageType::Initialize => Ok(Self::Initialize(TaskSpec {
                task_id: fields.required("task_id", &["taskId", "boss_name"])?,
                total_obs_dim: fields.required("total_obs_dim", &["totalObsDim", "observation_size"])?,
                action_shape: fields.required("action_shape", &["actionShape", "action_space_shape"])?,
                layout: fields
                    .optional::<Layout>("layout", &["observation_type"])?
                    .unwrap_or_default(),
                vector_dim: fields.optional("vector_dim", &["vectorDim", "vector_obs_size"])?,
                grid_width: fields
                    .optional("grid_width", &["gridWidth", "visual_width"])?
                    .unwrap_or(0),
                grid_height: fields
                    .optional("grid_height", &["gridHeight", "visual_height"])?
                    .unwrap_or(0),
            })),
            MessageType::GetAction => Ok(Self::GetAction {
                state: fields.required("state", &[])?,
                deterministic: fields.optional("deterministic", &[])?.unwrap_or(false),
            }),
            MessageType::StoreTransition => Ok(Self::StoreTransition(TransitionPayload {
                state: fields.required("state", &[])?,
                action: fields.required("action", &[])?,
                reward: fields.required("reward", &[])?,
                next_state: fields.required("next_state", &["nextState"])?,
                done: fields.required("done", &[])?,
            })),
            other => Err(RequestError::UnexpectedMessage(other)),
        }
    }

    /// Encode for sending. Uses the canonical field names.
    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        let payload = match self {
            Self::Initialize(spec) => serde_json::to_vec(spec)?,
            Self::GetAction {
                state,
                deterministic,
            } => serde_json::to_vec(&serde_json::json!({
                "state": state,
                "deterministic": deterministic,
            }))?,
            Self::StoreTransition(t) => serde_json::to_vec(t)?,
        };
        Ok(Frame::new(self.message_type(), payload))
    }
}

fn parse_object(message: MessageType, payload: &[u8]) -> Result<Map<String, Value>, RequestError> {
    if payload.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(RequestError::MalformedJson {
            message,
            reason: "payload is not a JSON object".into(),
        }),
        Err(e) => Err(RequestError::MalformedJson {
            message,
            reason: e.to_string(),
        }),
    }
}

/// Field lookup over a request payload. Aliases are consulted in order
/// after the canonical name; `null` counts as absent.
struct Fields<'a> {
    message: MessageType,
    map: &'a Map<String, Value>,
}

impl Fields<'_> {
    fn lookup(&self, field: &str, aliases: &[&str]) -> Option<&Value> {
        std::iter::once(field)
            .chain(aliases.iter().copied())
            .filter_map(|name| self.map.get(name))
            .find(|v| !v.is_null())
    }

    fn optional<T: DeserializeOwned>(
        &self,
        field: &'static str,
        aliases: &[&str],
    ) -> Result<Option<T>, RequestError> {
        self.lookup(field, aliases)
            .map(|v| {
                T::deserialize(v).map_err(|e| RequestError::InvalidField {
                    field,
                    message: self.message,
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn required<T: DeserializeOwned>(
        &self,
        field: &'static str,
        aliases: &[&str],
    ) -> Result<T, RequestError> {
        self.optional(field, aliases)?
            .ok_or(RequestError::MissingField {
                field,
                message: self.message,
            })
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// `INIT_RESPONSE` payload.
///
/// Written under three spellings: snake_case, camelCase (`taskId`,
/// `totalObsDim`, `checkpointLoaded`) and the `boss_name` /
/// `observation_size` keys existing game clients read. Decoding reads the
/// snake_case keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "InitResponseWire", into = "InitResponseWire")]
pub struct InitResponse {
    pub initialized: bool,
    pub task_id: String,
    pub total_obs_dim: usize,
    pub checkpoint_loaded: bool,
}

impl From<InitOutcome> for InitResponse {
    fn from(outcome: InitOutcome) -> Self {
        Self {
            initialized: outcome.initialized,
            task_id: outcome.task_id,
            total_obs_dim: outcome.total_obs_dim,
            checkpoint_loaded: outcome.checkpoint_loaded,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct InitResponseWire {
    initialized: bool,
    task_id: String,
    total_obs_dim: usize,
    checkpoint_loaded: bool,
    #[serde(default, skip_deserializing, rename = "taskId")]
    task_id_camel: String,
    #[serde(default, skip_deserializing, rename = "totalObsDim")]
    total_obs_dim_camel: usize,
    #[serde(default, skip_deserializing, rename = "checkpointLoaded")]
    checkpoint_loaded_camel: bool,
    #[serde(default, skip_deserializing)]
    boss_name: String,
    #[serde(default, skip_deserializing)]
    observation_size: usize,
}

impl From<InitResponse> for InitResponseWire {
    fn from(r: InitResponse) -> Self {
        Self {
            initialized: r.initialized,
            task_id_camel: r.task_id.clone(),
            total_obs_dim_camel: r.total_obs_dim,
            checkpoint_loaded_camel: r.checkpoint_loaded,
            boss_name: r.task_id.clone(),
            observation_size: r.total_obs_dim,
            task_id: r.task_id,
            total_obs_dim: r.total_obs_dim,
            checkpoint_loaded: r.checkpoint_loaded,
        }
    }
}

impl From<InitResponseWire> for InitResponse {
    fn from(w: InitResponseWire) -> Self {
        Self {
            initialized: w.initialized,
            task_id: w.task_id,
            total_obs_dim: w.total_obs_dim,
            checkpoint_loaded: w.checkpoint_loaded,
        }
    }
}

/// `ACTION_RESPONSE` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub action: Vec<u32>,
}

/// `TRANSITION_ACK` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionAck {
    pub success: bool,
}

/// `ERROR` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Init(InitResponse),
    Action(ActionResponse),
    TransitionAck(TransitionAck),
    Error(ErrorResponse),
}

impl Response {
    /// Create an error response.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorResponse {
            error: message.into(),
        })
    }

    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Init(_) => MessageType::InitResponse,
            Self::Action(_) => MessageType::ActionResponse,
            Self::TransitionAck(_) => MessageType::TransitionAck,
            Self::Error(_) => MessageType::Error,
        }
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        let payload = match self {
            Self::Init(p) => serde_json::to_vec(p)?,
            Self::Action(p) => serde_json::to_vec(p)?,
            Self::TransitionAck(p) => serde_json::to_vec(p)?,
            Self::Error(p) => serde_json::to_vec(p)?,
        };
        Ok(Frame::new(self.message_type(), payload))
    }

    /// Decode a response frame (client side).
    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        let p = &frame.payload;
        match frame.message_type {
            MessageType::InitResponse => Ok(Self::Init(serde_json::from_slice(p)?)),
            MessageType::ActionResponse => Ok(Self::Action(serde_json::from_slice(p)?)),
            MessageType::TransitionAck => Ok(Self::TransitionAck(serde_json::from_slice(p)?)),
            MessageType::Error => Ok(Self::Error(serde_json::from_slice(p)?)),
            other => Err(ProtocolError::WrongDirection(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
