//! Home Assistant websocket API messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Authentication phase messages from the server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMessage {
    AuthRequired {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthOk {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
}

/// Client authentication request
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub access_token: &'a str,
}

impl<'a> AuthRequest<'a> {
    pub fn new(access_token: &'a str) -> Self {
        Self {
            kind: "auth",
            access_token,
        }
    }
}

/// Error body of a failed command
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorBody {
    /// Usually a string such as `not_found`
    #[serde(default)]
    pub code: Value,
    #[serde(default)]
    pub message: String,
}

/// Reply to an id-tagged command
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultMessage {
    pub id: u64,
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

impl ResultMessage {
    /// Command outcome: the result payload, or the server's error message
    pub fn into_outcome(self) -> std::result::Result<Value, String> {
        if self.success {
            return Ok(self.result.unwrap_or(Value::Null));
        }
        Err(match self.error {
            Some(err) if !err.message.is_empty() => err.message,
            Some(ErrorBody {
                code: Value::String(code),
                ..
            }) => code,
            Some(err) => err.code.to_string(),
            None => "unknown error".to_string(),
        })
    }
}

/// Message received after authentication
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Result(ResultMessage),
    Pong { id: u64 },
    /// Events and anything this client does not track
    Other(String),
    /// Element of a coalesced batch that could not be decoded
    Malformed(String),
}

/// Parse one text frame. The server may coalesce messages into an array.
///
/// Each element is decoded on its own; an undecodable one becomes
/// [`Incoming::Malformed`] without affecting its neighbours.
pub fn parse_incoming(text: &str) -> serde_json::Result<Vec<Incoming>> {
    let value: Value = serde_json::from_str(text)?;
    let items = match value {
        Value::Array(items) => items,
        item => vec![item],
    };
    Ok(items
        .into_iter()
        .map(|item| classify(item).unwrap_or_else(|e| Incoming::Malformed(e.to_string())))
        .collect())
}

fn classify(value: Value) -> serde_json::Result<Incoming> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match kind.as_str() {
        "result" => Ok(Incoming::Result(serde_json::from_value(value)?)),
        "pong" => {
            let id = value.get("id").and_then(Value::as_u64).unwrap_or_default();
            Ok(Incoming::Pong { id })
        }
        _ => Ok(Incoming::Other(kind)),
    }
}

/// Attach the message id to a command object
pub fn with_id(mut command: Value, id: u64) -> Value {
    if let Value::Object(map) = &mut command {
        map.insert("id".to_string(), Value::from(id));
    }
    command
}
