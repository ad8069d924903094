use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single DAP message, tagged by the JSON `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Request(Request),
    Response(Response),
    Event(Event),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub seq: i64,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub seq: i64,
    pub request_seq: i64,
    pub success: bool,
    #[serde(default)]
    pub command: String,
    /// Error message, populated when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub seq: i64,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Message {
    pub fn request(seq: i64, command: impl Into<String>, arguments: Option<Value>) -> Self {
        Message::Request(Request {
            seq,
            command: command.into(),
            arguments,
        })
    }

    pub fn response(seq: i64, request: &Request, success: bool, body: Option<Value>) -> Self {
        Message::Response(Response {
            seq,
            request_seq: request.seq,
            success,
            command: request.command.clone(),
            message: None,
            body,
        })
    }

    pub fn error_response(seq: i64, request: &Request, message: impl Into<String>) -> Self {
        Message::Response(Response {
            seq,
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(message.into()),
            body: None,
        })
    }

    pub fn event(seq: i64, event: impl Into<String>, body: Option<Value>) -> Self {
        Message::Event(Event {
            seq,
            event: event.into(),
            body,
        })
    }
}
