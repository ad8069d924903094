use ember_dap::RequestError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("malformed {command} response body: {source}")]
    Body {
        command: &'static str,
        source: serde_json::Error,
    },
    #[error("failed to encode {command} arguments: {source}")]
    Encode {
        command: &'static str,
        source: serde_json::Error,
    },
    /// Local input problems; no round trip was made.
    #[error("{0}")]
    UserInput(String),
}

/// Deserialize a response body, treating an absent body as malformed when the
/// target type expects fields.
pub(crate) fn decode_body<T: DeserializeOwned>(
    command: &'static str,
    body: Option<Value>,
) -> EngineResult<T> {
    serde_json::from_value(body.unwrap_or(Value::Null))
        .map_err(|source| EngineError::Body { command, source })
}

pub(crate) fn encode_args<T: Serialize>(
    command: &'static str,
    arguments: &T,
) -> EngineResult<Value> {
    serde_json::to_value(arguments).map_err(|source| EngineError::Encode { command, source })
}
