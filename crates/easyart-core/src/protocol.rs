//! Worker wire protocol
//!
//! Every message in either direction is exactly one line of UTF-8 JSON.
//! Requests are `{"id", "method", "params"}`; responses carry the same `id`
//! plus either `result` or `error`.

use crate::error::{WorkerError, WorkerResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::fmt;

/// Method names understood by the worker
pub mod methods {
    pub const IMAGES_GENERATE: &str = "images.generate";
    pub const LOCAL_SD_START: &str = "local_sd.start";
    pub const LOCAL_SD_SHUTDOWN: &str = "local_sd.shutdown";
    pub const LOCAL_SD_SWITCH_MODEL: &str = "local_sd.switch_model";
}

/// Default message used when the worker's error object has none
const DEFAULT_REMOTE_MESSAGE: &str = "error";

/// Correlation id linking a request to its response
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh id: 128 random bits as 32 lowercase hex characters
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for RequestId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters for `images.generate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateParams {
    pub prompt: String,
    pub size: String,
    #[serde(rename = "n")]
    pub count: u32,
    pub model: String,
    pub preset: String,
    pub negative_prompt: String,
    /// Backend-specific overrides (steps, sampler, hires settings, ...)
    pub sd_params: Map<String, Value>,
}

impl GenerateParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            size: "1024x1024".to_string(),
            count: 1,
            model: "stable-diffusion".to_string(),
            preset: "balanced".to_string(),
            negative_prompt: "bad quality".to_string(),
            sd_params: Map::new(),
        }
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = negative_prompt.into();
        self
    }

    pub fn with_sd_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sd_params.insert(key.into(), value.into());
        self
    }

    /// Replace all overrides. Non-object values are ignored.
    pub fn with_sd_params(mut self, overrides: Value) -> Self {
        if let Value::Object(map) = overrides {
            self.sd_params = map;
        }
        self
    }
}

/// Parameters for `local_sd.start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartLocalParams {
    pub model_path: Option<String>,
}

/// Parameters for `local_sd.switch_model`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchModelParams {
    pub model_name: String,
    /// Seconds the worker may spend waiting for the model to load
    pub timeout: u64,
}

/// Parameters for methods that take none; encodes as `{}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyParams {}

/// Parameter payload of a request, one variant per known method
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RequestParams {
    Generate(GenerateParams),
    StartLocal(StartLocalParams),
    SwitchModel(SwitchModelParams),
    Empty(EmptyParams),
    /// Pass-through payload for methods without a typed wrapper
    Raw(Map<String, Value>),
}

impl RequestParams {
    pub fn empty() -> Self {
        Self::Empty(EmptyParams {})
    }

    /// Wrap an untyped payload. `null` becomes `{}`; anything else must be
    /// a JSON object, since the worker spreads params into keyword arguments.
    pub fn raw(value: Value) -> WorkerResult<Self> {
        match value {
            Value::Null => Ok(Self::empty()),
            Value::Object(map) => Ok(Self::Raw(map)),
            other => Err(WorkerError::invalid_params(format!(
                "params must be a JSON object or null, got {}",
                other
            ))),
        }
    }
}

/// A request as written to the worker's stdin
#[derive(Debug, Clone, Serialize)]
pub struct WorkerRequest<'a> {
    pub id: &'a RequestId,
    pub method: &'a str,
    pub params: &'a RequestParams,
}

impl<'a> WorkerRequest<'a> {
    pub fn new(id: &'a RequestId, method: &'a str, params: &'a RequestParams) -> Self {
        Self { id, method, params }
    }

    /// Encode as a single newline-terminated line
    pub fn to_line(&self) -> WorkerResult<String> {
        // Compact serde_json output escapes control characters inside strings,
        // so the encoded request never contains a raw newline.
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Structured error object carried in a response
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteErrorPayload {
    pub message: String,
    pub code: Option<String>,
    /// The complete `error` value as sent by the worker
    pub raw: Value,
}

impl RemoteErrorPayload {
    pub fn from_value(raw: Value) -> Self {
        let message = match &raw {
            Value::String(s) => s.clone(),
            other => other
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or(DEFAULT_REMOTE_MESSAGE)
                .to_string(),
        };
        let code = raw.get("code").and_then(|c| match c {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        Self { message, code, raw }
    }

    pub fn into_error(self, method: &str) -> WorkerError {
        WorkerError::Remote {
            method: method.to_string(),
            message: self.message,
            code: self.code,
            details: self.raw,
        }
    }
}

/// Body of a response: a result or an error, never both
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Result(Value),
    Error(RemoteErrorPayload),
}

/// A response line read from the worker's stdout
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerResponse {
    pub id: RequestId,
    pub body: ResponseBody,
}

impl WorkerResponse {
    /// Parse one line of worker output.
    ///
    /// Fails with `WorkerError::Protocol` when the line is not JSON, is not an
    /// object, or has no usable `id`. An `error` field takes precedence over
    /// `result`; a response with neither resolves to `null`.
    pub fn parse_line(line: &str) -> WorkerResult<Self> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| WorkerError::protocol(format!("invalid JSON: {}", e)))?;

        let Value::Object(mut object) = value else {
            return Err(WorkerError::protocol("message is not a JSON object"));
        };

        let id = match object.get("id") {
            Some(Value::String(s)) => RequestId::from(s.as_str()),
            Some(Value::Number(n)) => RequestId::from(n.to_string()),
            Some(_) => return Err(WorkerError::protocol("id is neither string nor number")),
            None => return Err(WorkerError::protocol("message has no id")),
        };

        let body = match object.remove("error") {
            Some(error) if !error.is_null() => ResponseBody::Error(RemoteErrorPayload::from_value(error)),
            _ => ResponseBody::Result(object.remove("result").unwrap_or(Value::Null)),
        };

        Ok(Self { id, body })
    }
}
