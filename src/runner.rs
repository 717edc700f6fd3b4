//! Running a caller-supplied script and relaying the one value it sends back.
//!
//! The injected script reports its result by calling
//!
//! ```js
//! send({ name: "get_obj_from_frida_script", payload: value });
//! ```
//!
//! The first message received decides the outcome: a matching `send` yields `value`, anything
//! else is reported as an error. Either way the run produces exactly one [`Outcome`], printed as
//! a single line of JSON.

use crate::toolkit::{ScriptMessage, Target, Toolkit, ToolkitError};
use base64::Engine;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

/// The `name` a script's result message must carry.
pub const RESULT_NAME: &str = "get_obj_from_frida_script";

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("Must provide pid.")]
    MissingPid,
    #[error("Must provide script.")]
    MissingScript,
    #[error("script is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("script is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("{0}")]
    Toolkit(#[from] ToolkitError),
    #[error("no message from script within {0:?}")]
    TimedOut(Duration),
    #[error("script finished without sending a message")]
    NoMessage,
    /// The script's first message was not a result.
    #[error("{0}")]
    Rejected(ScriptMessage),
}

/// The source to inject.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Script {
    Base64(String),
    Source(String),
}

impl Script {
    pub fn decode(&self) -> Result<String, RunError> {
        match self {
            Script::Base64(encoded) => {
                let bytes = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
                Ok(String::from_utf8(bytes)?)
            }
            Script::Source(source) => Ok(source.clone()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Request {
    /// The target pid. `None` and `Some(0)` are both rejected.
    pub pid: Option<u32>,
    pub script: Option<Script>,
    /// How long to wait for the script's message. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

/// The single line of output of a run.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The script's payload, JSON-encoded.
    Result(String),
    Error(String),
}

impl Outcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    /// Render as one line of JSON.
    pub fn to_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(line) => line,
            Err(e) => format!(r#"{{"error":"Error: {}"}}"#, e.to_string().replace('"', "'")),
        }
    }
}

impl From<Result<serde_json::Value, RunError>> for Outcome {
    fn from(value: Result<serde_json::Value, RunError>) -> Self {
        match value {
            Ok(payload) => Outcome::Result(payload.to_string()),
            // A rejected message is reported as-is
            Err(RunError::Rejected(message)) => Outcome::Error(message.to_string()),
            Err(e) => Outcome::Error(format!("Error: {}", e)),
        }
    }
}

/// Read a pid the way JavaScript's `parseInt` would: leading whitespace, an optional `+`, then
/// as many digits as there are. Anything else, including `0`, is no pid at all.
pub fn parse_pid(pid: &str) -> Option<u32> {
    let pid = pid.trim_start();
    let pid = pid.strip_prefix('+').unwrap_or(pid);
    let end = pid
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(pid.len());

    match pid[..end].parse() {
        Ok(0) | Err(_) => None,
        Ok(pid) => Some(pid),
    }
}

/// Decide what a message means.
pub fn classify(message: ScriptMessage) -> Result<serde_json::Value, RunError> {
    let payload = message.payload();
    let is_result = message.message_type() == Some("send")
        && payload.and_then(|p| p.get("name")).and_then(|n| n.as_str()) == Some(RESULT_NAME);

    if is_result {
        Ok(payload
            .and_then(|p| p.get("payload"))
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    } else {
        Err(RunError::Rejected(message))
    }
}

/// Inject the requested script and wait for its result.
pub fn run(toolkit: &mut dyn Toolkit, request: &Request) -> Result<serde_json::Value, RunError> {
    let pid = match request.pid {
        Some(pid) if pid != 0 => pid,
        _ => return Err(RunError::MissingPid),
    };
    let source = request
        .script
        .as_ref()
        .ok_or(RunError::MissingScript)?
        .decode()?;

    let (sender, receiver) = mpsc::channel();
    let target = Target::Pid(pid);
    log::debug!("injecting {} bytes into {}", source.len(), target);
    toolkit.inject(&target, &source, sender)?;

    // The session is already detached here; whatever the script sent is waiting in the channel
    let message = match request.timeout {
        None => receiver.recv().map_err(|_| RunError::NoMessage)?,
        Some(timeout) => receiver.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => RunError::TimedOut(timeout),
            RecvTimeoutError::Disconnected => RunError::NoMessage,
        })?,
    };
    log::debug!("received {}", message);

    classify(message)
}

/// [`run`], folded into the line to print.
pub fn run_to_outcome(toolkit: &mut dyn Toolkit, request: &Request) -> Outcome {
    let result = run(toolkit, request);
    if let Err(e) = &result {
        log::debug!("run failed: {:?}", e);
    }
    Outcome::from(result)
}

#[cfg(test)]
mod tests;
