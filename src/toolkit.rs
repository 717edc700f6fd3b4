//! The instrumentation capability.
//!
//! Everything that actually touches a device (finding it, attaching to a process, running code
//! inside that process) is done by an external toolkit. This module describes the one operation
//! the rest of the crate needs from it.
//!
//! * `frida`, when compiled with the `frida` feature
//! * [`Unavailable`], otherwise

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::mpsc;

#[cfg(feature = "frida")]
pub mod frida;

/// A process on the device.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Target {
    Pid(u32),
    Name(String),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Target::Pid(pid) => write!(f, "pid {}", pid),
            Target::Name(name) => write!(f, "process {:?}", name),
        }
    }
}

/// A message posted by an injected script, as the raw JSON the toolkit delivered.
///
/// `send(x)` in the script arrives as `{"type": "send", "payload": x}`; uncaught exceptions
/// arrive as `{"type": "error", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptMessage(pub serde_json::Value);

impl ScriptMessage {
    /// Recover the message a script posted from what the toolkit handed us.
    ///
    /// Frida only parses messages shaped like its own RPC replies. Anything else, including an
    /// ordinary `send()`, arrives wrapped as `{"error": <parse error>, "data": "<raw JSON>"}`.
    pub fn from_delivered(value: serde_json::Value) -> Self {
        let unwrapped = value
            .get("data")
            .and_then(|data| data.as_str())
            .and_then(|data| serde_json::from_str::<serde_json::Value>(data).ok())
            .filter(|raw| raw.is_object());

        match unwrapped {
            Some(raw) => ScriptMessage(raw),
            None => ScriptMessage(value),
        }
    }

    /// An uncaught exception in the script.
    pub fn error(
        description: &str,
        stack: &str,
        file_name: &str,
        line_number: usize,
        column_number: usize,
    ) -> Self {
        ScriptMessage(serde_json::json!({
            "type": "error",
            "description": description,
            "stack": stack,
            "fileName": file_name,
            "lineNumber": line_number,
            "columnNumber": column_number,
        }))
    }

    /// The exception text of an `error` message.
    pub fn description(&self) -> Option<&str> {
        if self.message_type() != Some("error") {
            return None;
        }
        self.0.get("description").and_then(|d| d.as_str())
    }

    pub fn message_type(&self) -> Option<&str> {
        self.0.get("type").and_then(|t| t.as_str())
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.0.get("payload")
    }
}

impl std::fmt::Display for ScriptMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ToolkitError {
    #[error("instrumentation support is not compiled in; rebuild with `--features frida`")]
    Unavailable,
    #[error("error obtaining device: {0}")]
    Device(String),
    #[error("unable to find {0}")]
    NoSuchProcess(Target),
    #[error("error attaching to {0}: {1}")]
    Attaching(Target, String),
    #[error("error creating script: {0}")]
    CreatingScript(String),
    #[error("error loading script: {0}")]
    Loading(String),
    #[error("error detaching: {0}")]
    Detaching(String),
}

pub trait Toolkit: Debug {
    /// Attach to `target`, load `source` into it, and detach.
    ///
    /// Every message the script posts is forwarded into `messages`, starting before the script
    /// is loaded. The sender is dropped once the toolkit can no longer deliver messages.
    fn inject(
        &mut self,
        target: &Target,
        source: &str,
        messages: mpsc::Sender<ScriptMessage>,
    ) -> Result<(), ToolkitError>;
}

/// A toolkit that can't do anything.
#[derive(Debug, Copy, Clone, Default)]
pub struct Unavailable;

impl Toolkit for Unavailable {
    fn inject(
        &mut self,
        _target: &Target,
        _source: &str,
        _messages: mpsc::Sender<ScriptMessage>,
    ) -> Result<(), ToolkitError> {
        Err(ToolkitError::Unavailable)
    }
}
