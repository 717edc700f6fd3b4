//! Granting location permission to an iOS application.
//!
//! `Settings` is allowed to change location authorization for any app, so we ask it to:
//! inside that process, `+[CLLocationManager setAuthorizationStatusByType:forBundleIdentifier:]`
//! does exactly what the Settings UI would.

use crate::toolkit::{ScriptMessage, Target, Toolkit, ToolkitError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::mpsc;

/// The process which is permitted to change authorization status.
pub const SETTINGS_PROCESS: &str = "Settings";

/// `CLAuthorizationStatus`.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Default, Serialize, Deserialize, JsonSchema,
)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    Always,
    #[default]
    WhenInUse,
}

impl AuthorizationStatus {
    pub fn code(self) -> u8 {
        match self {
            AuthorizationStatus::NotDetermined => 0,
            AuthorizationStatus::Restricted => 1,
            AuthorizationStatus::Denied => 2,
            AuthorizationStatus::Always => 3,
            AuthorizationStatus::WhenInUse => 4,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Grant {
    pub bundle_id: String,
    pub status: AuthorizationStatus,
    pub process: String,
}

impl Grant {
    pub fn new(bundle_id: impl Into<String>) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            status: AuthorizationStatus::default(),
            process: SETTINGS_PROCESS.to_owned(),
        }
    }

    /// The snippet to run inside the target process.
    pub fn snippet(&self) -> String {
        // A JSON string is a valid JS string literal
        let bundle_id = serde_json::Value::from(self.bundle_id.as_str());
        format!(
            "ObjC.classes.CLLocationManager.setAuthorizationStatusByType_forBundleIdentifier_({}, {});",
            self.status.code(),
            bundle_id
        )
    }

    pub fn run(&self, toolkit: &mut dyn Toolkit) -> Result<(), ToolkitError> {
        log::info!("{}", self.bundle_id);

        let (sender, receiver) = mpsc::channel();
        let target = Target::Name(self.process.clone());
        let result = toolkit.inject(&target, &self.snippet(), sender);

        // Nothing is expected back, but an exception in the snippet is worth knowing about
        for message in receiver.try_iter() {
            log::warn!("{}: {}", target, describe(&message));
        }

        result?;
        log::info!(
            "set authorization status of {} to {:?} via {}",
            self.bundle_id,
            self.status,
            target
        );
        Ok(())
    }
}

/// An exception's own text, or the whole message for anything else.
fn describe(message: &ScriptMessage) -> String {
    match message.description() {
        Some(description) => description.to_owned(),
        None => message.to_string(),
    }
}
