//! A [`Toolkit`] backed by Frida.
//!
//! Frida delivers script messages on its own thread. [`ChannelHandler`] turns each one back into
//! the raw JSON the script posted (see [`ScriptMessage::from_delivered`]) and forwards it to the
//! caller's channel.

use super::{ScriptMessage, Target, Toolkit, ToolkitError};
use crate::config::DeviceConfig;
use ::frida::{Device, DeviceManager, DeviceType, Frida, Message, ScriptHandler, ScriptOption};
use std::sync::mpsc;

pub struct FridaToolkit {
    frida: Frida,
    device: DeviceConfig,
}

impl std::fmt::Debug for FridaToolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FridaToolkit")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl FridaToolkit {
    pub fn new(device: DeviceConfig) -> Self {
        // Frida::obtain() initializes process-global state; we only ever hold one
        let frida = unsafe { Frida::obtain() };
        Self { frida, device }
    }
}

fn select_device<'a>(
    manager: &'a DeviceManager,
    config: &DeviceConfig,
) -> Result<Device<'a>, ToolkitError> {
    let device = match config {
        DeviceConfig::Usb => manager.get_device_by_type(DeviceType::USB),
        DeviceConfig::Local => manager.get_local_device(),
        DeviceConfig::Remote(remote) => manager.get_remote_device(&remote.address()),
    };
    device.map_err(|e| ToolkitError::Device(e.to_string()))
}

fn resolve_pid(device: &Device, target: &Target) -> Result<u32, ToolkitError> {
    match target {
        Target::Pid(pid) => Ok(*pid),
        Target::Name(name) => device
            .enumerate_processes()
            .iter()
            .find(|process| process.get_name() == name.as_str())
            .map(|process| process.get_pid())
            .ok_or_else(|| ToolkitError::NoSuchProcess(target.clone())),
    }
}

impl Toolkit for FridaToolkit {
    fn inject(
        &mut self,
        target: &Target,
        source: &str,
        messages: mpsc::Sender<ScriptMessage>,
    ) -> Result<(), ToolkitError> {
        let manager = DeviceManager::obtain(&self.frida);
        let device = select_device(&manager, &self.device)?;
        log::debug!("using device {:?} ({})", device.get_name(), device.get_id());

        let pid = resolve_pid(&device, target)?;
        let session = device
            .attach(pid)
            .map_err(|e| ToolkitError::Attaching(target.clone(), e.to_string()))?;
        log::debug!("attached to {}", target);

        let loaded = (|| -> Result<_, ToolkitError> {
            let mut script = session
                .create_script(source, &mut ScriptOption::default())
                .map_err(|e| ToolkitError::CreatingScript(e.to_string()))?;
            script
                .handle_message(ChannelHandler { sender: messages })
                .map_err(|e| ToolkitError::CreatingScript(e.to_string()))?;
            script
                .load()
                .map_err(|e| ToolkitError::Loading(e.to_string()))?;
            log::debug!("script loaded into {}", target);
            Ok(script)
        })();

        // Detach whether or not the load went through
        let detached = session
            .detach()
            .map_err(|e| ToolkitError::Detaching(e.to_string()));

        // Dropping the script releases the handler and with it the sender
        drop(loaded?);
        detached
    }
}

struct ChannelHandler {
    sender: mpsc::Sender<ScriptMessage>,
}

impl ScriptHandler for ChannelHandler {
    fn on_message(&mut self, message: &Message, _data: Option<Vec<u8>>) {
        let message = match message {
            Message::Other(value) => ScriptMessage::from_delivered(value.clone()),
            Message::Error(err) => ScriptMessage::error(
                &err.description,
                &err.stack,
                &err.file_name,
                err.line_number,
                err.column_number,
            ),
            Message::Log(entry) => {
                log::info!("script: {}", entry.payload);
                return;
            }
            // RPC replies are consumed by Frida itself
            Message::Send(_) => return,
        };

        if self.sender.send(message).is_err() {
            log::debug!("dropping script message; nobody is listening");
        }
    }
}
