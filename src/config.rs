use crate::toolkit;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which device the instrumentation toolkit should talk to.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeviceConfig {
    /// The first USB-attached device.
    #[default]
    Usb,
    /// The machine running this process.
    Local,
    /// A `frida-server` reachable over the network.
    Remote(RemoteDeviceConfig),
}

impl DeviceConfig {
    pub fn open(&self) -> Result<Box<dyn toolkit::Toolkit>, toolkit::ToolkitError> {
        #[cfg(feature = "frida")]
        {
            let toolkit = toolkit::frida::FridaToolkit::new(self.clone());
            Ok(Box::new(toolkit))
        }

        #[cfg(not(feature = "frida"))]
        {
            log::debug!("no instrumentation backend for {:?}", self);
            Ok(Box::new(toolkit::Unavailable))
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RemoteDeviceConfig {
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl RemoteDeviceConfig {
    /// The `host:port` form the toolkit expects.
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

impl From<RemoteDeviceConfig> for DeviceConfig {
    fn from(value: RemoteDeviceConfig) -> Self {
        Self::Remote(value)
    }
}

pub fn default_port() -> u16 {
    27042
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_port_defaults() {
        let config: DeviceConfig =
            serde_json::from_str(r#"{"remote":{"hostname":"10.0.0.7"}}"#).unwrap();
        assert_eq!(
            config,
            DeviceConfig::Remote(RemoteDeviceConfig {
                hostname: "10.0.0.7".into(),
                port: 27042,
            })
        );

        let DeviceConfig::Remote(remote) = config else {
            unreachable!()
        };
        assert_eq!(remote.address(), "10.0.0.7:27042");
    }

    #[test]
    fn usb_is_default() {
        assert_eq!(DeviceConfig::default(), DeviceConfig::Usb);
        assert_eq!(serde_json::to_string(&DeviceConfig::Usb).unwrap(), r#""usb""#);
    }
}
