use clap::{Args, Parser, Subcommand};
use fridarelay::grant::{AuthorizationStatus, Grant, SETTINGS_PROCESS};
use fridarelay::locator::{Locator, PackageManager};
use fridarelay::runner::{self, Outcome, Script};
use fridarelay::{config, toolkit};
use log::LevelFilter;
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    device: Device,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Grant an app location permission by way of the Settings process
    GrantLocationPermission {
        /// The app's bundle identifier
        app_id: String,
        /// The authorization status to grant
        #[arg(long, value_enum, default_value_t = AuthorizationStatus::WhenInUse)]
        status: AuthorizationStatus,
        /// The process to run the grant inside
        #[arg(long, default_value = SETTINGS_PROCESS)]
        process: String,
    },

    /// Inject a script into a process and print the one result it sends back
    RunScript {
        /// The target process ID
        pid: Option<String>,
        /// The script to inject, base64-encoded
        #[arg(conflicts_with = "package")]
        script: Option<String>,
        /// Inject the entry point of this globally installed npm package instead
        #[arg(long, value_name = "NAME")]
        package: Option<String>,
        /// Give up if the script sends nothing within this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<f64>,
    },

    /// Find a globally installed npm package
    Locate {
        package: String,
        /// The package manager to ask for the global module root
        #[arg(long, default_value = "npm")]
        npm: PathBuf,
    },

    /// Print JSON schemas for this tool's output and configuration
    Schema,
}

#[derive(Args, Debug, Clone)]
struct Device {
    /// Use the first USB-attached device (the default)
    #[arg(long, group = "mode")]
    usb: bool,

    /// Use the local system
    #[arg(long, group = "mode")]
    local: bool,

    /// The IP or hostname of a remote frida-server
    #[arg(long, group = "mode", value_name = "DESTINATION")]
    remote: Option<String>,

    // If --remote is specified, the port to which to connect
    #[arg(long, requires = "remote", default_value_t = config::default_port())]
    port: u16,
}

impl Device {
    fn open(&self) -> Box<dyn toolkit::Toolkit> {
        let config = config::DeviceConfig::from(self.clone());
        match config.open() {
            Ok(t) => t,
            Err(e) => {
                log::error!("error opening device: {}", e);
                exit(2);
            }
        }
    }
}

impl From<Device> for config::DeviceConfig {
    fn from(value: Device) -> Self {
        match (value.local, value.remote) {
            (_, Some(hostname)) => config::RemoteDeviceConfig {
                hostname,
                port: value.port,
            }
            .into(),
            (true, None) => config::DeviceConfig::Local,
            (false, None) => config::DeviceConfig::Usb,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    match cli.command {
        Commands::GrantLocationPermission {
            app_id,
            status,
            process,
        } => {
            let mut toolkit = cli.device.open();
            grant_location_permission(toolkit.as_mut(), app_id, status, process);
        }

        Commands::RunScript {
            pid,
            script,
            package,
            timeout,
        } => {
            let pid = pid.as_deref().and_then(runner::parse_pid);
            // Without a pid there is no device to talk to; the runner reports that first
            let mut toolkit: Box<dyn toolkit::Toolkit> = match pid {
                Some(_) => cli.device.open(),
                None => Box::new(toolkit::Unavailable),
            };
            run_script(toolkit.as_mut(), pid, script, package, timeout);
        }

        Commands::Locate { package, npm } => locate(&package, npm),

        Commands::Schema => schema(),
    }
}

fn grant_location_permission(
    toolkit: &mut dyn toolkit::Toolkit,
    app_id: String,
    status: AuthorizationStatus,
    process: String,
) {
    let grant = Grant {
        status,
        process,
        ..Grant::new(app_id)
    };

    if let Err(e) = grant.run(toolkit) {
        log::error!("error granting location permission: {}", e);
        exit(1);
    }
}

fn run_script(
    toolkit: &mut dyn toolkit::Toolkit,
    pid: Option<u32>,
    script: Option<String>,
    package: Option<String>,
    timeout: Option<f64>,
) {
    let script = match (script, package) {
        (Some(encoded), _) => Some(Script::Base64(encoded)),
        // Without a pid the runner reports that before anything else
        (None, Some(package)) if pid.is_some() => match Locator::<PackageManager>::default().require(&package) {
            Ok(module) => Some(Script::Source(module.source)),
            Err(e) => {
                let outcome = Outcome::Error(format!("Error: {}", e));
                println!("{}", outcome.to_line());
                exit(1);
            }
        },
        (None, _) => None,
    };

    let request = runner::Request {
        pid,
        script,
        timeout: timeout
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64),
    };

    let outcome = runner::run_to_outcome(toolkit, &request);
    println!("{}", outcome.to_line());
    if outcome.is_error() {
        exit(1);
    }
}

fn locate(package: &str, npm: PathBuf) {
    let locator = Locator::new(PackageManager::new(npm));
    match locator.find(package) {
        Ok(found) => {
            println!("{}", found.dir.display());
            println!("{}", found.entry.display());
        }
        Err(e) => {
            log::error!("{}", e);
            exit(1);
        }
    }
}

fn schema() {
    let schemas = serde_json::json!({
        "run_script_output": schemars::schema_for!(Outcome),
        "device_config": schemars::schema_for!(config::DeviceConfig),
    });

    match serde_json::to_string_pretty(&schemas) {
        Ok(s) => println!("{}", s),
        Err(e) => {
            log::error!("error rendering schema: {}", e);
            exit(1);
        }
    }
}
