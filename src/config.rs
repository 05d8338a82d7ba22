//! Server configuration.
//!
//! DESIGN
//! ======
//! Every knob is a clap flag with an environment fallback, so the binary can
//! be driven from a `.env` file (loaded by `main` through `dotenvy`) or from
//! the command line. [`Args`] is the raw parse; [`Config`] is the validated
//! shape the rest of the server consumes.
//!
//! Gateway credentials are optional. When either half is missing the uplink
//! adapter stays off and the relay still serves viewers.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_GRACE_MS: u64 = 3000;
pub const DEFAULT_UPLINK_HOST: &str = "eu.thethings.network";
pub const DEFAULT_UPLINK_PORT: u16 = 1883;

/// Serving mode for static assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Compressed, cacheable assets from the build output directory.
    Production,
    /// Uncompressed assets from the source directory, never cached.
    Development,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "sensorstream", about = "Relay IoT uplink readings to live viewers")]
pub struct Args {
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    #[arg(long, env = "SENSORSTREAM_MODE", value_enum, default_value_t = Mode::Production)]
    pub mode: Mode,

    /// Static asset directory. Defaults to `dist` (production) or `public` (development).
    #[arg(long, env = "SENSORSTREAM_ASSETS_DIR")]
    pub assets_dir: Option<PathBuf>,

    /// How long a disconnected viewer stays present before `viewer:left`.
    #[arg(long, env = "SENSORSTREAM_GRACE_MS", default_value_t = DEFAULT_GRACE_MS)]
    pub grace_ms: u64,

    #[arg(long, env = "UPLINK_APP_ID")]
    pub uplink_app_id: Option<String>,

    #[arg(long, env = "UPLINK_ACCESS_KEY", hide_env_values = true)]
    pub uplink_access_key: Option<String>,

    #[arg(long, env = "UPLINK_HOST", default_value = DEFAULT_UPLINK_HOST)]
    pub uplink_host: String,

    #[arg(long, env = "UPLINK_PORT", default_value_t = DEFAULT_UPLINK_PORT)]
    pub uplink_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UplinkConfigError {
    #[error("missing uplink setting `{0}`")]
    Missing(&'static str),
}

/// Gateway broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkConfig {
    pub app_id: String,
    pub access_key: String,
    pub host: String,
    pub port: u16,
}

impl UplinkConfig {
    /// Topic carrying uplinks for every device of the application.
    #[must_use]
    pub fn topic(&self) -> String {
        format!("{}/devices/+/up", self.app_id)
    }
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub mode: Mode,
    pub assets_dir: PathBuf,
    pub grace: Duration,
    pub uplink: Result<UplinkConfig, UplinkConfigError>,
}

impl Config {
    #[must_use]
    pub fn from_args(args: Args) -> Self {
        let assets_dir = args.assets_dir.unwrap_or_else(|| default_assets_dir(args.mode));
        let uplink = uplink_from_parts(args.uplink_app_id, args.uplink_access_key, args.uplink_host, args.uplink_port);

        Self { port: args.port, mode: args.mode, assets_dir, grace: Duration::from_millis(args.grace_ms), uplink }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            mode: Mode::Production,
            assets_dir: default_assets_dir(Mode::Production),
            grace: Duration::from_millis(DEFAULT_GRACE_MS),
            uplink: Err(UplinkConfigError::Missing("uplink_app_id")),
        }
    }
}

fn default_assets_dir(mode: Mode) -> PathBuf {
    match mode {
        Mode::Production => PathBuf::from("dist"),
        Mode::Development => PathBuf::from("public"),
    }
}

fn uplink_from_parts(
    app_id: Option<String>,
    access_key: Option<String>,
    host: String,
    port: u16,
) -> Result<UplinkConfig, UplinkConfigError> {
    let app_id = non_empty(app_id).ok_or(UplinkConfigError::Missing("uplink_app_id"))?;
    let access_key = non_empty(access_key).ok_or(UplinkConfigError::Missing("uplink_access_key"))?;
    Ok(UplinkConfig { app_id, access_key, host, port })
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
