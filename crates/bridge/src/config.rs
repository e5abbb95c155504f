use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use common::validation::validate_pairing_pin;
use std::{path::PathBuf, time::Duration};

use crate::media::FfmpegConfig;
use crate::orchestrator::{CameraFailurePolicy, EmptySetPolicy, OrchestratorSettings};
use crate::transport::TransportConfig;

#[derive(Debug, Clone, Parser)]
#[command(name = "hkcambridge")]
#[command(about = "Expose local cameras as HomeKit-style accessories behind one bridge", long_about = None)]
pub struct Cli {
  /// Directory for persisted bridge state
  #[arg(long, env = "BRIDGE_DATA_DIR", default_value = "camera")]
  pub data_dir: PathBuf,

  /// Debug logging and chatty ffmpeg output
  #[arg(long, env = "BRIDGE_VERBOSE", default_value_t = true, action = ArgAction::Set)]
  pub verbose: bool,

  /// Eight digit pairing pin
  #[arg(long, env = "BRIDGE_PIN", default_value = "11112222")]
  pub pin: String,

  #[arg(long, env = "BRIDGE_PORT", default_value = "59876")]
  pub port: String,

  #[arg(long, env = "BRIDGE_BIND_HOST", default_value = "0.0.0.0")]
  pub bind_host: String,

  /// Directories searched for the camera list, in order
  #[arg(
    long = "config-dir",
    env = "BRIDGE_CONFIG_DIR",
    value_delimiter = ',',
    default_values = [".", "./config"]
  )]
  pub config_dirs: Vec<PathBuf>,

  /// Base name of the camera list file
  #[arg(long, env = "BRIDGE_CONFIG_NAME", default_value = "cameras")]
  pub config_name: String,

  #[arg(long, env = "BRIDGE_ON_CAMERA_FAILURE", value_enum, default_value = "skip")]
  pub on_camera_failure: CameraFailurePolicy,

  /// Refuse to serve when no camera could be built
  #[arg(long, env = "BRIDGE_REQUIRE_CAMERAS")]
  pub require_cameras: bool,

  #[arg(long, env = "BRIDGE_SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
  pub shutdown_timeout_secs: u64,

  #[arg(long, env = "FFMPEG_BIN", default_value = "ffmpeg")]
  pub ffmpeg: String,
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
  pub data_dir: PathBuf,
  pub verbose: bool,
  pub pin: String,
  pub port: u16,
  pub bind_host: String,
  pub config_dirs: Vec<PathBuf>,
  pub config_name: String,
  pub camera_failure_policy: CameraFailurePolicy,
  pub empty_set_policy: EmptySetPolicy,
  pub shutdown_timeout: Duration,
  pub ffmpeg_binary: String,
}

impl BridgeConfig {
  pub fn from_cli(cli: Cli) -> Result<Self> {
    validate_pairing_pin(&cli.pin).context("invalid --pin")?;
    let port: u16 = cli
      .port
      .trim()
      .parse()
      .with_context(|| format!("invalid --port '{}'", cli.port))?;

    let empty_set_policy = if cli.require_cameras {
      EmptySetPolicy::Fail
    } else {
      EmptySetPolicy::Serve
    };

    Ok(Self {
      data_dir: cli.data_dir,
      verbose: cli.verbose,
      pin: cli.pin,
      port,
      bind_host: cli.bind_host,
      config_dirs: cli.config_dirs,
      config_name: cli.config_name,
      camera_failure_policy: cli.on_camera_failure,
      empty_set_policy,
      shutdown_timeout: Duration::from_secs(cli.shutdown_timeout_secs),
      ffmpeg_binary: cli.ffmpeg,
    })
  }

  pub fn transport(&self) -> TransportConfig {
    TransportConfig {
      pairing_pin: self.pin.clone(),
      port: self.port,
      bind_host: self.bind_host.clone(),
      storage_path: self.data_dir.clone(),
    }
  }

  pub fn orchestrator(&self) -> OrchestratorSettings {
    OrchestratorSettings::new(self.transport())
      .with_config_name(self.config_name.clone())
      .with_camera_failure_policy(self.camera_failure_policy)
      .with_empty_set_policy(self.empty_set_policy)
      .with_shutdown_timeout(self.shutdown_timeout)
  }

  pub fn ffmpeg(&self) -> FfmpegConfig {
    FfmpegConfig {
      binary: self.ffmpeg_binary.clone(),
      verbose: self.verbose,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(args: &[&str]) -> Cli {
    let mut argv = vec!["hkcambridge"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
  }

  #[test]
  fn defaults_match_documented_values() {
    let config = BridgeConfig::from_cli(parse(&[])).unwrap();
    assert_eq!(config.data_dir, PathBuf::from("camera"));
    assert!(config.verbose);
    assert_eq!(config.pin, "11112222");
    assert_eq!(config.port, 59876);
    assert_eq!(config.config_name, "cameras");
    assert_eq!(config.camera_failure_policy, CameraFailurePolicy::Skip);
    assert_eq!(config.empty_set_policy, EmptySetPolicy::Serve);
    assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
  }

  #[test]
  fn flags_override_defaults() {
    let config = BridgeConfig::from_cli(parse(&[
      "--verbose",
      "false",
      "--port",
      "8123",
      "--on-camera-failure",
      "abort",
      "--require-cameras",
      "--config-dir",
      "/etc/bridge",
    ]))
    .unwrap();
    assert!(!config.verbose);
    assert_eq!(config.port, 8123);
    assert_eq!(config.camera_failure_policy, CameraFailurePolicy::Abort);
    assert_eq!(config.empty_set_policy, EmptySetPolicy::Fail);
    assert_eq!(config.config_dirs, vec![PathBuf::from("/etc/bridge")]);
    assert!(!config.ffmpeg().verbose);
  }

  #[test]
  fn rejects_bad_pin() {
    let err = BridgeConfig::from_cli(parse(&["--pin", "1234"])).unwrap_err();
    assert!(format!("{err:#}").contains("pin"));
  }

  #[test]
  fn rejects_out_of_range_port() {
    let err = BridgeConfig::from_cli(parse(&["--port", "70000"])).unwrap_err();
    assert!(err.to_string().contains("70000"));
  }

  #[test]
  fn transport_settings_follow_cli() {
    let config = BridgeConfig::from_cli(parse(&["--data-dir", "/var/lib/bridge"])).unwrap();
    let transport = config.transport();
    assert_eq!(transport.storage_path, PathBuf::from("/var/lib/bridge"));
    assert_eq!(transport.pairing_pin, "11112222");
    assert_eq!(config.orchestrator().shutdown_timeout, Duration::from_secs(10));
  }
}
