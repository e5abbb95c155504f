use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// One configured camera as it appears in the camera document.
///
/// Empty strings mean "unset"; the bridge fills them with host-platform
/// defaults before the camera is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CameraSpec {
  pub id: u64,
  pub name: String,
  pub input_device: String,
  #[serde(rename = "filename", alias = "source_filename")]
  pub source_filename: String,
  #[serde(rename = "loopback", alias = "loopback_filename")]
  pub loopback_filename: String,
  pub h264_decoder: String,
  pub h264_encoder: String,
  /// Encoder bitrate floor in kbit/s, 0 = unconstrained. Signed so that a
  /// negative value reaches validation instead of failing the parse.
  pub min_video_bitrate: i64,
  #[serde(rename = "multistream", alias = "multi_stream")]
  pub multi_stream: bool,
}

/// Media session parameters derived from a defaulted [`CameraSpec`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamParams {
  pub input_device: String,
  pub source_filename: String,
  pub loopback_filename: String,
  pub h264_decoder: String,
  pub h264_encoder: String,
  pub min_video_bitrate: u32,
  pub multi_stream: bool,
}

impl CameraSpec {
  pub fn new(id: u64, name: impl Into<String>) -> Self {
    Self {
      id,
      name: name.into(),
      ..Self::default()
    }
  }

  pub fn stream_params(&self) -> StreamParams {
    StreamParams {
      input_device: self.input_device.clone(),
      source_filename: self.source_filename.clone(),
      loopback_filename: self.loopback_filename.clone(),
      h264_decoder: self.h264_decoder.clone(),
      h264_encoder: self.h264_encoder.clone(),
      min_video_bitrate: self.min_video_bitrate.clamp(0, i64::from(u32::MAX)) as u32,
      multi_stream: self.multi_stream,
    }
  }
}

/// Parse a camera document.
///
/// Accepts either a sequence of camera records or a mapping of
/// `key -> camera record`. Mapping order is preserved and a record with no
/// `name` key takes its map key as the display name. An explicit `name`,
/// even an empty one, is kept as written so validation can reject it.
pub fn parse_camera_document(raw: &str) -> Result<Vec<CameraSpec>> {
  let doc: Value = serde_yaml::from_str(raw).context("camera document is not valid YAML/JSON")?;

  match doc {
    Value::Null => Ok(Vec::new()),
    Value::Sequence(items) => items
      .into_iter()
      .enumerate()
      .map(|(idx, item)| {
        serde_yaml::from_value::<CameraSpec>(item)
          .with_context(|| format!("invalid camera record at index {}", idx))
      })
      .collect(),
    Value::Mapping(entries) => entries
      .into_iter()
      .map(|(key, item)| {
        let key = match key {
          Value::String(s) => s,
          other => serde_yaml::to_string(&other)
            .unwrap_or_default()
            .trim()
            .to_string(),
        };
        let named = item
          .as_mapping()
          .is_some_and(|record| record.contains_key("name"));
        let mut spec = serde_yaml::from_value::<CameraSpec>(item)
          .with_context(|| format!("invalid camera record '{}'", key))?;
        if !named {
          spec.name = key;
        }
        Ok(spec)
      })
      .collect(),
    _ => Err(anyhow!(
      "camera document must be a list or a mapping of camera records"
    )),
  }
}
