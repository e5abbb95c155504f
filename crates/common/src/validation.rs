//! Input validation for the camera document and bridge settings
//!
//! Everything here runs before any accessory is built, so a bad document is
//! rejected as a whole instead of producing a half-configured bridge.

use anyhow::{anyhow, Result};
use std::collections::HashSet;

use crate::cameras::CameraSpec;

// ============================================================================
// CONSTANTS: Input Size Limits
// ============================================================================

/// Maximum length for names (camera names, bridge name)
pub const MAX_NAME_LENGTH: usize = 512;

/// Maximum length for device paths and source identifiers
pub const MAX_PATH_LENGTH: usize = 4096;

/// HomeKit setup codes are always eight digits
pub const PAIRING_PIN_LENGTH: usize = 8;

// ============================================================================
// String Validation
// ============================================================================

/// Validate string length against a maximum
pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    if value.len() > max_length {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes (got {})",
            field_name,
            max_length,
            value.len()
        ));
    }
    Ok(())
}

/// Validate non-empty string
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} cannot be empty", field_name));
    }
    Ok(())
}

/// Validate name (camera name, bridge name)
pub fn validate_name(name: &str, field_name: &str) -> Result<()> {
    validate_non_empty(name, field_name)?;
    validate_length(name, MAX_NAME_LENGTH, field_name)?;
    Ok(())
}

/// Validate the pairing PIN handed to the transport
pub fn validate_pairing_pin(pin: &str) -> Result<()> {
    if pin.len() != PAIRING_PIN_LENGTH || !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(anyhow!(
            "pairing pin must be exactly {} digits",
            PAIRING_PIN_LENGTH
        ));
    }
    Ok(())
}

// ============================================================================
// Camera Validation
// ============================================================================

/// Validate a single camera record in isolation
pub fn validate_camera(spec: &CameraSpec) -> Result<()> {
    if spec.id == 0 {
        return Err(anyhow!(
            "camera '{}' has id 0; ids must be positive integers",
            spec.name
        ));
    }

    validate_name(&spec.name, &format!("camera {} name", spec.id))?;

    if spec.min_video_bitrate < 0 {
        return Err(anyhow!(
            "camera {} has min_video_bitrate {}; must be >= 0",
            spec.id,
            spec.min_video_bitrate
        ));
    }
    if spec.min_video_bitrate > i64::from(u32::MAX) {
        return Err(anyhow!(
            "camera {} min_video_bitrate {} is out of range",
            spec.id,
            spec.min_video_bitrate
        ));
    }

    for (value, field) in [
        (&spec.source_filename, "filename"),
        (&spec.loopback_filename, "loopback"),
    ] {
        validate_length(value, MAX_PATH_LENGTH, &format!("camera {} {}", spec.id, field))?;
    }

    Ok(())
}

/// Validate the whole loaded camera set: every record, plus id uniqueness
pub fn validate_cameras(specs: &[CameraSpec]) -> Result<()> {
    let mut seen = HashSet::with_capacity(specs.len());
    for spec in specs {
        validate_camera(spec)?;
        if !seen.insert(spec.id) {
            return Err(anyhow!("duplicate camera id {}", spec.id));
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
