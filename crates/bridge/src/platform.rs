//! Host-platform defaults for camera records.
//!
//! Each supported host has one canonical capture setup. Unset fields of a
//! [`CameraSpec`] are filled from it; fields set in configuration always win.

use common::CameraSpec;

use crate::error::BridgeError;

/// Hosts the bridge knows how to drive a camera on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    Linux,
    MacOs,
}

/// Canonical capture setup for a host. An empty value leaves the field unset
/// so the media backend picks its own default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformDefaults {
    pub input_device: &'static str,
    pub source_filename: &'static str,
    pub loopback_filename: &'static str,
    pub h264_decoder: &'static str,
    pub h264_encoder: &'static str,
}

const LINUX_DEFAULTS: PlatformDefaults = PlatformDefaults {
    input_device: "v4l2",
    source_filename: "/dev/video0",
    loopback_filename: "/dev/video1",
    h264_decoder: "",
    h264_encoder: "h264_omx",
};

const MACOS_DEFAULTS: PlatformDefaults = PlatformDefaults {
    input_device: "avfoundation",
    source_filename: "default",
    loopback_filename: "",
    h264_decoder: "h264",
    h264_encoder: "libx264",
};

impl HostPlatform {
    /// Map an OS name (as reported by `std::env::consts::OS`) to a platform.
    pub fn from_os(os: &str) -> Result<Self, BridgeError> {
        match os.trim().to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "macos" | "darwin" => Ok(Self::MacOs),
            _ => Err(BridgeError::UnsupportedPlatform(os.to_string())),
        }
    }

    /// The platform this binary was compiled for.
    pub fn detect() -> Result<Self, BridgeError> {
        Self::from_os(std::env::consts::OS)
    }

    pub fn defaults(self) -> PlatformDefaults {
        match self {
            Self::Linux => LINUX_DEFAULTS,
            Self::MacOs => MACOS_DEFAULTS,
        }
    }

    /// Return a copy of `spec` with every unset media field filled in.
    pub fn apply_defaults(self, spec: &CameraSpec) -> CameraSpec {
        let defaults = self.defaults();
        let mut out = spec.clone();
        fill(&mut out.input_device, defaults.input_device);
        fill(&mut out.source_filename, defaults.source_filename);
        fill(&mut out.loopback_filename, defaults.loopback_filename);
        fill(&mut out.h264_decoder, defaults.h264_decoder);
        fill(&mut out.h264_encoder, defaults.h264_encoder);
        out
    }
}

fn fill(field: &mut String, default: &str) {
    if field.is_empty() {
        *field = default.to_string();
    }
}

/// Resolve `os` and apply its defaults. Fails without touching anything when
/// the OS is not supported.
pub fn apply_defaults(spec: &CameraSpec, os: &str) -> Result<CameraSpec, BridgeError> {
    Ok(HostPlatform::from_os(os)?.apply_defaults(spec))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn front() -> CameraSpec {
        CameraSpec::new(1, "Front")
    }

    #[test]
    fn macos_fills_unset_fields() {
        let out = apply_defaults(&front(), "macos").unwrap();
        assert_eq!(out.input_device, "avfoundation");
        assert_eq!(out.source_filename, "default");
        assert_eq!(out.loopback_filename, "");
        assert_eq!(out.h264_decoder, "h264");
        assert_eq!(out.h264_encoder, "libx264");
        assert_eq!(out.id, 1);
        assert_eq!(out.name, "Front");
    }

    #[test]
    fn darwin_is_an_alias_for_macos() {
        assert_eq!(HostPlatform::from_os("darwin").unwrap(), HostPlatform::MacOs);
    }

    #[test]
    fn linux_fills_unset_fields() {
        let out = HostPlatform::Linux.apply_defaults(&front());
        assert_eq!(out.input_device, "v4l2");
        assert_eq!(out.source_filename, "/dev/video0");
        assert_eq!(out.loopback_filename, "/dev/video1");
        assert_eq!(out.h264_decoder, "");
        assert_eq!(out.h264_encoder, "h264_omx");
    }

    #[test]
    fn configured_fields_are_never_overwritten() {
        let spec = CameraSpec {
            input_device: "rtsp".into(),
            source_filename: "rtsp://cam.local/stream".into(),
            loopback_filename: "/dev/video7".into(),
            h264_decoder: "h264_mmal".into(),
            h264_encoder: "h264_v4l2m2m".into(),
            min_video_bitrate: 256,
            multi_stream: true,
            ..front()
        };
        for platform in [HostPlatform::Linux, HostPlatform::MacOs] {
            assert_eq!(platform.apply_defaults(&spec), spec);
        }
    }

    #[test]
    fn defaulting_is_idempotent() {
        let partial = CameraSpec {
            source_filename: "/dev/video3".into(),
            ..front()
        };
        for platform in [HostPlatform::Linux, HostPlatform::MacOs] {
            let once = platform.apply_defaults(&partial);
            assert_eq!(platform.apply_defaults(&once), once);
        }
    }

    #[test]
    fn unsupported_platforms_fail() {
        let spec = front();
        for os in ["windows", "freebsd", "android", "", "ios"] {
            let err = apply_defaults(&spec, os).unwrap_err();
            assert!(matches!(err, BridgeError::UnsupportedPlatform(ref name) if name == os));
        }
        assert_eq!(spec, front());
    }
}
