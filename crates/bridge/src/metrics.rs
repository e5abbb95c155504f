#![allow(clippy::expect_used)]

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static CAMERAS_REGISTERED: Lazy<IntGauge> = Lazy::new(|| {
  let g = IntGauge::new("bridge_cameras_registered", "Camera accessories handed to the transport")
    .expect("valid metric");
  REGISTRY.register(Box::new(g.clone())).ok();
  g
});

pub static CAMERA_BUILD_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
  let c = IntCounter::new("bridge_camera_build_failures_total", "Cameras skipped because media setup failed")
    .expect("valid metric");
  REGISTRY.register(Box::new(c.clone())).ok();
  c
});

pub static SNAPSHOTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
  let c = IntCounter::new("bridge_snapshots_total", "Snapshot requests served").expect("valid metric");
  REGISTRY.register(Box::new(c.clone())).ok();
  c
});

pub static SNAPSHOT_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
  let c = IntCounter::new("bridge_snapshot_failures_total", "Snapshot requests that failed")
    .expect("valid metric");
  REGISTRY.register(Box::new(c.clone())).ok();
  c
});

pub static ACTIVE_STREAMS: Lazy<IntGauge> = Lazy::new(|| {
  let g = IntGauge::new("bridge_active_streams", "Live video streams currently running").expect("valid metric");
  REGISTRY.register(Box::new(g.clone())).ok();
  g
});

pub fn render() -> String {
  // touch lazies so every family shows up even before its first update
  Lazy::force(&CAMERAS_REGISTERED);
  Lazy::force(&CAMERA_BUILD_FAILURES);
  Lazy::force(&SNAPSHOTS_TOTAL);
  Lazy::force(&SNAPSHOT_FAILURES);
  Lazy::force(&ACTIVE_STREAMS);

  let mut buf = Vec::new();
  let encoder = TextEncoder::new();
  let mfs = REGISTRY.gather();
  encoder.encode(&mfs, &mut buf).ok();
  String::from_utf8(buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn render_lists_all_families() {
    let text = render();
    for name in [
      "bridge_cameras_registered",
      "bridge_camera_build_failures_total",
      "bridge_snapshots_total",
      "bridge_snapshot_failures_total",
      "bridge_active_streams",
    ] {
      assert!(text.contains(name), "missing {name}");
    }
  }
}
