/// Load-time node configuration.
///
/// Built once at startup from `defaults.rs` and never mutated afterwards.
/// Bad values are repaired (truncated or clamped) with a warning rather than
/// rejected, so a misconfigured node still scans.
use heapless::String;

use crate::defaults;
use crate::error::ConfigError;
use crate::protocol::NodeId;

/// BLE scan timing handed to the scanning transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTiming {
    pub interval_ms: u16,
    pub window_ms: u16,
    pub active: bool,
}

/// Alert lock durations and scanning screen cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertTiming {
    pub true_hit_lock_ms: u32,
    pub possible_hit_lock_ms: u32,
    pub refresh_ms: u32,
}

impl AlertTiming {
    pub const fn new() -> Self {
        Self {
            true_hit_lock_ms: defaults::TRUE_HIT_LOCK_MS,
            possible_hit_lock_ms: defaults::POSSIBLE_HIT_LOCK_MS,
            refresh_ms: defaults::SCAN_REFRESH_MS,
        }
    }
}

impl Default for AlertTiming {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    /// Identifier stamped on every mesh frame this node sends.
    pub node_id: NodeId,
    /// Movement (meters) that triggers a new position beacon.
    pub movement_threshold_m: f64,
    pub scan: ScanTiming,
    pub alerts: AlertTiming,
    pub stats_interval_ms: u32,
    /// Whether prefix signatures raise POSSIBLE HIT alerts.
    pub signatures_enabled: bool,
    /// Log every advertisement, not just hits.
    pub show_all_devices: bool,
}

impl NodeConfig {
    /// Configuration from the compiled-in defaults.
    pub fn from_defaults() -> Self {
        Self {
            node_id: bounded("node id", defaults::NODE_ID),
            movement_threshold_m: defaults::MOVEMENT_THRESHOLD_M,
            scan: ScanTiming {
                interval_ms: defaults::SCAN_INTERVAL_MS,
                window_ms: defaults::SCAN_WINDOW_MS,
                active: defaults::SCAN_ACTIVE,
            }
            .validated(),
            alerts: AlertTiming::new(),
            stats_interval_ms: defaults::STATS_INTERVAL_MS,
            signatures_enabled: defaults::SIGNATURES_ENABLED,
            show_all_devices: defaults::SHOW_ALL_DEVICES,
        }
    }

    /// Replace the node id, truncating it to the wire capacity.
    pub fn with_node_id(mut self, node_id: &str) -> Self {
        self.node_id = bounded("node id", node_id);
        self
    }

    pub fn with_movement_threshold(mut self, meters: f64) -> Self {
        self.movement_threshold_m = meters;
        self
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::from_defaults()
    }
}

impl ScanTiming {
    /// Clamp the window to the interval; the radio rejects anything longer.
    pub fn validated(self) -> Self {
        if self.window_ms <= self.interval_ms {
            return self;
        }
        log::warn!(
            "{}",
            ConfigError::ScanWindow {
                window_ms: self.window_ms,
                interval_ms: self.interval_ms,
            }
        );
        Self {
            window_ms: self.interval_ms,
            ..self
        }
    }
}

/// Copy `value` into a fixed-capacity string, truncating at a char boundary.
///
/// Truncation is logged as a [`ConfigError::Truncated`] warning.
pub fn bounded<const N: usize>(field: &'static str, value: &str) -> String<N> {
    let (s, truncated) = truncate_into::<N>(value);
    if truncated {
        log::warn!(
            "{}",
            ConfigError::Truncated {
                field,
                len: value.len(),
                max: N,
            }
        );
    }
    s
}

/// Copy as much of `value` as fits into `String<N>`. Returns whether anything
/// was cut off.
pub fn truncate_into<const N: usize>(value: &str) -> (String<N>, bool) {
    let mut end = value.len().min(N);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut s = String::new();
    // Cannot fail: `end <= N` bytes.
    let _ = s.push_str(&value[..end]);
    (s, end < value.len())
}
