/// Compiled-in node configuration.
///
/// Edit these before flashing a node. Every node in a search team needs a
/// distinct `NODE_ID`; targets and signatures are usually shared.

/// Unique node identifier (max 16 bytes, longer values are truncated).
pub const NODE_ID: &str = "NODE-001";

/// Exact hardware identifiers to alert on (TRUE HIT).
///
/// Format: "aa:bb:cc:dd:ee:ff". Case does not matter.
/// Typical sources: a pacemaker address read from the paired phone app, a
/// known smartwatch or phone belonging to the missing person.
pub static TARGETS: &[&str] = &[
    "28:34:ff:74:aa:99", // Test device (replace with real target)
];

/// Whether prefix signatures raise POSSIBLE HIT alerts.
pub const SIGNATURES_ENABLED: bool = true;

/// Known device-type prefixes (POSSIBLE HIT), as (prefix, label, source).
///
/// Checked in order; the first matching prefix wins, so list more specific
/// prefixes before broader ones.
pub static SIGNATURES: &[(&str, &str, &str)] = &[
    // Medtronic cardiac devices
    ("70:b3:d5:b3:4", "Pacemaker/ICD/CRT", "Medtronic"),
];

/// Movement (meters) required before a new position beacon is sent.
pub const MOVEMENT_THRESHOLD_M: f64 = 25.0;

/// BLE scan interval (ms) — time between scan starts.
pub const SCAN_INTERVAL_MS: u16 = 500;

/// BLE scan window (ms) — must be <= `SCAN_INTERVAL_MS`.
pub const SCAN_WINDOW_MS: u16 = 450;

/// Active scanning (sends SCAN_REQ for better range).
pub const SCAN_ACTIVE: bool = true;

/// How long a TRUE HIT stays on screen (ms).
pub const TRUE_HIT_LOCK_MS: u32 = 3000;

/// How long a POSSIBLE HIT stays on screen (ms).
pub const POSSIBLE_HIT_LOCK_MS: u32 = 2000;

/// Scanning screen refresh period (ms).
pub const SCAN_REFRESH_MS: u32 = 500;

/// Statistics reporting interval (ms).
pub const STATS_INTERVAL_MS: u32 = 30_000;

/// Log every observed advertisement, not just hits. Very verbose.
pub const SHOW_ALL_DEVICES: bool = false;
