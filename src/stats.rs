/// Monotonic detection and mesh counters.
///
/// Incremented from both the scan-callback context and the control loop, so
/// every counter is atomic. Values only grow; they reset at boot.
use core::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct Counters {
    scans: AtomicU32,
    true_hits: AtomicU32,
    possible_hits: AtomicU32,
    mesh_tx: AtomicU32,
    mesh_tx_failed: AtomicU32,
    mesh_rx: AtomicU32,
    mesh_dropped: AtomicU32,
    beacons: AtomicU32,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub scans: u32,
    pub true_hits: u32,
    pub possible_hits: u32,
    pub mesh_tx: u32,
    pub mesh_tx_failed: u32,
    pub mesh_rx: u32,
    pub mesh_dropped: u32,
    pub beacons: u32,
}

impl Counters {
    pub const fn new() -> Self {
        Self {
            scans: AtomicU32::new(0),
            true_hits: AtomicU32::new(0),
            possible_hits: AtomicU32::new(0),
            mesh_tx: AtomicU32::new(0),
            mesh_tx_failed: AtomicU32::new(0),
            mesh_rx: AtomicU32::new(0),
            mesh_dropped: AtomicU32::new(0),
            beacons: AtomicU32::new(0),
        }
    }

    pub fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_true_hit(&self) {
        self.true_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_possible_hit(&self) {
        self.possible_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Outcome of one broadcast attempt.
    pub fn record_send(&self, ok: bool) {
        let counter = if ok { &self.mesh_tx } else { &self.mesh_tx_failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mesh_rx(&self) {
        self.mesh_rx.fetch_add(1, Ordering::Relaxed);
    }

    /// Inbound frame that failed to decode.
    pub fn record_mesh_dropped(&self) {
        self.mesh_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_beacon(&self) {
        self.beacons.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Stats {
        Stats {
            scans: self.scans.load(Ordering::Relaxed),
            true_hits: self.true_hits.load(Ordering::Relaxed),
            possible_hits: self.possible_hits.load(Ordering::Relaxed),
            mesh_tx: self.mesh_tx.load(Ordering::Relaxed),
            mesh_tx_failed: self.mesh_tx_failed.load(Ordering::Relaxed),
            mesh_rx: self.mesh_rx.load(Ordering::Relaxed),
            mesh_dropped: self.mesh_dropped.load(Ordering::Relaxed),
            beacons: self.beacons.load(Ordering::Relaxed),
        }
    }
}
