/// Node context and the cooperative control loop.
///
/// All mutable state lives in one [`NodeContext`] that both execution
/// contexts borrow: the scan callback (through [`crate::dispatch`]) and the
/// control loop below. State only one side touches stays with that side.
use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::beacon::{BeaconController, Fix, PositionSource};
use crate::board;
use crate::comm::{publish, NodeEvent, ReportChannel};
use crate::config::NodeConfig;
use crate::dispatch::broadcast;
use crate::presentation::{Presentation, Presenter, Render, StatusDisplay};
use crate::protocol::{Payload, MAX_FRAME_LEN, VERSION};
use crate::radio::{MeshRadio, SharedRadio};
use crate::receive::poll_mesh;
use crate::registry::Registry;
use crate::stats::Counters;

pub struct NodeContext<R> {
    pub config: NodeConfig,
    pub registry: Registry,
    pub counters: Counters,
    pub presentation: Presentation,
    pub radio: SharedRadio<R>,
    /// Lines for the serial output task.
    pub reports: ReportChannel,
    last_fix: Mutex<CriticalSectionRawMutex, Cell<Option<Fix>>>,
}

impl<R: MeshRadio> NodeContext<R> {
    pub fn new(config: NodeConfig, registry: Registry, radio: SharedRadio<R>) -> Self {
        Self {
            presentation: Presentation::new(config.alerts),
            config,
            registry,
            counters: Counters::new(),
            radio,
            reports: ReportChannel::new(),
            last_fix: Mutex::new(Cell::new(None)),
        }
    }

    /// Context built from the compiled-in defaults.
    pub fn from_defaults(radio: SharedRadio<R>) -> Self {
        let config = NodeConfig::from_defaults();
        let registry = Registry::from_defaults(config.signatures_enabled);
        Self::new(config, registry, radio)
    }

    /// Most recent GPS fix seen by the loop.
    pub fn latest_fix(&self) -> Option<Fix> {
        self.last_fix.lock(|fix| fix.get())
    }

    pub fn record_fix(&self, fix: Option<Fix>) {
        self.last_fix.lock(|slot| slot.set(fix));
    }

    /// Log the loaded configuration and announce the node to the base
    /// station.
    pub fn boot_report(&self) {
        let mesh = self.radio.is_available();
        log::info!(
            "SARHound v{} node={} board={}",
            VERSION,
            self.config.node_id,
            board::BOARD_NAME
        );
        log::info!(
            "Loaded {} targets, {} signatures",
            self.registry.targets().len(),
            self.registry.signatures().len()
        );
        for target in self.registry.targets() {
            log::info!("  target {}", target);
        }
        log::info!(
            "Beacon threshold {} m, stats every {} s",
            self.config.movement_threshold_m,
            self.config.stats_interval_ms / 1000
        );
        if !mesh {
            log::warn!("Mesh radio unavailable, alerts stay local");
        }

        publish(
            &self.reports,
            &NodeEvent::Boot {
                node: &self.config.node_id,
                version: VERSION,
                board: board::BOARD_NAME,
                targets: self.registry.targets().len() as u16,
                signatures: self.registry.signatures().len() as u16,
                mesh,
            },
        );
    }
}

/// Loop-owned state: beacon history, scanning animation, stats cadence and
/// the receive buffer.
pub struct ControlLoop<'a, R> {
    ctx: &'a NodeContext<R>,
    beacon: BeaconController,
    presenter: Presenter,
    last_stats: u32,
    rx_buf: [u8; MAX_FRAME_LEN],
}

impl<'a, R: MeshRadio> ControlLoop<'a, R> {
    pub fn new(ctx: &'a NodeContext<R>) -> Self {
        Self {
            ctx,
            beacon: BeaconController::new(ctx.config.movement_threshold_m),
            presenter: Presenter::new(ctx.config.alerts.refresh_ms),
            last_stats: 0,
            rx_buf: [0; MAX_FRAME_LEN],
        }
    }

    pub fn beacon(&self) -> &BeaconController {
        &self.beacon
    }

    /// One pass of the loop: mesh poll, GPS read, beacon check, periodic
    /// stats, presentation. Every step is non-blocking. Returns what was
    /// drawn, if anything.
    pub fn tick(
        &mut self,
        now_ms: u32,
        gps: &mut impl PositionSource,
        display: &mut impl StatusDisplay,
    ) -> Option<Render> {
        let ctx = self.ctx;

        poll_mesh(ctx, &mut self.rx_buf, now_ms);

        let fix = gps.current_fix();
        ctx.record_fix(fix);

        if let Some(fix) = fix.and_then(|f| self.beacon.update(f)) {
            self.send_beacon(fix, now_ms);
        }

        if now_ms.wrapping_sub(self.last_stats) >= ctx.config.stats_interval_ms {
            self.last_stats = now_ms;
            self.report_stats(now_ms, fix.is_some());
        }

        let stats = ctx.counters.snapshot();
        let render = self.presenter.tick(&ctx.presentation, &stats, now_ms)?;
        display.render(&render.screen());
        Some(render)
    }

    fn send_beacon(&self, fix: Fix, now_ms: u32) {
        let ctx = self.ctx;
        ctx.counters.record_beacon();
        log::info!("Position beacon {:.6},{:.6}", fix.lat, fix.lon);
        broadcast(ctx, Payload::Position, Some(fix.into()), now_ms);
        publish(
            &ctx.reports,
            &NodeEvent::Position {
                lat: fix.lat,
                lon: fix.lon,
                ts: now_ms,
            },
        );
    }

    fn report_stats(&self, now_ms: u32, gps: bool) {
        let ctx = self.ctx;
        let s = ctx.counters.snapshot();
        log::info!("=== Statistics ===");
        log::info!("Uptime: {} s", now_ms / 1000);
        log::info!("Scans: {}", s.scans);
        log::info!("True hits: {}  Possible hits: {}", s.true_hits, s.possible_hits);
        log::info!(
            "Mesh TX: {} ({} failed)  RX: {} ({} dropped)",
            s.mesh_tx,
            s.mesh_tx_failed,
            s.mesh_rx,
            s.mesh_dropped
        );
        log::info!("Beacons: {}  GPS: {}", s.beacons, if gps { "fix" } else { "no fix" });
        publish(
            &ctx.reports,
            &NodeEvent::Stats {
                uptime: now_ms / 1000,
                gps,
                counters: &s,
            },
        );
    }
}
