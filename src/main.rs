//! SARHound — search-and-rescue BLE detection node
//!
//! Passively scans BLE advertisements, alerts on configured targets and
//! known medical-device signatures, and shares alerts with neighbouring
//! nodes over an ESP-NOW broadcast mesh. Reports stream to a base station
//! as NDJSON over serial.
//!
//! All detection, mesh and presentation logic lives in the `sarhound`
//! library; this binary wires up the radios, display and buzzer.

#![no_std]
#![no_main]

extern crate alloc;

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

// Hardware-specific modules (binary crate only)
#[cfg(feature = "m5stickc")]
mod buzzer;
#[cfg(feature = "m5stickc")]
mod display;

// Re-export library modules so binary submodules (display, buzzer) can use crate::*
pub(crate) use sarhound::{board, presentation, protocol};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Timer};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::timer::timg::TimerGroup;
use esp_radio::esp_now::{EspNow, BROADCAST_ADDRESS};
use esp_radio::wifi::{WifiController, WifiMode};
use static_cell::StaticCell;

use trouble_host::prelude::*;

use sarhound::beacon::GpsUnavailable;
use sarhound::comm;
use sarhound::dispatch::handle_detection;
use sarhound::error::RadioError;
use sarhound::node::{ControlLoop, NodeContext};
use sarhound::presentation::Render;
use sarhound::protocol::{Frame, MAX_FRAME_LEN, VERSION, WIRE_SIZE};
use sarhound::radio::{MeshRadio, SharedRadio};
use sarhound::scanner::{DetectionChannel, DetectionEvent};

/// Control loop period. Every step inside a tick is non-blocking.
const TICK_MS: u64 = 50;

/// ESP-NOW channel shared by every node in the team
const MESH_CHANNEL: u8 = 1;

type InboundFrame = heapless::Vec<u8, MAX_FRAME_LEN>;
type OutboundChannel = Channel<CriticalSectionRawMutex, Frame, 4>;
type InboundChannel = Channel<CriticalSectionRawMutex, InboundFrame, 4>;

// ── Static channels and shared state ─────────────────────────────────

/// Advertisement reports from the BLE runner to the detection task
static DETECTIONS: DetectionChannel = Channel::new();

/// Frames waiting for the ESP-NOW driver
static MESH_OUTBOUND: OutboundChannel = Channel::new();

/// Frames received by the ESP-NOW driver, polled by the control loop
static MESH_INBOUND: InboundChannel = Channel::new();

static NODE: StaticCell<NodeContext<EspNowRadio>> = StaticCell::new();

/// Time since boot on the wrapping millisecond clock the core uses.
fn now_ms() -> u32 {
    (Instant::now().as_millis() & 0xFFFF_FFFF) as u32
}

// ── Mesh radio ───────────────────────────────────────────────────────

/// Core-facing side of the ESP-NOW link. Both calls only touch the
/// in-memory queues; `mesh_task` owns the driver.
struct EspNowRadio;

impl MeshRadio for EspNowRadio {
    fn send(&mut self, frame: &[u8; WIRE_SIZE]) -> Result<(), RadioError> {
        // -1: driver queue full
        MESH_OUTBOUND.try_send(*frame).map_err(|_| RadioError::Send(-1))
    }

    fn try_receive(&mut self, buf: &mut [u8]) -> Result<Option<usize>, RadioError> {
        let Ok(frame) = MESH_INBOUND.try_receive() else {
            return Ok(None);
        };
        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        Ok(Some(len))
    }
}

/// Drives the ESP-NOW driver: transmits queued frames as broadcasts and
/// queues everything received.
#[embassy_executor::task]
async fn mesh_task(mut esp_now: EspNow<'static>) {
    log::info!("Mesh task started");

    loop {
        match embassy_futures::select::select(MESH_OUTBOUND.receive(), esp_now.receive_async()).await {
            embassy_futures::select::Either::First(frame) => {
                if let Err(e) = esp_now.send_async(&BROADCAST_ADDRESS, &frame).await {
                    log::warn!("ESP-NOW send failed: {:?}", e);
                }
            }
            embassy_futures::select::Either::Second(received) => {
                let Ok(frame) = InboundFrame::from_slice(received.data()) else {
                    continue;
                };
                if MESH_INBOUND.try_send(frame).is_err() {
                    log::debug!("Mesh inbound queue full, frame dropped");
                }
            }
        }
    }
}

/// Bring up WiFi in station mode for ESP-NOW and start the mesh task.
/// Any failure leaves the node without a mesh for the session.
fn start_mesh(
    spawner: &embassy_executor::Spawner,
    mut controller: WifiController<'static>,
    esp_now: EspNow<'static>,
) -> SharedRadio<EspNowRadio> {
    if let Err(e) = controller.set_mode(WifiMode::Sta).and_then(|_| controller.start()) {
        log::warn!("WiFi start failed, mesh disabled: {:?}", e);
        return SharedRadio::unavailable();
    }
    if let Err(e) = esp_now.set_channel(MESH_CHANNEL) {
        log::warn!("ESP-NOW channel setup failed, mesh disabled: {:?}", e);
        return SharedRadio::unavailable();
    }
    if spawner.spawn(mesh_task(esp_now)).is_err() {
        log::warn!("Mesh task spawn failed, mesh disabled");
        return SharedRadio::unavailable();
    }

    // The driver stays up for the whole session.
    static WIFI_CONTROLLER: StaticCell<WifiController<'static>> = StaticCell::new();
    WIFI_CONTROLLER.init(controller);

    log::info!("ESP-NOW mesh on channel {}", MESH_CHANNEL);
    SharedRadio::new(EspNowRadio)
}

// ── BLE scan event handler ───────────────────────────────────────────

/// EventHandler for BLE advertisement reports from trouble-host.
///
/// Called synchronously from the runner — must not block. Reports are
/// turned into detection events and queued; a full queue drops them.
struct ScanEventHandler {
    node: &'static NodeContext<EspNowRadio>,
}

impl EventHandler for ScanEventHandler {
    fn on_adv_reports(&self, mut it: LeAdvReportsIter<'_>) {
        while let Some(Ok(report)) = it.next() {
            let Ok(addr) = <&[u8; 6]>::try_from(report.addr.raw()) else {
                continue;
            };
            let event = DetectionEvent::from_report(
                addr,
                report.rssi,
                report.data,
                now_ms(),
                self.node.latest_fix(),
            );
            let _ = DETECTIONS.try_send(event);
        }
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Heap for the BLE + WiFi coex stacks. ESP32 is tighter on DRAM.
    #[cfg(feature = "esp32")]
    {
        esp_alloc::heap_allocator!(size: 64 * 1024);
    }
    #[cfg(not(feature = "esp32"))]
    {
        esp_alloc::heap_allocator!(size: 128 * 1024);
    }

    // Start the RTOS — requires timer + software interrupt
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!("SARHound v{} starting on {}", VERSION, board::BOARD_NAME);

    // Hold power on (M5StickC Plus2 needs GPIO4 HIGH to stay powered)
    #[cfg(feature = "m5stickc")]
    let _power_hold = esp_hal::gpio::Output::new(
        peripherals.GPIO4,
        esp_hal::gpio::Level::High,
        esp_hal::gpio::OutputConfig::default(),
    );

    // ── Radio initialization ───────────────────────────────────────────
    // BLE must be initialized BEFORE WiFi for coexistence to work
    // (especially on ESP32-S3).

    let connector = esp_radio::ble::controller::BleConnector::new(peripherals.BT, Default::default());
    if let Err(e) = &connector {
        log::error!("BLE init failed, scanning disabled: {:?}", e);
    }

    let radio = match esp_radio::wifi::new(peripherals.WIFI, Default::default()) {
        Ok((controller, interfaces)) => start_mesh(&spawner, controller, interfaces.esp_now),
        Err(e) => {
            log::warn!("WiFi init failed, mesh disabled: {:?}", e);
            SharedRadio::unavailable()
        }
    };

    let node: &'static NodeContext<EspNowRadio> = NODE.init(NodeContext::from_defaults(radio));
    node.boot_report();

    spawner.spawn(detection_task(node)).ok();
    spawner.spawn(control_task(node)).ok();
    spawner.spawn(output_serial_task(node)).ok();

    // Display + buzzer tasks (M5StickC only)
    #[cfg(feature = "m5stickc")]
    {
        spawner
            .spawn(display::display_task(
                peripherals.SPI2,
                peripherals.GPIO15,
                peripherals.GPIO13,
                peripherals.GPIO5,
                peripherals.GPIO14,
                peripherals.GPIO12,
                peripherals.GPIO27,
            ))
            .ok();
        log::info!("Display task spawned");

        spawner
            .spawn(buzzer::buzzer_task(peripherals.LEDC, peripherals.GPIO2))
            .ok();
        log::info!("Buzzer task spawned");
    }

    let Ok(connector) = connector else {
        // No BLE: the mesh and presentation still run.
        loop {
            Timer::after(Duration::from_secs(60)).await;
        }
    };

    let controller: ExternalController<_, 20> = ExternalController::new(connector);

    static HOST_RESOURCES: StaticCell<HostResources<DefaultPacketPool, 1, 2>> = StaticCell::new();
    let resources = HOST_RESOURCES.init(HostResources::new());

    let address = Address::random([0xff, 0x8f, 0x1a, 0x05, 0xe4, 0xab]);

    let stack = trouble_host::new(controller, resources).set_random_address(address);
    let Host {
        central, mut runner, ..
    } = stack.build();

    log::info!("BLE radio initialized");

    let scan_handler = ScanEventHandler { node };
    let timing = node.config.scan;

    // ── BLE orchestration ──────────────────────────────────────────────
    //
    //   1. BLE stack runner (drives HCI, delivers scan reports to handler)
    //   2. BLE scanner (starts scan, keeps session alive)

    let _ = embassy_futures::join::join(
        async {
            loop {
                if let Err(e) = runner.run_with_handler(&scan_handler).await {
                    log::error!("BLE runner error: {:?}", e);
                    Timer::after(Duration::from_secs(1)).await;
                }
            }
        },
        async {
            let mut scanner = trouble_host::scan::Scanner::new(central);
            let config = ScanConfig {
                active: timing.active,
                interval: Duration::from_millis(u64::from(timing.interval_ms)),
                window: Duration::from_millis(u64::from(timing.window_ms)),
                ..Default::default()
            };

            let _session = match scanner.scan(&config).await {
                Ok(session) => session,
                Err(e) => {
                    log::error!("BLE scan failed to start: {:?}", e);
                    return;
                }
            };

            log::info!(
                "BLE scan started ({}, {}/{} ms)",
                if timing.active { "active" } else { "passive" },
                timing.window_ms,
                timing.interval_ms
            );
            // Session stays alive as long as _session exists.
            // Reports flow through ScanEventHandler on the runner.
            loop {
                Timer::after(Duration::from_secs(60)).await;
            }
        },
    )
    .await;
}

/// Detection task — drains advertisement reports and runs the dispatcher.
#[embassy_executor::task]
async fn detection_task(node: &'static NodeContext<EspNowRadio>) {
    log::info!("Detection task started");

    let rx = DETECTIONS.receiver();
    loop {
        let event = rx.receive().await;
        handle_detection(node, &event);
    }
}

/// Control loop task — mesh poll, GPS, beacons, stats and presentation.
#[embassy_executor::task]
async fn control_task(node: &'static NodeContext<EspNowRadio>) {
    log::info!("Control loop started");

    let mut ctl = ControlLoop::new(node);
    let mut gps = GpsUnavailable;
    #[cfg(feature = "m5stickc")]
    let mut screen = display::SignalDisplay;
    #[cfg(not(feature = "m5stickc"))]
    let mut screen = presentation::Headless;

    if !board::HAS_GPS_HEADER {
        log::warn!("No GPS on this board, position beacons disabled");
    }

    loop {
        if let Some(Render::Alert(alert)) = ctl.tick(now_ms(), &mut gps, &mut screen) {
            #[cfg(feature = "m5stickc")]
            buzzer::BUZZER_SIGNAL.signal(alert.tone());
            #[cfg(not(feature = "m5stickc"))]
            let _ = alert;
        }
        Timer::after(Duration::from_millis(TICK_MS)).await;
    }
}

/// Serial output task — writes queued NDJSON reports for the base station.
#[embassy_executor::task]
async fn output_serial_task(node: &'static NodeContext<EspNowRadio>) {
    log::info!("Serial output task started ({} baud)", comm::SERIAL_BAUD);

    loop {
        let msg = node.reports.receive().await;
        if let Ok(s) = core::str::from_utf8(&msg) {
            log::info!("{}", s.trim_end());
        }
    }
}
