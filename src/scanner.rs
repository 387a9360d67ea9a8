/// BLE advertisement intake.
///
/// The scanning transport calls into this module from its own execution
/// context (a radio callback). Everything here is non-blocking and
/// allocation-free; parsed events are pushed onto a bounded channel that the
/// dispatcher drains.
use core::fmt::Write;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::beacon::Fix;
use crate::protocol::Identifier;

/// Maximum length for advertised device names
pub type NameString = heapless::String<32>;

/// One observed advertisement. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEvent {
    pub identifier: Identifier,
    /// Signal strength in dBm.
    pub rssi: i8,
    /// Advertised local name, if any.
    pub name: Option<NameString>,
    /// Uptime in milliseconds when observed.
    pub timestamp_ms: u32,
    /// Node position when observed, if a fix was available.
    pub position: Option<Fix>,
}

impl DetectionEvent {
    pub fn new(
        identifier: Identifier,
        rssi: i8,
        name: Option<NameString>,
        timestamp_ms: u32,
        position: Option<Fix>,
    ) -> Self {
        Self {
            identifier,
            rssi,
            name,
            timestamp_ms,
            position,
        }
    }

    /// Build an event from a raw advertising report.
    ///
    /// `addr` is in HCI (little-endian) byte order; `ad_data` is the raw
    /// advertisement payload.
    pub fn from_report(
        addr: &[u8; 6],
        rssi: i8,
        ad_data: &[u8],
        timestamp_ms: u32,
        position: Option<Fix>,
    ) -> Self {
        Self::new(
            format_addr(addr),
            rssi,
            BleAdvParser::local_name(ad_data),
            timestamp_ms,
            position,
        )
    }
}

/// Bounded queue from the scan callback to the dispatcher.
pub type DetectionChannel = Channel<CriticalSectionRawMutex, DetectionEvent, 16>;

/// Format a BLE device address as "aa:bb:cc:dd:ee:ff".
///
/// HCI delivers addresses least-significant byte first; the printed form
/// starts with the most-significant byte.
pub fn format_addr(addr: &[u8; 6]) -> Identifier {
    let mut out = Identifier::new();
    let _ = write!(
        out,
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        addr[5], addr[4], addr[3], addr[2], addr[1], addr[0]
    );
    out
}

/// Parser for BLE advertisement data (AD structures).
///
/// AD structure format: [length] [type] [data...]
/// Only the local name is needed here:
///   0x08 = Shortened local name
///   0x09 = Complete local name
pub struct BleAdvParser;

impl BleAdvParser {
    /// Return the advertised local name. A complete name wins over a
    /// shortened one; non-UTF-8 names are ignored.
    pub fn local_name(ad_data: &[u8]) -> Option<NameString> {
        let mut shortened = None;

        let mut pos = 0;
        while pos < ad_data.len() {
            let len = ad_data[pos] as usize;
            if len == 0 || pos + 1 + len > ad_data.len() {
                break;
            }

            let ad_type = ad_data[pos + 1];
            let data = &ad_data[pos + 2..pos + 1 + len];

            match ad_type {
                0x09 => return Self::name_from(data),
                0x08 => shortened = Self::name_from(data),
                _ => {}
            }

            pos += 1 + len;
        }

        shortened
    }

    fn name_from(data: &[u8]) -> Option<NameString> {
        let name = core::str::from_utf8(data).ok()?;
        if name.is_empty() {
            return None;
        }
        Some(crate::config::truncate_into(name).0)
    }
}
