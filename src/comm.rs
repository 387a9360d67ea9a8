/// Base-station reports over serial NDJSON.
///
/// Every noteworthy event on the node is serialized as one line of JSON and
/// queued for the serial output task. A base station logging the cable sees
/// the same picture as the operator looking at the screen, plus mesh
/// traffic and periodic statistics.
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver};
use heapless::Vec;
use serde::Serialize;

use crate::stats::Stats;

/// Maximum size of a serialized report line
pub const MAX_MSG_LEN: usize = 512;

/// Buffer type for serialized report lines
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;

/// Outbound report queue, drained by the serial output task.
pub type ReportChannel = Channel<CriticalSectionRawMutex, MsgBuffer, 8>;
pub type ReportReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, MsgBuffer, 8>;

/// Serial baud rate
pub const SERIAL_BAUD: u32 = 115200;

/// Messages sent from the node to the base station
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum NodeEvent<'a> {
    /// Node came up
    #[serde(rename = "boot")]
    Boot {
        node: &'a str,
        version: &'static str,
        board: &'static str,
        targets: u16,
        signatures: u16,
        /// Whether the mesh radio initialized
        mesh: bool,
    },
    /// Configured target seen by this node
    #[serde(rename = "true_hit")]
    TrueHit {
        id: &'a str,
        rssi: i16,
        #[serde(skip_serializing_if = "Option::is_none")]
        lat: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lon: Option<f32>,
        /// Uptime in milliseconds when observed
        ts: u32,
    },
    /// Signature prefix match seen by this node
    #[serde(rename = "possible_hit")]
    PossibleHit {
        id: &'a str,
        rssi: i16,
        device: &'a str,
        manufacturer: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        lat: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lon: Option<f32>,
        ts: u32,
    },
    /// Frame received from another node
    #[serde(rename = "mesh")]
    Mesh {
        from: &'a str,
        /// "true_hit", "possible_hit", "position" or "status"
        kind: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rssi: Option<i16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        device: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lat: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lon: Option<f32>,
        /// Sender uptime in milliseconds
        ts: u32,
    },
    /// Position beacon sent by this node
    #[serde(rename = "position")]
    Position { lat: f64, lon: f64, ts: u32 },
    /// Periodic counters
    #[serde(rename = "stats")]
    Stats {
        /// Uptime in seconds
        uptime: u32,
        gps: bool,
        counters: &'a Stats,
    },
}

/// Serialize a NodeEvent to JSON bytes and write to the output buffer,
/// followed by the NDJSON newline. Returns the number of bytes written, or
/// None if the event does not fit.
pub fn serialize_event(event: &NodeEvent, buf: &mut [u8]) -> Option<usize> {
    let len = serde_json_core::to_slice(event, buf).ok()?;
    if len >= buf.len() {
        return None;
    }
    buf[len] = b'\n';
    Some(len + 1)
}

/// Serialize `event` and queue it for the serial task. Dropped when the
/// queue is full; returns whether it was queued.
pub fn publish(reports: &ReportChannel, event: &NodeEvent) -> bool {
    let mut buf = [0u8; MAX_MSG_LEN];
    let Some(len) = serialize_event(event, &mut buf) else {
        log::warn!("Report too large, dropped");
        return false;
    };
    let Ok(line) = MsgBuffer::from_slice(&buf[..len]) else {
        return false;
    };
    if reports.try_send(line).is_err() {
        log::debug!("Report queue full, dropped");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_json<'b>(event: &NodeEvent, buf: &'b mut [u8]) -> &'b str {
        let len = serialize_event(event, buf).unwrap();
        core::str::from_utf8(&buf[..len]).unwrap()
    }

    #[test]
    fn boot_event() {
        let mut buf = [0u8; 256];
        let json = to_json(
            &NodeEvent::Boot {
                node: "NODE-001",
                version: "0.1.0",
                board: "test_board",
                targets: 1,
                signatures: 3,
                mesh: true,
            },
            &mut buf,
        );
        assert!(json.starts_with(r#"{"type":"boot""#));
        assert!(json.contains(r#""node":"NODE-001""#));
        assert!(json.contains(r#""signatures":3"#));
        assert!(json.contains(r#""mesh":true"#));
        assert!(json.ends_with('\n'));
    }

    #[test]
    fn true_hit_without_position_omits_coordinates() {
        let mut buf = [0u8; 256];
        let json = to_json(
            &NodeEvent::TrueHit {
                id: "aa:bb:cc:dd:ee:ff",
                rssi: -67,
                lat: None,
                lon: None,
                ts: 1200,
            },
            &mut buf,
        );
        assert!(json.contains(r#""type":"true_hit""#));
        assert!(json.contains(r#""id":"aa:bb:cc:dd:ee:ff""#));
        assert!(json.contains(r#""rssi":-67"#));
        assert!(!json.contains("lat"));
        assert!(!json.contains("lon"));
    }

    #[test]
    fn possible_hit_carries_device_type() {
        let mut buf = [0u8; 256];
        let json = to_json(
            &NodeEvent::PossibleHit {
                id: "70:b3:d5:b3:42:00",
                rssi: -80,
                device: "Pacemaker/ICD/CRT",
                manufacturer: "Medtronic",
                lat: Some(44.5),
                lon: Some(-123.25),
                ts: 5000,
            },
            &mut buf,
        );
        assert!(json.contains(r#""type":"possible_hit""#));
        assert!(json.contains(r#""device":"Pacemaker/ICD/CRT""#));
        assert!(json.contains(r#""manufacturer":"Medtronic""#));
        assert!(json.contains(r#""lat":44.5"#));
        assert!(json.contains(r#""lon":-123.25"#));
    }

    #[test]
    fn mesh_event_skips_absent_fields() {
        let mut buf = [0u8; 256];
        let json = to_json(
            &NodeEvent::Mesh {
                from: "NODE-007",
                kind: "position",
                id: None,
                rssi: None,
                device: None,
                lat: Some(1.5),
                lon: Some(2.5),
                ts: 9,
            },
            &mut buf,
        );
        assert!(json.contains(r#""from":"NODE-007""#));
        assert!(json.contains(r#""kind":"position""#));
        assert!(!json.contains(r#""id""#));
        assert!(!json.contains("rssi"));
    }

    #[test]
    fn stats_event_nests_counters() {
        let counters = Stats {
            scans: 10,
            true_hits: 1,
            ..Stats::default()
        };
        let mut buf = [0u8; 512];
        let json = to_json(
            &NodeEvent::Stats {
                uptime: 30,
                gps: false,
                counters: &counters,
            },
            &mut buf,
        );
        assert!(json.contains(r#""uptime":30"#));
        assert!(json.contains(r#""gps":false"#));
        assert!(json.contains(r#""counters":{"scans":10,"true_hits":1"#));
    }

    #[test]
    fn too_small_buffer_is_rejected() {
        let mut buf = [0u8; 8];
        let event = NodeEvent::Position {
            lat: 1.0,
            lon: 2.0,
            ts: 3,
        };
        assert_eq!(serialize_event(&event, &mut buf), None);
    }

    #[test]
    fn publish_drops_when_queue_full() {
        let reports = ReportChannel::new();
        let event = NodeEvent::Position {
            lat: 1.0,
            lon: 2.0,
            ts: 3,
        };
        for _ in 0..8 {
            assert!(publish(&reports, &event));
        }
        assert!(!publish(&reports, &event));

        let line = reports.try_receive().unwrap();
        assert_eq!(line.last(), Some(&b'\n'));
    }
}
