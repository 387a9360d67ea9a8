/// Mesh wire protocol: fixed-size frames broadcast between field nodes.
///
/// Every frame is exactly [`WIRE_SIZE`] bytes, whatever its kind. There is
/// no length prefix and no version tag. Fields are packed in order with no
/// padding; multi-byte numbers are little-endian.
///
/// ```text
/// offset size field
///      0    1 tag (1 true hit, 2 possible hit, 3 position, 4 status)
///      1   17 node id      (NUL-padded)
///     18   18 identifier   (NUL-padded)
///     36    2 rssi         i16
///     38    4 latitude     f32
///     42    4 longitude    f32
///     46    4 timestamp    u32, ms since sender boot
///     50   32 label        (NUL-padded)
/// ```
///
/// String fields always keep at least one trailing NUL, so their usable
/// capacity is one byte less than the field width. Longer values are
/// truncated on encode. A (0, 0) coordinate pair means "no position".
use heapless::String;

use crate::config::truncate_into;
use crate::error::DecodeError;

const TAG_OFFSET: usize = 0;
const NODE_ID_OFFSET: usize = 1;
const NODE_ID_FIELD: usize = 17;
const IDENTIFIER_OFFSET: usize = NODE_ID_OFFSET + NODE_ID_FIELD;
const IDENTIFIER_FIELD: usize = 18;
const RSSI_OFFSET: usize = IDENTIFIER_OFFSET + IDENTIFIER_FIELD;
const LAT_OFFSET: usize = RSSI_OFFSET + 2;
const LON_OFFSET: usize = LAT_OFFSET + 4;
const TIMESTAMP_OFFSET: usize = LON_OFFSET + 4;
const LABEL_OFFSET: usize = TIMESTAMP_OFFSET + 4;
const LABEL_FIELD: usize = 32;

/// Encoded size of every mesh frame.
pub const WIRE_SIZE: usize = LABEL_OFFSET + LABEL_FIELD;

/// Largest frame the radio can hand us (LoRa / ESP-NOW payload limit).
pub const MAX_FRAME_LEN: usize = 255;

/// Usable bytes of a node id ("NODE-001").
pub const NODE_ID_LEN: usize = NODE_ID_FIELD - 1;

/// Usable bytes of an identifier ("aa:bb:cc:dd:ee:ff" is exactly this long).
pub const IDENTIFIER_LEN: usize = IDENTIFIER_FIELD - 1;

/// Usable bytes of a device label.
pub const LABEL_LEN: usize = LABEL_FIELD - 1;

pub type NodeId = String<NODE_ID_LEN>;
pub type Identifier = String<IDENTIFIER_LEN>;
pub type Label = String<LABEL_LEN>;

/// Encoded frame buffer.
pub type Frame = [u8; WIRE_SIZE];

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wire coordinates. Stored as `f32` because that is what the frame holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f32,
    pub lon: f32,
}

/// Message-specific content.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Exact target seen by the sender.
    TrueHit { identifier: Identifier, rssi: i16 },
    /// Signature prefix match seen by the sender.
    PossibleHit {
        identifier: Identifier,
        rssi: i16,
        label: Label,
    },
    /// Sender moved far enough to announce its position.
    Position,
    /// Node status; also what unknown tags decode to.
    Status,
}

impl Payload {
    pub fn tag(&self) -> u8 {
        match self {
            Payload::TrueHit { .. } => 1,
            Payload::PossibleHit { .. } => 2,
            Payload::Position => 3,
            Payload::Status => 4,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::TrueHit { .. } => "true_hit",
            Payload::PossibleHit { .. } => "possible_hit",
            Payload::Position => "position",
            Payload::Status => "status",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshMessage {
    pub node_id: NodeId,
    /// Sender's fix. `(0, 0)` is the wire's "no position", so
    /// `Some(Position { lat: 0.0, lon: 0.0 })` decodes as `None`.
    pub position: Option<Position>,
    /// Milliseconds since the sender booted.
    pub timestamp: u32,
    pub payload: Payload,
}

impl MeshMessage {
    /// Build a message, truncating `node_id` to the wire capacity.
    pub fn new(node_id: &str, position: Option<Position>, timestamp: u32, payload: Payload) -> Self {
        Self {
            node_id: truncate_into(node_id).0,
            position,
            timestamp,
            payload,
        }
    }

    pub fn encode(&self) -> Frame {
        encode(self)
    }
}

/// Serialize a message into its fixed-size frame.
pub fn encode(msg: &MeshMessage) -> Frame {
    let mut frame = [0u8; WIRE_SIZE];
    frame[TAG_OFFSET] = msg.payload.tag();
    put_str(&mut frame, NODE_ID_OFFSET, NODE_ID_FIELD, &msg.node_id);

    let (identifier, rssi, label) = match &msg.payload {
        Payload::TrueHit { identifier, rssi } => (identifier.as_str(), *rssi, ""),
        Payload::PossibleHit {
            identifier,
            rssi,
            label,
        } => (identifier.as_str(), *rssi, label.as_str()),
        Payload::Position | Payload::Status => ("", 0, ""),
    };
    put_str(&mut frame, IDENTIFIER_OFFSET, IDENTIFIER_FIELD, identifier);
    frame[RSSI_OFFSET..LAT_OFFSET].copy_from_slice(&rssi.to_le_bytes());

    let Position { lat, lon } = msg.position.unwrap_or(Position { lat: 0.0, lon: 0.0 });
    frame[LAT_OFFSET..LON_OFFSET].copy_from_slice(&lat.to_le_bytes());
    frame[LON_OFFSET..TIMESTAMP_OFFSET].copy_from_slice(&lon.to_le_bytes());
    frame[TIMESTAMP_OFFSET..LABEL_OFFSET].copy_from_slice(&msg.timestamp.to_le_bytes());
    put_str(&mut frame, LABEL_OFFSET, LABEL_FIELD, label);
    frame
}

/// Parse a received frame.
///
/// Only the length is checked. Any [`WIRE_SIZE`] buffer decodes to some
/// message: unknown tags become [`Payload::Status`] and string fields keep
/// their longest valid UTF-8 prefix.
pub fn decode(bytes: &[u8]) -> Result<MeshMessage, DecodeError> {
    let frame: &Frame = bytes.try_into().map_err(|_| DecodeError::Length {
        expected: WIRE_SIZE,
        actual: bytes.len(),
    })?;

    let rssi = i16::from_le_bytes([frame[RSSI_OFFSET], frame[RSSI_OFFSET + 1]]);
    let lat = f32::from_le_bytes(le4(frame, LAT_OFFSET));
    let lon = f32::from_le_bytes(le4(frame, LON_OFFSET));
    let position = if lat == 0.0 && lon == 0.0 {
        None
    } else {
        Some(Position { lat, lon })
    };

    let payload = match frame[TAG_OFFSET] {
        1 => Payload::TrueHit {
            identifier: get_str(frame, IDENTIFIER_OFFSET, IDENTIFIER_FIELD),
            rssi,
        },
        2 => Payload::PossibleHit {
            identifier: get_str(frame, IDENTIFIER_OFFSET, IDENTIFIER_FIELD),
            rssi,
            label: get_str(frame, LABEL_OFFSET, LABEL_FIELD),
        },
        3 => Payload::Position,
        _ => Payload::Status,
    };

    Ok(MeshMessage {
        node_id: get_str(frame, NODE_ID_OFFSET, NODE_ID_FIELD),
        position,
        timestamp: u32::from_le_bytes(le4(frame, TIMESTAMP_OFFSET)),
        payload,
    })
}

fn le4(frame: &Frame, offset: usize) -> [u8; 4] {
    [
        frame[offset],
        frame[offset + 1],
        frame[offset + 2],
        frame[offset + 3],
    ]
}

/// Write `s` NUL-padded into `field` bytes, leaving room for one NUL.
fn put_str(frame: &mut Frame, offset: usize, field: usize, s: &str) {
    let mut end = s.len().min(field - 1);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    frame[offset..offset + end].copy_from_slice(&s.as_bytes()[..end]);
}

/// Read a NUL-terminated field, keeping the longest valid UTF-8 prefix.
fn get_str<const N: usize>(frame: &Frame, offset: usize, field: usize) -> String<N> {
    let raw = &frame[offset..offset + field];
    let raw = match raw.iter().position(|&b| b == 0) {
        Some(nul) => &raw[..nul],
        None => raw,
    };
    let text = match core::str::from_utf8(raw) {
        Ok(text) => text,
        // Cannot fail: the prefix up to `valid_up_to` is valid UTF-8.
        Err(e) => core::str::from_utf8(&raw[..e.valid_up_to()]).unwrap_or(""),
    };
    truncate_into(text).0
}
