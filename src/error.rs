/// Error taxonomy for the node.
///
/// None of these are fatal. Each one is logged where it occurs and the
/// affected capability degrades while detection and alerting carry on.
use thiserror::Error;

/// Problems found while loading compiled-in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A configured string did not fit its fixed-capacity field.
    #[error("{field} truncated from {len} to {max} bytes")]
    Truncated {
        field: &'static str,
        len: usize,
        max: usize,
    },
    /// More entries were configured than the registry can hold.
    #[error("{what}: only the first {max} entries were loaded")]
    TooManyEntries { what: &'static str, max: usize },
    /// An exact target is longer than any identifier and can never match.
    #[error("target of {len} bytes exceeds identifier length {max}")]
    TargetTooLong { len: usize, max: usize },
    /// A prefix signature is longer than any identifier and can never match.
    #[error("prefix signature of {len} bytes exceeds identifier length {max}")]
    PrefixTooLong { len: usize, max: usize },
    /// The scan window was longer than the scan interval.
    #[error("scan window {window_ms}ms exceeds interval {interval_ms}ms")]
    ScanWindow { window_ms: u16, interval_ms: u16 },
}

/// Mesh transceiver failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RadioError {
    /// The transceiver never came up; the mesh is disabled for the session.
    #[error("radio unavailable")]
    Unavailable,
    /// The transceiver rejected or failed to transmit a frame.
    #[error("send failed (code {0})")]
    Send(i32),
    /// Reading a pending frame failed.
    #[error("receive failed (code {0})")]
    Receive(i32),
}

/// Inbound frame could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame is {actual} bytes, expected {expected}")]
    Length { expected: usize, actual: usize },
}
