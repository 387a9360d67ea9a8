//! SARHound library — portable core of a search-and-rescue detection node.
//!
//! A node listens for BLE advertisements, classifies each device address
//! against known targets and device-type signatures, and spreads alerts to
//! neighbouring nodes over a single-hop broadcast mesh. The same alerts go
//! to the operator's screen and buzzer and, as NDJSON, to a base station on
//! the serial cable.
//!
//! Everything here is `no_std`, allocation-free, and testable on any host
//! with `cargo test`. The ESP32 firmware binary is a thin consumer that
//! supplies the radio, GPS, display and buzzer collaborators.
//!
//! Data flow:
//! - scan callback: [`scanner`] → [`dispatch`] ([`classifier`], [`presentation`],
//!   [`radio`], [`comm`])
//! - control loop: [`node::ControlLoop`] → [`receive`] → [`beacon`] → [`stats`]
//!   → [`presentation`]

#![cfg_attr(not(test), no_std)]

pub mod beacon;
pub mod board;
pub mod classifier;
pub mod comm;
pub mod config;
pub mod defaults;
pub mod dispatch;
pub mod error;
pub mod node;
pub mod presentation;
pub mod protocol;
pub mod radio;
pub mod receive;
pub mod registry;
pub mod scanner;
pub mod stats;
