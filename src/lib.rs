#![warn(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications,
    clippy::uninlined_format_args
)]

//! Protocol core of a CAN-bus to host gateway.
//!
//! A host (over TCP, BLE or USB) exchanges CAN traffic with a vehicle ECU through
//! the gateway. This crate implements everything between the two transports:
//!
//! ## Host framing ("frame 99")
//! Bytes from the host are reassembled into commands delimited only by the magic
//! header `0x99 0x33 0x22`. Commands allow the host to send ISO-TP payloads of up
//! to 8KB, send raw CAN frames, and control the bus (enable, bitrate, addressing,
//! padding). Every command is answered with an ACK/NAK response frame.
//!
//! ## ISO-TP transmit (ISO 15765-2)
//! Payloads are segmented into single, first and consecutive frames. The flow
//! control handshake (block size, separation time, wait and overflow statuses) is
//! driven over a CAN driver the crate does not own.
//!
//! ## CAN receive routing
//! Every frame received from the bus is forwarded to the host, except while the
//! transmitter is awaiting flow control, where frames are staged so the flow
//! control reply can be picked out of regular traffic.
//!
//! The physical CAN driver and host transport are reached through the traits in
//! [channel]. The [hardware::simulation] module provides in-memory versions of both.

pub mod channel;
pub mod config;
pub mod hardware;
pub mod isotp;
pub mod protocol;
pub mod session;

pub use channel::{CanBitrate, CanChannel, CanFrame, ChannelError, ChannelResult, HostSink};
pub use config::SessionConfig;
pub use protocol::ResultCode;
pub use session::{EcuIds, ProtocolSession};

/// Gateway result
pub type Frame99Result<T> = Result<T, Frame99Error>;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
/// Gateway API error.
///
/// Protocol level failures (flow control timeouts, CAN driver errors, bad
/// commands) are not errors at this level. They are reported to the host as a
/// [ResultCode].
pub enum Frame99Error {
    /// Bytes fed from the host do not fit the reassembly buffer
    #[error("Host frame buffer overflow: {len} bytes exceeds capacity of {capacity}")]
    BufferOverflow {
        /// Buffered length the feed would have produced
        len: usize,
        /// Capacity of the buffer
        capacity: usize,
    },
    /// Session configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
