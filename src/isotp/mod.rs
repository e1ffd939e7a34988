//! ISO-TP (ISO 15765-2) transmit side
//!
//! The gateway only ever segments towards the ECU. Frames coming back from the
//! bus are routed by the [CanRxRouter]: while a flow control frame is awaited they
//! are staged for the [FlowControlWaiter], otherwise they are forwarded to the host.

mod flow_control;
mod router;
mod segmenter;

use std::time::Duration;

pub use flow_control::{FlowControlParams, FlowControlWaiter};
pub use router::CanRxRouter;
pub use segmenter::{IsoTpTransmitter, TransferParams};

/// PCI type nibble of a single frame
pub const PCI_SINGLE_FRAME: u8 = 0x00;
/// PCI type nibble of a first frame
pub const PCI_FIRST_FRAME: u8 = 0x10;
/// PCI type nibble of a consecutive frame
pub const PCI_CONSECUTIVE_FRAME: u8 = 0x20;
/// PCI type nibble of a flow control frame
pub const PCI_FLOW_CONTROL: u8 = 0x30;

/// Largest payload a single frame can carry
pub const SINGLE_FRAME_MAX_LEN: usize = 7;
/// Payload bytes carried by the first frame
pub const FIRST_FRAME_DATA_LEN: usize = 6;
/// Payload bytes carried by a consecutive frame
pub const CONSECUTIVE_FRAME_DATA_LEN: usize = 7;
/// Largest length the 12 bit first frame length field can express
pub const FIRST_FRAME_MAX_LEN: usize = 0xFFF;

/// Flow status carried in the low nibble of a flow control PCI
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr, strum_macros::Display)]
#[repr(u8)]
pub enum FlowStatus {
    /// Clear to send
    ContinueToSend = 0x00,
    /// Receiver asks the sender to wait
    Wait = 0x01,
    /// Receiver cannot take the message
    Overflow = 0x02,
}

/// Link parameters of the session. Block size and separation time are overwritten by
/// every CTS flow control frame, and otherwise keep their last value
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LinkParams {
    /// Consecutive frames allowed per flow control window. 0 is unlimited
    pub block_size: u8,
    /// STmin, as received in the flow control frame
    pub separation_time: u8,
    /// Fill value for unused bytes of the last consecutive frame
    pub padding_byte: u8,
}

impl LinkParams {
    /// Applies a CTS flow control frame
    pub fn adopt(&mut self, fc: FlowControlParams) {
        self.block_size = fc.block_size;
        self.separation_time = fc.st_min;
    }
}

/// Decodes an STmin byte into the delay between consecutive frames.
///
/// `0x00..=0x7F` are milliseconds, `0xF1..=0xF9` are 100-900us. Reserved values
/// are treated as the longest valid delay (127ms).
pub fn separation_delay(st_min: u8) -> Duration {
    match st_min {
        0x00..=0x7F => Duration::from_millis(st_min as u64),
        0xF1..=0xF9 => Duration::from_micros((st_min - 0xF0) as u64 * 100),
        _ => Duration::from_millis(0x7F),
    }
}
