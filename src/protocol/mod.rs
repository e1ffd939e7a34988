//! Host framing protocol ("frame 99")
//!
//! Every frame exchanged with the host starts with the 3 byte magic header
//! `0x99 0x33 0x22`, followed by a command byte and a command specific payload.
//! Multi byte integers are big endian.
//!
//! ```text
//! host -> gateway   99 33 22 <cmd> <payload..>
//! gateway -> host   99 33 22 01 <cmd> <result>          (response)
//! gateway -> host   99 33 22 20 <id:4> <rtr> <dlc> <data..dlc>   (CAN traffic)
//! ```

pub mod codec;
pub mod reassembler;

pub use codec::{decode_can_frame, decode_response, encode_can_frame, encode_response};
pub use reassembler::{Extracted, HostCommand, Reassembler};

/// Magic bytes every host frame begins with
pub const FRAME_HEADER: [u8; 3] = [0x99, 0x33, 0x22];
/// Length of [FRAME_HEADER]
pub const HEADER_SIZE: usize = FRAME_HEADER.len();
/// Largest ISO-TP payload the host may send in one command
pub const MAX_PAYLOAD_LENGTH: usize = 4096 * 2;
/// Capacity of the host reassembly buffer
pub const FRAME_BUFFER_SIZE: usize = HEADER_SIZE + 6 + MAX_PAYLOAD_LENGTH;
/// Payload bytes in a classic CAN frame
pub const MAX_CAN_DATA_LENGTH: usize = 8;

/// Command byte of a host frame
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, strum_macros::FromRepr, strum_macros::Display,
)]
#[repr(u8)]
pub enum Command {
    /// Response to a host command (gateway -> host)
    AckNak = 0x01,
    /// Enable (1) or disable (0) the CAN controller
    CanEnableDisable = 0x02,
    /// Set the bus bitrate code
    SetCanBitrate = 0x03,
    /// Set the ISO-TP transmit and flow control IDs
    SetEcuTxRxId = 0x04,
    /// Set the padding byte for consecutive frames
    SetPaddingByte = 0x05,
    /// Send a payload using ISO-TP segmentation
    IsoTpFrame = 0x11,
    /// CAN frame received from the bus (gateway -> host)
    ReceiveRawCanFrame = 0x20,
    /// Send one raw CAN frame
    SendRawCanFrame = 0x21,
}

/// Result byte carried in every response frame
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, strum_macros::FromRepr, strum_macros::Display,
)]
#[repr(u8)]
pub enum ResultCode {
    /// Command rejected
    Nak = 0,
    /// Command completed
    Ack = 1,
    /// Generic timeout
    Timeout = 2,
    /// Receiver reported flow control overflow
    Overflow = 3,
    /// No flow control frame arrived in time
    FlowControlTimeout = 4,
    /// Receiver sent an unknown flow control status
    UnsupportedFlowControl = 5,
    /// Sending the first frame failed
    FfSendErr = 6,
    /// Sending the single frame failed
    SfSendErr = 7,
    /// Sending a consecutive frame failed
    CfSendErr = 8,
}

impl ResultCode {
    /// True only for [ResultCode::Ack]
    pub fn is_ack(self) -> bool {
        self == ResultCode::Ack
    }
}
