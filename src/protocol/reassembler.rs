//! Reassembly of host commands from an undelimited byte stream
//!
//! The host transport delivers bytes in arbitrary chunks. The only delimiter is
//! the 3 byte magic header, so on garbage the buffer is shifted one byte at a time
//! until a header lines up again.

use log::{debug, error, warn};

use crate::{
    channel::{is_extended_id, CanBitrate, CanFrame},
    Frame99Error, Frame99Result,
};

use super::{Command, FRAME_BUFFER_SIZE, FRAME_HEADER, HEADER_SIZE, MAX_CAN_DATA_LENGTH, MAX_PAYLOAD_LENGTH};

/// Offset of the command byte
const CMD_IDX: usize = HEADER_SIZE;
/// Offset of the first payload byte
const BODY_IDX: usize = HEADER_SIZE + 1;

/// Fully parsed host command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    /// Payload to send with ISO-TP segmentation
    IsoTpFrame(Vec<u8>),
    /// New transport addressing
    SetEcuIds {
        /// ID the gateway transmits to
        rx_id: u32,
        /// ID flow control frames are expected from
        tx_id: u32,
    },
    /// Enable (true) or disable (false) the CAN bus
    CanEnable(bool),
    /// Change the bus speed
    SetBitrate(CanBitrate),
    /// Change the consecutive frame padding byte
    SetPaddingByte(u8),
    /// Send a CAN frame verbatim
    SendRawCanFrame(CanFrame),
}

impl HostCommand {
    /// Command byte this command was received with
    pub fn command(&self) -> Command {
        match self {
            HostCommand::IsoTpFrame(_) => Command::IsoTpFrame,
            HostCommand::SetEcuIds { .. } => Command::SetEcuTxRxId,
            HostCommand::CanEnable(_) => Command::CanEnableDisable,
            HostCommand::SetBitrate(_) => Command::SetCanBitrate,
            HostCommand::SetPaddingByte(_) => Command::SetPaddingByte,
            HostCommand::SendRawCanFrame(_) => Command::SendRawCanFrame,
        }
    }
}

/// Outcome of pulling one frame out of the buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// A valid command
    Command(HostCommand),
    /// A frame with a valid header that has to be answered with NAK.
    /// Carries the raw command byte
    Rejected(u8),
}

/// Host frame reassembly buffer
#[derive(Debug, Clone)]
pub struct Reassembler {
    buf: Vec<u8>,
    expected_payload_len: Option<usize>,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    /// Creates an empty buffer with room for the largest command
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(FRAME_BUFFER_SIZE),
            expected_payload_len: None,
        }
    }

    /// Bytes currently buffered
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drops everything buffered
    pub fn reset(&mut self) {
        self.buf.clear();
        self.expected_payload_len = None;
    }

    /// Appends bytes from the host. If the buffer would exceed its capacity, it is
    /// reset and nothing from this call is kept.
    pub fn push(&mut self, bytes: &[u8]) -> Frame99Result<()> {
        let len = self.buf.len() + bytes.len();
        if len > FRAME_BUFFER_SIZE {
            error!("Buffer overflow detected ({len} > {FRAME_BUFFER_SIZE}). Resetting buffer.");
            self.reset();
            return Err(Frame99Error::BufferOverflow {
                len,
                capacity: FRAME_BUFFER_SIZE,
            });
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Tries to extract one frame. Returns `None` if more bytes are needed.
    /// Once a frame is extracted, the whole buffer is reset, including any
    /// bytes that followed it.
    pub fn next_frame(&mut self) -> Option<Extracted> {
        loop {
            if self.buf.len() < HEADER_SIZE + 1 {
                return None;
            }
            if self.buf[..HEADER_SIZE] != FRAME_HEADER {
                self.buf.remove(0);
                continue;
            }
            let extracted = self.try_parse()?;
            self.reset();
            return Some(extracted);
        }
    }

    fn try_parse(&mut self) -> Option<Extracted> {
        let cmd = self.buf[CMD_IDX];
        let body = &self.buf[BODY_IDX..];
        let extracted = match Command::from_repr(cmd) {
            Some(Command::IsoTpFrame) => {
                let len = match self.expected_payload_len {
                    Some(len) => len,
                    None => {
                        if body.len() < 2 {
                            return None;
                        }
                        let len = u16::from_be_bytes([body[0], body[1]]) as usize;
                        if len > MAX_PAYLOAD_LENGTH {
                            error!("Invalid payload length: {len}");
                            return Some(Extracted::Rejected(cmd));
                        }
                        self.expected_payload_len = Some(len);
                        len
                    }
                };
                if body.len() < 2 + len {
                    return None;
                }
                Extracted::Command(HostCommand::IsoTpFrame(body[2..2 + len].to_vec()))
            }
            Some(Command::SetEcuTxRxId) => {
                if body.len() < 8 {
                    return None;
                }
                Extracted::Command(HostCommand::SetEcuIds {
                    rx_id: u32::from_be_bytes([body[0], body[1], body[2], body[3]]),
                    tx_id: u32::from_be_bytes([body[4], body[5], body[6], body[7]]),
                })
            }
            Some(Command::CanEnableDisable) => match *body.first()? {
                0 => Extracted::Command(HostCommand::CanEnable(false)),
                1 => Extracted::Command(HostCommand::CanEnable(true)),
                other => {
                    warn!("Invalid CAN enable value {other:#04X}");
                    Extracted::Rejected(cmd)
                }
            },
            Some(Command::SetCanBitrate) => {
                let code = *body.first()?;
                match CanBitrate::from_repr(code) {
                    Some(rate) => Extracted::Command(HostCommand::SetBitrate(rate)),
                    None => {
                        warn!("Invalid bitrate code {code:#04X}");
                        Extracted::Rejected(cmd)
                    }
                }
            }
            Some(Command::SetPaddingByte) => {
                Extracted::Command(HostCommand::SetPaddingByte(*body.first()?))
            }
            Some(Command::SendRawCanFrame) => {
                if body.len() < 6 {
                    return None;
                }
                let id = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
                let rtr = body[4] != 0;
                let dlc = body[5] as usize;
                if dlc > MAX_CAN_DATA_LENGTH {
                    error!("Invalid raw CAN DLC: {dlc}");
                    return Some(Extracted::Rejected(cmd));
                }
                if body.len() < 6 + dlc {
                    return None;
                }
                let frame = CanFrame::new(id, &body[6..6 + dlc], is_extended_id(id)).with_rtr(rtr);
                Extracted::Command(HostCommand::SendRawCanFrame(frame))
            }
            _ => {
                warn!("Unknown command {cmd:#04X}");
                Extracted::Rejected(cmd)
            }
        };
        debug!(
            "Host frame: command {cmd:#04X}, {} bytes",
            self.expected_payload_len.unwrap_or(body.len())
        );
        Some(extracted)
    }
}
