//! Module for the collaborators the protocol core talks through
//!
//! The gateway does not own the CAN driver nor the host transport. Both are
//! reached through the traits defined here:
//! * [CanChannel] - Raw CAN transmit side and bus control
//! * [HostSink] - Byte sink towards the host (TCP, BLE or USB)
//!
//! Inbound CAN traffic is delivered the other way, by the driver calling
//! [crate::isotp::CanRxRouter::on_can_frame].

use std::sync::mpsc;

/// Communication channel result
pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
/// Error produced by a collaborator channel
pub enum ChannelError {
    /// Timeout when writing data to the channel
    #[error("timeout writing to channel")]
    WriteTimeout,
    /// The channels Tx buffer is full
    #[error("channel's transmit buffer is full")]
    BufferFull,
    /// The CAN bus is disabled
    #[error("CAN bus is disabled")]
    BusDisabled,
    /// The host side of the link has gone away
    #[error("host transport disconnected")]
    HostDisconnected,
    /// Unsupported channel request
    #[error("unsupported channel request")]
    UnsupportedRequest,
    /// Any other driver error
    #[error("channel error: {0}")]
    Other(String),
}

/// Returns true if the identifier does not fit in 11 bits
pub fn is_extended_id(id: u32) -> bool {
    id > 0x7FF
}

/// Raw CAN 2.0 frame as seen by the gateway
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CanFrame {
    id: u32,
    extended: bool,
    rtr: bool,
    dlc: u8,
    data: [u8; 8],
}

impl CanFrame {
    /// Creates a new data frame. Data beyond 8 bytes is dropped
    pub fn new(id: u32, data: &[u8], extended: bool) -> Self {
        let dlc = data.len().min(8);
        let mut buf = [0u8; 8];
        buf[..dlc].copy_from_slice(&data[..dlc]);
        Self {
            id,
            extended,
            rtr: false,
            dlc: dlc as u8,
            data: buf,
        }
    }

    /// Creates a frame from a full 8 byte buffer, of which only `dlc` bytes are
    /// part of the frame. The remaining bytes are kept as fill.
    pub fn from_raw(id: u32, extended: bool, rtr: bool, dlc: u8, data: [u8; 8]) -> Self {
        Self {
            id,
            extended,
            rtr,
            dlc: dlc.min(8),
            data,
        }
    }

    /// Marks the frame as a remote transmission request
    pub fn with_rtr(mut self, rtr: bool) -> Self {
        self.rtr = rtr;
        self
    }

    /// CAN identifier
    pub fn id(&self) -> u32 {
        self.id
    }

    /// True for 29bit identifiers
    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// True for remote transmission requests
    pub fn is_rtr(&self) -> bool {
        self.rtr
    }

    /// Data length code
    pub fn dlc(&self) -> u8 {
        self.dlc
    }

    /// Payload of the frame (`dlc` bytes)
    pub fn data(&self) -> &[u8] {
        &self.data[..self.dlc as usize]
    }

    /// Full 8 byte data buffer, including fill bytes past `dlc`
    pub fn raw_data(&self) -> &[u8; 8] {
        &self.data
    }
}

/// CAN bus bitrates understood by the `SET_CAN_BITRATE` command.
/// The discriminant is the code sent by the host
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum_macros::FromRepr,
    strum_macros::Display,
    strum_macros::EnumIter,
)]
#[repr(u8)]
pub enum CanBitrate {
    /// 5 kbit/s
    #[strum(serialize = "5K")]
    Kbps5 = 0x00,
    /// 10 kbit/s
    #[strum(serialize = "10K")]
    Kbps10 = 0x01,
    /// 20 kbit/s
    #[strum(serialize = "20K")]
    Kbps20 = 0x02,
    /// 25 kbit/s
    #[strum(serialize = "25K")]
    Kbps25 = 0x03,
    /// 50 kbit/s
    #[strum(serialize = "50K")]
    Kbps50 = 0x04,
    /// 100 kbit/s
    #[strum(serialize = "100K")]
    Kbps100 = 0x05,
    /// 125 kbit/s
    #[strum(serialize = "125K")]
    Kbps125 = 0x06,
    /// 250 kbit/s
    #[strum(serialize = "250K")]
    Kbps250 = 0x07,
    /// 500 kbit/s
    #[strum(serialize = "500K")]
    Kbps500 = 0x08,
    /// 800 kbit/s
    #[strum(serialize = "800K")]
    Kbps800 = 0x09,
    /// 1 Mbit/s
    #[strum(serialize = "1000K")]
    Kbps1000 = 0x0A,
}

impl CanBitrate {
    /// Bus speed in bits per second
    pub fn bits_per_second(self) -> u32 {
        match self {
            CanBitrate::Kbps5 => 5_000,
            CanBitrate::Kbps10 => 10_000,
            CanBitrate::Kbps20 => 20_000,
            CanBitrate::Kbps25 => 25_000,
            CanBitrate::Kbps50 => 50_000,
            CanBitrate::Kbps100 => 100_000,
            CanBitrate::Kbps125 => 125_000,
            CanBitrate::Kbps250 => 250_000,
            CanBitrate::Kbps500 => 500_000,
            CanBitrate::Kbps800 => 800_000,
            CanBitrate::Kbps1000 => 1_000_000,
        }
    }
}

/// Transmit side of the CAN driver
pub trait CanChannel: Send {
    /// Queues a single frame for transmission on the bus
    ///
    /// ## Parameters
    /// * frame - Frame to send
    /// * timeout_ms - How long the driver may block waiting for Tx space
    fn send(&mut self, frame: &CanFrame, timeout_ms: u32) -> ChannelResult<()>;

    /// Starts the CAN controller
    fn enable(&mut self) -> ChannelResult<()>;

    /// Stops the CAN controller
    fn disable(&mut self) -> ChannelResult<()>;

    /// Reconfigures the bus speed
    fn set_bitrate(&mut self, bitrate: CanBitrate) -> ChannelResult<()>;
}

/// Outbound byte sink towards the host transport.
/// Every response and every forwarded CAN frame leaves the gateway through this
pub trait HostSink: Send + Sync {
    /// Sends one complete host frame
    fn send_to_host(&self, bytes: &[u8]) -> ChannelResult<()>;
}

impl HostSink for mpsc::Sender<Vec<u8>> {
    fn send_to_host(&self, bytes: &[u8]) -> ChannelResult<()> {
        self.send(bytes.to_vec())
            .map_err(|_| ChannelError::HostDisconnected)
    }
}

impl HostSink for mpsc::SyncSender<Vec<u8>> {
    fn send_to_host(&self, bytes: &[u8]) -> ChannelResult<()> {
        self.try_send(bytes.to_vec()).map_err(|e| match e {
            mpsc::TrySendError::Full(_) => ChannelError::BufferFull,
            mpsc::TrySendError::Disconnected(_) => ChannelError::HostDisconnected,
        })
    }
}
