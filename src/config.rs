//! Protocol session configuration

use crate::{Frame99Error, Frame99Result};

/// Configuration of a [crate::ProtocolSession].
///
/// Values here only seed the session. The ECU identifiers and padding byte can be
/// changed later by the host, and block size / separation time are renegotiated
/// by every flow control frame the ECU sends.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct SessionConfig {
    /// CAN ID the gateway transmits ISO-TP data to
    pub ecu_rx_id: u32,
    /// CAN ID the gateway expects flow control frames from
    pub ecu_tx_id: u32,
    /// Initial block size
    pub block_size: u8,
    /// Initial separation time (STmin encoding)
    pub separation_time: u8,
    /// Fill byte for unused bytes of the last consecutive frame
    pub padding_byte: u8,
    /// How long to wait for a flow control frame
    pub flow_control_timeout_ms: u32,
    /// Timeout handed to the CAN driver for every transmitted frame
    pub can_send_timeout_ms: u32,
    /// Pause after a flow control `WT` status before polling again
    pub wait_retry_delay_ms: u32,
    /// Capacity of the queue holding CAN frames while awaiting flow control
    pub staging_queue_len: usize,
    /// Send single frames with a DLC of 8 rather than `len + 1`
    pub pad_single_frames: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ecu_rx_id: 0x7E8,
            ecu_tx_id: 0x7DF,
            block_size: 255,
            separation_time: 0,
            padding_byte: 0xAA,
            flow_control_timeout_ms: 1000,
            can_send_timeout_ms: 100,
            wait_retry_delay_ms: 10,
            staging_queue_len: 32,
            pad_single_frames: false,
        }
    }
}

impl SessionConfig {
    /// Checks the configuration can actually drive a session
    pub fn validate(&self) -> Frame99Result<()> {
        if self.staging_queue_len == 0 {
            return Err(Frame99Error::InvalidConfig(
                "staging_queue_len must be at least 1".into(),
            ));
        }
        if self.flow_control_timeout_ms == 0 {
            return Err(Frame99Error::InvalidConfig(
                "flow_control_timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Parses a JSON configuration. Missing fields take their default value
    #[cfg(feature = "serde")]
    pub fn from_json(s: &str) -> Frame99Result<Self> {
        let cfg: Self =
            serde_json::from_str(s).map_err(|e| Frame99Error::InvalidConfig(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
