//! Protocol session: reassembly, command dispatch and ISO-TP transfers
//! for one host connection

use std::{fmt, sync::Arc, time::Duration};

use log::{debug, error, info, warn};

use crate::{
    channel::{is_extended_id, CanChannel, HostSink},
    config::SessionConfig,
    isotp::{CanRxRouter, IsoTpTransmitter, LinkParams, TransferParams},
    protocol::{encode_response, Extracted, HostCommand, Reassembler, ResultCode},
    Frame99Result,
};

/// Transport addressing of the session
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EcuIds {
    /// ID the gateway transmits to
    pub rx_id: u32,
    /// ID the gateway expects flow control (and responses) from
    pub tx_id: u32,
}

/// All state of one protocol instance.
///
/// The session is driven by the task owning the host transport: every chunk read
/// from the host goes into [ProtocolSession::feed]. ISO-TP transfers block that
/// task while waiting for flow control or separation time. CAN traffic from the
/// driver enters through the [CanRxRouter] returned by [ProtocolSession::router],
/// which may be used from any thread.
pub struct ProtocolSession {
    config: SessionConfig,
    reassembler: Reassembler,
    ids: EcuIds,
    link: LinkParams,
    can: Box<dyn CanChannel>,
    router: CanRxRouter,
}

impl fmt::Debug for ProtocolSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolSession")
            .field("ids", &self.ids)
            .field("link", &self.link)
            .field("buffered", &self.reassembler.len())
            .field("router", &self.router)
            .finish()
    }
}

impl ProtocolSession {
    /// Creates a session sending CAN frames through `can` and host frames
    /// through `host`
    pub fn new(
        config: SessionConfig,
        can: Box<dyn CanChannel>,
        host: Arc<dyn HostSink>,
    ) -> Frame99Result<Self> {
        config.validate()?;
        info!(
            "frame99 session: rx {:#X}, tx {:#X}, padding {:#04X}",
            config.ecu_rx_id, config.ecu_tx_id, config.padding_byte
        );
        Ok(Self {
            config,
            reassembler: Reassembler::new(),
            ids: EcuIds {
                rx_id: config.ecu_rx_id,
                tx_id: config.ecu_tx_id,
            },
            link: LinkParams {
                block_size: config.block_size,
                separation_time: config.separation_time,
                padding_byte: config.padding_byte,
            },
            can,
            router: CanRxRouter::new(host, config.staging_queue_len),
        })
    }

    /// Handle for the CAN driver's receive path
    pub fn router(&self) -> CanRxRouter {
        self.router.clone()
    }

    /// Current transport addressing
    pub fn ecu_ids(&self) -> EcuIds {
        self.ids
    }

    /// Current link parameters
    pub fn link_params(&self) -> LinkParams {
        self.link
    }

    /// Bytes buffered but not yet parsed into a command
    pub fn buffered_len(&self) -> usize {
        self.reassembler.len()
    }

    /// Feeds bytes received from the host.
    ///
    /// At most one command is executed per call, after which the buffer is
    /// cleared. Fails only if the bytes overflow the reassembly buffer, in which
    /// case the buffer is reset and nothing is executed.
    pub fn feed(&mut self, bytes: &[u8]) -> Frame99Result<()> {
        if bytes.is_empty() {
            debug!("Empty host frame");
            return Ok(());
        }
        self.reassembler.push(bytes)?;
        if let Some(extracted) = self.reassembler.next_frame() {
            self.dispatch(extracted);
        }
        Ok(())
    }

    fn dispatch(&mut self, extracted: Extracted) {
        let (cmd, result) = match extracted {
            Extracted::Command(command) => {
                let cmd = command.command() as u8;
                (cmd, self.execute(command))
            }
            Extracted::Rejected(cmd) => (cmd, ResultCode::Nak),
        };
        if result.is_ack() {
            debug!("Command {cmd:#04X} -> {result}");
        } else {
            warn!("Command {cmd:#04X} -> {result}");
        }
        self.router.send_to_host(&encode_response(cmd, result));
    }

    fn execute(&mut self, command: HostCommand) -> ResultCode {
        match command {
            HostCommand::IsoTpFrame(payload) => self.send_iso_tp(&payload),
            HostCommand::SetEcuIds { rx_id, tx_id } => {
                info!("ECU IDs set: rx {rx_id:#X}, tx {tx_id:#X}");
                self.ids = EcuIds { rx_id, tx_id };
                ResultCode::Ack
            }
            HostCommand::CanEnable(enable) => {
                let res = if enable {
                    self.can.enable()
                } else {
                    self.can.disable()
                };
                Self::ack_or_nak(res, "CAN enable/disable")
            }
            HostCommand::SetBitrate(rate) => {
                info!("Setting CAN bitrate to {rate}");
                Self::ack_or_nak(self.can.set_bitrate(rate), "set bitrate")
            }
            HostCommand::SetPaddingByte(b) => {
                self.link.padding_byte = b;
                ResultCode::Ack
            }
            HostCommand::SendRawCanFrame(frame) => {
                debug!("Raw Tx: {frame:02X?}");
                Self::ack_or_nak(
                    self.can.send(&frame, self.config.can_send_timeout_ms),
                    "raw CAN send",
                )
            }
        }
    }

    fn ack_or_nak<E: fmt::Display>(res: Result<(), E>, what: &str) -> ResultCode {
        match res {
            Ok(()) => ResultCode::Ack,
            Err(e) => {
                error!("{what} failed: {e}");
                ResultCode::Nak
            }
        }
    }

    fn transfer_params(&self) -> TransferParams {
        TransferParams {
            target_id: self.ids.rx_id,
            target_extended: is_extended_id(self.ids.rx_id),
            fc_id: self.ids.tx_id,
            fc_extended: is_extended_id(self.ids.tx_id),
            padding_byte: self.link.padding_byte,
            pad_single_frames: self.config.pad_single_frames,
            send_timeout_ms: self.config.can_send_timeout_ms,
            fc_timeout: Duration::from_millis(self.config.flow_control_timeout_ms as u64),
            wait_retry_delay: Duration::from_millis(self.config.wait_retry_delay_ms as u64),
        }
    }

    fn send_iso_tp(&mut self, payload: &[u8]) -> ResultCode {
        let params = self.transfer_params();
        IsoTpTransmitter::new(self.can.as_mut(), &self.router, params, &mut self.link)
            .transmit(payload)
    }
}
