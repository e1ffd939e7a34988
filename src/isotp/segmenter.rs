use std::{cmp::min, time::Duration};

use log::{debug, error, warn};

use crate::{
    channel::{CanChannel, CanFrame},
    protocol::ResultCode,
};

use super::{
    separation_delay, CanRxRouter, FlowControlParams, FlowControlWaiter, LinkParams,
    CONSECUTIVE_FRAME_DATA_LEN, FIRST_FRAME_DATA_LEN, FIRST_FRAME_MAX_LEN,
    PCI_CONSECUTIVE_FRAME, PCI_FIRST_FRAME, SINGLE_FRAME_MAX_LEN,
};

/// Addressing and timing captured when a transfer starts. Nothing the host
/// sends afterwards can change an in-flight transfer
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TransferParams {
    /// ID data frames are sent to
    pub target_id: u32,
    /// 29bit target ID
    pub target_extended: bool,
    /// ID flow control frames are expected from
    pub fc_id: u32,
    /// 29bit flow control ID
    pub fc_extended: bool,
    /// Fill byte for unused frame bytes
    pub padding_byte: u8,
    /// Send single frames with DLC 8
    pub pad_single_frames: bool,
    /// Driver timeout per frame
    pub send_timeout_ms: u32,
    /// Deadline for every flow control wait
    pub fc_timeout: Duration,
    /// Pause after a `WT` flow status
    pub wait_retry_delay: Duration,
}

/// Segments one payload into single, first and consecutive frames
pub struct IsoTpTransmitter<'a> {
    can: &'a mut dyn CanChannel,
    router: &'a CanRxRouter,
    params: TransferParams,
    link: &'a mut LinkParams,
}

impl std::fmt::Debug for IsoTpTransmitter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsoTpTransmitter")
            .field("params", &self.params)
            .field("link", &self.link)
            .finish()
    }
}

impl<'a> IsoTpTransmitter<'a> {
    /// Creates a transmitter. `link` is updated with the block size and separation
    /// time of every CTS frame received during the transfer
    pub fn new(
        can: &'a mut dyn CanChannel,
        router: &'a CanRxRouter,
        params: TransferParams,
        link: &'a mut LinkParams,
    ) -> Self {
        Self {
            can,
            router,
            params,
            link,
        }
    }

    /// Sends the payload. Returns [ResultCode::Ack] once every byte was sent
    pub fn transmit(&mut self, payload: &[u8]) -> ResultCode {
        if payload.len() <= SINGLE_FRAME_MAX_LEN {
            self.send_single_frame(payload)
        } else {
            self.send_multi_frame(payload)
        }
    }

    fn frame(&self, dlc: u8, data: [u8; 8]) -> CanFrame {
        CanFrame::from_raw(self.params.target_id, self.params.target_extended, false, dlc, data)
    }

    fn send(&mut self, frame: &CanFrame) -> bool {
        debug!("ISOTP Tx: [{:02X?}]", frame.raw_data());
        match self.can.send(frame, self.params.send_timeout_ms) {
            Ok(()) => true,
            Err(e) => {
                error!("Error sending CAN message: {e}");
                false
            }
        }
    }

    fn send_single_frame(&mut self, payload: &[u8]) -> ResultCode {
        let mut data = [self.params.padding_byte; 8];
        data[0] = payload.len() as u8;
        data[1..1 + payload.len()].copy_from_slice(payload);
        let dlc = if self.params.pad_single_frames {
            8
        } else {
            payload.len() as u8 + 1
        };
        let sf = self.frame(dlc, data);
        if self.send(&sf) {
            ResultCode::Ack
        } else {
            ResultCode::SfSendErr
        }
    }

    fn await_flow_control(&mut self) -> Result<FlowControlParams, ResultCode> {
        let res = FlowControlWaiter::new(
            self.router,
            self.params.fc_id,
            self.params.fc_extended,
            self.params.fc_timeout,
        )
        .with_wait_retry_delay(self.params.wait_retry_delay)
        .wait();
        self.router.disarm();
        let fc = res?;
        self.link.adopt(fc);
        Ok(fc)
    }

    fn send_multi_frame(&mut self, payload: &[u8]) -> ResultCode {
        let len = payload.len();
        if len > FIRST_FRAME_MAX_LEN {
            warn!("Payload of {len} bytes does not fit the 12 bit FF length, sending {:#05X}", len & FIRST_FRAME_MAX_LEN);
        }
        let mut data = [0u8; 8];
        data[0] = PCI_FIRST_FRAME | ((len >> 8) & 0x0F) as u8;
        data[1] = (len & 0xFF) as u8;
        data[2..].copy_from_slice(&payload[..FIRST_FRAME_DATA_LEN]);
        let ff = self.frame(8, data);

        self.router.arm();
        if !self.send(&ff) {
            self.router.disarm();
            return ResultCode::FfSendErr;
        }
        if let Err(code) = self.await_flow_control() {
            return code;
        }

        let mut pos = FIRST_FRAME_DATA_LEN;
        let mut seq: u8 = 1;
        let mut sent_in_block: usize = 0;
        while pos < len {
            let chunk = min(CONSECUTIVE_FRAME_DATA_LEN, len - pos);
            let mut data = [self.params.padding_byte; 8];
            data[0] = PCI_CONSECUTIVE_FRAME | (seq & 0x0F);
            data[1..1 + chunk].copy_from_slice(&payload[pos..pos + chunk]);
            let cf = self.frame(8, data);

            let st = separation_delay(self.link.separation_time);
            if !st.is_zero() {
                std::thread::sleep(st);
            }

            pos += chunk;
            sent_in_block += 1;
            let block_size = self.link.block_size as usize;
            let block_done = block_size != 0 && sent_in_block >= block_size && pos < len;
            if block_done {
                self.router.arm();
            }
            if !self.send(&cf) {
                if block_done {
                    self.router.disarm();
                }
                return ResultCode::CfSendErr;
            }
            seq = (seq + 1) & 0x0F;

            if block_done {
                debug!("Block of {sent_in_block} frames sent, awaiting FC");
                if let Err(code) = self.await_flow_control() {
                    return code;
                }
                sent_in_block = 0;
            }
        }
        debug!("Tx done!");
        ResultCode::Ack
    }
}
