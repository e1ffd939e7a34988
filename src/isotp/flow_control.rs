use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::protocol::ResultCode;

use super::{CanRxRouter, FlowStatus, PCI_FLOW_CONTROL};

/// Parameters granted by a CTS flow control frame
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FlowControlParams {
    /// Block size
    pub block_size: u8,
    /// Separation time minimum (raw STmin byte)
    pub st_min: u8,
}

/// Blocks a transfer until the ECU answers with flow control.
///
/// Frames are taken from the router's staging queue. Frames from other IDs, and
/// frames from the right ID that are not flow control, do not end the wait. They
/// are forwarded to the host. The deadline is fixed when [FlowControlWaiter::wait]
/// starts: neither ignored frames nor `WT` statuses extend it.
#[derive(Debug)]
pub struct FlowControlWaiter<'a> {
    router: &'a CanRxRouter,
    tx_id: u32,
    extended: bool,
    timeout: Duration,
    wait_retry_delay: Duration,
}

impl<'a> FlowControlWaiter<'a> {
    /// Creates a waiter matching frames from `tx_id`
    pub fn new(router: &'a CanRxRouter, tx_id: u32, extended: bool, timeout: Duration) -> Self {
        Self {
            router,
            tx_id,
            extended,
            timeout,
            wait_retry_delay: Duration::from_millis(10),
        }
    }

    /// Pause taken after a `WT` status before polling again
    pub fn with_wait_retry_delay(mut self, delay: Duration) -> Self {
        self.wait_retry_delay = delay;
        self
    }

    /// Waits for a CTS frame. Every other outcome is returned as the result code
    /// to report to the host.
    pub fn wait(&self) -> Result<FlowControlParams, ResultCode> {
        let deadline = Instant::now() + self.timeout;
        while let Some(frame) = self.router.next_staged(deadline) {
            if frame.id() != self.tx_id || frame.is_extended() != self.extended {
                debug!("Not awaited ID {:#X}, forwarding", frame.id());
                self.router.forward_to_host(&frame);
                continue;
            }
            let data = frame.data();
            if data.len() < 3 || data[0] & 0xF0 != PCI_FLOW_CONTROL {
                warn!("Expected flow control, got {data:02X?}");
                self.router.forward_to_host(&frame);
                continue;
            }
            match FlowStatus::from_repr(data[0] & 0x0F) {
                Some(FlowStatus::ContinueToSend) => {
                    let fc = FlowControlParams {
                        block_size: data[1],
                        st_min: data[2],
                    };
                    debug!("Flow control CTS: {fc:?}");
                    return Ok(fc);
                }
                Some(FlowStatus::Wait) => {
                    warn!("Flow control WT received, polling again");
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    std::thread::sleep(self.wait_retry_delay.min(remaining));
                }
                Some(FlowStatus::Overflow) => {
                    error!("Flow control overflow");
                    return Err(ResultCode::Overflow);
                }
                None => {
                    error!("Unsupported flow status {:#04X}", data[0] & 0x0F);
                    return Err(ResultCode::UnsupportedFlowControl);
                }
            }
        }
        error!("Flow control timeout after {:?}", self.timeout);
        Err(ResultCode::FlowControlTimeout)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{channel::CanFrame, hardware::simulation::RecordingHost};

    fn setup() -> (Arc<RecordingHost>, CanRxRouter) {
        let host = Arc::new(RecordingHost::new());
        let router = CanRxRouter::new(host.clone(), 16);
        router.arm();
        (host, router)
    }

    fn fc(id: u32, status: u8, bs: u8, st: u8) -> CanFrame {
        CanFrame::new(id, &[0x30 | status, bs, st, 0, 0, 0, 0, 0], false)
    }

    #[test]
    fn cts_returns_params() {
        let (_, router) = setup();
        router.on_can_frame(fc(0x7E8, 0, 8, 20));
        let res = FlowControlWaiter::new(&router, 0x7E8, false, Duration::from_millis(100)).wait();
        assert_eq!(res, Ok(FlowControlParams { block_size: 8, st_min: 20 }));
    }

    #[test]
    fn other_ids_are_forwarded() {
        let (host, router) = setup();
        router.on_can_frame(CanFrame::new(0x123, &[0x30, 0, 0], false));
        router.on_can_frame(CanFrame::new(0x7E8, &[0x02, 0x41, 0x00], false));
        router.on_can_frame(fc(0x7E8, 0, 0, 0));
        let res = FlowControlWaiter::new(&router, 0x7E8, false, Duration::from_millis(100)).wait();
        assert!(res.is_ok());
        assert_eq!(host.forwarded().len(), 2);
    }

    #[test]
    fn extended_flag_must_match() {
        let (_, router) = setup();
        router.on_can_frame(CanFrame::new(0x7E8, &[0x30, 0, 0], true));
        let res = FlowControlWaiter::new(&router, 0x7E8, false, Duration::from_millis(50)).wait();
        assert_eq!(res, Err(ResultCode::FlowControlTimeout));
    }

    #[test]
    fn overflow_and_unsupported() {
        let (_, router) = setup();
        router.on_can_frame(fc(0x7E8, 2, 0, 0));
        let w = FlowControlWaiter::new(&router, 0x7E8, false, Duration::from_millis(50));
        assert_eq!(w.wait(), Err(ResultCode::Overflow));
        router.on_can_frame(fc(0x7E8, 5, 0, 0));
        assert_eq!(w.wait(), Err(ResultCode::UnsupportedFlowControl));
    }

    #[test]
    fn wait_status_then_cts() {
        let (_, router) = setup();
        router.on_can_frame(fc(0x7E8, 1, 0, 0));
        router.on_can_frame(fc(0x7E8, 0, 2, 0));
        let res = FlowControlWaiter::new(&router, 0x7E8, false, Duration::from_millis(200))
            .with_wait_retry_delay(Duration::from_millis(1))
            .wait();
        assert_eq!(res, Ok(FlowControlParams { block_size: 2, st_min: 0 }));
    }

    #[test]
    fn bytes_past_dlc_are_not_flow_control() {
        let (host, router) = setup();
        router.on_can_frame(CanFrame::from_raw(0x7E8, false, false, 0, [0x30, 0, 0, 0, 0, 0, 0, 0]));
        router.on_can_frame(CanFrame::from_raw(0x7E8, false, false, 2, [0x30, 0, 0, 0, 0, 0, 0, 0]));
        let res = FlowControlWaiter::new(&router, 0x7E8, false, Duration::from_millis(50)).wait();
        assert_eq!(res, Err(ResultCode::FlowControlTimeout));
        assert_eq!(host.forwarded().len(), 2);
    }
}
