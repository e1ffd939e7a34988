//! Simulation hardware for unit testing the gateway without a CAN controller
//! or a host connection

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::{
    channel::{CanBitrate, CanChannel, CanFrame, ChannelError, ChannelResult, HostSink},
    isotp::CanRxRouter,
    protocol::{decode_can_frame, decode_response, ResultCode},
};

type Responder = dyn Fn(&CanFrame) -> Vec<CanFrame> + Send + Sync;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct BusState {
    sent: Vec<CanFrame>,
    attempts: usize,
    enabled: bool,
    bitrate: Option<CanBitrate>,
    fail_all: bool,
    fail_on_attempt: Option<usize>,
}

/// Simulated CAN controller.
///
/// Records every transmitted frame. An optional responder emulates the ECU: it is
/// called for each successfully sent frame, and the frames it returns are
/// delivered through the attached [CanRxRouter] before `send` returns.
#[derive(Clone)]
pub struct SimulatedCanBus {
    state: Arc<Mutex<BusState>>,
    responder: Arc<RwLock<Option<Box<Responder>>>>,
    router: Arc<RwLock<Option<CanRxRouter>>>,
}

impl std::fmt::Debug for SimulatedCanBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimulatedCanBus {:?}", *lock(&self.state))
    }
}

impl Default for SimulatedCanBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCanBus {
    /// Creates an enabled bus with nothing attached
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                sent: Vec::new(),
                attempts: 0,
                enabled: true,
                bitrate: None,
                fail_all: false,
                fail_on_attempt: None,
            })),
            responder: Arc::new(RwLock::new(None)),
            router: Arc::new(RwLock::new(None)),
        }
    }

    /// Attaches the receive side. Responder output and injected frames go here
    pub fn attach(&self, router: CanRxRouter) {
        *self.router.write().unwrap_or_else(PoisonError::into_inner) = Some(router);
    }

    /// Sets the ECU emulation callback
    pub fn set_responder<F>(&self, f: F)
    where
        F: Fn(&CanFrame) -> Vec<CanFrame> + Send + Sync + 'static,
    {
        *self.responder.write().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(f));
    }

    /// Delivers a frame as if it was received from the bus
    pub fn inject(&self, frame: CanFrame) {
        if let Some(router) = self
            .router
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            router.on_can_frame(frame);
        }
    }

    /// Makes every following send fail
    pub fn fail_sends(&self, fail: bool) {
        lock(&self.state).fail_all = fail;
    }

    /// Makes the n-th send attempt (counting from 1, since creation) fail
    pub fn fail_on_attempt(&self, attempt: usize) {
        lock(&self.state).fail_on_attempt = Some(attempt);
    }

    /// Frames successfully sent so far
    pub fn sent_frames(&self) -> Vec<CanFrame> {
        lock(&self.state).sent.clone()
    }

    /// Forgets sent frames
    pub fn clear_sent(&self) {
        lock(&self.state).sent.clear();
    }

    /// True if the controller is enabled
    pub fn is_enabled(&self) -> bool {
        lock(&self.state).enabled
    }

    /// Last configured bitrate
    pub fn bitrate(&self) -> Option<CanBitrate> {
        lock(&self.state).bitrate
    }
}

impl CanChannel for SimulatedCanBus {
    fn send(&mut self, frame: &CanFrame, _timeout_ms: u32) -> ChannelResult<()> {
        {
            let mut state = lock(&self.state);
            state.attempts += 1;
            if !state.enabled {
                return Err(ChannelError::BusDisabled);
            }
            if state.fail_all || state.fail_on_attempt == Some(state.attempts) {
                return Err(ChannelError::WriteTimeout);
            }
            state.sent.push(*frame);
        }
        let replies = match self
            .responder
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(responder) => responder(frame),
            None => Vec::new(),
        };
        for reply in replies {
            self.inject(reply);
        }
        Ok(())
    }

    fn enable(&mut self) -> ChannelResult<()> {
        lock(&self.state).enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> ChannelResult<()> {
        lock(&self.state).enabled = false;
        Ok(())
    }

    fn set_bitrate(&mut self, bitrate: CanBitrate) -> ChannelResult<()> {
        let mut state = lock(&self.state);
        if state.enabled {
            // Controller must be stopped to change speed
            return Err(ChannelError::UnsupportedRequest);
        }
        state.bitrate = Some(bitrate);
        Ok(())
    }
}

/// Host transport that records every frame sent to it
#[derive(Debug, Default)]
pub struct RecordingHost {
    frames: Mutex<Vec<Vec<u8>>>,
}

impl RecordingHost {
    /// Creates an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Every frame sent so far
    pub fn frames(&self) -> Vec<Vec<u8>> {
        lock(&self.frames).clone()
    }

    /// Decoded response frames, as `(command, result)`
    pub fn responses(&self) -> Vec<(u8, ResultCode)> {
        lock(&self.frames)
            .iter()
            .filter_map(|f| decode_response(f))
            .collect()
    }

    /// Decoded forwarded CAN frames
    pub fn forwarded(&self) -> Vec<CanFrame> {
        lock(&self.frames)
            .iter()
            .filter_map(|f| decode_can_frame(f))
            .collect()
    }

    /// Forgets recorded frames
    pub fn clear(&self) {
        lock(&self.frames).clear();
    }
}

impl HostSink for RecordingHost {
    fn send_to_host(&self, bytes: &[u8]) -> ChannelResult<()> {
        lock(&self.frames).push(bytes.to_vec());
        Ok(())
    }
}
