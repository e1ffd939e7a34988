//! Classifier for frames arriving from the CAN driver

use std::{
    collections::VecDeque,
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use log::{debug, error, warn};

use crate::{
    channel::{CanFrame, HostSink},
    protocol::encode_can_frame,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Route {
    /// Normal traffic, forwarded to the host
    Host,
    /// A flow control frame is awaited, frames go to the staging queue
    Staging,
}

struct Staging {
    route: Route,
    queue: VecDeque<CanFrame>,
    capacity: usize,
}

struct RouterInner {
    staging: Mutex<Staging>,
    arrived: Condvar,
    host: Arc<dyn HostSink>,
}

/// Receives every raw CAN frame from the driver and routes it either to the
/// staging queue (while flow control is awaited) or to the host.
///
/// This is the only object shared between the driver's receive context and the
/// protocol task. It is cheap to clone.
#[derive(Clone)]
pub struct CanRxRouter {
    inner: Arc<RouterInner>,
}

impl Debug for CanRxRouter {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let staging = self.lock();
        f.debug_struct("CanRxRouter")
            .field("route", &staging.route)
            .field("staged", &staging.queue.len())
            .field("capacity", &staging.capacity)
            .finish()
    }
}

impl CanRxRouter {
    /// Creates a router forwarding to `host`, staging at most `capacity` frames
    pub fn new(host: Arc<dyn HostSink>, capacity: usize) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                staging: Mutex::new(Staging {
                    route: Route::Host,
                    queue: VecDeque::with_capacity(capacity),
                    capacity: capacity.max(1),
                }),
                arrived: Condvar::new(),
                host,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Staging> {
        self.inner
            .staging
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Entry point for the CAN driver's receive path
    pub fn on_can_frame(&self, frame: CanFrame) {
        let mut staging = self.lock();
        if staging.route == Route::Staging {
            if staging.queue.len() >= staging.capacity {
                if let Some(dropped) = staging.queue.pop_front() {
                    warn!("CAN staging queue full, dropping oldest frame {dropped:02X?}");
                }
            }
            staging.queue.push_back(frame);
            drop(staging);
            self.inner.arrived.notify_one();
        } else {
            drop(staging);
            self.forward_to_host(&frame);
        }
    }

    /// Encodes a CAN frame and sends it to the host
    pub fn forward_to_host(&self, frame: &CanFrame) {
        if let Err(e) = self.inner.host.send_to_host(&encode_can_frame(frame)) {
            error!("Failed to forward CAN frame to host: {e}");
        }
    }

    /// Sends an already encoded frame to the host
    pub(crate) fn send_to_host(&self, bytes: &[u8]) {
        if let Err(e) = self.inner.host.send_to_host(bytes) {
            error!("Failed to send frame to host: {e}");
        }
    }

    /// True while a flow control frame is awaited
    pub fn is_awaiting_flow_control(&self) -> bool {
        self.lock().route == Route::Staging
    }

    /// Number of frames currently staged
    pub fn staged_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Starts staging inbound frames
    pub(crate) fn arm(&self) {
        self.lock().route = Route::Staging;
    }

    /// Stops staging. Anything still staged is forwarded to the host in arrival order.
    ///
    /// The route only switches back to the host once the queue is empty, so frames
    /// arriving during the flush are staged behind the older ones.
    pub(crate) fn disarm(&self) {
        loop {
            let leftover: Vec<CanFrame> = {
                let mut staging = self.lock();
                if staging.queue.is_empty() {
                    staging.route = Route::Host;
                    return;
                }
                staging.queue.drain(..).collect()
            };
            for frame in &leftover {
                debug!("Forwarding staged frame {frame:02X?}");
                self.forward_to_host(frame);
            }
        }
    }

    /// Takes the oldest staged frame, blocking until one arrives or `deadline` passes
    pub(crate) fn next_staged(&self, deadline: Instant) -> Option<CanFrame> {
        let mut staging = self.lock();
        loop {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            if let Some(frame) = staging.queue.pop_front() {
                return Some(frame);
            }
            staging = self
                .inner
                .arrived
                .wait_timeout(staging, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}
