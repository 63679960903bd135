//! Frame consumer interface.

use crate::types::{AoiRect, DisplayFrame};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Receiver for controller events.
///
/// Callbacks run on the capture loop thread; keep them short. Calling
/// `disconnect` from inside a callback is allowed and will not deadlock.
pub trait FrameSink: Send + Sync {
    /// Called once per successful pull with the display projection.
    fn on_frame_ready(&self, frame: &DisplayFrame);

    /// Called once per successful AOI reconfiguration.
    fn on_aoi_changed(&self, _rect: AoiRect) {}
}

/// Bounded drop-oldest frame queue.
///
/// Decouples a consumer thread from the capture cadence: the capture loop
/// pushes, the consumer pops with a timeout, and a slow consumer loses the
/// oldest frames rather than stalling acquisition.
pub struct FrameQueue {
    inner: Mutex<QueueInner>,
    cv: Condvar,
}

struct QueueInner {
    items: VecDeque<DisplayFrame>,
    capacity: usize,
    dropped: u64,
    closed: bool,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity.min(1024)),
                capacity: capacity.max(1),
                dropped: 0,
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    fn push_drop_oldest(&self, frame: DisplayFrame) {
        let mut g = self.inner.lock().expect("lock poisoned");
        if g.closed {
            return;
        }
        if g.items.len() >= g.capacity {
            g.items.pop_front();
            g.dropped = g.dropped.saturating_add(1);
        }
        g.items.push_back(frame);
        self.cv.notify_one();
    }

    /// Pop the oldest frame, waiting up to `timeout`. Returns `None` on
    /// timeout or when the queue is closed and drained.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<DisplayFrame> {
        let mut g = self.inner.lock().expect("lock poisoned");

        if timeout == Duration::ZERO {
            return g.items.pop_front();
        }

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = g.items.pop_front() {
                return Some(frame);
            }
            if g.closed {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (ng, _) = self
                .cv
                .wait_timeout(g, deadline - now)
                .expect("lock poisoned");
            g = ng;
        }
    }

    /// Frames discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().expect("lock poisoned").dropped
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close the queue; waiting poppers wake up, later pushes are ignored.
    pub fn close(&self) {
        let mut g = self.inner.lock().expect("lock poisoned");
        g.closed = true;
        self.cv.notify_all();
    }
}

impl FrameSink for FrameQueue {
    fn on_frame_ready(&self, frame: &DisplayFrame) {
        self.push_drop_oldest(frame.clone());
    }
}
