//! Frame Types and Bounded Frame Queues
//!
//! Fixed 20ms PCM frames, the reframer that cuts a byte stream into them,
//! and the bounded drop-oldest queues that connect the media loops.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

use super::resample::SampleRate;

/// One 20ms frame of mono PCM16 audio
#[derive(Debug, Clone)]
pub struct Frame {
    pub samples: Vec<i16>,
    pub rate: SampleRate,
}

impl Frame {
    pub fn new(samples: Vec<i16>, rate: SampleRate) -> Self {
        debug_assert_eq!(samples.len(), rate.samples_per_frame());
        Self { samples, rate }
    }

    /// A silent frame at the given rate
    pub fn silence(rate: SampleRate) -> Self {
        Self {
            samples: vec![0i16; rate.samples_per_frame()],
            rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Cuts a continuous sample stream into fixed-size frames.
///
/// Partial trailing samples are buffered and prepended to the next push, so
/// concatenating all emitted frames reproduces the input stream exactly.
pub struct Reframer {
    rate: SampleRate,
    frame_len: usize,
    tail: Vec<i16>,
}

impl Reframer {
    pub fn new(rate: SampleRate) -> Self {
        Self {
            rate,
            frame_len: rate.samples_per_frame(),
            tail: Vec::new(),
        }
    }

    /// Feed samples, returning every complete frame now available
    pub fn push(&mut self, samples: &[i16]) -> Vec<Frame> {
        self.tail.extend_from_slice(samples);

        let mut frames = Vec::with_capacity(self.tail.len() / self.frame_len);
        let mut offset = 0;
        while self.tail.len() - offset >= self.frame_len {
            frames.push(Frame::new(
                self.tail[offset..offset + self.frame_len].to_vec(),
                self.rate,
            ));
            offset += self.frame_len;
        }
        self.tail.drain(..offset);

        frames
    }

    /// Samples currently buffered waiting for a full frame
    pub fn pending(&self) -> usize {
        self.tail.len()
    }

    /// Drop any buffered tail (used on interruption)
    pub fn reset(&mut self) {
        self.tail.clear();
    }
}

/// Bounded FIFO frame queue shared between a producer and a consumer task.
///
/// When full, the oldest frame is dropped so the consumer never falls more
/// than the capacity behind real time. Push and pop are safe to call from
/// any thread; `recv` integrates with the tokio scheduler.
#[derive(Debug)]
pub struct FrameQueue {
    name: &'static str,
    capacity: usize,
    inner: Mutex<VecDeque<Frame>>,
    notify: Notify,
    warned_half_full: AtomicBool,
}

impl FrameQueue {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            warned_half_full: AtomicBool::new(false),
        }
    }

    /// Enqueue a frame, dropping the oldest entry when full.
    /// Returns the number of frames dropped (0 or 1).
    pub fn push(&self, frame: Frame) -> usize {
        let dropped = {
            let mut q = self.inner.lock().expect("frame queue poisoned");
            let dropped = if q.len() >= self.capacity {
                q.pop_front();
                1
            } else {
                0
            };
            q.push_back(frame);

            if q.len() >= self.capacity / 2 {
                if !self.warned_half_full.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        "{} queue half full: {}/{} frames",
                        self.name,
                        q.len(),
                        self.capacity
                    );
                }
            } else {
                self.warned_half_full.store(false, Ordering::Relaxed);
            }

            dropped
        };

        if dropped > 0 {
            tracing::warn!("{} queue overflow, dropped oldest frame", self.name);
        }
        self.notify.notify_one();
        dropped
    }

    /// Dequeue the next frame without waiting
    pub fn pop(&self) -> Option<Frame> {
        self.inner.lock().expect("frame queue poisoned").pop_front()
    }

    /// Wait until a frame is available, then dequeue it
    pub async fn recv(&self) -> Frame {
        loop {
            if let Some(frame) = self.pop() {
                return frame;
            }
            self.notify.notified().await;
        }
    }

    /// Remove all queued frames, returning how many were dropped
    pub fn clear(&self) -> usize {
        let mut q = self.inner.lock().expect("frame queue poisoned");
        let n = q.len();
        q.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("frame queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
