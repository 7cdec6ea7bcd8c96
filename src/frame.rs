//! The reusable parse record and its process-wide pool (spec.md §3, §4.3).

use bytes::BytesMut;
use lazy_static::lazy_static;
use std::sync::Mutex;
use tracing::trace;

const INITIAL_RAW_CAPACITY: usize = 1024;
const INITIAL_ARGS_CAPACITY: usize = 4;

/// The exact on-wire bytes of one parsed command, plus a view over each
/// bulk argument's content.
///
/// `args` entries are `(offset, length)` pairs into `raw`; they exclude
/// the bulk's length line and trailing CRLF. They are valid only until the
/// frame is reset or returned to the pool — see [`PooledFrame`].
#[derive(Debug)]
pub struct Frame {
    pub(crate) raw: BytesMut,
    pub(crate) args: Vec<(usize, usize)>,
}

impl Frame {
    fn new() -> Self {
        Self {
            raw: BytesMut::with_capacity(INITIAL_RAW_CAPACITY),
            args: Vec::with_capacity(INITIAL_ARGS_CAPACITY),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.raw.clear();
        self.args.clear();
    }

    /// The exact on-wire bytes of the most recently parsed command.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The number of bulk-string arguments parsed into this frame.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// The content bytes (CRLF excluded) of the `i`th argument.
    pub fn arg(&self, i: usize) -> Option<&[u8]> {
        self.args
            .get(i)
            .map(|&(offset, len)| &self.raw[offset..offset + len])
    }

    /// An iterator over every argument's content bytes, in order.
    pub fn args(&self) -> impl Iterator<Item = &[u8]> {
        self.args
            .iter()
            .map(move |&(offset, len)| &self.raw[offset..offset + len])
    }
}

/// A thread-safe, process-wide free list of [`Frame`]s.
///
/// `get`/`put` may be called from any thread; distinct [`crate::Reader`]s on
/// distinct sources draw from and return to the same pool (spec.md §5).
pub struct FramePool {
    frames: Mutex<Vec<Box<Frame>>>,
}

impl FramePool {
    fn new() -> Self {
        Self { frames: Mutex::new(Vec::new()) }
    }

    pub(crate) fn get(&self) -> Box<Frame> {
        let popped = self.frames.lock().unwrap().pop();
        match popped {
            Some(frame) => {
                trace!("frame pool: reused a frame");
                frame
            }
            None => {
                trace!("frame pool: allocated a new frame");
                Box::new(Frame::new())
            }
        }
    }

    pub(crate) fn put(&self, mut frame: Box<Frame>) {
        frame.reset();
        self.frames.lock().unwrap().push(frame);
        trace!("frame pool: returned a frame");
    }

    /// The number of frames currently idle in the pool. Exposed for tests
    /// and introspection, not part of the steady-state hot path.
    pub fn idle_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

lazy_static! {
    static ref FRAME_POOL: FramePool = FramePool::new();
}

pub(crate) fn global_pool() -> &'static FramePool {
    &FRAME_POOL
}

/// A [`Frame`] borrowed from the process-wide pool.
///
/// Returned by [`crate::Reader::read_command`] on success. Call
/// [`PooledFrame::release`] to return it to the pool immediately; if the
/// caller drops it instead, the frame is returned automatically.
pub struct PooledFrame {
    frame: Option<Box<Frame>>,
}

impl PooledFrame {
    pub(crate) fn new(frame: Box<Frame>) -> Self {
        Self { frame: Some(frame) }
    }

    /// Returns the frame to the pool now, rather than waiting for `Drop`.
    pub fn release(mut self) {
        if let Some(frame) = self.frame.take() {
            global_pool().put(frame);
        }
    }
}

impl std::ops::Deref for PooledFrame {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        self.frame.as_ref().expect("PooledFrame used after release")
    }
}

impl Drop for PooledFrame {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            global_pool().put(frame);
        }
    }
}
