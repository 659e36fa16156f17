//! Adaptive buffer negotiation for device-control calls whose output size is
//! not known up front.
//!
//! Every variable-length native query goes through [`Exchange::negotiate`]:
//! the attempt closure fills a buffer of the offered capacity and reports one
//! of the [`Attempt`] outcomes. The loop grows the buffer on "insufficient
//! buffer" / "more data", maps "not ready" / "invalid function" to `Ok(None)`
//! and turns every other code into a terminal [`DeviceError::Os`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::{code, DeviceError, Result};
use crate::ioctl::ControlCode;

pub const DEFAULT_INITIAL_CAPACITY: usize = 512;
pub const DEFAULT_MAX_CAPACITY: usize = 64 * 1024 * 1024;

/// Outcome of a single attempt at a variable-length call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// The call succeeded and wrote this many bytes.
    Complete(usize),
    /// The buffer was too small; `required` is set when the OS reported a size.
    TooSmall { required: Option<usize> },
    /// The device does not support the query.
    Unavailable,
    /// Terminal OS error code.
    Failed(u32),
}

impl Attempt {
    /// Classifies a failed call by its OS error code.
    pub fn from_code(os_code: u32, required: Option<usize>) -> Self {
        match os_code {
            code::ERROR_INSUFFICIENT_BUFFER | code::ERROR_MORE_DATA => {
                Attempt::TooSmall { required }
            }
            code::ERROR_NOT_READY | code::ERROR_INVALID_FUNCTION => Attempt::Unavailable,
            other => Attempt::Failed(other),
        }
    }
}

/// Raw failure of one native call: the OS code plus any size hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokeFailure {
    pub code: u32,
    pub required: Option<usize>,
}

impl InvokeFailure {
    pub fn new(code: u32) -> Self {
        Self {
            code,
            required: None,
        }
    }

    pub fn with_required(code: u32, required: usize) -> Self {
        Self {
            code,
            required: Some(required),
        }
    }
}

/// A target that accepts single device-control requests.
///
/// Implementations never produce surfaced errors: a failed call reports its
/// OS code and leaves retry policy to [`Exchange`].
pub trait ControlChannel {
    /// Path or identifier used in error reports.
    fn target(&self) -> &str;

    /// Whether the underlying handle is open.
    fn is_live(&self) -> bool;

    fn invoke(
        &self,
        code: ControlCode,
        input: Option<&[u8]>,
        output: &mut [u8],
    ) -> std::result::Result<usize, InvokeFailure>;
}

/// Shared flag checked between retries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Retry policy for variable-length calls.
#[derive(Debug, Clone)]
pub struct Exchange {
    initial_capacity: usize,
    max_capacity: usize,
    cancel: Option<CancelToken>,
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_CAPACITY)
    }
}

impl Exchange {
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            initial_capacity: initial_capacity.max(1),
            max_capacity: DEFAULT_MAX_CAPACITY.max(initial_capacity),
            cancel: None,
        }
    }

    pub fn with_max_capacity(mut self, max_capacity: usize) -> Self {
        self.max_capacity = max_capacity.max(self.initial_capacity);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Same policy with a different first guess, for calls whose typical size is known.
    pub fn sized(&self, initial_capacity: usize) -> Self {
        let initial_capacity = initial_capacity.max(1).min(self.max_capacity);
        Self {
            initial_capacity,
            max_capacity: self.max_capacity,
            cancel: self.cancel.clone(),
        }
    }

    pub fn initial_capacity(&self) -> usize {
        self.initial_capacity
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Runs `attempt` with growing buffers until it completes or fails for good.
    ///
    /// Returns `Ok(None)` when the attempt reports [`Attempt::Unavailable`].
    /// The capacity offered never decreases between attempts.
    pub fn negotiate<F>(&self, operation: &str, target: &str, mut attempt: F) -> Result<Option<Vec<u8>>>
    where
        F: FnMut(&mut [u8]) -> Attempt,
    {
        let mut capacity = self.initial_capacity;
        loop {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(DeviceError::Cancelled {
                    operation: operation.to_string(),
                    target: target.to_string(),
                });
            }

            let mut buffer = vec![0u8; capacity];
            match attempt(&mut buffer) {
                Attempt::Complete(written) => {
                    buffer.truncate(written.min(capacity));
                    return Ok(Some(buffer));
                }
                Attempt::Unavailable => {
                    debug!(operation, target, "no data available");
                    return Ok(None);
                }
                Attempt::Failed(os_code) => {
                    return Err(DeviceError::os(os_code, operation, target));
                }
                Attempt::TooSmall { required } => {
                    let next = match required {
                        Some(required) if required > capacity => required,
                        _ => capacity.saturating_mul(2),
                    };
                    if next > self.max_capacity {
                        return Err(DeviceError::BufferLimitExceeded {
                            operation: operation.to_string(),
                            target: target.to_string(),
                            requested: next,
                            limit: self.max_capacity,
                        });
                    }
                    debug!(operation, target, capacity, next, "growing buffer");
                    capacity = next;
                }
            }
        }
    }

    /// Issues `code` against `channel`, growing the output buffer as needed.
    pub fn control<C>(&self, channel: &C, code: ControlCode, input: Option<&[u8]>) -> Result<Option<Vec<u8>>>
    where
        C: ControlChannel + ?Sized,
    {
        if !channel.is_live() {
            return Err(DeviceError::InvalidHandle {
                target: channel.target().to_string(),
            });
        }
        self.negotiate(code.name(), channel.target(), |buffer| {
            match channel.invoke(code, input, buffer) {
                Ok(written) => Attempt::Complete(written),
                Err(failure) => Attempt::from_code(failure.code, failure.required),
            }
        })
    }
}

/// Issues a request that produces no output; every failure is terminal.
pub fn execute<C>(channel: &C, code: ControlCode, input: Option<&[u8]>) -> Result<()>
where
    C: ControlChannel + ?Sized,
{
    if !channel.is_live() {
        return Err(DeviceError::InvalidHandle {
            target: channel.target().to_string(),
        });
    }
    channel
        .invoke(code, input, &mut [])
        .map(|_| ())
        .map_err(|failure| DeviceError::os(failure.code, code.name(), channel.target()))
}
