//! # Two-Phase Firmware Queries
//!
//! `GetInfo` and `GetMemoryMap` both return variable-length data whose size is
//! only known to the firmware. They are driven the same way:
//!
//! ```text
//! query(&mut [])            -> BUFFER_TOO_SMALL, required = N
//! buf = allocate(N)
//! query(&mut buf)           -> SUCCESS                        (done)
//!                           -> BUFFER_TOO_SMALL, required = M  (data grew:
//!                              free buf, allocate(M), query again)
//! ```
//!
//! The re-fill loop is bounded by the caller; a resource that keeps growing is
//! reported as [`QueryError::NoConvergence`] instead of spinning forever.
//!
//! Between the last `allocate` and the successful `query` nothing else runs, so
//! for the memory map the returned key is valid for as long as the caller does
//! not allocate or free.

use crate::firmware::Probe;
use uefi::Status;

/// A successfully filled query buffer.
#[derive(Debug)]
pub struct Filled<B, T> {
    /// Buffer of exactly the size the firmware last asked for.
    pub buffer: B,
    /// What the fill call reported alongside the data.
    pub output: T,
    /// Number of fill calls it took (1 unless the data grew in between).
    pub attempts: usize,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum QueryError {
    /// The size probe failed with something other than `BUFFER_TOO_SMALL`.
    #[error("size probe failed: {0:?}")]
    Probe(Status),
    /// The size probe claimed success on an empty buffer.
    #[error("size probe returned data without a buffer")]
    UnexpectedProbeSuccess,
    #[error("allocating {size} bytes failed: {status:?}")]
    Allocate { size: usize, status: Status },
    #[error("filling the buffer failed: {0:?}")]
    Fill(Status),
    /// The data kept growing between allocation and fill.
    #[error("buffer size did not settle after {attempts} attempts (last asked for {required} B)")]
    NoConvergence { attempts: usize, required: usize },
}

impl QueryError {
    /// The firmware status closest to this failure.
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::Probe(status) | Self::Fill(status) | Self::Allocate { status, .. } => *status,
            Self::UnexpectedProbeSuccess => Status::PROTOCOL_ERROR,
            Self::NoConvergence { .. } => Status::BUFFER_TOO_SMALL,
        }
    }
}

/// Phase 1 only: asks the firmware how many bytes the data needs right now.
///
/// Allocates nothing and may be repeated; while the underlying resource is
/// unchanged, every call reports the same size.
///
/// # Errors
/// [`QueryError::Probe`] or [`QueryError::UnexpectedProbeSuccess`].
pub fn probe_size<C, T>(
    ctx: &mut C,
    query: &mut impl FnMut(&mut C, &mut [u8]) -> Result<Probe<T>, Status>,
) -> Result<usize, QueryError> {
    match query(ctx, &mut []) {
        Ok(Probe::TooSmall(required)) => Ok(required),
        Ok(Probe::Complete(_)) => Err(QueryError::UnexpectedProbeSuccess),
        Err(status) => Err(QueryError::Probe(status)),
    }
}

/// Runs the full probe / allocate / fill protocol.
///
/// `ctx` is threaded through both operations so that allocation and query may
/// borrow the same firmware object. At most `max_attempts` fill calls are made.
///
/// # Errors
/// See [`QueryError`]. The buffer of a failed attempt is dropped (freed) before
/// returning.
pub fn query_two_phase<C, B, T>(
    ctx: &mut C,
    max_attempts: usize,
    mut allocate: impl FnMut(&mut C, usize) -> Result<B, Status>,
    mut query: impl FnMut(&mut C, &mut [u8]) -> Result<Probe<T>, Status>,
) -> Result<Filled<B, T>, QueryError>
where
    B: AsMut<[u8]>,
{
    let mut required = probe_size(ctx, &mut query)?;

    for attempt in 1..=max_attempts {
        let mut buffer = allocate(ctx, required).map_err(|status| QueryError::Allocate {
            size: required,
            status,
        })?;

        match query(ctx, buffer.as_mut()) {
            Ok(Probe::Complete(output)) => {
                return Ok(Filled {
                    buffer,
                    output,
                    attempts: attempt,
                });
            }
            Ok(Probe::TooSmall(now_required)) => {
                // Free before re-allocating so the firmware sees the final state.
                drop(buffer);
                required = now_required;
            }
            Err(status) => return Err(QueryError::Fill(status)),
        }
    }

    Err(QueryError::NoConvergence {
        attempts: max_attempts,
        required,
    })
}
