//! GPU synchronization objects.
//!
//! A [`Fence`] marks a point in the command stream; waiting on it tells the
//! caller whether the commands issued before it have completed. The wait is
//! bounded by a caller-supplied timeout and reports its outcome as a
//! [`WaitStatus`] instead of erroring: timing out is an ordinary answer.

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::Context;
use crate::driver::Driver;
use crate::state::GraphicsState;

/// Outcome of waiting on a fence.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum WaitStatus {
  /// The fence was already signaled when the wait started.
  AlreadySignaled,
  /// The timeout expired before the fence signaled.
  TimeoutExpired,
  /// The fence signaled within the timeout.
  ConditionSatisfied,
  /// The driver failed to wait.
  WaitFailed,
}

/// Errors that can happen around fences.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum FenceError {
  /// The driver refused to allocate the sync object.
  #[error("cannot create fence")]
  CreationFailed,
}

/// A GPU fence, inserted into the command stream at creation time.
pub struct Fence<D>
where
  D: Driver,
{
  handle: D::FenceHandle,
  state: Rc<RefCell<GraphicsState<D>>>,
}

impl<D> std::fmt::Debug for Fence<D>
where
  D: Driver,
{
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Fence").finish_non_exhaustive()
  }
}

impl<D> Fence<D>
where
  D: Driver,
{
  /// Insert a fence after the commands issued so far.
  pub fn new(ctx: &Context<D>) -> Result<Self, FenceError> {
    let mut state = ctx.state.borrow_mut();

    let handle = state
      .driver
      .fence_sync()
      .ok_or(FenceError::CreationFailed)?;

    Ok(Fence {
      handle,
      state: ctx.state.clone(),
    })
  }

  /// Block until the fence signals or `timeout_ns` elapses.
  ///
  /// With `flush` set, pending commands are flushed to the GPU before
  /// waiting, so the fence can actually be reached.
  pub fn client_wait(&self, flush: bool, timeout_ns: u64) -> WaitStatus {
    self
      .state
      .borrow_mut()
      .driver
      .client_wait_sync(&self.handle, flush, timeout_ns)
  }
}

impl<D> Drop for Fence<D>
where
  D: Driver,
{
  fn drop(&mut self) {
    self.state.borrow_mut().driver.delete_sync(&self.handle);
  }
}
