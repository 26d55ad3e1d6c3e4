//! Fence creation and bounded client waits.

use mugl::sync::{Fence, FenceError, WaitStatus};
use mugl_integ_tests::context;
use mugl_mock::Call;

#[test]
fn client_wait_forwards_flush_and_timeout() {
  let (ctx, mock) = context();

  let fence = Fence::new(&ctx).unwrap();

  let status = fence.client_wait(true, 5_000);
  assert_eq!(status, WaitStatus::AlreadySignaled);

  assert_eq!(
    mock.count(|c| matches!(
      c,
      Call::ClientWaitSync {
        flush: true,
        timeout_ns: 5_000,
        ..
      }
    )),
    1
  );
}

#[test]
fn timeouts_are_reported_not_raised() {
  let (ctx, mock) = context();

  let fence = Fence::new(&ctx).unwrap();

  mock.set_wait_status(WaitStatus::TimeoutExpired);
  assert_eq!(fence.client_wait(false, 1), WaitStatus::TimeoutExpired);

  mock.set_wait_status(WaitStatus::ConditionSatisfied);
  assert_eq!(fence.client_wait(false, 1), WaitStatus::ConditionSatisfied);

  mock.set_wait_status(WaitStatus::WaitFailed);
  assert_eq!(fence.client_wait(false, 1), WaitStatus::WaitFailed);
}

#[test]
fn fences_release_their_sync_object() {
  let (ctx, mock) = context();

  let fence = Fence::new(&ctx).unwrap();
  drop(fence);

  assert_eq!(mock.count(|c| matches!(c, Call::FenceSync(_))), 1);
  assert_eq!(mock.count(|c| matches!(c, Call::DeleteSync(_))), 1);
}

#[test]
fn exhausted_contexts_cannot_create_fences() {
  let (ctx, mock) = context();

  mock.deny_allocations(true);
  assert_eq!(Fence::new(&ctx).unwrap_err(), FenceError::CreationFailed);
}
