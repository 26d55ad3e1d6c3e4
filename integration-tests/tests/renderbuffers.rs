//! Renderbuffer storage and binding.

use mugl::pixel::PixelFormat;
use mugl::renderbuffer::{Renderbuffer, RenderbufferError};
use mugl_integ_tests::context;
use mugl_mock::Call;

#[test]
fn creation_allocates_storage() {
  let (ctx, mock) = context();

  let rb = Renderbuffer::new(&ctx, PixelFormat::DEPTH32, 256, 128).unwrap();
  assert_eq!(rb.width(), 256);
  assert_eq!(rb.height(), 128);

  assert_eq!(
    mock.count(|c| matches!(
      c,
      Call::RenderbufferStorage {
        width: 256,
        height: 128,
        ..
      }
    )),
    1
  );
}

#[test]
fn binds_are_cached() {
  let (ctx, mock) = context();

  let rb = Renderbuffer::new(&ctx, PixelFormat::RGBA8, 16, 16).unwrap();

  mock.clear_calls();

  // creation force-bound it already
  rb.bind();
  rb.bind();
  assert_eq!(mock.count(|c| matches!(c, Call::BindRenderbuffer(_))), 0);

  rb.unbind();
  rb.unbind();
  assert_eq!(
    mock.count(|c| matches!(c, Call::BindRenderbuffer(None))),
    1
  );
}

#[test]
fn dropping_unbinds_and_deletes() {
  let (ctx, mock) = context();

  let rb = Renderbuffer::new(&ctx, PixelFormat::RGBA8, 8, 8).unwrap();

  mock.clear_calls();
  drop(rb);

  assert_eq!(
    mock.calls(),
    vec![Call::BindRenderbuffer(None), Call::DeleteRenderbuffer(1)],
  );
}

#[test]
fn exhausted_contexts_cannot_create_renderbuffers() {
  let (ctx, mock) = context();

  mock.deny_allocations(true);

  assert_eq!(
    Renderbuffer::new(&ctx, PixelFormat::RGBA8, 4, 4).unwrap_err(),
    RenderbufferError::CreationFailed
  );
}
