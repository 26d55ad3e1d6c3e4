//! Renderbuffers.
//!
//! A [`Renderbuffer`] is a driver-side storage surface with a fixed format
//! and size. There is a single renderbuffer binding point; binds go through
//! the same cache discipline as everything else.

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;

use crate::context::Context;
use crate::driver::Driver;
use crate::pixel::PixelFormat;
use crate::state::{Bind, GraphicsState};

/// Errors that can happen around renderbuffers.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum RenderbufferError {
  /// The driver refused to allocate the renderbuffer object.
  #[error("cannot create renderbuffer")]
  CreationFailed,
}

/// A GPU renderbuffer.
pub struct Renderbuffer<D>
where
  D: Driver,
{
  handle: D::RenderbufferHandle,
  format: PixelFormat,
  width: u32,
  height: u32,
  state: Rc<RefCell<GraphicsState<D>>>,
}

impl<D> std::fmt::Debug for Renderbuffer<D>
where
  D: Driver,
{
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Renderbuffer")
      .field("format", &self.format)
      .field("width", &self.width)
      .field("height", &self.height)
      .finish_non_exhaustive()
  }
}

impl<D> Renderbuffer<D>
where
  D: Driver,
{
  /// Allocate storage for a `width` x `height` surface of `format`.
  pub fn new(
    ctx: &Context<D>,
    format: PixelFormat,
    width: u32,
    height: u32,
  ) -> Result<Self, RenderbufferError> {
    let mut state = ctx.state.borrow_mut();

    let handle = state
      .driver
      .create_renderbuffer()
      .ok_or(RenderbufferError::CreationFailed)?;

    state.bind_renderbuffer(Some(&handle), Bind::Forced);
    state.driver.renderbuffer_storage(format, width, height);

    debug!("created {}x{} renderbuffer ({:?})", width, height, format);

    Ok(Renderbuffer {
      handle,
      format,
      width,
      height,
      state: ctx.state.clone(),
    })
  }

  /// Bind this renderbuffer, going through the cache.
  pub fn bind(&self) {
    self
      .state
      .borrow_mut()
      .bind_renderbuffer(Some(&self.handle), Bind::Cached);
  }

  /// Unbind this renderbuffer, if it is the one bound.
  pub fn unbind(&self) {
    self.state.borrow_mut().unbind_renderbuffer(&self.handle);
  }

  pub fn format(&self) -> PixelFormat {
    self.format
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }
}

impl<D> Drop for Renderbuffer<D>
where
  D: Driver,
{
  fn drop(&mut self) {
    let mut state = self.state.borrow_mut();

    state.unbind_renderbuffer(&self.handle);
    state.driver.delete_renderbuffer(&self.handle);
  }
}
