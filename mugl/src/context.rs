//! Graphics context.
//!
//! A [`Context`] is the owner of a driver and of the cache layer wrapped
//! around it. Resources created from a context keep a shared handle onto that
//! state, so the cache lives exactly as long as the context and every resource
//! mutation is witnessed by it.
//!
//! A context is neither `Send` nor `Sync`: one logical owner issues commands
//! against it, in order. If you want `n` contexts, use `n` threads, each with
//! its own driver.

use std::cell::RefCell;
use std::rc::Rc;

use crate::driver::Driver;
use crate::state::GraphicsState;

/// A driver context fronted by the cache layer.
pub struct Context<D>
where
  D: Driver,
{
  pub(crate) state: Rc<RefCell<GraphicsState<D>>>,
}

impl<D> Context<D>
where
  D: Driver,
{
  /// Wrap a driver.
  ///
  /// The cache starts out empty and warms up lazily; no driver call is made
  /// here.
  pub fn new(driver: D) -> Self {
    Context {
      state: Rc::new(RefCell::new(GraphicsState::new(driver))),
    }
  }
}
