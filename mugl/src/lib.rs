//! # A cached, dirty-tracked wrapper around a low-level GPU driver
//!
//! mugl is a thin object layer over a GPU driver context. It doesn't render
//! anything by itself; instead it tracks what the driver has already been told
//! so that redundant driver traffic is elided:
//!
//! - **Binding cache**: every bind goes through [`state::GraphicsState`],
//!   which remembers the object currently attached to each binding point and
//!   skips binds that would be no-ops.
//! - **Value cache**: shader variables ([`shader::Uniform`]) remember the last
//!   value pushed to the GPU and skip uploads of equal values.
//! - **Dirty propagation**: texture detail levels ([`texture::Mip`]) carry a
//!   dirty flag and are only re-uploaded when their source actually changed.
//!
//! The driver itself is an injected collaborator: anything implementing
//! [`driver::Driver`] can sit underneath, which is also how the whole protocol
//! is tested off-GPU (see the `mugl-mock` crate).
//!
//! # Caveat: out-of-band driver access
//!
//! The caches are only correct because every state mutation is routed through
//! them. A driver call issued behind their back permanently desynchronizes the
//! cached state from reality; nothing here detects or repairs that. Keep all
//! access on this side of the fence.
//!
//! # On threads
//!
//! Everything is synchronous and single-owner. A [`context::Context`] is
//! neither `Send` nor `Sync`; one logical owner issues commands against a
//! given context at a time, in order.

pub mod buffer;
pub mod context;
pub mod driver;
pub mod pixel;
pub mod renderbuffer;
pub mod shader;
pub mod state;
pub mod sync;
pub mod texture;
pub mod vertex_array;

pub use crate::context::Context;
