//! GPU buffers.
//!
//! A [`Buffer`] owns a driver-side data store plus the client-side metadata
//! the rest of the crate derives sizes from: the binding target it was created
//! for (immutable), a usage hint, the byte length of the store and the element
//! kind tag inferred from the concrete slice type it was filled from. The tag
//! is what lets the draw path turn byte sizes into element counts without ever
//! asking the driver.
//!
//! Element-array (index) buffers only accept unsigned integer sources; the
//! constraint is checked before any driver call is issued.

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;

use crate::context::Context;
use crate::driver::Driver;
use crate::state::{Bind, GraphicsState};

/// A buffer binding point.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BufferTarget {
  /// Vertex attribute data.
  Array,
  /// Index data. Buffers on this target are restricted to unsigned integer
  /// element kinds.
  ElementArray,
  /// Source of copy operations.
  CopyRead,
  /// Destination of copy operations.
  CopyWrite,
  /// Pixel readback destination.
  PixelPack,
  /// Pixel upload source.
  PixelUnpack,
  /// Uniform block storage.
  Uniform,
}

/// Usage hint forwarded to the driver at allocation time.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Usage {
  StaticDraw,
  DynamicDraw,
  StreamDraw,
  StaticRead,
  DynamicRead,
  StreamRead,
  StaticCopy,
  DynamicCopy,
  StreamCopy,
}

/// Element kind of a buffer's data store, inferred from the concrete slice
/// type the store was filled from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ElemType {
  I8,
  U8,
  I16,
  U16,
  I32,
  U32,
  F32,
}

impl ElemType {
  /// Number of bytes a single element occupies.
  pub fn bytes_len(self) -> usize {
    match self {
      ElemType::I8 | ElemType::U8 => 1,
      ElemType::I16 | ElemType::U16 => 2,
      ElemType::I32 | ElemType::U32 | ElemType::F32 => 4,
    }
  }

  /// Whether this kind is allowed as an index buffer element.
  pub fn is_unsigned_int(self) -> bool {
    matches!(self, ElemType::U8 | ElemType::U16 | ElemType::U32)
  }
}

/// Scalar types a buffer can be filled from, each mapping to a distinct
/// [`ElemType`] tag.
pub trait BufferData: bytemuck::Pod {
  const ELEM: ElemType;
}

macro_rules! impl_BufferData {
  ($($t:ty => $e:ident),* $(,)?) => {
    $(
      impl BufferData for $t {
        const ELEM: ElemType = ElemType::$e;
      }
    )*
  }
}

impl_BufferData!(
  i8 => I8,
  u8 => U8,
  i16 => I16,
  u16 => U16,
  i32 => I32,
  u32 => U32,
  f32 => F32,
);

/// Errors that can happen around buffers.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum BufferError {
  /// The driver refused to allocate the buffer object.
  #[error("cannot create buffer")]
  CreationFailed,

  /// An index buffer was given a signed or floating-point source.
  #[error("index buffers require an unsigned integer element kind, got {0:?}")]
  InvalidIndexType(ElemType),

  /// A partial update would write past the end of the data store.
  #[error(
    "partial update of {byte_len} bytes at offset {dst_byte_offset} overflows a {buffer_byte_len}-byte buffer"
  )]
  Overflow {
    dst_byte_offset: usize,
    byte_len: usize,
    buffer_byte_len: usize,
  },

  /// A partial update tried to change the element kind of the store.
  #[error("partial update with element kind {data:?} into a {buffer:?} buffer")]
  ElemTypeMismatch { buffer: ElemType, data: ElemType },
}

/// A GPU buffer.
pub struct Buffer<D>
where
  D: Driver,
{
  handle: D::BufferHandle,
  target: BufferTarget,
  usage: Usage,
  elem: ElemType,
  byte_len: usize,
  state: Rc<RefCell<GraphicsState<D>>>,
}

impl<D> std::fmt::Debug for Buffer<D>
where
  D: Driver,
{
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Buffer")
      .field("target", &self.target)
      .field("usage", &self.usage)
      .field("elem", &self.elem)
      .field("byte_len", &self.byte_len)
      .finish_non_exhaustive()
  }
}

impl<D> Buffer<D>
where
  D: Driver,
{
  /// Create a buffer on `target` and upload `data` into it.
  ///
  /// The element kind tag is taken from `T`. Creating an
  /// [`BufferTarget::ElementArray`] buffer from anything but an unsigned
  /// integer slice fails before any driver call.
  pub fn new<T>(
    ctx: &Context<D>,
    target: BufferTarget,
    data: &[T],
    usage: Usage,
  ) -> Result<Self, BufferError>
  where
    T: BufferData,
  {
    Self::check_index_elem(target, T::ELEM)?;

    let mut state = ctx.state.borrow_mut();
    let handle = state
      .driver
      .create_buffer()
      .ok_or(BufferError::CreationFailed)?;

    // force the bind; a previously bound buffer (possibly a dropped one with
    // a recycled slot) must not elide it
    state.bind_buffer(target, Some(&handle), Bind::Forced);

    let bytes: &[u8] = bytemuck::cast_slice(data);
    state.driver.buffer_data(target, bytes, usage);

    debug!(
      "created {:?} buffer of {} bytes ({:?})",
      target,
      bytes.len(),
      T::ELEM
    );

    Ok(Buffer {
      handle,
      target,
      usage,
      elem: T::ELEM,
      byte_len: bytes.len(),
      state: ctx.state.clone(),
    })
  }

  /// Create a buffer with a sized but uninitialized data store.
  pub fn reserve(
    ctx: &Context<D>,
    target: BufferTarget,
    elem: ElemType,
    len: usize,
    usage: Usage,
  ) -> Result<Self, BufferError> {
    Self::check_index_elem(target, elem)?;

    let mut state = ctx.state.borrow_mut();
    let handle = state
      .driver
      .create_buffer()
      .ok_or(BufferError::CreationFailed)?;

    state.bind_buffer(target, Some(&handle), Bind::Forced);

    let byte_len = len * elem.bytes_len();
    state.driver.buffer_reserve(target, byte_len, usage);

    Ok(Buffer {
      handle,
      target,
      usage,
      elem,
      byte_len,
      state: ctx.state.clone(),
    })
  }

  fn check_index_elem(target: BufferTarget, elem: ElemType) -> Result<(), BufferError> {
    if target == BufferTarget::ElementArray && !elem.is_unsigned_int() {
      return Err(BufferError::InvalidIndexType(elem));
    }

    Ok(())
  }

  /// Replace or partially update the data store.
  ///
  /// With `dst_byte_offset` set, this is a sub-range write: the total size,
  /// usage hint and element kind of the store stay as they are, and the write
  /// must fit inside the existing store. Without it, the whole store (and its
  /// tag, and optionally its usage hint) is replaced.
  pub fn set_data<T>(
    &mut self,
    data: &[T],
    usage: Option<Usage>,
    dst_byte_offset: Option<usize>,
  ) -> Result<(), BufferError>
  where
    T: BufferData,
  {
    let bytes: &[u8] = bytemuck::cast_slice(data);

    match dst_byte_offset {
      Some(offset) => {
        if T::ELEM != self.elem {
          return Err(BufferError::ElemTypeMismatch {
            buffer: self.elem,
            data: T::ELEM,
          });
        }

        if offset + bytes.len() > self.byte_len {
          return Err(BufferError::Overflow {
            dst_byte_offset: offset,
            byte_len: bytes.len(),
            buffer_byte_len: self.byte_len,
          });
        }

        let mut state = self.state.borrow_mut();
        state.bind_buffer(self.target, Some(&self.handle), Bind::Cached);
        state.driver.buffer_sub_data(self.target, offset, bytes);
      }

      None => {
        Self::check_index_elem(self.target, T::ELEM)?;

        if let Some(usage) = usage {
          self.usage = usage;
        }

        let mut state = self.state.borrow_mut();
        state.bind_buffer(self.target, Some(&self.handle), Bind::Cached);
        state.driver.buffer_data(self.target, bytes, self.usage);

        self.elem = T::ELEM;
        self.byte_len = bytes.len();
      }
    }

    Ok(())
  }

  /// Bind this buffer to its target, going through the cache.
  pub fn bind(&self) {
    self
      .state
      .borrow_mut()
      .bind_buffer(self.target, Some(&self.handle), Bind::Cached);
  }

  /// Bind this buffer to a target other than the one it was created for,
  /// e.g. one of the copy or pixel targets.
  ///
  /// The binding is cached under its own (context, target) key. Driver-side a
  /// buffer object lives on one binding point at a time, so this clears the
  /// object from every other target it was cached under. Index-buffer typing
  /// rules still apply.
  pub fn bind_to(&self, target: BufferTarget) -> Result<(), BufferError> {
    Self::check_index_elem(target, self.elem)?;

    self
      .state
      .borrow_mut()
      .bind_buffer(target, Some(&self.handle), Bind::Cached);

    Ok(())
  }

  /// Unbind this buffer from its target, if it is the one bound there.
  pub fn unbind(&self) {
    self
      .state
      .borrow_mut()
      .unbind_buffer(self.target, Some(&self.handle));
  }

  pub fn target(&self) -> BufferTarget {
    self.target
  }

  pub fn usage(&self) -> Usage {
    self.usage
  }

  pub fn elem_type(&self) -> ElemType {
    self.elem
  }

  /// Size of the data store, in bytes.
  pub fn byte_len(&self) -> usize {
    self.byte_len
  }

  /// Number of elements in the data store, per the element kind tag.
  pub fn len(&self) -> usize {
    self.byte_len / self.elem.bytes_len()
  }

  pub fn is_empty(&self) -> bool {
    self.byte_len == 0
  }

  pub(crate) fn handle(&self) -> &D::BufferHandle {
    &self.handle
  }
}

impl<D> Drop for Buffer<D>
where
  D: Driver,
{
  fn drop(&mut self) {
    let mut state = self.state.borrow_mut();

    state.unbind_buffer(self.target, Some(&self.handle));
    state.forget_buffer(&self.handle);
    state.driver.delete_buffer(&self.handle);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn elem_bytes_len() {
    assert_eq!(ElemType::U8.bytes_len(), 1);
    assert_eq!(ElemType::I16.bytes_len(), 2);
    assert_eq!(ElemType::U32.bytes_len(), 4);
    assert_eq!(ElemType::F32.bytes_len(), 4);
  }

  #[test]
  fn index_elem_kinds() {
    assert!(ElemType::U8.is_unsigned_int());
    assert!(ElemType::U16.is_unsigned_int());
    assert!(ElemType::U32.is_unsigned_int());
    assert!(!ElemType::I32.is_unsigned_int());
    assert!(!ElemType::F32.is_unsigned_int());
  }

  #[test]
  fn inferred_tags() {
    assert_eq!(<u16 as BufferData>::ELEM, ElemType::U16);
    assert_eq!(<f32 as BufferData>::ELEM, ElemType::F32);
    assert_eq!(<i8 as BufferData>::ELEM, ElemType::I8);
  }
}
