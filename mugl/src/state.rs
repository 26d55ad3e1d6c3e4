//! Graphics state.
//!
//! [`GraphicsState`] owns the driver and fronts it with a cache layer: one
//! entry per binding point, remembering the object last bound there, so that
//! re-binding the same object costs nothing. The cache is created with the
//! context, lives exactly as long as it, and is filled lazily: the first time
//! a binding point is consulted, the driver is asked what is actually bound
//! there, and from then on the answer is served from memory.
//!
//! The invariant throughout is that a cache entry, once filled, equals what
//! the driver would report. This holds only because every bind in this crate
//! goes through here; a driver call issued around the cache silently breaks
//! the invariant for the affected binding points until they are overwritten.

use std::collections::HashMap;
use std::marker::PhantomData;

use crate::buffer::BufferTarget;
use crate::driver::Driver;
use crate::texture::TextureTarget;

/// Should the binding be cached or forced to the provided value?
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Bind {
  Forced,
  Cached,
}

/// Allocator for texture units: a bump counter plus a free list fed by
/// dropped textures.
#[derive(Debug)]
pub(crate) struct BindingStack {
  pub(crate) next_texture_unit: u32,
  pub(crate) free_texture_units: Vec<u32>,
}

impl BindingStack {
  // Create a new, empty binding stack.
  fn new() -> Self {
    BindingStack {
      next_texture_unit: 0,
      free_texture_units: Vec::new(),
    }
  }
}

/// The graphics state.
///
/// This type represents the current state of a given driver context. It acts
/// as a forward-gate to all the exposed features from the low-level API but
/// adds a small cache layer over it to prevent from issuing the same API call
/// (with the same parameters).
pub struct GraphicsState<D>
where
  D: Driver,
{
  _phantom: PhantomData<*const ()>, // !Send and !Sync

  // the underlying driver; never handed out
  pub(crate) driver: D,

  // texture unit allocator
  binding_stack: BindingStack,

  // texture
  current_texture_unit: u32,
  bound_textures: Vec<(TextureTarget, Option<D::TextureHandle>)>,

  // buffers; absent key = not queried yet
  bound_buffers: HashMap<BufferTarget, Option<D::BufferHandle>>,

  // vertex array; outer `None` = not queried yet
  bound_vertex_array: Option<Option<D::VertexArrayHandle>>,

  // renderbuffer
  bound_renderbuffer: Option<Option<D::RenderbufferHandle>>,

  // shader program
  current_program: Option<Option<D::ProgramHandle>>,

  // vertex array identity; used to scope attribute enablement per VAO
  next_vertex_array_id: u64,
}

impl<D> GraphicsState<D>
where
  D: Driver,
{
  pub(crate) fn new(driver: D) -> Self {
    // 48 is the platform minimal requirement for texture units
    let bound_textures = vec![(TextureTarget::TwoD, None); 48];

    GraphicsState {
      _phantom: PhantomData,
      driver,
      binding_stack: BindingStack::new(),
      current_texture_unit: 0,
      bound_textures,
      bound_buffers: HashMap::new(),
      bound_vertex_array: None,
      bound_renderbuffer: None,
      current_program: None,
      next_vertex_array_id: 0,
    }
  }

  pub(crate) fn next_vertex_array_id(&mut self) -> u64 {
    let id = self.next_vertex_array_id;
    self.next_vertex_array_id += 1;
    id
  }

  // Buffers.

  /// Cached binding for `target`, warming up from the driver on the first
  /// query per target.
  pub(crate) fn bound_buffer(&mut self, target: BufferTarget) -> Option<D::BufferHandle> {
    match self.bound_buffers.get(&target) {
      Some(cached) => cached.clone(),

      None => {
        let current = self.driver.bound_buffer(target);
        self.bound_buffers.insert(target, current.clone());
        current
      }
    }
  }

  pub(crate) fn bind_buffer(
    &mut self,
    target: BufferTarget,
    buffer: Option<&D::BufferHandle>,
    bind: Bind,
  ) {
    let redundant = match bind {
      Bind::Forced => false,
      Bind::Cached => self.bound_buffer(target).as_ref() == buffer,
    };

    if !redundant {
      self.driver.bind_buffer(target, buffer);

      // a buffer object lives on a single binding point at a time; moving it
      // to a new target clears it from every other target it was cached under
      if let Some(buffer) = buffer {
        for (t, cached) in self.bound_buffers.iter_mut() {
          if *t != target && cached.as_ref() == Some(buffer) {
            *cached = None;
          }
        }
      }

      self.bound_buffers.insert(target, buffer.cloned());
    }
  }

  /// Unbind `target`, but only if `buffer` (when given) is what is actually
  /// bound there; this keeps a resource from knocking out a different one
  /// that now occupies the slot.
  pub(crate) fn unbind_buffer(&mut self, target: BufferTarget, buffer: Option<&D::BufferHandle>) {
    if let Some(buffer) = buffer {
      if self.bound_buffer(target).as_ref() != Some(buffer) {
        return;
      }
    }

    self.bind_buffer(target, None, Bind::Cached);
  }

  /// Evict a deleted buffer from every target it was cached under. Deleting a
  /// buffer implicitly unbinds it driver-side, so this is bookkeeping only.
  pub(crate) fn forget_buffer(&mut self, buffer: &D::BufferHandle) {
    for cached in self.bound_buffers.values_mut() {
      if cached.as_ref() == Some(buffer) {
        *cached = None;
      }
    }
  }

  // Textures.

  pub(crate) fn set_texture_unit(&mut self, unit: u32) {
    if self.current_texture_unit != unit {
      self.driver.active_texture(unit);
      self.current_texture_unit = unit;
    }
  }

  pub(crate) fn bind_texture(&mut self, target: TextureTarget, texture: Option<&D::TextureHandle>) {
    let unit = self.current_texture_unit as usize;

    match self.bound_textures.get(unit) {
      Some((t, cached)) if target != *t || texture != cached.as_ref() => {
        self.driver.bind_texture(target, texture);
        self.bound_textures[unit] = (target, texture.cloned());
      }

      None => {
        self.driver.bind_texture(target, texture);

        // not enough available texture units; let's grow a bit more
        self
          .bound_textures
          .resize(unit + 1, (TextureTarget::TwoD, None));
        self.bound_textures[unit] = (target, texture.cloned());
      }

      _ => (), // cached
    }
  }

  pub(crate) fn forget_texture(&mut self, texture: &D::TextureHandle) {
    for (_, cached) in self.bound_textures.iter_mut() {
      if cached.as_ref() == Some(texture) {
        *cached = None;
      }
    }
  }

  pub(crate) fn allocate_texture_unit(&mut self) -> u32 {
    let stack = &mut self.binding_stack;

    stack.free_texture_units.pop().unwrap_or_else(|| {
      let unit = stack.next_texture_unit;
      stack.next_texture_unit += 1;
      unit
    })
  }

  pub(crate) fn release_texture_unit(&mut self, unit: u32) {
    self.binding_stack.free_texture_units.push(unit);
  }

  // Vertex arrays.

  fn bound_vertex_array(&mut self) -> Option<D::VertexArrayHandle> {
    match &self.bound_vertex_array {
      Some(cached) => cached.clone(),

      None => {
        let current = self.driver.bound_vertex_array();
        self.bound_vertex_array = Some(current.clone());
        current
      }
    }
  }

  pub(crate) fn bind_vertex_array(
    &mut self,
    vertex_array: Option<&D::VertexArrayHandle>,
    bind: Bind,
  ) {
    let redundant = match bind {
      Bind::Forced => false,
      Bind::Cached => self.bound_vertex_array().as_ref() == vertex_array,
    };

    if !redundant {
      self.driver.bind_vertex_array(vertex_array);
      self.bound_vertex_array = Some(vertex_array.cloned());
    }
  }

  // Renderbuffers.

  fn bound_renderbuffer(&mut self) -> Option<D::RenderbufferHandle> {
    match &self.bound_renderbuffer {
      Some(cached) => cached.clone(),

      None => {
        let current = self.driver.bound_renderbuffer();
        self.bound_renderbuffer = Some(current.clone());
        current
      }
    }
  }

  pub(crate) fn bind_renderbuffer(
    &mut self,
    renderbuffer: Option<&D::RenderbufferHandle>,
    bind: Bind,
  ) {
    let redundant = match bind {
      Bind::Forced => false,
      Bind::Cached => self.bound_renderbuffer().as_ref() == renderbuffer,
    };

    if !redundant {
      self.driver.bind_renderbuffer(renderbuffer);
      self.bound_renderbuffer = Some(renderbuffer.cloned());
    }
  }

  pub(crate) fn unbind_renderbuffer(&mut self, renderbuffer: &D::RenderbufferHandle) {
    if self.bound_renderbuffer().as_ref() == Some(renderbuffer) {
      self.bind_renderbuffer(None, Bind::Cached);
    }
  }

  // Programs.

  fn current_program(&mut self) -> Option<D::ProgramHandle> {
    match &self.current_program {
      Some(cached) => cached.clone(),

      None => {
        let current = self.driver.current_program();
        self.current_program = Some(current.clone());
        current
      }
    }
  }

  pub(crate) fn use_program(&mut self, program: Option<&D::ProgramHandle>) {
    if self.current_program().as_ref() != program {
      self.driver.use_program(program);
      self.current_program = Some(program.cloned());
    }
  }
}
