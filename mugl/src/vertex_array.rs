//! Vertex arrays and draw orchestration.
//!
//! A [`VertexArray`] is a named collection of attribute bindings plus an
//! optional index buffer, built against one program and reusable across draw
//! calls. [`VertexArray::draw`] is where the caches meet: it makes the owning
//! program active, binds the vertex array (both through the binding cache),
//! pushes the supplied uniform values (through their value caches) and then
//! derives the element count to hand the driver:
//!
//! - with an index buffer, from the index store's byte size and element kind;
//! - otherwise, from the first non-empty attribute binding, in attachment
//!   order, divided by its declared component count;
//! - with no attributes at all, nothing would be rasterized and the draw is a
//!   silent no-op.

use std::cell::RefCell;
use std::rc::Rc;

use crate::buffer::{Buffer, BufferTarget};
use crate::context::Context;
use crate::driver::Driver;
use crate::shader::{Program, ProgramError, UniformValue};
use crate::state::{Bind, GraphicsState};

/// Primitive topology of a draw call.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Primitive {
  Points,
  Lines,
  LineStrip,
  LineLoop,
  Triangles,
  TriangleStrip,
  TriangleFan,
}

impl Default for Primitive {
  fn default() -> Self {
    Primitive::Triangles
  }
}

/// Layout of one attribute binding.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AttributeFormat {
  /// Components per vertex, 1 to 4.
  pub components: u8,
  /// Whether integer data is normalized when read as floats.
  pub normalized: bool,
}

impl Default for AttributeFormat {
  fn default() -> Self {
    AttributeFormat {
      components: 3,
      normalized: false,
    }
  }
}

/// Errors that can happen while assembling a vertex array.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum VertexArrayError {
  /// The driver refused to allocate the vertex array object.
  #[error("cannot create vertex array")]
  CreationFailed,

  /// The program has no attribute by that name.
  #[error("unknown attribute: {0}")]
  UnknownAttribute(String),

  /// Component count outside 1 to 4.
  #[error("invalid component count: {0}")]
  InvalidComponents(u8),

  /// A buffer created for another target was attached.
  #[error("buffer target {got:?} cannot be attached where {expected:?} is required")]
  WrongTarget {
    expected: BufferTarget,
    got: BufferTarget,
  },
}

/// Errors that can happen while drawing.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum DrawError {
  /// The program passed to `draw` is not the one this vertex array was built
  /// against.
  #[error("vertex array drawn with a foreign program")]
  ForeignProgram,

  /// A uniform entry of the draw map failed to apply.
  #[error("{0}")]
  Uniform(#[from] ProgramError),
}

struct AttributeBinding<D>
where
  D: Driver,
{
  name: String,
  buffer: Buffer<D>,
  format: AttributeFormat,
}

/// A vertex array object: attribute bindings and an optional index buffer,
/// bound to one program.
pub struct VertexArray<D>
where
  D: Driver,
{
  handle: D::VertexArrayHandle,
  /// Identity used to scope attribute enablement to this vertex array.
  id: u64,
  /// Handle of the owning program; draws are checked against it.
  program: D::ProgramHandle,
  attributes: Vec<AttributeBinding<D>>,
  index_buffer: Option<Buffer<D>>,
  state: Rc<RefCell<GraphicsState<D>>>,
}

impl<D> VertexArray<D>
where
  D: Driver,
{
  /// Create an empty vertex array owned by `program`.
  pub fn new(ctx: &Context<D>, program: &Program<D>) -> Result<Self, VertexArrayError> {
    let mut state = ctx.state.borrow_mut();

    let handle = state
      .driver
      .create_vertex_array()
      .ok_or(VertexArrayError::CreationFailed)?;
    let id = state.next_vertex_array_id();

    Ok(VertexArray {
      handle,
      id,
      program: program.handle().clone(),
      attributes: Vec::new(),
      index_buffer: None,
      state: ctx.state.clone(),
    })
  }

  /// Attach `buffer` as the data source of the named attribute.
  ///
  /// Attachment order is remembered; the first non-empty binding is the one
  /// non-indexed draws derive their vertex count from.
  pub fn attach(
    &mut self,
    program: &mut Program<D>,
    name: &str,
    buffer: Buffer<D>,
    format: AttributeFormat,
  ) -> Result<(), VertexArrayError> {
    if !(1..=4).contains(&format.components) {
      return Err(VertexArrayError::InvalidComponents(format.components));
    }

    if buffer.target() != BufferTarget::Array {
      return Err(VertexArrayError::WrongTarget {
        expected: BufferTarget::Array,
        got: buffer.target(),
      });
    }

    let attr_index = program
      .attribute_index(name)
      .ok_or_else(|| VertexArrayError::UnknownAttribute(name.to_owned()))?;

    let mut state = self.state.borrow_mut();

    // force both binds: the pointer setup below records them into this vertex
    // array, so eliding them on cache grounds would record nothing
    state.bind_vertex_array(Some(&self.handle), Bind::Forced);
    state.bind_buffer(BufferTarget::Array, Some(buffer.handle()), Bind::Forced);

    let attribute = program.attribute_at_mut(attr_index);
    state.driver.vertex_attrib_pointer(
      attribute.location(),
      format.components,
      buffer.elem_type(),
      format.normalized,
    );
    attribute.enable_for(&mut state, self.id);

    drop(state);

    self.attributes.push(AttributeBinding {
      name: name.to_owned(),
      buffer,
      format,
    });

    Ok(())
  }

  /// Detach the named attribute, returning its buffer if it was attached.
  pub fn detach(
    &mut self,
    program: &mut Program<D>,
    name: &str,
  ) -> Result<Option<Buffer<D>>, VertexArrayError> {
    let attr_index = program
      .attribute_index(name)
      .ok_or_else(|| VertexArrayError::UnknownAttribute(name.to_owned()))?;

    let position = match self.attributes.iter().position(|b| b.name == name) {
      Some(position) => position,
      None => return Ok(None),
    };

    let mut state = self.state.borrow_mut();
    state.bind_vertex_array(Some(&self.handle), Bind::Forced);
    program
      .attribute_at_mut(attr_index)
      .disable_for(&mut state, self.id);
    drop(state);

    let binding = self.attributes.remove(position);
    Ok(Some(binding.buffer))
  }

  /// Attach an index buffer. It must have been created on
  /// [`BufferTarget::ElementArray`], which also guarantees its element kind
  /// is an unsigned integer one.
  pub fn set_indices(&mut self, buffer: Buffer<D>) -> Result<(), VertexArrayError> {
    if buffer.target() != BufferTarget::ElementArray {
      return Err(VertexArrayError::WrongTarget {
        expected: BufferTarget::ElementArray,
        got: buffer.target(),
      });
    }

    let mut state = self.state.borrow_mut();

    // recorded into the vertex array, hence the forced binds
    state.bind_vertex_array(Some(&self.handle), Bind::Forced);
    state.bind_buffer(
      BufferTarget::ElementArray,
      Some(buffer.handle()),
      Bind::Forced,
    );

    drop(state);

    self.index_buffer = Some(buffer);
    Ok(())
  }

  /// The attached index buffer, if any.
  pub fn indices(&self) -> Option<&Buffer<D>> {
    self.index_buffer.as_ref()
  }

  /// Draw this vertex array.
  ///
  /// `uniforms` entries are applied to the owning program first; an unknown
  /// name fails before any GPU state is touched. `offset` counts indices when
  /// an index buffer is attached, vertices otherwise. `instances <= 1` issues
  /// a plain draw.
  pub fn draw(
    &self,
    program: &mut Program<D>,
    uniforms: &[(&str, UniformValue<D>)],
    primitive: Primitive,
    offset: usize,
    instances: usize,
  ) -> Result<(), DrawError> {
    if program.handle() != &self.program {
      return Err(DrawError::ForeignProgram);
    }

    {
      let mut state = self.state.borrow_mut();
      state.use_program(Some(&self.program));
      state.bind_vertex_array(Some(&self.handle), Bind::Cached);
    }

    for (name, value) in uniforms {
      program.set_uniform(name, *value)?;
    }

    let mut state = self.state.borrow_mut();

    match &self.index_buffer {
      Some(indices) => {
        // indexed draw; count and byte offset come from the index store
        let elem = indices.elem_type();
        let count = indices.byte_len() / elem.bytes_len();
        let byte_offset = offset * elem.bytes_len();

        if instances <= 1 {
          state
            .driver
            .draw_elements(primitive, count, elem, byte_offset);
        } else {
          state
            .driver
            .draw_elements_instanced(primitive, count, elem, byte_offset, instances);
        }
      }

      None => {
        // direct draw; vertex count comes from the first non-empty attribute
        let binding = match self.attributes.iter().find(|b| !b.buffer.is_empty()) {
          Some(binding) => binding,
          // nothing would be rasterized
          None => return Ok(()),
        };

        let elems = binding.buffer.byte_len() / binding.buffer.elem_type().bytes_len();
        let vertices = elems / binding.format.components as usize;

        if instances <= 1 {
          state.driver.draw_arrays(primitive, offset, vertices);
        } else {
          state
            .driver
            .draw_arrays_instanced(primitive, offset, vertices, instances);
        }
      }
    }

    Ok(())
  }
}

impl<D> Drop for VertexArray<D>
where
  D: Driver,
{
  fn drop(&mut self) {
    let mut state = self.state.borrow_mut();
    state.bind_vertex_array(None, Bind::Cached);
    state.driver.delete_vertex_array(&self.handle);
  }
}
