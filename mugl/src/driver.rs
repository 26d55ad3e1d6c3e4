//! The driver boundary.
//!
//! [`Driver`] is the single seam between the caching layer and the underlying
//! graphics API. Everything the wrapper ever asks of the GPU goes through one
//! of these methods; in return, the wrapper guarantees it never asks twice for
//! state the driver is already in (see [`crate::state`]).
//!
//! Implementations are expected to be dumb pass-throughs. In particular the
//! state-query methods (`bound_*`, `current_program`) are only ever called
//! once per binding point, to warm the cache up lazily; they must report what
//! the driver would report, not what the implementor thinks is cheap.

use crate::{
  buffer::{BufferTarget, ElemType, Usage},
  pixel::PixelFormat,
  shader::{StageType, UniformShape},
  sync::WaitStatus,
  texture::{ImageSource, Sampler, TextureTarget},
  vertex_array::Primitive,
};

/// Uniform payload handed to the driver, already coerced and shape-checked by
/// the caller.
///
/// The shape descriptor travels alongside so a driver can pick the concrete
/// upload entry point (e.g. `uniform3fv` vs `uniformMatrix4fv`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformData<'a> {
  Floats(&'a [f32]),
  Ints(&'a [i32]),
  Uints(&'a [u32]),
  Matrices { data: &'a [f32], transpose: bool },
}

/// One active uniform as reported by program introspection.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformDesc<L> {
  pub name: String,
  pub location: L,
  pub shape: UniformShape,
  /// Array length; 1 for non-array uniforms.
  pub count: usize,
}

/// One active vertex attribute as reported by program introspection.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeDesc {
  pub name: String,
  pub location: u32,
}

/// A GPU driver context.
///
/// Handles are opaque; the wrapper only ever clones and compares them. All
/// operations are synchronous and infallible at this level except where a
/// `Result` or `Option` says otherwise: creation returns `None` when the
/// driver cannot allocate (context lost, resources exhausted), and
/// compile/link return the driver's diagnostic log verbatim on failure.
pub trait Driver {
  type BufferHandle: Clone + PartialEq;
  type TextureHandle: Clone + PartialEq;
  type RenderbufferHandle: Clone + PartialEq;
  type VertexArrayHandle: Clone + PartialEq;
  type ShaderHandle: Clone + PartialEq;
  type ProgramHandle: Clone + PartialEq;
  type FenceHandle: Clone + PartialEq;
  type UniformLocation: Clone;

  // resource creation / destruction
  fn create_buffer(&mut self) -> Option<Self::BufferHandle>;
  fn delete_buffer(&mut self, buffer: &Self::BufferHandle);
  fn create_texture(&mut self) -> Option<Self::TextureHandle>;
  fn delete_texture(&mut self, texture: &Self::TextureHandle);
  fn create_renderbuffer(&mut self) -> Option<Self::RenderbufferHandle>;
  fn delete_renderbuffer(&mut self, renderbuffer: &Self::RenderbufferHandle);
  fn create_vertex_array(&mut self) -> Option<Self::VertexArrayHandle>;
  fn delete_vertex_array(&mut self, vertex_array: &Self::VertexArrayHandle);
  fn create_shader(&mut self, ty: StageType) -> Option<Self::ShaderHandle>;
  fn delete_shader(&mut self, shader: &Self::ShaderHandle);
  fn create_program(&mut self) -> Option<Self::ProgramHandle>;
  fn delete_program(&mut self, program: &Self::ProgramHandle);
  fn fence_sync(&mut self) -> Option<Self::FenceHandle>;
  fn delete_sync(&mut self, fence: &Self::FenceHandle);

  // state queries, used only for lazy cache warm-up
  fn bound_buffer(&mut self, target: BufferTarget) -> Option<Self::BufferHandle>;
  fn bound_texture(&mut self, unit: u32, target: TextureTarget) -> Option<Self::TextureHandle>;
  fn bound_renderbuffer(&mut self) -> Option<Self::RenderbufferHandle>;
  fn bound_vertex_array(&mut self) -> Option<Self::VertexArrayHandle>;
  fn current_program(&mut self) -> Option<Self::ProgramHandle>;

  // binds
  fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<&Self::BufferHandle>);
  fn bind_texture(&mut self, target: TextureTarget, texture: Option<&Self::TextureHandle>);
  fn bind_renderbuffer(&mut self, renderbuffer: Option<&Self::RenderbufferHandle>);
  fn bind_vertex_array(&mut self, vertex_array: Option<&Self::VertexArrayHandle>);
  fn use_program(&mut self, program: Option<&Self::ProgramHandle>);
  fn active_texture(&mut self, unit: u32);

  // buffer data
  fn buffer_data(&mut self, target: BufferTarget, bytes: &[u8], usage: Usage);
  fn buffer_reserve(&mut self, target: BufferTarget, byte_len: usize, usage: Usage);
  fn buffer_sub_data(&mut self, target: BufferTarget, dst_byte_offset: usize, bytes: &[u8]);

  // texture data
  fn unpack_alignment(&mut self, alignment: u8);
  fn tex_sampler(&mut self, target: TextureTarget, sampler: &Sampler);
  fn tex_image_2d(
    &mut self,
    target: TextureTarget,
    face: u32,
    level: u32,
    format: PixelFormat,
    width: u32,
    height: u32,
    texels: &[u8],
  );
  fn tex_image_3d(
    &mut self,
    target: TextureTarget,
    level: u32,
    format: PixelFormat,
    width: u32,
    height: u32,
    depth: u32,
    texels: &[u8],
  );
  /// Unsized upload: the source carries its own dimensions.
  fn tex_image_from_source(
    &mut self,
    target: TextureTarget,
    face: u32,
    level: u32,
    format: PixelFormat,
    source: &ImageSource,
  );
  fn generate_mipmap(&mut self, target: TextureTarget);

  // renderbuffer storage
  fn renderbuffer_storage(&mut self, format: PixelFormat, width: u32, height: u32);

  // shaders and programs
  fn shader_source(&mut self, shader: &Self::ShaderHandle, src: &str);
  fn compile_shader(&mut self, shader: &Self::ShaderHandle) -> Result<(), String>;
  fn attach_shader(&mut self, program: &Self::ProgramHandle, shader: &Self::ShaderHandle);
  fn link_program(&mut self, program: &Self::ProgramHandle) -> Result<(), String>;
  fn active_uniforms(
    &mut self,
    program: &Self::ProgramHandle,
  ) -> Vec<UniformDesc<Self::UniformLocation>>;
  fn active_attributes(&mut self, program: &Self::ProgramHandle) -> Vec<AttributeDesc>;
  fn upload_uniform(
    &mut self,
    location: &Self::UniformLocation,
    shape: UniformShape,
    data: UniformData,
  );

  // vertex attributes
  fn vertex_attrib_pointer(
    &mut self,
    location: u32,
    components: u8,
    elem: ElemType,
    normalized: bool,
  );
  fn enable_vertex_attrib(&mut self, location: u32);
  fn disable_vertex_attrib(&mut self, location: u32);

  // draws
  fn draw_arrays(&mut self, primitive: Primitive, first: usize, count: usize);
  fn draw_arrays_instanced(
    &mut self,
    primitive: Primitive,
    first: usize,
    count: usize,
    instances: usize,
  );
  fn draw_elements(
    &mut self,
    primitive: Primitive,
    count: usize,
    elem: ElemType,
    byte_offset: usize,
  );
  fn draw_elements_instanced(
    &mut self,
    primitive: Primitive,
    count: usize,
    elem: ElemType,
    byte_offset: usize,
    instances: usize,
  );

  // sync
  fn client_wait_sync(
    &mut self,
    fence: &Self::FenceHandle,
    flush: bool,
    timeout_ns: u64,
  ) -> WaitStatus;
}
