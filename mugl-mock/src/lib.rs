//! In-memory driver for mugl.
//!
//! [`MockDriver`] implements [`mugl::driver::Driver`] without a GPU anywhere
//! in sight: handles are integers, uploads are byte counts, and every call is
//! recorded into a log that tests inspect through a [`MockHandle`] kept
//! outside the context. It also keeps a shadow of driver-visible binding
//! state so the cache layer's lazy warm-up queries get truthful answers.
//!
//! Program introspection is scripted: queue an [`Interface`] before linking
//! and the next linked program reports it.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use mugl::buffer::{BufferTarget, ElemType, Usage};
use mugl::driver::{AttributeDesc, Driver, UniformData, UniformDesc};
use mugl::pixel::PixelFormat;
use mugl::shader::{StageType, UniformShape};
use mugl::sync::WaitStatus;
use mugl::texture::{ImageSource, Sampler, TextureTarget};
use mugl::vertex_array::Primitive;

macro_rules! impl_handles {
  ($($h:ident),* $(,)?) => {
    $(
      #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
      pub struct $h(pub u32);
    )*
  }
}

impl_handles!(
  BufferId,
  TextureId,
  RenderbufferId,
  VertexArrayId,
  ShaderId,
  ProgramId,
  FenceId,
  Location,
);

/// Owned copy of a uniform upload payload.
#[derive(Clone, Debug, PartialEq)]
pub enum UniformPayload {
  Floats(Vec<f32>),
  Ints(Vec<i32>),
  Uints(Vec<u32>),
  Matrices { data: Vec<f32>, transpose: bool },
}

impl From<UniformData<'_>> for UniformPayload {
  fn from(data: UniformData) -> Self {
    match data {
      UniformData::Floats(s) => UniformPayload::Floats(s.to_vec()),
      UniformData::Ints(s) => UniformPayload::Ints(s.to_vec()),
      UniformData::Uints(s) => UniformPayload::Uints(s.to_vec()),
      UniformData::Matrices { data, transpose } => UniformPayload::Matrices {
        data: data.to_vec(),
        transpose,
      },
    }
  }
}

/// One recorded driver call.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
  CreateBuffer(u32),
  DeleteBuffer(u32),
  CreateTexture(u32),
  DeleteTexture(u32),
  CreateRenderbuffer(u32),
  DeleteRenderbuffer(u32),
  CreateVertexArray(u32),
  DeleteVertexArray(u32),
  CreateShader(u32, StageType),
  DeleteShader(u32),
  CreateProgram(u32),
  DeleteProgram(u32),
  FenceSync(u32),
  DeleteSync(u32),

  QueryBoundBuffer(BufferTarget),
  QueryBoundTexture(u32, TextureTarget),
  QueryBoundRenderbuffer,
  QueryBoundVertexArray,
  QueryCurrentProgram,

  BindBuffer {
    target: BufferTarget,
    buffer: Option<u32>,
  },
  BindTexture {
    target: TextureTarget,
    texture: Option<u32>,
  },
  BindRenderbuffer(Option<u32>),
  BindVertexArray(Option<u32>),
  UseProgram(Option<u32>),
  ActiveTexture(u32),

  BufferData {
    target: BufferTarget,
    byte_len: usize,
    usage: Usage,
  },
  BufferReserve {
    target: BufferTarget,
    byte_len: usize,
    usage: Usage,
  },
  BufferSubData {
    target: BufferTarget,
    dst_byte_offset: usize,
    byte_len: usize,
  },

  UnpackAlignment(u8),
  TexSampler(TextureTarget, Sampler),
  TexImage2d {
    target: TextureTarget,
    face: u32,
    level: u32,
    format: PixelFormat,
    width: u32,
    height: u32,
    byte_len: usize,
  },
  TexImage3d {
    target: TextureTarget,
    level: u32,
    format: PixelFormat,
    width: u32,
    height: u32,
    depth: u32,
    byte_len: usize,
  },
  TexImageFromSource {
    target: TextureTarget,
    face: u32,
    level: u32,
    format: PixelFormat,
    width: u32,
    height: u32,
  },
  GenerateMipmap(TextureTarget),

  RenderbufferStorage {
    format: PixelFormat,
    width: u32,
    height: u32,
  },

  ShaderSource(u32),
  CompileShader(u32),
  AttachShader {
    program: u32,
    shader: u32,
  },
  LinkProgram(u32),
  ActiveUniforms(u32),
  ActiveAttributes(u32),
  UploadUniform {
    location: Location,
    shape: UniformShape,
    payload: UniformPayload,
  },

  VertexAttribPointer {
    location: u32,
    components: u8,
    elem: ElemType,
    normalized: bool,
  },
  EnableVertexAttrib(u32),
  DisableVertexAttrib(u32),

  DrawArrays {
    primitive: Primitive,
    first: usize,
    count: usize,
  },
  DrawArraysInstanced {
    primitive: Primitive,
    first: usize,
    count: usize,
    instances: usize,
  },
  DrawElements {
    primitive: Primitive,
    count: usize,
    elem: ElemType,
    byte_offset: usize,
  },
  DrawElementsInstanced {
    primitive: Primitive,
    count: usize,
    elem: ElemType,
    byte_offset: usize,
    instances: usize,
  },

  ClientWaitSync {
    fence: u32,
    flush: bool,
    timeout_ns: u64,
  },
}

impl Call {
  /// Whether this call is a draw of any flavour.
  pub fn is_draw(&self) -> bool {
    matches!(
      self,
      Call::DrawArrays { .. }
        | Call::DrawArraysInstanced { .. }
        | Call::DrawElements { .. }
        | Call::DrawElementsInstanced { .. }
    )
  }
}

/// A scripted program interface, reported by the next linked program.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Interface {
  pub uniforms: Vec<UniformDesc<Location>>,
  pub attributes: Vec<AttributeDesc>,
}

impl Interface {
  /// Build an interface from `(name, shape)` uniforms and attribute names,
  /// with locations assigned in order and array counts of 1.
  pub fn new(uniforms: &[(&str, UniformShape)], attributes: &[&str]) -> Self {
    Interface {
      uniforms: uniforms
        .iter()
        .enumerate()
        .map(|(i, (name, shape))| UniformDesc {
          name: (*name).to_owned(),
          location: Location(i as u32),
          shape: *shape,
          count: 1,
        })
        .collect(),
      attributes: attributes
        .iter()
        .enumerate()
        .map(|(i, name)| AttributeDesc {
          name: (*name).to_owned(),
          location: i as u32,
        })
        .collect(),
    }
  }
}

struct Inner {
  next_id: u32,
  calls: Vec<Call>,

  // shadow of driver-visible state, served to warm-up queries
  bound_buffers: HashMap<BufferTarget, u32>,
  bound_textures: HashMap<(u32, TextureTarget), u32>,
  active_unit: u32,
  bound_renderbuffer: Option<u32>,
  bound_vertex_array: Option<u32>,
  current_program: Option<u32>,

  // scripted behavior
  interfaces: VecDeque<Interface>,
  linked: HashMap<u32, Interface>,
  next_compile_error: Option<String>,
  next_link_error: Option<String>,
  wait_status: WaitStatus,
  deny_allocations: bool,
}

impl Inner {
  fn new() -> Self {
    Inner {
      next_id: 1,
      calls: Vec::new(),
      bound_buffers: HashMap::new(),
      bound_textures: HashMap::new(),
      active_unit: 0,
      bound_renderbuffer: None,
      bound_vertex_array: None,
      current_program: None,
      interfaces: VecDeque::new(),
      linked: HashMap::new(),
      next_compile_error: None,
      next_link_error: None,
      wait_status: WaitStatus::AlreadySignaled,
      deny_allocations: false,
    }
  }

  fn fresh_id(&mut self) -> Option<u32> {
    if self.deny_allocations {
      return None;
    }

    let id = self.next_id;
    self.next_id += 1;
    Some(id)
  }
}

/// The recording driver.
pub struct MockDriver {
  inner: Rc<RefCell<Inner>>,
}

impl MockDriver {
  pub fn new() -> Self {
    MockDriver {
      inner: Rc::new(RefCell::new(Inner::new())),
    }
  }

  /// An inspection handle sharing this driver's log and script. Grab one
  /// before moving the driver into a context.
  pub fn handle(&self) -> MockHandle {
    MockHandle {
      inner: self.inner.clone(),
    }
  }
}

impl Default for MockDriver {
  fn default() -> Self {
    MockDriver::new()
  }
}

/// Inspection and scripting handle onto a [`MockDriver`].
#[derive(Clone)]
pub struct MockHandle {
  inner: Rc<RefCell<Inner>>,
}

impl MockHandle {
  /// Every call recorded so far, in issue order.
  pub fn calls(&self) -> Vec<Call> {
    self.inner.borrow().calls.clone()
  }

  /// Number of recorded calls matching a predicate.
  pub fn count(&self, mut pred: impl FnMut(&Call) -> bool) -> usize {
    self.inner.borrow().calls.iter().filter(|c| pred(c)).count()
  }

  /// Forget the log recorded so far (the shadow state stays).
  pub fn clear_calls(&self) {
    self.inner.borrow_mut().calls.clear();
  }

  /// Queue the interface the next linked program reports.
  pub fn expect_program(&self, interface: Interface) {
    self.inner.borrow_mut().interfaces.push_back(interface);
  }

  /// Make the next shader compilation fail with this log.
  pub fn fail_next_compile(&self, log: impl Into<String>) {
    self.inner.borrow_mut().next_compile_error = Some(log.into());
  }

  /// Make the next program link fail with this log.
  pub fn fail_next_link(&self, log: impl Into<String>) {
    self.inner.borrow_mut().next_link_error = Some(log.into());
  }

  /// Status every `client_wait_sync` returns from now on.
  pub fn set_wait_status(&self, status: WaitStatus) {
    self.inner.borrow_mut().wait_status = status;
  }

  /// Make every resource allocation fail from now on, as a lost context
  /// would.
  pub fn deny_allocations(&self, deny: bool) {
    self.inner.borrow_mut().deny_allocations = deny;
  }
}

impl Driver for MockDriver {
  type BufferHandle = BufferId;
  type TextureHandle = TextureId;
  type RenderbufferHandle = RenderbufferId;
  type VertexArrayHandle = VertexArrayId;
  type ShaderHandle = ShaderId;
  type ProgramHandle = ProgramId;
  type FenceHandle = FenceId;
  type UniformLocation = Location;

  fn create_buffer(&mut self) -> Option<BufferId> {
    let mut inner = self.inner.borrow_mut();
    let id = inner.fresh_id()?;
    inner.calls.push(Call::CreateBuffer(id));
    Some(BufferId(id))
  }

  fn delete_buffer(&mut self, buffer: &BufferId) {
    let mut inner = self.inner.borrow_mut();
    inner.bound_buffers.retain(|_, b| *b != buffer.0);
    inner.calls.push(Call::DeleteBuffer(buffer.0));
  }

  fn create_texture(&mut self) -> Option<TextureId> {
    let mut inner = self.inner.borrow_mut();
    let id = inner.fresh_id()?;
    inner.calls.push(Call::CreateTexture(id));
    Some(TextureId(id))
  }

  fn delete_texture(&mut self, texture: &TextureId) {
    let mut inner = self.inner.borrow_mut();
    inner.bound_textures.retain(|_, t| *t != texture.0);
    inner.calls.push(Call::DeleteTexture(texture.0));
  }

  fn create_renderbuffer(&mut self) -> Option<RenderbufferId> {
    let mut inner = self.inner.borrow_mut();
    let id = inner.fresh_id()?;
    inner.calls.push(Call::CreateRenderbuffer(id));
    Some(RenderbufferId(id))
  }

  fn delete_renderbuffer(&mut self, renderbuffer: &RenderbufferId) {
    let mut inner = self.inner.borrow_mut();
    if inner.bound_renderbuffer == Some(renderbuffer.0) {
      inner.bound_renderbuffer = None;
    }
    inner.calls.push(Call::DeleteRenderbuffer(renderbuffer.0));
  }

  fn create_vertex_array(&mut self) -> Option<VertexArrayId> {
    let mut inner = self.inner.borrow_mut();
    let id = inner.fresh_id()?;
    inner.calls.push(Call::CreateVertexArray(id));
    Some(VertexArrayId(id))
  }

  fn delete_vertex_array(&mut self, vertex_array: &VertexArrayId) {
    let mut inner = self.inner.borrow_mut();
    if inner.bound_vertex_array == Some(vertex_array.0) {
      inner.bound_vertex_array = None;
    }
    inner.calls.push(Call::DeleteVertexArray(vertex_array.0));
  }

  fn create_shader(&mut self, ty: StageType) -> Option<ShaderId> {
    let mut inner = self.inner.borrow_mut();
    let id = inner.fresh_id()?;
    inner.calls.push(Call::CreateShader(id, ty));
    Some(ShaderId(id))
  }

  fn delete_shader(&mut self, shader: &ShaderId) {
    self.inner.borrow_mut().calls.push(Call::DeleteShader(shader.0));
  }

  fn create_program(&mut self) -> Option<ProgramId> {
    let mut inner = self.inner.borrow_mut();
    let id = inner.fresh_id()?;
    inner.calls.push(Call::CreateProgram(id));
    Some(ProgramId(id))
  }

  fn delete_program(&mut self, program: &ProgramId) {
    self.inner.borrow_mut().calls.push(Call::DeleteProgram(program.0));
  }

  fn fence_sync(&mut self) -> Option<FenceId> {
    let mut inner = self.inner.borrow_mut();
    let id = inner.fresh_id()?;
    inner.calls.push(Call::FenceSync(id));
    Some(FenceId(id))
  }

  fn delete_sync(&mut self, fence: &FenceId) {
    self.inner.borrow_mut().calls.push(Call::DeleteSync(fence.0));
  }

  fn bound_buffer(&mut self, target: BufferTarget) -> Option<BufferId> {
    let mut inner = self.inner.borrow_mut();
    inner.calls.push(Call::QueryBoundBuffer(target));
    inner.bound_buffers.get(&target).copied().map(BufferId)
  }

  fn bound_texture(&mut self, unit: u32, target: TextureTarget) -> Option<TextureId> {
    let mut inner = self.inner.borrow_mut();
    inner.calls.push(Call::QueryBoundTexture(unit, target));
    inner.bound_textures.get(&(unit, target)).copied().map(TextureId)
  }

  fn bound_renderbuffer(&mut self) -> Option<RenderbufferId> {
    let mut inner = self.inner.borrow_mut();
    inner.calls.push(Call::QueryBoundRenderbuffer);
    inner.bound_renderbuffer.map(RenderbufferId)
  }

  fn bound_vertex_array(&mut self) -> Option<VertexArrayId> {
    let mut inner = self.inner.borrow_mut();
    inner.calls.push(Call::QueryBoundVertexArray);
    inner.bound_vertex_array.map(VertexArrayId)
  }

  fn current_program(&mut self) -> Option<ProgramId> {
    let mut inner = self.inner.borrow_mut();
    inner.calls.push(Call::QueryCurrentProgram);
    inner.current_program.map(ProgramId)
  }

  fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<&BufferId>) {
    let mut inner = self.inner.borrow_mut();

    match buffer {
      Some(buffer) => {
        // one binding point per buffer object at a time
        inner.bound_buffers.retain(|_, b| *b != buffer.0);
        inner.bound_buffers.insert(target, buffer.0);
      }
      None => {
        inner.bound_buffers.remove(&target);
      }
    }

    inner.calls.push(Call::BindBuffer {
      target,
      buffer: buffer.map(|b| b.0),
    });
  }

  fn bind_texture(&mut self, target: TextureTarget, texture: Option<&TextureId>) {
    let mut inner = self.inner.borrow_mut();
    let unit = inner.active_unit;

    match texture {
      Some(texture) => {
        inner.bound_textures.insert((unit, target), texture.0);
      }
      None => {
        inner.bound_textures.remove(&(unit, target));
      }
    }

    inner.calls.push(Call::BindTexture {
      target,
      texture: texture.map(|t| t.0),
    });
  }

  fn bind_renderbuffer(&mut self, renderbuffer: Option<&RenderbufferId>) {
    let mut inner = self.inner.borrow_mut();
    inner.bound_renderbuffer = renderbuffer.map(|r| r.0);
    inner
      .calls
      .push(Call::BindRenderbuffer(renderbuffer.map(|r| r.0)));
  }

  fn bind_vertex_array(&mut self, vertex_array: Option<&VertexArrayId>) {
    let mut inner = self.inner.borrow_mut();
    inner.bound_vertex_array = vertex_array.map(|v| v.0);
    inner
      .calls
      .push(Call::BindVertexArray(vertex_array.map(|v| v.0)));
  }

  fn use_program(&mut self, program: Option<&ProgramId>) {
    let mut inner = self.inner.borrow_mut();
    inner.current_program = program.map(|p| p.0);
    inner.calls.push(Call::UseProgram(program.map(|p| p.0)));
  }

  fn active_texture(&mut self, unit: u32) {
    let mut inner = self.inner.borrow_mut();
    inner.active_unit = unit;
    inner.calls.push(Call::ActiveTexture(unit));
  }

  fn buffer_data(&mut self, target: BufferTarget, bytes: &[u8], usage: Usage) {
    self.inner.borrow_mut().calls.push(Call::BufferData {
      target,
      byte_len: bytes.len(),
      usage,
    });
  }

  fn buffer_reserve(&mut self, target: BufferTarget, byte_len: usize, usage: Usage) {
    self.inner.borrow_mut().calls.push(Call::BufferReserve {
      target,
      byte_len,
      usage,
    });
  }

  fn buffer_sub_data(&mut self, target: BufferTarget, dst_byte_offset: usize, bytes: &[u8]) {
    self.inner.borrow_mut().calls.push(Call::BufferSubData {
      target,
      dst_byte_offset,
      byte_len: bytes.len(),
    });
  }

  fn unpack_alignment(&mut self, alignment: u8) {
    self
      .inner
      .borrow_mut()
      .calls
      .push(Call::UnpackAlignment(alignment));
  }

  fn tex_sampler(&mut self, target: TextureTarget, sampler: &Sampler) {
    self
      .inner
      .borrow_mut()
      .calls
      .push(Call::TexSampler(target, *sampler));
  }

  fn tex_image_2d(
    &mut self,
    target: TextureTarget,
    face: u32,
    level: u32,
    format: PixelFormat,
    width: u32,
    height: u32,
    texels: &[u8],
  ) {
    self.inner.borrow_mut().calls.push(Call::TexImage2d {
      target,
      face,
      level,
      format,
      width,
      height,
      byte_len: texels.len(),
    });
  }

  fn tex_image_3d(
    &mut self,
    target: TextureTarget,
    level: u32,
    format: PixelFormat,
    width: u32,
    height: u32,
    depth: u32,
    texels: &[u8],
  ) {
    self.inner.borrow_mut().calls.push(Call::TexImage3d {
      target,
      level,
      format,
      width,
      height,
      depth,
      byte_len: texels.len(),
    });
  }

  fn tex_image_from_source(
    &mut self,
    target: TextureTarget,
    face: u32,
    level: u32,
    format: PixelFormat,
    source: &ImageSource,
  ) {
    self.inner.borrow_mut().calls.push(Call::TexImageFromSource {
      target,
      face,
      level,
      format,
      width: source.width,
      height: source.height,
    });
  }

  fn generate_mipmap(&mut self, target: TextureTarget) {
    self
      .inner
      .borrow_mut()
      .calls
      .push(Call::GenerateMipmap(target));
  }

  fn renderbuffer_storage(&mut self, format: PixelFormat, width: u32, height: u32) {
    self.inner.borrow_mut().calls.push(Call::RenderbufferStorage {
      format,
      width,
      height,
    });
  }

  fn shader_source(&mut self, shader: &ShaderId, _src: &str) {
    self
      .inner
      .borrow_mut()
      .calls
      .push(Call::ShaderSource(shader.0));
  }

  fn compile_shader(&mut self, shader: &ShaderId) -> Result<(), String> {
    let mut inner = self.inner.borrow_mut();
    inner.calls.push(Call::CompileShader(shader.0));

    match inner.next_compile_error.take() {
      Some(log) => Err(log),
      None => Ok(()),
    }
  }

  fn attach_shader(&mut self, program: &ProgramId, shader: &ShaderId) {
    self.inner.borrow_mut().calls.push(Call::AttachShader {
      program: program.0,
      shader: shader.0,
    });
  }

  fn link_program(&mut self, program: &ProgramId) -> Result<(), String> {
    let mut inner = self.inner.borrow_mut();
    inner.calls.push(Call::LinkProgram(program.0));

    match inner.next_link_error.take() {
      Some(log) => Err(log),
      None => {
        let interface = inner.interfaces.pop_front().unwrap_or_default();
        inner.linked.insert(program.0, interface);
        Ok(())
      }
    }
  }

  fn active_uniforms(&mut self, program: &ProgramId) -> Vec<UniformDesc<Location>> {
    let mut inner = self.inner.borrow_mut();
    inner.calls.push(Call::ActiveUniforms(program.0));
    inner
      .linked
      .get(&program.0)
      .map(|i| i.uniforms.clone())
      .unwrap_or_default()
  }

  fn active_attributes(&mut self, program: &ProgramId) -> Vec<AttributeDesc> {
    let mut inner = self.inner.borrow_mut();
    inner.calls.push(Call::ActiveAttributes(program.0));
    inner
      .linked
      .get(&program.0)
      .map(|i| i.attributes.clone())
      .unwrap_or_default()
  }

  fn upload_uniform(&mut self, location: &Location, shape: UniformShape, data: UniformData) {
    self.inner.borrow_mut().calls.push(Call::UploadUniform {
      location: *location,
      shape,
      payload: data.into(),
    });
  }

  fn vertex_attrib_pointer(
    &mut self,
    location: u32,
    components: u8,
    elem: ElemType,
    normalized: bool,
  ) {
    self.inner.borrow_mut().calls.push(Call::VertexAttribPointer {
      location,
      components,
      elem,
      normalized,
    });
  }

  fn enable_vertex_attrib(&mut self, location: u32) {
    self
      .inner
      .borrow_mut()
      .calls
      .push(Call::EnableVertexAttrib(location));
  }

  fn disable_vertex_attrib(&mut self, location: u32) {
    self
      .inner
      .borrow_mut()
      .calls
      .push(Call::DisableVertexAttrib(location));
  }

  fn draw_arrays(&mut self, primitive: Primitive, first: usize, count: usize) {
    self.inner.borrow_mut().calls.push(Call::DrawArrays {
      primitive,
      first,
      count,
    });
  }

  fn draw_arrays_instanced(
    &mut self,
    primitive: Primitive,
    first: usize,
    count: usize,
    instances: usize,
  ) {
    self.inner.borrow_mut().calls.push(Call::DrawArraysInstanced {
      primitive,
      first,
      count,
      instances,
    });
  }

  fn draw_elements(
    &mut self,
    primitive: Primitive,
    count: usize,
    elem: ElemType,
    byte_offset: usize,
  ) {
    self.inner.borrow_mut().calls.push(Call::DrawElements {
      primitive,
      count,
      elem,
      byte_offset,
    });
  }

  fn draw_elements_instanced(
    &mut self,
    primitive: Primitive,
    count: usize,
    elem: ElemType,
    byte_offset: usize,
    instances: usize,
  ) {
    self
      .inner
      .borrow_mut()
      .calls
      .push(Call::DrawElementsInstanced {
        primitive,
        count,
        elem,
        byte_offset,
        instances,
      });
  }

  fn client_wait_sync(&mut self, fence: &FenceId, flush: bool, timeout_ns: u64) -> WaitStatus {
    let mut inner = self.inner.borrow_mut();
    inner.calls.push(Call::ClientWaitSync {
      fence: fence.0,
      flush,
      timeout_ns,
    });
    inner.wait_status
  }
}
