//! Shader stages, programs and their variables.
//!
//! A [`Program`] introspects its uniform and attribute interface exactly once,
//! at link time. From then on every incoming value is validated against the
//! recorded [`UniformShape`] (element kind x arity) instead of being
//! shape-sniffed per assignment, and is compared element-wise against the last
//! value pushed through that variable: equal values cost no driver call.
//!
//! Sampler uniforms are special: setting one binds the referenced texture(s)
//! to texture units (uploading any dirty mip content on the way, see
//! [`crate::texture`]) and then uploads the unit indices. The skip-if-equal
//! rule applies to the *unit indices*, never to the texture contents; content
//! freshness is governed by the mip dirty flags alone.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::context::Context;
use crate::driver::{Driver, UniformData};
use crate::state::GraphicsState;
use crate::texture::{Texture, TextureError};

/// A shader stage type.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StageType {
  /// Vertex shader.
  Vertex,
  /// Fragment shader.
  Fragment,
}

impl fmt::Display for StageType {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    match *self {
      StageType::Vertex => f.write_str("vertex shader"),
      StageType::Fragment => f.write_str("fragment shader"),
    }
  }
}

/// Element kind of a shader variable.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum UniformKind {
  Float,
  Int,
  Uint,
  Bool,
  Sampler,
}

/// Arity of a shader variable.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Arity {
  Scalar,
  Vec2,
  Vec3,
  Vec4,
  Mat2,
  Mat3,
  Mat4,
}

impl Arity {
  /// Number of scalar components.
  pub fn components(self) -> usize {
    match self {
      Arity::Scalar => 1,
      Arity::Vec2 => 2,
      Arity::Vec3 => 3,
      Arity::Vec4 => 4,
      Arity::Mat2 => 4,
      Arity::Mat3 => 9,
      Arity::Mat4 => 16,
    }
  }

  pub fn is_matrix(self) -> bool {
    matches!(self, Arity::Mat2 | Arity::Mat3 | Arity::Mat4)
  }
}

/// The shape of a shader variable: element kind x arity.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct UniformShape {
  pub kind: UniformKind,
  pub arity: Arity,
}

impl UniformShape {
  pub const fn new(kind: UniformKind, arity: Arity) -> Self {
    UniformShape { kind, arity }
  }

  /// Number of scalar components of a single element of this shape.
  pub fn components(self) -> usize {
    self.arity.components()
  }
}

/// Errors that shader stages can emit.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum StageError {
  /// The driver refused to allocate the shader object.
  #[error("cannot create {0}")]
  CreationFailed(StageType),

  /// Compilation failed; carries the driver's diagnostic log verbatim.
  #[error("{0} compilation error: {1}")]
  CompilationFailed(StageType, String),
}

/// Errors that a program can emit.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ProgramError {
  /// The driver refused to allocate the program object.
  #[error("cannot create program")]
  CreationFailed,

  /// A shader stage failed.
  #[error("shader program has stage error: {0}")]
  Stage(#[from] StageError),

  /// Link failed; carries the driver's diagnostic log verbatim.
  #[error("shader program failed to link: {0}")]
  LinkFailed(String),

  /// A value was written to a variable the program doesn't have.
  #[error("unknown uniform: {0}")]
  UnknownUniform(String),

  /// A value doesn't match the introspected shape of its variable.
  #[error("value for uniform {name} doesn't match its shape {shape:?}")]
  ShapeMismatch { name: String, shape: UniformShape },

  /// Binding a sampled texture failed.
  #[error("sampler texture error: {0}")]
  Texture(#[from] TextureError),
}

/// A compiled shader stage.
pub struct Stage<D>
where
  D: Driver,
{
  handle: D::ShaderHandle,
  ty: StageType,
  state: Rc<RefCell<GraphicsState<D>>>,
}

impl<D> Stage<D>
where
  D: Driver,
{
  /// Compile a stage from source.
  pub fn new(ctx: &Context<D>, ty: StageType, src: &str) -> Result<Self, StageError> {
    let mut state = ctx.state.borrow_mut();

    let handle = state
      .driver
      .create_shader(ty)
      .ok_or(StageError::CreationFailed(ty))?;

    state.driver.shader_source(&handle, src);

    if let Err(log) = state.driver.compile_shader(&handle) {
      debug!("{} compilation failed: {}", ty, log);
      state.driver.delete_shader(&handle);
      return Err(StageError::CompilationFailed(ty, log));
    }

    Ok(Stage {
      handle,
      ty,
      state: ctx.state.clone(),
    })
  }

  pub fn ty(&self) -> StageType {
    self.ty
  }

  pub(crate) fn handle(&self) -> &D::ShaderHandle {
    &self.handle
  }
}

impl<D> Drop for Stage<D>
where
  D: Driver,
{
  fn drop(&mut self) {
    self.state.borrow_mut().driver.delete_shader(&self.handle);
  }
}

/// A value assigned to a uniform: a tagged union, resolved against the
/// variable's introspected shape, never sniffed.
///
/// Matrix data carries its transpose flag; plain float slices assigned to a
/// matrix variable default to no transposition.
pub enum UniformValue<'a, D>
where
  D: Driver,
{
  Float(f32),
  Floats(&'a [f32]),
  Int(i32),
  Ints(&'a [i32]),
  Uint(u32),
  Uints(&'a [u32]),
  Bool(bool),
  Bools(&'a [bool]),
  Matrices { data: &'a [f32], transpose: bool },
  Texture(&'a Texture<D>),
  Textures(&'a [&'a Texture<D>]),
}

// not derived: deriving would needlessly require `D: Clone + Copy`
impl<'a, D> Clone for UniformValue<'a, D>
where
  D: Driver,
{
  fn clone(&self) -> Self {
    *self
  }
}

impl<'a, D> Copy for UniformValue<'a, D> where D: Driver {}

/// Last value successfully pushed through a variable, in upload form.
#[derive(Clone, Debug, PartialEq)]
enum UniformCache {
  Floats(Vec<f32>),
  Ints(Vec<i32>),
  Uints(Vec<u32>),
  Matrices { data: Vec<f32>, transpose: bool },
  Units(Vec<i32>),
}

/// A uniform variable of a linked program, with its value cache.
pub struct Uniform<D>
where
  D: Driver,
{
  name: String,
  location: D::UniformLocation,
  shape: UniformShape,
  count: usize,
  cache: Option<UniformCache>,
}

impl<D> Uniform<D>
where
  D: Driver,
{
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn shape(&self) -> UniformShape {
    self.shape
  }

  /// Array length; 1 for non-array uniforms.
  pub fn count(&self) -> usize {
    self.count
  }

  fn set(
    &mut self,
    state: &mut GraphicsState<D>,
    value: UniformValue<D>,
  ) -> Result<(), ProgramError> {
    // materialize (and, for samplers, bind) first; the comparison below needs
    // the incoming value in upload form, and texture content freshness must
    // not depend on whether the unit indices changed
    let candidate = self.coerce(state, value)?;

    if self.cache.as_ref() == Some(&candidate) {
      return Ok(());
    }

    let data = match &candidate {
      UniformCache::Floats(v) => UniformData::Floats(v),
      UniformCache::Ints(v) | UniformCache::Units(v) => UniformData::Ints(v),
      UniformCache::Uints(v) => UniformData::Uints(v),
      UniformCache::Matrices { data, transpose } => UniformData::Matrices {
        data,
        transpose: *transpose,
      },
    };

    state.driver.upload_uniform(&self.location, self.shape, data);
    self.cache = Some(candidate);

    Ok(())
  }

  fn coerce(
    &self,
    state: &mut GraphicsState<D>,
    value: UniformValue<D>,
  ) -> Result<UniformCache, ProgramError> {
    let expected = self.shape.components() * self.count;
    let arity = self.shape.arity;

    let cache = match (self.shape.kind, value) {
      (UniformKind::Float, UniformValue::Float(x)) if expected == 1 && !arity.is_matrix() => {
        UniformCache::Floats(vec![x])
      }

      (UniformKind::Float, UniformValue::Floats(s)) if s.len() == expected => {
        if arity.is_matrix() {
          UniformCache::Matrices {
            data: s.to_vec(),
            transpose: false,
          }
        } else {
          UniformCache::Floats(s.to_vec())
        }
      }

      (UniformKind::Float, UniformValue::Matrices { data, transpose })
        if arity.is_matrix() && data.len() == expected =>
      {
        UniformCache::Matrices {
          data: data.to_vec(),
          transpose,
        }
      }

      (UniformKind::Int, UniformValue::Int(x)) if expected == 1 => UniformCache::Ints(vec![x]),

      (UniformKind::Int, UniformValue::Ints(s)) if s.len() == expected => {
        UniformCache::Ints(s.to_vec())
      }

      (UniformKind::Uint, UniformValue::Uint(x)) if expected == 1 => UniformCache::Uints(vec![x]),

      (UniformKind::Uint, UniformValue::Uints(s)) if s.len() == expected => {
        UniformCache::Uints(s.to_vec())
      }

      // booleans go down as 32-bit integers
      (UniformKind::Bool, UniformValue::Bool(x)) if expected == 1 => {
        UniformCache::Ints(vec![x as i32])
      }

      (UniformKind::Bool, UniformValue::Bools(s)) if s.len() == expected => {
        UniformCache::Ints(s.iter().map(|&b| b as i32).collect())
      }

      (UniformKind::Sampler, UniformValue::Texture(texture)) if self.count == 1 => {
        let unit = texture.prepare(state)?;
        UniformCache::Units(vec![unit as i32])
      }

      (UniformKind::Sampler, UniformValue::Textures(textures))
        if textures.len() == self.count =>
      {
        let mut units = Vec::with_capacity(textures.len());

        for texture in textures {
          units.push(texture.prepare(state)? as i32);
        }

        UniformCache::Units(units)
      }

      _ => {
        return Err(ProgramError::ShapeMismatch {
          name: self.name.clone(),
          shape: self.shape,
        })
      }
    };

    Ok(cache)
  }
}

/// A vertex attribute of a linked program.
///
/// An attribute can be independently enabled in several vertex arrays; the
/// set of arrays it is currently enabled in is tracked here so that enabling
/// is done once per array.
pub struct Attribute {
  name: String,
  location: u32,
  enabled_in: HashSet<u64>,
}

impl Attribute {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn location(&self) -> u32 {
    self.location
  }

  pub(crate) fn enable_for<D>(&mut self, state: &mut GraphicsState<D>, vertex_array: u64)
  where
    D: Driver,
  {
    if self.enabled_in.insert(vertex_array) {
      state.driver.enable_vertex_attrib(self.location);
    }
  }

  pub(crate) fn disable_for<D>(&mut self, state: &mut GraphicsState<D>, vertex_array: u64)
  where
    D: Driver,
  {
    if self.enabled_in.remove(&vertex_array) {
      state.driver.disable_vertex_attrib(self.location);
    }
  }
}

/// A linked shader program with its introspected variable interface.
pub struct Program<D>
where
  D: Driver,
{
  handle: D::ProgramHandle,
  uniforms: Vec<Uniform<D>>,
  uniform_index: HashMap<String, usize>,
  attributes: Vec<Attribute>,
  attribute_index: HashMap<String, usize>,
  state: Rc<RefCell<GraphicsState<D>>>,
}

impl<D> fmt::Debug for Program<D>
where
  D: Driver,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Program").finish_non_exhaustive()
  }
}

impl<D> Program<D>
where
  D: Driver,
{
  /// Link a program from compiled stages.
  pub fn new(ctx: &Context<D>, vertex: &Stage<D>, fragment: &Stage<D>) -> Result<Self, ProgramError> {
    let mut state = ctx.state.borrow_mut();

    let handle = state
      .driver
      .create_program()
      .ok_or(ProgramError::CreationFailed)?;

    state.driver.attach_shader(&handle, vertex.handle());
    state.driver.attach_shader(&handle, fragment.handle());

    if let Err(log) = state.driver.link_program(&handle) {
      debug!("program link failed: {}", log);
      state.driver.delete_program(&handle);
      return Err(ProgramError::LinkFailed(log));
    }

    // introspect the interface once; every later assignment validates
    // against these descriptors instead of re-sniffing the value
    let uniform_descs = state.driver.active_uniforms(&handle);
    let attribute_descs = state.driver.active_attributes(&handle);

    drop(state);

    let mut uniforms = Vec::with_capacity(uniform_descs.len());
    let mut uniform_index = HashMap::new();

    for desc in uniform_descs {
      uniform_index.insert(desc.name.clone(), uniforms.len());
      uniforms.push(Uniform {
        name: desc.name,
        location: desc.location,
        shape: desc.shape,
        count: desc.count,
        cache: None,
      });
    }

    let mut attributes = Vec::with_capacity(attribute_descs.len());
    let mut attribute_index = HashMap::new();

    for desc in attribute_descs {
      attribute_index.insert(desc.name.clone(), attributes.len());
      attributes.push(Attribute {
        name: desc.name,
        location: desc.location,
        enabled_in: HashSet::new(),
      });
    }

    debug!(
      "linked program with {} uniform(s), {} attribute(s)",
      uniforms.len(),
      attributes.len()
    );

    Ok(Program {
      handle,
      uniforms,
      uniform_index,
      attributes,
      attribute_index,
      state: ctx.state.clone(),
    })
  }

  /// Compile both stages from source and link them.
  pub fn from_sources(
    ctx: &Context<D>,
    vertex_src: &str,
    fragment_src: &str,
  ) -> Result<Self, ProgramError> {
    let vertex = Stage::new(ctx, StageType::Vertex, vertex_src)?;
    let fragment = Stage::new(ctx, StageType::Fragment, fragment_src)?;

    Program::new(ctx, &vertex, &fragment)
  }

  /// Assign a value to a named uniform.
  ///
  /// Fails before any driver call if the name is unknown to this program or
  /// the value doesn't fit the variable's introspected shape. Equal values
  /// (element-wise, against the last pushed one) skip the driver upload;
  /// sampler values still bind and refresh their textures either way.
  pub fn set_uniform(&mut self, name: &str, value: UniformValue<D>) -> Result<(), ProgramError> {
    let index = *self
      .uniform_index
      .get(name)
      .ok_or_else(|| ProgramError::UnknownUniform(name.to_owned()))?;

    let mut state = self.state.borrow_mut();

    // uniform uploads land on the active program
    state.use_program(Some(&self.handle));

    self.uniforms[index].set(&mut state, value)
  }

  /// The introspected uniform, if the program has one by that name.
  pub fn uniform(&self, name: &str) -> Option<&Uniform<D>> {
    self.uniform_index.get(name).map(|&i| &self.uniforms[i])
  }

  /// The introspected attribute, if the program has one by that name.
  pub fn attribute(&self, name: &str) -> Option<&Attribute> {
    self.attribute_index.get(name).map(|&i| &self.attributes[i])
  }

  pub(crate) fn attribute_index(&self, name: &str) -> Option<usize> {
    self.attribute_index.get(name).copied()
  }

  pub(crate) fn attribute_at_mut(&mut self, index: usize) -> &mut Attribute {
    &mut self.attributes[index]
  }

  pub(crate) fn handle(&self) -> &D::ProgramHandle {
    &self.handle
  }
}

impl<D> Drop for Program<D>
where
  D: Driver,
{
  fn drop(&mut self) {
    self.state.borrow_mut().driver.delete_program(&self.handle);
  }
}
