//! Textures, mips and mipmaps.
//!
//! A texture on the GPU is fed from a client-side hierarchy: one [`Mipmap`]
//! per face, each an ordered collection of [`Mip`] detail levels. Every mip
//! tracks a dirty flag; it starts dirty, is uploaded (and cleaned) the next
//! time its texture is updated or sampled, and is re-dirtied whenever its
//! source, format or dimensions are reassigned. The GPU therefore only ever
//! sees levels that actually changed.
//!
//! A mip's dimensions may be unknown until its source is known (a decoded
//! image carries its own size). Such a mip is uploaded through the unsized
//! driver path and can never make its mipmap *texture complete*; sampling an
//! incomplete texture through a mip-sampling minification filter falls back
//! to driver-side mipmap generation.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::Rc;

use log::{debug, trace};

use crate::context::Context;
use crate::driver::Driver;
use crate::pixel::PixelFormat;
use crate::state::GraphicsState;

/// A texture binding target.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TextureTarget {
  TwoD,
  ThreeD,
  CubeMap,
  TwoDArray,
}

impl TextureTarget {
  /// Number of faces a texture on this target carries.
  pub fn face_count(self) -> usize {
    match self {
      TextureTarget::CubeMap => 6,
      _ => 1,
    }
  }

  /// Whether uploads on this target take a depth dimension.
  pub fn has_depth(self) -> bool {
    matches!(self, TextureTarget::ThreeD | TextureTarget::TwoDArray)
  }
}

/// How to wrap sampling coordinates outside of [0; 1].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Wrap {
  ClampToEdge,
  Repeat,
  MirroredRepeat,
}

/// Minification filter.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MinFilter {
  Nearest,
  Linear,
  NearestMipmapNearest,
  NearestMipmapLinear,
  LinearMipmapNearest,
  LinearMipmapLinear,
}

impl MinFilter {
  /// Whether sampling through this filter reads mip levels beyond the base
  /// one.
  pub fn requires_mipmaps(self) -> bool {
    !matches!(self, MinFilter::Nearest | MinFilter::Linear)
  }
}

/// Magnification filter.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MagFilter {
  Nearest,
  Linear,
}

/// Sampling parameters, applied once at texture creation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Sampler {
  pub wrap_r: Wrap,
  pub wrap_s: Wrap,
  pub wrap_t: Wrap,
  pub min_filter: MinFilter,
  pub mag_filter: MagFilter,
}

impl Default for Sampler {
  fn default() -> Self {
    Sampler {
      wrap_r: Wrap::ClampToEdge,
      wrap_s: Wrap::ClampToEdge,
      wrap_t: Wrap::ClampToEdge,
      min_filter: MinFilter::NearestMipmapLinear,
      mag_filter: MagFilter::Linear,
    }
  }
}

/// A decoded image: raw texels plus the dimensions the decoder reported.
///
/// Used for unsized uploads, where the mip itself doesn't know its
/// dimensions and the source supplies them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageSource {
  pub width: u32,
  pub height: u32,
  pub texels: Vec<u8>,
}

/// Where a mip's pixel data comes from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TexelSource {
  /// Raw texels; dimensions come from the mip.
  Raw(Vec<u8>),
  /// A decoded image carrying its own dimensions.
  Image(ImageSource),
}

impl TexelSource {
  fn bytes(&self) -> &[u8] {
    match self {
      TexelSource::Raw(bytes) => bytes,
      TexelSource::Image(image) => &image.texels,
    }
  }
}

/// Errors that can happen around textures.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum TextureError {
  /// The driver refused to allocate the texture object.
  #[error("cannot create texture")]
  CreationFailed,

  /// The number of mipmaps doesn't match the target's face count.
  #[error("{target:?} textures have {expected} face(s), got {got}")]
  WrongFaceCount {
    target: TextureTarget,
    expected: usize,
    got: usize,
  },

  /// A mip's source holds fewer bytes than its dimensions require.
  #[error("not enough texels: expected at least {expected} bytes, provided {provided}")]
  NotEnoughTexels { expected: usize, provided: usize },
}

/// Pick the largest unpacking alignment that evenly divides a row of texels,
/// to minimize padding.
fn probe_alignment(row_bytes: usize) -> u8 {
  [8u8, 4, 2, 1]
    .into_iter()
    .find(|&a| row_bytes % a as usize == 0)
    .unwrap_or(1)
}

/// One detail level of one texture face.
///
/// State machine: starts *dirty*; goes *clean* only after a successful upload
/// for its (texture, target, level) triple; goes back to *dirty* whenever the
/// source, format or any dimension is reassigned.
#[derive(Clone, Debug, PartialEq)]
pub struct Mip {
  texels: Option<TexelSource>,
  format: PixelFormat,
  size: [Option<u32>; 3],
  dirty: bool,
  alignment: Option<u8>,
}

impl Mip {
  /// A two-dimensional mip; depth is fixed to 1.
  pub fn new(format: PixelFormat, width: Option<u32>, height: Option<u32>) -> Self {
    Mip {
      texels: None,
      format,
      size: [width, height, Some(1)],
      dirty: true,
      alignment: None,
    }
  }

  /// A volumetric mip.
  pub fn new_3d(
    format: PixelFormat,
    width: Option<u32>,
    height: Option<u32>,
    depth: Option<u32>,
  ) -> Self {
    Mip {
      texels: None,
      format,
      size: [width, height, depth],
      dirty: true,
      alignment: None,
    }
  }

  /// A two-dimensional mip with raw texels attached.
  pub fn with_texels(format: PixelFormat, width: u32, height: u32, texels: Vec<u8>) -> Self {
    let mut mip = Mip::new(format, Some(width), Some(height));
    mip.texels = Some(TexelSource::Raw(texels));
    mip
  }

  pub fn format(&self) -> PixelFormat {
    self.format
  }

  pub fn width(&self) -> Option<u32> {
    self.size[0]
  }

  pub fn height(&self) -> Option<u32> {
    self.size[1]
  }

  pub fn depth(&self) -> Option<u32> {
    self.size[2]
  }

  pub fn size(&self) -> [Option<u32>; 3] {
    self.size
  }

  pub fn texels(&self) -> Option<&TexelSource> {
    self.texels.as_ref()
  }

  pub fn is_dirty(&self) -> bool {
    self.dirty
  }

  /// Reassign the pixel-data source. Dirties the mip.
  pub fn set_texels(&mut self, texels: Option<TexelSource>) {
    self.texels = texels;
    self.dirty = true;
  }

  /// Reassign the pixel format. Dirties the mip.
  pub fn set_format(&mut self, format: PixelFormat) {
    self.format = format;
    self.dirty = true;
  }

  /// Reassign the dimensions. Dirties the mip.
  pub fn set_size(&mut self, size: [Option<u32>; 3]) {
    self.size = size;
    self.dirty = true;
  }

  /// Override the unpacking alignment instead of probing for it.
  pub fn set_alignment(&mut self, alignment: Option<u8>) {
    self.alignment = alignment;
    self.dirty = true;
  }

  fn known_size(&self) -> Option<[u32; 3]> {
    match self.size {
      [Some(w), Some(h), Some(d)] => Some([w, h, d]),
      _ => None,
    }
  }

  /// Push this mip to the driver, assuming its texture is bound on `target`.
  ///
  /// Returns whether an upload actually happened. A mip without a source, or
  /// a raw source with unknown dimensions, has nothing to push and stays
  /// dirty.
  fn upload<D>(
    &mut self,
    state: &mut GraphicsState<D>,
    target: TextureTarget,
    face: u32,
    level: u32,
  ) -> Result<bool, TextureError>
  where
    D: Driver,
  {
    let texels = match &self.texels {
      Some(texels) => texels,
      None => return Ok(false),
    };

    match self.known_size() {
      Some([width, height, depth]) => {
        let bytes = texels.bytes();
        let expected =
          width as usize * height as usize * depth as usize * self.format.bytes_len();

        if bytes.len() < expected {
          // potential out-of-bounds read driver-side; abort
          return Err(TextureError::NotEnoughTexels {
            expected,
            provided: bytes.len(),
          });
        }

        match self.alignment {
          Some(alignment) => state.driver.unpack_alignment(alignment),
          None if width > 1 => {
            let row_bytes = width as usize * self.format.bytes_len();
            state.driver.unpack_alignment(probe_alignment(row_bytes));
          }
          None => (),
        }

        trace!(
          "uploading {}x{}x{} mip (face {}, level {})",
          width,
          height,
          depth,
          face,
          level
        );

        if target.has_depth() {
          state
            .driver
            .tex_image_3d(target, level, self.format, width, height, depth, bytes);
        } else {
          state
            .driver
            .tex_image_2d(target, face, level, self.format, width, height, bytes);
        }

        self.dirty = false;
        Ok(true)
      }

      None => match texels {
        // the source knows its own dimensions; let the driver size the level
        TexelSource::Image(image) => {
          trace!("uploading unsized mip (face {}, level {})", face, level);
          state
            .driver
            .tex_image_from_source(target, face, level, self.format, image);

          self.dirty = false;
          Ok(true)
        }

        // raw texels with unknown dimensions cannot be sized by anyone
        TexelSource::Raw(_) => Ok(false),
      },
    }
  }
}

/// The ordered detail levels of one texture face; index is the level of
/// detail, level 0 the most detailed.
#[derive(Clone, Debug, PartialEq)]
pub struct Mipmap {
  levels: Vec<Option<Mip>>,
}

impl Mipmap {
  /// A mipmap with only its base level populated.
  pub fn new(base: Mip) -> Self {
    Mipmap {
      levels: vec![Some(base)],
    }
  }

  /// Set the mip at a given level of detail, growing the collection as
  /// needed. Intermediate levels left unset keep the mipmap incomplete.
  pub fn set_level(&mut self, lod: usize, mip: Mip) {
    if lod >= self.levels.len() {
      self.levels.resize(lod + 1, None);
    }

    self.levels[lod] = Some(mip);
  }

  pub fn level(&self, lod: usize) -> Option<&Mip> {
    self.levels.get(lod).and_then(|l| l.as_ref())
  }

  pub fn level_mut(&mut self, lod: usize) -> Option<&mut Mip> {
    self.levels.get_mut(lod).and_then(|l| l.as_mut())
  }

  /// The base level. Always present: a mipmap is created around one and
  /// levels are never removed.
  pub fn base(&self) -> &Mip {
    self.levels[0].as_ref().unwrap()
  }

  pub fn base_mut(&mut self) -> &mut Mip {
    self.levels[0].as_mut().unwrap()
  }

  /// Number of level slots, populated or not.
  pub fn len(&self) -> usize {
    self.levels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.levels.is_empty()
  }

  /// Whether this face is *texture complete*: the base level has fully known
  /// dimensions and every halving step down to 1x1x1 lands on an existing
  /// level with exactly the halved dimensions.
  pub fn is_complete(&self) -> bool {
    let mut dims = match self.level(0).and_then(Mip::known_size) {
      Some(dims) => dims,
      None => return false,
    };

    let mut lod = 0;

    while dims.iter().any(|&d| d > 1) {
      dims = dims.map(|d| (d / 2).max(1));
      lod += 1;

      match self.level(lod) {
        Some(mip) if mip.known_size() == Some(dims) => (),
        _ => return false,
      }
    }

    true
  }

  /// Upload every dirty level, in ascending level-of-detail order, assuming
  /// the owning texture is bound on `target`. Returns whether any upload
  /// happened, so the caller can decide whether derived levels need to be
  /// regenerated.
  pub(crate) fn update<D>(
    &mut self,
    state: &mut GraphicsState<D>,
    target: TextureTarget,
    face: u32,
  ) -> Result<bool, TextureError>
  where
    D: Driver,
  {
    let mut uploaded = false;

    for (lod, level) in self.levels.iter_mut().enumerate() {
      if let Some(mip) = level {
        if mip.dirty {
          uploaded |= mip.upload(state, target, face, lod as u32)?;
        }
      }
    }

    Ok(uploaded)
  }
}

/// A GPU texture: one mipmap per face, a sampler, and a lazily assigned
/// texture unit.
pub struct Texture<D>
where
  D: Driver,
{
  handle: D::TextureHandle,
  target: TextureTarget,
  sampler: Sampler,
  faces: RefCell<Vec<Mipmap>>,
  unit: Cell<Option<u32>>,
  generated_mipmaps: Cell<bool>,
  state: Rc<RefCell<GraphicsState<D>>>,
}

impl<D> std::fmt::Debug for Texture<D>
where
  D: Driver,
{
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Texture")
      .field("target", &self.target)
      .field("sampler", &self.sampler)
      .finish_non_exhaustive()
  }
}

impl<D> Texture<D>
where
  D: Driver,
{
  /// Create a texture from one mipmap per face (six for cube maps, one
  /// otherwise). Nothing is uploaded here; the mips stay dirty until the
  /// first [`update`](Texture::update) or sampler use.
  pub fn new(
    ctx: &Context<D>,
    target: TextureTarget,
    sampler: Sampler,
    faces: Vec<Mipmap>,
  ) -> Result<Self, TextureError> {
    let expected = target.face_count();

    if faces.len() != expected {
      return Err(TextureError::WrongFaceCount {
        target,
        expected,
        got: faces.len(),
      });
    }

    let mut state = ctx.state.borrow_mut();
    let handle = state
      .driver
      .create_texture()
      .ok_or(TextureError::CreationFailed)?;

    state.bind_texture(target, Some(&handle));
    state.driver.tex_sampler(target, &sampler);

    debug!("created {:?} texture with {} face(s)", target, expected);

    Ok(Texture {
      handle,
      target,
      sampler,
      faces: RefCell::new(faces),
      unit: Cell::new(None),
      generated_mipmaps: Cell::new(false),
      state: ctx.state.clone(),
    })
  }

  /// Convenience for single-face targets: a texture from one base mip.
  pub fn with_base(
    ctx: &Context<D>,
    target: TextureTarget,
    sampler: Sampler,
    base: Mip,
  ) -> Result<Self, TextureError> {
    Texture::new(ctx, target, sampler, vec![Mipmap::new(base)])
  }

  pub fn target(&self) -> TextureTarget {
    self.target
  }

  pub fn sampler(&self) -> &Sampler {
    &self.sampler
  }

  /// The mipmap of the first (for most targets, only) face.
  pub fn mipmap(&self) -> Ref<Mipmap> {
    Ref::map(self.faces.borrow(), |faces| &faces[0])
  }

  /// Mutable access to the first face's mipmap. Mutations dirty the touched
  /// mips; the next update pushes them.
  pub fn mipmap_mut(&self) -> RefMut<Mipmap> {
    RefMut::map(self.faces.borrow_mut(), |faces| &mut faces[0])
  }

  /// All faces, in face order.
  pub fn faces_mut(&self) -> RefMut<[Mipmap]> {
    RefMut::map(self.faces.borrow_mut(), |faces| faces.as_mut_slice())
  }

  /// Whether every face is texture complete.
  pub fn is_complete(&self) -> bool {
    self.faces.borrow().iter().all(Mipmap::is_complete)
  }

  /// Bind this texture and push every dirty mip of every face. Returns
  /// whether any upload happened.
  pub fn update(&self) -> Result<bool, TextureError> {
    let mut state = self.state.borrow_mut();
    state.bind_texture(self.target, Some(&self.handle));
    self.update_faces(&mut state)
  }

  fn update_faces(&self, state: &mut GraphicsState<D>) -> Result<bool, TextureError> {
    let mut faces = self.faces.borrow_mut();
    let mut uploaded = false;

    for (face, mipmap) in faces.iter_mut().enumerate() {
      uploaded |= mipmap.update(state, self.target, face as u32)?;
    }

    Ok(uploaded)
  }

  /// Make this texture sampleable: assign it a unit (once), bind it there,
  /// push dirty content, and fall back to driver-side mipmap generation if a
  /// mip-sampling filter would read levels we cannot provide. Returns the
  /// unit.
  pub(crate) fn prepare(&self, state: &mut GraphicsState<D>) -> Result<u32, TextureError> {
    let unit = match self.unit.get() {
      Some(unit) => unit,
      None => {
        let unit = state.allocate_texture_unit();
        self.unit.set(Some(unit));
        unit
      }
    };

    state.set_texture_unit(unit);
    state.bind_texture(self.target, Some(&self.handle));

    let uploaded = self.update_faces(state)?;

    if self.sampler.min_filter.requires_mipmaps()
      && !self.faces.borrow().iter().all(Mipmap::is_complete)
      && (uploaded || !self.generated_mipmaps.get())
    {
      trace!("generating mipmaps for incomplete {:?} texture", self.target);
      state.driver.generate_mipmap(self.target);
      self.generated_mipmaps.set(true);
    }

    Ok(unit)
  }
}

impl<D> Drop for Texture<D>
where
  D: Driver,
{
  fn drop(&mut self) {
    let mut state = self.state.borrow_mut();

    if let Some(unit) = self.unit.get() {
      state.release_texture_unit(unit);
    }

    state.forget_texture(&self.handle);
    state.driver.delete_texture(&self.handle);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sized_mip(w: u32, h: u32) -> Mip {
    Mip::new(PixelFormat::RGBA8, Some(w), Some(h))
  }

  #[test]
  fn base_only_mipmap_is_incomplete() {
    let mipmap = Mipmap::new(sized_mip(64, 64));
    assert!(!mipmap.is_complete());
  }

  #[test]
  fn full_chain_is_complete() {
    let mut mipmap = Mipmap::new(sized_mip(64, 64));

    for (lod, side) in [32, 16, 8, 4, 2, 1].into_iter().enumerate() {
      mipmap.set_level(lod + 1, sized_mip(side, side));
    }

    assert!(mipmap.is_complete());
  }

  #[test]
  fn mismatched_level_breaks_completeness() {
    let mut mipmap = Mipmap::new(sized_mip(64, 64));

    mipmap.set_level(1, sized_mip(15, 15)); // should be 32x32
    for (lod, side) in [16, 8, 4, 2, 1].into_iter().enumerate() {
      mipmap.set_level(lod + 2, sized_mip(side, side));
    }

    assert!(!mipmap.is_complete());
  }

  #[test]
  fn missing_intermediate_level_breaks_completeness() {
    let mut mipmap = Mipmap::new(sized_mip(8, 8));

    mipmap.set_level(1, sized_mip(4, 4));
    // level 2 (2x2) left unset
    mipmap.set_level(3, sized_mip(1, 1));

    assert!(!mipmap.is_complete());
  }

  #[test]
  fn rectangular_chain_floors_each_dimension() {
    let mut mipmap = Mipmap::new(sized_mip(8, 2));

    mipmap.set_level(1, sized_mip(4, 1));
    mipmap.set_level(2, sized_mip(2, 1));
    mipmap.set_level(3, sized_mip(1, 1));

    assert!(mipmap.is_complete());
  }

  #[test]
  fn unknown_dimension_is_never_complete() {
    let mipmap = Mipmap::new(Mip::new(PixelFormat::RGBA8, Some(1), None));
    assert!(!mipmap.is_complete());

    let mipmap = Mipmap::new(sized_mip(1, 1));
    assert!(mipmap.is_complete());
  }

  #[test]
  fn mutation_dirties_a_mip() {
    let mut mip = sized_mip(4, 4);
    assert!(mip.is_dirty());

    mip.dirty = false;
    mip.set_texels(Some(TexelSource::Raw(vec![0; 64])));
    assert!(mip.is_dirty());

    mip.dirty = false;
    mip.set_size([Some(2), Some(2), Some(1)]);
    assert!(mip.is_dirty());

    mip.dirty = false;
    mip.set_format(PixelFormat::R8);
    assert!(mip.is_dirty());
  }

  #[test]
  fn alignment_probe_picks_largest_divisor() {
    assert_eq!(probe_alignment(16), 8);
    assert_eq!(probe_alignment(12), 4);
    assert_eq!(probe_alignment(6), 2);
    assert_eq!(probe_alignment(5), 1);
  }

  #[test]
  fn mip_sampling_filters() {
    assert!(!MinFilter::Nearest.requires_mipmaps());
    assert!(!MinFilter::Linear.requires_mipmaps());
    assert!(MinFilter::NearestMipmapLinear.requires_mipmaps());
    assert!(MinFilter::LinearMipmapNearest.requires_mipmaps());
  }
}
