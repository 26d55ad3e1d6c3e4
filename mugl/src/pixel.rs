//! Pixel formats.
//!
//! A trimmed-down format description: enough to know how many bytes one texel
//! occupies, which is what row alignment probing and upload size checks need.

/// Bit depth of a single channel.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Size {
  Eight,
  Sixteen,
  ThirtyTwo,
}

impl Size {
  pub fn bytes_len(self) -> usize {
    match self {
      Size::Eight => 1,
      Size::Sixteen => 2,
      Size::ThirtyTwo => 4,
    }
  }
}

/// Channel layout of a pixel.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Format {
  /// Red-only.
  R(Size),
  /// Red and green.
  RG(Size, Size),
  /// Red, green and blue.
  RGB(Size, Size, Size),
  /// Red, green, blue and alpha.
  RGBA(Size, Size, Size, Size),
  /// Depth.
  Depth(Size),
}

impl Format {
  /// Number of bytes a single pixel occupies in this format.
  pub fn bytes_len(self) -> usize {
    match self {
      Format::R(r) => r.bytes_len(),
      Format::RG(r, g) => r.bytes_len() + g.bytes_len(),
      Format::RGB(r, g, b) => r.bytes_len() + g.bytes_len() + b.bytes_len(),
      Format::RGBA(r, g, b, a) => r.bytes_len() + g.bytes_len() + b.bytes_len() + a.bytes_len(),
      Format::Depth(d) => d.bytes_len(),
    }
  }

  /// Number of channels.
  pub fn channels_len(self) -> usize {
    match self {
      Format::R(..) | Format::Depth(..) => 1,
      Format::RG(..) => 2,
      Format::RGB(..) => 3,
      Format::RGBA(..) => 4,
    }
  }
}

/// How channel values are to be interpreted.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Type {
  /// Normalized signed integral.
  NormIntegral,
  /// Normalized unsigned integral.
  NormUnsigned,
  /// Signed integral.
  Integral,
  /// Unsigned integral.
  Unsigned,
  /// Floating-point.
  Floating,
}

/// A full pixel format: channel layout plus interpretation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PixelFormat {
  pub format: Format,
  pub encoding: Type,
}

impl PixelFormat {
  /// 8-bit normalized RGBA, the everyday color format.
  pub const RGBA8: Self = PixelFormat {
    format: Format::RGBA(Size::Eight, Size::Eight, Size::Eight, Size::Eight),
    encoding: Type::NormUnsigned,
  };

  /// 8-bit normalized RGB.
  pub const RGB8: Self = PixelFormat {
    format: Format::RGB(Size::Eight, Size::Eight, Size::Eight),
    encoding: Type::NormUnsigned,
  };

  /// 8-bit normalized single channel.
  pub const R8: Self = PixelFormat {
    format: Format::R(Size::Eight),
    encoding: Type::NormUnsigned,
  };

  /// 16-bit normalized single channel.
  pub const R16: Self = PixelFormat {
    format: Format::R(Size::Sixteen),
    encoding: Type::NormUnsigned,
  };

  /// 32-bit floating-point RGBA.
  pub const RGBA32F: Self = PixelFormat {
    format: Format::RGBA(
      Size::ThirtyTwo,
      Size::ThirtyTwo,
      Size::ThirtyTwo,
      Size::ThirtyTwo,
    ),
    encoding: Type::Floating,
  };

  /// 32-bit depth.
  pub const DEPTH32: Self = PixelFormat {
    format: Format::Depth(Size::ThirtyTwo),
    encoding: Type::Floating,
  };

  /// Number of bytes a single pixel occupies.
  pub fn bytes_len(self) -> usize {
    self.format.bytes_len()
  }
}
