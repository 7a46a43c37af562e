//! Common types shared between the encoder and decoder.

/// First eight bytes of every container stream.
pub const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Pixel composition of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ColorType {
    #[default]
    Grayscale = 0,
    Truecolor = 2,
    Indexed = 3,
    GrayscaleAlpha = 4,
    TruecolorAlpha = 6,
}

impl ColorType {
    /// Returns the number of channels per pixel of this color type.
    pub fn channels(self) -> usize {
        use self::ColorType::*;
        match self {
            Grayscale | Indexed => 1,
            GrayscaleAlpha => 2,
            Truecolor => 3,
            TruecolorAlpha => 4,
        }
    }

    /// True if the color type carries an alpha channel.
    pub fn has_alpha(self) -> bool {
        matches!(self, ColorType::GrayscaleAlpha | ColorType::TruecolorAlpha)
    }

    /// True if `depth` is legal for this color type.
    ///
    /// Grayscale accepts every depth, indexed everything below 16, and the
    /// multichannel types only whole-byte depths.
    pub fn allows(self, depth: BitDepth) -> bool {
        use self::ColorType::*;
        match self {
            Grayscale => true,
            Indexed => depth != BitDepth::Sixteen,
            Truecolor | GrayscaleAlpha | TruecolorAlpha => {
                matches!(depth, BitDepth::Eight | BitDepth::Sixteen)
            }
        }
    }

    pub fn from_u8(n: u8) -> Option<ColorType> {
        match n {
            0 => Some(ColorType::Grayscale),
            2 => Some(ColorType::Truecolor),
            3 => Some(ColorType::Indexed),
            4 => Some(ColorType::GrayscaleAlpha),
            6 => Some(ColorType::TruecolorAlpha),
            _ => None,
        }
    }
}

/// Bits per channel sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BitDepth {
    One = 1,
    Two = 2,
    Four = 4,
    #[default]
    Eight = 8,
    Sixteen = 16,
}

impl BitDepth {
    pub fn from_u8(n: u8) -> Option<BitDepth> {
        match n {
            1 => Some(BitDepth::One),
            2 => Some(BitDepth::Two),
            4 => Some(BitDepth::Four),
            8 => Some(BitDepth::Eight),
            16 => Some(BitDepth::Sixteen),
            _ => None,
        }
    }
}

/// Compression level handed to the deflate stream when encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    Fast,
    Balanced,
    #[default]
    Best,
}

impl Compression {
    pub(crate) fn to_flate2(self) -> flate2::Compression {
        match self {
            Compression::Fast => flate2::Compression::fast(),
            Compression::Balanced => flate2::Compression::default(),
            Compression::Best => flate2::Compression::best(),
        }
    }
}

/// Byte length of one encoded pixel row, rounded up to a whole byte.
///
/// `None` when the computation overflows.
pub(crate) fn checked_stride(width: u32, color_type: ColorType, depth: BitDepth) -> Option<usize> {
    let bits = (width as usize)
        .checked_mul(color_type.channels())?
        .checked_mul(depth as usize)?;
    Some(bits.checked_add(7)? >> 3)
}

/// Bytes per whole pixel, the reference distance for "left" in row filters.
pub(crate) fn bytes_per_pixel(color_type: ColorType, depth: BitDepth) -> usize {
    (color_type.channels() * depth as usize + 7) >> 3
}
