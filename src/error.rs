//! Error taxonomy shared by the decoder, encoder and image model.

use core::fmt;
use std::error;

/// The single failure type of this crate.
///
/// Every failure is fatal to the call in progress: a failed decode never
/// yields a partially built image, a failed encode never yields partial
/// output.
#[derive(Debug)]
pub enum Error {
    /// Bad signature, broken chunk framing, truncation, an invalid row
    /// filter tag, or a header chunk out of place.
    MalformedContainer(&'static str),
    /// The container is intact but uses a feature this crate rejects.
    UnsupportedFeature(Unsupported),
    /// A buffer size computation overflowed the address space.
    ResourceExhaustion,
    /// The external deflate engine reported failure.
    CompressionStream(String),
    /// Fewer rows were reconstructed than the header declared.
    IncompleteImage { declared: u32, produced: u32 },
}

/// Feature rejections, detailed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsupported {
    /// Interlaced pixel layouts are not decoded.
    Interlaced,
    CompressionMethod(u8),
    FilterMethod(u8),
    /// The (color type, bit depth) pair is outside the compatibility table.
    ColorDepth { color_type: u8, bit_depth: u8 },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MalformedContainer(what) => write!(f, "malformed container: {}", what),
            Error::UnsupportedFeature(what) => write!(f, "{}", what),
            Error::ResourceExhaustion => {
                write!(f, "image dimensions overflow the address space")
            }
            Error::CompressionStream(msg) => write!(f, "compression stream error: {}", msg),
            Error::IncompleteImage { declared, produced } => write!(
                f,
                "image data ended after {} of {} rows",
                produced, declared
            ),
        }
    }
}

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Unsupported::Interlaced => write!(f, "interlaced images are not supported"),
            Unsupported::CompressionMethod(n) => write!(f, "unknown compression method {}", n),
            Unsupported::FilterMethod(n) => write!(f, "unknown filter method {}", n),
            Unsupported::ColorDepth {
                color_type,
                bit_depth,
            } => write!(
                f,
                "invalid combination of color type {} and bit depth {}",
                color_type, bit_depth
            ),
        }
    }
}

impl error::Error for Error {}

impl From<flate2::DecompressError> for Error {
    fn from(err: flate2::DecompressError) -> Self {
        Error::CompressionStream(err.to_string())
    }
}

impl From<flate2::CompressError> for Error {
    fn from(err: flate2::CompressError) -> Self {
        Error::CompressionStream(err.to_string())
    }
}
