//! # Compact PNG encoder and decoder
//!
//! Encoding and decoding is all in one pass, over in-memory byte buffers;
//! this crate never touches the filesystem. Interlaced images are not
//! supported. Beyond the codec itself, [`Image`] offers conversion into an
//! opinionated set of destination formats: 24-bit RGB, 32-bit RGBA and
//! 8-bit grayscale.
//!
//! Auxiliary chunks (palette, transparency, anything unrecognized) survive
//! a decode/encode round trip verbatim. Per-chunk CRCs are written on
//! encode but not verified on decode, for tolerance of foreign encoders.
//!
//! Typical usage, decode and require RGBA:
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("sprite.png")?;
//! let mut image = micropng::decode(&bytes)?;
//! image.force_to_truecolor(Some(true))?;
//! // image.pixels() is now w*h*4 bytes of RGBA.
//! # Ok(()) }
//! ```
//!
//! And a round trip:
//!
//! ```
//! use micropng::{decode, encode, BitDepth, ColorType, Image};
//!
//! # fn main() -> Result<(), micropng::Error> {
//! let mut image = Image::new();
//! image.realloc(2, 1, BitDepth::Eight, ColorType::Truecolor)?;
//! image.pixels_mut().copy_from_slice(&[255, 0, 0, 0, 0, 255]);
//!
//! let bytes = encode(&image)?;
//! let decoded = decode(&bytes)?;
//! assert_eq!(decoded.pixels(), image.pixels());
//! # Ok(()) }
//! ```

#![deny(unsafe_code)]

pub mod chunk;
mod common;
mod decoder;
mod encoder;
mod error;
mod filter;
mod image;
mod samples;

pub use chunk::{Chunk, ChunkType};
pub use common::{BitDepth, ColorType, Compression, SIGNATURE};
pub use decoder::decode;
pub use encoder::{encode, encode_with};
pub use error::{Error, Unsupported};
pub use filter::{FilterStrategy, RowFilter};
pub use image::Image;
