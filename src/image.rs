//! The in-memory image model and its color conversion cascades.

use core::fmt;

use log::warn;

use crate::chunk::{self, Chunk, ChunkType};
use crate::common::{bytes_per_pixel, checked_stride, BitDepth, ColorType};
use crate::error::{Error, Unsupported};
use crate::samples::SampleReader;

/// A decoded raster image plus its auxiliary chunks.
///
/// Owns a `stride * height` pixel buffer and an ordered list of auxiliary
/// [`Chunk`] records (palette, transparency, anything unrecognized),
/// preserved verbatim through a decode/encode round trip. Header fields
/// and buffer always agree; they are replaced together, never piecemeal.
#[derive(Clone, Default)]
pub struct Image {
    width: u32,
    height: u32,
    bit_depth: BitDepth,
    color_type: ColorType,
    stride: usize,
    pixels: Vec<u8>,
    chunks: Vec<Chunk>,
}

impl Image {
    /// An empty image: no pixels, no chunks. Populate with [`realloc`](Self::realloc).
    pub fn new() -> Image {
        Image::default()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    pub fn color_type(&self) -> ColorType {
        self.color_type
    }

    /// Bytes per pixel row.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The packed pixel buffer, `stride * height` bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub(crate) fn bytes_per_pixel(&self) -> usize {
        bytes_per_pixel(self.color_type, self.bit_depth)
    }

    /// Discard all content and reallocate for the given dimensions.
    ///
    /// The new buffer is zeroed. Prior pixels and chunks are dropped.
    /// Nothing changes on error.
    pub fn realloc(
        &mut self,
        width: u32,
        height: u32,
        bit_depth: BitDepth,
        color_type: ColorType,
    ) -> Result<(), Error> {
        if width == 0 || height == 0 {
            return Err(Error::MalformedContainer("zero image dimension"));
        }
        if !color_type.allows(bit_depth) {
            return Err(Error::UnsupportedFeature(Unsupported::ColorDepth {
                color_type: color_type as u8,
                bit_depth: bit_depth as u8,
            }));
        }
        let stride = checked_stride(width, color_type, bit_depth).ok_or(Error::ResourceExhaustion)?;
        let total = stride
            .checked_mul(height as usize)
            .ok_or(Error::ResourceExhaustion)?;
        self.pixels = vec![0; total];
        self.chunks.clear();
        self.width = width;
        self.height = height;
        self.bit_depth = bit_depth;
        self.color_type = color_type;
        self.stride = stride;
        Ok(())
    }

    /// Replace this image's pixel content and header with `src`'s, keeping
    /// this image's chunks except palette and transparency, which the
    /// conversion that built `src` has invalidated.
    pub fn handoff(&mut self, src: Image) {
        self.width = src.width;
        self.height = src.height;
        self.bit_depth = src.bit_depth;
        self.color_type = src.color_type;
        self.stride = src.stride;
        self.pixels = src.pixels;
        self.chunks
            .retain(|c| c.kind() != chunk::PLTE && c.kind() != chunk::tRNS);
    }

    /// Append an auxiliary chunk. The tag must be four printable bytes.
    pub fn add_chunk(&mut self, kind: ChunkType, data: Vec<u8>) -> Result<(), Error> {
        if !kind.is_valid() {
            return Err(Error::MalformedContainer("unprintable chunk type tag"));
        }
        self.chunks.push(Chunk::new(kind, data));
        Ok(())
    }

    /// The index-th stored chunk of the given type, if any.
    pub fn chunk(&self, kind: ChunkType, index: usize) -> Option<&Chunk> {
        self.chunks.iter().filter(|c| c.kind() == kind).nth(index)
    }

    /// All auxiliary chunks, in stored order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// True if the image can hold non-opaque pixels: either the color type
    /// has an alpha channel, or a structurally valid transparency chunk is
    /// present (non-empty for indexed images, one 16-bit field per channel
    /// otherwise).
    pub fn has_transparency(&self) -> bool {
        if self.color_type.has_alpha() {
            return true;
        }
        let trns = match self.chunk(chunk::tRNS, 0) {
            Some(trns) => trns.data(),
            None => return false,
        };
        if trns.is_empty() {
            return false;
        }
        if self.color_type == ColorType::Indexed {
            // One 1-byte alpha per palette entry; a short list is permitted.
            return true;
        }
        trns.len() == self.color_type.channels() * 2
    }

    /// Normalize to 8-bit truecolor, with or without an alpha channel.
    ///
    /// `Some(true)` forces alpha, `Some(false)` drops it, `None` keeps it
    /// when [`has_transparency`](Self::has_transparency) says the image can
    /// use it. Already-conforming images are left untouched.
    pub fn force_to_truecolor(&mut self, alpha: Option<bool>) -> Result<(), Error> {
        let want_alpha = alpha.unwrap_or_else(|| self.has_transparency());
        if want_alpha {
            match self.color_type {
                ColorType::TruecolorAlpha => {
                    if self.bit_depth == BitDepth::Sixteen {
                        self.narrow_16_to_8();
                    }
                    Ok(())
                }
                ColorType::Truecolor => self.to_rgba8_from_rgb(),
                ColorType::Grayscale | ColorType::GrayscaleAlpha => self.to_rgba8_from_gray(),
                ColorType::Indexed => self.to_rgba8_from_indexed(),
            }
        } else {
            match self.color_type {
                ColorType::Truecolor => {
                    if self.bit_depth == BitDepth::Sixteen {
                        self.narrow_16_to_8();
                    }
                    Ok(())
                }
                ColorType::TruecolorAlpha => {
                    self.strip_alpha_in_place();
                    Ok(())
                }
                ColorType::Grayscale | ColorType::GrayscaleAlpha => self.to_rgb8_from_gray(),
                ColorType::Indexed => self.to_rgb8_from_indexed(),
            }
        }
    }

    /// Collapse to 8-bit plain grayscale, dropping alpha.
    pub fn force_to_gray(&mut self) -> Result<(), Error> {
        match self.color_type {
            ColorType::Grayscale => match self.bit_depth {
                BitDepth::Eight => Ok(()),
                BitDepth::Sixteen => {
                    self.narrow_16_to_8();
                    Ok(())
                }
                _ => self.to_gray8_from_gray(),
            },
            ColorType::GrayscaleAlpha => self.to_gray8_from_gray(),
            ColorType::Indexed => self.to_gray8_from_indexed(),
            ColorType::Truecolor | ColorType::TruecolorAlpha => self.to_gray8_from_rgb(),
        }
    }

    /// Drop every other byte, turning 16-bit channels into their high
    /// bytes. Color type is unchanged; rows stay packed because both
    /// depths are whole-byte.
    fn narrow_16_to_8(&mut self) {
        let fields = self.width as usize * self.height as usize * self.color_type.channels();
        for i in 0..fields {
            self.pixels[i] = self.pixels[2 * i];
        }
        self.pixels.truncate(fields);
        self.bit_depth = BitDepth::Eight;
        self.stride /= 2;
    }

    /// Truecolor+alpha (8 or 16 bit) to 8-bit truecolor, compacting the
    /// buffer in place.
    fn strip_alpha_in_place(&mut self) {
        let pixelc = self.width as usize * self.height as usize;
        if self.bit_depth == BitDepth::Eight {
            for i in 0..pixelc {
                let (dst, src) = (i * 3, i * 4);
                self.pixels[dst] = self.pixels[src];
                self.pixels[dst + 1] = self.pixels[src + 1];
                self.pixels[dst + 2] = self.pixels[src + 2];
            }
        } else {
            for i in 0..pixelc {
                let (dst, src) = (i * 3, i * 8);
                self.pixels[dst] = self.pixels[src];
                self.pixels[dst + 1] = self.pixels[src + 2];
                self.pixels[dst + 2] = self.pixels[src + 4];
            }
        }
        self.pixels.truncate(pixelc * 3);
        self.bit_depth = BitDepth::Eight;
        self.color_type = ColorType::Truecolor;
        self.stride = self.width as usize * 3;
    }

    /// The stored palette when it holds at least one color.
    fn palette(&self) -> Option<Vec<u8>> {
        let plte = self.chunk(chunk::PLTE, 0)?;
        if plte.data().len() < 3 {
            return None;
        }
        Some(plte.data().to_vec())
    }

    /// The RGB color key from a tRNS chunk: exactly three 16-bit fields.
    fn rgb_color_key(&self) -> Option<[u16; 3]> {
        let trns = self.chunk(chunk::tRNS, 0)?;
        let data = trns.data();
        if data.len() != 6 {
            warn!(
                "ignoring transparency chunk of {} bytes on a truecolor image",
                data.len()
            );
            return None;
        }
        Some([
            u16::from_be_bytes([data[0], data[1]]),
            u16::from_be_bytes([data[2], data[3]]),
            u16::from_be_bytes([data[4], data[5]]),
        ])
    }

    /// The grayscale color key, recognized for plain gray only: one 16-bit
    /// field, compared against raw samples at the source depth.
    fn gray_color_key(&self) -> Option<u16> {
        if self.color_type != ColorType::Grayscale {
            return None;
        }
        let trns = self.chunk(chunk::tRNS, 0)?;
        let data = trns.data();
        if data.len() != 2 {
            warn!(
                "ignoring transparency chunk of {} bytes on a grayscale image",
                data.len()
            );
            return None;
        }
        Some(u16::from_be_bytes([data[0], data[1]]))
    }

    fn to_rgb8_from_gray(&mut self) -> Result<(), Error> {
        let mut dst = Image::new();
        dst.realloc(self.width, self.height, BitDepth::Eight, ColorType::Truecolor)?;
        let skip_alpha = self.color_type == ColorType::GrayscaleAlpha;
        let mut src = SampleReader::new(self, true);
        for px in dst.pixels.chunks_exact_mut(3) {
            let luma = src.read() as u8;
            if skip_alpha {
                src.read();
            }
            px[0] = luma;
            px[1] = luma;
            px[2] = luma;
        }
        self.handoff(dst);
        Ok(())
    }

    fn to_rgb8_from_indexed(&mut self) -> Result<(), Error> {
        // A missing or empty palette is a violation; degrade to grayscale.
        let plte = match self.palette() {
            Some(plte) => plte,
            None => return self.to_rgb8_from_gray(),
        };
        let pltec = plte.len() / 3;
        let mut dst = Image::new();
        dst.realloc(self.width, self.height, BitDepth::Eight, ColorType::Truecolor)?;
        let mut src = SampleReader::new(self, false);
        for px in dst.pixels.chunks_exact_mut(3) {
            // An index past the palette is an error by the letter of the
            // format; tolerated here by wrapping around the table.
            let index = (src.read() as usize % pltec) * 3;
            px.copy_from_slice(&plte[index..index + 3]);
        }
        self.handoff(dst);
        Ok(())
    }

    fn to_rgba8_from_rgb(&mut self) -> Result<(), Error> {
        let mut dst = Image::new();
        dst.realloc(
            self.width,
            self.height,
            BitDepth::Eight,
            ColorType::TruecolorAlpha,
        )?;
        let color_key = self.rgb_color_key();
        let narrow = self.bit_depth == BitDepth::Sixteen;
        let mut src = SampleReader::new(self, false);
        for px in dst.pixels.chunks_exact_mut(4) {
            let r = src.read();
            let g = src.read();
            let b = src.read();
            if color_key == Some([r, g, b]) {
                px.copy_from_slice(&[0, 0, 0, 0]);
            } else if narrow {
                px.copy_from_slice(&[(r >> 8) as u8, (g >> 8) as u8, (b >> 8) as u8, 0xff]);
            } else {
                px.copy_from_slice(&[r as u8, g as u8, b as u8, 0xff]);
            }
        }
        self.handoff(dst);
        Ok(())
    }

    fn to_rgba8_from_gray(&mut self) -> Result<(), Error> {
        let mut dst = Image::new();
        dst.realloc(
            self.width,
            self.height,
            BitDepth::Eight,
            ColorType::TruecolorAlpha,
        )?;
        let color_key = self.gray_color_key();
        let has_alpha = self.color_type == ColorType::GrayscaleAlpha;
        let depth = self.bit_depth;
        // With a color key, samples are read raw so they compare at the
        // source depth; lumas then normalize by hand below.
        let mut src = SampleReader::new(self, color_key.is_none());
        for px in dst.pixels.chunks_exact_mut(4) {
            let mut luma = src.read();
            let mut alpha = 0xff;
            if let Some(key) = color_key {
                if luma == key {
                    luma = 0;
                    alpha = 0;
                } else {
                    luma = match depth {
                        BitDepth::One => {
                            if luma != 0 {
                                0xff
                            } else {
                                0
                            }
                        }
                        BitDepth::Two => luma * 0x55,
                        BitDepth::Four => luma | (luma << 4),
                        BitDepth::Eight => luma,
                        BitDepth::Sixteen => luma >> 8,
                    };
                }
            } else if has_alpha {
                alpha = src.read() as u8;
            }
            px.copy_from_slice(&[luma as u8, luma as u8, luma as u8, alpha]);
        }
        self.handoff(dst);
        Ok(())
    }

    fn to_rgba8_from_indexed(&mut self) -> Result<(), Error> {
        let plte = match self.palette() {
            Some(plte) => plte,
            None => return self.to_rgba8_from_gray(),
        };
        let pltec = plte.len() / 3;
        let trns = self
            .chunk(chunk::tRNS, 0)
            .map(|c| c.data().to_vec())
            .unwrap_or_default();
        let mut dst = Image::new();
        dst.realloc(
            self.width,
            self.height,
            BitDepth::Eight,
            ColorType::TruecolorAlpha,
        )?;
        let mut src = SampleReader::new(self, false);
        for px in dst.pixels.chunks_exact_mut(4) {
            let raw = src.read() as usize;
            // Alphas run parallel to the palette; entries past the end of
            // tRNS are opaque.
            let alpha = trns.get(raw).copied().unwrap_or(0xff);
            let index = (raw % pltec) * 3;
            px[..3].copy_from_slice(&plte[index..index + 3]);
            px[3] = alpha;
        }
        self.handoff(dst);
        Ok(())
    }

    fn to_gray8_from_gray(&mut self) -> Result<(), Error> {
        let mut dst = Image::new();
        dst.realloc(self.width, self.height, BitDepth::Eight, ColorType::Grayscale)?;
        let skip_alpha = self.color_type == ColorType::GrayscaleAlpha;
        let mut src = SampleReader::new(self, true);
        for out in dst.pixels.iter_mut() {
            *out = src.read() as u8;
            if skip_alpha {
                src.read();
            }
        }
        self.handoff(dst);
        Ok(())
    }

    fn to_gray8_from_rgb(&mut self) -> Result<(), Error> {
        let mut dst = Image::new();
        dst.realloc(self.width, self.height, BitDepth::Eight, ColorType::Grayscale)?;
        let skip_alpha = self.color_type == ColorType::TruecolorAlpha;
        let mut src = SampleReader::new(self, true);
        for out in dst.pixels.iter_mut() {
            let r = src.read() as u32;
            let g = src.read() as u32;
            let b = src.read() as u32;
            if skip_alpha {
                src.read();
            }
            *out = ((r + g + b) / 3) as u8;
        }
        self.handoff(dst);
        Ok(())
    }

    fn to_gray8_from_indexed(&mut self) -> Result<(), Error> {
        let plte = match self.palette() {
            Some(plte) => plte,
            None => return self.to_gray8_from_gray(),
        };
        // Convert the color table once up front. Entries past the palette
        // read as black.
        let mut table = [0u8; 256];
        for (luma, rgb) in table.iter_mut().zip(plte.chunks_exact(3)) {
            *luma = ((rgb[0] as u32 + rgb[1] as u32 + rgb[2] as u32) / 3) as u8;
        }
        let mut dst = Image::new();
        dst.realloc(self.width, self.height, BitDepth::Eight, ColorType::Grayscale)?;
        let mut src = SampleReader::new(self, false);
        for out in dst.pixels.iter_mut() {
            *out = table[src.read() as usize & 0xff];
        }
        self.handoff(dst);
        Ok(())
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bit_depth", &self.bit_depth)
            .field("color_type", &self.color_type)
            .field("stride", &self.stride)
            .field("chunks", &self.chunks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realloc_validates_the_compatibility_table() {
        let mut img = Image::new();
        assert!(img
            .realloc(4, 4, BitDepth::Sixteen, ColorType::Indexed)
            .is_err());
        assert!(img
            .realloc(4, 4, BitDepth::Four, ColorType::Truecolor)
            .is_err());
        assert!(img.realloc(0, 4, BitDepth::Eight, ColorType::Grayscale).is_err());
        assert!(img.realloc(4, 0, BitDepth::Eight, ColorType::Grayscale).is_err());
        // Nothing changed on error.
        assert_eq!(img.width(), 0);
        assert!(img.pixels().is_empty());

        img.realloc(5, 3, BitDepth::One, ColorType::Grayscale).unwrap();
        assert_eq!(img.stride(), 1);
        assert_eq!(img.pixels().len(), 3);
        assert!(img.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn realloc_rejects_overflowing_dimensions() {
        let mut img = Image::new();
        let err = img
            .realloc(u32::MAX, u32::MAX, BitDepth::Sixteen, ColorType::TruecolorAlpha)
            .unwrap_err();
        assert!(matches!(err, Error::ResourceExhaustion));
    }

    #[test]
    fn realloc_discards_prior_chunks() {
        let mut img = Image::new();
        img.realloc(2, 2, BitDepth::Eight, ColorType::Grayscale).unwrap();
        img.add_chunk(chunk::tRNS, vec![0, 1]).unwrap();
        img.realloc(2, 2, BitDepth::Eight, ColorType::Grayscale).unwrap();
        assert!(img.chunks().is_empty());
    }

    #[test]
    fn transparency_detection() {
        let mut img = Image::new();
        img.realloc(2, 2, BitDepth::Eight, ColorType::GrayscaleAlpha)
            .unwrap();
        assert!(img.has_transparency());

        img.realloc(2, 2, BitDepth::Eight, ColorType::Grayscale).unwrap();
        assert!(!img.has_transparency());
        img.add_chunk(chunk::tRNS, vec![0, 7]).unwrap();
        assert!(img.has_transparency());

        // Wrong size for one 16-bit field: structurally invalid.
        img.realloc(2, 2, BitDepth::Eight, ColorType::Grayscale).unwrap();
        img.add_chunk(chunk::tRNS, vec![7]).unwrap();
        assert!(!img.has_transparency());

        // Indexed accepts any non-empty alpha list.
        img.realloc(2, 2, BitDepth::Eight, ColorType::Indexed).unwrap();
        img.add_chunk(chunk::tRNS, vec![128]).unwrap();
        assert!(img.has_transparency());
        img.realloc(2, 2, BitDepth::Eight, ColorType::Indexed).unwrap();
        img.add_chunk(chunk::tRNS, Vec::new()).unwrap();
        assert!(!img.has_transparency());
    }

    #[test]
    fn handoff_strips_palette_and_transparency_only() {
        let mut dst = Image::new();
        dst.realloc(2, 1, BitDepth::Eight, ColorType::Indexed).unwrap();
        dst.add_chunk(chunk::PLTE, vec![0, 0, 0, 255, 255, 255]).unwrap();
        dst.add_chunk(chunk::tRNS, vec![0]).unwrap();
        dst.add_chunk(ChunkType(*b"teXt"), vec![b'h', b'i']).unwrap();

        let mut src = Image::new();
        src.realloc(2, 1, BitDepth::Eight, ColorType::Truecolor).unwrap();
        src.pixels_mut().copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        dst.handoff(src);

        assert_eq!(dst.color_type(), ColorType::Truecolor);
        assert_eq!(dst.pixels(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(dst.chunks().len(), 1);
        assert_eq!(dst.chunks()[0].kind(), ChunkType(*b"teXt"));
    }

    #[test]
    fn chunk_lookup_by_type_and_index() {
        let mut img = Image::new();
        img.realloc(1, 1, BitDepth::Eight, ColorType::Grayscale).unwrap();
        img.add_chunk(ChunkType(*b"teXt"), vec![1]).unwrap();
        img.add_chunk(ChunkType(*b"oTHR"), vec![2]).unwrap();
        img.add_chunk(ChunkType(*b"teXt"), vec![3]).unwrap();
        assert_eq!(img.chunk(ChunkType(*b"teXt"), 0).unwrap().data(), &[1]);
        assert_eq!(img.chunk(ChunkType(*b"teXt"), 1).unwrap().data(), &[3]);
        assert!(img.chunk(ChunkType(*b"teXt"), 2).is_none());
        assert!(img.add_chunk(ChunkType([0, 1, 2, 3]), Vec::new()).is_err());
    }

    #[test]
    fn narrowing_keeps_high_bytes() {
        let mut img = Image::new();
        img.realloc(2, 1, BitDepth::Sixteen, ColorType::Grayscale).unwrap();
        img.pixels_mut().copy_from_slice(&[0xab, 0xcd, 0x12, 0x34]);
        img.force_to_gray().unwrap();
        assert_eq!(img.bit_depth(), BitDepth::Eight);
        assert_eq!(img.stride(), 2);
        assert_eq!(img.pixels(), &[0xab, 0x12]);
    }
}
