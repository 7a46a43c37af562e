//! Chunk-stream writer producing a complete container in memory.

use flate2::{Compress, FlushCompress, Status};

use crate::chunk::{self, ChunkType};
use crate::common::{checked_stride, Compression, SIGNATURE};
use crate::error::{Error, Unsupported};
use crate::filter::{choose_filter, FilterStrategy};
use crate::image::Image;

/// The trailer chunk is always empty, so it is a constant: zero length,
/// the tag, and its precomputed CRC.
const IEND: [u8; 12] = *b"\x00\x00\x00\x00IEND\xae\x42\x60\x82";

/// How much output space to offer the deflate stream per call.
const DEFLATE_CHUNK: usize = 4096;

/// Encode with the default filter strategy and compression level.
pub fn encode(image: &Image) -> Result<Vec<u8>, Error> {
    encode_with(image, FilterStrategy::default(), Compression::default())
}

/// Encode a complete container stream: signature, header chunk, every
/// auxiliary chunk verbatim in stored order, one pixel-data chunk, and the
/// trailer.
///
/// No chunk rules are enforced beyond the header's own consistency, so it
/// is possible to produce an invalid file here, e.g. by storing a second
/// palette on the image.
pub fn encode_with(
    image: &Image,
    strategy: FilterStrategy,
    level: Compression,
) -> Result<Vec<u8>, Error> {
    let session = Encoder::new(image, strategy, level)?;
    session.run()
}

/// Transient state for one encode call: the deflate stream, a scratch
/// buffer of one filter tag plus one filtered row, and the output under
/// construction.
struct Encoder<'a> {
    image: &'a Image,
    strategy: FilterStrategy,
    z: Compress,
    rowbuf: Vec<u8>,
    xstride: usize,
    out: Vec<u8>,
}

impl<'a> Encoder<'a> {
    /// Validate the image header aggressively before emitting anything.
    fn new(image: &'a Image, strategy: FilterStrategy, level: Compression) -> Result<Encoder<'a>, Error> {
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::MalformedContainer("zero image dimension"));
        }
        if !image.color_type().allows(image.bit_depth()) {
            return Err(Error::UnsupportedFeature(Unsupported::ColorDepth {
                color_type: image.color_type() as u8,
                bit_depth: image.bit_depth() as u8,
            }));
        }
        let stride = checked_stride(image.width(), image.color_type(), image.bit_depth())
            .ok_or(Error::ResourceExhaustion)?;
        if stride != image.stride() {
            return Err(Error::MalformedContainer("stride does not match header"));
        }
        let total = stride
            .checked_mul(image.height() as usize)
            .ok_or(Error::ResourceExhaustion)?;
        if total != image.pixels().len() {
            return Err(Error::MalformedContainer("pixel buffer length mismatch"));
        }
        Ok(Encoder {
            image,
            strategy,
            z: Compress::new(level.to_flate2(), true),
            rowbuf: vec![0; stride + 1],
            xstride: image.bytes_per_pixel(),
            out: Vec::new(),
        })
    }

    fn run(mut self) -> Result<Vec<u8>, Error> {
        self.out.extend_from_slice(&SIGNATURE);
        self.header();
        let image = self.image;
        for chunk in image.chunks() {
            self.chunk(chunk.kind(), chunk.data());
        }
        self.pixel_data()?;
        self.out.extend_from_slice(&IEND);
        Ok(self.out)
    }

    fn header(&mut self) {
        let mut payload = [0u8; 13];
        payload[..4].copy_from_slice(&self.image.width().to_be_bytes());
        payload[4..8].copy_from_slice(&self.image.height().to_be_bytes());
        payload[8] = self.image.bit_depth() as u8;
        payload[9] = self.image.color_type() as u8;
        // compression, filter method and interlace are always zero.
        self.chunk(chunk::IHDR, &payload);
    }

    fn chunk(&mut self, kind: ChunkType, payload: &[u8]) {
        self.out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        self.out.extend_from_slice(&kind.0);
        self.out.extend_from_slice(payload);
        let mut crc = crc32fast::Hasher::new();
        crc.update(&kind.0);
        crc.update(payload);
        self.out.extend_from_slice(&crc.finalize().to_be_bytes());
    }

    /// One pixel-data chunk holding the whole filtered, compressed image.
    /// Length and CRC are written once the body is complete.
    fn pixel_data(&mut self) -> Result<(), Error> {
        let len_pos = self.out.len();
        self.out.extend_from_slice(&[0; 4]);
        let type_pos = self.out.len();
        self.out.extend_from_slice(&chunk::IDAT.0);

        let stride = self.image.stride();
        let pixels = self.image.pixels();
        for y in 0..self.image.height() as usize {
            let row = &pixels[y * stride..(y + 1) * stride];
            let prev = if y > 0 {
                Some(&pixels[(y - 1) * stride..y * stride])
            } else {
                None
            };
            if let Some((tag, filtered)) = self.rowbuf.split_first_mut() {
                *tag = choose_filter(self.strategy, self.xstride, prev, row, filtered) as u8;
            }
            self.push_row()?;
        }
        self.finish_stream()?;

        let body_len = (self.out.len() - type_pos - 4) as u32;
        self.out[len_pos..len_pos + 4].copy_from_slice(&body_len.to_be_bytes());
        let mut crc = crc32fast::Hasher::new();
        crc.update(&self.out[type_pos..]);
        self.out.extend_from_slice(&crc.finalize().to_be_bytes());
        Ok(())
    }

    /// Feed the scratch row (tag byte included) through the deflate
    /// stream, appending whatever output it produces.
    fn push_row(&mut self) -> Result<(), Error> {
        let mut pos = 0;
        while pos < self.rowbuf.len() {
            let before_in = self.z.total_in();
            self.out.reserve(DEFLATE_CHUNK);
            self.z
                .compress_vec(&self.rowbuf[pos..], &mut self.out, FlushCompress::None)?;
            pos += (self.z.total_in() - before_in) as usize;
        }
        Ok(())
    }

    /// Flush the deflate stream to completion after the last row.
    fn finish_stream(&mut self) -> Result<(), Error> {
        loop {
            self.out.reserve(DEFLATE_CHUNK);
            let status = self.z.compress_vec(&[], &mut self.out, FlushCompress::Finish)?;
            if status == Status::StreamEnd {
                return Ok(());
            }
        }
    }
}
