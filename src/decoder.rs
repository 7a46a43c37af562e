//! Chunk-stream state machine reconstructing an [`Image`] from a complete
//! container in memory.

use flate2::{Decompress, FlushDecompress, Status};
use log::trace;

use crate::chunk::{self, ChunkType};
use crate::common::{BitDepth, ColorType, SIGNATURE};
use crate::error::{Error, Unsupported};
use crate::filter::{unfilter, RowFilter};
use crate::image::Image;

/// Decode a complete container stream.
///
/// On success the image holds the reconstructed pixels plus every
/// auxiliary chunk, verbatim, in stream order. Failure never yields a
/// partially built image. Per-chunk CRCs are skipped rather than verified,
/// so streams from sloppy encoders still decode.
pub fn decode(src: &[u8]) -> Result<Image, Error> {
    let mut session = Decoder::new();
    session.run(src)?;
    Ok(session.image)
}

/// Transient state for one decode call: the image under construction, the
/// inflate stream, and a scratch buffer holding one filter tag plus one
/// row. All of it is released when the call returns, either way.
struct Decoder {
    image: Image,
    z: Decompress,
    /// `stride + 1` bytes once the header is known.
    rowbuf: Vec<u8>,
    /// Bytes of `rowbuf` produced so far.
    filled: usize,
    /// Bytes per whole pixel, the filters' "left" distance.
    xstride: usize,
    /// Rows reconstructed so far.
    y: u32,
    have_header: bool,
}

impl Decoder {
    fn new() -> Decoder {
        Decoder {
            image: Image::new(),
            z: Decompress::new(true),
            rowbuf: Vec::new(),
            filled: 0,
            xstride: 0,
            y: 0,
            have_header: false,
        }
    }

    fn run(&mut self, src: &[u8]) -> Result<(), Error> {
        if src.len() < 8 || src[..8] != SIGNATURE {
            return Err(Error::MalformedContainer("missing or damaged signature"));
        }
        let mut pos = 8;
        loop {
            if src.len() - pos < 8 {
                return Err(Error::MalformedContainer("truncated chunk header"));
            }
            let len = u32::from_be_bytes([src[pos], src[pos + 1], src[pos + 2], src[pos + 3]])
                as usize;
            let kind = ChunkType([src[pos + 4], src[pos + 5], src[pos + 6], src[pos + 7]]);
            pos += 8;
            if len > src.len() - pos {
                return Err(Error::MalformedContainer("truncated chunk payload"));
            }
            let payload = &src[pos..pos + len];
            pos += len;
            if src.len() - pos < 4 {
                return Err(Error::MalformedContainer("truncated chunk crc"));
            }
            pos += 4; // CRC skipped, not verified.

            if kind == chunk::IEND {
                // Ends the stream unconditionally, whatever follows.
                break;
            } else if kind == chunk::IHDR {
                self.header(payload)?;
            } else if kind == chunk::IDAT {
                self.pixel_data(payload)?;
            } else {
                if !self.have_header {
                    return Err(Error::MalformedContainer("chunk before header"));
                }
                trace!("storing auxiliary chunk {:?}, {} bytes", kind, payload.len());
                self.image.add_chunk(kind, payload.to_vec())?;
            }
        }
        self.finish()
    }

    fn header(&mut self, payload: &[u8]) -> Result<(), Error> {
        if self.have_header {
            return Err(Error::MalformedContainer("duplicate header chunk"));
        }
        // The format says exactly 13 bytes; extra bytes are ignored.
        if payload.len() < 13 {
            return Err(Error::MalformedContainer("short header chunk"));
        }
        let width = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let height = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let bit_depth = BitDepth::from_u8(payload[8]);
        let color_type = ColorType::from_u8(payload[9]);
        let compression = payload[10];
        let filter_method = payload[11];
        let interlace = payload[12];

        let (bit_depth, color_type) = match (bit_depth, color_type) {
            (Some(d), Some(c)) => (d, c),
            _ => {
                return Err(Error::UnsupportedFeature(Unsupported::ColorDepth {
                    color_type: payload[9],
                    bit_depth: payload[8],
                }))
            }
        };
        if compression != 0 {
            return Err(Error::UnsupportedFeature(Unsupported::CompressionMethod(
                compression,
            )));
        }
        if filter_method != 0 {
            return Err(Error::UnsupportedFeature(Unsupported::FilterMethod(
                filter_method,
            )));
        }
        if interlace != 0 {
            return Err(Error::UnsupportedFeature(Unsupported::Interlaced));
        }

        self.image.realloc(width, height, bit_depth, color_type)?;
        self.xstride = self.image.bytes_per_pixel();
        self.rowbuf = vec![0; self.image.stride() + 1];
        self.have_header = true;
        Ok(())
    }

    fn pixel_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if !self.have_header {
            return Err(Error::MalformedContainer("pixel data before header"));
        }
        if self.y >= self.image.height() {
            trace!("ignoring {} bytes of excess pixel data", data.len());
            return Ok(());
        }
        let mut pos = 0;
        while pos < data.len() && self.y < self.image.height() {
            let before_in = self.z.total_in();
            let before_out = self.z.total_out();
            let status =
                self.z
                    .decompress(&data[pos..], &mut self.rowbuf[self.filled..], FlushDecompress::None)?;
            pos += (self.z.total_in() - before_in) as usize;
            self.filled += (self.z.total_out() - before_out) as usize;
            if self.filled == self.rowbuf.len() {
                self.complete_row()?;
            }
            match status {
                Status::Ok => {}
                Status::StreamEnd => break,
                Status::BufError => {
                    return Err(Error::CompressionStream(
                        "inflate stalled mid-stream".into(),
                    ))
                }
            }
        }
        Ok(())
    }

    /// One filtered row is sitting in `rowbuf`: reverse its filter against
    /// the previous reconstructed row and commit it to the pixel buffer.
    fn complete_row(&mut self) -> Result<(), Error> {
        let kind = RowFilter::from_u8(self.rowbuf[0])
            .ok_or(Error::MalformedContainer("invalid row filter id"))?;
        let stride = self.image.stride();
        let start = self.y as usize * stride;
        let pixels = self.image.pixels_mut();
        let (before, rest) = pixels.split_at_mut(start);
        let prev = if start > 0 {
            Some(&before[start - stride..])
        } else {
            None
        };
        unfilter(kind, self.xstride, prev, &self.rowbuf[1..], &mut rest[..stride]);
        self.y += 1;
        self.filled = 0;
        Ok(())
    }

    /// Drain whatever the inflate stream still holds, then check that
    /// every declared row was produced. A trailer that arrived early is
    /// fine as long as the drain completes the image.
    fn finish(&mut self) -> Result<(), Error> {
        if !self.have_header {
            return Err(Error::MalformedContainer("missing header chunk"));
        }
        while self.y < self.image.height() {
            let before_out = self.z.total_out();
            let status =
                self.z
                    .decompress(&[], &mut self.rowbuf[self.filled..], FlushDecompress::Finish)?;
            let produced = (self.z.total_out() - before_out) as usize;
            self.filled += produced;
            if self.filled == self.rowbuf.len() {
                self.complete_row()?;
                continue;
            }
            if produced == 0 || status == Status::StreamEnd {
                break;
            }
        }
        if self.y < self.image.height() {
            return Err(Error::IncompleteImage {
                declared: self.image.height(),
                produced: self.y,
            });
        }
        Ok(())
    }
}
