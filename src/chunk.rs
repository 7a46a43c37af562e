//! Chunk types and functions.
#![allow(non_upper_case_globals)]

use core::fmt;

/// Four-byte chunk type tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkType(pub [u8; 4]);

// -- Critical chunks --

/// Image header
pub const IHDR: ChunkType = ChunkType(*b"IHDR");
/// Palette
pub const PLTE: ChunkType = ChunkType(*b"PLTE");
/// Image data
pub const IDAT: ChunkType = ChunkType(*b"IDAT");
/// Image trailer
pub const IEND: ChunkType = ChunkType(*b"IEND");

// -- Ancillary chunks --

/// Transparency
pub const tRNS: ChunkType = ChunkType(*b"tRNS");

// -- Chunk type determination --

/// Returns true if the chunk is critical.
pub fn is_critical(ChunkType(type_): ChunkType) -> bool {
    type_[0] & 32 == 0
}

/// Returns true if the chunk is private.
pub fn is_private(ChunkType(type_): ChunkType) -> bool {
    type_[1] & 32 != 0
}

/// Checks whether the reserved bit of the chunk name is set.
/// If it is set the chunk name is invalid.
pub fn reserved_set(ChunkType(type_): ChunkType) -> bool {
    type_[2] & 32 != 0
}

/// Returns true if the chunk is safe to copy if unknown.
pub fn safe_to_copy(ChunkType(type_): ChunkType) -> bool {
    type_[3] & 32 != 0
}

impl ChunkType {
    /// True if all four tag bytes are in the printable ASCII range.
    ///
    /// Everything an [`Image`](crate::Image) stores satisfies this.
    pub fn is_valid(self) -> bool {
        self.0.iter().all(|&b| (0x20..=0x7e).contains(&b))
    }
}

impl fmt::Debug for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        struct DebugType([u8; 4]);

        impl fmt::Debug for DebugType {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                for &c in &self.0[..] {
                    write!(f, "{:?}", char::from(c).escape_debug())?;
                }
                Ok(())
            }
        }

        f.debug_struct("ChunkType")
            .field("type", &DebugType(self.0))
            .field("critical", &is_critical(*self))
            .field("private", &is_private(*self))
            .field("reserved", &reserved_set(*self))
            .field("safecopy", &safe_to_copy(*self))
            .finish()
    }
}

/// An auxiliary chunk carried on an [`Image`](crate::Image) verbatim.
///
/// The required chunks (header, pixel data, trailer) are consumed and
/// produced by the codec itself and never appear as `Chunk` records.
/// Immutable once stored.
#[derive(Clone)]
pub struct Chunk {
    kind: ChunkType,
    data: Vec<u8>,
}

impl Chunk {
    pub(crate) fn new(kind: ChunkType, data: Vec<u8>) -> Chunk {
        Chunk { kind, data }
    }

    pub fn kind(&self) -> ChunkType {
        self.kind
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("kind", &self.kind)
            .field("len", &self.data.len())
            .finish()
    }
}
