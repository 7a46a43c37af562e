//! Decoder behavior on hand-assembled streams: the minimal accepted file,
//! the tolerances, and the rejection paths.

use flate2::{Compress, FlushCompress, Status};
use micropng::{decode, encode, ChunkType, Error, Unsupported, SIGNATURE};

/// Frame one chunk. The trailing CRC is left zero: the decoder never
/// checks it.
fn chunk(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out.extend_from_slice(&[0; 4]);
    out
}

fn ihdr(w: u32, h: u32, depth: u8, color_type: u8, interlace: u8) -> Vec<u8> {
    let mut payload = [0u8; 13];
    payload[..4].copy_from_slice(&w.to_be_bytes());
    payload[4..8].copy_from_slice(&h.to_be_bytes());
    payload[8] = depth;
    payload[9] = color_type;
    payload[12] = interlace;
    chunk(b"IHDR", &payload)
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut z = Compress::new(flate2::Compression::fast(), true);
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let before = z.total_in();
        out.reserve(1024);
        z.compress_vec(&data[pos..], &mut out, FlushCompress::None)
            .unwrap();
        pos += (z.total_in() - before) as usize;
    }
    loop {
        out.reserve(1024);
        if z.compress_vec(&[], &mut out, FlushCompress::Finish).unwrap() == Status::StreamEnd {
            break;
        }
    }
    out
}

fn stream(chunks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = SIGNATURE.to_vec();
    for c in chunks {
        out.extend_from_slice(c);
    }
    out
}

#[test]
fn minimal_truecolor_pixel() {
    // Filter tag 0 plus one raw RGB pixel.
    let src = stream(&[
        ihdr(1, 1, 8, 2, 0),
        chunk(b"IDAT", &zlib(&[0, 0x11, 0x22, 0x33])),
        chunk(b"IEND", &[]),
    ]);
    let image = decode(&src).unwrap();
    assert_eq!(image.width(), 1);
    assert_eq!(image.height(), 1);
    assert_eq!(image.pixels(), &[0x11, 0x22, 0x33]);
    assert!(image.chunks().is_empty());
}

#[test]
fn interlaced_header_is_rejected() {
    let src = stream(&[
        ihdr(1, 1, 8, 2, 1),
        chunk(b"IDAT", &zlib(&[0, 0x11, 0x22, 0x33])),
        chunk(b"IEND", &[]),
    ]);
    match decode(&src) {
        Err(Error::UnsupportedFeature(Unsupported::Interlaced)) => {}
        other => panic!("expected interlace rejection, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn nonzero_compression_and_filter_methods_are_rejected() {
    let mut payload = [0u8; 13];
    payload[..4].copy_from_slice(&1u32.to_be_bytes());
    payload[4..8].copy_from_slice(&1u32.to_be_bytes());
    payload[8] = 8;
    payload[9] = 0;
    payload[10] = 1;
    let src = stream(&[chunk(b"IHDR", &payload), chunk(b"IEND", &[])]);
    assert!(matches!(
        decode(&src),
        Err(Error::UnsupportedFeature(Unsupported::CompressionMethod(1)))
    ));

    payload[10] = 0;
    payload[11] = 1;
    let src = stream(&[chunk(b"IHDR", &payload), chunk(b"IEND", &[])]);
    assert!(matches!(
        decode(&src),
        Err(Error::UnsupportedFeature(Unsupported::FilterMethod(1)))
    ));
}

#[test]
fn illegal_depth_color_combination_is_rejected() {
    let src = stream(&[
        ihdr(1, 1, 4, 2, 0), // 4-bit truecolor does not exist
        chunk(b"IEND", &[]),
    ]);
    assert!(matches!(
        decode(&src),
        Err(Error::UnsupportedFeature(Unsupported::ColorDepth { .. }))
    ));
}

#[test]
fn damaged_signature_is_rejected() {
    let mut src = stream(&[ihdr(1, 1, 8, 0, 0), chunk(b"IEND", &[])]);
    src[0] = 0x88;
    assert!(matches!(decode(&src), Err(Error::MalformedContainer(_))));
    assert!(matches!(decode(&[]), Err(Error::MalformedContainer(_))));
}

#[test]
fn truncation_is_rejected_at_every_framing_point() {
    let full = stream(&[
        ihdr(1, 1, 8, 2, 0),
        chunk(b"IDAT", &zlib(&[0, 1, 2, 3])),
        chunk(b"IEND", &[]),
    ]);
    // Any prefix that still has a valid signature must fail cleanly, since
    // the trailer can never be reached.
    for len in 8..full.len() - 12 {
        assert!(
            decode(&full[..len]).is_err(),
            "decode of {} byte prefix succeeded",
            len
        );
    }
}

#[test]
fn pixel_data_before_header_is_rejected() {
    let src = stream(&[
        chunk(b"IDAT", &zlib(&[0, 1])),
        ihdr(1, 1, 8, 0, 0),
        chunk(b"IEND", &[]),
    ]);
    assert!(matches!(decode(&src), Err(Error::MalformedContainer(_))));
}

#[test]
fn duplicate_header_is_rejected() {
    let src = stream(&[
        ihdr(1, 1, 8, 0, 0),
        ihdr(1, 1, 8, 0, 0),
        chunk(b"IEND", &[]),
    ]);
    assert!(matches!(decode(&src), Err(Error::MalformedContainer(_))));
}

#[test]
fn split_pixel_data_with_interleaved_chunk_decodes() {
    // A 2x2 grayscale image: rows (tag 0, [1, 2]) and (tag 0, [3, 4]).
    // The compressed body is split mid-stream and another chunk sits in
    // between; the format forbids that but this decoder accepts it.
    let body = zlib(&[0, 1, 2, 0, 3, 4]);
    let (first, second) = body.split_at(body.len() / 2);
    let src = stream(&[
        ihdr(2, 2, 8, 0, 0),
        chunk(b"IDAT", first),
        chunk(b"ruNs", b"between"),
        chunk(b"IDAT", second),
        chunk(b"IEND", &[]),
    ]);
    let image = decode(&src).unwrap();
    assert_eq!(image.pixels(), &[1, 2, 3, 4]);
    assert_eq!(image.chunks().len(), 1);
    assert_eq!(image.chunks()[0].data(), b"between");
}

#[test]
fn excess_pixel_data_is_ignored() {
    // Three rows of data for a declared height of 2, plus one more IDAT
    // chunk of garbage after the image is complete.
    let src = stream(&[
        ihdr(2, 2, 8, 0, 0),
        chunk(b"IDAT", &zlib(&[0, 1, 2, 0, 3, 4, 0, 5, 6])),
        chunk(b"IDAT", b"not even zlib"),
        chunk(b"IEND", &[]),
    ]);
    let image = decode(&src).unwrap();
    assert_eq!(image.pixels(), &[1, 2, 3, 4]);
}

#[test]
fn short_pixel_data_is_an_incomplete_image() {
    // One row for a declared height of 2.
    let src = stream(&[
        ihdr(2, 2, 8, 0, 0),
        chunk(b"IDAT", &zlib(&[0, 1, 2])),
        chunk(b"IEND", &[]),
    ]);
    match decode(&src) {
        Err(Error::IncompleteImage { declared, produced }) => {
            assert_eq!(declared, 2);
            assert_eq!(produced, 1);
        }
        other => panic!("expected incomplete image, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn trailer_with_no_pixel_data_is_an_incomplete_image() {
    let src = stream(&[ihdr(1, 1, 8, 0, 0), chunk(b"IEND", &[])]);
    assert!(matches!(decode(&src), Err(Error::IncompleteImage { .. })));
}

#[test]
fn invalid_row_filter_id_is_rejected() {
    let src = stream(&[
        ihdr(1, 1, 8, 0, 0),
        chunk(b"IDAT", &zlib(&[9, 1])),
        chunk(b"IEND", &[]),
    ]);
    assert!(matches!(decode(&src), Err(Error::MalformedContainer(_))));
}

#[test]
fn unknown_chunks_pass_through_decode_and_encode() {
    let src = stream(&[
        ihdr(1, 1, 8, 0, 0),
        chunk(b"prVt", &[1, 2, 3]),
        chunk(b"IDAT", &zlib(&[0, 42])),
        chunk(b"zzZz", &[]),
        chunk(b"IEND", &[]),
    ]);
    let image = decode(&src).unwrap();
    assert_eq!(image.chunks().len(), 2);
    assert_eq!(image.chunks()[0].kind(), ChunkType(*b"prVt"));
    assert_eq!(image.chunks()[1].kind(), ChunkType(*b"zzZz"));

    // Re-encode and confirm both reappear, in order, with real CRCs.
    let bytes = encode(&image).unwrap();
    let again = decode(&bytes).unwrap();
    assert_eq!(again.chunks().len(), 2);
    assert_eq!(again.chunks()[0].kind(), ChunkType(*b"prVt"));
    assert_eq!(again.chunks()[0].data(), &[1, 2, 3]);
    assert_eq!(again.chunks()[1].kind(), ChunkType(*b"zzZz"));
    assert_eq!(again.pixels(), image.pixels());
}

#[test]
fn crc_values_are_not_verified() {
    // All-zero CRCs throughout; the stream still decodes.
    let src = stream(&[
        ihdr(1, 1, 8, 0, 0),
        chunk(b"IDAT", &zlib(&[0, 200])),
        chunk(b"IEND", &[]),
    ]);
    assert_eq!(decode(&src).unwrap().pixels(), &[200]);
}

#[test]
fn oversized_header_payload_is_tolerated() {
    // The format says exactly 13 bytes; extras are ignored here.
    let mut payload = vec![0u8; 20];
    payload[..4].copy_from_slice(&1u32.to_be_bytes());
    payload[4..8].copy_from_slice(&1u32.to_be_bytes());
    payload[8] = 8;
    payload[9] = 0;
    let src = stream(&[
        chunk(b"IHDR", &payload),
        chunk(b"IDAT", &zlib(&[0, 9])),
        chunk(b"IEND", &[]),
    ]);
    assert_eq!(decode(&src).unwrap().pixels(), &[9]);
}

#[test]
fn data_after_the_trailer_is_ignored() {
    let mut src = stream(&[
        ihdr(1, 1, 8, 0, 0),
        chunk(b"IDAT", &zlib(&[0, 77])),
        chunk(b"IEND", &[]),
    ]);
    src.extend_from_slice(b"trailing garbage, not even chunked");
    assert_eq!(decode(&src).unwrap().pixels(), &[77]);
}
