//! Per-row reversible byte transforms applied to scanlines before
//! compression, and the strategies that pick one while encoding.
//!
//! Filters operate on raw row bytes, not pixels: "left" means the byte one
//! whole pixel earlier (`xstride` bytes back), which for sub-byte depths is
//! simply the previous byte. All arithmetic wraps modulo 256.

/// One of the five per-row filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RowFilter {
    None = 0,
    Sub = 1,
    Up = 2,
    Average = 3,
    Paeth = 4,
}

impl RowFilter {
    pub fn from_u8(n: u8) -> Option<RowFilter> {
        match n {
            0 => Some(RowFilter::None),
            1 => Some(RowFilter::Sub),
            2 => Some(RowFilter::Up),
            3 => Some(RowFilter::Average),
            4 => Some(RowFilter::Paeth),
            _ => None,
        }
    }
}

/// How the encoder picks a filter for each row.
///
/// The heuristics filter every row five ways and keep the candidate with
/// the best score; scores approximate "compresses well" without consulting
/// the deflate engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStrategy {
    /// Force the named filter on every row.
    Fixed(RowFilter),
    /// Keep the candidate with the longest run of zero bytes.
    LongestZeroRun,
    /// Keep the candidate with the most zero bytes in total.
    MostZeroes,
    /// Keep the candidate with the longest run of any repeated byte.
    LongestRun,
    /// Keep the candidate whose bytes, read as signed, sum lowest.
    LowestSum,
}

impl Default for FilterStrategy {
    fn default() -> Self {
        FilterStrategy::Fixed(RowFilter::None)
    }
}

impl FilterStrategy {
    /// Maps the numeric strategy ids: 0..=4 force the named filter, 5..=8
    /// select a heuristic. Anything else falls back to filter 0 rather
    /// than failing.
    pub fn from_u8(n: u8) -> FilterStrategy {
        match n {
            1 => FilterStrategy::Fixed(RowFilter::Sub),
            2 => FilterStrategy::Fixed(RowFilter::Up),
            3 => FilterStrategy::Fixed(RowFilter::Average),
            4 => FilterStrategy::Fixed(RowFilter::Paeth),
            5 => FilterStrategy::LongestZeroRun,
            6 => FilterStrategy::MostZeroes,
            7 => FilterStrategy::LongestRun,
            8 => FilterStrategy::LowestSum,
            _ => FilterStrategy::Fixed(RowFilter::None),
        }
    }

    /// Higher is better. Only meaningful for the heuristic variants.
    fn score(self, row: &[u8]) -> i64 {
        match self {
            FilterStrategy::Fixed(_) => 0,
            FilterStrategy::LongestZeroRun => longest_zero_run(row),
            FilterStrategy::MostZeroes => count_zeroes(row),
            FilterStrategy::LongestRun => longest_run(row),
            FilterStrategy::LowestSum => -signed_sum(row),
        }
    }
}

/// The Paeth predictor: of {a, b, c}, the value closest to `a + b - c`,
/// ties broken in order a, then b, then c.
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Apply a row filter for encoding.
///
/// `prev` is the raw previous row, absent on row 0 (treated as all-zero by
/// Up/Average/Paeth). `xstride` is bytes per whole pixel. `src` and `dst`
/// must both be one stride long.
pub(crate) fn filter(
    kind: RowFilter,
    xstride: usize,
    prev: Option<&[u8]>,
    src: &[u8],
    dst: &mut [u8],
) {
    debug_assert_eq!(src.len(), dst.len());
    let stride = src.len();
    match kind {
        RowFilter::None => dst.copy_from_slice(src),
        RowFilter::Sub => {
            let lead = xstride.min(stride);
            dst[..lead].copy_from_slice(&src[..lead]);
            for i in lead..stride {
                dst[i] = src[i].wrapping_sub(src[i - xstride]);
            }
        }
        RowFilter::Up => match prev {
            Some(prev) => {
                for i in 0..stride {
                    dst[i] = src[i].wrapping_sub(prev[i]);
                }
            }
            None => dst.copy_from_slice(src),
        },
        RowFilter::Average => match prev {
            Some(prev) => {
                let lead = xstride.min(stride);
                for i in 0..lead {
                    dst[i] = src[i].wrapping_sub(prev[i] >> 1);
                }
                for i in lead..stride {
                    let avg = ((src[i - xstride] as u16 + prev[i] as u16) >> 1) as u8;
                    dst[i] = src[i].wrapping_sub(avg);
                }
            }
            None => {
                let lead = xstride.min(stride);
                dst[..lead].copy_from_slice(&src[..lead]);
                for i in lead..stride {
                    dst[i] = src[i].wrapping_sub(src[i - xstride] >> 1);
                }
            }
        },
        RowFilter::Paeth => {
            for i in 0..stride {
                let a = if i >= xstride { src[i - xstride] } else { 0 };
                let b = prev.map_or(0, |p| p[i]);
                let c = match prev {
                    Some(p) if i >= xstride => p[i - xstride],
                    _ => 0,
                };
                dst[i] = src[i].wrapping_sub(paeth(a, b, c));
            }
        }
    }
}

/// Undo a row filter for decoding. Exact inverse of [`filter`].
///
/// Left references come from `dst`, the partially reconstructed row.
pub(crate) fn unfilter(
    kind: RowFilter,
    xstride: usize,
    prev: Option<&[u8]>,
    src: &[u8],
    dst: &mut [u8],
) {
    debug_assert_eq!(src.len(), dst.len());
    let stride = src.len();
    match kind {
        RowFilter::None => dst.copy_from_slice(src),
        RowFilter::Sub => {
            let lead = xstride.min(stride);
            dst[..lead].copy_from_slice(&src[..lead]);
            for i in lead..stride {
                dst[i] = src[i].wrapping_add(dst[i - xstride]);
            }
        }
        RowFilter::Up => match prev {
            Some(prev) => {
                for i in 0..stride {
                    dst[i] = src[i].wrapping_add(prev[i]);
                }
            }
            None => dst.copy_from_slice(src),
        },
        RowFilter::Average => match prev {
            Some(prev) => {
                let lead = xstride.min(stride);
                for i in 0..lead {
                    dst[i] = src[i].wrapping_add(prev[i] >> 1);
                }
                for i in lead..stride {
                    let avg = ((dst[i - xstride] as u16 + prev[i] as u16) >> 1) as u8;
                    dst[i] = src[i].wrapping_add(avg);
                }
            }
            None => {
                let lead = xstride.min(stride);
                dst[..lead].copy_from_slice(&src[..lead]);
                for i in lead..stride {
                    dst[i] = src[i].wrapping_add(dst[i - xstride] >> 1);
                }
            }
        },
        RowFilter::Paeth => {
            for i in 0..stride {
                let a = if i >= xstride { dst[i - xstride] } else { 0 };
                let b = prev.map_or(0, |p| p[i]);
                let c = match prev {
                    Some(p) if i >= xstride => p[i - xstride],
                    _ => 0,
                };
                dst[i] = src[i].wrapping_add(paeth(a, b, c));
            }
        }
    }
}

const CANDIDATES: [RowFilter; 5] = [
    RowFilter::None,
    RowFilter::Sub,
    RowFilter::Up,
    RowFilter::Average,
    RowFilter::Paeth,
];

/// Select and apply the filter for one row, leaving the filtered bytes in
/// `dst` and returning the chosen filter's tag.
///
/// For the heuristics, all five candidates are computed and scored; the
/// first best wins ties, and its bytes are reused directly unless a later
/// candidate overwrote them.
pub(crate) fn choose_filter(
    strategy: FilterStrategy,
    xstride: usize,
    prev: Option<&[u8]>,
    src: &[u8],
    dst: &mut [u8],
) -> RowFilter {
    if let FilterStrategy::Fixed(kind) = strategy {
        filter(kind, xstride, prev, src, dst);
        return kind;
    }
    let mut best = RowFilter::None;
    let mut best_score = i64::MIN;
    for kind in CANDIDATES {
        filter(kind, xstride, prev, src, dst);
        let score = strategy.score(dst);
        if score > best_score {
            best_score = score;
            best = kind;
        }
    }
    if best != RowFilter::Paeth {
        filter(best, xstride, prev, src, dst);
    }
    best
}

fn longest_zero_run(row: &[u8]) -> i64 {
    let mut longest = 0i64;
    let mut run = 0i64;
    for &b in row {
        if b == 0 {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    longest
}

fn count_zeroes(row: &[u8]) -> i64 {
    row.iter().filter(|&&b| b == 0).count() as i64
}

fn longest_run(row: &[u8]) -> i64 {
    let mut longest = 0i64;
    let mut run = 0i64;
    let mut last = None;
    for &b in row {
        if Some(b) == last {
            run += 1;
        } else {
            last = Some(b);
            run = 1;
        }
        longest = longest.max(run);
    }
    longest
}

fn signed_sum(row: &[u8]) -> i64 {
    row.iter().map(|&b| i64::from(b as i8)).sum()
}
