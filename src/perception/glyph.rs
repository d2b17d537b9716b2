//! glyph.rs
//! Marker vocabulary: identities, 3x3 patterns, sampled bitmaps and corner sets.

use std::fmt;

use crate::error::BitmapError;

/// Number of tracked markers on the arm.
pub const GLYPH_COUNT: usize = 4;

/// Cells per side of a glyph pattern (excluding the dark border).
pub const PATTERN_SIZE: usize = 3;

/// Cells per side of a sampled bitmap: the pattern plus a one-cell border.
pub const BITMAP_SIZE: usize = PATTERN_SIZE + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GlyphIdentity {
    Alpha,
    Beta,
    Gamma,
    Delta,
}

impl GlyphIdentity {
    pub const ALL: [GlyphIdentity; GLYPH_COUNT] = [
        GlyphIdentity::Alpha,
        GlyphIdentity::Beta,
        GlyphIdentity::Gamma,
        GlyphIdentity::Delta,
    ];

    /// Slot index, stable for the process lifetime.
    pub fn index(&self) -> usize {
        match self {
            GlyphIdentity::Alpha => 0,
            GlyphIdentity::Beta => 1,
            GlyphIdentity::Gamma => 2,
            GlyphIdentity::Delta => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GlyphIdentity::Alpha => "ALPHA",
            GlyphIdentity::Beta => "BETA",
            GlyphIdentity::Gamma => "GAMMA",
            GlyphIdentity::Delta => "DELTA",
        }
    }
}

impl fmt::Display for GlyphIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Four quad corners in canonical order: clockwise in image coordinates
/// (y axis pointing down), starting at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CornerSet([Point; 4]);

impl CornerSet {
    /// Canonicalise raw corners given in capture order.
    ///
    /// The order depends only on corner positions: corners are sorted by their
    /// angle around the centroid, and the sequence starts at the corner with
    /// the smallest `x + y` (smallest `x` on ties).
    pub fn canonical(raw: [Point; 4]) -> Self {
        let centroid = centroid_of(&raw);
        let mut corners = raw;
        corners.sort_by(|a, b| {
            let ta = (a.y - centroid.y).atan2(a.x - centroid.x);
            let tb = (b.y - centroid.y).atan2(b.x - centroid.x);
            ta.total_cmp(&tb)
        });

        let start = corners
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (a.x + a.y)
                    .total_cmp(&(b.x + b.y))
                    .then(a.x.total_cmp(&b.x))
            })
            .map(|(i, _)| i)
            .unwrap_or(0);
        corners.rotate_left(start);
        Self(corners)
    }

    pub fn corners(&self) -> &[Point; 4] {
        &self.0
    }

    pub fn centroid(&self) -> Point {
        centroid_of(&self.0)
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(Point::is_finite)
    }
}

fn centroid_of(points: &[Point; 4]) -> Point {
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point::new(sx / 4.0, sy / 4.0)
}

/// Binary 3x3 marker pattern; `true` cells are bright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlyphPattern {
    cells: [[bool; PATTERN_SIZE]; PATTERN_SIZE],
}

impl GlyphPattern {
    pub const fn from_rows(rows: [[u8; PATTERN_SIZE]; PATTERN_SIZE]) -> Self {
        let mut cells = [[false; PATTERN_SIZE]; PATTERN_SIZE];
        let mut r = 0;
        while r < PATTERN_SIZE {
            let mut c = 0;
            while c < PATTERN_SIZE {
                cells[r][c] = rows[r][c] != 0;
                c += 1;
            }
            r += 1;
        }
        Self { cells }
    }

    #[inline]
    pub fn cell(&self, row: usize, col: usize) -> bool {
        self.cells[row][col]
    }

    /// Pattern turned 90° clockwise.
    pub fn rotated(&self) -> Self {
        let mut cells = [[false; PATTERN_SIZE]; PATTERN_SIZE];
        for (r, row) in cells.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = self.cells[PATTERN_SIZE - 1 - c][r];
            }
        }
        Self { cells }
    }

    /// All four orientations, starting with the pattern itself.
    pub fn orientations(&self) -> [GlyphPattern; 4] {
        let r1 = self.rotated();
        let r2 = r1.rotated();
        let r3 = r2.rotated();
        [*self, r1, r2, r3]
    }
}

pub const ALPHA_PATTERN: GlyphPattern = GlyphPattern::from_rows([[0, 1, 0], [1, 0, 0], [0, 1, 1]]);
pub const BETA_PATTERN: GlyphPattern = GlyphPattern::from_rows([[1, 1, 0], [0, 0, 0], [0, 1, 0]]);
pub const GAMMA_PATTERN: GlyphPattern = GlyphPattern::from_rows([[1, 0, 1], [0, 1, 0], [1, 0, 0]]);
pub const DELTA_PATTERN: GlyphPattern = GlyphPattern::from_rows([[1, 0, 1], [0, 0, 0], [1, 0, 0]]);

/// Square grayscale grid sampled from a rectified quad, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedBitmap {
    resolution: usize,
    pixels: Vec<u8>,
}

impl NormalizedBitmap {
    pub fn new(resolution: usize, pixels: Vec<u8>) -> Result<Self, BitmapError> {
        let expected = resolution * resolution;
        if pixels.len() != expected {
            return Err(BitmapError::SizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self { resolution, pixels })
    }

    pub fn from_fn(resolution: usize, mut pixel: impl FnMut(usize, usize) -> u8) -> Self {
        let mut pixels = Vec::with_capacity(resolution * resolution);
        for r in 0..resolution {
            for c in 0..resolution {
                pixels.push(pixel(r, c));
            }
        }
        Self { resolution, pixels }
    }

    /// Render a pattern with a dark one-cell border, bright cells at 255.
    pub fn from_pattern(pattern: &GlyphPattern) -> Self {
        let resolution = BITMAP_SIZE;
        let mut pixels = vec![0u8; resolution * resolution];
        for r in 0..PATTERN_SIZE {
            for c in 0..PATTERN_SIZE {
                if pattern.cell(r, c) {
                    pixels[(r + 1) * resolution + c + 1] = 255;
                }
            }
        }
        Self { resolution, pixels }
    }

    #[inline]
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    #[inline]
    pub fn pixel(&self, row: usize, col: usize) -> u8 {
        self.pixels[row * self.resolution + col]
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Bitmap turned 90° clockwise.
    pub fn rotated(&self) -> Self {
        let n = self.resolution;
        let mut pixels = vec![0u8; n * n];
        for r in 0..n {
            for c in 0..n {
                pixels[r * n + c] = self.pixel(n - 1 - c, r);
            }
        }
        Self {
            resolution: n,
            pixels,
        }
    }

    /// True when the border is dark and every inner cell agrees with `pattern`.
    pub fn matches(&self, pattern: &GlyphPattern, bright_threshold: u8) -> bool {
        let n = self.resolution;
        if n != BITMAP_SIZE {
            return false;
        }
        for r in 0..n {
            for c in 0..n {
                let bright = self.pixel(r, c) >= bright_threshold;
                let on_border = r == 0 || c == 0 || r == n - 1 || c == n - 1;
                let expected = if on_border {
                    false
                } else {
                    pattern.cell(r - 1, c - 1)
                };
                if bright != expected {
                    return false;
                }
            }
        }
        true
    }
}

/// Marker candidate handed over by the quad extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Corners in capture order.
    pub corners: [Point; 4],
    pub bitmap: NormalizedBitmap,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(cx: f64, cy: f64, half: f64) -> [Point; 4] {
        [
            Point::new(cx - half, cy - half),
            Point::new(cx + half, cy - half),
            Point::new(cx + half, cy + half),
            Point::new(cx - half, cy + half),
        ]
    }

    #[test]
    fn canonical_order_ignores_capture_order() {
        let raw = square(50.0, 40.0, 10.0);
        let expected = CornerSet::canonical(raw);
        assert_eq!(expected.corners()[0], Point::new(40.0, 30.0));
        assert_eq!(expected.corners()[1], Point::new(60.0, 30.0));
        assert_eq!(expected.corners()[2], Point::new(60.0, 50.0));
        assert_eq!(expected.corners()[3], Point::new(40.0, 50.0));

        let mut shuffled = raw;
        for _ in 0..4 {
            shuffled.rotate_left(1);
            assert_eq!(CornerSet::canonical(shuffled), expected);
        }
        shuffled.reverse();
        assert_eq!(CornerSet::canonical(shuffled), expected);
    }

    #[test]
    fn canonical_order_handles_diamond() {
        let raw = [
            Point::new(10.0, 0.0),
            Point::new(20.0, 10.0),
            Point::new(10.0, 20.0),
            Point::new(0.0, 10.0),
        ];
        let set = CornerSet::canonical(raw);
        // (10,0) and (0,10) tie on x + y, smaller x wins
        assert_eq!(set.corners()[0], Point::new(0.0, 10.0));
        assert_eq!(set.corners()[1], Point::new(10.0, 0.0));
        assert_eq!(set.centroid(), Point::new(10.0, 10.0));
    }

    #[test]
    fn four_rotations_return_to_start() {
        let rotated = ALPHA_PATTERN.rotated().rotated().rotated().rotated();
        assert_eq!(rotated, ALPHA_PATTERN);
        assert_ne!(ALPHA_PATTERN.rotated(), ALPHA_PATTERN);

        let bitmap = NormalizedBitmap::from_pattern(&BETA_PATTERN);
        assert_eq!(bitmap.rotated().rotated().rotated().rotated(), bitmap);
    }

    #[test]
    fn bitmap_rotation_tracks_pattern_rotation() {
        let bitmap = NormalizedBitmap::from_pattern(&GAMMA_PATTERN).rotated();
        assert!(bitmap.matches(&GAMMA_PATTERN.rotated(), 128));
        assert!(!bitmap.matches(&GAMMA_PATTERN, 128));
    }

    #[test]
    fn bright_border_never_matches() {
        let mut pixels = NormalizedBitmap::from_pattern(&DELTA_PATTERN).pixels().to_vec();
        pixels[0] = 200;
        let bitmap = NormalizedBitmap::new(5, pixels).unwrap();
        assert!(!bitmap.matches(&DELTA_PATTERN, 128));
    }

    #[test]
    fn only_bordered_pattern_size_matches() {
        let bitmap = NormalizedBitmap::from_pattern(&ALPHA_PATTERN);
        assert_eq!(bitmap.pixels().len(), BITMAP_SIZE * BITMAP_SIZE);
        assert!(bitmap.matches(&ALPHA_PATTERN, 128));

        // same pattern with a two-cell border: valid bitmap, wrong size
        let wide = NormalizedBitmap::from_fn(BITMAP_SIZE + 2, |r, c| {
            let inner = (2..2 + PATTERN_SIZE).contains(&r) && (2..2 + PATTERN_SIZE).contains(&c);
            if inner && ALPHA_PATTERN.cell(r - 2, c - 2) { 255 } else { 0 }
        });
        assert!(!wide.matches(&ALPHA_PATTERN, 128));
    }

    #[test]
    fn rejects_wrong_pixel_count() {
        let err = NormalizedBitmap::new(5, vec![0; 24]).unwrap_err();
        assert_eq!(
            err,
            BitmapError::SizeMismatch {
                expected: 25,
                actual: 24
            }
        );
    }
}
