//! angle.rs
//! Arm rotation from the four marker positions.
//!
//! ALPHA and BETA span the base direction, GAMMA and DELTA the arm direction.
//! The result is the signed angle from base to arm in degrees, counter-clockwise
//! positive as seen in the image (whose y axis points down), in (-180, 180].

use crate::error::GeometryError;
use crate::perception::glyph::{CornerSet, GLYPH_COUNT, GlyphIdentity, Point};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleEstimator {
    min_separation: f64,
}

impl AngleEstimator {
    pub fn new(min_separation: f64) -> Self {
        Self { min_separation }
    }

    /// `glyphs` is indexed by `GlyphIdentity::index`.
    pub fn estimate(&self, glyphs: &[CornerSet; GLYPH_COUNT]) -> Result<f64, GeometryError> {
        for identity in GlyphIdentity::ALL {
            if !glyphs[identity.index()].is_finite() {
                return Err(GeometryError::NonFinite(identity));
            }
        }
        let base = self.direction(glyphs, GlyphIdentity::Alpha, GlyphIdentity::Beta)?;
        let arm = self.direction(glyphs, GlyphIdentity::Gamma, GlyphIdentity::Delta)?;

        let cross = base.x * arm.y - base.y * arm.x;
        let dot = base.x * arm.x + base.y * arm.y;
        // image y grows downwards, so a positive cross product is clockwise on screen
        let degrees = -cross.atan2(dot).to_degrees();
        Ok(if degrees <= -180.0 { degrees + 360.0 } else { degrees })
    }

    fn direction(
        &self,
        glyphs: &[CornerSet; GLYPH_COUNT],
        from: GlyphIdentity,
        to: GlyphIdentity,
    ) -> Result<Point, GeometryError> {
        let a = glyphs[from.index()].centroid();
        let b = glyphs[to.index()].centroid();
        let separation = a.distance(&b);
        if separation < self.min_separation || separation == 0.0 {
            return Err(GeometryError::CoincidentMarkers {
                from,
                to,
                separation,
                min_separation: self.min_separation,
            });
        }
        Ok(Point::new(b.x - a.x, b.y - a.y))
    }
}
