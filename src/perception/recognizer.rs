//! recognizer.rs
//! Classifies sampled bitmaps against the known glyph patterns.
//!
//! Each pattern is tried at 0°, 90°, 180° and 270°; the first orientation that
//! matches decides the identity and the marker's quarter-turn count. Corner
//! order is canonicalised from positions alone, so it does not depend on which
//! orientation matched.

use crate::config::RecognizerConfig;
use crate::error::ConfigError;
use crate::perception::glyph::{Candidate, CornerSet, GlyphIdentity, GlyphPattern, GLYPH_COUNT};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recognition {
    pub identity: GlyphIdentity,
    pub corners: CornerSet,
    /// Clockwise quarter turns of the marker relative to its pattern.
    pub quarter_turns: u8,
}

#[derive(Debug, Clone)]
pub struct GlyphRecognizer {
    /// Per identity, the pattern in each of its four orientations.
    orientations: [[GlyphPattern; 4]; GLYPH_COUNT],
    bright_threshold: u8,
}

impl GlyphRecognizer {
    pub fn new(config: &RecognizerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let orientations = GlyphIdentity::ALL.map(|id| config.pattern(id).orientations());
        Ok(Self {
            orientations,
            bright_threshold: config.bright_threshold,
        })
    }

    /// Identify `candidate`, or `None` if it matches no pattern.
    pub fn recognize(&self, candidate: &Candidate) -> Option<Recognition> {
        if !candidate.corners.iter().all(|p| p.is_finite()) {
            return None;
        }
        let (identity, quarter_turns) = self.classify(candidate)?;
        Some(Recognition {
            identity,
            corners: CornerSet::canonical(candidate.corners),
            quarter_turns,
        })
    }

    fn classify(&self, candidate: &Candidate) -> Option<(GlyphIdentity, u8)> {
        let bitmap = &candidate.bitmap;
        for identity in GlyphIdentity::ALL {
            let turns = self.orientations[identity.index()]
                .iter()
                .position(|pattern| bitmap.matches(pattern, self.bright_threshold));
            if let Some(turns) = turns {
                return Some((identity, turns as u8));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::glyph::{
        ALPHA_PATTERN, BETA_PATTERN, DELTA_PATTERN, GAMMA_PATTERN, NormalizedBitmap, Point,
    };

    fn recognizer() -> GlyphRecognizer {
        GlyphRecognizer::new(&RecognizerConfig::default()).unwrap()
    }

    fn corners() -> [Point; 4] {
        [
            Point::new(120.0, 80.0),
            Point::new(160.0, 84.0),
            Point::new(156.0, 124.0),
            Point::new(116.0, 120.0),
        ]
    }

    fn candidate(bitmap: NormalizedBitmap, corners: [Point; 4]) -> Candidate {
        Candidate { corners, bitmap }
    }

    #[test]
    fn recognises_each_default_pattern() {
        let patterns = [
            (GlyphIdentity::Alpha, ALPHA_PATTERN),
            (GlyphIdentity::Beta, BETA_PATTERN),
            (GlyphIdentity::Gamma, GAMMA_PATTERN),
            (GlyphIdentity::Delta, DELTA_PATTERN),
        ];
        let r = recognizer();
        for (identity, pattern) in patterns {
            let found = r
                .recognize(&candidate(NormalizedBitmap::from_pattern(&pattern), corners()))
                .expect("pattern should match");
            assert_eq!(found.identity, identity);
            assert_eq!(found.quarter_turns, 0);
        }
    }

    #[test]
    fn recognition_is_rotation_invariant() {
        let r = recognizer();
        let upright = r
            .recognize(&candidate(NormalizedBitmap::from_pattern(&BETA_PATTERN), corners()))
            .unwrap();

        let mut bitmap = NormalizedBitmap::from_pattern(&BETA_PATTERN);
        let mut raw = corners();
        for turn in 1..4u8 {
            // the physical marker turns clockwise; the sampled bitmap and the
            // capture order of its corners turn with it
            bitmap = bitmap.rotated();
            raw.rotate_right(1);
            let found = r.recognize(&candidate(bitmap.clone(), raw)).unwrap();
            assert_eq!(found.identity, GlyphIdentity::Beta);
            assert_eq!(found.corners, upright.corners);
            assert_eq!(found.quarter_turns, turn);
        }
    }

    #[test]
    fn noise_is_ignored() {
        let r = recognizer();
        let blank = NormalizedBitmap::new(5, vec![0; 25]).unwrap();
        assert!(r.recognize(&candidate(blank, corners())).is_none());

        let bright = NormalizedBitmap::new(5, vec![255; 25]).unwrap();
        assert!(r.recognize(&candidate(bright, corners())).is_none());

        let wrong_size = NormalizedBitmap::new(4, vec![0; 16]).unwrap();
        assert!(r.recognize(&candidate(wrong_size, corners())).is_none());
    }

    #[test]
    fn non_finite_corners_are_discarded() {
        let r = recognizer();
        let mut raw = corners();
        raw[2] = Point::new(f64::NAN, 3.0);
        let bitmap = NormalizedBitmap::from_pattern(&ALPHA_PATTERN);
        assert!(r.recognize(&candidate(bitmap, raw)).is_none());
    }

    #[test]
    fn threshold_decides_brightness() {
        let mut pixels = NormalizedBitmap::from_pattern(&GAMMA_PATTERN).pixels().to_vec();
        for p in pixels.iter_mut().filter(|p| **p == 255) {
            *p = 90;
        }
        let dim = NormalizedBitmap::new(5, pixels).unwrap();

        assert!(recognizer().recognize(&candidate(dim.clone(), corners())).is_none());

        let lenient =
            GlyphRecognizer::new(&RecognizerConfig::new().with_bright_threshold(80)).unwrap();
        let found = lenient.recognize(&candidate(dim, corners())).unwrap();
        assert_eq!(found.identity, GlyphIdentity::Gamma);
    }
}
