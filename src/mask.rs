//! Thresholding the change raster into candidate pixels.

use crate::change::ChangeRaster;

/// Boolean grid of candidate pixels, borrowing the change values it was
/// derived from so regions can be summarised without a second lookup.
#[derive(Debug, Clone)]
pub struct CandidateMask<'a> {
    change: &'a ChangeRaster,
    flags: Vec<bool>,
    candidates: usize,
}

impl<'a> CandidateMask<'a> {
    pub fn width(&self) -> usize {
        self.change.width()
    }

    pub fn height(&self) -> usize {
        self.change.height()
    }

    pub fn is_candidate(&self, idx: usize) -> bool {
        self.flags.get(idx).copied().unwrap_or(false)
    }

    /// Number of `true` pixels.
    pub fn candidate_count(&self) -> usize {
        self.candidates
    }

    pub fn change(&self) -> &'a ChangeRaster {
        self.change
    }
}

/// Mark every valid pixel with `change <= change_threshold`.
pub fn threshold(change: &ChangeRaster, change_threshold: f64) -> CandidateMask<'_> {
    let flags: Vec<bool> = change
        .values()
        .iter()
        .map(|v| !v.is_nan() && *v <= change_threshold)
        .collect();
    let candidates = flags.iter().filter(|f| **f).count();

    CandidateMask {
        change,
        flags,
        candidates,
    }
}
