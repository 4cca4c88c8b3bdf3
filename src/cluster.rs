//! Grouping candidate pixels into 4-connected regions.
//!
//! The clusterer scans the mask in row-major order and flood-fills each
//! unvisited candidate with a breadth-first traversal. Every pixel is
//! enqueued at most once, so a pass is linear in the grid size. The visited
//! flags and the work queue are kept on the clusterer and reused between
//! calls.

use std::collections::VecDeque;

use crate::mask::CandidateMask;

/// Inclusive pixel bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub min_col: usize,
    pub min_row: usize,
    pub max_col: usize,
    pub max_row: usize,
}

impl PixelRect {
    fn point(col: usize, row: usize) -> Self {
        Self {
            min_col: col,
            min_row: row,
            max_col: col,
            max_row: row,
        }
    }

    fn include(&mut self, col: usize, row: usize) {
        self.min_col = self.min_col.min(col);
        self.min_row = self.min_row.min(row);
        self.max_col = self.max_col.max(col);
        self.max_row = self.max_row.max(row);
    }

    pub fn width(&self) -> usize {
        self.max_col - self.min_col + 1
    }

    pub fn height(&self) -> usize {
        self.max_row - self.min_row + 1
    }
}

/// A maximal 4-connected set of candidate pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Position of this region in scan order, starting at 0.
    pub scan_order: usize,
    /// Flat index of the first pixel reached by the scan.
    pub seed: usize,
    /// Flat row-major indices of every member pixel.
    pub pixels: Vec<usize>,
    pub mean_change: f64,
    pub min_change: f64,
    pub bounds: PixelRect,
    /// Mean column and row of the member pixels.
    pub centroid: (f64, f64),
}

impl Region {
    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }
}

/// Running statistics over a region's change values.
///
/// Values are summed as offsets from the first one, with Neumaier
/// compensation, so a region whose pixels all hold the same value has
/// exactly that value as its mean. The mean is also kept within
/// `[min, max]`.
#[derive(Debug, Clone, Copy)]
struct ChangeStats {
    base: f64,
    sum: f64,
    compensation: f64,
    count: usize,
    min: f64,
    max: f64,
}

impl ChangeStats {
    fn new() -> Self {
        Self {
            base: 0.0,
            sum: 0.0,
            compensation: 0.0,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.base = value;
        }
        let offset = value - self.base;
        let total = self.sum + offset;
        if self.sum.abs() >= offset.abs() {
            self.compensation += (self.sum - total) + offset;
        } else {
            self.compensation += (offset - total) + self.sum;
        }
        self.sum = total;
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// NaN when no value was pushed.
    fn mean(&self) -> f64 {
        if self.count == 0 {
            return f64::NAN;
        }
        let mean = self.base + (self.sum + self.compensation) / self.count as f64;
        mean.clamp(self.min, self.max)
    }
}

/// Reusable 4-connected flood-fill labeller.
#[derive(Debug, Default)]
pub struct RegionClusterer {
    visited: Vec<bool>,
    queue: VecDeque<usize>,
}

impl RegionClusterer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every connected component of `mask`, in seed scan order.
    pub fn cluster(&mut self, mask: &CandidateMask<'_>) -> Vec<Region> {
        let width = mask.width();
        let height = mask.height();
        let change = mask.change();

        self.visited.clear();
        self.visited.resize(width * height, false);
        self.queue.clear();

        let mut regions = Vec::new();

        for seed in 0..width * height {
            if self.visited[seed] || !mask.is_candidate(seed) {
                continue;
            }

            self.visited[seed] = true;
            self.queue.push_back(seed);

            let mut pixels = Vec::new();
            let mut bounds = PixelRect::point(seed % width, seed / width);
            let mut stats = ChangeStats::new();
            let mut col_sum = 0.0;
            let mut row_sum = 0.0;

            while let Some(idx) = self.queue.pop_front() {
                let col = idx % width;
                let row = idx / width;

                pixels.push(idx);
                bounds.include(col, row);
                col_sum += col as f64;
                row_sum += row as f64;
                if let Some(value) = change.get(idx) {
                    stats.push(value);
                }

                let neighbors = [
                    (row > 0).then(|| idx - width),
                    (col > 0).then(|| idx - 1),
                    (col + 1 < width).then(|| idx + 1),
                    (row + 1 < height).then(|| idx + width),
                ];
                for next in neighbors.into_iter().flatten() {
                    if !self.visited[next] && mask.is_candidate(next) {
                        self.visited[next] = true;
                        self.queue.push_back(next);
                    }
                }
            }

            let count = pixels.len() as f64;
            regions.push(Region {
                scan_order: regions.len(),
                seed,
                mean_change: stats.mean(),
                min_change: stats.min,
                bounds,
                centroid: (col_sum / count, row_sum / count),
                pixels,
            });
        }

        regions
    }
}
