use super::groups::StepGroup;
use crate::config::{DENSE_RATIOS, SPARSE_RATIO};
use serde::Serialize;

/// Instantaneous NPS per note.
///
/// The first stepped group has no preceding interval, so its notes take the
/// second group's value once that is known.
#[derive(Debug, Clone, Default)]
pub struct DensitySampler {
    previous_time: Option<f64>,
    pending_first: Option<u32>,
    samples: Vec<f64>,
    peak: f64,
}

impl DensitySampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples one group. Returns `None` for groups without steps and for
    /// the chart's first stepped group.
    pub fn sample(&mut self, group: &StepGroup) -> Option<(f64, bool)> {
        if !group.is_step() {
            return None;
        }
        let Some(previous_time) = self.previous_time.replace(group.time) else {
            self.pending_first = Some(group.step_count);
            return None;
        };

        let delta = group.time - previous_time;
        let nps = if delta > 0.0 {
            group.step_count as f64 / delta
        } else {
            0.0
        };

        if let Some(first_count) = self.pending_first.take() {
            self.push(nps, first_count);
        }
        self.push(nps, group.step_count);

        let is_peak = nps > self.peak;
        if is_peak {
            self.peak = nps;
        }
        Some((nps, is_peak))
    }

    fn push(&mut self, nps: f64, count: u32) {
        self.samples
            .extend(std::iter::repeat_n(nps, count as usize));
    }

    /// Per-note samples in chart order. A chart with a single stepped group
    /// has nothing to borrow from and samples as zero.
    pub fn finish(mut self) -> (Vec<f64>, f64) {
        if let Some(first_count) = self.pending_first.take() {
            self.push(0.0, first_count);
        }
        (self.samples, self.peak)
    }
}

/// Share of notes at each density band, relative to the chart average.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DensityBuckets {
    /// Below half the average.
    pub sparse: f64,
    /// Above 2x, up to 3x.
    pub dense_2x: f64,
    /// Above 3x, up to 4x.
    pub dense_3x: f64,
    /// Above 4x.
    pub dense_4x: f64,
}

impl DensityBuckets {
    pub fn from_samples(samples: &[f64], average_nps: f64) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let [r2, r3, r4] = DENSE_RATIOS;
        let mut counts = [0usize; 4];
        for &nps in samples {
            if nps < average_nps * SPARSE_RATIO {
                counts[0] += 1;
            } else if nps > average_nps * r4 {
                counts[3] += 1;
            } else if nps > average_nps * r3 {
                counts[2] += 1;
            } else if nps > average_nps * r2 {
                counts[1] += 1;
            }
        }
        let total = samples.len() as f64;
        Self {
            sparse: counts[0] as f64 / total,
            dense_2x: counts[1] as f64 / total,
            dense_3x: counts[2] as f64 / total,
            dense_4x: counts[3] as f64 / total,
        }
    }
}

/// Steps over the span between the first and last step. Zero when the span
/// is empty.
pub fn average_nps(total_steps: u32, first_time: f64, last_time: f64) -> f64 {
    let span = last_time - first_time;
    if span > 0.0 {
        total_steps as f64 / span
    } else {
        0.0
    }
}
