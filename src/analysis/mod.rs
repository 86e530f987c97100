//! Step-pattern segmentation and density analysis for a single chart.
//!
//! A chart's notes are folded into step groups (one per metric position).
//! Each group updates hold state, is sampled for instantaneous NPS and is fed
//! to the side-run segmenter. The pass is sequential and owns all of its
//! state; charts are independent and can be analyzed on separate threads.

pub mod density;
pub mod event;
pub mod groups;
pub mod position;
pub mod segments;
pub mod sides;
pub mod summary;

use density::{DensityBuckets, DensitySampler, average_nps};
use event::NoteEvent;
use groups::StepGroups;
use log::{debug, trace, warn};
use segments::{Denominators, PartitionedSegments, Segmenter, SideRunSegment};
use serde::Serialize;
use sides::SideHoldTracker;
use std::thread;
use summary::{ChartStatsSummary, StepCounts};

/// Identity of a chart, copied untouched into report rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChartMeta {
    pub pack: String,
    pub title: String,
    pub steps_type: String,
    pub difficulty: String,
    pub meter: String,
    pub display_bpm: String,
    pub hash: String,
}

/// A chart ready for analysis: lane count plus its notes in time order.
#[derive(Debug, Clone)]
pub struct ChartDescriptor {
    pub num_inputs: usize,
    pub events: Vec<NoteEvent>,
    pub meta: ChartMeta,
}

#[derive(Debug, Clone)]
pub struct ChartAnalysis {
    pub summary: ChartStatsSummary,
    /// Finished side runs in chart order.
    pub segments: Vec<SideRunSegment>,
    /// One instantaneous NPS value per step.
    pub nps_samples: Vec<f64>,
}

impl ChartAnalysis {
    pub fn partitioned(&self) -> PartitionedSegments {
        PartitionedSegments::from_segments(&self.segments)
    }
}

/// Analyzes one chart. Returns `None` for a chart without any steps.
pub fn analyze_chart(
    chart: &ChartDescriptor,
    denominators: &Denominators,
) -> Option<ChartAnalysis> {
    let num_inputs = chart.num_inputs;
    let mut tracker = SideHoldTracker::new(num_inputs);
    let mut segmenter = Segmenter::new(denominators);
    let mut sampler = DensitySampler::new();
    let mut counts = StepCounts::new(num_inputs);

    for group in StepGroups::new(&chart.events, num_inputs) {
        let update = tracker.update(&group);
        counts.count(&group);
        if let Some((nps, true)) = sampler.sample(&group) {
            trace!("New peak of {:.2} nps at {}", nps, group.position);
        }
        segmenter.step(&group, &update);
    }

    if counts.total_steps == 0 {
        debug!(
            "Chart '{}' ({} {}) has no steps, skipping.",
            chart.meta.title, chart.meta.steps_type, chart.meta.difficulty
        );
        return None;
    }

    let (nps_samples, peak_nps) = sampler.finish();
    let first_step_time = counts.first_step_time.unwrap_or(counts.last_step_time);
    let average = average_nps(counts.total_steps, first_step_time, counts.last_step_time);
    let density = DensityBuckets::from_samples(&nps_samples, average);
    let open_steps = segmenter.state().steps_on_current_side();
    let segments = segmenter.finish();

    debug!(
        "Analyzed '{}' ({} {}): {} steps, avg {:.2}/peak {:.2} nps, {} runs, {} steps left open",
        chart.meta.title,
        chart.meta.steps_type,
        chart.meta.difficulty,
        counts.total_steps,
        average,
        peak_nps,
        segments.len(),
        open_steps
    );

    Some(ChartAnalysis {
        summary: ChartStatsSummary {
            total_steps: counts.total_steps,
            duration_seconds: counts.duration_seconds(),
            lane_counts: counts.lanes,
            jumps: counts.jumps,
            hands: counts.hands,
            holds: counts.holds,
            average_nps: average,
            peak_nps,
            density,
        },
        segments,
        nps_samples,
    })
}

/// Analyzes charts on up to `jobs` worker threads. Results keep the order of
/// `charts`.
pub fn analyze_all(
    charts: &[ChartDescriptor],
    denominators: &Denominators,
    jobs: usize,
) -> Vec<Option<ChartAnalysis>> {
    let jobs = jobs.clamp(1, charts.len().max(1));
    if jobs == 1 {
        return charts.iter().map(|c| analyze_chart(c, denominators)).collect();
    }

    let chunk_size = charts.len().div_ceil(jobs);
    thread::scope(|scope| {
        let handles: Vec<_> = charts
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|c| analyze_chart(c, denominators))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut results = Vec::with_capacity(charts.len());
        for (handle, chunk) in handles.into_iter().zip(charts.chunks(chunk_size)) {
            match handle.join() {
                Ok(chunk_results) => results.extend(chunk_results),
                Err(_) => {
                    warn!("Analysis worker panicked; {} charts dropped.", chunk.len());
                    results.extend(chunk.iter().map(|_| None));
                }
            }
        }
        results
    })
}

#[cfg(test)]
mod tests {
    use super::event::NoteKind;
    use super::position::MetricPosition;
    use super::segments::RunClassification;
    use super::*;

    fn chart(lanes: &[usize], rows: u32, spb: f64) -> ChartDescriptor {
        let events = lanes
            .iter()
            .enumerate()
            .map(|(i, &lane)| {
                let i = i as u32;
                let pos = MetricPosition::from_row(i / rows, i % rows, rows);
                NoteEvent::new(pos.to_beats() * spb, pos, lane, NoteKind::TapStart)
            })
            .collect();
        ChartDescriptor {
            num_inputs: 4,
            events,
            meta: ChartMeta {
                title: "test".into(),
                ..ChartMeta::default()
            },
        }
    }

    #[test]
    fn empty_chart_yields_nothing() {
        let c = chart(&[], 4, 0.5);
        assert!(analyze_chart(&c, &Denominators::default()).is_none());
    }

    #[test]
    fn hold_tails_only_chart_yields_nothing() {
        let pos = MetricPosition::from_row(0, 0, 4);
        let c = ChartDescriptor {
            num_inputs: 4,
            events: vec![NoteEvent::new(0.0, pos, 1, NoteKind::HoldEnd)],
            meta: ChartMeta::default(),
        };
        assert!(analyze_chart(&c, &Denominators::default()).is_none());
    }

    #[test]
    fn sample_count_matches_steps() {
        let lanes = [0, 1, 2, 3, 3, 2, 1, 0, 0, 2];
        let a = analyze_chart(&chart(&lanes, 16, 0.5), &Denominators::default()).unwrap();
        assert_eq!(a.nps_samples.len() as u32, a.summary.total_steps);
        assert_eq!(a.summary.lane_counts.iter().sum::<u32>(), a.summary.total_steps);
        let fractions: f64 = a.summary.lane_fractions().iter().sum();
        assert!((fractions - 1.0).abs() < 1e-9);
        for seg in &a.segments {
            assert!(seg.step_count >= 1);
            assert!(seg.duration_seconds >= 0.0);
        }
    }

    #[test]
    fn uniform_stream_statistics() {
        // Sixteenths at 120 BPM: 0.125s apart, 8 nps.
        let lanes = [0, 1, 2, 3].repeat(8);
        let a = analyze_chart(&chart(&lanes, 16, 0.5), &Denominators::default()).unwrap();
        assert_eq!(a.summary.total_steps, 32);
        assert!((a.summary.peak_nps - 8.0).abs() < 1e-9);
        assert!(a.nps_samples.iter().all(|&n| (n - 8.0).abs() < 1e-9));
        assert!((a.summary.average_nps - 32.0 / (31.0 * 0.125)).abs() < 1e-9);
        assert_eq!(a.summary.density, DensityBuckets::default());
        assert!(!a.segments.is_empty());
        let parts = a.partitioned();
        assert!(parts.variable.is_empty());
        assert_eq!(parts.len(), a.segments.len());
        assert!(
            a.segments
                .iter()
                .all(|s| s.classification == RunClassification::ConstantRhythm(16))
        );
    }

    #[test]
    fn parallel_results_keep_input_order() {
        let charts: Vec<_> = (1..=7)
            .map(|n| chart(&[0, 1, 2, 3].repeat(n), 8, 0.5))
            .collect();
        let denominators = Denominators::default();
        let serial = analyze_all(&charts, &denominators, 1);
        let parallel = analyze_all(&charts, &denominators, 3);
        assert_eq!(serial.len(), parallel.len());
        for (s, p) in serial.iter().zip(&parallel) {
            let (s, p) = (s.as_ref().unwrap(), p.as_ref().unwrap());
            assert_eq!(s.summary, p.summary);
            assert_eq!(s.segments, p.segments);
        }
    }
}
