use super::groups::StepGroup;
use super::position::{BEATS_PER_MEASURE, MetricPosition};
use super::sides::{Side, SideUpdate};
use crate::config::{BEAT_SPACING_TOLERANCE, DEFAULT_DENOMINATORS, STEP_DELTA_TOLERANCE_SEC};
use log::trace;
use serde::Serialize;
use std::collections::BTreeMap;

/// Ordered set of note values that get their own segment column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denominators {
    values: Vec<u32>,
}

impl Denominators {
    /// Sorts and dedups; zero entries are dropped. An empty list falls back
    /// to the defaults.
    pub fn new(mut values: Vec<u32>) -> Self {
        values.retain(|&d| d > 0);
        values.sort_unstable();
        values.dedup();
        if values.is_empty() {
            return Self::default();
        }
        Self { values }
    }

    pub fn values(&self) -> &[u32] {
        &self.values
    }

    /// The finest valid denominator, used for anything unrecognized.
    pub fn fallback(&self) -> u32 {
        self.values.last().copied().unwrap_or(0)
    }

    pub fn contains(&self, denominator: u32) -> bool {
        self.values.binary_search(&denominator).is_ok()
    }

    pub fn bucket_for(&self, denominator: u32) -> u32 {
        if self.contains(denominator) {
            denominator
        } else {
            self.fallback()
        }
    }
}

impl Default for Denominators {
    fn default() -> Self {
        Self {
            values: DEFAULT_DENOMINATORS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunClassification {
    ConstantRhythm(u32),
    VariableTiming,
}

/// A finished side run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SideRunSegment {
    pub duration_seconds: f64,
    pub step_count: u32,
    pub classification: RunClassification,
}

/// Segments grouped by output column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionedSegments {
    pub by_denominator: BTreeMap<u32, Vec<SideRunSegment>>,
    pub variable: Vec<SideRunSegment>,
}

impl PartitionedSegments {
    pub fn from_segments(segments: &[SideRunSegment]) -> Self {
        let mut out = Self::default();
        for seg in segments {
            match seg.classification {
                RunClassification::ConstantRhythm(d) => {
                    out.by_denominator.entry(d).or_default().push(*seg)
                }
                RunClassification::VariableTiming => out.variable.push(*seg),
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.variable.len() + self.by_denominator.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct PreviousStep {
    side: Option<Side>,
    time: f64,
    position: MetricPosition,
}

/// Mutable state of the run on the current side.
#[derive(Debug, Clone, Default)]
pub struct SideRunState {
    current_side: Option<Side>,
    steps_on_current_side: u32,
    time_of_first_step: f64,
    greatest_denominator: u32,
    uses_variable_timing: bool,
    previous: Option<PreviousStep>,
    /// Elapsed time between the last two steps of the chart, not of the run.
    previous_delta: Option<f64>,
}

impl SideRunState {
    pub fn steps_on_current_side(&self) -> u32 {
        self.steps_on_current_side
    }

    /// Cross-side check: the gap into the step that ends the run must be
    /// exactly one subdivision of the finest note value seen in the run.
    fn check_run_spacing(&mut self, position: &MetricPosition) {
        if self.greatest_denominator == 0 {
            return;
        }
        let Some(prev) = self.previous else {
            return;
        };
        let expected = BEATS_PER_MEASURE as f64 / self.greatest_denominator as f64;
        let gap_error = position.to_beats() - (prev.position.to_beats() + expected);
        if gap_error.abs() > BEAT_SPACING_TOLERANCE {
            self.uses_variable_timing = true;
        }
    }

    /// Within-side check: consecutive step deltas must match. Compared
    /// against the previous delta of the whole chart, so a run can inherit
    /// irregularity from the gap that preceded it.
    fn check_step_spacing(&mut self, time: f64) {
        let Some(prev) = self.previous else {
            return;
        };
        let delta = time - prev.time;
        if let Some(prev_delta) = self.previous_delta {
            if (delta - prev_delta).abs() > STEP_DELTA_TOLERANCE_SEC {
                self.uses_variable_timing = true;
            }
        }
        self.previous_delta = Some(delta);
    }

    /// Closes the open run at `position`/`time`, returning the finished
    /// segment and resetting the run fields.
    pub fn close_run(
        &mut self,
        position: &MetricPosition,
        time: f64,
        denominators: &Denominators,
    ) -> Option<SideRunSegment> {
        self.check_run_spacing(position);

        let classification = if self.uses_variable_timing {
            RunClassification::VariableTiming
        } else {
            RunClassification::ConstantRhythm(denominators.bucket_for(self.greatest_denominator))
        };
        let segment = (self.steps_on_current_side > 0).then(|| SideRunSegment {
            duration_seconds: (time - self.time_of_first_step).max(0.0),
            step_count: self.steps_on_current_side,
            classification,
        });

        self.steps_on_current_side = 0;
        self.time_of_first_step = 0.0;
        self.uses_variable_timing = false;
        self.greatest_denominator = 0;
        segment
    }

    fn record_step(&mut self, group: &StepGroup, note_values: impl Iterator<Item = u32>) {
        if self.steps_on_current_side == 0 {
            self.time_of_first_step = group.time;
        }
        self.steps_on_current_side += 1;
        for value in note_values {
            self.greatest_denominator = self.greatest_denominator.max(value);
        }
        self.check_step_spacing(group.time);
        self.previous = Some(PreviousStep {
            side: Side::of(group),
            time: group.time,
            position: group.position,
        });
    }
}

/// Splits a chart's stepped groups into side runs.
#[derive(Debug)]
pub struct Segmenter<'d> {
    state: SideRunState,
    denominators: &'d Denominators,
    segments: Vec<SideRunSegment>,
}

impl<'d> Segmenter<'d> {
    pub fn new(denominators: &'d Denominators) -> Self {
        Self {
            state: SideRunState::default(),
            denominators,
            segments: Vec::new(),
        }
    }

    pub fn state(&self) -> &SideRunState {
        &self.state
    }

    /// The side this group commits to, if any: fully on that side after a
    /// step that was also fully on it, nothing held on the other side, and
    /// not a jack.
    pub fn recognized_transition(&self, group: &StepGroup, update: &SideUpdate) -> Option<Side> {
        let side = Side::of(group)?;
        let prev_side = self.state.previous.and_then(|p| p.side)?;
        (prev_side == side && !update.held_on(side.opposite()) && !update.jack).then_some(side)
    }

    /// Feeds one group. Groups without steps are ignored.
    pub fn step(&mut self, group: &StepGroup, update: &SideUpdate) {
        if !group.is_step() {
            return;
        }

        let transition = self
            .recognized_transition(group, update)
            .filter(|&side| self.state.current_side != Some(side));
        if let Some(side) = transition {
            if self.state.current_side.is_some() {
                let closed = self.state.close_run(&group.position, group.time, self.denominators);
                if let Some(segment) = closed {
                    trace!(
                        "Closed {:?} run at {}: {} steps, {:.3}s, {:?}",
                        self.state.current_side,
                        group.position,
                        segment.step_count,
                        segment.duration_seconds,
                        segment.classification
                    );
                    self.segments.push(segment);
                }
            }
            self.state.current_side = Some(side);
        }

        // Every note of a group shares its position, so each folds in the
        // same note value.
        let note_value = group.position.note_value();
        let note_values = std::iter::repeat_n(note_value, group.step_count as usize);
        self.state.record_step(group, note_values);
    }

    /// Completed runs in chart order. The run still open at the end of the
    /// chart is dropped.
    pub fn finish(self) -> Vec<SideRunSegment> {
        if self.state.steps_on_current_side > 0 {
            trace!(
                "Discarding open {:?} run of {} steps at end of chart",
                self.state.current_side,
                self.state.steps_on_current_side
            );
        }
        self.segments
    }
}
