use super::density::DensityBuckets;
use super::groups::StepGroup;
use serde::Serialize;

/// Step counts gathered while walking a chart's groups.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct StepCounts {
    pub total_steps: u32,
    pub lanes: Vec<u32>,
    pub jumps: u32,
    pub hands: u32,
    pub holds: u32,
    pub first_step_time: Option<f64>,
    pub last_step_time: f64,
    holding: u32,
}

impl StepCounts {
    pub fn new(num_inputs: usize) -> Self {
        Self {
            lanes: vec![0; num_inputs],
            ..Self::default()
        }
    }

    pub fn count(&mut self, group: &StepGroup) {
        let ends = group.hold_ends.len() as u32;
        if !group.is_step() {
            self.holding = self.holding.saturating_sub(ends);
            return;
        }

        self.total_steps += group.step_count;
        for &lane in &group.touched_lanes {
            if let Some(count) = self.lanes.get_mut(lane) {
                *count += 1;
            }
        }
        if group.is_jump() {
            self.jumps += 1;
        }
        // Three or more feet/hands down at once, counting active holds.
        let notes = group.step_count;
        if notes >= 3 || (self.holding == 1 && notes >= 2) || (self.holding >= 2 && notes >= 1) {
            self.hands += 1;
        }
        self.holds += group.hold_starts.len() as u32;
        self.holding = (self.holding + group.hold_starts.len() as u32).saturating_sub(ends);

        self.first_step_time.get_or_insert(group.time);
        self.last_step_time = group.time;
    }

    pub fn duration_seconds(&self) -> f64 {
        self.first_step_time
            .map_or(0.0, |first| (self.last_step_time - first).max(0.0))
    }
}

/// Aggregate statistics for one chart.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartStatsSummary {
    pub total_steps: u32,
    pub lane_counts: Vec<u32>,
    pub jumps: u32,
    pub hands: u32,
    pub holds: u32,
    pub duration_seconds: f64,
    pub average_nps: f64,
    pub peak_nps: f64,
    pub density: DensityBuckets,
}

impl ChartStatsSummary {
    /// Share of all steps landing in each lane.
    pub fn lane_fractions(&self) -> Vec<f64> {
        if self.total_steps == 0 {
            return vec![0.0; self.lane_counts.len()];
        }
        self.lane_counts
            .iter()
            .map(|&c| c as f64 / self.total_steps as f64)
            .collect()
    }
}
