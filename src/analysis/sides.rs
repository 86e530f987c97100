use super::groups::StepGroup;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// The side a group is fully on. Jumps spanning both halves and
    /// hold-tail-only groups belong to neither.
    pub fn of(group: &StepGroup) -> Option<Side> {
        match (group.is_left, group.is_right) {
            (true, false) => Some(Side::Left),
            (false, true) => Some(Side::Right),
            _ => None,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SideUpdate {
    pub held_left: bool,
    pub held_right: bool,
    /// Every stepped lane was also stepped by the previous stepped group.
    pub jack: bool,
}

impl SideUpdate {
    #[inline]
    pub fn held_on(&self, side: Side) -> bool {
        match side {
            Side::Left => self.held_left,
            Side::Right => self.held_right,
        }
    }
}

/// Per-lane hold flags plus the lane set of the last stepped group.
#[derive(Debug, Clone)]
pub struct SideHoldTracker {
    held: Vec<bool>,
    half: usize,
    last_step_lanes: Option<Vec<usize>>,
}

impl SideHoldTracker {
    pub fn new(num_inputs: usize) -> Self {
        Self {
            held: vec![false; num_inputs],
            half: num_inputs / 2,
            last_step_lanes: None,
        }
    }

    pub fn update(&mut self, group: &StepGroup) -> SideUpdate {
        for &lane in &group.hold_ends {
            if let Some(flag) = self.held.get_mut(lane) {
                *flag = false;
            }
        }
        for &lane in &group.hold_starts {
            if let Some(flag) = self.held.get_mut(lane) {
                *flag = true;
            }
        }

        let jack = group.is_step()
            && self
                .last_step_lanes
                .as_deref()
                .is_some_and(|prev| {
                    group
                        .touched_lanes
                        .iter()
                        .all(|lane| prev.binary_search(lane).is_ok())
                });

        if group.is_step() {
            self.last_step_lanes = Some(group.touched_lanes.clone());
        }

        SideUpdate {
            held_left: self.held[..self.half].iter().any(|&h| h),
            held_right: self.held[self.half..].iter().any(|&h| h),
            jack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::position::MetricPosition;

    fn group(lanes: &[usize], starts: &[usize], ends: &[usize]) -> StepGroup {
        StepGroup {
            time: 0.0,
            position: MetricPosition::default(),
            touched_lanes: lanes.to_vec(),
            is_left: lanes.iter().any(|&l| l < 2),
            is_right: lanes.iter().any(|&l| l >= 2),
            step_count: lanes.len() as u32,
            hold_starts: starts.to_vec(),
            hold_ends: ends.to_vec(),
        }
    }

    #[test]
    fn side_of_group() {
        assert_eq!(Side::of(&group(&[0, 1], &[], &[])), Some(Side::Left));
        assert_eq!(Side::of(&group(&[3], &[], &[])), Some(Side::Right));
        assert_eq!(Side::of(&group(&[0, 3], &[], &[])), None);
        assert_eq!(Side::of(&group(&[], &[], &[2])), None);
        assert_eq!(Side::Left.opposite(), Side::Right);
    }

    #[test]
    fn holds_persist_until_their_tail() {
        let mut tracker = SideHoldTracker::new(4);
        let u = tracker.update(&group(&[3], &[3], &[]));
        assert!(u.held_right && !u.held_left);
        let u = tracker.update(&group(&[0], &[], &[]));
        assert!(u.held_right);
        let u = tracker.update(&group(&[], &[], &[3]));
        assert!(!u.held_right);
    }

    #[test]
    fn jack_means_no_new_lane_stepped() {
        let mut tracker = SideHoldTracker::new(4);
        assert!(!tracker.update(&group(&[0], &[], &[])).jack);
        assert!(tracker.update(&group(&[0], &[], &[])).jack);
        assert!(!tracker.update(&group(&[0, 1], &[], &[])).jack);
        // Hold tails in between do not reset the comparison.
        tracker.update(&group(&[], &[], &[1]));
        assert!(tracker.update(&group(&[0, 1], &[], &[])).jack);
        // A subset of the previous lanes is still the same feet repeating.
        assert!(tracker.update(&group(&[1], &[], &[])).jack);
        assert!(!tracker.update(&group(&[2], &[], &[])).jack);
    }
}
