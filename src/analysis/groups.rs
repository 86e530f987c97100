use super::event::{NoteEvent, NoteKind};
use super::position::MetricPosition;
use std::iter::Peekable;
use std::slice;

/// All notes sharing one metric position. Several touched lanes make a jump.
#[derive(Debug, Clone, PartialEq)]
pub struct StepGroup {
    pub time: f64,
    pub position: MetricPosition,
    /// Lanes stepped on by tap or hold heads, sorted and unique.
    pub touched_lanes: Vec<usize>,
    pub is_left: bool,
    pub is_right: bool,
    /// Distinct lanes stepped on; always `touched_lanes.len()`.
    pub step_count: u32,
    pub hold_starts: Vec<usize>,
    pub hold_ends: Vec<usize>,
}

impl StepGroup {
    #[inline]
    pub fn is_step(&self) -> bool {
        self.step_count > 0
    }

    #[inline]
    pub fn is_jump(&self) -> bool {
        self.step_count >= 2
    }
}

/// Lazily folds an ordered event list into step groups.
pub struct StepGroups<'a> {
    events: Peekable<slice::Iter<'a, NoteEvent>>,
    half: usize,
}

impl<'a> StepGroups<'a> {
    pub fn new(events: &'a [NoteEvent], num_inputs: usize) -> Self {
        Self {
            events: events.iter().peekable(),
            half: num_inputs / 2,
        }
    }
}

fn fold_event(event: &NoteEvent, group: &mut StepGroup, half: usize) {
    match event.kind {
        NoteKind::HoldEnd => {
            group.hold_ends.push(event.lane);
            return;
        }
        NoteKind::HoldStart => group.hold_starts.push(event.lane),
        NoteKind::TapStart => {}
    }
    if event.lane < half {
        group.is_left = true;
    } else {
        group.is_right = true;
    }
    if let Err(idx) = group.touched_lanes.binary_search(&event.lane) {
        group.touched_lanes.insert(idx, event.lane);
        group.step_count += 1;
    }
}

impl Iterator for StepGroups<'_> {
    type Item = StepGroup;

    fn next(&mut self) -> Option<StepGroup> {
        let first = self.events.next()?;
        let mut group = StepGroup {
            time: first.time_seconds,
            position: first.position,
            touched_lanes: Vec::with_capacity(4),
            is_left: false,
            is_right: false,
            step_count: 0,
            hold_starts: Vec::new(),
            hold_ends: Vec::new(),
        };

        fold_event(first, &mut group, self.half);
        while let Some(event) = self.events.next_if(|e| e.position == group.position) {
            fold_event(event, &mut group, self.half);
        }
        Some(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(row: u32, rows: u32, lane: usize, kind: NoteKind) -> NoteEvent {
        let pos = MetricPosition::from_row(0, row, rows);
        NoteEvent::new(pos.to_beats() * 0.5, pos, lane, kind)
    }

    #[test]
    fn groups_by_identical_position() {
        let events = vec![
            ev(0, 4, 0, NoteKind::TapStart),
            ev(0, 4, 3, NoteKind::TapStart),
            ev(1, 4, 1, NoteKind::TapStart),
            ev(2, 8, 2, NoteKind::TapStart),
        ];
        let groups: Vec<_> = StepGroups::new(&events, 4).collect();
        // Row 2 of 8 lands on the same position as row 1 of 4.
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].touched_lanes, vec![0, 3]);
        assert!(groups[0].is_left && groups[0].is_right);
        assert!(groups[0].is_jump());
        assert_eq!(groups[1].touched_lanes, vec![1, 2]);
        assert_eq!(groups[1].step_count, 2);
    }

    #[test]
    fn hold_ends_do_not_count_as_steps() {
        let events = vec![
            ev(0, 4, 1, NoteKind::HoldStart),
            ev(1, 4, 1, NoteKind::HoldEnd),
            ev(2, 4, 2, NoteKind::HoldEnd),
            ev(2, 4, 0, NoteKind::TapStart),
        ];
        let groups: Vec<_> = StepGroups::new(&events, 4).collect();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].hold_starts, vec![1]);
        assert!(groups[0].is_left && !groups[0].is_right);
        assert!(!groups[1].is_step());
        assert!(groups[1].touched_lanes.is_empty());
        assert!(!groups[1].is_left && !groups[1].is_right);
        assert_eq!(groups[2].step_count, 1);
        assert_eq!(groups[2].hold_ends, vec![2]);
        assert!(groups[2].is_left && !groups[2].is_right);
    }

    #[test]
    fn side_split_uses_half_the_lane_count() {
        let events = vec![ev(0, 4, 3, NoteKind::TapStart), ev(1, 4, 4, NoteKind::TapStart)];
        let groups: Vec<_> = StepGroups::new(&events, 8).collect();
        assert!(groups[0].is_left && !groups[0].is_right);
        assert!(groups[1].is_right && !groups[1].is_left);
    }
}
