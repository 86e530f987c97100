use super::position::MetricPosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteKind {
    TapStart,
    /// Hold or roll head.
    HoldStart,
    HoldEnd,
}

/// One note of a chart, as handed to the analysis engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub time_seconds: f64,
    pub position: MetricPosition,
    pub lane: usize,
    pub kind: NoteKind,
}

impl NoteEvent {
    pub fn new(time_seconds: f64, position: MetricPosition, lane: usize, kind: NoteKind) -> Self {
        Self {
            time_seconds,
            position,
            lane,
            kind,
        }
    }
}
