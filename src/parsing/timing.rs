/// Beat to seconds conversion for one chart, from its BPM changes and stops.
#[derive(Debug, Clone, Default)]
pub struct TimingData {
    beat_to_time: Vec<BeatTimePoint>,
    /// `(beat, duration)` sorted by beat.
    stops: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Default, Copy)]
struct BeatTimePoint {
    beat: f64,
    time_sec: f64,
    bpm: f64,
}

pub const FALLBACK_BPM: f64 = 120.0;

impl TimingData {
    /// `offset_sec` is the time of beat 0. `bpms` and `stops` must be sorted
    /// by beat, with positive values.
    pub fn new(offset_sec: f64, bpms: &[(f64, f64)], stops: &[(f64, f64)]) -> Self {
        let mut parsed_bpms = bpms.to_vec();
        if parsed_bpms.is_empty() {
            parsed_bpms.push((0.0, FALLBACK_BPM));
        }
        if parsed_bpms[0].0 > 0.0 {
            parsed_bpms.insert(0, (0.0, parsed_bpms[0].1));
        }

        let mut beat_to_time = Vec::with_capacity(parsed_bpms.len());
        let mut current_time = 0.0;
        let mut last_beat = parsed_bpms[0].0;
        let mut last_bpm = parsed_bpms[0].1;

        for &(beat, bpm) in &parsed_bpms {
            if beat > last_beat && last_bpm > 0.0 {
                current_time += (beat - last_beat) * (60.0 / last_bpm);
            }
            beat_to_time.push(BeatTimePoint {
                beat,
                time_sec: offset_sec + current_time,
                bpm,
            });
            last_beat = beat;
            last_bpm = bpm;
        }

        Self {
            beat_to_time,
            stops: stops.to_vec(),
        }
    }

    /// Seconds at which `target_beat` is hit. Stops strictly before the beat
    /// delay it; a stop on the beat itself happens after the note.
    pub fn get_time_for_beat(&self, target_beat: f64) -> f64 {
        let points = &self.beat_to_time;
        if points.is_empty() {
            return 0.0;
        }

        let point_idx = match points.binary_search_by(|p| {
            p.beat
                .partial_cmp(&target_beat)
                .unwrap_or(std::cmp::Ordering::Less)
        }) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let point = &points[point_idx];

        let mut time = point.time_sec;
        if point.bpm > 0.0 {
            time += (target_beat - point.beat) * (60.0 / point.bpm);
        }

        time + self
            .stops
            .iter()
            .take_while(|(stop_beat, _)| *stop_beat < target_beat)
            .map(|(_, duration)| duration)
            .sum::<f64>()
    }
}
