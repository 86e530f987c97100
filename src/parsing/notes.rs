use super::bpm::{display_bpm, parse_bpms, parse_stops};
use super::simfile::{ChartInfo, ParseError, SongInfo};
use super::timing::TimingData;
use crate::analysis::event::{NoteEvent, NoteKind};
use crate::analysis::position::MetricPosition;
use crate::analysis::{ChartDescriptor, ChartMeta};
use log::{debug, warn};
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Lane count for a steps type. Couple and routine charts are not listed.
pub fn lanes_for_stepstype(stepstype: &str) -> Option<usize> {
    match stepstype.to_ascii_lowercase().as_str() {
        "dance-single" => Some(4),
        "dance-double" => Some(8),
        "dance-solo" => Some(6),
        "dance-threepanel" => Some(3),
        "pump-single" => Some(5),
        "pump-halfdouble" => Some(6),
        "pump-double" => Some(10),
        "techno-single4" => Some(4),
        "techno-single5" => Some(5),
        "techno-single8" => Some(8),
        "techno-double4" => Some(8),
        "techno-double8" => Some(16),
        _ => None,
    }
}

/// Rows of each measure, trimmed, with blank lines dropped.
fn split_measures(notes: &str) -> Vec<Vec<&str>> {
    notes
        .split(',')
        .map(|measure| {
            measure
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect()
        })
        .collect()
}

/// Hash of the note rows only, so whitespace and comments do not change it.
pub fn chart_hash(notes: &str) -> String {
    let mut hasher = XxHash64::with_seed(0);
    for measure in split_measures(notes) {
        for row in measure {
            hasher.write(row.as_bytes());
            hasher.write_u8(b'\n');
        }
        hasher.write_u8(b',');
    }
    format!("{:016x}", hasher.finish())
}

/// Turns raw `#NOTES` rows into time-ordered events.
///
/// Taps become `TapStart`, hold and roll heads `HoldStart`, tails `HoldEnd`.
/// Mines, lifts and fakes are not steps and are dropped. A tail with no open
/// hold is ignored, and a head that never gets a tail is played as a tap.
pub fn parse_note_events(notes: &str, num_inputs: usize, timing: &TimingData) -> Vec<NoteEvent> {
    let mut events = Vec::new();
    let mut open_holds: Vec<Option<usize>> = vec![None; num_inputs];
    let mut stray_tails = 0usize;

    for (measure_index, rows) in split_measures(notes).iter().enumerate() {
        let rows_in_measure = rows.len() as u32;
        for (row_index, row) in rows.iter().enumerate() {
            if row.len() < num_inputs {
                warn!(
                    "Short note row '{}' in measure {} (expected {} lanes), skipping row.",
                    row, measure_index, num_inputs
                );
                continue;
            }
            let position =
                MetricPosition::from_row(measure_index as u32, row_index as u32, rows_in_measure);
            let time = timing.get_time_for_beat(position.to_beats());

            for (lane, ch) in row.bytes().take(num_inputs).enumerate() {
                let kind = match ch {
                    b'1' => NoteKind::TapStart,
                    b'2' | b'4' => {
                        open_holds[lane] = Some(events.len());
                        NoteKind::HoldStart
                    }
                    b'3' => {
                        if open_holds[lane].take().is_none() {
                            stray_tails += 1;
                            continue;
                        }
                        NoteKind::HoldEnd
                    }
                    _ => continue,
                };
                events.push(NoteEvent::new(time, position, lane, kind));
            }
        }
    }

    let mut phantom_holds = 0usize;
    for idx in open_holds.into_iter().flatten() {
        events[idx].kind = NoteKind::TapStart;
        phantom_holds += 1;
    }
    if stray_tails > 0 || phantom_holds > 0 {
        debug!(
            "Repaired holds: {} unmatched tails dropped, {} unterminated heads played as taps.",
            stray_tails, phantom_holds
        );
    }
    events
}

/// Builds the analysis input for one chart of a song.
pub fn chart_descriptor(
    song: &SongInfo,
    chart: &ChartInfo,
    pack: &str,
) -> Result<ChartDescriptor, ParseError> {
    let num_inputs = lanes_for_stepstype(&chart.stepstype)
        .filter(|n| n % 2 == 0)
        .ok_or_else(|| ParseError::UnsupportedLaneCount {
            stepstype: chart.stepstype.clone(),
            lanes: lanes_for_stepstype(&chart.stepstype).unwrap_or(0),
        })?;

    let bpms = match chart.bpms_chart.as_deref().map(str::trim) {
        Some(list) if !list.is_empty() => parse_bpms(list)?,
        _ => song.bpms_header.clone(),
    };
    let stops = match chart.stops_chart.as_deref().map(str::trim) {
        Some(list) if !list.is_empty() => parse_stops(list)?,
        _ => song.stops_header.clone(),
    };
    // Beat 0 sits at -#OFFSET seconds.
    let timing = TimingData::new(-song.offset, &bpms, &stops);
    let events = parse_note_events(&chart.notes_data_raw, num_inputs, &timing);

    Ok(ChartDescriptor {
        num_inputs,
        events,
        meta: ChartMeta {
            pack: pack.to_string(),
            title: song.title.clone(),
            steps_type: chart.stepstype.clone(),
            difficulty: chart.difficulty.clone(),
            meter: chart.meter.clone(),
            display_bpm: display_bpm(&bpms),
            hash: chart_hash(&chart.notes_data_raw),
        },
    })
}
