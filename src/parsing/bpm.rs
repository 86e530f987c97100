use super::simfile::ParseError;
use log::warn;
use std::fmt::Write as FmtWrite;

/// Parses a `beat=value,beat=value` list such as `#BPMS` or `#STOPS`.
///
/// Malformed segments and non-positive values are skipped with a warning;
/// an unparsable number is an error. The result is sorted by beat.
fn parse_beat_pairs(list: &str, tag: &str) -> Result<Vec<(f64, f64)>, ParseError> {
    let mut pairs = Vec::new();
    for part in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((beat_str, value_str)) = part.split_once('=') else {
            warn!("Malformed {} segment: '{}', skipping.", tag, part);
            continue;
        };
        let beat = beat_str
            .trim()
            .parse::<f64>()
            .map_err(|_| ParseError::InvalidFormat(format!("{} beat", tag)))?;
        let value = value_str
            .trim()
            .parse::<f64>()
            .map_err(|_| ParseError::InvalidFormat(format!("{} value", tag)))?;
        if value <= 0.0 {
            warn!("Ignoring non-positive {} value: {} at beat {}", tag, value, beat);
            continue;
        }
        pairs.push((beat, value));
    }
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    Ok(pairs)
}

pub fn parse_bpms(list: &str) -> Result<Vec<(f64, f64)>, ParseError> {
    parse_beat_pairs(list, "#BPMS")
}

pub fn parse_stops(list: &str) -> Result<Vec<(f64, f64)>, ParseError> {
    parse_beat_pairs(list, "#STOPS")
}

pub fn compute_bpm_range(bpm_map: &[(f64, f64)]) -> (i32, i32) {
    if bpm_map.is_empty() {
        return (0, 0);
    }
    let (min_bpm, max_bpm) = bpm_map
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), &(_, bpm)| (lo.min(bpm), hi.max(bpm)));
    (min_bpm.round() as i32, max_bpm.round() as i32)
}

/// `150` for a constant tempo, `100-200` otherwise.
pub fn display_bpm(bpm_map: &[(f64, f64)]) -> String {
    let (lo, hi) = compute_bpm_range(bpm_map);
    let mut out = String::new();
    if lo == hi {
        let _ = write!(out, "{}", lo);
    } else {
        let _ = write!(out, "{}-{}", lo, hi);
    }
    out
}
