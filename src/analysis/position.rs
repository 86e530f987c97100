use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Beats per measure. Everything downstream assumes 4/4 with quarter = beat.
pub const BEATS_PER_MEASURE: u32 = 4;

/// A reduced, non-negative rational. `den` is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Fraction {
    pub num: u32,
    pub den: u32,
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl Fraction {
    pub const ZERO: Fraction = Fraction { num: 0, den: 1 };

    /// Builds a reduced fraction. A zero denominator collapses to `0/1`.
    pub fn new(num: u32, den: u32) -> Self {
        if den == 0 || num == 0 {
            return Self::ZERO;
        }
        let g = gcd(num, den);
        Self {
            num: num / g,
            den: den / g,
        }
    }

    #[inline]
    pub fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Default for Fraction {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as u64 * other.den as u64;
        let rhs = other.num as u64 * self.den as u64;
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Musical position of a note row: measure, beat within the measure and the
/// fraction of that beat.
///
/// Field order matters for the derived ordering: measure, then beat, then
/// subdivision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct MetricPosition {
    pub measure: u32,
    pub beat: u32,
    pub subdivision: Fraction,
}

impl MetricPosition {
    pub fn new(measure: u32, beat: u32, subdivision: Fraction) -> Self {
        Self {
            measure,
            beat,
            subdivision,
        }
    }

    /// Position of row `row` in a measure split into `rows_in_measure` rows.
    pub fn from_row(measure: u32, row: u32, rows_in_measure: u32) -> Self {
        if rows_in_measure == 0 {
            return Self::new(measure, 0, Fraction::ZERO);
        }
        let scaled = row * BEATS_PER_MEASURE;
        Self {
            measure,
            beat: scaled / rows_in_measure,
            subdivision: Fraction::new(scaled % rows_in_measure, rows_in_measure),
        }
    }

    pub fn to_beats(&self) -> f64 {
        (self.measure * BEATS_PER_MEASURE + self.beat) as f64 + self.subdivision.as_f64()
    }

    /// Note value of this position in a 4/4 measure: 4 for quarters, 8 for
    /// eighths, 12 for triplets and so on.
    #[inline]
    pub fn note_value(&self) -> u32 {
        BEATS_PER_MEASURE * self.subdivision.den
    }
}

impl fmt::Display for MetricPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}+{}", self.measure, self.beat, self.subdivision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_is_reduced() {
        let f = Fraction::new(6, 8);
        assert_eq!(f, Fraction { num: 3, den: 4 });
        assert_eq!(Fraction::new(0, 12), Fraction::ZERO);
        assert_eq!(Fraction::new(3, 0), Fraction::ZERO);
    }

    #[test]
    fn from_row_splits_beat_and_subdivision() {
        // Row 3 of 8 is the second half of beat 1.
        let p = MetricPosition::from_row(2, 3, 8);
        assert_eq!(p.measure, 2);
        assert_eq!(p.beat, 1);
        assert_eq!(p.subdivision, Fraction::new(1, 2));
        assert_eq!(p.note_value(), 8);
        assert!((p.to_beats() - 9.5).abs() < 1e-12);
    }

    #[test]
    fn note_values_follow_row_quantization() {
        assert_eq!(MetricPosition::from_row(0, 0, 4).note_value(), 4);
        assert_eq!(MetricPosition::from_row(0, 2, 4).note_value(), 4);
        assert_eq!(MetricPosition::from_row(0, 1, 12).note_value(), 12);
        assert_eq!(MetricPosition::from_row(0, 3, 16).note_value(), 16);
        assert_eq!(MetricPosition::from_row(0, 1, 24).note_value(), 24);
        // 2 of 16 is an eighth once reduced.
        assert_eq!(MetricPosition::from_row(0, 2, 16).note_value(), 8);
    }

    #[test]
    fn positions_order_by_measure_beat_then_fraction() {
        let a = MetricPosition::from_row(0, 1, 3);
        let b = MetricPosition::from_row(0, 1, 2);
        let c = MetricPosition::from_row(1, 0, 4);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(MetricPosition::from_row(1, 4, 16), MetricPosition::from_row(1, 1, 4));
    }
}
