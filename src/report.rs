use crate::analysis::density::DensityBuckets;
use crate::analysis::segments::Denominators;
use crate::analysis::{ChartAnalysis, ChartDescriptor, ChartMeta};
use crate::config::OutputFormat;
use chrono::{DateTime, Local};
use log::{info, warn};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const IDENTITY_COLUMNS: [&str; 7] = [
    "pack",
    "title",
    "steps_type",
    "difficulty",
    "meter",
    "display_bpm",
    "hash",
];
const VARIABLE_COLUMN: &str = "variable";

#[derive(Debug)]
pub enum ReportError {
    Io(io::Error),
    Json(serde_json::Error),
}

impl From<io::Error> for ReportError {
    fn from(err: io::Error) -> Self {
        ReportError::Io(err)
    }
}

impl From<serde_json::Error> for ReportError {
    fn from(err: serde_json::Error) -> Self {
        ReportError::Json(err)
    }
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::Io(e) => write!(f, "IO Error: {}", e),
            ReportError::Json(e) => write!(f, "JSON Error: {}", e),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::Io(e) => Some(e),
            ReportError::Json(e) => Some(e),
        }
    }
}

/// One line per analyzed chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    #[serde(flatten)]
    pub meta: ChartMeta,
    pub total_steps: u32,
    pub duration_seconds: f64,
    pub average_nps: f64,
    pub peak_nps: f64,
    pub jumps: u32,
    pub hands: u32,
    pub holds: u32,
    pub density: DensityBuckets,
    pub lane_counts: Vec<u32>,
    pub lane_fractions: Vec<f64>,
}

/// One line per finished side run, grouped per chart by bucket. `column`
/// indexes the report's segment columns: the valid denominators in order,
/// then `variable`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentRow {
    #[serde(flatten)]
    pub meta: ChartMeta,
    pub bucket: String,
    #[serde(skip)]
    pub column: usize,
    pub duration_seconds: f64,
    pub step_count: u32,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    denominators: &'a [u32],
    summaries: &'a [SummaryRow],
    segments: &'a [SegmentRow],
}

#[derive(Debug, Clone)]
pub struct Report {
    denominators: Denominators,
    pub summaries: Vec<SummaryRow>,
    pub segments: Vec<SegmentRow>,
}

fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

fn push_record<I, S>(out: &mut String, fields: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let line: Vec<String> = fields
        .into_iter()
        .map(|f| csv_field(f.as_ref()).into_owned())
        .collect();
    out.push_str(&line.join(","));
    out.push('\n');
}

fn identity_fields(meta: &ChartMeta) -> [String; 7] {
    [
        meta.pack.clone(),
        meta.title.clone(),
        meta.steps_type.clone(),
        meta.difficulty.clone(),
        meta.meter.clone(),
        meta.display_bpm.clone(),
        meta.hash.clone(),
    ]
}

fn fmt_f64(value: f64) -> String {
    format!("{:.4}", value)
}

impl Report {
    pub fn new(denominators: Denominators) -> Self {
        Self {
            denominators,
            summaries: Vec::new(),
            segments: Vec::new(),
        }
    }

    /// Builds a report from charts and their analyses, which must be in the
    /// same order. Charts without an analysis are left out.
    pub fn from_results(
        charts: &[ChartDescriptor],
        results: &[Option<ChartAnalysis>],
        denominators: &Denominators,
    ) -> Self {
        let mut report = Self::new(denominators.clone());
        for (chart, analysis) in charts.iter().zip(results) {
            if let Some(analysis) = analysis {
                report.add_chart(&chart.meta, analysis);
            }
        }
        report
    }

    /// Segment column labels: each valid denominator, then `variable`.
    pub fn column_labels(&self) -> Vec<String> {
        self.denominators
            .values()
            .iter()
            .map(u32::to_string)
            .chain(std::iter::once(VARIABLE_COLUMN.to_string()))
            .collect()
    }

    /// Column index and label for a denominator bucket, or for the
    /// variable-timing bucket when `None`.
    fn column_for(&self, denominator: Option<u32>) -> (usize, String) {
        let values = self.denominators.values();
        match denominator {
            Some(d) => {
                let bucket = self.denominators.bucket_for(d);
                let column = values.iter().position(|&v| v == bucket).unwrap_or(0);
                (column, bucket.to_string())
            }
            None => (values.len(), VARIABLE_COLUMN.to_string()),
        }
    }

    pub fn add_chart(&mut self, meta: &ChartMeta, analysis: &ChartAnalysis) {
        let s = &analysis.summary;
        self.summaries.push(SummaryRow {
            meta: meta.clone(),
            total_steps: s.total_steps,
            duration_seconds: s.duration_seconds,
            average_nps: s.average_nps,
            peak_nps: s.peak_nps,
            jumps: s.jumps,
            hands: s.hands,
            holds: s.holds,
            density: s.density,
            lane_counts: s.lane_counts.clone(),
            lane_fractions: s.lane_fractions(),
        });

        let parts = analysis.partitioned();
        self.segments.reserve(parts.len());
        let buckets = parts
            .by_denominator
            .iter()
            .map(|(&d, segments)| (Some(d), segments))
            .chain(std::iter::once((None, &parts.variable)));
        for (denominator, segments) in buckets {
            let (column, bucket) = self.column_for(denominator);
            for segment in segments {
                self.segments.push(SegmentRow {
                    meta: meta.clone(),
                    bucket: bucket.clone(),
                    column,
                    duration_seconds: segment.duration_seconds,
                    step_count: segment.step_count,
                });
            }
        }
    }

    pub fn summary_csv(&self) -> String {
        let lanes = self
            .summaries
            .iter()
            .map(|r| r.lane_counts.len())
            .max()
            .unwrap_or(0);

        let mut header: Vec<String> = IDENTITY_COLUMNS.iter().map(|c| c.to_string()).collect();
        header.extend(
            [
                "total_steps",
                "duration_seconds",
                "average_nps",
                "peak_nps",
                "jumps",
                "hands",
                "holds",
                "sparse",
                "dense_2x",
                "dense_3x",
                "dense_4x",
            ]
            .map(String::from),
        );
        header.extend((1..=lanes).map(|i| format!("lane{}_count", i)));
        header.extend((1..=lanes).map(|i| format!("lane{}_fraction", i)));

        let mut out = String::new();
        push_record(&mut out, &header);
        for row in &self.summaries {
            let mut fields: Vec<String> = identity_fields(&row.meta).into();
            fields.push(row.total_steps.to_string());
            fields.push(fmt_f64(row.duration_seconds));
            fields.push(fmt_f64(row.average_nps));
            fields.push(fmt_f64(row.peak_nps));
            fields.push(row.jumps.to_string());
            fields.push(row.hands.to_string());
            fields.push(row.holds.to_string());
            fields.push(fmt_f64(row.density.sparse));
            fields.push(fmt_f64(row.density.dense_2x));
            fields.push(fmt_f64(row.density.dense_3x));
            fields.push(fmt_f64(row.density.dense_4x));
            for i in 0..lanes {
                fields.push(row.lane_counts.get(i).map_or_else(String::new, u32::to_string));
            }
            for i in 0..lanes {
                fields.push(row.lane_fractions.get(i).map_or_else(String::new, |&f| fmt_f64(f)));
            }
            push_record(&mut out, &fields);
        }
        out
    }

    /// Each segment fills only the duration/steps pair of its own column, so
    /// runs of the same rhythm line up across rows.
    pub fn segments_csv(&self) -> String {
        let labels = self.column_labels();
        let mut header: Vec<String> = IDENTITY_COLUMNS.iter().map(|c| c.to_string()).collect();
        for label in &labels {
            header.push(format!("{}_seconds", label));
            header.push(format!("{}_steps", label));
        }

        let mut out = String::new();
        push_record(&mut out, &header);
        for row in &self.segments {
            let mut fields: Vec<String> = identity_fields(&row.meta).into();
            for column in 0..labels.len() {
                if column == row.column {
                    fields.push(fmt_f64(row.duration_seconds));
                    fields.push(row.step_count.to_string());
                } else {
                    fields.push(String::new());
                    fields.push(String::new());
                }
            }
            push_record(&mut out, &fields);
        }
        out
    }

    pub fn to_json(&self, generated_at: &DateTime<Local>) -> Result<String, ReportError> {
        let report = JsonReport {
            generated_at: generated_at.to_rfc3339(),
            denominators: self.denominators.values(),
            summaries: &self.summaries,
            segments: &self.segments,
        };
        Ok(serde_json::to_string_pretty(&report)?)
    }

    /// Writes the requested report files into `dir`, creating it if needed.
    /// Returns the paths written.
    pub fn write(
        &self,
        dir: &Path,
        prefix: &str,
        format: OutputFormat,
    ) -> Result<Vec<PathBuf>, ReportError> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();

        if format.writes_csv() {
            let summary_path = dir.join(format!("{}_summary.csv", prefix));
            fs::write(&summary_path, self.summary_csv())?;
            written.push(summary_path);

            let segments_path = dir.join(format!("{}_segments.csv", prefix));
            fs::write(&segments_path, self.segments_csv())?;
            written.push(segments_path);
        }
        if format.writes_json() {
            let json_path = dir.join(format!("{}.json", prefix));
            fs::write(&json_path, self.to_json(&Local::now())?)?;
            written.push(json_path);
        }

        if self.summaries.is_empty() {
            warn!("Report in '{}' has no charts.", dir.display());
        }
        let mut names = String::new();
        for path in &written {
            let _ = write!(names, " {}", path.display());
        }
        info!(
            "Wrote {} charts and {} segments:{}",
            self.summaries.len(),
            self.segments.len(),
            names
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::segments::{RunClassification, SideRunSegment};
    use crate::analysis::summary::ChartStatsSummary;

    fn meta(title: &str) -> ChartMeta {
        ChartMeta {
            pack: "Pack".into(),
            title: title.into(),
            steps_type: "dance-single".into(),
            difficulty: "Hard".into(),
            meter: "9".into(),
            display_bpm: "150".into(),
            hash: "00000000000000ff".into(),
        }
    }

    fn analysis(segments: Vec<SideRunSegment>) -> ChartAnalysis {
        ChartAnalysis {
            summary: ChartStatsSummary {
                total_steps: 4,
                lane_counts: vec![1, 1, 2, 0],
                jumps: 0,
                hands: 0,
                holds: 1,
                duration_seconds: 1.5,
                average_nps: 2.0,
                peak_nps: 4.0,
                density: DensityBuckets::default(),
            },
            segments,
            nps_samples: vec![4.0, 4.0, 2.0, 2.0],
        }
    }

    fn seg(classification: RunClassification, steps: u32) -> SideRunSegment {
        SideRunSegment {
            duration_seconds: 0.5,
            step_count: steps,
            classification,
        }
    }

    fn report() -> Report {
        let mut report = Report::new(Denominators::new(vec![4, 8, 16]));
        report.add_chart(
            &meta("Song, \"Quoted\""),
            &analysis(vec![
                seg(RunClassification::ConstantRhythm(8), 3),
                seg(RunClassification::VariableTiming, 2),
                seg(RunClassification::ConstantRhythm(12), 5),
            ]),
        );
        report
    }

    #[test]
    fn segments_land_in_their_columns() {
        let r = report();
        assert_eq!(r.column_labels(), vec!["4", "8", "16", "variable"]);
        // Rows follow the bucket order, not the chart order; 12ths fall into 16.
        let columns: Vec<_> = r
            .segments
            .iter()
            .map(|s| (s.column, s.bucket.as_str()))
            .collect();
        assert_eq!(columns, vec![(1, "8"), (2, "16"), (3, "variable")]);

        let csv = r.segments_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "pack,title,steps_type,difficulty,meter,display_bpm,hash,\
4_seconds,4_steps,8_seconds,8_steps,16_seconds,16_steps,variable_seconds,variable_steps"
        );
        assert!(lines[1].ends_with(",,,0.5000,3,,,,"));
        assert!(lines[2].ends_with(",,,,,0.5000,5,,"));
        assert!(lines[3].ends_with(",,,,,,,0.5000,2"));
    }

    #[test]
    fn summary_csv_quotes_and_pads_lanes() {
        let mut r = report();
        let mut doubles = analysis(Vec::new());
        doubles.summary.lane_counts = vec![1, 0, 0, 0, 0, 0, 0, 3];
        r.add_chart(&meta("Wide"), &doubles);

        let csv = r.summary_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        let fractions: Vec<String> = (1..=8).map(|i| format!("lane{}_fraction", i)).collect();
        assert!(lines[0].ends_with(&format!("lane8_count,{}", fractions.join(","))));
        assert!(lines[1].starts_with(
            "Pack,\"Song, \"\"Quoted\"\"\",dance-single,Hard,9,150,00000000000000ff,4,1.5000"
        ));
        assert!(lines[1].contains(",1,1,2,0,,,,,0.2500,0.2500,0.5000,0.0000,,,,"));
        assert!(lines[2].contains(",1,0,0,0,0,0,0,3,0.2500"));
    }

    #[test]
    fn json_carries_rows_and_timestamp() {
        let r = report();
        let json = r.to_json(&Local::now()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["generated_at"].as_str().is_some());
        assert_eq!(value["denominators"], serde_json::json!([4, 8, 16]));
        assert_eq!(value["summaries"][0]["title"], "Song, \"Quoted\"");
        assert_eq!(value["summaries"][0]["lane_counts"], serde_json::json!([1, 1, 2, 0]));
        assert_eq!(value["segments"][2]["bucket"], "variable");
        assert!(value["segments"][2].get("column").is_none());
    }

    #[test]
    fn writes_requested_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let r = report();

        let written = r.write(&out, "run", OutputFormat::Csv).unwrap();
        assert_eq!(written, vec![out.join("run_summary.csv"), out.join("run_segments.csv")]);
        assert!(!out.join("run.json").exists());

        let written = r.write(&out, "run", OutputFormat::Both).unwrap();
        assert_eq!(written.len(), 3);
        assert!(out.join("run.json").exists());
    }

    #[test]
    fn missing_analyses_are_left_out() {
        let charts = vec![
            ChartDescriptor {
                num_inputs: 4,
                events: Vec::new(),
                meta: meta("Empty"),
            },
            ChartDescriptor {
                num_inputs: 4,
                events: Vec::new(),
                meta: meta("Full"),
            },
        ];
        let results = vec![None, Some(analysis(Vec::new()))];
        let r = Report::from_results(&charts, &results, &Denominators::default());
        assert_eq!(r.summaries.len(), 1);
        assert_eq!(r.summaries[0].meta.title, "Full");
        assert!(r.segments.is_empty());
    }
}
