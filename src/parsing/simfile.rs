use super::bpm::{parse_bpms, parse_stops};
use log::{debug, info, warn};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str;

#[derive(Debug, Clone, Default)]
pub struct ChartInfo {
    pub stepstype: String,
    pub description: String,
    pub difficulty: String,
    pub meter: String,
    pub credit: String,
    pub notes_data_raw: String,
    pub bpms_chart: Option<String>,
    pub stops_chart: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SongInfo {
    pub title: String,
    pub subtitle: String,
    pub artist: String,
    pub offset: f64,
    pub bpms_header: Vec<(f64, f64)>,
    pub stops_header: Vec<(f64, f64)>,
    pub charts: Vec<ChartInfo>,
    pub simfile_path: PathBuf,
}

#[derive(Debug)]
pub enum ParseError {
    Io(io::Error),
    UnsupportedExtension(String),
    InvalidFormat(String),
    MissingTag(String),
    NoCharts,
    UnsupportedLaneCount { stepstype: String, lanes: usize },
}

pub fn clean_tag(tag_content: &str) -> String {
    tag_content
        .chars()
        .filter(|c| !c.is_control() && *c != '\u{200b}')
        .collect::<String>()
        .trim()
        .to_string()
}

fn strip_comments(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for line in content.lines() {
        let line = match line.find("//") {
            Some(pos) => &line[..pos],
            None => line,
        };
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Splits simfile text into `(TAG, value)` pairs. Tags are upper-cased and
/// lose their `#`; values run to the next `;` (or end of file) untrimmed.
pub fn split_tags(content: &str) -> Vec<(String, String)> {
    let content = strip_comments(content);
    let mut tags = Vec::new();
    let mut rest = content.as_str();

    while let Some(hash) = rest.find('#') {
        rest = &rest[hash + 1..];
        let Some(colon) = rest.find(':') else {
            break;
        };
        let name = rest[..colon].trim().to_uppercase();
        rest = &rest[colon + 1..];
        let end = rest.find(';').unwrap_or(rest.len());
        let value = rest[..end].to_string();
        rest = rest.get(end + 1..).unwrap_or("");
        if !name.is_empty() && !name.contains(char::is_whitespace) {
            tags.push((name, value));
        }
    }
    tags
}

/// Legacy `.sm` chart: `type:description:difficulty:meter:radar:notes`.
fn parse_sm_notes(value: &str, simfile_path: &Path) -> Option<ChartInfo> {
    let parts: Vec<&str> = value.splitn(6, ':').collect();
    if parts.len() < 6 {
        warn!(
            "Malformed #NOTES block in {:?} ({} fields), skipping chart.",
            simfile_path,
            parts.len()
        );
        return None;
    }
    Some(ChartInfo {
        stepstype: clean_tag(parts[0]),
        description: clean_tag(parts[1]),
        difficulty: clean_tag(parts[2]),
        meter: clean_tag(parts[3]),
        credit: String::new(),
        notes_data_raw: parts[5].trim().to_string(),
        bpms_chart: None,
        stops_chart: None,
    })
}

pub fn parse_simfile_content(content: &str, simfile_path: &Path) -> Result<SongInfo, ParseError> {
    let mut title = String::new();
    let mut subtitle = String::new();
    let mut artist = String::new();
    let mut offset_str = String::from("0.0");
    let mut bpms_str = String::new();
    let mut stops_str = String::new();
    let mut raw_charts = Vec::new();

    // Open `.ssc` #NOTEDATA block; its tags belong to the chart until #NOTES.
    let mut current_chart: Option<ChartInfo> = None;

    for (tag, value) in split_tags(content) {
        if let Some(chart) = current_chart.as_mut() {
            match tag.as_str() {
                "STEPSTYPE" => chart.stepstype = clean_tag(&value),
                "DESCRIPTION" => chart.description = clean_tag(&value),
                "DIFFICULTY" => chart.difficulty = clean_tag(&value),
                "METER" => chart.meter = clean_tag(&value),
                "CREDIT" => chart.credit = clean_tag(&value),
                "BPMS" => chart.bpms_chart = Some(value.trim().to_string()),
                "STOPS" => chart.stops_chart = Some(value.trim().to_string()),
                "NOTES" | "NOTES2" => {
                    chart.notes_data_raw = value.trim().to_string();
                    raw_charts.extend(current_chart.take());
                }
                "NOTEDATA" => {
                    warn!(
                        "#NOTEDATA without #NOTES in {:?}, discarding previous chart.",
                        simfile_path
                    );
                    current_chart = Some(ChartInfo::default());
                }
                _ => {}
            }
            continue;
        }

        match tag.as_str() {
            "TITLE" => title = clean_tag(&value),
            "SUBTITLE" => subtitle = clean_tag(&value),
            "ARTIST" => artist = clean_tag(&value),
            "OFFSET" => offset_str = value.trim().to_string(),
            "BPMS" => bpms_str = value,
            "STOPS" => stops_str = value,
            "NOTEDATA" => current_chart = Some(ChartInfo::default()),
            "NOTES" | "NOTES2" => raw_charts.extend(parse_sm_notes(&value, simfile_path)),
            _ => {}
        }
    }

    if current_chart.is_some() {
        warn!("Simfile {:?} ended inside a #NOTEDATA block without #NOTES.", simfile_path);
    }

    let offset = offset_str
        .parse::<f64>()
        .map_err(|e| ParseError::InvalidFormat(format!("#OFFSET ('{}'): {}", offset_str, e)))?;
    let bpms_header = parse_bpms(&bpms_str)?;
    let stops_header = parse_stops(&stops_str)?;

    let mut charts = Vec::new();
    for chart in raw_charts {
        if chart.stepstype.is_empty() || chart.notes_data_raw.is_empty() {
            warn!(
                "Skipping chart in {:?} ({} {} {}): no steps type or notes.",
                simfile_path, chart.stepstype, chart.difficulty, chart.meter
            );
            continue;
        }
        charts.push(chart);
    }

    if title.is_empty() {
        return Err(ParseError::MissingTag("#TITLE".to_string()));
    }
    let has_chart_bpms = charts
        .iter()
        .any(|c| c.bpms_chart.as_deref().is_some_and(|b| !b.trim().is_empty()));
    if bpms_header.is_empty() && !has_chart_bpms {
        return Err(ParseError::MissingTag("#BPMS".to_string()));
    }
    if charts.is_empty() {
        return Err(ParseError::NoCharts);
    }

    Ok(SongInfo {
        title,
        subtitle,
        artist,
        offset,
        bpms_header,
        stops_header,
        charts,
        simfile_path: simfile_path.to_path_buf(),
    })
}

pub fn parse_simfile(simfile_path: &Path) -> Result<SongInfo, ParseError> {
    let ext = simfile_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if ext != "sm" && ext != "ssc" {
        return Err(ParseError::UnsupportedExtension(ext));
    }

    info!("Parsing simfile: {:?}", simfile_path);
    let content_bytes = fs::read(simfile_path)?;

    let song = match str::from_utf8(&content_bytes) {
        Ok(content_utf8) => parse_simfile_content(content_utf8, simfile_path)?,
        Err(e) => {
            warn!("UTF-8 decoding failed for {:?}, trying latin1: {}", simfile_path, e);
            let content_latin1: String = content_bytes.iter().map(|&byte| byte as char).collect();
            parse_simfile_content(&content_latin1, simfile_path)?
        }
    };
    debug!("Parsed '{}' with {} charts.", song.title, song.charts.len());
    Ok(song)
}

impl From<io::Error> for ParseError {
    fn from(err: io::Error) -> Self {
        ParseError::Io(err)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Io(e) => write!(f, "IO Error: {}", e),
            ParseError::UnsupportedExtension(ext) => {
                write!(f, "Unsupported file extension: {}", ext)
            }
            ParseError::InvalidFormat(tag) => write!(f, "Invalid format for tag '{}'", tag),
            ParseError::MissingTag(tag) => write!(f, "Missing required tag: {}", tag),
            ParseError::NoCharts => write!(f, "No charts found in simfile"),
            ParseError::UnsupportedLaneCount { stepstype, lanes } => {
                write!(f, "Unsupported steps type '{}' ({} lanes)", stepstype, lanes)
            }
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Io(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SM: &str = "\
#TITLE:Test Song;
#ARTIST:Someone;
#OFFSET:-0.050;
#BPMS:0.000=150.000;
#STOPS:;
//--------------- dance-single - Blank ----------------
#NOTES:
     dance-single:
     Blank:
     Challenge:
     12:
     0.1,0.2,0.3,0.4,0.5:
1000
0100
0010
0001
,
2000
0000
3000
0000
;
";

    const SSC: &str = "\
#VERSION:0.83;
#TITLE:[Marathon] Other;
#BPMS:0=120;
#NOTEDATA:;
#STEPSTYPE:dance-double;
#DIFFICULTY:Hard;
#METER:9;
#CREDIT:Author;
#BPMS:0=180;
#NOTES:
10000000
00000001
;
#NOTEDATA:;
#STEPSTYPE:dance-single;
#DIFFICULTY:Easy;
#METER:2;
#NOTES:
1000
;
";

    #[test]
    fn splits_tags_and_drops_comments() {
        let tags = split_tags("#A:1;// #B:2;\n#c:x:y;");
        assert_eq!(
            tags,
            vec![
                ("A".to_string(), "1".to_string()),
                ("C".to_string(), "x:y".to_string())
            ]
        );
    }

    #[test]
    fn parses_sm_charts() {
        let song = parse_simfile_content(SM, Path::new("song/test.sm")).unwrap();
        assert_eq!(song.title, "Test Song");
        assert!((song.offset + 0.05).abs() < 1e-12);
        assert_eq!(song.bpms_header, vec![(0.0, 150.0)]);
        assert_eq!(song.charts.len(), 1);
        let chart = &song.charts[0];
        assert_eq!(chart.stepstype, "dance-single");
        assert_eq!(chart.difficulty, "Challenge");
        assert_eq!(chart.meter, "12");
        assert!(chart.notes_data_raw.starts_with("1000"));
        assert!(chart.notes_data_raw.ends_with("0000"));
    }

    #[test]
    fn parses_ssc_notedata_blocks() {
        let song = parse_simfile_content(SSC, Path::new("song/test.ssc")).unwrap();
        assert_eq!(song.charts.len(), 2);
        assert_eq!(song.charts[0].stepstype, "dance-double");
        assert_eq!(song.charts[0].credit, "Author");
        assert_eq!(song.charts[0].bpms_chart.as_deref(), Some("0=180"));
        assert_eq!(song.charts[1].difficulty, "Easy");
        assert_eq!(song.charts[1].notes_data_raw, "1000");
    }

    #[test]
    fn missing_title_is_an_error() {
        let err = parse_simfile_content("#BPMS:0=120;", Path::new("x.sm")).unwrap_err();
        assert!(matches!(err, ParseError::MissingTag(ref t) if t == "#TITLE"));
    }

    #[test]
    fn no_charts_is_an_error() {
        let err = parse_simfile_content("#TITLE:x;#BPMS:0=120;", Path::new("x.sm")).unwrap_err();
        assert!(matches!(err, ParseError::NoCharts));
    }
}
