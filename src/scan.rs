use crate::analysis::ChartDescriptor;
use crate::parsing::notes::chart_descriptor;
use crate::parsing::simfile::parse_simfile;
use log::{debug, info, warn};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// Which simfiles and charts a scan keeps.
#[derive(Debug, Clone)]
pub struct ScanFilter {
    steps_types: Vec<String>,
    file_pattern: Option<Regex>,
}

impl ScanFilter {
    pub fn new(steps_types: &[String], file_pattern: Option<&str>) -> Result<Self, regex::Error> {
        Ok(Self {
            steps_types: steps_types.iter().map(|s| s.to_ascii_lowercase()).collect(),
            file_pattern: file_pattern.map(Regex::new).transpose()?,
        })
    }

    pub fn accepts_file(&self, path: &Path) -> bool {
        let Some(pattern) = &self.file_pattern else {
            return true;
        };
        path.file_name()
            .map(|name| pattern.is_match(&name.to_string_lossy()))
            .unwrap_or(false)
    }

    /// An empty list accepts every steps type.
    pub fn accepts_steps_type(&self, steps_type: &str) -> bool {
        self.steps_types.is_empty()
            || self.steps_types.iter().any(|s| s.eq_ignore_ascii_case(steps_type))
    }
}

#[derive(Debug, Default)]
pub struct ScanResult {
    pub charts: Vec<ChartDescriptor>,
    pub songs: usize,
    pub failed_songs: usize,
    pub skipped_charts: usize,
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| entry.path())
        .collect();
    paths.sort();
    paths
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// The simfile of a song folder, `.ssc` taking precedence over `.sm`.
pub fn find_simfile(song_dir: &Path) -> Option<PathBuf> {
    let files = sorted_entries(song_dir);
    files
        .iter()
        .find(|p| p.is_file() && has_extension(p, "ssc"))
        .or_else(|| files.iter().find(|p| p.is_file() && has_extension(p, "sm")))
        .cloned()
}

/// Loads every chart of one simfile that passes the steps-type filter.
pub fn load_charts(simfile: &Path, pack: &str, filter: &ScanFilter, result: &mut ScanResult) {
    let song = match parse_simfile(simfile) {
        Ok(song) => song,
        Err(e) => {
            warn!("Failed to load '{:?}': {}", simfile, e);
            result.failed_songs += 1;
            return;
        }
    };
    result.songs += 1;

    for chart in &song.charts {
        if !filter.accepts_steps_type(&chart.stepstype) {
            debug!("Skipping {} chart of '{}'.", chart.stepstype, song.title);
            continue;
        }
        match chart_descriptor(&song, chart, pack) {
            Ok(descriptor) => result.charts.push(descriptor),
            Err(e) => {
                warn!(
                    "Skipping {} {} chart of '{}': {}",
                    chart.stepstype, chart.difficulty, song.title, e
                );
                result.skipped_charts += 1;
            }
        }
    }
}

/// Walks `root/<pack>/<song>/` and collects the charts to analyze, in path
/// order.
pub fn scan_songs(root: &Path, filter: &ScanFilter) -> ScanResult {
    let mut result = ScanResult::default();
    info!("Starting simfile scan in '{}'...", root.display());
    if !root.is_dir() {
        warn!("Songs directory '{}' not found. No charts will be analyzed.", root.display());
        return result;
    }

    for pack_path in sorted_entries(root).into_iter().filter(|p| p.is_dir()) {
        let pack_name = pack_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        info!("Scanning pack: {}", pack_name);

        for song_path in sorted_entries(&pack_path).into_iter().filter(|p| p.is_dir()) {
            let Some(simfile) = find_simfile(&song_path) else {
                debug!("No simfile in {:?}.", song_path);
                continue;
            };
            if !filter.accepts_file(&simfile) {
                debug!("{:?} does not match the file pattern.", simfile);
                continue;
            }
            load_charts(&simfile, &pack_name, filter, &mut result);
        }
    }

    info!(
        "Finished scan. {} songs loaded, {} failed, {} charts queued, {} skipped.",
        result.songs,
        result.failed_songs,
        result.charts.len(),
        result.skipped_charts
    );
    result
}
