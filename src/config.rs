use configparser::ini::Ini;
use log::{Level, LevelFilter};
use once_cell::sync::Lazy;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

// Files
pub const DEFAULT_CONFIG_PATH: &str = "stepstats.ini";
pub const DEFAULT_SONGS_DIR: &str = "songs";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_OUTPUT_PREFIX: &str = "stepstats";
pub const DEFAULT_STEPS_TYPES: [&str; 2] = ["dance-single", "dance-double"];

// Segmentation
pub const DEFAULT_DENOMINATORS: [u32; 7] = [4, 8, 12, 16, 24, 32, 48];
pub const BEAT_SPACING_TOLERANCE: f64 = 0.001; // beats
pub const STEP_DELTA_TOLERANCE_SEC: f64 = 0.001;

// Density buckets, as multiples of the chart's average NPS
pub const SPARSE_RATIO: f64 = 0.5;
pub const DENSE_RATIOS: [f64; 3] = [2.0, 3.0, 4.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
    Both,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(OutputFormat::Csv),
            "json" => Some(OutputFormat::Json),
            "both" => Some(OutputFormat::Both),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::Both => "both",
        }
    }

    pub fn writes_csv(self) -> bool {
        matches!(self, OutputFormat::Csv | OutputFormat::Both)
    }

    pub fn writes_json(self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Both)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub songs_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Lower-cased steps types to analyze.
    pub steps_types: Vec<String>,
    /// Regex matched against simfile names; `None` accepts everything.
    pub file_pattern: Option<String>,
    pub denominators: Vec<u32>,
    pub jobs: usize,
    pub output_format: OutputFormat,
    pub output_prefix: String,
    pub log_level: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            songs_dir: PathBuf::from(DEFAULT_SONGS_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            steps_types: DEFAULT_STEPS_TYPES.iter().map(|s| s.to_string()).collect(),
            file_pattern: None,
            denominators: DEFAULT_DENOMINATORS.to_vec(),
            jobs: std::thread::available_parallelism().map_or(1, |n| n.get()),
            output_format: OutputFormat::Csv,
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            log_level: LevelFilter::Info,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(String),
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO Error: {}", e),
            ConfigError::Parse(msg) => write!(f, "Invalid config file: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// A message raised while reading the config. Loading happens before the
/// logger exists, so these are handed back to be logged afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigNote {
    pub level: Level,
    pub message: String,
}

impl ConfigNote {
    fn warn(message: String) -> Self {
        Self {
            level: Level::Warn,
            message,
        }
    }
}

static CONFIG: Lazy<Mutex<Config>> = Lazy::new(|| Mutex::new(Config::default()));

/// Writes an ini file holding the default settings.
pub fn create_default_file(path: &Path) -> Result<(), io::Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let d = Config::default();
    let mut conf = Ini::new();
    conf.set("Paths", "SongsDir", Some(d.songs_dir.display().to_string()));
    conf.set("Paths", "OutputDir", Some(d.output_dir.display().to_string()));
    conf.set("Filter", "StepsTypes", Some(d.steps_types.join(",")));
    conf.set("Filter", "FilePattern", Some(String::new()));
    conf.set("Analysis", "Denominators", Some(join_numbers(&d.denominators)));
    conf.set("Analysis", "Jobs", Some("0".to_string()));
    conf.set("Output", "Format", Some(d.output_format.as_str().to_string()));
    conf.set("Output", "Prefix", Some(d.output_prefix));
    conf.set("Logging", "Level", Some("info".to_string()));
    conf.write(path)
}

fn join_numbers(values: &[u32]) -> String {
    values
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_level(value: &str) -> Option<LevelFilter> {
    match value.trim().to_ascii_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

/// Reads settings from a loaded ini, keeping defaults for anything missing
/// or unparsable. Each rejected value yields a warning note.
pub fn from_ini(conf: &Ini) -> (Config, Vec<ConfigNote>) {
    let mut config = Config::default();
    let mut notes = Vec::new();

    if let Some(dir) = conf.get("Paths", "SongsDir").filter(|s| !s.trim().is_empty()) {
        config.songs_dir = PathBuf::from(dir.trim());
    }
    if let Some(dir) = conf.get("Paths", "OutputDir").filter(|s| !s.trim().is_empty()) {
        config.output_dir = PathBuf::from(dir.trim());
    }

    if let Some(types) = conf.get("Filter", "StepsTypes") {
        let types: Vec<String> = types
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if types.is_empty() {
            notes.push(ConfigNote::warn(
                "Filter.StepsTypes is empty, using defaults.".to_string(),
            ));
        } else {
            config.steps_types = types;
        }
    }
    config.file_pattern = conf
        .get("Filter", "FilePattern")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    if let Some(list) = conf.get("Analysis", "Denominators") {
        let parsed: Result<Vec<u32>, _> = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<u32>)
            .collect();
        match parsed {
            Ok(values) if values.iter().any(|&d| d > 0) => config.denominators = values,
            _ => notes.push(ConfigNote::warn(format!(
                "Invalid Analysis.Denominators '{}', using defaults.",
                list
            ))),
        }
    }
    if let Some(jobs) = conf.get("Analysis", "Jobs") {
        match jobs.trim().parse::<usize>() {
            Ok(0) => {}
            Ok(n) => config.jobs = n,
            Err(_) => notes.push(ConfigNote::warn(format!(
                "Invalid Analysis.Jobs '{}', using {}.",
                jobs, config.jobs
            ))),
        }
    }

    if let Some(format) = conf.get("Output", "Format") {
        match OutputFormat::parse(&format) {
            Some(f) => config.output_format = f,
            None => notes.push(ConfigNote::warn(format!(
                "Unknown Output.Format '{}', writing csv.",
                format
            ))),
        }
    }
    if let Some(prefix) = conf.get("Output", "Prefix").filter(|s| !s.trim().is_empty()) {
        config.output_prefix = prefix.trim().to_string();
    }

    if let Some(level) = conf.get("Logging", "Level") {
        match parse_level(&level) {
            Some(l) => config.log_level = l,
            None => notes.push(ConfigNote::warn(format!(
                "Unknown Logging.Level '{}', using info.",
                level
            ))),
        }
    }

    (config, notes)
}

/// Reads `path`, first writing a default file if it does not exist.
pub fn read_config(path: &Path) -> Result<(Config, Vec<ConfigNote>), ConfigError> {
    let mut created = None;
    if !path.exists() {
        create_default_file(path)?;
        created = Some(ConfigNote {
            level: Level::Info,
            message: format!("Config file not found, created defaults in '{}'.", path.display()),
        });
    }
    let mut conf = Ini::new();
    conf.load(path).map_err(ConfigError::Parse)?;
    let (config, notes) = from_ini(&conf);
    Ok((config, created.into_iter().chain(notes).collect()))
}

/// Loads `path` into the global config, creating it with defaults when
/// missing. On failure the defaults stay in place. Returns the notes to log
/// once logging is set up.
pub fn load(path: &Path) -> Vec<ConfigNote> {
    match read_config(path) {
        Ok((config, notes)) => {
            *CONFIG.lock().unwrap_or_else(PoisonError::into_inner) = config;
            notes
        }
        Err(e) => vec![ConfigNote::warn(format!(
            "Failed to load '{}', using defaults: {}",
            path.display(),
            e
        ))],
    }
}

/// Returns a copy of the current configuration.
pub fn get() -> Config {
    CONFIG.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ini(text: &str) -> Ini {
        let mut conf = Ini::new();
        conf.read(text.to_string()).unwrap();
        conf
    }

    #[test]
    fn reads_all_sections() {
        let conf = ini("\
[Paths]
SongsDir = /data/songs
OutputDir = out
[Filter]
StepsTypes = dance-single, Dance-Solo
FilePattern = ^[A-M]
[Analysis]
Denominators = 4,8,16
Jobs = 3
[Output]
Format = both
Prefix = run1
[Logging]
Level = debug
");
        let (c, notes) = from_ini(&conf);
        assert!(notes.is_empty());
        assert_eq!(c.songs_dir, PathBuf::from("/data/songs"));
        assert_eq!(c.output_dir, PathBuf::from("out"));
        assert_eq!(c.steps_types, vec!["dance-single", "dance-solo"]);
        assert_eq!(c.file_pattern.as_deref(), Some("^[A-M]"));
        assert_eq!(c.denominators, vec![4, 8, 16]);
        assert_eq!(c.jobs, 3);
        assert_eq!(c.output_format, OutputFormat::Both);
        assert_eq!(c.output_prefix, "run1");
        assert_eq!(c.log_level, LevelFilter::Debug);
    }

    #[test]
    fn bad_values_keep_defaults() {
        let conf = ini("\
[Analysis]
Denominators = 4,x
Jobs = many
[Output]
Format = xml
[Logging]
Level = loud
");
        let (c, notes) = from_ini(&conf);
        let d = Config::default();
        assert_eq!(c.denominators, d.denominators);
        assert_eq!(c.jobs, d.jobs);
        assert_eq!(c.output_format, OutputFormat::Csv);
        assert_eq!(c.log_level, LevelFilter::Info);
        assert_eq!(c.file_pattern, None);

        assert_eq!(notes.len(), 4);
        assert!(notes.iter().all(|n| n.level == Level::Warn));
        assert!(notes[0].message.contains("Analysis.Denominators '4,x'"));
        assert!(notes[1].message.contains("Analysis.Jobs 'many'"));
        assert!(notes[2].message.contains("Output.Format 'xml'"));
        assert!(notes[3].message.contains("Logging.Level 'loud'"));
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("stepstats.ini");
        let (c, notes) = read_config(&path).unwrap();
        assert!(path.exists());
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, Level::Info);
        assert!(notes[0].message.contains("created defaults"));

        let (_, notes) = read_config(&path).unwrap();
        assert!(notes.is_empty());
        assert_eq!(c.denominators, DEFAULT_DENOMINATORS.to_vec());
        assert_eq!(c.steps_types, vec!["dance-single", "dance-double"]);
        assert_eq!(c.file_pattern, None);
    }
}
