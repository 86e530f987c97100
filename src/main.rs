use log::{LevelFilter, error, info, log, warn};
use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::time::Instant;
use stepstats::analysis::analyze_all;
use stepstats::analysis::segments::Denominators;
use stepstats::config::{self, DEFAULT_CONFIG_PATH};
use stepstats::report::Report;
use stepstats::scan::{ScanFilter, scan_songs};

fn main() -> Result<(), Box<dyn Error>> {
    let config_path = env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config_notes = config::load(&config_path);
    let config = config::get();

    // Per-file parse chatter only shows when debugging. RUST_LOG still wins.
    let parsing_level = if config.log_level >= LevelFilter::Debug {
        config.log_level
    } else {
        config.log_level.min(LevelFilter::Warn)
    };
    env_logger::Builder::new()
        .filter_level(config.log_level)
        .filter_module("stepstats::parsing", parsing_level)
        .parse_default_env()
        .init();

    for note in config_notes {
        log!(note.level, "{}", note.message);
    }
    info!("stepstats starting with config '{}'...", config_path.display());
    let started = Instant::now();

    let pattern = config.file_pattern.as_deref();
    let filter = ScanFilter::new(&config.steps_types, pattern).map_err(|e| {
        error!("Invalid Filter.FilePattern: {}", e);
        e
    })?;
    let scan = scan_songs(&config.songs_dir, &filter);
    if scan.charts.is_empty() {
        warn!("No charts found under '{}'.", config.songs_dir.display());
    }

    let denominators = Denominators::new(config.denominators.clone());
    info!(
        "Analyzing {} charts on {} threads (denominators {:?})...",
        scan.charts.len(),
        config.jobs,
        denominators.values()
    );
    let results = analyze_all(&scan.charts, &denominators, config.jobs);
    let analyzed = results.iter().flatten().count();
    if analyzed < scan.charts.len() {
        info!("{} charts had no steps.", scan.charts.len() - analyzed);
    }

    let report = Report::from_results(&scan.charts, &results, &denominators);
    if let Err(e) = report.write(&config.output_dir, &config.output_prefix, config.output_format) {
        error!("Failed to write reports to '{}': {}", config.output_dir.display(), e);
        return Err(e.into());
    }

    info!(
        "Done: {} songs, {} charts analyzed, {} segments in {:.2}s.",
        scan.songs,
        analyzed,
        report.segments.len(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
