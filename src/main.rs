use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use trackscribe::cli::Cli;
use trackscribe::config::Config;
use trackscribe::media::{FfmpegToolchain, MediaToolchain};
use trackscribe::merge::{merge_tracks, write_merged_csv};
use trackscribe::pipeline::Scheduler;
use trackscribe::segment::WindowFileSegmenter;
use trackscribe::track::InputTrack;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    if let Err(e) = run(&cli) {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

fn init_logging(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(poll) = cli.poll_interval {
        config.pipeline.poll_interval_ms = poll.as_millis() as u64;
    }
    if cli.cleanup_chunks {
        config.pipeline.cleanup_chunks = true;
    }
    config.validate()?;

    let tracks = cli
        .files
        .iter()
        .map(|path| InputTrack::prepare(path))
        .collect::<trackscribe::Result<Vec<_>>>()?;

    let toolchain = Arc::new(FfmpegToolchain::default());
    for track in &tracks {
        let streams = toolchain.probe_streams(&track.path)?;
        if !streams.iter().any(|s| s.codec_type == "audio") {
            anyhow::bail!("{} has no audio stream", track.path.display());
        }
    }

    let engines = config.build_engines();
    log::info!(
        "{} track(s), {} engine(s)",
        tracks.len(),
        engines.len()
    );

    let scheduler = Scheduler::new(
        config.scheduler_config(),
        Arc::new(WindowFileSegmenter::new(config.segmenter.window_ms)),
        toolchain,
        engines,
    );
    let report = scheduler.run(&tracks)?;
    for (speaker, spans) in &report.spans_per_track {
        log::info!("{speaker}: {spans} span(s) processed");
    }

    let timeline = merge_tracks(&tracks, &config.engine_tags())?;
    let output = cli.output.clone().unwrap_or_else(|| default_output(&tracks));
    write_merged_csv(&output, &timeline)
        .with_context(|| format!("writing {}", output.display()))?;

    println!(
        "{} rows from {} speaker(s) -> {}",
        timeline.rows.len(),
        timeline.speakers.len(),
        output.display()
    );
    Ok(())
}

fn default_output(tracks: &[InputTrack]) -> PathBuf {
    let basedir = tracks
        .first()
        .and_then(|t| t.path.parent())
        .unwrap_or_else(|| std::path::Path::new("."));
    basedir.join(trackscribe::defaults::MERGED_CSV_NAME)
}
