use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Local;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use image::ImageFormat;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use shotalign::{
    AlignmentMode, FfmpegDecoder, FfmpegLogLevel, FrameSet, FrameSetGenerator, HistoryEntry,
    HistoryStore, OutputRoot, ProgressCallback, ProgressInfo, ReconcilerSet, RunSummary,
    SamplingJob, SamplingOptions, SourceReport, VideoSource, expand_window, load_manifest,
    map_frame, parse_frame_rate,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const CLI_AFTER_HELP: &str = "Examples:\n  shotalign sample --sources sources.json --out screenshots --count 12 --progress\n  shotalign sample --sources sources.json --out screenshots --latest\n  shotalign plan bd.mkv dvd.mkv --frames 100,2500 --json\n  shotalign history --out screenshots --scan --prune\n  shotalign map --source-fps 29.97 --offset 332 --tolerance 3 52986\n  shotalign completions zsh > _shotalign";

const HISTORY_FILE_NAME: &str = "history.json";

#[derive(Debug, Parser)]
#[command(
    name = "shotalign",
    version,
    about = "Take frame-aligned screenshots from differently-timed encodes of the same video",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show library diagnostics on stderr (RUST_LOG overrides the filter).
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar while writing screenshots.
    #[arg(long, global = true)]
    progress: bool,

    /// Replace screenshots that already exist.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<FfmpegLogLevel>,
}

/// Where the sources come from.
#[derive(Debug, Args, Clone, Default)]
struct SourceArgs {
    /// JSON manifest describing the sources.
    #[arg(long)]
    sources: Option<PathBuf>,

    /// Additional video files, used with default settings.
    inputs: Vec<PathBuf>,
}

/// How the reference frames are chosen.
#[derive(Debug, Args, Clone, Default)]
struct SelectionArgs {
    /// Number of reference frames to sample.
    #[arg(long, default_value_t = 10)]
    count: usize,

    /// First reference frame that may be sampled.
    #[arg(long, default_value_t = 0)]
    start: u64,

    /// End of the sampling range (exclusive, 0 = end of video).
    #[arg(long, default_value_t = 0)]
    end: u64,

    /// Seed for reproducible sampling.
    #[arg(long)]
    seed: Option<u64>,

    /// Reuse the frames of the history entry with this exact label.
    #[arg(long, conflicts_with_all = ["frames", "latest"])]
    history: Option<String>,

    /// Reuse the frames of the most recent history entry.
    #[arg(long, conflicts_with = "frames")]
    latest: bool,

    /// Explicit reference frames, comma-separated.
    #[arg(long, value_delimiter = ',')]
    frames: Option<Vec<u64>>,

    /// History ledger. Defaults to history.json in the output root.
    #[arg(long)]
    history_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write screenshots for a new or replayed frame set.
    #[command(
        about = "Sample aligned screenshots",
        after_help = "Examples:\n  shotalign sample --sources sources.json --out screenshots --count 12\n  shotalign sample bd.mkv dvd.mkv --out screenshots --seed 7 --ext jpg"
    )]
    Sample {
        #[command(flatten)]
        sources: SourceArgs,
        #[command(flatten)]
        selection: SelectionArgs,
        /// Screenshots root; each run gets its own timestamped directory.
        #[arg(long, default_value = "screenshots")]
        out: PathBuf,
        /// Output image extension (png, jpg, bmp, tiff, webp).
        #[arg(long, default_value = "png")]
        ext: String,
        /// Process sources in parallel (requires the `rayon` feature).
        #[arg(long)]
        parallel: bool,
        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show which screenshots a run would take, without decoding.
    #[command(about = "Dry-run the frame mapping")]
    Plan {
        #[command(flatten)]
        sources: SourceArgs,
        #[command(flatten)]
        selection: SelectionArgs,
        /// Screenshots root, used to find the history ledger.
        #[arg(long, default_value = "screenshots")]
        out: PathBuf,
        /// Print the plan as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List, import, and prune frame-set history.
    #[command(about = "Manage sampling history")]
    History {
        /// Screenshots root.
        #[arg(long, default_value = "screenshots")]
        out: PathBuf,
        /// History ledger. Defaults to history.json in the output root.
        #[arg(long)]
        history_file: Option<PathBuf>,
        /// Import run directories missing from the ledger.
        #[arg(long)]
        scan: bool,
        /// Drop entries whose run directory was deleted.
        #[arg(long)]
        prune: bool,
        /// Print entries as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Map reference frames onto one source clock.
    #[command(
        about = "Map reference frames to source frames",
        after_help = "Examples:\n  shotalign map --source-fps 29.97 --offset 332 52986\n  shotalign map --reference-fps 23.976 --source-fps 25 --tolerance 2 --total 40000 100 200"
    )]
    Map {
        /// Reference clock rate (e.g. 25, 23.976, 24000/1001).
        #[arg(long, default_value = "25", value_parser = parse_frame_rate_arg)]
        reference_fps: f64,
        /// Source clock rate.
        #[arg(long, value_parser = parse_frame_rate_arg)]
        source_fps: f64,
        /// Source frames added after conversion.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        offset: i64,
        /// Frames captured on each side.
        #[arg(long, default_value_t = 0)]
        tolerance: u32,
        /// Source frame count, to clip windows.
        #[arg(long)]
        total: Option<u64>,
        /// Reference frames to map.
        #[arg(required = true)]
        frames: Vec<u64>,
        /// Print the mapping as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn parse_frame_rate_arg(value: &str) -> Result<f64, String> {
    parse_frame_rate(value).map_err(|error| error.to_string())
}

fn parse_image_format(value: &str) -> Option<ImageFormat> {
    ImageFormat::from_extension(value.trim_start_matches('.').to_ascii_lowercase())
        .filter(|format| format.can_write())
}

fn init_logging(verbose: bool) {
    if !verbose {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shotalign=debug"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn apply_global_options(global: &GlobalOptions) {
    init_logging(global.verbose);
    if let Some(level) = global.log_level {
        shotalign::set_ffmpeg_log_level(level);
    }
}

fn load_sources(args: &SourceArgs) -> Result<Vec<VideoSource>, Box<dyn std::error::Error>> {
    let mut sources = match &args.sources {
        Some(manifest) => load_manifest(manifest)?,
        None => Vec::new(),
    };
    sources.extend(args.inputs.iter().map(VideoSource::new));

    if sources.is_empty() {
        return Err("no sources given (use --sources or list video files)".into());
    }
    Ok(sources)
}

fn history_path(out: &Path, history_file: &Option<PathBuf>) -> PathBuf {
    history_file
        .clone()
        .unwrap_or_else(|| out.join(HISTORY_FILE_NAME))
}

fn select_frames(
    job: &SamplingJob,
    sources: &[VideoSource],
    selection: &SelectionArgs,
    history: &HistoryStore,
) -> Result<FrameSet, Box<dyn std::error::Error>> {
    if let Some(frames) = &selection.frames {
        return Ok(FrameSet::from_frames(frames.clone()));
    }

    let mut generator = match selection.seed {
        Some(seed) => FrameSetGenerator::with_seed(seed),
        None => FrameSetGenerator::new(),
    };

    if let Some(entry) = history_entry(history, selection)? {
        return Ok(generator.replay(entry));
    }

    let total_frames = job.reference_total_frames(sources)?;
    Ok(generator.generate(total_frames, selection.count, selection.start, selection.end)?)
}

/// The history entry a selection asks to replay, if any.
fn history_entry<'a>(
    history: &'a HistoryStore,
    selection: &SelectionArgs,
) -> Result<Option<&'a HistoryEntry>, Box<dyn std::error::Error>> {
    if selection.latest {
        return Ok(Some(history.latest().ok_or("history is empty")?));
    }
    match &selection.history {
        Some(label) => Ok(Some(history.find(label)?)),
        None => Ok(None),
    }
}

/// Drives an indicatif bar from library progress callbacks.
struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        if let Some(source) = &info.current_source {
            self.bar.set_message(source.clone());
        }
    }
}

fn print_summary(summary: &RunSummary) {
    for source in &summary.sources {
        match &source.error {
            Some(error) => eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("{} failed: {error}", source.identity).yellow()
            ),
            None => {
                println!("  {}: {}", source.identity.bold(), source_counts(source));
                for line in skip_lines(source) {
                    println!("    {}", line.dimmed());
                }
            }
        }
    }
}

/// Screenshot counts for one source. Failed screenshots and written ones add
/// up to the attempted count; out-of-range reference frames are separate.
fn source_counts(source: &SourceReport) -> String {
    format!(
        "{}/{} written, {} failed, {} reference frame(s) out of range",
        source.written,
        source.attempted,
        source.failed_screenshots().count(),
        source.window_skips().count()
    )
}

fn skip_lines(source: &SourceReport) -> Vec<String> {
    source
        .skipped
        .iter()
        .map(|skip| match skip.source_frame {
            Some(frame) => format!(
                "reference {} (frame {frame}): {}",
                skip.reference_frame, skip.reason
            ),
            None => format!("reference {}: {}", skip.reference_frame, skip.reason),
        })
        .collect()
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global);

    match cli.command {
        Commands::Sample {
            sources,
            selection,
            out,
            ext,
            parallel,
            json,
        } => {
            let sources = load_sources(&sources)?;
            let format = parse_image_format(&ext).ok_or(format!("unsupported --ext: {ext}"))?;

            let mut options = SamplingOptions::new()
                .with_image_format(format)
                .with_overwrite(cli.global.overwrite);
            let progress = if cli.global.progress {
                let progress = Arc::new(TerminalProgress::new()?);
                options = options.with_progress(progress.clone());
                Some(progress)
            } else {
                None
            };

            let job = SamplingJob::new(FfmpegDecoder, ReconcilerSet::standard(), options);
            let mut history = HistoryStore::open(history_path(&out, &selection.history_file))?;
            let frame_set = select_frames(&job, &sources, &selection, &history)?;

            let root = OutputRoot::new(&out);
            let run_directory = root.create_run_directory(&Local::now())?;

            let summary = if parallel {
                #[cfg(feature = "rayon")]
                {
                    job.run_parallel(&sources, &frame_set, &run_directory)?
                }
                #[cfg(not(feature = "rayon"))]
                {
                    eprintln!(
                        "{} {}",
                        "warning:".yellow().bold(),
                        "--parallel requires building with the `rayon` feature".yellow()
                    );
                    job.run(&sources, &frame_set, &run_directory)?
                }
            } else {
                job.run(&sources, &frame_set, &run_directory)?
            };

            if let Some(progress) = progress {
                progress.bar.finish_with_message("done");
            }

            if summary.frames_written() > 0 {
                let folder = run_directory
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                history.record_run(&frame_set, &folder)?;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
                println!(
                    "{} {}",
                    "success:".green().bold(),
                    format!(
                        "Wrote {} screenshot(s) for {} reference frame(s) to {}",
                        summary.frames_written(),
                        frame_set.len(),
                        run_directory.display()
                    )
                    .green()
                );
            }

            if summary.failed_sources().count() == summary.sources.len() {
                return Err("every source failed".into());
            }
        }
        Commands::Plan {
            sources,
            selection,
            out,
            json,
        } => {
            let sources = load_sources(&sources)?;
            let job = SamplingJob::new(FfmpegDecoder, ReconcilerSet::standard(), SamplingOptions::new());
            let history = HistoryStore::open(history_path(&out, &selection.history_file))?;
            let frame_set = select_frames(&job, &sources, &selection, &history)?;
            let plan = job.plan(&sources, &frame_set)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                println!("Reference frames: {:?}", frame_set.frames());
                for source in &plan.sources {
                    if let Some(error) = &source.error {
                        println!("{} {}", source.identity.bold(), error.red());
                        continue;
                    }
                    println!(
                        "{} (ratio {:.6}, offset {}, {} frames)",
                        source.identity.bold(),
                        source.ratio.unwrap_or(1.0),
                        source.offset_frames,
                        source.total_frames.unwrap_or(0)
                    );
                    for task in &source.tasks {
                        println!("  {} -> {}", task.reference_frame, task.file_name("png"));
                    }
                    for skip in &source.skipped {
                        println!("  {} {}", skip.reference_frame, skip.reason.yellow());
                    }
                }
                println!("{} task(s)", plan.task_count());
            }
        }
        Commands::History {
            out,
            history_file,
            scan,
            prune,
            json,
        } => {
            let root = OutputRoot::new(&out);
            let mut history = HistoryStore::open(history_path(&out, &history_file))?;

            if scan {
                let added = history.reconstruct_from_outputs(&root)?;
                println!("{} recovered {added} entr(ies)", "scan:".cyan().bold());
            }
            if prune {
                let removed = history.prune_missing(&root)?;
                println!("{} removed {removed} entr(ies)", "prune:".cyan().bold());
            }

            if json {
                println!("{}", serde_json::to_string_pretty(history.list())?);
            } else if history.is_empty() {
                println!("No history entries.");
            } else {
                for entry in history.list() {
                    println!(
                        "{}  {}  {:?}",
                        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                        entry.label.bold(),
                        entry.frames
                    );
                }
            }
        }
        Commands::Map {
            reference_fps,
            source_fps,
            offset,
            tolerance,
            total,
            frames,
            json,
        } => {
            let source = VideoSource::new("map")
                .with_identity("map")
                .with_reference_fps(reference_fps)
                .with_source_fps(source_fps)
                .with_offset_frames(offset)
                .with_tolerance_frames(tolerance)
                .with_alignment_mode(AlignmentMode::None);

            let mut rows = Vec::with_capacity(frames.len());
            for reference_frame in frames {
                let source_frame = map_frame(reference_frame, &source)?;
                let window = match total {
                    Some(total_frames) => expand_window(source_frame, tolerance, total_frames).ok(),
                    None => expand_window(source_frame, tolerance, u64::MAX).ok(),
                };
                rows.push((reference_frame, source_frame, window));
            }

            if json {
                let payload: Vec<_> = rows
                    .iter()
                    .map(|(reference_frame, source_frame, window)| {
                        json!({
                            "reference_frame": reference_frame,
                            "source_frame": source_frame,
                            "window": window,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for (reference_frame, source_frame, window) in rows {
                    match window {
                        Some(window) => println!("{reference_frame} -> {source_frame} {window:?}"),
                        None => println!(
                            "{reference_frame} -> {source_frame} {}",
                            "(out of range)".yellow()
                        ),
                    }
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "shotalign", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Cli, SelectionArgs, history_entry, history_path, parse_frame_rate_arg, parse_image_format,
        skip_lines, source_counts,
    };
    use shotalign::{FrameSet, HistoryStore, SkippedFrame, SourceReport};
    use clap::CommandFactory;
    use image::ImageFormat;
    use std::path::{Path, PathBuf};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_image_format_aliases() {
        assert_eq!(parse_image_format("png"), Some(ImageFormat::Png));
        assert_eq!(parse_image_format(".JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(parse_image_format("jpeg"), Some(ImageFormat::Jpeg));
        assert!(parse_image_format("mkv").is_none());
    }

    #[test]
    fn parse_frame_rate_forms() {
        assert_eq!(parse_frame_rate_arg("25").unwrap(), 25.0);
        assert!((parse_frame_rate_arg("30000/1001").unwrap() - 29.97).abs() < 0.001);
        assert!(parse_frame_rate_arg("fast").is_err());
    }

    #[test]
    fn history_defaults_to_output_root() {
        assert_eq!(
            history_path(Path::new("shots"), &None),
            PathBuf::from("shots/history.json")
        );
        assert_eq!(
            history_path(Path::new("shots"), &Some(PathBuf::from("h.json"))),
            PathBuf::from("h.json")
        );
    }

    #[test]
    fn latest_flag_and_exact_labels_are_distinct() {
        let mut history = HistoryStore::in_memory();
        history.record(&FrameSet::from_frames(vec![1, 2]), "latest").unwrap();
        history.record(&FrameSet::from_frames(vec![9]), "newest").unwrap();

        let by_label = SelectionArgs {
            history: Some("latest".to_string()),
            ..SelectionArgs::default()
        };
        let entry = history_entry(&history, &by_label).unwrap().unwrap();
        assert_eq!(entry.frames, vec![1, 2]);

        let most_recent = SelectionArgs {
            latest: true,
            ..SelectionArgs::default()
        };
        let entry = history_entry(&history, &most_recent).unwrap().unwrap();
        assert_eq!(entry.label, "newest");

        assert!(history_entry(&history, &SelectionArgs::default()).unwrap().is_none());
        assert!(history_entry(&HistoryStore::in_memory(), &most_recent).is_err());
    }

    #[test]
    fn summary_counts_add_up_and_list_reasons() {
        let report = SourceReport {
            identity: "DVD".to_string(),
            total_frames: Some(100),
            ratio: Some(1.0),
            attempted: 3,
            written: 2,
            skipped: vec![
                SkippedFrame {
                    reference_frame: 4,
                    source_frame: Some(5),
                    reason: "corrupt packet".to_string(),
                },
                SkippedFrame {
                    reference_frame: 900,
                    source_frame: None,
                    reason: "no frames in window".to_string(),
                },
            ],
            error: None,
        };

        assert_eq!(
            source_counts(&report),
            "2/3 written, 1 failed, 1 reference frame(s) out of range"
        );
        assert_eq!(
            skip_lines(&report),
            vec![
                "reference 4 (frame 5): corrupt packet".to_string(),
                "reference 900: no frames in window".to_string(),
            ]
        );
    }
}
