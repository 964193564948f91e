use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use lens_core::{CalibrationResult, CalibrationSession, ImageSize, PatternObservation};
use lens_imgproc::OverlayStyle;
use lens_pipeline::{
    load_json_file, run_measurements, CalibrationSolver, CaptureController, CaptureEvent,
    ChessboardDetector, FrameReport, FrameSource, ImageDirSource, LensConfig, MeasureError,
    MeasurementPipeline, Undistorter,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Camera calibration and marker-based metric measurement.
#[derive(Debug, Parser)]
#[command(author, version, about = "Camera calibration and circular-marker measurement")]
struct Cli {
    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Detect the chessboard in every image of a directory and calibrate.
    Calibrate(CalibrateArgs),
    /// Calibrate from pre-extracted correspondences.
    CalibrateViews(CalibrateViewsArgs),
    /// Write undistorted copies of a directory of images.
    Undistort(UndistortArgs),
    /// Measure distances between circular markers.
    Measure(MeasureArgs),
}

#[derive(Debug, Args)]
struct CalibrateArgs {
    /// Directory of calibration images.
    #[arg(long)]
    images: PathBuf,
    /// JSON configuration; defaults apply to anything omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    rows: Option<usize>,
    #[arg(long)]
    cols: Option<usize>,
    /// Corner spacing, in the unit measurements are reported in.
    #[arg(long)]
    spacing: Option<f64>,
    #[arg(long)]
    min_observations: Option<usize>,
    /// Where to write the calibration result.
    #[arg(long)]
    output: PathBuf,
}

#[derive(Debug, Args)]
struct CalibrateViewsArgs {
    /// JSON file with `image_size` and a list of `observations`.
    #[arg(long)]
    views: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    min_observations: Option<usize>,
    #[arg(long)]
    output: PathBuf,
}

#[derive(Debug, Args)]
struct UndistortArgs {
    #[arg(long)]
    calibration: PathBuf,
    #[arg(long)]
    images: PathBuf,
    #[arg(long)]
    out_dir: PathBuf,
}

#[derive(Debug, Args)]
struct MeasureArgs {
    #[arg(long)]
    calibration: PathBuf,
    #[arg(long)]
    images: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Reference marker diameter (overrides the configuration).
    #[arg(long)]
    diameter: Option<f64>,
    /// Write annotated frames here.
    #[arg(long)]
    annotate_dir: Option<PathBuf>,
}

/// Correspondences for `calibrate-views`.
#[derive(Debug, Serialize, Deserialize)]
struct ViewsFile {
    image_size: ImageSize,
    observations: Vec<PatternObservation>,
}

fn load_config(path: Option<&Path>) -> Result<LensConfig> {
    match path {
        Some(p) => LensConfig::load(p).with_context(|| format!("loading config {}", p.display())),
        None => Ok(LensConfig::default()),
    }
}

fn format_summary(result: &CalibrationResult) -> String {
    let k = result.k_matrix();
    let d = result.distortion().coeffs();
    let mut lines = vec!["camera matrix:".to_string()];
    lines.extend((0..3).map(|r| {
        format!("  [{:12.4} {:12.4} {:12.4}]", k[(r, 0)], k[(r, 1)], k[(r, 2)])
    }));
    lines.push(format!(
        "distortion [k1 k2 k3 p1 p2]: [{:.6} {:.6} {:.6} {:.6} {:.6}]",
        d[0], d[1], d[2], d[3], d[4]
    ));
    lines.push(format!("views: {}", result.poses().len()));
    lines.push(format!("rms reprojection error: {:.4} px", result.rms_error()));
    if let Some(mean) = result.mean_reprojection_error() {
        lines.push(format!("mean reprojection error: {mean:.4} px"));
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn save_result(result: &CalibrationResult, output: &Path) -> Result<()> {
    result
        .save_json(output)
        .with_context(|| format!("writing {}", output.display()))?;
    info!("calibration written to {}", output.display());
    Ok(())
}

fn run_calibrate(args: &CalibrateArgs) -> Result<CalibrationResult> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(rows) = args.rows {
        config.pattern.rows = rows;
    }
    if let Some(cols) = args.cols {
        config.pattern.cols = cols;
    }
    if let Some(spacing) = args.spacing {
        config.pattern.spacing = spacing;
    }
    if let Some(n) = args.min_observations {
        config.calibration.min_observations = n;
    }
    config.validate()?;

    let pattern = config.pattern.to_pattern()?;
    let mut controller = CaptureController::new(
        ChessboardDetector::new(pattern),
        CalibrationSolver::from_config(&config.calibration),
    );
    let mut source = ImageDirSource::open(&args.images).context("opening calibration images")?;
    while let Some(frame) = source.next_frame().context("reading calibration images")? {
        let name = source
            .current_path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        if controller.process_frame(&frame) {
            controller.handle(CaptureEvent::Accept)?;
            info!("{name}: pattern found");
        } else {
            warn!("{name}: pattern not found");
        }
    }
    controller
        .handle(CaptureEvent::Finish)
        .context("calibration stage")?;
    match controller.into_result() {
        Some(result) => Ok(result),
        None => bail!("calibration produced no result"),
    }
}

fn run_calibrate_views(args: &CalibrateViewsArgs) -> Result<CalibrationResult> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(n) = args.min_observations {
        config.calibration.min_observations = n;
    }
    let views: ViewsFile = load_json_file(&args.views)?;
    let mut session = CalibrationSession::new();
    for (i, obs) in views.observations.into_iter().enumerate() {
        session
            .add_observation(obs, views.image_size)
            .with_context(|| format!("observation {i}"))?;
    }
    let result = CalibrationSolver::from_config(&config.calibration)
        .solve(&session)
        .context("calibration stage")?;
    Ok(result)
}

fn output_path(out_dir: &Path, source: &ImageDirSource, index: usize) -> PathBuf {
    let stem = source
        .current_path()
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("frame_{index:04}"));
    out_dir.join(format!("{stem}.png"))
}

fn run_undistort(args: &UndistortArgs) -> Result<usize> {
    let result = CalibrationResult::load_json(&args.calibration).context("loading calibration")?;
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;
    let mut source = ImageDirSource::open(&args.images).context("opening images")?;
    let mut undistorter: Option<Undistorter> = None;
    let mut count = 0;
    while let Some(frame) = source.next_frame().context("reading images")? {
        let size = ImageSize::new(frame.width(), frame.height());
        let u = match undistorter.take() {
            Some(u) if u.image_size() == size => u,
            _ => Undistorter::new(&result, size)?,
        };
        let out = u.apply(&frame);
        undistorter = Some(u);
        let path = output_path(&args.out_dir, &source, count);
        out.save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        debug!("wrote {}", path.display());
        count += 1;
    }
    info!("undistorted {count} images");
    Ok(count)
}

fn describe_frame(report: &FrameReport) -> String {
    match &report.measurement {
        Ok(m) => match m.primary() {
            Some(p) => format!(
                "frame {}: distance {:.4} ({:.1} px, {} markers)",
                report.index,
                p.metric_distance,
                p.pixel_distance,
                m.circles.len()
            ),
            None => format!("frame {}: no measurement", report.index),
        },
        Err(MeasureError::InsufficientMarkers { found: 0 }) => {
            format!("frame {}: No circles detected", report.index)
        }
        Err(e) => format!("frame {}: {e}", report.index),
    }
}

fn run_measure(args: &MeasureArgs) -> Result<Vec<String>> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(d) = args.diameter {
        config.measurement.reference_diameter = d;
    }
    config.validate()?;
    let result = CalibrationResult::load_json(&args.calibration).context("loading calibration")?;
    let mut pipeline = MeasurementPipeline::from_config(result, &config)?;
    if let Some(dir) = &args.annotate_dir {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let mut source = ImageDirSource::open(&args.images).context("opening images")?;
    let style = OverlayStyle::default();
    let mut lines = Vec::new();
    let mut write_error = None;
    run_measurements(&mut source, &mut pipeline, |report| {
        lines.push(describe_frame(report));
        let Some(dir) = &args.annotate_dir else {
            return;
        };
        if write_error.is_some() {
            return;
        }
        let path = dir.join(format!("frame_{:04}.png", report.index));
        if let Err(e) = report.annotated(&style).save(&path) {
            write_error = Some(anyhow::Error::new(e).context(format!("writing {}", path.display())));
        }
    })
    .context("measurement loop")?;
    if let Some(e) = write_error {
        return Err(e);
    }
    Ok(lines)
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match &cli.command {
        Command::Calibrate(args) => {
            let result = run_calibrate(args)?;
            save_result(&result, &args.output)?;
            print!("{}", format_summary(&result));
        }
        Command::CalibrateViews(args) => {
            let result = run_calibrate_views(args)?;
            save_result(&result, &args.output)?;
            print!("{}", format_summary(&result));
        }
        Command::Undistort(args) => {
            let n = run_undistort(args)?;
            println!("undistorted {n} images into {}", args.out_dir.display());
        }
        Command::Measure(args) => {
            for line in run_measure(args)? {
                println!("{line}");
            }
        }
    }
    Ok(())
}
