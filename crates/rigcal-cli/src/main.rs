use std::{fs, path::Path, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use rigcal::prelude::*;

/// Calibrate a multi-camera Charuco rig from detected board corners.
#[derive(Debug, Parser)]
#[command(author, version, about = "Multi-camera rig calibration")]
struct Args {
    /// JSON rig topology (cameras, extrinsic guesses, stereo_config).
    #[arg(long)]
    topology: PathBuf,

    /// JSON per-camera corner observations.
    #[arg(long)]
    observations: PathBuf,

    /// JSON board description. Overrides the --squares-* options.
    #[arg(long)]
    board: Option<PathBuf>,

    #[arg(long, default_value_t = 8)]
    squares_x: u32,

    #[arg(long, default_value_t = 6)]
    squares_y: u32,

    /// Square side, in the unit translations are reported in.
    #[arg(long)]
    square_size: Option<f64>,

    #[arg(long)]
    marker_size: Option<f64>,

    /// Optional JSON CalibrationOptions. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera to leave out; may be repeated.
    #[arg(long = "disable")]
    disabled: Vec<String>,

    /// Run on the calling thread only.
    #[arg(long)]
    sequential: bool,

    /// Write the result here instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn load_board(args: &Args) -> Result<CharucoBoard> {
    if let Some(path) = &args.board {
        let board: CharucoBoard = load_json_file(path)?;
        board.validate()?;
        return Ok(board);
    }
    let (Some(square), Some(marker)) = (args.square_size, args.marker_size) else {
        bail!("either --board or both --square-size and --marker-size are required");
    };
    Ok(CharucoBoard::new(args.squares_x, args.squares_y, square, marker)?)
}

fn run(args: &Args) -> Result<RigCalibrationResult> {
    let topology: RigTopology = load_json_file(&args.topology)?;
    let observations: RigObservations = load_json_file(&args.observations)?;
    let observations = observations.sanitized()?;
    let board = load_board(args)?;

    let mut options = match &args.config {
        Some(path) => load_json_file::<CalibrationOptions>(path)?,
        None => CalibrationOptions::default(),
    };
    options.disabled_cameras.extend(args.disabled.iter().cloned());
    if args.sequential {
        options.parallel = false;
    }

    info!(
        "calibrating {} cameras on a {}x{} board",
        topology.cameras.len(),
        board.squares_x,
        board.squares_y
    );
    Ok(calibrate_rig(&topology, &observations, &board, &options))
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match try_main() {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

/// Returns whether the run assembled.
fn try_main() -> Result<bool> {
    let args = Args::parse();
    let result = run(&args)?;
    let json = serde_json::to_string_pretty(&result)?;
    match &args.output {
        Some(path) => fs::write(path, json).with_context(|| format!("writing {}", path.display()))?,
        None => println!("{json}"),
    }
    for failure in &result.failures {
        log::warn!("{}: {}", failure.unit, failure.message);
    }
    Ok(result.is_assembled())
}
