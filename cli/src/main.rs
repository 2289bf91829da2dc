use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use barabara::{FrameLoop, PuzzleSession, PuzzleView, SessionSnapshot, SvgView, SystemClock};
use barabara_core::protocol::ImageUpload;
use barabara_core::{
    scatter_layout, EngineConfig, FitTransform, GridSpec, LocalPuzzleService, Point, Size,
    TargetSource,
};
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "barabara", version, about = "Scatter and reconstruct split jigsaw images")]
struct Cli {
    /// Engine config (TOML).
    #[arg(long, global = true, env = "BARABARA_CONFIG")]
    config: Option<PathBuf>,
    /// Log filter, overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// RNG seed, decimal or 0x-prefixed hex.
    #[arg(long, global = true)]
    seed: Option<String>,
    #[arg(long, global = true)]
    pieces: Option<usize>,
    #[arg(long, global = true, value_parser = parse_size)]
    viewport: Option<Size>,
    #[arg(long, global = true, value_enum)]
    targets: Option<TargetsArg>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum TargetsArg {
    Grid,
    Service,
}

impl From<TargetsArg> for TargetSource {
    fn from(value: TargetsArg) -> Self {
        match value {
            TargetsArg::Grid => TargetSource::Grid,
            TargetsArg::Service => TargetSource::Service,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the fit transform from one space into another.
    Transform {
        #[arg(long, value_parser = parse_size)]
        src: Size,
        #[arg(long, value_parser = parse_size)]
        dest: Size,
    },
    /// Print a scatter layout as JSON.
    Scatter {
        #[arg(long)]
        count: Option<usize>,
    },
    /// Split, shuffle, rebuild and animate against the local service, then
    /// write the last frame as SVG.
    Play {
        #[arg(long, default_value = "puzzle.png")]
        image: String,
        #[arg(long, value_parser = parse_size, default_value = "1600x1200")]
        image_size: Size,
        #[arg(long, default_value = "rebuilt.svg")]
        output: PathBuf,
        #[arg(long, default_value_t = 60)]
        fps: u32,
        /// Fixed grid as COLSxROWS.
        #[arg(long, value_parser = parse_grid)]
        grid: Option<GridSpec>,
        /// Play the finished run a second time.
        #[arg(long)]
        replay: bool,
    },
}

#[derive(Serialize)]
struct TransformReport {
    scale: f32,
    offset: Point,
}

#[derive(Serialize)]
struct ScatterReport {
    count: usize,
    degraded: usize,
    positions: Vec<Point>,
}

#[derive(Serialize)]
struct PlayReport {
    pieces: usize,
    generation: u64,
    ticks: u64,
    frames: u64,
    renders: u64,
    result_ref: Option<String>,
    output: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());
    let config = build_config(&cli)?;

    match cli.command {
        Commands::Transform { src, dest } => {
            let fit = FitTransform::fit(src, dest)?;
            let report = TransformReport {
                scale: fit.scale,
                offset: fit.offset,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Scatter { count } => {
            let count = count.unwrap_or(config.piece_count);
            let mut rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_rng(&mut rand::rng()),
            };
            let layout = scatter_layout(count, &config.scatter_params(), &mut rng)?;
            let report = ScatterReport {
                count,
                degraded: layout.degraded,
                positions: layout.positions,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Play {
            image,
            image_size,
            output,
            fps,
            grid,
            replay,
        } => {
            let report = play(config, image, image_size, output, fps, grid, replay).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(cli: &Cli) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = match cli.config.as_ref() {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(raw) = cli.seed.as_deref() {
        config.seed = Some(parse_seed_arg(raw)?);
    }
    if let Some(pieces) = cli.pieces {
        config.piece_count = pieces;
        if config.grid.is_some_and(|grid| grid.count() != pieces) {
            tracing::warn!(pieces, "configured grid does not hold the requested pieces, ignoring it");
            config.grid = None;
        }
    }
    if let Some(viewport) = cli.viewport {
        config.viewport = viewport;
    }
    if let Some(targets) = cli.targets {
        config.target_source = targets.into();
    }
    config.validate()?;
    Ok(config)
}

async fn play(
    config: EngineConfig,
    image: String,
    image_size: Size,
    output: PathBuf,
    fps: u32,
    grid: Option<GridSpec>,
    replay: bool,
) -> Result<PlayReport, Box<dyn std::error::Error>> {
    let mut service = LocalPuzzleService::new(config.seed);
    if let Some(grid) = grid {
        service = service.with_grid(grid);
    }
    let mut frames = FrameLoop::new();
    let mut session = PuzzleSession::new(
        service,
        frames.requester(),
        Box::new(SystemClock::new()),
        config,
    )?;
    let view = Rc::new(RefCell::new(SvgView::new()));
    let sink = Rc::clone(&view);
    let _subscription = session.subscribe(Rc::new(move |snapshot: &SessionSnapshot| {
        sink.borrow_mut().render(snapshot);
    }));

    session
        .shatter(ImageUpload {
            file_name: image,
            image_size,
            bytes: Vec::new(),
        })
        .await?;
    session.shuffle();
    session.rebuild().await?;

    let period = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
    let mut interval = tokio::time::interval(period);
    drive(&mut frames, &mut session, &mut interval).await;
    if replay && session.replay().is_some() {
        drive(&mut frames, &mut session, &mut interval).await;
    }

    let svg = view.borrow().last().map(str::to_string).unwrap_or_default();
    std::fs::write(&output, svg)?;
    tracing::info!(output = %output.display(), "wrote final frame");

    let renders = view.borrow().renders();
    Ok(PlayReport {
        pieces: session.model().len(),
        generation: session.generation().value(),
        ticks: frames.ticks(),
        frames: frames.dispatched(),
        renders,
        result_ref: session.result_ref().map(str::to_string),
        output,
    })
}

async fn drive(
    frames: &mut FrameLoop,
    session: &mut PuzzleSession<LocalPuzzleService, barabara::FrameQueue>,
    interval: &mut tokio::time::Interval,
) {
    while !frames.is_idle() {
        interval.tick().await;
        frames.tick(session);
    }
}

fn parse_size(raw: &str) -> Result<Size, String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {raw}"))?;
    let width: f32 = w.trim().parse().map_err(|err| format!("bad width {w}: {err}"))?;
    let height: f32 = h.trim().parse().map_err(|err| format!("bad height {h}: {err}"))?;
    Ok(Size::new(width, height))
}

fn parse_grid(raw: &str) -> Result<GridSpec, String> {
    let (c, r) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected COLSxROWS, got {raw}"))?;
    let cols: u32 = c.trim().parse().map_err(|err| format!("bad cols {c}: {err}"))?;
    let rows: u32 = r.trim().parse().map_err(|err| format!("bad rows {r}: {err}"))?;
    if cols == 0 || rows == 0 {
        return Err("grid needs at least one column and one row".to_string());
    }
    Ok(GridSpec::new(cols, rows))
}

fn parse_seed_arg(raw: &str) -> Result<u64, Box<dyn std::error::Error>> {
    let trimmed = raw.trim();
    let value = if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16)?
    } else {
        trimmed.parse::<u64>()?
    };
    Ok(value)
}
