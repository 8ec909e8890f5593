mod app;
mod audio;
mod headless;
mod osc;

use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use ssvep_core::AudioCue;
use ssvep_session::{MarkerEmitter, MarkerEncoder, RandSource, SessionConfig, Variant};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "ssvep-session")]
#[command(about = "Run a flicker/gaze-cue stimulus session with synchronized markers", long_about = None)]
#[command(version)]
struct Args {
    /// Session configuration (JSON)
    #[arg(short, long, value_name = "FILE", conflicts_with = "variant")]
    config: Option<PathBuf>,

    /// Built-in session program: gaze-shift, saccade, saccade-ssvep
    #[arg(long, default_value = "saccade")]
    variant: String,

    /// Run without a window, pacing ticks with a sleeping timer
    #[arg(long)]
    headless: bool,

    /// Write the session summary as JSON
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,

    /// Marker destination, overrides the configured one
    #[arg(long, value_name = "ADDR")]
    destination: Option<SocketAddr>,

    /// Seed for the condition randomisation
    #[arg(long)]
    seed: Option<u64>,

    /// Do not play audio cues
    #[arg(long)]
    silent: bool,

    /// Print the resolved configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = load_config(&args)?;
    if args.print_config {
        println!("{}", config.to_json_pretty()?);
        return Ok(());
    }

    log::info!("=== SSVEP SESSION ===");
    log::info!("Platform: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    log::info!(
        "{} conditions, flicker {} Hz, tick {:?}, {} ticks per trial",
        config.condition_count(),
        config.flicker_hz,
        config.tick_period()?,
        config.trial_ticks()?
    );

    let transport = osc::OscTransport::bind(&config.transport)?;
    let audio: Box<dyn AudioCue> = if args.silent {
        Box::new(audio::Silent)
    } else {
        Box::new(audio::TerminalBell)
    };
    let emitter = MarkerEmitter::new(
        MarkerEncoder::new(config.marker, config.condition_count()),
        config.audio,
        Box::new(transport),
        audio,
    );
    let rng = match config.seed {
        Some(seed) => {
            log::info!("randomisation seed {seed}");
            RandSource(StdRng::seed_from_u64(seed))
        }
        None => RandSource(StdRng::from_os_rng()),
    };

    let summary = if args.headless {
        headless::run(&config, emitter, rng)?
    } else {
        App::new(&config, emitter, rng)?.run()?
    };

    summary.log();
    if let Some(path) = &args.summary {
        write_summary(path, &summary.to_json_pretty()?)?;
    }
    if !summary.completed {
        log::warn!("session ended in {} before completion", summary.final_phase);
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            SessionConfig::from_json(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => {
            let variant: Variant = args.variant.parse()?;
            SessionConfig::preset(variant)
        }
    };
    if let Some(destination) = args.destination {
        config.transport.destination = destination;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.validate()?;
    Ok(config)
}

fn write_summary(path: &Path, json: &str) -> Result<()> {
    std::fs::write(path, json).with_context(|| format!("writing summary {}", path.display()))?;
    log::info!("summary written to {}", path.display());
    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
