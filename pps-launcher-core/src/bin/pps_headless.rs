//! pps-headless - run a pps-physics guest without a libretro frontend
//!
//! Loads the namespace from a directory, bootstraps it, drives a fixed number of frames
//! and disposes it. Exits non-zero when the bootstrap fails.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pps_launcher_core::abi::{DEFAULT_ENTRY_SYMBOL, DEFAULT_NAMESPACE};
use pps_launcher_core::{
    DirectorySource, FRAME_SECONDS, HostShell, Launch, LaunchConfig, LaunchOutcome,
};

#[derive(Parser)]
#[command(name = "pps-headless")]
#[command(about = "Boot a pps-physics guest and drive it without a frontend", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory namespaces are loaded from (`pps-physics.core` -> `pps_physics/core.wasm`)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Namespace to require
    #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Entry symbol that yields the application object
    #[arg(short, long, default_value = DEFAULT_ENTRY_SYMBOL)]
    entry: String,

    /// Frames to render before disposing
    #[arg(short, long, default_value_t = 60)]
    frames: u32,

    /// Fuel granted to every guest call (unlimited when omitted)
    #[arg(long)]
    fuel: Option<u64>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_level.into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = LaunchConfig::new(&cli.namespace, &cli.entry)
        .with_context(|| format!("invalid launch target {}/{}", cli.namespace, cli.entry))?;
    if let Some(fuel) = cli.fuel {
        config = config.with_fuel(fuel);
    }

    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("namespace root {} is not accessible", cli.root.display()))?;
    tracing::info!(root = %root.display(), namespace = %config.namespace, "starting");

    let mut shell = HostShell::new(Launch::guest(config, DirectorySource::new(root)));
    match shell.on_create(None) {
        LaunchOutcome::Forwarded => {}
        LaunchOutcome::Failed(report) => {
            eprintln!("{report}");
            return Ok(ExitCode::FAILURE);
        }
        LaunchOutcome::Ignored => unreachable!("fresh shell ignored its creation callback"),
    }

    for _ in 0..cli.frames {
        shell.on_frame(FRAME_SECONDS);
    }
    shell.on_destroy();

    let host = shell.host();
    tracing::info!(
        frames = host.frames(),
        guest_errors = host.guest_errors(),
        "finished"
    );

    Ok(if host.guest_errors() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
