//! Builds and drives a [`Universe`] from command line arguments.
//!
//! The runner owns the boring outer shell every host repeats: parse arguments, configure
//! logging, apply a config file, hand the universe to the host's setup function, restore a
//! save, and optionally advance a fixed number of frames. Hosts with their own frame loop
//! pass `--frames 0` (the default) and step the returned universe themselves.

use std::fs::File;
use std::path::Path;

use clap::{Args, Command, FromArgMatches as _};
use log::LevelFilter;
use serde::Deserialize;

use crate::error::OrreryError;
use crate::log::set_log_level;
use crate::physics::StepSettings;
use crate::universe::Universe;

/// Default cli arguments for the orrery runner
#[derive(Args, Debug)]
pub struct BaseArgs {
    /// Log level: off, error, warn, info, debug or trace
    #[arg(short, long, default_value = "off")]
    pub log_level: String,

    /// Optional path for a simulation config file
    #[arg(short, long, default_value = "")]
    pub config: String,

    /// Optional path for a save to restore once setup has run
    #[arg(short, long, default_value = "")]
    pub save: String,

    /// Number of frames to advance after setup; 0 leaves stepping to the caller
    #[arg(short, long, default_value_t = 0)]
    pub frames: u32,

    /// Frame delta time in seconds
    #[arg(long, default_value_t = 1.0 / 60.0)]
    pub frame_dt: f64,
}

#[derive(Args)]
pub struct PlaceholderCustom {}

/// Host-tunable parameters loaded from the `--config` JSON file.
#[derive(Deserialize, Debug, Default)]
pub struct SimulationConfig {
    /// Physics stepping parameters.
    #[serde(default)]
    pub step: Option<StepSettings>,
    /// The current system version, compared against a restored save's version.
    #[serde(default)]
    pub system_version: Option<String>,
}

fn create_orrery_cli() -> Command {
    let cli = Command::new("orrery");
    BaseArgs::augment_args(cli)
}

/// Runs a simulation with custom cli arguments.
///
/// This function allows you to define custom arguments and a setup function. The setup
/// function typically registers behaviors and creates or subscribes the initial objects.
///
/// # Errors
/// Returns an error if argument parsing, the setup function, the save restore or a frame
/// fails
pub fn run_with_custom_args<A, F>(setup_fn: F) -> Result<Universe, Box<dyn std::error::Error>>
where
    A: Args,
    F: Fn(&mut Universe, BaseArgs, Option<A>) -> Result<(), OrreryError>,
{
    let mut cli = create_orrery_cli();
    cli = A::augment_args(cli);
    let matches = cli.get_matches();

    let base_args_matches = BaseArgs::from_arg_matches(&matches)?;
    let custom_matches = A::from_arg_matches(&matches)?;
    run_with_args_internal(base_args_matches, Some(custom_matches), setup_fn)
}

/// Runs a simulation with default cli arguments
///
/// # Errors
/// Returns an error if argument parsing, the setup function, the save restore or a frame
/// fails
pub fn run_with_args<F>(setup_fn: F) -> Result<Universe, Box<dyn std::error::Error>>
where
    F: Fn(&mut Universe, BaseArgs, Option<PlaceholderCustom>) -> Result<(), OrreryError>,
{
    let cli = create_orrery_cli();
    let matches = cli.get_matches();

    let base_args_matches = BaseArgs::from_arg_matches(&matches)?;
    run_with_args_internal(base_args_matches, None, setup_fn)
}

fn run_with_args_internal<A, F>(
    args: BaseArgs,
    custom_args: Option<A>,
    setup_fn: F,
) -> Result<Universe, Box<dyn std::error::Error>>
where
    F: Fn(&mut Universe, BaseArgs, Option<A>) -> Result<(), OrreryError>,
{
    // Instantiate a universe
    let mut universe = Universe::new();

    let level = args
        .log_level
        .parse::<LevelFilter>()
        .map_err(|_| OrreryError::from(format!("invalid log level '{}'", args.log_level)))?;
    if level != LevelFilter::Off {
        set_log_level(level);
    }

    // Optionally apply a config file
    let mut config = SimulationConfig::default();
    if !args.config.is_empty() {
        println!("Loading simulation config from: {}", args.config);
        let file = File::open(Path::new(&args.config))?;
        config = serde_json::from_reader(file)?;
        if let Some(step) = config.step {
            universe.set_settings(step);
        }
    }

    let save = args.save.clone();
    let frames = args.frames;
    let frame_dt = args.frame_dt;

    // Run the provided Fn
    setup_fn(&mut universe, args, custom_args)?;

    // Restore a save after setup, so the behaviors it needs are registered
    if !save.is_empty() {
        universe.load_from_path(Path::new(&save), config.system_version.as_deref())?;
    }

    if frames > 0 {
        universe.run_frames(frames, frame_dt)?;
    }
    Ok(universe)
}
