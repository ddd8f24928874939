//! Command-line arguments and configuration assembly.
//!
//! Precedence, lowest first: built-in defaults, the YAML file,
//! `TOMSIM_*` environment variables, then these flags.

use std::path::{Path, PathBuf};

use clap::Parser;
use tomsim_core::SimulationConfig;
use tomsim_types::ExperimentVariant;
use tracing::info;

use crate::error::EngineError;

/// Config file read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_PATH: &str = "tomsim.yaml";

/// Theory-of-mind negotiation simulation
#[derive(Parser, Debug, Default)]
#[command(name = "tomsim")]
#[command(about = "Evolutionary simulation of negotiating agents with theory of mind")]
#[command(version)]
pub struct Args {
    /// YAML configuration file (default: tomsim.yaml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Run the experiment to completion without the observer, then exit
    #[arg(long)]
    pub headless: bool,

    /// Experiment variant: 1 (standard) or 2 (use experience)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub variant: Option<u8>,

    /// Stem of the results file name
    #[arg(long)]
    pub file_stem: Option<String>,

    /// Seed for the random number generator
    #[arg(long)]
    pub seed: Option<u64>,

    /// Observer HTTP port
    #[arg(long)]
    pub port: Option<u16>,
}

impl Args {
    /// Apply the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut SimulationConfig) -> Result<(), EngineError> {
        if self.headless {
            config.runner.headless = true;
        }
        if let Some(code) = self.variant {
            config.experiment.variant =
                ExperimentVariant::from_code(code).ok_or(EngineError::Variant(code))?;
        }
        if let Some(stem) = &self.file_stem {
            config.export.file_stem.clone_from(stem);
        }
        if let Some(seed) = self.seed {
            config.experiment.seed = Some(seed);
        }
        if let Some(port) = self.port {
            config.observer.port = port;
        }
        Ok(())
    }
}

/// Load the configuration file, apply environment overrides and flags,
/// and validate the result.
pub fn load_config(args: &Args) -> Result<SimulationConfig, EngineError> {
    let path = args.config.as_deref().or_else(|| {
        let default = Path::new(DEFAULT_CONFIG_PATH);
        default.exists().then_some(default)
    });

    let mut config = if let Some(path) = path {
        info!(path = %path.display(), "Loading configuration");
        SimulationConfig::from_file(path)?
    } else {
        info!("Config file not found, using defaults");
        SimulationConfig::parse("")?
    };

    args.apply(&mut config)?;
    config.validate()?;
    Ok(config)
}
