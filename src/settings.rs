use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::db::IfExists;
use crate::ranking::DEFAULT_TOP_N;

const ENV_PREFIX: &str = "FILMWIKI";
const CONFIG_FILE: &str = "filmwiki";

/// Settings layered as defaults < `filmwiki.toml` < `FILMWIKI_*` env.
/// Command-line flags are applied on top by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub top_n: usize,
    pub progress_every: u64,
    pub if_exists: IfExists,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_builder(
            Config::builder()
                .add_source(File::with_name(CONFIG_FILE).required(false))
                .add_source(Environment::with_prefix(ENV_PREFIX)),
        )
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let settings = builder_with_defaults(builder)?
            .build()
            .context("failed to read settings")?
            .try_deserialize::<Settings>()
            .context("invalid settings")?;
        Ok(settings)
    }
}

fn builder_with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
    Ok(builder
        .set_default("db_path", "data/films.sqlite")?
        .set_default("top_n", DEFAULT_TOP_N as i64)?
        .set_default("progress_every", 10_000i64)?
        .set_default("if_exists", "replace")?)
}
