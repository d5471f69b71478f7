use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use viewconfig::ViewConfig;

use crate::bindings::{apply_overrides, viewer_config};
use crate::cli::{ConfigAction, RunArgs};
use crate::paths::AppPaths;

pub fn run(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let viewer = viewer_config(&config)?;
    tracing::info!(
        format = ?config.source.format,
        source = ?config.source.kind,
        width = config.source.width,
        height = config.source.height,
        "starting relayview"
    );
    renderer::run_viewer(viewer)
}

pub fn handle_config_command(args: &RunArgs, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Check { file } => {
            ViewConfig::load(&file)
                .with_context(|| format!("configuration {} is invalid", file.display()))?;
            println!("ok");
        }
        ConfigAction::Print => {
            let config = resolve_config(args)?;
            print!("{}", config.to_toml_string()?);
        }
    }
    Ok(())
}

/// Loads `--config` (or the default file when present) and applies overrides.
pub fn resolve_config(args: &RunArgs) -> Result<ViewConfig> {
    let mut config = match &args.config {
        Some(path) => ViewConfig::load(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => {
            let paths = AppPaths::discover()?;
            let default = paths.config_file();
            if default.is_file() {
                tracing::debug!(path = %default.display(), "loading default configuration");
                ViewConfig::load(&default).with_context(|| {
                    format!("failed to load configuration {}", default.display())
                })?
            } else {
                tracing::debug!(
                    dir = %paths.config_dir().display(),
                    "no configuration file found; using defaults"
                );
                ViewConfig::default()
            }
        }
    };

    apply_overrides(&mut config, args);
    config
        .validate()
        .context("configuration is invalid after applying command-line overrides")?;
    Ok(config)
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
