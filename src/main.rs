mod analysis;
mod audio;
mod cli;
mod config;
mod error;
mod export;
mod pipeline;
mod render;
#[cfg(feature = "gui")]
mod shell;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use cli::Cli;
use config::Config;
use pipeline::{run_pipeline, RunContext};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    if cli.gui || cli.inputs.is_empty() {
        #[cfg(feature = "gui")]
        return shell::run(RunContext::new(config));

        #[cfg(not(feature = "gui"))]
        {
            if cli.gui {
                anyhow::bail!(
                    "The dialog front end requires the 'gui' feature. \
                     Rebuild with: cargo build --features gui"
                );
            }
            anyhow::bail!("No input files given. Pass one or more audio files, e.g. `sonoscope song.mp3`");
        }
    }

    run_headless(&cli, config)
}

/// Load the config file (if any) and fold the command line on top of it.
fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = match config::find_config(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            Err(e) if cli.config.is_some() => return Err(e),
            Err(e) => {
                log::warn!("Ignoring config {}: {:#}", path.display(), e);
                Config::default()
            }
        },
        None => Config::default(),
    };

    // Command-line values win only when moved off their defaults
    if cli.width != 2500 { config.output.width = cli.width; }
    if cli.height != 1400 { config.output.height = cli.height; }
    if cli.sample_rate != 22050 { config.analysis.sample_rate = cli.sample_rate; }
    if cli.no_text { config.output.text = false; }
    if cli.output_dir.is_some() {
        config.output.dir = cli.output_dir.clone();
    }
    for kind in &cli.disable {
        if !config.disabled.contains(kind) {
            config.disabled.push(*kind);
        }
    }

    config
        .analysis
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid analysis settings")?;
    Ok(config)
}

fn run_headless(cli: &Cli, config: Config) -> Result<()> {
    log::info!("sonoscope - audio feature analyzer");
    log::info!(
        "Figure: {}x{}, analysis rate: {}",
        config.output.width,
        config.output.height,
        match config.analysis.sample_rate {
            0 => "native".to_string(),
            sr => format!("{sr} Hz"),
        }
    );
    if !config.disabled.is_empty() {
        log::info!("Disabled features: {:?}", config.disabled);
    }

    let pb = if cli.inputs.len() > 1 {
        let pb = ProgressBar::new(cli.inputs.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files {msg}")
            .map(|s| s.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        Some(pb)
    } else {
        None
    };

    let mut ctx = RunContext::new(config);
    let mut failed = 0usize;
    for input in &cli.inputs {
        if let Some(pb) = &pb {
            pb.set_message(input.display().to_string());
        }
        let line = match run_pipeline(&mut ctx, input) {
            Ok(report) => {
                log::debug!("{}x{} figure, panels {:?}", report.width, report.height, report.order);
                for (kind, reason) in &report.unavailable {
                    log::info!("{} drawn as placeholder: {}", kind.title(), reason);
                }
                Ok(format!(
                    "Analysis complete. The plot has been saved as '{}'.",
                    report.output.display()
                ))
            }
            Err(e) => {
                failed += 1;
                Err(format!("Error: {}: {}", input.display(), e))
            }
        };
        match (&pb, line) {
            (Some(pb), Ok(line) | Err(line)) => {
                pb.println(line);
                pb.inc(1);
            }
            (None, Ok(line)) => println!("{line}"),
            (None, Err(line)) => eprintln!("{line}"),
        }
    }
    if let Some(pb) = pb {
        pb.finish_with_message("done");
    }

    if failed > 0 {
        anyhow::bail!("{} of {} input(s) failed", failed, cli.inputs.len());
    }
    Ok(())
}
