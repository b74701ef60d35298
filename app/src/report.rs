use std::path::{Path, PathBuf};

use common::{
    config::{Config, Settings},
    plot::{Gnuplot, Plot, PlotReport, Renderer, ScriptOnly},
    result::load_results,
    util::ResultLayout,
};
use eyre::{Context, Result};
use io_multi::IoMulti;
use io_time::{IoStat, IoTrace};
use tokio::fs::{create_dir_all, read_to_string, remove_dir_all};
use tracing::{debug, error};

pub fn default_plots() -> Vec<Box<dyn Plot>> {
    vec![
        Box::new(IoMulti::default()),
        Box::new(IoStat),
        Box::new(IoTrace),
    ]
}

/// Reads `config.yaml` of a results folder, or falls back to the defaults
pub async fn read_config(folder: &Path) -> Result<Config> {
    let file = folder.join("config.yaml");
    if !file.is_file() {
        debug!("No config in {folder:?}, using defaults");
        return Ok(Config {
            name: folder
                .file_name()
                .map(|x| x.to_string_lossy().into_owned())
                .unwrap_or_default(),
            settings: Settings::default(),
            plots: None,
        });
    }
    let config = serde_yml::from_str(&read_to_string(&file).await?)
        .context(format!("Parse {file:?}"))?;
    Ok(config)
}

async fn run_plots(
    folder: &Path,
    config: &Config,
    settings: &Settings,
    renderer: &dyn Renderer,
) -> Result<PlotReport> {
    let layout = ResultLayout::for_folder(folder);
    _ = remove_dir_all(&layout.shared).await;
    create_dir_all(&layout.shared).await?;

    let store = load_results(folder)
        .await
        .context(format!("Load results from {folder:?}"))?;
    debug!("Loaded {} results for {}", store.len(), config.name);

    let plots = config.plots.clone().unwrap_or_else(default_plots);
    let mut report = PlotReport::default();
    for plot in &plots {
        let partial = plot
            .plot(&store, &layout, settings, renderer)
            .await
            .context(format!("Plot {}", plot.name()))?;
        debug!(
            "{} produced {} charts, skipped {}",
            plot.name(),
            partial.specs.len(),
            partial.skipped.len()
        );
        report.merge(partial);
    }
    Ok(report)
}

pub async fn plot(folder: &str, skip_render: bool) -> Result<()> {
    let folder = PathBuf::from(folder);
    let config = read_config(&folder).await?;
    let settings = config.settings.clone();
    let report = if skip_render {
        let renderer = ScriptOnly {
            terminal: settings.terminal.clone(),
        };
        run_plots(&folder, &config, &settings, &renderer).await?
    } else {
        run_plots(&folder, &config, &settings, &Gnuplot::from_settings(&settings)).await?
    };

    for skipped in &report.skipped {
        error!("{}: {}", skipped.artifact, skipped.error);
    }
    println!(
        "{}: {} charts, {} skipped",
        config.name,
        report.specs.len(),
        report.skipped.len()
    );
    Ok(())
}

pub async fn print_specs(folder: &str) -> Result<()> {
    let folder = PathBuf::from(folder);
    let config = read_config(&folder).await?;
    let settings = Settings {
        render: false,
        ..config.settings.clone()
    };
    let renderer = ScriptOnly {
        terminal: settings.terminal.clone(),
    };
    let report = run_plots(&folder, &config, &settings, &renderer).await?;
    println!("{}", serde_json::to_string_pretty(&report.specs)?);
    Ok(())
}
