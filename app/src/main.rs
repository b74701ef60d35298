use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::Result;
use tokio::fs::{create_dir_all, read_dir};
use tracing::error;
use tracing_subscriber::{
    EnvFilter,
    fmt::{layer, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

mod report;

/// Crates whose log level follows `RUST_LOG` unless overridden by `--log`
const MODULES: &[&str] = &["common", "io_multi", "io_time"];

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long)]
    log: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List result folders
    Ls,
    /// Write the result table and render every chart
    Plot {
        /// Results folder
        #[arg(short, long)]
        folder: String,
        /// Only write the gnuplot scripts
        #[arg(long, default_value_t = false)]
        skip_render: bool,
    },
    /// Print the chart specs as JSON without rendering
    Print {
        /// Results folder
        #[arg(short, long)]
        folder: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or("warn".to_owned());
    let args = Cli::parse();
    let file_appender = tracing_appender::rolling::never(".", "log.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let mut env_filter = EnvFilter::new(format!("io_report={log_level}"));

    if !args.log.is_empty() {
        for log in &args.log {
            env_filter = env_filter.add_directive(log.parse()?);
        }
    }

    for module in MODULES {
        if !args.log.iter().any(|x| x.starts_with(module)) {
            env_filter = env_filter.add_directive(format!("{module}={log_level}").parse()?);
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            layer()
                .with_timer(ChronoLocal::new("%v %k:%M:%S %z".to_owned()))
                .compact(),
        )
        .with(layer().with_writer(non_blocking))
        .init();

    match args.command {
        Commands::Ls => list_results().await?,
        Commands::Plot {
            folder,
            skip_render,
        } => {
            if let Err(err) = report::plot(&folder, skip_render).await {
                error!("{err:#?}");
                return Err(err);
            }
        }
        Commands::Print { folder } => report::print_specs(&folder).await?,
    };

    Ok(())
}

async fn list_results() -> Result<()> {
    create_dir_all("results").await?;
    for (name, folder) in get_results().await? {
        println!("{} -> {}", name, folder.display());
    }
    Ok(())
}

async fn get_results() -> Result<Vec<(String, PathBuf)>> {
    let mut items = read_dir("results").await?;
    let mut results = Vec::new();
    while let Some(entry) = items.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            let config = report::read_config(&entry.path()).await?;
            results.push((config.name, entry.path()));
        }
    }
    results.sort();
    Ok(results)
}
