//! # demand-pipeline
//!
//! Command-line front end for training and inspecting the demand pipeline.

use clap::{Parser, Subcommand};
use demand_forecast::data::DataLoader;
use demand_forecast::logging::{init_logging, LogFormat};
use demand_forecast::synthetic::{generate_dataset, SyntheticConfig};
use demand_forecast::{CensoredDemandImputer, DemandPipeline, PipelineConfig};
use polars::prelude::{CsvWriter, SerWriter};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

type CliResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "demand-pipeline")]
#[command(about = "Censored-demand imputation and multi-horizon demand forecasting", long_about = None)]
struct Cli {
    /// Pipeline configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log format override (human, json)
    #[arg(long, global = true, env = "DEMAND_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train on a CSV sales table and print the evaluation metrics
    Train {
        /// Sales fact table with a header row
        #[arg(short, long)]
        data: PathBuf,

        /// Directory for exported model artifacts (JSON)
        #[arg(short, long)]
        artifacts: Option<PathBuf>,
    },

    /// Write adjusted demand for a CSV sales table
    Impute {
        #[arg(short, long)]
        data: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Train on synthetic data and print metrics and a sample forecast
    Demo {
        #[arg(long, default_value = "2")]
        stores: usize,

        #[arg(long, default_value = "3")]
        skus: usize,

        #[arg(long, default_value = "180")]
        days: usize,

        #[arg(long, default_value = "7")]
        seed: u64,
    },
}

fn load_config(path: Option<&Path>, log_format: Option<LogFormat>) -> CliResult<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(format) = log_format {
        config.log.format = format;
    }
    Ok(config)
}

fn export_artifacts(pipeline: &DemandPipeline, dir: &Path) -> CliResult<()> {
    let Some(generation) = pipeline.generation() else {
        return Ok(());
    };
    fs::create_dir_all(dir)?;
    for &horizon in generation.forecaster().horizons() {
        if let Some(artifact) = generation.forecaster().artifact(horizon) {
            let path = dir.join(format!("forecast_h{}.json", horizon.days()));
            fs::write(&path, artifact.to_json()?)?;
            tracing::info!(path = %path.display(), "Exported forecast artifact");
        }
    }
    if let Some(artifact) = generation.lead_time().artifact() {
        fs::write(dir.join("lead_time.json"), artifact.to_json()?)?;
    }
    Ok(())
}

async fn run_demo(config: PipelineConfig, synthetic: SyntheticConfig) -> CliResult<()> {
    let dataset = generate_dataset(&synthetic)?;
    println!(
        "Generated {} rows ({} stores x {} SKUs x {} days)",
        dataset.len(),
        synthetic.stores,
        synthetic.skus,
        synthetic.days
    );

    let pipeline = Arc::new(DemandPipeline::new(config)?);
    let job = pipeline.spawn_training(dataset.clone());
    println!("Training started (status: {:?})", pipeline.status());
    let metrics = job.wait().await?;
    println!("{}", serde_json::to_string_pretty(&metrics)?);

    let Some(generation) = pipeline.generation() else {
        return Ok(());
    };
    let table = generation.forecaster().engineer().build(&dataset)?;
    let Some(row) = table.latest_row("S1", "P1") else {
        return Ok(());
    };

    for &horizon in pipeline.config().horizons.iter() {
        let Some(artifact) = generation.forecaster().artifact(horizon) else {
            continue;
        };
        let context = table.context(row, artifact.feature_names());
        let forecast = pipeline.forecast_with_timeout(context, horizon).await?;
        println!(
            "S1/P1 {} forecast from {}: {:.1} units",
            horizon,
            table.rows()[row].date,
            forecast.value
        );
        if let Some(explanation) = &forecast.explanation {
            for attribution in explanation.attributions.iter().take(3) {
                println!("    {:<18} {:+.3}", attribution.feature, attribution.value);
            }
        }
    }

    let lead_context = dataset.rows()[0].context(&demand_forecast::lead_time::LEAD_TIME_FEATURES);
    let lead = pipeline.lead_time_with_timeout(lead_context).await?;
    println!("S1/P1 supplier lead time: {:.1} days", lead.value);
    Ok(())
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.log_format)?;
    init_logging(&config.log);

    match cli.command {
        Commands::Train { data, artifacts } => {
            let dataset = DataLoader::from_csv(&data)?;
            let pipeline = Arc::new(DemandPipeline::new(config)?);
            let metrics = pipeline.spawn_training(dataset).wait().await?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
            if let Some(dir) = artifacts {
                export_artifacts(&pipeline, &dir)?;
            }
        }
        Commands::Impute { data, output } => {
            let mut dataset = DataLoader::from_csv(&data)?;
            let mut imputer = CensoredDemandImputer::new(config.imputer.clone())?;
            let summary = imputer.train_and_impute(&mut dataset)?;
            let mut df = dataset.to_dataframe()?;
            let mut file = File::create(&output)?;
            CsvWriter::new(&mut file).has_header(true).finish(&mut df)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Demo {
            stores,
            skus,
            days,
            seed,
        } => {
            let synthetic = SyntheticConfig {
                stores,
                skus,
                days,
                seed,
                ..SyntheticConfig::default()
            };
            run_demo(config, synthetic).await?;
        }
    }

    Ok(())
}
