//! Electricity forecasting pipeline.
//!
//! `run` prepares data, trains and deploys; `prepare` only builds and uploads
//! the record files; `predict` queries a deployed endpoint for one series.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use forecast_pipeline::common::config::PipelineConfig;
use forecast_pipeline::common::http::PlatformClient;
use forecast_pipeline::common::log::{self, LogFormat};
use forecast_pipeline::data::{self, writer, TimeSeries};
use forecast_pipeline::inference::{PredictOptions, Predictor};
use forecast_pipeline::pipeline::{self, Platforms};
use forecast_pipeline::store::FsObjectStore;
use forecast_pipeline::PipelineError;

#[derive(Parser, Debug)]
#[command(name = "forecast-pipeline")]
#[command(about = "Prepare data, train and deploy a forecasting model")]
struct Cli {
    /// YAML configuration file
    #[arg(long, short, env = "FORECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Log output layout
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prepare data, train and deploy
    Run,
    /// Build and upload the training/test record files only
    Prepare,
    /// Forecast one series with a deployed endpoint
    Predict(PredictArgs),
}

#[derive(clap::Args, Debug)]
struct PredictArgs {
    /// JSON-lines record file holding the input series
    #[arg(long)]
    records: PathBuf,

    /// Zero-based line of the record to forecast from
    #[arg(long, default_value_t = 0)]
    record: usize,

    /// Endpoint to query; defaults to the configured endpoint
    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long, default_value_t = 100)]
    num_samples: u32,

    /// Also return sample paths
    #[arg(long)]
    return_samples: bool,

    #[arg(long, value_delimiter = ',', default_values_t = [0.1, 0.5, 0.9])]
    quantiles: Vec<f64>,

    #[arg(long)]
    cat: Option<i64>,

    /// Write the forecast CSV here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let loaded = PipelineConfig::load(cli.config.as_deref());
    let level = loaded
        .as_ref()
        .map(|cfg| cfg.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    log::init(&level, cli.log_format);

    let result = loaded
        .context("loading configuration")
        .and_then(|cfg| dispatch(cli.command, &cfg));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("forecast-pipeline failed: {err:#}");
            let code = err
                .downcast_ref::<PipelineError>()
                .map_or(1, |e| e.code() as u8);
            ExitCode::from(code)
        }
    }
}

fn dispatch(command: Command, cfg: &PipelineConfig) -> Result<()> {
    let store = FsObjectStore::new(&cfg.store_root);
    let platform = PlatformClient::new(&cfg.platform);
    match command {
        Command::Run => {
            let run = pipeline::run(
                cfg,
                &Platforms {
                    store: &store,
                    training: &platform,
                    endpoints: &platform,
                },
            )?;
            info!(
                endpoint = %run.endpoint.name,
                model = %run.endpoint.model.model_data,
                "endpoint is serving the new model"
            );
        }
        Command::Prepare => {
            let prepared = data::prepare(&store, cfg)?;
            info!(train = %prepared.train_path, test = %prepared.test_path, "record files ready");
        }
        Command::Predict(args) => predict(args, cfg, &platform)?,
    }
    Ok(())
}

fn predict(args: PredictArgs, cfg: &PipelineConfig, platform: &PlatformClient) -> Result<()> {
    let bytes = std::fs::read(&args.records)
        .with_context(|| format!("reading {}", args.records.display()))?;
    let records = writer::decode_json_lines(&bytes)?;
    let Some(record) = records.into_iter().nth(args.record) else {
        bail!("{} has no record {}", args.records.display(), args.record);
    };
    let series = TimeSeries::new(
        format!("record-{}", args.record),
        record.start,
        cfg.dataset.freq.clone(),
        record.target,
    );

    let endpoint = args.endpoint.unwrap_or_else(|| cfg.endpoint.name.clone());
    let options = PredictOptions {
        cat: args.cat.or(record.cat),
        dynamic_feat: record.dynamic_feat,
        num_samples: args.num_samples,
        return_samples: args.return_samples,
        quantiles: args.quantiles,
    };
    let table = Predictor::new(platform, endpoint).predict(&series, &options)?;

    match args.output {
        Some(path) => {
            let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            table.write_csv(BufWriter::new(file))?;
        }
        None => table.write_csv(io::stdout().lock())?,
    }
    Ok(())
}
