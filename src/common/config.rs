//! Runtime configuration loaded from an optional YAML file and the environment.
//!
//! The resulting [`PipelineConfig`] is passed explicitly into every
//! component; nothing reads configuration from module-level state.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::common::error::{PipelineError, PipelineResult};
use crate::common::time::{self, Frequency};
use crate::store::StorePath;

const ENV_STORE_ROOT: &str = "FORECAST_STORE_ROOT";
const ENV_BUCKET: &str = "FORECAST_BUCKET";
const ENV_PREFIX: &str = "FORECAST_PREFIX";
const ENV_ENDPOINT_NAME: &str = "FORECAST_ENDPOINT_NAME";
const ENV_PLATFORM_URL: &str = "FORECAST_PLATFORM_URL";
const ENV_ROLE: &str = "FORECAST_ROLE";
const ENV_LOG_LEVEL: &str = "FORECAST_LOG_LEVEL";

/// Snapshot of configuration values consumed by the pipeline.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Local directory backing the filesystem object store.
    pub store_root: PathBuf,
    pub bucket: String,
    pub prefix: String,
    pub dataset: DatasetCfg,
    pub training: TrainingCfg,
    pub endpoint: EndpointCfg,
    pub platform: PlatformCfg,
    pub log_level: String,
}

/// Data preparation settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DatasetCfg {
    pub freq: Frequency,
    #[serde(with = "time::timestamp")]
    pub start_dataset: NaiveDateTime,
    #[serde(with = "time::timestamp")]
    pub end_training: NaiveDateTime,
    pub prediction_length: usize,
    pub context_length: usize,
    pub num_test_windows: usize,
    /// Each resampled bucket sum is divided by this value.
    pub resample_divisor: f64,
    /// Key segment under `prefix` holding the raw CSV exports.
    pub raw_dir: String,
    pub csv_delimiter: char,
    pub decimal_mark: char,
    /// Upload even when the target object already exists.
    pub override_existing: bool,
    /// Keep a local copy of the written record files here.
    pub local_copy_dir: Option<PathBuf>,
}

/// Training job settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TrainingCfg {
    pub image: String,
    pub role: String,
    pub instance_count: u32,
    pub instance_type: String,
    pub base_job_name: String,
    pub epochs: u32,
    pub early_stopping_patience: u32,
    pub mini_batch_size: u32,
    pub learning_rate: f64,
    pub poll_interval_secs: u64,
}

/// Inference endpoint settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EndpointCfg {
    pub name: String,
    pub instance_count: u32,
    pub instance_type: String,
    pub wait: bool,
}

/// Platform control-plane connection settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PlatformCfg {
    pub base_url: String,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from("./store"),
            bucket: String::new(),
            prefix: String::new(),
            dataset: DatasetCfg::default(),
            training: TrainingCfg::default(),
            endpoint: EndpointCfg::default(),
            platform: PlatformCfg::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for DatasetCfg {
    fn default() -> Self {
        let midnight = |y, m, d| {
            chrono::NaiveDate::from_ymd_opt(y, m, d)
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .unwrap_or_default()
        };
        Self {
            freq: time::TWO_HOURS,
            start_dataset: midnight(2014, 1, 1),
            end_training: midnight(2014, 9, 1),
            prediction_length: 7 * 12,
            context_length: 7 * 12,
            num_test_windows: 4,
            resample_divisor: 8.0,
            raw_dir: "raw".to_string(),
            csv_delimiter: ';',
            decimal_mark: ',',
            override_existing: true,
            local_copy_dir: None,
        }
    }
}

impl Default for TrainingCfg {
    fn default() -> Self {
        Self {
            image: "forecasting-deepar:latest".to_string(),
            role: String::new(),
            instance_count: 1,
            instance_type: "ml.c4.2xlarge".to_string(),
            base_job_name: "deepar-electricity-demo".to_string(),
            epochs: 40,
            early_stopping_patience: 40,
            mini_batch_size: 64,
            learning_rate: 5e-4,
            poll_interval_secs: 30,
        }
    }
}

impl Default for EndpointCfg {
    fn default() -> Self {
        Self {
            name: String::new(),
            instance_count: 1,
            instance_type: "ml.m4.xlarge".to_string(),
            wait: true,
        }
    }
}

impl Default for PlatformCfg {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 60,
            poll_interval_secs: 15,
        }
    }
}

impl PipelineConfig {
    /// Build a configuration from an optional YAML file plus `FORECAST_*`
    /// environment overrides, then validate it.
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        let mut cfg = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a YAML file; missing keys take their defaults.
    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            PipelineError::config(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> PipelineResult<Self> {
        serde_yaml::from_str(raw).map_err(|err| PipelineError::config(err.to_string()))
    }

    /// Override selected values from the process environment.
    pub fn apply_env(&mut self) {
        fn env_into(key: &str, slot: &mut String) {
            if let Ok(value) = env::var(key) {
                *slot = value;
            }
        }

        if let Ok(root) = env::var(ENV_STORE_ROOT) {
            self.store_root = PathBuf::from(root);
        }
        env_into(ENV_BUCKET, &mut self.bucket);
        env_into(ENV_PREFIX, &mut self.prefix);
        env_into(ENV_ENDPOINT_NAME, &mut self.endpoint.name);
        env_into(ENV_PLATFORM_URL, &mut self.platform.base_url);
        env_into(ENV_ROLE, &mut self.training.role);
        env_into(ENV_LOG_LEVEL, &mut self.log_level);
    }

    /// Reject configurations that would make downstream phases misbehave.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.bucket.is_empty() {
            return Err(PipelineError::config("bucket must be set"));
        }
        let ds = &self.dataset;
        if ds.start_dataset >= ds.end_training {
            return Err(PipelineError::config(
                "start_dataset must precede end_training",
            ));
        }
        if ds.prediction_length == 0 || ds.context_length == 0 {
            return Err(PipelineError::config(
                "prediction_length and context_length must be positive",
            ));
        }
        if ds.num_test_windows == 0 {
            return Err(PipelineError::config("num_test_windows must be positive"));
        }
        if !(ds.resample_divisor.is_finite() && ds.resample_divisor > 0.0) {
            return Err(PipelineError::config("resample_divisor must be positive"));
        }
        if !ds.csv_delimiter.is_ascii() {
            return Err(PipelineError::config("csv_delimiter must be ASCII"));
        }
        if self.training.instance_count == 0 || self.endpoint.instance_count == 0 {
            return Err(PipelineError::config("instance counts must be positive"));
        }
        Ok(())
    }

    fn prefixed(&self, suffix: &str) -> StorePath {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            StorePath::new(&self.bucket, suffix)
        } else {
            StorePath::new(&self.bucket, format!("{prefix}/{suffix}"))
        }
    }

    /// Key prefix holding the raw exports.
    pub fn raw_path(&self) -> StorePath {
        self.prefixed(&self.dataset.raw_dir)
    }

    /// Base path for the prepared record files.
    pub fn data_path(&self) -> StorePath {
        self.prefixed("data")
    }

    /// Base path for training job output.
    pub fn output_path(&self) -> StorePath {
        self.prefixed("output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        for key in [
            ENV_STORE_ROOT,
            ENV_BUCKET,
            ENV_PREFIX,
            ENV_ENDPOINT_NAME,
            ENV_PLATFORM_URL,
            ENV_ROLE,
            ENV_LOG_LEVEL,
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn defaults_mirror_the_electricity_job() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.dataset.freq.to_string(), "2H");
        assert_eq!(cfg.dataset.prediction_length, 84);
        assert_eq!(cfg.dataset.num_test_windows, 4);
        assert_eq!(cfg.training.instance_type, "ml.c4.2xlarge");
        assert_eq!(cfg.endpoint.instance_type, "ml.m4.xlarge");
    }

    #[test]
    fn empty_bucket_is_rejected() {
        let err = PipelineConfig::default().validate().unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn yaml_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "bucket: demo\nprefix: /electricity/\ndataset:\n  freq: 1H\n  end_training: \"2014-06-01 00:00:00\"\nendpoint:\n  name: deepar-electricity"
        )
        .unwrap();

        let cfg = PipelineConfig::from_file(file.path()).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.dataset.freq.to_string(), "1H");
        assert_eq!(cfg.dataset.prediction_length, 84);
        assert_eq!(cfg.endpoint.name, "deepar-electricity");
        assert_eq!(cfg.raw_path().to_string(), "store://demo/electricity/raw");
        assert_eq!(cfg.output_path().to_string(), "store://demo/electricity/output");
    }

    #[test]
    fn inverted_window_is_rejected() {
        let cfg = PipelineConfig::from_yaml(
            "bucket: demo\ndataset:\n  start_dataset: \"2014-09-01\"\n  end_training: \"2014-01-01\"",
        )
        .unwrap();
        assert!(matches!(cfg.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    #[serial]
    fn environment_overrides_file_values() {
        clear_env();
        env::set_var(ENV_BUCKET, "from-env");
        env::set_var(ENV_ENDPOINT_NAME, "ep-env");

        let cfg = PipelineConfig::load(None).unwrap();
        assert_eq!(cfg.bucket, "from-env");
        assert_eq!(cfg.endpoint.name, "ep-env");
        assert_eq!(cfg.data_path().to_string(), "store://from-env/data");

        clear_env();
    }
}
