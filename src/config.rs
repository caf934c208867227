use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CatalogError, CatalogResult};
use crate::generation::{
    ApiKey, DEFAULT_ENDPOINT, DEFAULT_MODEL, GenerationSettings, RetryConfig,
};
use crate::language::{Language, dedup_languages};
use crate::pipeline::{DEFAULT_INTER_CALL_DELAY, PipelineOptions};
use crate::table::ColumnMapping;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const DEFAULT_OUTPUT: &str = "catalog_results_multilang.xlsx";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_RATE_LIMIT_STEP_SECS: u64 = 10;
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub images_dir: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub languages: Vec<Language>,
    pub columns: ColumnMapping,
    pub generation: GenerationSettings,
    pub inter_call_delay: Duration,
    pub metrics_file: Option<PathBuf>,
}

impl RunConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            images_dir: cli_images_dir,
            input: cli_input,
            output: cli_output,
            languages: cli_languages,
            model: cli_model,
            endpoint: cli_endpoint,
            request_timeout_secs: cli_request_timeout_secs,
            inter_call_delay_ms: cli_inter_call_delay_ms,
            rate_limit_step_secs: cli_rate_limit_step_secs,
            metrics_file: cli_metrics_file,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            images_dir: file_images_dir,
            input: file_input,
            output: file_output,
            languages: file_languages,
            model: file_model,
            endpoint: file_endpoint,
            request_timeout_secs: file_request_timeout_secs,
            inter_call_delay_ms: file_inter_call_delay_ms,
            rate_limit_step_secs: file_rate_limit_step_secs,
            metrics_file: file_metrics_file,
            columns: file_columns,
        } = file_config;

        let images_dir = cli_images_dir
            .or(file_images_dir)
            .context("an image directory is required (--images-dir or CATALOG_IMAGES_DIR)")?;
        let input = cli_input
            .or(file_input)
            .context("an input workbook is required (--input or CATALOG_INPUT)")?;
        let output = cli_output
            .or(file_output)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

        let languages = match cli_languages.or(file_languages) {
            Some(names) => parse_languages(&names)?,
            None => vec![Language::Deutsch],
        };

        let model = cli_model
            .or(file_model)
            .map(|model| model.trim().to_string())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        anyhow::ensure!(!model.is_empty(), "model identifier must not be empty");

        let endpoint = cli_endpoint
            .or(file_endpoint)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let request_timeout_secs = cli_request_timeout_secs
            .or(file_request_timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
            .max(1);

        let inter_call_delay = cli_inter_call_delay_ms
            .or(file_inter_call_delay_ms)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_INTER_CALL_DELAY);

        let rate_limit_step = Duration::from_secs(
            cli_rate_limit_step_secs
                .or(file_rate_limit_step_secs)
                .unwrap_or(DEFAULT_RATE_LIMIT_STEP_SECS),
        );

        Ok(Self {
            images_dir,
            input,
            output,
            languages,
            columns: file_columns.unwrap_or_default(),
            generation: GenerationSettings {
                endpoint,
                model,
                request_timeout: Duration::from_secs(request_timeout_secs),
                retry: RetryConfig {
                    max_attempts: MAX_ATTEMPTS,
                    step: rate_limit_step,
                },
            },
            inter_call_delay,
            metrics_file: cli_metrics_file.or(file_metrics_file),
        })
    }

    /// Checks the paths before a run starts.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.images_dir.is_dir(),
            "image directory {:?} is not a directory",
            self.images_dir
        );
        anyhow::ensure!(
            self.input.is_file(),
            "input workbook {:?} is not a file",
            self.input
        );
        Ok(())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            languages: self.languages.clone(),
            columns: self.columns.clone(),
            inter_call_delay: self.inter_call_delay,
        }
    }
}

/// Parses language names or codes, dropping repeats.
pub fn parse_languages(names: &[String]) -> Result<Vec<Language>> {
    let languages = names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(Language::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    let languages = dedup_languages(languages);
    anyhow::ensure!(!languages.is_empty(), "at least one language is required");
    Ok(languages)
}

/// Reads the service credential from the environment.
pub fn api_key_from_env() -> CatalogResult<ApiKey> {
    std::env::var(API_KEY_VAR)
        .ok()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .map(ApiKey::new)
        .ok_or_else(|| CatalogError::MissingCredential {
            variable: API_KEY_VAR.to_string(),
        })
}

/// Loads `.env` if present, then reads the credential.
pub fn load_api_key() -> CatalogResult<ApiKey> {
    dotenvy::dotenv().ok();
    api_key_from_env()
}

#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "museum-catalog",
    about = "Generate multilingual museum catalog entries from a spreadsheet and photos",
    version
)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "CATALOG_IMAGES_DIR",
        value_name = "DIR",
        help = "Root directory holding the object photos"
    )]
    pub images_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "CATALOG_INPUT",
        value_name = "FILE",
        help = "Input workbook with one row per image set"
    )]
    pub input: Option<PathBuf>,

    #[arg(
        long,
        env = "CATALOG_OUTPUT",
        value_name = "FILE",
        help = "Output workbook path"
    )]
    pub output: Option<PathBuf>,

    #[arg(
        long,
        env = "CATALOG_LANGUAGES",
        value_name = "LANG",
        value_delimiter = ',',
        help = "Comma-separated output languages (names or codes, e.g. Deutsch,EN)"
    )]
    pub languages: Option<Vec<String>>,

    #[arg(
        long,
        env = "CATALOG_MODEL",
        value_name = "MODEL",
        help = "Model identifier sent to the generation service"
    )]
    pub model: Option<String>,

    #[arg(
        long,
        env = "CATALOG_ENDPOINT",
        value_name = "URL",
        help = "Chat completions endpoint"
    )]
    pub endpoint: Option<String>,

    #[arg(
        long,
        env = "CATALOG_REQUEST_TIMEOUT_SECS",
        value_name = "SECS",
        value_parser = clap::value_parser!(u64)
    )]
    pub request_timeout_secs: Option<u64>,

    #[arg(
        long,
        env = "CATALOG_INTER_CALL_DELAY_MS",
        value_name = "MS",
        help = "Pause after every generation call",
        value_parser = clap::value_parser!(u64)
    )]
    pub inter_call_delay_ms: Option<u64>,

    #[arg(
        long,
        env = "CATALOG_RATE_LIMIT_STEP_SECS",
        value_name = "SECS",
        help = "Rate-limit backoff step; attempt n waits n times this",
        value_parser = clap::value_parser!(u64)
    )]
    pub rate_limit_step_secs: Option<u64>,

    #[arg(
        long,
        env = "CATALOG_METRICS_FILE",
        value_name = "FILE",
        help = "Write Prometheus metrics here after the run"
    )]
    pub metrics_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialConfig {
    images_dir: Option<PathBuf>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    languages: Option<Vec<String>>,
    model: Option<String>,
    endpoint: Option<String>,
    request_timeout_secs: Option<u64>,
    inter_call_delay_ms: Option<u64>,
    rate_limit_step_secs: Option<u64>,
    metrics_file: Option<PathBuf>,
    columns: Option<ColumnMapping>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}
