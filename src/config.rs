//! Defines the configuration settings for the site-sleuth application.

use crate::error::{AppError, Result};
use crate::models::FilterMode;
use crate::report::ReportFormat;
use anyhow::Context;
use clap::Args;
use dialoguer::{Input, theme::ColorfulTheme};
use serde::Deserialize;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings shared by every subcommand. Each one overrides the config file.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct SettingsArgs {
    /// Path to configuration file (TOML format)
    #[arg(long, env = "SITE_SLEUTH_CONFIG")]
    pub config_file: Option<String>,

    /// Google Custom Search API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Google Custom Search engine identifier
    #[arg(long, env = "GOOGLE_SEARCH_ENGINE_ID")]
    pub search_engine_id: Option<String>,

    /// Filtering policy for records without contact details
    #[arg(long, value_enum, env = "SITE_SLEUTH_MODE")]
    pub mode: Option<FilterMode>,

    /// Number of sites fetched concurrently
    #[arg(short, long, env = "SITE_SLEUTH_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "SITE_SLEUTH_REQUEST_TIMEOUT")]
    pub request_timeout: Option<u64>,

    /// User agent string for HTTP requests
    #[arg(long, env = "SITE_SLEUTH_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Minimum sleep between search API calls (seconds)
    #[arg(long, env = "SITE_SLEUTH_MIN_SLEEP")]
    pub min_sleep: Option<f32>,

    /// Maximum sleep between search API calls (seconds)
    #[arg(long, env = "SITE_SLEUTH_MAX_SLEEP")]
    pub max_sleep: Option<f32>,

    /// Comma-separated list of additional domains to exclude
    #[arg(long, env = "SITE_SLEUTH_BLOCKED_DOMAINS")]
    pub blocked_domains: Option<String>,

    /// Disable translation of non-English names and addresses
    #[arg(long, default_value = "false", env = "SITE_SLEUTH_NO_TRANSLATE")]
    pub no_translate: bool,

    /// Directory where reports are written
    #[arg(long, env = "SITE_SLEUTH_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, env = "SITE_SLEUTH_FORMAT")]
    pub format: Option<ReportFormat>,
}

/// TOML Configuration file structure
#[derive(Deserialize, Debug, Default)]
struct ConfigFile {
    network: Option<NetworkConfig>,
    search: Option<SearchConfig>,
    extraction: Option<ExtractionConfig>,
    filtering: Option<FilteringConfig>,
    translation: Option<TranslationConfig>,
    output: Option<OutputConfig>,
    runtime: Option<RuntimeConfig>,
}

#[derive(Deserialize, Debug, Default)]
struct NetworkConfig {
    request_timeout: Option<u64>,
    min_sleep: Option<f32>,
    max_sleep: Option<f32>,
    user_agent: Option<String>,
    max_page_bytes: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
struct SearchConfig {
    api_key: Option<String>,
    search_engine_id: Option<String>,
    endpoint: Option<String>,
    page_size: Option<u32>,
    max_pages: Option<u32>,
}

#[derive(Deserialize, Debug, Default)]
struct ExtractionConfig {
    max_name_length: Option<usize>,
    max_address_length: Option<usize>,
    snippet_backfill: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
struct FilteringConfig {
    mode: Option<FilterMode>,
    extra_blocked_domains: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
struct TranslationConfig {
    enabled: Option<bool>,
    endpoint: Option<String>,
    target_language: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct OutputConfig {
    directory: Option<PathBuf>,
    format: Option<ReportFormat>,
}

#[derive(Deserialize, Debug, Default)]
struct RuntimeConfig {
    concurrency: Option<usize>,
}

/// Application configuration settings.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    /// Search API key. Resolved interactively when absent.
    pub api_key: Option<String>,
    /// Search engine identifier. Resolved interactively when absent.
    pub search_engine_id: Option<String>,
    /// Base URL of the search API.
    pub search_endpoint: String,
    /// Results requested per search API call (the API caps this at 10).
    pub search_page_size: u32,
    /// Maximum number of search API calls per run.
    pub max_search_pages: u32,
    /// Timeout for individual HTTP requests.
    pub request_timeout: Duration,
    /// User agent string to use for HTTP requests.
    pub user_agent: String,
    /// Minimum and maximum sleep duration between search API calls (seconds).
    pub sleep_between_requests: (f32, f32),
    /// Page bodies beyond this many bytes are truncated.
    pub max_page_bytes: usize,
    /// Company names are cut to this many characters.
    pub max_name_length: usize,
    /// Addresses are cut to this many characters.
    pub max_address_length: usize,
    /// Fill missing fields from the search result title and snippet.
    pub snippet_backfill: bool,
    /// Classification policy.
    pub mode: FilterMode,
    /// Domains excluded in addition to the built-in blocklist.
    pub extra_blocked_domains: Vec<String>,
    /// Whether non-English names and addresses are translated.
    pub translation_enabled: bool,
    /// Base URL of the translation backend.
    pub translation_endpoint: String,
    /// Language code translations target.
    pub target_language: String,
    /// Directory where reports are written.
    pub output_dir: PathBuf,
    /// Report format.
    pub report_format: ReportFormat,
    /// Maximum number of sites fetched concurrently.
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: None,
            search_engine_id: None,
            search_endpoint: "https://www.googleapis.com/customsearch/v1".to_string(),
            search_page_size: 10,
            max_search_pages: 10,
            request_timeout: Duration::from_secs(10),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36".to_string(),
            sleep_between_requests: (0.3, 0.7),
            max_page_bytes: 2 * 1024 * 1024,
            max_name_length: 120,
            max_address_length: 200,
            snippet_backfill: true,
            mode: FilterMode::Strict,
            extra_blocked_domains: Vec::new(),
            translation_enabled: true,
            translation_endpoint: "https://translate.googleapis.com/translate_a/single".to_string(),
            target_language: "en".to_string(),
            output_dir: PathBuf::from("."),
            report_format: ReportFormat::Html,
            concurrency: 4,
        }
    }
}

/// Search API credentials. Both are required before any pipeline work begins.
#[derive(Debug, Clone)]
pub(crate) struct Credentials {
    pub api_key: String,
    pub search_engine_id: String,
}

/// Load configuration from a TOML file
fn load_config_file(file_path: &str) -> anyhow::Result<ConfigFile> {
    let path = Path::new(file_path);
    if !path.exists() {
        tracing::warn!("Configuration file {} not found, using defaults", file_path);
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", file_path))?;

    let config: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML configuration from {}", file_path))?;

    tracing::info!("Loaded configuration from {}", file_path);
    Ok(config)
}

fn apply_file_config(config: &mut Config, file_config: &ConfigFile) {
    if let Some(network) = &file_config.network {
        if let Some(timeout) = network.request_timeout {
            config.request_timeout = Duration::from_secs(timeout);
        }
        if let Some(min_sleep) = network.min_sleep {
            config.sleep_between_requests.0 = min_sleep;
        }
        if let Some(max_sleep) = network.max_sleep {
            config.sleep_between_requests.1 = max_sleep;
        }
        if let Some(user_agent) = &network.user_agent {
            config.user_agent = user_agent.clone();
        }
        if let Some(max_bytes) = network.max_page_bytes {
            config.max_page_bytes = max_bytes;
        }
    }

    if let Some(search) = &file_config.search {
        if let Some(key) = &search.api_key {
            config.api_key = Some(key.clone());
        }
        if let Some(cx) = &search.search_engine_id {
            config.search_engine_id = Some(cx.clone());
        }
        if let Some(endpoint) = &search.endpoint {
            config.search_endpoint = endpoint.clone();
        }
        if let Some(page_size) = search.page_size {
            config.search_page_size = page_size;
        }
        if let Some(max_pages) = search.max_pages {
            config.max_search_pages = max_pages;
        }
    }

    if let Some(extraction) = &file_config.extraction {
        if let Some(len) = extraction.max_name_length {
            config.max_name_length = len;
        }
        if let Some(len) = extraction.max_address_length {
            config.max_address_length = len;
        }
        if let Some(backfill) = extraction.snippet_backfill {
            config.snippet_backfill = backfill;
        }
    }

    if let Some(filtering) = &file_config.filtering {
        if let Some(mode) = filtering.mode {
            config.mode = mode;
        }
        if let Some(domains) = &filtering.extra_blocked_domains {
            config.extra_blocked_domains = domains.clone();
        }
    }

    if let Some(translation) = &file_config.translation {
        if let Some(enabled) = translation.enabled {
            config.translation_enabled = enabled;
        }
        if let Some(endpoint) = &translation.endpoint {
            config.translation_endpoint = endpoint.clone();
        }
        if let Some(lang) = &translation.target_language {
            config.target_language = lang.clone();
        }
    }

    if let Some(output) = &file_config.output {
        if let Some(dir) = &output.directory {
            config.output_dir = dir.clone();
        }
        if let Some(format) = output.format {
            config.report_format = format;
        }
    }

    if let Some(runtime) = &file_config.runtime {
        if let Some(concurrency) = runtime.concurrency {
            config.concurrency = concurrency;
        }
    }
}

/// Apply command line arguments to the Config instance
fn apply_cli_args(config: &mut Config, args: &SettingsArgs) {
    if let Some(ref key) = args.api_key {
        config.api_key = Some(key.clone());
    }

    if let Some(ref cx) = args.search_engine_id {
        config.search_engine_id = Some(cx.clone());
    }

    if let Some(mode) = args.mode {
        config.mode = mode;
    }

    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }

    if let Some(timeout) = args.request_timeout {
        config.request_timeout = Duration::from_secs(timeout);
    }

    if let Some(ref agent) = args.user_agent {
        config.user_agent = agent.clone();
    }

    if let Some(min_sleep) = args.min_sleep {
        config.sleep_between_requests.0 = min_sleep;
    }

    if let Some(max_sleep) = args.max_sleep {
        config.sleep_between_requests.1 = max_sleep;
    }

    if let Some(ref domains) = args.blocked_domains {
        config.extra_blocked_domains.extend(
            domains
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty()),
        );
    }

    if args.no_translate {
        config.translation_enabled = false;
    }

    if let Some(ref dir) = args.output_dir {
        config.output_dir = dir.clone();
    }

    if let Some(format) = args.format {
        config.report_format = format;
    }
}

fn validate_config(config: &mut Config) -> anyhow::Result<()> {
    let (min, max) = config.sleep_between_requests;
    if !min.is_finite() || !max.is_finite() || min < 0.0 || max < 0.0 {
        anyhow::bail!(
            "Sleep bounds must be finite and non-negative (got min {}, max {})",
            min,
            max
        );
    }

    if config.sleep_between_requests.0 > config.sleep_between_requests.1 {
        config.sleep_between_requests.1 = config.sleep_between_requests.0;
        tracing::warn!(
            "Min sleep was greater than max sleep. Setting both to {}",
            config.sleep_between_requests.0
        );
    }

    if config.search_page_size == 0 || config.search_page_size > 10 {
        let clamped = config.search_page_size.clamp(1, 10);
        tracing::warn!(
            "Search page size {} is outside 1..=10. Setting to {}.",
            config.search_page_size,
            clamped
        );
        config.search_page_size = clamped;
    }

    if config.max_search_pages == 0 {
        config.max_search_pages = 1;
        tracing::warn!("Max search pages was set to 0. Setting to 1.");
    }

    if config.concurrency == 0 {
        config.concurrency = 1;
        tracing::warn!("Concurrency was set to 0. Setting to 1.");
    }

    if config.max_page_bytes == 0 {
        anyhow::bail!("network.max_page_bytes must be greater than 0");
    }

    config.extra_blocked_domains = config
        .extra_blocked_domains
        .iter()
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .collect();

    Ok(())
}

pub(crate) fn build_config(args: &SettingsArgs) -> anyhow::Result<Config> {
    let mut config = Config::default();

    if let Some(ref file_path) = args.config_file {
        let file_config = load_config_file(file_path)?;
        apply_file_config(&mut config, &file_config);
    } else {
        for path in ["./site-sleuth.toml", "./config.toml"].iter() {
            if Path::new(path).exists() {
                match load_config_file(path) {
                    Ok(file_config) => {
                        apply_file_config(&mut config, &file_config);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load configuration from {}: {}", path, e);
                    }
                }
            }
        }
    }

    apply_cli_args(&mut config, args);

    validate_config(&mut config)?;

    tracing::debug!(
        "Final configuration: mode={}, concurrency={}, timeout={:?}, translation={}",
        config.mode,
        config.concurrency,
        config.request_timeout,
        config.translation_enabled
    );

    Ok(config)
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolves search credentials from configuration, prompting on a terminal when absent.
pub(crate) fn resolve_credentials(config: &Config, interactive: bool) -> Result<Credentials> {
    let mut api_key = non_empty(config.api_key.as_ref());
    let mut search_engine_id = non_empty(config.search_engine_id.as_ref());

    let can_prompt = interactive && std::io::stdin().is_terminal();

    if api_key.is_none() && can_prompt {
        let value: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Enter your Google Custom Search API Key")
            .allow_empty(true)
            .interact_text()?;
        api_key = non_empty(Some(&value));
    }

    if search_engine_id.is_none() && can_prompt {
        let value: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Enter your Google Custom Search Engine ID")
            .allow_empty(true)
            .interact_text()?;
        search_engine_id = non_empty(Some(&value));
    }

    match (api_key, search_engine_id) {
        (Some(api_key), Some(search_engine_id)) => Ok(Credentials {
            api_key,
            search_engine_id,
        }),
        (None, _) => Err(AppError::ConfigurationMissing(
            "search API key (set GOOGLE_API_KEY or --api-key)".to_string(),
        )),
        (_, None) => Err(AppError::ConfigurationMissing(
            "search engine ID (set GOOGLE_SEARCH_ENGINE_ID or --search-engine-id)".to_string(),
        )),
    }
}

pub(crate) fn get_random_sleep_duration(config: &Config) -> Duration {
    use rand::Rng;
    let (min, max) = config.sleep_between_requests;
    if min >= max {
        return Duration::from_secs_f32(min.max(0.0));
    }
    let duration_secs = rand::thread_rng().gen_range(min..max);
    Duration::from_secs_f32(duration_secs.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_config_overrides_defaults() {
        let toml_str = r#"
            [network]
            request_timeout = 3
            user_agent = "test-agent"

            [search]
            api_key = "key-from-file"
            page_size = 5

            [filtering]
            mode = "relaxed"
            extra_blocked_domains = ["Example-Directory.com"]

            [translation]
            enabled = false

            [output]
            format = "json"
        "#;
        let file_config: ConfigFile = toml::from_str(toml_str).unwrap();
        let mut config = Config::default();
        apply_file_config(&mut config, &file_config);
        validate_config(&mut config).unwrap();

        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.api_key.as_deref(), Some("key-from-file"));
        assert_eq!(config.search_page_size, 5);
        assert_eq!(config.mode, FilterMode::Relaxed);
        assert_eq!(config.extra_blocked_domains, vec!["example-directory.com"]);
        assert!(!config.translation_enabled);
        assert_eq!(config.report_format, ReportFormat::Json);
    }

    #[test]
    fn test_cli_args_override_file() {
        let mut config = Config::default();
        config.mode = FilterMode::Relaxed;
        let args = SettingsArgs {
            mode: Some(FilterMode::Strict),
            concurrency: Some(2),
            blocked_domains: Some("a.com, ,B.org".to_string()),
            no_translate: true,
            ..SettingsArgs::default()
        };
        apply_cli_args(&mut config, &args);
        assert_eq!(config.mode, FilterMode::Strict);
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.extra_blocked_domains, vec!["a.com", "b.org"]);
        assert!(!config.translation_enabled);
    }

    #[test]
    fn test_validate_config_fixes_values() {
        let mut config = Config {
            sleep_between_requests: (2.0, 1.0),
            search_page_size: 50,
            max_search_pages: 0,
            concurrency: 0,
            ..Config::default()
        };
        validate_config(&mut config).unwrap();
        assert_eq!(config.sleep_between_requests, (2.0, 2.0));
        assert_eq!(config.search_page_size, 10);
        assert_eq!(config.max_search_pages, 1);
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn test_validate_config_rejects_unusable_sleep_bounds() {
        for bounds in [(f32::INFINITY, 1.0), (0.5, f32::NAN), (-1.0, 1.0)] {
            let mut config = Config {
                sleep_between_requests: bounds,
                ..Config::default()
            };
            assert!(validate_config(&mut config).is_err(), "accepted {:?}", bounds);
        }

        let file_config: ConfigFile = toml::from_str("[network]\nmin_sleep = nan\n").unwrap();
        let mut config = Config::default();
        apply_file_config(&mut config, &file_config);
        assert!(validate_config(&mut config).is_err());
    }

    #[test]
    fn test_build_config_reads_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[runtime]\nconcurrency = 7").unwrap();
        let args = SettingsArgs {
            config_file: Some(file.path().to_string_lossy().to_string()),
            ..SettingsArgs::default()
        };
        let config = build_config(&args).unwrap();
        assert_eq!(config.concurrency, 7);
    }

    #[test]
    fn test_resolve_credentials_missing_is_fatal() {
        let config = Config {
            api_key: Some("key".to_string()),
            search_engine_id: Some("   ".to_string()),
            ..Config::default()
        };
        let err = resolve_credentials(&config, false).unwrap_err();
        assert!(matches!(err, AppError::ConfigurationMissing(_)));

        let config = Config {
            api_key: Some("key".to_string()),
            search_engine_id: Some("cx".to_string()),
            ..Config::default()
        };
        let creds = resolve_credentials(&config, false).unwrap();
        assert_eq!(creds.api_key, "key");
        assert_eq!(creds.search_engine_id, "cx");
    }
}
