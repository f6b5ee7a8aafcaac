//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{str::FromStr, time::Duration};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::domain::entities::EntityKind;
use crate::domain::images::{
    ConstraintPolicy, DEFAULT_ALLOWED_TYPES, DEFAULT_MAX_DIMENSION, DEFAULT_MIN_DIMENSION,
    DEFAULT_PREFERRED_TYPE,
};

mod cli;

pub use cli::{
    CategoryCommand, CategorySaveArgs, CliArgs, Command, Credentials, GlobalOverrides, IdArg,
    ProductCommand, ProductSaveArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "patisserie";
const ENV_PREFIX: &str = "PATISSERIE";
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STORAGE_BUCKET: &str = "product_images";
const DEFAULT_PRODUCTS_TABLE: &str = "productos";
const DEFAULT_CATEGORIES_TABLE: &str = "categorias";
const DEFAULT_STALE_AFTER_MS: u64 = 0;
const DEFAULT_GC_GRACE_MS: u64 = 5 * 60 * 1000;
const DEFAULT_GC_INTERVAL_MS: u64 = 60 * 1000;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub backend: BackendSettings,
    pub storage: StorageSettings,
    pub tables: TableSettings,
    pub cache: CacheSettings,
    pub images: ImageSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Project base URL. Required by every command that talks to the backend.
    pub url: Option<Url>,
    pub anon_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub bucket: String,
}

/// Backend table names per entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSettings {
    pub products: String,
    pub categories: String,
}

impl TableSettings {
    pub fn for_kind(&self, kind: EntityKind) -> &str {
        match kind {
            EntityKind::Product => &self.products,
            EntityKind::Category => &self.categories,
        }
    }
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            products: DEFAULT_PRODUCTS_TABLE.to_string(),
            categories: DEFAULT_CATEGORIES_TABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub stale_after: Duration,
    pub gc_grace: Duration,
    pub gc_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ImageSettings {
    pub allowed_types: Vec<String>,
    pub preferred_type: Option<String>,
    pub min_dimension: u32,
    pub max_dimension: u32,
    pub dimension_policy: ConstraintPolicy,
    pub format_policy: ConstraintPolicy,
    pub drop_warned: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("images.allowed_types"),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    backend: RawBackendSettings,
    storage: RawStorageSettings,
    tables: RawTableSettings,
    cache: RawCacheSettings,
    images: RawImageSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.backend_url.as_ref() {
            self.backend.url = Some(url.clone());
        }
        if let Some(key) = overrides.backend_anon_key.as_ref() {
            self.backend.anon_key = Some(key.clone());
        }
        if let Some(seconds) = overrides.backend_timeout_seconds {
            self.backend.timeout_seconds = Some(seconds);
        }
        if let Some(bucket) = overrides.storage_bucket.as_ref() {
            self.storage.bucket = Some(bucket.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            backend,
            storage,
            tables,
            cache,
            images,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let backend = build_backend_settings(backend)?;
        let storage = build_storage_settings(storage)?;
        let tables = build_table_settings(tables)?;
        let cache = build_cache_settings(cache)?;
        let images = build_image_settings(images)?;

        Ok(Self {
            logging,
            backend,
            storage,
            tables,
            cache,
            images,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::WARN,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_backend_settings(backend: RawBackendSettings) -> Result<BackendSettings, LoadError> {
    let url = match non_blank(backend.url) {
        Some(value) => {
            let parsed = Url::parse(&value)
                .map_err(|err| LoadError::invalid("backend.url", format!("invalid URL: {err}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(LoadError::invalid(
                    "backend.url",
                    "scheme must be http or https",
                ));
            }
            Some(parsed)
        }
        None => None,
    };

    let timeout_secs = backend
        .timeout_seconds
        .unwrap_or(DEFAULT_BACKEND_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "backend.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(BackendSettings {
        url,
        anon_key: non_blank(backend.anon_key),
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let bucket = storage
        .bucket
        .unwrap_or_else(|| DEFAULT_STORAGE_BUCKET.to_string());
    if bucket.trim().is_empty() || bucket.contains('/') {
        return Err(LoadError::invalid(
            "storage.bucket",
            "must be a non-empty name without `/`",
        ));
    }
    Ok(StorageSettings {
        bucket: bucket.trim().to_string(),
    })
}

fn build_table_settings(tables: RawTableSettings) -> Result<TableSettings, LoadError> {
    let defaults = TableSettings::default();
    let products = tables.products.unwrap_or(defaults.products);
    let categories = tables.categories.unwrap_or(defaults.categories);

    if products.trim().is_empty() {
        return Err(LoadError::invalid("tables.products", "must not be empty"));
    }
    if categories.trim().is_empty() {
        return Err(LoadError::invalid("tables.categories", "must not be empty"));
    }

    Ok(TableSettings {
        products,
        categories,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let stale_after = cache.stale_after_ms.unwrap_or(DEFAULT_STALE_AFTER_MS);
    let gc_grace = cache.gc_grace_ms.unwrap_or(DEFAULT_GC_GRACE_MS);
    let gc_interval = cache.gc_interval_ms.unwrap_or(DEFAULT_GC_INTERVAL_MS);
    if gc_interval == 0 {
        return Err(LoadError::invalid(
            "cache.gc_interval_ms",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        stale_after: Duration::from_millis(stale_after),
        gc_grace: Duration::from_millis(gc_grace),
        gc_interval: Duration::from_millis(gc_interval),
    })
}

fn build_image_settings(images: RawImageSettings) -> Result<ImageSettings, LoadError> {
    let allowed_types: Vec<String> = match images.allowed_types {
        Some(types) => types
            .into_iter()
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty())
            .collect(),
        None => DEFAULT_ALLOWED_TYPES
            .iter()
            .map(|value| (*value).to_string())
            .collect(),
    };
    if allowed_types.is_empty() {
        return Err(LoadError::invalid(
            "images.allowed_types",
            "at least one MIME type is required",
        ));
    }

    let preferred_type = match images.preferred_type {
        Some(value) => non_blank(Some(value)).map(|value| value.to_ascii_lowercase()),
        None => Some(DEFAULT_PREFERRED_TYPE.to_string()),
    };
    if let Some(preferred) = preferred_type.as_ref()
        && !allowed_types.contains(preferred)
    {
        return Err(LoadError::invalid(
            "images.preferred_type",
            format!("`{preferred}` is not among the allowed types"),
        ));
    }

    let min_dimension = images.min_dimension.unwrap_or(DEFAULT_MIN_DIMENSION);
    let max_dimension = images.max_dimension.unwrap_or(DEFAULT_MAX_DIMENSION);
    if min_dimension == 0 || min_dimension > max_dimension {
        return Err(LoadError::invalid(
            "images.min_dimension",
            format!("must be between 1 and max_dimension ({max_dimension})"),
        ));
    }

    Ok(ImageSettings {
        allowed_types,
        preferred_type,
        min_dimension,
        max_dimension,
        dimension_policy: images.dimension_policy.unwrap_or(ConstraintPolicy::Warn),
        format_policy: images.format_policy.unwrap_or(ConstraintPolicy::Warn),
        drop_warned: images.drop_warned.unwrap_or(false),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBackendSettings {
    url: Option<String>,
    anon_key: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    bucket: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTableSettings {
    products: Option<String>,
    categories: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    stale_after_ms: Option<u64>,
    gc_grace_ms: Option<u64>,
    gc_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawImageSettings {
    #[serde(alias = "required_types")]
    allowed_types: Option<Vec<String>>,
    preferred_type: Option<String>,
    min_dimension: Option<u32>,
    max_dimension: Option<u32>,
    dimension_policy: Option<ConstraintPolicy>,
    format_policy: Option<ConstraintPolicy>,
    drop_warned: Option<bool>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    use clap::Parser;

    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
