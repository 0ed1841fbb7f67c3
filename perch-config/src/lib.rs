//! Loader for Perch configuration with YAML + environment overlays.
//!
//! A run is described by four sections: where raw timeline items come from
//! (`fetch`), which inclusion filters the normalizer applies (`pipeline`),
//! which sink receives the batch (`sink`) and how logs are emitted
//! (`logging`). `PERCH__`-prefixed environment variables override file values
//! (`PERCH__SINK__KIND=snapshot`), and `${VAR}` placeholders inside string
//! values are expanded after all sources are merged.
use config::{Config, ConfigError, Environment, File};
use perch_common::observability::LogFormat;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

mod lenient;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const DEFAULT_FETCH_COUNT: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct PerchConfig {
    pub version: Option<String>,
    pub fetch: FetchConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Shared fields + the per-source details.
#[derive(Debug, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_count", deserialize_with = "lenient::parse")]
    pub count: u32,
    #[serde(flatten)]
    pub source: FetchSource,
}

/// The tag is `source`; remaining keys belong to the variant.
#[derive(Debug, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum FetchSource {
    /// Live timeline endpoint with bearer auth.
    Api {
        #[serde(default = "default_timeline_endpoint")]
        endpoint: String,
        auth_token: String,
    },
    /// Previously captured JSON dump of raw items.
    File { path: PathBuf },
}

/// Inclusion filters handed to the normalizer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineSettings {
    #[serde(default, deserialize_with = "lenient::parse")]
    pub include_referenced: bool,
    #[serde(default, deserialize_with = "lenient::parse")]
    pub include_retweet_text: bool,
    #[serde(default, deserialize_with = "lenient::parse_opt")]
    pub max_age_days: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    Sqlite {
        database_url: String,
    },
    Snapshot {
        #[serde(default = "default_snapshot_dir")]
        dir: PathBuf,
    },
}

/// Without a `sink` section, runs merge into `tweets/<day>.json`.
impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Snapshot {
            dir: default_snapshot_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default, deserialize_with = "lenient::parse")]
    pub stderr: bool,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_fetch_count() -> u32 {
    DEFAULT_FETCH_COUNT
}
fn default_timeline_endpoint() -> String {
    "https://api.x.com/graphql/home_latest_timeline".into()
}
pub fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("tweets")
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct PerchConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for PerchConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PerchConfigLoader {
    /// Start an empty builder; files and snippets are layered in call order,
    /// `PERCH__` environment variables are applied after them and
    /// [`with_override`](Self::with_override) values beat both.
    ///
    /// Environment values arrive as strings; numeric and boolean fields parse
    /// them, string fields keep them verbatim.
    ///
    /// ```
    /// use perch_config::{PerchConfigLoader, SinkConfig};
    ///
    /// let config = PerchConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// version: "1"
    /// fetch:
    ///   source: file
    ///   path: dump.json
    /// sink:
    ///   kind: snapshot
    /// "#,
    ///     )
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.fetch.count, 100);
    /// assert!(matches!(config.sink, SinkConfig::Snapshot { .. }));
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Like [`with_file`](Self::with_file) but a missing file is ignored, so
    /// deployments can rely purely on environment variables.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Pin `key` (dotted, e.g. `sink.kind`) above every file and env source.
    /// Used for command-line flags.
    pub fn with_override<V: Into<config::Value>>(
        mut self,
        key: &str,
        value: V,
    ) -> Result<Self, ConfigError> {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Consume the builder and deserialize the merged sources into strongly typed config.
    ///
    /// ```
    /// use perch_config::{FetchSource, PerchConfigLoader};
    ///
    /// let config = PerchConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// fetch:
    ///   source: api
    ///   auth_token: "${PERCH_DOCTEST_UNSET_TOKEN}"
    ///   count: 20
    /// pipeline:
    ///   max_age_days: 1
    /// sink:
    ///   kind: sqlite
    ///   database_url: "sqlite://perch.db"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(config.fetch.count, 20);
    /// assert_eq!(config.pipeline.max_age_days, Some(1));
    /// assert!(!config.pipeline.include_retweet_text);
    /// match &config.fetch.source {
    ///     FetchSource::Api { auth_token, .. } => {
    ///         // unknown variables are left untouched
    ///         assert_eq!(auth_token, "${PERCH_DOCTEST_UNSET_TOKEN}");
    ///     }
    ///     other => panic!("expected api source, got {other:?}"),
    /// }
    /// ```
    pub fn load(self) -> Result<PerchConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix("PERCH")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: PerchConfig =
            serde_json::from_value(v).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        Ok(typed)
    }
}
