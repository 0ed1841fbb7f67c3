use anyhow::{Context, Result};
use perch_config::{FetchConfig, FetchSource, PerchConfig, PerchConfigLoader, SinkConfig};
use perch_ingest::Persister;
use perch_ingest::pipeline::{Pipeline, PipelineConfig};
use perch_ingest::snapshot::SnapshotStore;
use perch_ingest::store::PostStore;
use perch_social::twitter::extract::NormalizeOptions;
use perch_social::twitter::{Fetcher, JsonFileFetcher, TimelineApi};
use std::path::PathBuf;
use std::sync::Arc;

/// Command-line values that take precedence over files and environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub sink: Option<SinkKind>,
    pub database_url: Option<String>,
    pub snapshot_dir: Option<PathBuf>,
    pub input: Option<PathBuf>,
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SinkKind {
    Sqlite,
    Snapshot,
}

impl SinkKind {
    fn as_str(self) -> &'static str {
        match self {
            SinkKind::Sqlite => "sqlite",
            SinkKind::Snapshot => "snapshot",
        }
    }
}

/// Layer the flags onto `loader` before anything is deserialized, so a run
/// described entirely by flags needs no config file.
pub fn apply_overrides(mut loader: PerchConfigLoader, ov: &Overrides) -> Result<PerchConfigLoader> {
    if let Some(count) = ov.count {
        loader = loader.with_override("fetch.count", i64::from(count))?;
    }
    if let Some(path) = &ov.input {
        loader = loader
            .with_override("fetch.source", "file")?
            .with_override("fetch.path", path.to_string_lossy().into_owned())?;
    }
    if let Some(kind) = ov.sink {
        loader = loader.with_override("sink.kind", kind.as_str())?;
    }
    if let Some(url) = &ov.database_url {
        loader = loader.with_override("sink.database_url", url.as_str())?;
    }
    if let Some(dir) = &ov.snapshot_dir {
        loader = loader.with_override("sink.dir", dir.to_string_lossy().into_owned())?;
    }
    Ok(loader)
}

pub fn load_config(loader: PerchConfigLoader, ov: &Overrides) -> Result<PerchConfig> {
    apply_overrides(loader, ov)?
        .load()
        .context("loading configuration")
}

pub fn pipeline_config(cfg: &PerchConfig) -> PipelineConfig {
    PipelineConfig {
        fetch_count: cfg.fetch.count,
        normalize: NormalizeOptions {
            include_referenced: cfg.pipeline.include_referenced,
            include_retweet_text: cfg.pipeline.include_retweet_text,
            max_age_days: cfg.pipeline.max_age_days,
        },
    }
}

pub fn build_fetcher(cfg: &FetchConfig) -> Result<Arc<dyn Fetcher>> {
    match &cfg.source {
        FetchSource::Api {
            endpoint,
            auth_token,
        } => {
            let api = TimelineApi::new(endpoint, auth_token.clone())?;
            Ok(Arc::new(api))
        }
        FetchSource::File { path } => Ok(Arc::new(JsonFileFetcher::new(path.clone()))),
    }
}

pub async fn build_persister(cfg: &SinkConfig) -> Result<Arc<dyn Persister>> {
    match cfg {
        SinkConfig::Sqlite { database_url } => {
            let store = PostStore::connect(database_url).await?;
            Ok(Arc::new(store))
        }
        SinkConfig::Snapshot { dir } => Ok(Arc::new(SnapshotStore::new(dir.clone()))),
    }
}

pub async fn build_pipeline(cfg: &PerchConfig) -> Result<Pipeline> {
    let fetcher = build_fetcher(&cfg.fetch)?;
    let persister = build_persister(&cfg.sink).await?;
    Ok(Pipeline::new(pipeline_config(cfg), fetcher, persister))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(yaml: &str, ov: &Overrides) -> Result<PerchConfig> {
        load_config(PerchConfigLoader::new().with_yaml_str(yaml), ov)
    }

    const SQLITE_YAML: &str = r#"
fetch:
  source: api
  auth_token: t
sink:
  kind: sqlite
  database_url: "sqlite://from-file.db"
pipeline:
  include_retweet_text: true
  max_age_days: 2
"#;

    #[test]
    fn no_overrides_keeps_config() {
        let cfg = load(SQLITE_YAML, &Overrides::default()).unwrap();
        assert!(matches!(
            &cfg.sink,
            SinkConfig::Sqlite { database_url } if database_url == "sqlite://from-file.db"
        ));

        let p = pipeline_config(&cfg);
        assert_eq!(p.fetch_count, 100);
        assert!(p.normalize.include_retweet_text);
        assert!(!p.normalize.include_referenced);
        assert_eq!(p.normalize.max_age_days, Some(2));
    }

    #[test]
    fn switching_to_snapshot_uses_default_dir() {
        let ov = Overrides {
            sink: Some(SinkKind::Snapshot),
            input: Some(PathBuf::from("dump.json")),
            count: Some(7),
            ..Default::default()
        };
        let cfg = load(SQLITE_YAML, &ov).unwrap();
        assert!(matches!(&cfg.sink, SinkConfig::Snapshot { dir } if dir == &PathBuf::from("tweets")));
        assert!(matches!(&cfg.fetch.source, FetchSource::File { path } if path == &PathBuf::from("dump.json")));
        assert_eq!(cfg.fetch.count, 7);
    }

    #[test]
    fn switching_to_sqlite_requires_database_url() {
        let yaml = "fetch:\n  source: file\n  path: d.json\nsink:\n  kind: snapshot\n";
        let ov = Overrides {
            sink: Some(SinkKind::Sqlite),
            ..Default::default()
        };
        let err = load(yaml, &ov).unwrap_err();
        assert!(format!("{err:#}").contains("database_url"));

        let ov = Overrides {
            sink: Some(SinkKind::Sqlite),
            database_url: Some("sqlite::memory:".into()),
            ..Default::default()
        };
        let cfg = load(yaml, &ov).unwrap();
        assert!(matches!(cfg.sink, SinkConfig::Sqlite { database_url } if database_url == "sqlite::memory:"));
    }

    #[test]
    fn snapshot_dir_flag_replaces_configured_dir() {
        let yaml = "fetch:\n  source: file\n  path: d.json\nsink:\n  kind: snapshot\n  dir: from-file\n";
        let ov = Overrides {
            snapshot_dir: Some(PathBuf::from("from-flag")),
            ..Default::default()
        };
        let cfg = load(yaml, &ov).unwrap();
        assert!(matches!(&cfg.sink, SinkConfig::Snapshot { dir } if dir == &PathBuf::from("from-flag")));
    }

    #[tokio::test]
    async fn flags_alone_build_a_working_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.json");
        std::fs::write(&dump, "[]").unwrap();

        let ov = Overrides {
            sink: Some(SinkKind::Snapshot),
            input: Some(dump),
            snapshot_dir: Some(dir.path().join("tweets")),
            ..Default::default()
        };
        let loader = PerchConfigLoader::new().with_optional_file(dir.path().join("perch.yaml"));
        let cfg = load_config(loader, &ov).unwrap();

        let report = build_pipeline(&cfg).await.unwrap().run().await.unwrap();
        assert_eq!(report.fetched, 0);
        assert_eq!(report.persist.sink, "snapshot");
        assert_eq!(report.persist.total, Some(0));
    }
}
