//! Layered configuration for booksing.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. A configuration file: the explicitly given path, or `config.toml` in the
//!    platform config directory if it exists. TOML, YAML and JSON are picked
//!    by file extension.
//! 3. Environment variables prefixed with `BOOKSING_`, using `__` to reach
//!    into sections (`BOOKSING_INGEST__WORKERS=8`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

const ENV_PREFIX: &str = "BOOKSING_";
const DATABASE_FILENAME: &str = "booksing.db";
const CONFIG_FILENAME: &str = "config.toml";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "booksing")
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub library: LibraryConfig,
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
    pub log: LogConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Root of the book collection. Relative paths resolve against the
    /// working directory.
    pub book_dir: PathBuf,
    /// File patterns that are considered books (`"*.epub"`, `".epub"` or `"epub"`).
    pub extensions: Vec<String>,
    /// Delete invalid and duplicate source files during ingestion.
    pub allow_deletes: bool,
}
impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            book_dir: PathBuf::from("."),
            extensions: vec!["epub".to_string()],
            allow_deletes: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = project_dirs()
            .map(|dirs| dirs.data_dir().join(DATABASE_FILENAME))
            .unwrap_or_else(|| PathBuf::from(DATABASE_FILENAME));
        Self { path }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Number of concurrent ingestion workers.
    pub workers: usize,
    /// Records buffered before they are pushed to the search index.
    pub batch_size: usize,
    /// Longest a record waits in the buffer before it is pushed anyway.
    pub flush_interval_secs: u64,
    /// Seconds between automatic scans; `0` disables the timer.
    pub scan_interval_secs: u64,
}
impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            batch_size: 50,
            flush_interval_secs: 10,
            scan_interval_secs: 3600,
        }
    }
}
impl IngestConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn scan_interval(&self) -> Option<Duration> {
        (self.scan_interval_secs > 0).then(|| Duration::from_secs(self.scan_interval_secs))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default verbosity (`error`, `warn`, `info`, `debug`, `trace` or `off`);
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
}
impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}
impl LogConfig {
    pub fn level_filter(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(self.level.trim())
            .or_raise(|| ErrorKind::Invalid(format!("log.level `{}` is not a log level", self.level)))
    }
}

impl Config {
    /// Where the configuration file is looked for when none is given.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILENAME))
    }

    /// Builds the layered [`Figment`] without extracting it.
    ///
    /// An explicit `file` must exist; the default location is only used if
    /// it does.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        let file = match file {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|path| path.is_file()),
        };
        if let Some(path) = file {
            let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
            figment = match extension.as_deref() {
                Some("toml") => figment.merge(Toml::file_exact(&path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(&path)),
                Some("json") => figment.merge(Json::file_exact(&path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path)),
            };
            tracing::debug!(path = %path.display(), "loading configuration file");
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load and validate the configuration.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config: Config = Self::figment(file)?.extract().or_raise(|| ErrorKind::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the ingestion pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ingest.workers == 0 {
            exn::bail!(ErrorKind::Invalid("ingest.workers must be at least 1".to_string()));
        }
        if self.ingest.batch_size == 0 {
            exn::bail!(ErrorKind::Invalid("ingest.batch_size must be at least 1".to_string()));
        }
        if self.ingest.flush_interval_secs == 0 {
            exn::bail!(ErrorKind::Invalid("ingest.flush_interval_secs must be at least 1".to_string()));
        }
        if self.library.extensions.iter().all(|ext| ext.trim().trim_start_matches(['*', '.']).is_empty()) {
            exn::bail!(ErrorKind::Invalid("library.extensions must name at least one extension".to_string()));
        }
        self.log.level_filter()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.library.book_dir, PathBuf::from("."));
        assert_eq!(config.library.extensions, vec!["epub"]);
        assert!(!config.library.allow_deletes);
        assert_eq!(config.ingest.workers, 5);
        assert_eq!(config.ingest.batch_size, 50);
        assert_eq!(config.ingest.flush_interval(), Duration::from_secs(10));
        assert_eq!(config.ingest.scan_interval(), Some(Duration::from_secs(3600)));
        assert!(config.database.path.ends_with(DATABASE_FILENAME));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_scan_interval_disables_timer() {
        let ingest = IngestConfig { scan_interval_secs: 0, ..IngestConfig::default() };
        assert_eq!(ingest.scan_interval(), None);
    }

    #[test]
    fn test_toml_file_and_env_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "booksing.toml",
                r#"
                    [library]
                    book_dir = "/srv/books"
                    allow_deletes = true

                    [ingest]
                    workers = 2
                    batch_size = 10
                "#,
            )?;
            jail.set_env("BOOKSING_INGEST__WORKERS", "8");
            jail.set_env("BOOKSING_LOG__LEVEL", "debug");
            let config = Config::load(Some(Path::new("booksing.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.library.book_dir, PathBuf::from("/srv/books"));
            assert!(config.library.allow_deletes);
            // Environment beats the file, the file beats the defaults.
            assert_eq!(config.ingest.workers, 8);
            assert_eq!(config.ingest.batch_size, 10);
            assert_eq!(config.ingest.flush_interval_secs, 10);
            assert_eq!(config.log.level, "debug");
            Ok(())
        });
    }

    #[test]
    fn test_yaml_and_json_files() {
        Jail::expect_with(|jail| {
            jail.create_file("booksing.yaml", "ingest:\n  batch_size: 7\n")?;
            jail.create_file("booksing.json", r#"{"library": {"extensions": ["*.epub", "*.kepub"]}}"#)?;
            let yaml = Config::load(Some(Path::new("booksing.yaml"))).map_err(|e| e.to_string())?;
            assert_eq!(yaml.ingest.batch_size, 7);
            let json = Config::load(Some(Path::new("booksing.json"))).map_err(|e| e.to_string())?;
            assert_eq!(json.library.extensions, vec!["*.epub", "*.kepub"]);
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("booksing.ini");
        std::fs::write(&path, "workers=1").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
    }

    #[test]
    fn test_malformed_value() {
        Jail::expect_with(|jail| {
            jail.set_env("BOOKSING_INGEST__WORKERS", "many");
            let err = Config::load(None).unwrap_err();
            assert_eq!(*err, ErrorKind::Parse);
            Ok(())
        });
    }

    #[rstest]
    #[case::no_workers(|c: &mut Config| c.ingest.workers = 0)]
    #[case::no_batch(|c: &mut Config| c.ingest.batch_size = 0)]
    #[case::no_flush(|c: &mut Config| c.ingest.flush_interval_secs = 0)]
    #[case::no_extensions(|c: &mut Config| c.library.extensions.clear())]
    #[case::blank_extensions(|c: &mut Config| c.library.extensions = vec!["*.".to_string()])]
    #[case::bad_level(|c: &mut Config| c.log.level = "loud".to_string())]
    fn test_validate_rejects(#[case] mutate: fn(&mut Config)) {
        let mut config = Config::default();
        mutate(&mut config);
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }
}
