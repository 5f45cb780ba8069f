//! Configuration for songbook.
//!
//! Settings are layered, later layers winning:
//!
//! 1. built-in defaults,
//! 2. a configuration file (TOML, YAML or JSON, picked by extension), either
//!    given explicitly or `config.toml` in the platform config directory,
//! 3. `SONGBOOK_` environment variables, with `__` between section and key
//!    (`SONGBOOK_LIBRARY__ROOT=/media/karaoke`).

pub mod error;
mod models;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use crate::models::{BackupConfig, DatabaseConfig, EnrichmentConfig, LibraryConfig, LogConfig, SyncConfig};

pub const ENV_PREFIX: &str = "SONGBOOK_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub library: LibraryConfig,
    pub database: DatabaseConfig,
    pub backup: BackupConfig,
    pub sync: SyncConfig,
    pub enrichment: EnrichmentConfig,
    pub log: LogConfig,
}

/// The configuration file looked for when none is given.
pub fn default_config_file() -> Option<PathBuf> {
    ProjectDirs::from("", "", "songbook").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn file_provider(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().map(|ext| ext.to_string_lossy().to_lowercase()).unwrap_or_default();
    Ok(match extension.as_str() {
        "toml" => figment.merge(Toml::file_exact(path)),
        "yaml" | "yml" => figment.merge(Yaml::file_exact(path)),
        "json" => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.display().to_string())),
    })
}

impl Config {
    /// Load configuration from the defaults, `file` (or the default file, if
    /// it exists) and the environment, then validate it.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file = match file {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => default_config_file().filter(|path| path.is_file()),
        };
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = &file {
            tracing::debug!(path = %path.display(), "loading configuration file");
            figment = file_provider(figment, path)?;
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().or_raise(|| ErrorKind::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let checks = [
            (self.sync.fingerprint_bytes == 0, "sync.fingerprint_bytes must be greater than zero"),
            (self.sync.batch_size == 0, "sync.batch_size must be greater than zero"),
            (self.enrichment.max_calls_per_minute == 0, "enrichment.max_calls_per_minute must be greater than zero"),
            (self.enrichment.retry_ceiling == 0, "enrichment.retry_ceiling must be greater than zero"),
            (self.log.level.trim().is_empty(), "log.level must not be empty"),
        ];
        if let Some((_, message)) = checks.into_iter().find(|(failed, _)| *failed) {
            exn::bail!(ErrorKind::Invalid(message.to_string()));
        }
        Ok(())
    }

    /// The library root, which only some commands need.
    pub fn library_root(&self) -> Result<&Path> {
        self.library.root.as_deref().ok_or_raise(|| ErrorKind::Missing("library.root"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = Config::from_figment(Figment::from(Serialized::defaults(Config::default()))).unwrap();
        assert_eq!(config.sync.batch_size, 500);
        assert_eq!(config.sync.fingerprint_bytes, 16384);
        assert_eq!(config.enrichment.max_calls_per_minute, 60);
        assert_eq!(config.enrichment.retry_ceiling, 3);
        assert_eq!(config.log.level, "info");
        assert!(config.database.path.ends_with("songbook.db"));
        assert!(matches!(&*config.library_root().unwrap_err(), ErrorKind::Missing("library.root")));
    }

    #[rstest]
    #[case("songbook.toml", "[library]\nroot = \"/media/karaoke\"\n\n[sync]\nbatch_size = 50\n")]
    #[case("songbook.yaml", "library:\n  root: /media/karaoke\nsync:\n  batch_size: 50\n")]
    #[case("songbook.json", r#"{"library": {"root": "/media/karaoke"}, "sync": {"batch_size": 50}}"#)]
    fn test_file_formats(#[case] name: &str, #[case] contents: &str) {
        Jail::expect_with(|jail| {
            jail.create_file(name, contents)?;
            let config = Config::load(Some(Path::new(name))).unwrap();
            assert_eq!(config.library_root().unwrap(), Path::new("/media/karaoke"));
            assert_eq!(config.sync.batch_size, 50);
            // Untouched settings keep their defaults.
            assert_eq!(config.sync.default_priority, 0);
            Ok(())
        });
    }

    #[test]
    fn test_environment_wins() {
        Jail::expect_with(|jail| {
            jail.create_file("songbook.toml", "[enrichment]\nretry_ceiling = 5\nmax_calls_per_minute = 30\n")?;
            jail.set_env("SONGBOOK_ENRICHMENT__RETRY_CEILING", "7");
            jail.set_env("SONGBOOK_LIBRARY__HIDDEN_FILES", "true");
            let config = Config::load(Some(Path::new("songbook.toml"))).unwrap();
            assert_eq!(config.enrichment.retry_ceiling, 7);
            assert_eq!(config.enrichment.max_calls_per_minute, 30);
            assert!(config.library.hidden_files);
            Ok(())
        });
    }

    #[test]
    fn test_rejected_files() {
        Jail::expect_with(|jail| {
            jail.create_file("songbook.ini", "root = here")?;
            let err = Config::load(Some(Path::new("songbook.ini"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));

            let err = Config::load(Some(Path::new("missing.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::NotFound(_)));

            jail.create_file("broken.toml", "[sync]\nbatch_size = \"lots\"\n")?;
            let err = Config::load(Some(Path::new("broken.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Parse));
            Ok(())
        });
    }

    #[rstest]
    #[case("[sync]\nbatch_size = 0\n", "sync.batch_size")]
    #[case("[sync]\nfingerprint_bytes = 0\n", "sync.fingerprint_bytes")]
    #[case("[enrichment]\nmax_calls_per_minute = 0\n", "enrichment.max_calls_per_minute")]
    #[case("[enrichment]\nretry_ceiling = 0\n", "enrichment.retry_ceiling")]
    #[case("[log]\nlevel = \"\"\n", "log.level")]
    fn test_validation(#[case] contents: &str, #[case] key: &str) {
        Jail::expect_with(|jail| {
            jail.create_file("songbook.toml", contents)?;
            let err = Config::load(Some(Path::new("songbook.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(message) if message.starts_with(key)), "{err:?}");
            Ok(())
        });
    }
}
