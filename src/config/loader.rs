//! Configuration sources.
//!
//! - [`ValueLoader`] - a fixed in-memory configuration
//! - [`FileLoader`] - a `.json`, `.yaml` or `.yml` file, watched with `notify`

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::ServerConfig;
use crate::error::{Result, SmartError};

/// Receives every successfully reloaded configuration.
pub type ConfigCallback = Arc<dyn Fn(ServerConfig) + Send + Sync>;

/// Source of the server configuration.
pub trait ConfigLoader: Send + Sync {
    fn load(&self) -> Result<ServerConfig>;

    /// Start delivering reloaded configurations to `on_change`.
    ///
    /// Watching stops when the returned guard is dropped.
    fn watch(&self, on_change: ConfigCallback) -> Result<ConfigWatch>;
}

/// Keeps a configuration watch alive.
#[derive(Default)]
pub struct ConfigWatch {
    watcher: Option<RecommendedWatcher>,
}

impl ConfigWatch {
    /// A guard that watches nothing.
    pub fn inactive() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }
}

impl std::fmt::Debug for ConfigWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatch")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Serves a configuration held in memory. It never changes.
#[derive(Debug, Clone, Default)]
pub struct ValueLoader {
    value: ServerConfig,
}

impl ValueLoader {
    pub fn new(value: ServerConfig) -> Self {
        Self { value }
    }
}

impl ConfigLoader for ValueLoader {
    fn load(&self) -> Result<ServerConfig> {
        Ok(self.value.clone())
    }

    fn watch(&self, _on_change: ConfigCallback) -> Result<ConfigWatch> {
        Ok(ConfigWatch::inactive())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

/// Loads the configuration from a file, picking the decoder by extension.
#[derive(Debug, Clone)]
pub struct FileLoader {
    path: PathBuf,
    format: Format,
}

impl FileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let format = match ext.as_deref() {
            Some("json") => Format::Json,
            Some("yaml") | Some("yml") => Format::Yaml,
            _ => {
                return Err(SmartError::Config(format!(
                    "unsupported config file: {}",
                    path.display()
                )))
            }
        };
        Ok(Self { path, format })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self, data: &[u8]) -> Result<ServerConfig> {
        match self.format {
            Format::Json => Ok(serde_json::from_slice(data)?),
            Format::Yaml => Ok(serde_yaml::from_slice(data)?),
        }
    }
}

impl ConfigLoader for FileLoader {
    fn load(&self) -> Result<ServerConfig> {
        if !self.path.is_file() {
            return Err(SmartError::Config(format!(
                "config file does not exist: {}",
                self.path.display()
            )));
        }
        let data = std::fs::read(&self.path)?;
        self.parse(&data)
    }

    /// Watches the file's directory so atomic replace-on-save is seen too.
    fn watch(&self, on_change: ConfigCallback) -> Result<ConfigWatch> {
        let file_name: OsString = self
            .path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| {
                SmartError::Config(format!("not a file path: {}", self.path.display()))
            })?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let loader = self.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    let touches_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()));
                    if !touches_file {
                        return;
                    }
                    match loader.load() {
                        Ok(config) => {
                            tracing::info!(path = %loader.path.display(), "config reloaded");
                            on_change(config);
                        }
                        Err(e) => {
                            tracing::error!(
                                path = %loader.path.display(),
                                "config changed but failed to parse: {}",
                                e
                            );
                        }
                    }
                }
                Err(e) => tracing::error!("config watch error: {}", e),
            },
            Config::default(),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::debug!(path = %self.path.display(), "config watcher started");
        Ok(ConfigWatch {
            watcher: Some(watcher),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::LoadBalance;
    use std::time::Duration;

    #[test]
    fn test_value_loader() {
        let config = ServerConfig {
            workers: 3,
            ..ServerConfig::default()
        };
        let loader = ValueLoader::new(config.clone());
        assert_eq!(loader.load().unwrap(), config);
        assert!(!loader.watch(Arc::new(|_| {})).unwrap().is_active());
    }

    #[test]
    fn test_file_loader_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("server.json");
        std::fs::write(&json, r#"{"workers": 2, "load_balance": "random"}"#).unwrap();
        let config = FileLoader::new(&json).unwrap().load().unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.load_balance, LoadBalance::Random);

        let yaml = dir.path().join("server.YML");
        std::fs::write(&yaml, "workers: 5\nservice_name: lobby\n").unwrap();
        let config = FileLoader::new(&yaml).unwrap().load().unwrap();
        assert_eq!(config.workers, 5);
        assert_eq!(config.service_name, "lobby");
    }

    #[test]
    fn test_file_loader_errors() {
        assert!(matches!(
            FileLoader::new("server.toml"),
            Err(SmartError::Config(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let missing = FileLoader::new(dir.path().join("absent.json")).unwrap();
        assert!(matches!(missing.load(), Err(SmartError::Config(_))));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            FileLoader::new(&broken).unwrap().load(),
            Err(SmartError::Json(_))
        ));
    }

    #[test]
    fn test_file_watch_delivers_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.yaml");
        std::fs::write(&path, "workers: 1\n").unwrap();

        let loader = FileLoader::new(&path).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        let _watch = loader
            .watch(Arc::new(move |config| {
                let _ = tx.send(config.workers);
            }))
            .unwrap();

        std::thread::sleep(Duration::from_millis(100));
        std::fs::write(&path, "workers: 8\n").unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut seen = None;
        while std::time::Instant::now() < deadline {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(8) => {
                    seen = Some(8);
                    break;
                }
                _ => continue,
            }
        }
        assert_eq!(seen, Some(8));
    }
}
