//! Configuration sources.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;

/// File name of the agent configuration inside the settings directory.
const SETTINGS_FILE: &str = "agent-configuration.json";

/// Somewhere agent configuration text can be read from.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Reads the current configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceNotFound`] if the source does not exist, or
    /// another error if it exists but cannot be read.
    async fn fetch(&self) -> Result<String>;

    /// Describes where the source lives, for logs.
    fn location(&self) -> String;
}

/// Reads agent configuration from a file on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Creates a source reading the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    async fn fetch(&self) -> Result<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::SourceNotFound {
                location: self.location(),
            }),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Returns the machine-wide agent configuration path.
///
/// `%ProgramData%\Forager\AgentSettings\agent-configuration.json` on Windows,
/// `/var/lib/forager/agent-settings/agent-configuration.json` elsewhere.
pub fn default_settings_path() -> PathBuf {
    if cfg!(windows) {
        let base = std::env::var_os("ProgramData")
            .map_or_else(|| PathBuf::from(r"C:\ProgramData"), PathBuf::from);
        base.join("Forager").join("AgentSettings").join(SETTINGS_FILE)
    } else {
        PathBuf::from("/var/lib/forager/agent-settings").join(SETTINGS_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, r#"{"sites": []}"#).unwrap();

        let text = FileSource::new(&path).fetch().await.unwrap();
        assert_eq!(text, r#"{"sites": []}"#);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path().join(SETTINGS_FILE));
        let result = source.fetch().await;
        assert!(matches!(result, Err(Error::SourceNotFound { .. })));
    }

    #[tokio::test]
    async fn directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path());
        assert!(matches!(source.fetch().await, Err(Error::Io(_))));
    }

    #[test]
    fn default_path_ends_with_settings_file() {
        assert!(default_settings_path().ends_with(SETTINGS_FILE));
    }
}
