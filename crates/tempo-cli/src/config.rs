//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use tempo_llm::{Classifier, LlmError, ProjectRef};

/// Default minutes between capture cycles.
const DEFAULT_CAPTURE_INTERVAL_MINUTES: u64 = 5;
/// Default seconds of inactivity before the tracker considers the user idle.
const DEFAULT_IDLE_THRESHOLD_SECONDS: u64 = 300;
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Directory screenshots are written to.
    pub screenshots_dir: PathBuf,
    /// Minutes between capture cycles.
    pub capture_interval_minutes: u64,
    /// Seconds of inactivity before the user counts as idle.
    pub idle_threshold_seconds: u64,
    /// Case-insensitive substrings of app names to never capture.
    #[serde(default)]
    pub excluded_apps: Vec<String>,
    /// Entries older than this many days are eligible for pruning.
    #[serde(default)]
    pub retention_days: Option<u32>,
    /// Known projects offered to the classifier.
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

/// A project the classifier may attribute time to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub id: String,
    pub name: String,
}

/// Classifier backend selection and credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// Attach the captured screenshot to classification requests.
    #[serde(default = "default_true")]
    pub attach_screenshots: bool,
}

/// Classifier backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Anthropic,
    Proxy,
}

const fn default_true() -> bool {
    true
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            api_key: None,
            model: None,
            proxy_url: None,
            attach_screenshots: default_true(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("screenshots_dir", &self.screenshots_dir)
            .field("capture_interval_minutes", &self.capture_interval_minutes)
            .field("idle_threshold_seconds", &self.idle_threshold_seconds)
            .field("excluded_apps", &self.excluded_apps)
            .field("retention_days", &self.retention_days)
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("model", &self.model)
            .field("proxy_url", &self.proxy_url)
            .field("attach_screenshots", &self.attach_screenshots)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("tempo.db"),
            screenshots_dir: data_dir.join("screenshots"),
            capture_interval_minutes: DEFAULT_CAPTURE_INTERVAL_MINUTES,
            idle_threshold_seconds: DEFAULT_IDLE_THRESHOLD_SECONDS,
            excluded_apps: Vec::new(),
            retention_days: None,
            projects: Vec::new(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (TEMPO_*); nested keys use
        // double underscores, e.g. TEMPO_CLASSIFIER__API_KEY.
        figment = figment.merge(Env::prefixed("TEMPO_").split("__"));

        figment.extract()
    }

    /// Builds the classifier gateway from the config, or `None` when no
    /// backend is configured. The tracker then applies the local
    /// fallback analysis instead.
    pub fn classifier(&self) -> Result<Option<Classifier>, LlmError> {
        match self.classifier.provider {
            Provider::Anthropic => match &self.classifier.api_key {
                Some(api_key) => {
                    let model = self.classifier.model.as_deref().unwrap_or(DEFAULT_MODEL);
                    Classifier::anthropic(api_key, model).map(Some)
                }
                None => {
                    tracing::warn!("no classifier API key configured, using fallback analyses");
                    Ok(None)
                }
            },
            Provider::Proxy => match &self.classifier.proxy_url {
                Some(url) => Classifier::proxy(url).map(Some),
                None => {
                    tracing::warn!("no classifier proxy URL configured, using fallback analyses");
                    Ok(None)
                }
            },
        }
    }

    /// Known projects in the shape the classifier expects.
    #[must_use]
    pub fn project_refs(&self) -> Vec<ProjectRef> {
        self.projects
            .iter()
            .map(|p| ProjectRef {
                id: p.id.clone(),
                name: p.name.clone(),
            })
            .collect()
    }
}

/// Returns the platform-specific config directory for tempo.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tempo"))
}

/// Returns the platform-specific data directory for tempo.
///
/// On Linux: `~/.local/share/tempo`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("tempo"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirs_data_path_ends_with_tempo() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "tempo");
    }

    #[test]
    fn default_config_uses_data_dir() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("tempo.db"));
        assert_eq!(config.screenshots_dir, data_dir.join("screenshots"));
        assert_eq!(config.capture_interval_minutes, 5);
        assert_eq!(config.idle_threshold_seconds, 300);
    }

    #[test]
    fn config_file_overrides_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            capture_interval_minutes = 10
            excluded_apps = ["1Password", "Keychain"]

            [[projects]]
            id = "tempo"
            name = "Tempo tracker"

            [classifier]
            provider = "proxy"
            proxy_url = "http://localhost:8080/classify"
            "#,
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.capture_interval_minutes, 10);
        assert_eq!(config.excluded_apps, vec!["1Password", "Keychain"]);
        assert_eq!(config.projects.len(), 1);
        assert_eq!(config.projects[0].id, "tempo");
        assert_eq!(config.classifier.provider, Provider::Proxy);
        assert!(config.classifier.attach_screenshots);
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = ClassifierConfig {
            api_key: Some("sk-secret".to_string()),
            ..ClassifierConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[redacted]"));
    }

    #[test]
    fn no_api_key_means_no_classifier() {
        let config = Config::default();
        assert!(config.classifier().unwrap().is_none());
    }
}
