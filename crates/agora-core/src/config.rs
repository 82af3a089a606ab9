//! Configuration loading and typed config structures for the Agora engine.
//!
//! The canonical configuration lives in `agora-config.yaml` at the project
//! root. Every field has a default, so an empty document (or no file at
//! all) yields a usable configuration.

use std::path::Path;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but holds an unusable value.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgoraConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Command dispatcher settings.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// When the dispatcher refreshes karma.
    #[serde(default)]
    pub karma: KarmaConfig,

    /// Synthetic workload run by the engine binary.
    #[serde(default)]
    pub workload: WorkloadConfig,
}

impl AgoraConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `AGORA_LOG_LEVEL` overrides `logging.level`
    /// - `AGORA_LOG_JSON` overrides `logging.json`
    /// - `AGORA_MAILBOX_CAPACITY` overrides `dispatcher.mailbox_capacity`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml maps an empty document to unit, not to an empty mapping.
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in
    /// production, a map in tests).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if an override does not parse.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("AGORA_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("AGORA_LOG_JSON") {
            self.logging.json = json.parse().map_err(|e| ConfigError::Invalid {
                reason: format!("AGORA_LOG_JSON: {e}"),
            })?;
        }
        if let Some(capacity) = lookup("AGORA_MAILBOX_CAPACITY") {
            self.dispatcher.mailbox_capacity =
                capacity.parse().map_err(|e| ConfigError::Invalid {
                    reason: format!("AGORA_MAILBOX_CAPACITY: {e}"),
                })?;
        }
        Ok(())
    }

    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatcher.mailbox_capacity == 0 {
            return Err(ConfigError::Invalid {
                reason: "dispatcher.mailbox_capacity must be at least 1".to_owned(),
            });
        }
        let w = &self.workload;
        if (w.posts > 0 || w.messages > 0) && w.users == 0 {
            return Err(ConfigError::Invalid {
                reason: "workload.users must be at least 1 when posts or messages are requested"
                    .to_owned(),
            });
        }
        if w.posts > 0 && w.subreddits == 0 {
            return Err(ConfigError::Invalid {
                reason: "workload.subreddits must be at least 1 when posts are requested"
                    .to_owned(),
            });
        }
        if !w.zipf_exponent.is_finite() || w.zipf_exponent <= 0.0 {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "workload.zipf_exponent must be positive and finite, got {}",
                    w.zipf_exponent
                ),
            });
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Command dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DispatcherConfig {
    /// Commands the mailbox buffers before producers wait.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
        }
    }
}

/// Karma refresh policy applied by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct KarmaConfig {
    /// Recompute every user's karma after a successful vote.
    #[serde(default = "default_true")]
    pub recompute_on_vote: bool,

    /// Recompute every user's karma after a successful post.
    #[serde(default = "default_true")]
    pub recompute_on_post: bool,
}

impl Default for KarmaConfig {
    fn default() -> Self {
        Self {
            recompute_on_vote: true,
            recompute_on_post: true,
        }
    }
}

/// Synthetic workload parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkloadConfig {
    /// Random seed for reproducibility.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Users to register and connect.
    #[serde(default = "default_users")]
    pub users: u32,

    /// Subreddits to create.
    #[serde(default = "default_subreddits")]
    pub subreddits: u32,

    /// Posts submitted through the dispatcher, shared among the producers.
    #[serde(default = "default_posts")]
    pub posts: u32,

    /// Private messages to exchange.
    #[serde(default = "default_messages")]
    pub messages: u32,

    /// Newest posts per subreddit that receive one comment each.
    #[serde(default = "default_comments_per_feed")]
    pub comments_per_feed: usize,

    /// Page size of the per-subreddit top-posts summary.
    #[serde(default = "default_feed_limit")]
    pub feed_limit: usize,

    /// Exponent of the Zipf distribution over subreddit popularity.
    #[serde(default = "default_zipf_exponent")]
    pub zipf_exponent: f64,

    /// Producers submitting posts and votes through the dispatcher at once.
    #[serde(default = "default_concurrent_producers")]
    pub concurrent_producers: u32,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            users: default_users(),
            subreddits: default_subreddits(),
            posts: default_posts(),
            messages: default_messages(),
            comments_per_feed: default_comments_per_feed(),
            feed_limit: default_feed_limit(),
            zipf_exponent: default_zipf_exponent(),
            concurrent_producers: default_concurrent_producers(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (required by serde `default = "..."`)
// ---------------------------------------------------------------------------

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_mailbox_capacity() -> usize {
    1024
}

const fn default_true() -> bool {
    true
}

const fn default_seed() -> u64 {
    42
}

const fn default_users() -> u32 {
    100
}

const fn default_subreddits() -> u32 {
    10
}

const fn default_posts() -> u32 {
    500
}

const fn default_messages() -> u32 {
    200
}

const fn default_comments_per_feed() -> usize {
    10
}

const fn default_feed_limit() -> usize {
    10
}

const fn default_zipf_exponent() -> f64 {
    1.1
}

const fn default_concurrent_producers() -> u32 {
    4
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AgoraConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatcher.mailbox_capacity, 1024);
        assert!(config.karma.recompute_on_vote);
        assert_eq!(config.workload.seed, 42);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn empty_document_yields_defaults() {
        let Ok(config) = serde_yml::from_str::<AgoraConfig>("{}") else {
            panic!("empty mapping should parse");
        };
        assert_eq!(config, AgoraConfig::default());
        assert!(AgoraConfig::parse("").is_ok());
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let yaml = include_str!("../../../agora-config.yaml");
        let Ok(config) = serde_yml::from_str::<AgoraConfig>(yaml) else {
            panic!("agora-config.yaml should parse");
        };
        assert_eq!(config, AgoraConfig::default());
    }

    #[test]
    fn parse_partial_yaml() {
        let yaml = r"
dispatcher:
  mailbox_capacity: 8
karma:
  recompute_on_post: false
workload:
  users: 3
  subreddits: 2
  posts: 6
";
        let config: Result<AgoraConfig, _> = serde_yml::from_str(yaml);
        let Ok(config) = config else {
            panic!("yaml should parse");
        };
        assert_eq!(config.dispatcher.mailbox_capacity, 8);
        assert!(config.karma.recompute_on_vote);
        assert!(!config.karma.recompute_on_post);
        assert_eq!(config.workload.users, 3);
        assert_eq!(config.workload.messages, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_mailbox_capacity_rejected() {
        let mut config = AgoraConfig::default();
        config.dispatcher.mailbox_capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn posts_without_users_rejected() {
        let mut config = AgoraConfig::default();
        config.workload.users = 0;
        assert!(config.validate().is_err());
        config.workload.posts = 0;
        config.workload.messages = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn non_positive_zipf_exponent_rejected() {
        let mut config = AgoraConfig::default();
        config.workload.zipf_exponent = 0.0;
        assert!(config.validate().is_err());
        config.workload.zipf_exponent = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let env: BTreeMap<&str, &str> = [
            ("AGORA_LOG_LEVEL", "debug"),
            ("AGORA_LOG_JSON", "true"),
            ("AGORA_MAILBOX_CAPACITY", "16"),
        ]
        .into_iter()
        .collect();
        let mut config = AgoraConfig::default();
        let result = config.apply_env_overrides(|k| env.get(k).map(|v| (*v).to_owned()));
        assert!(result.is_ok());
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.dispatcher.mailbox_capacity, 16);
    }

    #[test]
    fn malformed_env_override_rejected() {
        let mut config = AgoraConfig::default();
        let result = config.apply_env_overrides(|k| {
            (k == "AGORA_MAILBOX_CAPACITY").then(|| "lots".to_owned())
        });
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }
}
