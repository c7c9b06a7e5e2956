//! Log source configuration.
//!
//! Grounded in `LogSourceOptions` / `log_source_options_defaults` /
//! `log_source_options_init` in `lib/logsource.c`: three of the mangle flags are
//! tri-state (unset / false / true) so an unset source-level flag can inherit a
//! config-file-level default; everything else is a plain value with a fixed default.

use serde::Deserialize;

use crate::error::{ConfigurationSnafu, CoreError};
use snafu::ensure;

/// Threshold controlling whether the source registers the dynamic, per-sender
/// counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StatsLevel {
    #[default]
    Normal,
    Full,
}

/// How the ack tracker for this source is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AckTrackingPolicy {
    /// `pos_tracking = false`: the unreliable, early-ack tracker.
    EarlyAck,
    /// `pos_tracking = true, dynamic_window = false`: the fixed-capacity ring.
    LateAckStatic,
    /// `pos_tracking = true, dynamic_window = true`: the unbounded list.
    LateAckDynamic,
}

/// Runtime-immutable options for a single log source, resolved once at `init` and
/// never mutated afterward.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LogSourceOptions {
    pub ack_tracking: AckTrackingPolicy,

    /// Initial flow-control credit; also the static store's ring capacity.
    pub init_window_size: i64,

    /// `None` means "inherit the config-file-level default" (the tri-state `-1` in
    /// the original).
    pub keep_hostname: Option<bool>,
    pub chain_hostnames: Option<bool>,
    pub keep_timestamp: Option<bool>,

    pub program_override: Option<String>,
    pub host_override: Option<String>,

    pub tags: Vec<String>,

    /// The source group's display name, used as the `HOST` prefix in the `local`
    /// branch of hostname chaining (`logsource.h`'s `group_name`, distinct from
    /// `source_group_tag` below -- see `lib/logsource.c:189`).
    #[serde(default)]
    pub group_name: String,

    /// The tag appended to every message's tag list to identify the declared
    /// source group (`logsource.h`'s `source_group_tag`, distinct from
    /// `group_name` above -- see `lib/logsource.c:375`).
    pub source_group_tag: Option<String>,

    #[serde(default)]
    pub stats_level: StatsLevel,
}

impl LogSourceOptions {
    /// Mirrors `log_source_options_defaults` in `lib/logsource.c`.
    pub fn builder() -> LogSourceOptionsBuilder {
        LogSourceOptionsBuilder::default()
    }

    /// Rejects combinations that cannot be made to work at runtime. Called once, at
    /// source construction, so that invalid configuration never reaches the ack
    /// tracker or flow-control window.
    pub fn validate(&self) -> Result<(), CoreError> {
        ensure!(
            self.init_window_size > 0,
            ConfigurationSnafu {
                reason: format!(
                    "init_window_size must be positive, got {}",
                    self.init_window_size
                ),
            }
        );
        ensure!(
            self.ack_tracking != AckTrackingPolicy::LateAckStatic || self.init_window_size <= i64::from(u32::MAX),
            ConfigurationSnafu {
                reason: "init_window_size is too large to size a static ring buffer".to_string(),
            }
        );
        Ok(())
    }
}

/// Builder mirroring the original's "unresolved until config-level defaults are
/// folded in" tri-state fields.
pub struct LogSourceOptionsBuilder {
    ack_tracking: AckTrackingPolicy,
    init_window_size: i64,
    keep_hostname: Option<bool>,
    chain_hostnames: Option<bool>,
    keep_timestamp: Option<bool>,
    program_override: Option<String>,
    host_override: Option<String>,
    tags: Vec<String>,
    group_name: String,
    source_group_tag: Option<String>,
    stats_level: StatsLevel,
}

impl Default for LogSourceOptionsBuilder {
    fn default() -> Self {
        Self {
            ack_tracking: AckTrackingPolicy::EarlyAck,
            init_window_size: 100,
            keep_hostname: None,
            chain_hostnames: None,
            keep_timestamp: None,
            program_override: None,
            host_override: None,
            tags: Vec::new(),
            group_name: String::new(),
            source_group_tag: None,
            stats_level: StatsLevel::Normal,
        }
    }
}

impl LogSourceOptionsBuilder {
    pub fn ack_tracking(mut self, policy: AckTrackingPolicy) -> Self {
        self.ack_tracking = policy;
        self
    }

    pub fn init_window_size(mut self, size: i64) -> Self {
        self.init_window_size = size;
        self
    }

    pub fn keep_hostname(mut self, value: bool) -> Self {
        self.keep_hostname = Some(value);
        self
    }

    pub fn chain_hostnames(mut self, value: bool) -> Self {
        self.chain_hostnames = Some(value);
        self
    }

    pub fn keep_timestamp(mut self, value: bool) -> Self {
        self.keep_timestamp = Some(value);
        self
    }

    pub fn program_override(mut self, value: impl Into<String>) -> Self {
        self.program_override = Some(value.into());
        self
    }

    pub fn host_override(mut self, value: impl Into<String>) -> Self {
        self.host_override = Some(value.into());
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn group_name(mut self, value: impl Into<String>) -> Self {
        self.group_name = value.into();
        self
    }

    pub fn source_group_tag(mut self, value: impl Into<String>) -> Self {
        self.source_group_tag = Some(value.into());
        self
    }

    pub fn stats_level(mut self, level: StatsLevel) -> Self {
        self.stats_level = level;
        self
    }

    /// Folds in config-file-level defaults for any tri-state flag left unset
    /// (`log_source_options_init`'s `if (options->keep_hostname == -1) ...`), then
    /// validates the result.
    pub fn build(self, config_defaults: &ConfigDefaults) -> Result<LogSourceOptions, CoreError> {
        let options = LogSourceOptions {
            ack_tracking: self.ack_tracking,
            init_window_size: self.init_window_size,
            keep_hostname: Some(self.keep_hostname.unwrap_or(config_defaults.keep_hostname)),
            chain_hostnames: Some(self.chain_hostnames.unwrap_or(config_defaults.chain_hostnames)),
            keep_timestamp: Some(self.keep_timestamp.unwrap_or(config_defaults.keep_timestamp)),
            program_override: self.program_override,
            host_override: self.host_override,
            tags: self.tags,
            group_name: self.group_name,
            source_group_tag: self.source_group_tag,
            stats_level: self.stats_level,
        };
        options.validate()?;
        Ok(options)
    }
}

/// The config-file-level defaults an unset per-source tri-state flag inherits from
/// (`cfg->keep_hostname` and friends in `log_source_options_init`).
#[derive(Debug, Clone, Copy)]
pub struct ConfigDefaults {
    pub keep_hostname: bool,
    pub chain_hostnames: bool,
    pub keep_timestamp: bool,
}

impl Default for ConfigDefaults {
    fn default() -> Self {
        Self {
            keep_hostname: false,
            chain_hostnames: false,
            keep_timestamp: true,
        }
    }
}
