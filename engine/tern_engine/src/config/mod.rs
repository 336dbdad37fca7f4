//! Host-supplied engine configuration.

use std::time::Duration;

use thiserror::Error;

use tern_alloc::AllocConfig;
use tern_value::UndefinedConstantPolicy;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown configuration directive '{key}'")]
    UnknownDirective { key: String },

    #[error("invalid value '{value}' for '{key}'")]
    InvalidValue { key: String, value: String },

    #[error("memory_limit must be greater than zero")]
    ZeroMemoryLimit,
}

/// Everything the runtime core reads from its host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Per-request memory ceiling in bytes.
    pub memory_limit: usize,
    /// Blocks kept per size-class free list.
    pub cache_capacity: usize,
    /// Number of cached size classes.
    pub cache_classes: usize,
    /// Wall-clock budget per request. `None` disables the timeout.
    pub timeout: Option<Duration>,
    /// Guard bytes around every block, verified on release.
    pub debug_guards: bool,
    pub undefined_constants: UndefinedConstantPolicy,
}

impl EngineConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Build from `key=value` directives, starting from the defaults.
    ///
    /// Recognised keys: `memory_limit`, `max_execution_time`,
    /// `memory_cache_capacity`, `debug_guards`, `undefined_constants`.
    pub fn from_pairs<'s>(
        pairs: impl IntoIterator<Item = (&'s str, &'s str)>,
    ) -> Result<Self, ConfigError> {
        let mut config = EngineConfig::default();
        for (key, value) in pairs {
            config.apply(key, value)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Apply one directive.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_owned(),
            value: value.to_owned(),
        };
        let value = value.trim();
        match key.trim() {
            "memory_limit" => {
                self.memory_limit = parse_byte_size(value).ok_or_else(invalid)?;
            }
            "max_execution_time" => {
                let seconds: u64 = value.parse().map_err(|_| invalid())?;
                self.timeout = (seconds > 0).then_some(Duration::from_secs(seconds));
            }
            "memory_cache_capacity" => {
                self.cache_capacity = value.parse().map_err(|_| invalid())?;
            }
            "debug_guards" => {
                self.debug_guards = parse_flag(value).ok_or_else(invalid)?;
            }
            "undefined_constants" => {
                self.undefined_constants = match value.to_ascii_lowercase().as_str() {
                    "error" => UndefinedConstantPolicy::Error,
                    "assume_name" => UndefinedConstantPolicy::AssumeName,
                    _ => return Err(invalid()),
                };
            }
            other => {
                return Err(ConfigError::UnknownDirective {
                    key: other.to_owned(),
                })
            }
        }
        tracing::debug!(key, value, "configuration directive applied");
        Ok(())
    }

    /// The allocator's slice of the configuration.
    pub fn alloc(&self) -> AllocConfig {
        AllocConfig {
            memory_limit: self.memory_limit,
            cache_capacity: self.cache_capacity,
            cache_classes: self.cache_classes,
            debug_guards: self.debug_guards,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_limit == 0 {
            return Err(ConfigError::ZeroMemoryLimit);
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            memory_limit: AllocConfig::DEFAULT_MEMORY_LIMIT,
            cache_capacity: AllocConfig::DEFAULT_CACHE_CAPACITY,
            cache_classes: AllocConfig::DEFAULT_CACHE_CLASSES,
            timeout: Some(Self::DEFAULT_TIMEOUT),
            debug_guards: cfg!(debug_assertions),
            undefined_constants: UndefinedConstantPolicy::default(),
        }
    }
}

/// Builder for [`EngineConfig`].
#[derive(Clone, Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn memory_limit(mut self, bytes: usize) -> Self {
        self.config.memory_limit = bytes;
        self
    }

    #[must_use]
    pub fn cache_capacity(mut self, blocks: usize) -> Self {
        self.config.cache_capacity = blocks;
        self
    }

    #[must_use]
    pub fn cache_classes(mut self, classes: usize) -> Self {
        self.config.cache_classes = classes;
        self
    }

    #[must_use]
    pub fn timeout(mut self, budget: Duration) -> Self {
        self.config.timeout = Some(budget);
        self
    }

    #[must_use]
    pub fn no_timeout(mut self) -> Self {
        self.config.timeout = None;
        self
    }

    #[must_use]
    pub fn debug_guards(mut self, enabled: bool) -> Self {
        self.config.debug_guards = enabled;
        self
    }

    #[must_use]
    pub fn undefined_constants(mut self, policy: UndefinedConstantPolicy) -> Self {
        self.config.undefined_constants = policy;
        self
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Parse a byte count with an optional `K`, `M` or `G` suffix.
///
/// `-1` means no limit.
pub fn parse_byte_size(text: &str) -> Option<usize> {
    let text = text.trim();
    if text == "-1" {
        return Some(usize::MAX);
    }
    let (digits, shift) = match text.as_bytes().last()? {
        b'k' | b'K' => (&text[..text.len() - 1], 10),
        b'm' | b'M' => (&text[..text.len() - 1], 20),
        b'g' | b'G' => (&text[..text.len() - 1], 30),
        _ => (text, 0),
    };
    let base: usize = digits.trim().parse().ok()?;
    base.checked_mul(1usize << shift)
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "1" | "on" | "true" | "yes" => Some(true),
        "" | "0" | "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests;
