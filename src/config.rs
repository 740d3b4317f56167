//! Environment configuration.

use std::env;
use std::time::Duration;

use crate::logging::LogFormat;

pub const DEFAULT_CREDENTIAL_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const DEFAULT_CREDENTIAL_PRE_EXPIRY: Duration = Duration::from_millis(60_000);
pub const DEFAULT_CREDENTIAL_MIN_LIFETIME: Duration = Duration::from_millis(30_000);
pub const DEFAULT_SUPERSEDE_WAIT: Duration = Duration::from_millis(2_000);
pub const DEFAULT_CONSOLE_TOOLS: [&str; 2] = ["compileSketch", "uploadSketch"];
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str = "You are an embedded-development assistant \
working inside a sketch editor. Use the available tools to inspect boards, compile, upload, \
and read serial output. Prefer small, verifiable edits to the current sketch and explain tool \
results briefly.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Bounded wait for a GUI-supplied credential.
    pub credential_timeout: Duration,
    /// A cached credential is dropped this long before it really expires.
    pub credential_pre_expiry: Duration,
    pub credential_min_lifetime: Duration,
    /// How long a new turn waits for a superseded turn to finish teardown.
    pub supersede_wait: Duration,
    pub system_instructions: String,
    /// Tools whose output is mirrored to the GUI console.
    pub console_tools: Vec<String>,
    pub log_format: LogFormat,
    pub log_level: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credential_timeout: DEFAULT_CREDENTIAL_TIMEOUT,
            credential_pre_expiry: DEFAULT_CREDENTIAL_PRE_EXPIRY,
            credential_min_lifetime: DEFAULT_CREDENTIAL_MIN_LIFETIME,
            supersede_wait: DEFAULT_SUPERSEDE_WAIT,
            system_instructions: DEFAULT_SYSTEM_INSTRUCTIONS.to_string(),
            console_tools: DEFAULT_CONSOLE_TOOLS.iter().map(|tool| tool.to_string()).collect(),
            log_format: LogFormat::Pretty,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            credential_timeout: env_millis("EMBEDR_CREDENTIAL_TIMEOUT_MS")
                .unwrap_or(defaults.credential_timeout),
            credential_pre_expiry: env_millis("EMBEDR_CREDENTIAL_PRE_EXPIRY_MS")
                .unwrap_or(defaults.credential_pre_expiry),
            credential_min_lifetime: env_millis("EMBEDR_CREDENTIAL_MIN_LIFETIME_MS")
                .unwrap_or(defaults.credential_min_lifetime),
            supersede_wait: env_millis("EMBEDR_SUPERSEDE_WAIT_MS")
                .unwrap_or(defaults.supersede_wait),
            system_instructions: env_string_opt("EMBEDR_SYSTEM_INSTRUCTIONS")
                .unwrap_or(defaults.system_instructions),
            console_tools: env_list("EMBEDR_CONSOLE_TOOLS").unwrap_or(defaults.console_tools),
            log_format: env_string_opt("EMBEDR_LOG_FORMAT")
                .and_then(|value| LogFormat::parse(&value))
                .unwrap_or(defaults.log_format),
            log_level: env_string_opt("EMBEDR_LOG_LEVEL")
                .map(|value| value.trim().to_ascii_lowercase())
                .unwrap_or(defaults.log_level),
        }
    }

    #[must_use]
    pub fn is_console_tool(&self, tool_name: &str) -> bool {
        self.console_tools.iter().any(|tool| tool == tool_name)
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn env_millis(key: &str) -> Option<Duration> {
    let value = env_string_opt(key)?;
    match value.trim().parse::<u64>() {
        Ok(millis) => Some(Duration::from_millis(millis)),
        Err(error) => {
            tracing::warn!(key, value = %value, %error, "ignoring malformed duration");
            None
        }
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    let items: Vec<String> = env_string_opt(key)?
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}
