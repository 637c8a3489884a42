//! Runtime configuration
//!
//! Every knob has a sensible default (see the `Default` impls) and can be
//! overridden through `DATAVISOR_*` environment variables:
//!
//! | Variable | Default |
//! |---|---|
//! | `DATAVISOR_BIND` | `0.0.0.0:8080` |
//! | `DATAVISOR_OLLAMA_URL` | `http://localhost:11434` |
//! | `DATAVISOR_MODEL` | `qwen3` |
//! | `DATAVISOR_SANDBOX_URL` | `http://localhost:49983` |
//! | `DATAVISOR_SANDBOX_API_KEY` | unset |
//! | `DATAVISOR_MAX_ITERATIONS` | `15` |
//! | `DATAVISOR_TURN_TIMEOUT_SECS` | `120` |
//! | `DATAVISOR_EXECUTION_TIMEOUT_SECS` | `60` |
//! | `DATAVISOR_RATE_LIMIT` | `20` |
//! | `DATAVISOR_RATE_WINDOW_SECS` | `60` |
//! | `DATAVISOR_OTLP_ENDPOINT` | unset (console logging only) |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound accepted for `max_iterations`.
pub const MAX_ITERATION_CEILING: usize = 25;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Agent loop configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model to request from the LLM service (e.g., "qwen3")
    pub model: String,
    /// Maximum AGENT steps per turn before the turn fails
    pub max_iterations: usize,
    /// Wall-clock budget for one whole turn
    pub turn_timeout: Duration,
    /// Custom system prompt (uses the built-in directives if None)
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "qwen3".to_string(),
            max_iterations: 15,
            turn_timeout: Duration::from_secs(120),
            system_prompt: None,
        }
    }
}

/// Remote sandbox configuration
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Budget for one code run inside the sandbox
    pub execution_timeout: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:49983".to_string(),
            api_key: None,
            execution_timeout: Duration::from_secs(60),
        }
    }
}

/// Fixed-window rate limit applied to turn requests
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 20,
            window: Duration::from_secs(60),
        }
    }
}

/// Top-level configuration for the server binary
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub ollama_url: String,
    pub otlp_endpoint: Option<String>,
    pub agent: AgentConfig,
    pub sandbox: SandboxConfig,
    pub rate_limit: RateLimitConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ollama_url: "http://localhost:11434".to_string(),
            otlp_endpoint: None,
            agent: AgentConfig::default(),
            sandbox: SandboxConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl AppConfig {
    /// Build configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (used by tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = parsed::<SocketAddr, _>(&lookup, "DATAVISOR_BIND")? {
            config.bind_addr = addr;
        }
        if let Some(url) = lookup("DATAVISOR_OLLAMA_URL") {
            config.ollama_url = url;
        }
        if let Some(model) = lookup("DATAVISOR_MODEL") {
            config.agent.model = model;
        }
        config.otlp_endpoint = lookup("DATAVISOR_OTLP_ENDPOINT").filter(|s| !s.is_empty());

        if let Some(url) = lookup("DATAVISOR_SANDBOX_URL") {
            config.sandbox.base_url = url;
        }
        config.sandbox.api_key = lookup("DATAVISOR_SANDBOX_API_KEY").filter(|s| !s.is_empty());

        if let Some(n) = parsed::<usize, _>(&lookup, "DATAVISOR_MAX_ITERATIONS")? {
            if n == 0 || n > MAX_ITERATION_CEILING {
                return Err(ConfigError::Invalid {
                    var: "DATAVISOR_MAX_ITERATIONS",
                    value: n.to_string(),
                    reason: format!("must be between 1 and {}", MAX_ITERATION_CEILING),
                });
            }
            config.agent.max_iterations = n;
        }
        if let Some(secs) = parsed::<u64, _>(&lookup, "DATAVISOR_TURN_TIMEOUT_SECS")? {
            config.agent.turn_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed::<u64, _>(&lookup, "DATAVISOR_EXECUTION_TIMEOUT_SECS")? {
            config.sandbox.execution_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parsed::<u32, _>(&lookup, "DATAVISOR_RATE_LIMIT")? {
            config.rate_limit.max_requests = n;
        }
        if let Some(secs) = parsed::<u64, _>(&lookup, "DATAVISOR_RATE_WINDOW_SECS")? {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    var: "DATAVISOR_RATE_WINDOW_SECS",
                    value: secs.to_string(),
                    reason: "window must be at least one second".to_string(),
                });
            }
            config.rate_limit.window = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn parsed<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                var,
                value: raw,
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.agent.model, "qwen3");
        assert_eq!(config.agent.max_iterations, 15);
        assert_eq!(config.rate_limit.max_requests, 20);
        assert!(config.sandbox.api_key.is_none());
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATAVISOR_MODEL", "llama3.2"),
            ("DATAVISOR_MAX_ITERATIONS", "5"),
            ("DATAVISOR_BIND", "127.0.0.1:9000"),
            ("DATAVISOR_SANDBOX_API_KEY", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.agent.model, "llama3.2");
        assert_eq!(config.agent.max_iterations, 5);
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.sandbox.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_iteration_ceiling_enforced() {
        let err = AppConfig::from_lookup(lookup_from(&[("DATAVISOR_MAX_ITERATIONS", "100")]))
            .unwrap_err();
        assert!(err.to_string().contains("DATAVISOR_MAX_ITERATIONS"));
    }

    #[test]
    fn test_unparseable_value() {
        let err =
            AppConfig::from_lookup(lookup_from(&[("DATAVISOR_RATE_LIMIT", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "DATAVISOR_RATE_LIMIT", .. }));
    }
}
