use std::time::Duration;

use clap::Parser;

use crate::error::{ChatError, Result};

#[derive(Debug, Clone, Parser)]
#[command(name = "pairchat-server", about = "Anonymous one-on-one chat pairing server")]
pub struct ServerConfig {
    /// Interface to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Email suffix accepted at login; `*` accepts any address
    #[arg(long, env = "ALLOWED_EMAIL_DOMAIN", default_value = "*")]
    pub allowed_email_domain: String,

    /// Quiet interval after which a typing indicator expires
    #[arg(long, env = "TYPING_QUIET_MS", default_value_t = 3000)]
    pub typing_quiet_ms: u64,

    /// How often the typing sweeper runs
    #[arg(long, env = "SWEEP_INTERVAL_MS", default_value_t = 1000)]
    pub sweep_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_email_domain: "*".to_string(),
            typing_quiet_ms: 3000,
            sweep_interval_ms: 1000,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.typing_quiet_ms == 0 {
            return Err(ChatError::Config("typing quiet interval must be non-zero".into()));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ChatError::Config("sweep interval must be non-zero".into()));
        }
        if self.allowed_email_domain.trim().is_empty() {
            return Err(ChatError::Config("allowed email domain must not be empty".into()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn typing_quiet_interval(&self) -> Duration {
        Duration::from_millis(self.typing_quiet_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
