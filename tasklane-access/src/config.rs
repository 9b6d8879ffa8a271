/// Configuration management for the access core
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `INVITATION_TTL_HOURS`: Lifetime of an invitation token (default: 72)
/// - `INVITE_BASE_URL`: Base of the accept link sent to invitees
///   (default: `http://localhost:3000/invite`)
///
/// # Example
///
/// ```no_run
/// use tasklane_access::config::AccessConfig;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = AccessConfig::from_env()?;
/// println!("Invitations live for {}h", config.invitations.ttl_hours);
/// # Ok(())
/// # }
/// ```

use chrono::Duration;
use std::env;

use crate::db::pool::DatabaseConfig;

/// Default invitation lifetime
pub const DEFAULT_INVITATION_TTL_HOURS: i64 = 72;

/// Default base URL for invitation links
pub const DEFAULT_INVITE_BASE_URL: &str = "http://localhost:3000/invite";

/// Complete access-core configuration
///
/// `Default` leaves the database URL empty and is meant for tests.
#[derive(Debug, Clone, Default)]
pub struct AccessConfig {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Invitation configuration
    pub invitations: InvitationConfig,
}

/// Invitation lifecycle configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationConfig {
    /// Hours from issue (or resend) until a token expires
    pub ttl_hours: i64,

    /// Accept links are `{base_url}/{token}`
    pub base_url: String,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            ttl_hours: DEFAULT_INVITATION_TTL_HOURS,
            base_url: DEFAULT_INVITE_BASE_URL.to_string(),
        }
    }
}

impl InvitationConfig {
    /// Token lifetime as a duration
    pub fn ttl(&self) -> Duration {
        Duration::hours(self.ttl_hours)
    }
}

impl AccessConfig {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// See [`AccessConfig::from_vars`].
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds configuration from a variable lookup
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `DATABASE_URL` is missing
    /// - A numeric variable doesn't parse
    /// - `INVITATION_TTL_HOURS` is not positive
    pub fn from_vars<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = var("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let max_connections = var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse::<u32>()?;

        let ttl_hours = var("INVITATION_TTL_HOURS")
            .unwrap_or_else(|| DEFAULT_INVITATION_TTL_HOURS.to_string())
            .parse::<i64>()?;

        if ttl_hours <= 0 {
            anyhow::bail!("INVITATION_TTL_HOURS must be positive");
        }

        let base_url =
            var("INVITE_BASE_URL").unwrap_or_else(|| DEFAULT_INVITE_BASE_URL.to_string());

        Ok(Self {
            database: DatabaseConfig {
                url: database_url,
                max_connections,
                ..Default::default()
            },
            invitations: InvitationConfig {
                ttl_hours,
                base_url: base_url.trim_end_matches('/').to_string(),
            },
        })
    }
}
