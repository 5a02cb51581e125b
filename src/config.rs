use std::sync::Arc;

/// Immutable configuration snapshot, read once from the environment at
/// startup and shared by reference with every component that needs it.
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token.
    pub discord_token: String,
    /// Path to the SQLite database file.
    pub db_path: String,
    /// Guild ids the process may operate against. Empty means unrestricted.
    pub guild_allowlist: Vec<String>,
    /// Log verbosity used to seed the tracing filter when RUST_LOG is unset.
    pub log_level: String,
    /// When true, all outbound Discord writes are suppressed and reads
    /// return deterministic fixtures. Store paths stay live.
    pub dry_run: bool,
}

impl Config {
    /// Build a config from the process environment.
    ///
    /// Fails fast when `DISCORD_TOKEN` is missing so the operator sees the
    /// problem at startup instead of on the first tool call.
    pub fn from_env() -> anyhow::Result<Arc<Self>> {
        let discord_token = std::env::var("DISCORD_TOKEN").map_err(|_| {
            anyhow::anyhow!(
                "DISCORD_TOKEN environment variable is required.\n\n\
                 Configure your MCP client with:\n\
                 \x20 \"env\": {{\n\
                 \x20   \"DISCORD_TOKEN\": \"your_discord_bot_token_here\",\n\
                 \x20   \"MCP_DISCORD_DB_PATH\": \"/path/to/discord_mcp.db\"\n\
                 \x20 }}"
            )
        })?;

        let db_path =
            std::env::var("MCP_DISCORD_DB_PATH").unwrap_or_else(|_| "discord_mcp.db".to_string());

        let guild_allowlist = std::env::var("GUILD_ALLOWLIST")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();

        let log_level = std::env::var("LOG_LEVEL")
            .unwrap_or_else(|_| "INFO".to_string())
            .to_uppercase();

        let dry_run = std::env::var("DRY_RUN")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
            .unwrap_or(false);

        Ok(Arc::new(Self {
            discord_token,
            db_path,
            guild_allowlist,
            log_level,
            dry_run,
        }))
    }

    /// Whether a guild is permitted. An empty allowlist allows everything.
    pub fn is_guild_allowed(&self, guild_id: &str) -> bool {
        self.guild_allowlist.is_empty() || self.guild_allowlist.iter().any(|g| g == guild_id)
    }
}
