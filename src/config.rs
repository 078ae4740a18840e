use clap::Parser;

use crate::staking::StakePolicy;

/// Football prediction and staking engine
#[derive(Parser, Debug, Clone)]
#[command(name = "footyedge", version, about)]
pub struct Config {
    /// API listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "footyedge.db")]
    pub database_path: String,

    /// SportMonks API base URL
    #[arg(
        long,
        env = "SPORTMONKS_API_URL",
        default_value = "https://api.sportmonks.com/v3/football"
    )]
    pub sportmonks_api_url: String,

    /// SportMonks API token
    #[arg(long, env = "SPORTMONKS_API_TOKEN")]
    pub sportmonks_api_token: Option<String>,

    /// Bankroll owner id (single-operator deployments keep the default)
    #[arg(long, env = "USER_ID", default_value = "default")]
    pub user_id: String,

    /// Starting bankroll, created on first run
    #[arg(long, env = "INITIAL_BANKROLL", default_value = "1000.0")]
    pub initial_bankroll: f64,

    /// Bankroll currency code
    #[arg(long, env = "CURRENCY", default_value = "EUR")]
    pub currency: String,

    /// Default staking policy: kelly or fixed
    #[arg(long, env = "STAKE_POLICY", default_value = "kelly")]
    pub stake_policy: String,

    /// Fractional Kelly multiplier (0.0-1.0)
    #[arg(long, env = "KELLY_FRACTION", default_value = "0.20")]
    pub kelly_fraction: f64,

    /// How far ahead to scan for fixtures, in hours
    #[arg(long, env = "LOOKAHEAD_HOURS", default_value = "72")]
    pub lookahead_hours: i64,

    /// Maximum fixtures evaluated per engine cycle
    #[arg(long, env = "FIXTURE_CAP", default_value = "100")]
    pub fixture_cap: usize,

    /// Run the engine automatically every N minutes (0 disables the scheduler)
    #[arg(long, env = "CYCLE_INTERVAL_MINS", default_value = "0")]
    pub cycle_interval_mins: u64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sportmonks_api_token.is_none() {
            anyhow::bail!("SPORTMONKS_API_TOKEN is required");
        }
        if self.initial_bankroll <= 0.0 {
            anyhow::bail!("initial_bankroll must be positive");
        }
        if !(0.0..=1.0).contains(&self.kelly_fraction) {
            anyhow::bail!("kelly_fraction must be between 0.0 and 1.0");
        }
        if self.lookahead_hours <= 0 {
            anyhow::bail!("lookahead_hours must be positive");
        }
        if self.fixture_cap == 0 {
            anyhow::bail!("fixture_cap must be positive");
        }
        self.parsed_stake_policy()?;
        Ok(())
    }

    pub fn parsed_stake_policy(&self) -> anyhow::Result<StakePolicy> {
        match self.stake_policy.to_lowercase().as_str() {
            "kelly" => Ok(StakePolicy::Kelly),
            "fixed" => Ok(StakePolicy::Fixed),
            other => anyhow::bail!("unknown stake policy '{other}' (expected kelly or fixed)"),
        }
    }
}
