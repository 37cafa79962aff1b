use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

// Checking more chats than this in parallel starts to bite into the
// Bot API rate budget, so longer sponsor lists fall back to the
// sequential fail-fast path.
pub const PARALLEL_CHECK_LIMIT: usize = 9;

// Tunables of the eligibility engine. The defaults balance the Telegram
// rate-limit profile against how quickly a "just subscribed" user
// expects the bot to notice; correctness does not depend on the exact
// values.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    // How long a confirmed membership stays cached. Subscribers rarely
    // leave mid-giveaway, so this one is generous.
    pub member_ok_ttl: Duration,
    // How long a "not a member" / "can't tell" answer stays cached. Kept
    // very short so a user who subscribes right after a failed check
    // passes the next one almost immediately.
    pub member_miss_ttl: Duration,
    // Lifetime of the per-(giveaway, user) check lock. Also the upper
    // bound on how long a crashed check can wedge the pair.
    pub check_lock_ttl: Duration,
    // Lifetime of a cached eligible verdict.
    pub verdict_ok_ttl: Duration,
    // Lifetime of a cached non-eligible verdict.
    pub verdict_miss_ttl: Duration,
    // Lifetime of the in-process fast-path lock taken around publishing.
    pub publish_lock_ttl: Duration,
    // Sponsor-list size up to which the evaluator queries all chats
    // concurrently instead of sequentially.
    pub parallel_check_limit: usize,
    // How often the background sweeper looks for overdue giveaways.
    pub sweeper_period: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            member_ok_ttl: Duration::from_secs(30 * 60),
            member_miss_ttl: Duration::from_secs(5),
            check_lock_ttl: Duration::from_secs(15),
            verdict_ok_ttl: Duration::from_secs(60),
            verdict_miss_ttl: Duration::from_secs(10),
            publish_lock_ttl: Duration::from_secs(30),
            parallel_check_limit: PARALLEL_CHECK_LIMIT,
            sweeper_period: Duration::from_secs(60),
        }
    }
}

// Process-level settings, read once at startup.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub database_url: String,
    // When set, the check locks and verdict caches live in Redis and are
    // shared across bot instances; otherwise they stay in-process.
    pub redis_url: Option<String>,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        let token = env::var("TELOXIDE_TOKEN")
            .map_err(|_| Error::Giveaway("TELOXIDE_TOKEN is not set.".to_string()))?;
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://skylark.db".to_string());
        let redis_url = env::var("REDIS_URL").ok();

        Ok(BotConfig {
            token,
            database_url,
            redis_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::{EngineConfig, PARALLEL_CHECK_LIMIT};

    #[test]
    fn test_default_ttls_are_asymmetric() {
        let config = EngineConfig::default();

        assert_eq!(config.member_ok_ttl > config.member_miss_ttl, true);
        assert_eq!(config.verdict_ok_ttl > config.verdict_miss_ttl, true);
        assert_eq!(config.member_miss_ttl < Duration::from_secs(10), true);
    }

    #[test]
    fn test_default_parallel_limit() {
        let config = EngineConfig::default();

        assert_eq!(config.parallel_check_limit, PARALLEL_CHECK_LIMIT);
    }

    #[test]
    fn test_sweeper_period_is_an_engine_tunable() {
        let config = EngineConfig {
            sweeper_period: Duration::from_millis(10),
            ..EngineConfig::default()
        };

        assert_eq!(config.sweeper_period, Duration::from_millis(10));
        assert_eq!(
            EngineConfig::default().sweeper_period,
            Duration::from_secs(60)
        );
    }
}
