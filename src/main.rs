pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod giveaway;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use teloxide::prelude::*;
use tracing::{info, warn};

use crate::cache::{KeyValueStore, MemoryStore, RedisStore};
use crate::commands::{BotContext, TelegramAnnouncer, TelegramMembershipApi};
use crate::config::{BotConfig, EngineConfig};
use crate::db::{AuditLog, EntryStore, GiveawayStore, establish_pool};
use crate::giveaway::strategies::SeededDrawStrategy;
use crate::giveaway::{
    CheckCoordinator, EligibilityEvaluator, EntryLedger, GiveawayController, GiveawayManager,
    MembershipOracle,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = BotConfig::from_env().expect("Incomplete bot configuration");
    let engine_config = EngineConfig::default();

    let pool = establish_pool(&config.database_url)
        .await
        .expect("Cannot open the giveaway database");

    // With several bot instances the locks and verdict caches have to be
    // shared, which is what the Redis store is for.
    let store: Arc<dyn KeyValueStore> = match &config.redis_url {
        Some(url) => {
            let redis = RedisStore::connect(url)
                .await
                .expect("Cannot connect to Redis");
            info!("using the Redis store for locks and verdicts");
            Arc::new(redis)
        }
        None => Arc::new(MemoryStore::new()),
    };

    let bot = Bot::new(&config.token);

    let giveaways = GiveawayStore::new(pool.clone());
    let ledger = Arc::new(EntryLedger::new(
        EntryStore::new(pool.clone()),
        AuditLog::new(pool.clone()),
    ));
    let oracle = MembershipOracle::new(
        Arc::new(TelegramMembershipApi::new(bot.clone())),
        store.clone(),
        &engine_config,
    );
    let evaluator = EligibilityEvaluator::new(oracle, &engine_config);
    let coordinator = CheckCoordinator::new(evaluator, ledger.clone(), store, &engine_config);
    let controller = GiveawayController::new(
        giveaways.clone(),
        ledger.clone(),
        AuditLog::new(pool),
        Box::new(SeededDrawStrategy::new()),
        Arc::new(TelegramAnnouncer::new(bot.clone())),
        &engine_config,
    );
    let manager = Arc::new(GiveawayManager::new(
        giveaways,
        ledger,
        coordinator,
        controller,
    ));

    tokio::spawn(run_sweeper(manager.clone(), engine_config.sweeper_period));

    let context = Arc::new(BotContext::new(manager));

    info!("starting the giveaway bot");
    Dispatcher::builder(bot, commands::schema())
        .dependencies(dptree::deps![context])
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

// Closes giveaways whose deadline has passed while nobody was looking.
async fn run_sweeper(manager: Arc<GiveawayManager>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        match manager.end_overdue_giveaways(Utc::now()).await {
            Ok(ended) if !ended.is_empty() => {
                info!(count = ended.len(), "closed overdue giveaways");
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "the deadline sweep failed"),
        }
    }
}
