use teloxide::prelude::*;
use tracing::{info, instrument};

use crate::commands::context::SharedContext;
use crate::commands::handlers::error_reply;
use crate::error::Result;
use crate::giveaway::formatters::VerdictFormatter;

#[derive(Debug, Eq, PartialEq)]
enum ButtonAction {
    Join,
    Check,
}

// Returns the action and giveaway behind a button press, or None for
// buttons from another bot era.
fn parse_button(data: &str) -> Option<(ButtonAction, i64)> {
    let parts = data.split(':').collect::<Vec<&str>>();
    match parts.as_slice() {
        ["join", raw_id] => raw_id.parse().ok().map(|id| (ButtonAction::Join, id)),
        ["check", raw_id] => raw_id.parse().ok().map(|id| (ButtonAction::Check, id)),
        _ => None,
    }
}

// Handles presses of the Join/Check buttons under a giveaway post. The
// answer always goes out, otherwise the client keeps its spinner.
#[instrument(skip(bot, query, context))]
pub async fn handle_callback_query(
    bot: Bot,
    query: CallbackQuery,
    context: SharedContext,
) -> Result<()> {
    let user_id = query.from.id.0 as i64;
    let username = query.from.username.as_deref();
    let data = query.data.as_deref().unwrap_or("");

    match parse_button(data) {
        Some((ButtonAction::Join, giveaway_id)) => {
            info!(user_id, giveaway_id, "join button pressed");
            let reply = join_reply(&context, giveaway_id, user_id, username).await;
            bot.answer_callback_query(&query.id).text(reply).await?;
        }
        Some((ButtonAction::Check, giveaway_id)) => {
            info!(user_id, giveaway_id, "check button pressed");
            let reply = check_reply(&context, giveaway_id, user_id, username).await;
            bot.answer_callback_query(&query.id)
                .text(reply)
                .show_alert(true)
                .await?;
        }
        None => {
            bot.answer_callback_query(&query.id).await?;
        }
    }
    Ok(())
}

async fn join_reply(
    context: &SharedContext,
    giveaway_id: i64,
    user_id: i64,
    username: Option<&str>,
) -> String {
    match context
        .manager
        .join_giveaway(giveaway_id, user_id, username)
        .await
    {
        Ok(true) => "🎉 You are in! Press Check ✅ to verify your subscriptions.".to_string(),
        Ok(false) => "You are already in this giveaway.".to_string(),
        Err(err) => error_reply(err),
    }
}

async fn check_reply(
    context: &SharedContext,
    giveaway_id: i64,
    user_id: i64,
    username: Option<&str>,
) -> String {
    match context
        .manager
        .check_eligibility(giveaway_id, user_id, username)
        .await
    {
        Ok(verdict) => context.verdicts.participant_reply(&verdict),
        Err(err) => error_reply(err),
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::callbacks::{ButtonAction, parse_button};

    #[test]
    fn test_parse_button() {
        assert_eq!(parse_button("join:5"), Some((ButtonAction::Join, 5)));
        assert_eq!(parse_button("check:12"), Some((ButtonAction::Check, 12)));
    }

    #[test]
    fn test_parse_button_rejects_garbage() {
        assert_eq!(parse_button(""), None);
        assert_eq!(parse_button("join:soon"), None);
        assert_eq!(parse_button("join:5:extra"), None);
        assert_eq!(parse_button("vote:5"), None);
    }
}
