use chrono::Utc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};
use teloxide::utils::command::BotCommands;
use tracing::{info, instrument, warn};

use crate::commands::callbacks::handle_callback_query;
use crate::commands::context::{recipient, SharedContext};
use crate::commands::parser;
use crate::db::models::{AuditRow, GiveawayRow, GiveawayStatus, WinnerRow};
use crate::error::{Error, Result};
use crate::giveaway::formatters::post::escape_html;
use crate::giveaway::formatters::VerdictFormatter;
use crate::giveaway::models::{ChatRef, PublishOutcome};

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Giveaway management commands:")]
pub enum Command {
    #[command(description = "show this help message.")]
    Help,
    #[command(description = "list your giveaways.")]
    Giveaways,
    #[command(description = "create a giveaway: /new <winners> <prize>.")]
    New(String),
    #[command(description = "set sponsor chats: /sponsors <id> <@chat ...>.")]
    Sponsors(String),
    #[command(description = "set or remove the deadline: /deadline <id> <30m|12h|2d|off>.")]
    Deadline(String),
    #[command(description = "post the giveaway: /post <id> <@channel>.")]
    Post(String),
    #[command(description = "close the entries early: /end <id>.")]
    End(String),
    #[command(description = "draw the winners: /draw <id>.")]
    Draw(String),
    #[command(description = "publish the results: /publish <id>.")]
    Publish(String),
    #[command(description = "show a giveaway status: /status <id>.")]
    Status(String),
    #[command(description = "show the recent audit records: /log <id>.")]
    Log(String),
    #[command(description = "explain a participant's verdict: /whynot <id> <user id>.")]
    Whynot(String),
    #[command(description = "cancel a giveaway: /cancel <id>.")]
    Cancel(String),
    #[command(description = "delete a draft or cancelled giveaway: /delete <id>.")]
    Delete(String),
}

// Wires the command and button handlers into one update tree.
pub fn schema() -> UpdateHandler<Error> {
    let messages = Update::filter_message().branch(
        dptree::entry()
            .filter_command::<Command>()
            .endpoint(handle_command),
    );
    let callbacks = Update::filter_callback_query().endpoint(handle_callback_query);

    dptree::entry().branch(messages).branch(callbacks)
}

#[instrument(skip(bot, message, context))]
async fn handle_command(
    bot: Bot,
    message: Message,
    command: Command,
    context: SharedContext,
) -> Result<()> {
    let user_id = match message.from() {
        Some(user) => user.id.0 as i64,
        None => return Ok(()),
    };
    info!(user_id, command = ?command, "got command");

    let reply = match run_command(&bot, &context, user_id, command).await {
        Ok(reply) => reply,
        Err(err) => error_reply(err),
    };
    bot.send_message(message.chat.id, reply)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

async fn run_command(
    bot: &Bot,
    context: &SharedContext,
    user_id: i64,
    command: Command,
) -> Result<String> {
    match command {
        Command::Help => Ok(help_text()),
        Command::Giveaways => list_giveaways(context, user_id).await,
        Command::New(args) => create_giveaway(context, user_id, &args).await,
        Command::Sponsors(args) => set_sponsors(context, user_id, &args).await,
        Command::Deadline(args) => set_deadline(context, user_id, &args).await,
        Command::Post(args) => post_giveaway(bot, context, user_id, &args).await,
        Command::End(args) => end_giveaway(context, user_id, &args).await,
        Command::Draw(args) => draw_winners(context, user_id, &args).await,
        Command::Publish(args) => publish_results(context, user_id, &args).await,
        Command::Status(args) => status_report(context, user_id, &args).await,
        Command::Log(args) => audit_log(context, user_id, &args).await,
        Command::Whynot(args) => whynot(context, user_id, &args).await,
        Command::Cancel(args) => cancel_giveaway(context, user_id, &args).await,
        Command::Delete(args) => delete_giveaway(context, user_id, &args).await,
    }
}

// Turns an operation failure into the text the user sees. Anything that is
// not a domain refusal stays out of the chat.
pub(crate) fn error_reply(err: Error) -> String {
    match err {
        Error::Giveaway(message) => message,
        Error::Draw(err) => err.to_string(),
        Error::Publish(err) => err.to_string(),
        err => {
            warn!(error = %err, "command failed");
            "Something went wrong, please try again later.".to_string()
        }
    }
}

fn help_text() -> String {
    let mut text = Command::descriptions().to_string();
    text.push_str("\n\nParticipants enter through the buttons under the giveaway post.");
    text
}

async fn list_giveaways(context: &SharedContext, user_id: i64) -> Result<String> {
    let giveaways = context
        .manager
        .get_giveaways(user_id)
        .await?
        .iter()
        .map(summary_line)
        .collect::<Vec<String>>();

    let content = match giveaways.len() {
        0 => "You have no giveaways yet. Create one with /new.".to_string(),
        _ => giveaways.join("\n"),
    };
    Ok(content)
}

async fn create_giveaway(context: &SharedContext, user_id: i64, args: &str) -> Result<String> {
    let (winners_count, prize) = parser::parse_new_args(args)?;
    let giveaway = context
        .manager
        .create_giveaway(user_id, &prize, winners_count)
        .await?;
    Ok(format!(
        "Created giveaway #{id}. Add sponsors with /sponsors {id} <@chat ...> \
         and make it live with /post {id} <@channel>.",
        id = giveaway.id
    ))
}

async fn set_sponsors(context: &SharedContext, user_id: i64, args: &str) -> Result<String> {
    let (giveaway_id, raw_chats) = parser::parse_sponsors_args(args)?;
    let chats = context
        .manager
        .set_sponsors(user_id, giveaway_id, &raw_chats)
        .await?;

    let content = match chats.len() {
        0 => "The sponsor list is now empty.".to_string(),
        _ => {
            let list = chats
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<String>>()
                .join(", ");
            format!("Sponsor chats: {}.", list)
        }
    };
    Ok(content)
}

async fn set_deadline(context: &SharedContext, user_id: i64, args: &str) -> Result<String> {
    let (giveaway_id, offset) = parser::parse_deadline_args(args)?;
    let ends_at = offset.map(|offset| Utc::now() + offset);
    context
        .manager
        .set_deadline(user_id, giveaway_id, ends_at)
        .await?;

    let content = match ends_at {
        Some(at) => format!("The giveaway ends at {} UTC.", at.format("%Y-%m-%d %H:%M")),
        None => "The deadline is removed.".to_string(),
    };
    Ok(content)
}

// Posts the announcement with the Join/Check buttons into the channel and
// flips the giveaway to active once the post is up.
async fn post_giveaway(
    bot: &Bot,
    context: &SharedContext,
    user_id: i64,
    args: &str,
) -> Result<String> {
    let (giveaway_id, channel) = parser::parse_post_args(args)?;
    let channel = ChatRef::parse(channel)?;
    let giveaway = context.manager.giveaway_for_owner(user_id, giveaway_id).await?;
    if giveaway.status != GiveawayStatus::Draft {
        let message = format!("Only a draft giveaway can be posted.");
        return Err(Error::Giveaway(message));
    }

    let sponsors = context.manager.sponsor_chats(giveaway_id).await?;
    let text = context.posts.giveaway_post(&giveaway, &sponsors);
    let posted = bot
        .send_message(recipient(&channel), text)
        .parse_mode(ParseMode::Html)
        .reply_markup(entry_keyboard(giveaway_id))
        .await?;

    let activated = context
        .manager
        .activate_giveaway(user_id, giveaway_id, posted.chat.id.0, posted.id.0 as i64)
        .await?;
    let content = match activated {
        true => format!("The giveaway is live in {}.", channel),
        false => "The post is up, but the giveaway was already activated elsewhere.".to_string(),
    };
    Ok(content)
}

async fn end_giveaway(context: &SharedContext, user_id: i64, args: &str) -> Result<String> {
    let giveaway_id = parser::parse_giveaway_id(args)?;
    let content = match context.manager.end_giveaway(user_id, giveaway_id).await? {
        true => format!("Entries are closed. Draw the winners with /draw {}.", giveaway_id),
        false => "This giveaway is not active.".to_string(),
    };
    Ok(content)
}

async fn draw_winners(context: &SharedContext, user_id: i64, args: &str) -> Result<String> {
    let giveaway_id = parser::parse_giveaway_id(args)?;
    let report = context.manager.draw_winners(user_id, giveaway_id).await?;
    Ok(format!(
        "🏆 Drew {} of {} eligible entries: {}.\nPublish the results with /publish {}.",
        report.winners.len(),
        report.eligible_count,
        winners_line(&report.winners),
        giveaway_id
    ))
}

async fn publish_results(context: &SharedContext, user_id: i64, args: &str) -> Result<String> {
    let giveaway_id = parser::parse_giveaway_id(args)?;
    let content = match context.manager.publish_results(user_id, giveaway_id).await? {
        PublishOutcome::Published { .. } => "The results are published. 🎉".to_string(),
        PublishOutcome::AlreadyPublishing => {
            "A publish for this giveaway is already in flight.".to_string()
        }
        PublishOutcome::AlreadyPublished { .. } => {
            "The results were already published.".to_string()
        }
    };
    Ok(content)
}

async fn status_report(context: &SharedContext, user_id: i64, args: &str) -> Result<String> {
    let giveaway_id = parser::parse_giveaway_id(args)?;
    let giveaway = context.manager.giveaway_for_owner(user_id, giveaway_id).await?;
    let sponsors = context.manager.sponsor_chats(giveaway_id).await?;
    let (total, eligible) = context.manager.entry_counts(giveaway_id).await?;
    let winners = context.manager.winners(giveaway_id).await?;
    Ok(render_status(&giveaway, &sponsors, total, eligible, &winners))
}

async fn audit_log(context: &SharedContext, user_id: i64, args: &str) -> Result<String> {
    let giveaway_id = parser::parse_giveaway_id(args)?;
    let feed = context.manager.audit_feed(user_id, giveaway_id, 15).await?;

    let content = match feed.len() {
        0 => "Nothing has happened yet.".to_string(),
        _ => feed.iter().map(audit_line).collect::<Vec<String>>().join("\n"),
    };
    Ok(content)
}

async fn whynot(context: &SharedContext, user_id: i64, args: &str) -> Result<String> {
    let (giveaway_id, target_user_id) = parser::parse_whynot_args(args)?;
    let verdict = context
        .manager
        .diagnose_user(user_id, giveaway_id, target_user_id)
        .await?;
    Ok(context.verdicts.owner_report(&verdict))
}

async fn cancel_giveaway(context: &SharedContext, user_id: i64, args: &str) -> Result<String> {
    let giveaway_id = parser::parse_giveaway_id(args)?;
    let content = match context.manager.cancel_giveaway(user_id, giveaway_id).await? {
        true => "The giveaway is cancelled.".to_string(),
        false => "This giveaway can no longer be cancelled.".to_string(),
    };
    Ok(content)
}

async fn delete_giveaway(context: &SharedContext, user_id: i64, args: &str) -> Result<String> {
    let giveaway_id = parser::parse_giveaway_id(args)?;
    context.manager.delete_giveaway(user_id, giveaway_id).await?;
    Ok("The giveaway and its records are deleted.".to_string())
}

fn entry_keyboard(giveaway_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("Join 🎉", format!("join:{}", giveaway_id)),
        InlineKeyboardButton::callback("Check ✅", format!("check:{}", giveaway_id)),
    ]])
}

fn summary_line(giveaway: &GiveawayRow) -> String {
    format!(
        "#{} [{}] {}",
        giveaway.id,
        giveaway.status.as_str(),
        escape_html(&giveaway.prize)
    )
}

fn winners_line(winners: &[WinnerRow]) -> String {
    winners
        .iter()
        .map(|winner| match &winner.username {
            Some(username) => format!("@{}", username),
            None => format!("user {}", winner.user_id),
        })
        .collect::<Vec<String>>()
        .join(", ")
}

fn audit_line(row: &AuditRow) -> String {
    let actor = match row.actor_id {
        Some(actor_id) => format!("user {}", actor_id),
        None => "system".to_string(),
    };
    format!(
        "{} {} ({})",
        row.created_at.format("%m-%d %H:%M"),
        row.action.as_str(),
        actor
    )
}

fn render_status(
    giveaway: &GiveawayRow,
    sponsors: &[ChatRef],
    total: u32,
    eligible: u32,
    winners: &[WinnerRow],
) -> String {
    let mut lines = vec![
        format!("📦 <b>{}</b> (#{})", escape_html(&giveaway.prize), giveaway.id),
        format!("Status: {}", giveaway.status.as_str()),
        format!("Entries: {} ({} eligible)", total, eligible),
    ];
    if !sponsors.is_empty() {
        let list = sponsors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<String>>()
            .join(", ");
        lines.push(format!("Sponsors: {}", list));
    }
    match giveaway.ends_at {
        Some(ends_at) => lines.push(format!("Ends at: {} UTC", ends_at.format("%Y-%m-%d %H:%M"))),
        None => lines.push("Ends at: no deadline".to_string()),
    }
    if !winners.is_empty() {
        lines.push(format!("Winners: {}", winners_line(winners)));
    }
    lines.join("\n")
}
