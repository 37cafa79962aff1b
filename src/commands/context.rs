use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatMemberKind, MessageId, ParseMode, Recipient, UserId};

use crate::db::models::{GiveawayRow, WinnerRow};
use crate::error::{Error, PublishError, Result};
use crate::giveaway::formatters::{ChannelPostFormatter, DefaultVerdictFormatter};
use crate::giveaway::models::{ChatRef, RawMemberStatus};
use crate::giveaway::{GiveawayManager, MembershipApi, ResultsAnnouncer};

// Everything the handlers need, shared once through dptree.
pub struct BotContext {
    pub manager: Arc<GiveawayManager>,
    pub verdicts: DefaultVerdictFormatter,
    pub posts: ChannelPostFormatter,
}

pub type SharedContext = Arc<BotContext>;

impl BotContext {
    pub fn new(manager: Arc<GiveawayManager>) -> Self {
        BotContext {
            manager,
            verdicts: DefaultVerdictFormatter::new(),
            posts: ChannelPostFormatter::new(),
        }
    }
}

// Converts a chat reference into the address form the Bot API accepts.
pub fn recipient(chat: &ChatRef) -> Recipient {
    match chat {
        ChatRef::Id(id) => Recipient::Id(ChatId(*id)),
        ChatRef::Handle(handle) => Recipient::ChannelUsername(format!("@{}", handle)),
    }
}

fn raw_status(kind: &ChatMemberKind) -> RawMemberStatus {
    match kind {
        ChatMemberKind::Owner(_) => RawMemberStatus::Creator,
        ChatMemberKind::Administrator(_) => RawMemberStatus::Administrator,
        ChatMemberKind::Member => RawMemberStatus::Member,
        // A restricted user may have already left the chat; Telegram keeps
        // the restriction record around either way.
        ChatMemberKind::Restricted(restricted) => match restricted.is_member {
            true => RawMemberStatus::Restricted,
            false => RawMemberStatus::Left,
        },
        ChatMemberKind::Left => RawMemberStatus::Left,
        ChatMemberKind::Banned(_) => RawMemberStatus::Kicked,
    }
}

// The live Bot API answering membership questions for the oracle.
pub struct TelegramMembershipApi {
    bot: Bot,
}

impl TelegramMembershipApi {
    pub fn new(bot: Bot) -> Self {
        TelegramMembershipApi { bot }
    }
}

#[async_trait]
impl MembershipApi for TelegramMembershipApi {
    async fn member_status(&self, chat: &ChatRef, user_id: i64) -> Result<RawMemberStatus> {
        let member = self
            .bot
            .get_chat_member(recipient(chat), UserId(user_id as u64))
            .await?;
        Ok(raw_status(&member.kind))
    }
}

// Sends the winners announcement into the giveaway's channel, replying to
// the original giveaway post when it is known.
pub struct TelegramAnnouncer {
    bot: Bot,
    posts: ChannelPostFormatter,
}

impl TelegramAnnouncer {
    pub fn new(bot: Bot) -> Self {
        TelegramAnnouncer {
            bot,
            posts: ChannelPostFormatter::new(),
        }
    }
}

#[async_trait]
impl ResultsAnnouncer for TelegramAnnouncer {
    async fn announce(&self, giveaway: &GiveawayRow, winners: &[WinnerRow]) -> Result<i64> {
        let chat_id = giveaway
            .published_chat_id
            .ok_or(Error::Publish(PublishError::MissingChannel))?;
        let text = self.posts.results_post(giveaway, winners);

        let mut request = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html);
        if let Some(message_id) = giveaway.published_message_id {
            request = request.reply_to_message_id(MessageId(message_id as i32));
        }
        let message = request.await?;
        Ok(message.id.0 as i64)
    }
}
