use crate::db::models::{GiveawayRow, WinnerRow};
use crate::giveaway::models::ChatRef;

// Stylized prints for the channel audience: the giveaway announcement the
// buttons are attached to and the final results post. Both render as
// Telegram HTML, so user text has to be escaped on the way in.
pub struct ChannelPostFormatter;

impl ChannelPostFormatter {
    pub fn new() -> Self {
        ChannelPostFormatter {}
    }

    pub fn giveaway_post(&self, giveaway: &GiveawayRow, sponsors: &[ChatRef]) -> String {
        let mut lines = vec![
            format!("🎁 <b>{}</b>", escape_html(&giveaway.prize)),
            String::new(),
            format!("Winners to draw: {}", giveaway.winners_count),
        ];
        if !sponsors.is_empty() {
            lines.push("To participate, stay subscribed to:".to_string());
            for sponsor in sponsors {
                lines.push(format!("• {}", sponsor));
            }
        }
        if let Some(ends_at) = giveaway.ends_at {
            lines.push(format!("Ends at {}.", ends_at.format("%Y-%m-%d %H:%M UTC")));
        }
        lines.push(String::new());
        lines.push("Press Join to enter, then Check to verify your subscriptions.".to_string());
        lines.join("\n")
    }

    pub fn results_post(&self, giveaway: &GiveawayRow, winners: &[WinnerRow]) -> String {
        let mut lines = vec![
            format!("🏆 Results: <b>{}</b>", escape_html(&giveaway.prize)),
            String::new(),
        ];
        for winner in winners {
            lines.push(format!("{}. {}", winner.rank, mention(winner)));
        }
        if let Some(seed) = giveaway.seed() {
            lines.push(String::new());
            lines.push(format!("Draw seed: <code>{}</code>", seed));
        }
        lines.join("\n")
    }
}

fn mention(winner: &WinnerRow) -> String {
    match &winner.username {
        Some(username) => format!("@{}", escape_html(username)),
        None => format!(
            "<a href=\"tg://user?id={}\">participant {}</a>",
            winner.user_id, winner.user_id
        ),
    }
}

pub(crate) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
