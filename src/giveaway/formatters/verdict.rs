// Special module that contains various
// formatters for the eligibility verdicts
use crate::giveaway::formatters::base::VerdictFormatter;
use crate::giveaway::models::{ChatRef, MembershipState, Verdict};

pub struct DefaultVerdictFormatter;

impl DefaultVerdictFormatter {
    pub fn new() -> Self {
        DefaultVerdictFormatter {}
    }

    // Names the blocking chat in a way the participant can act on. Private
    // chats are only known by numeric id, which means nothing to the user.
    fn blocker_name(&self, verdict: &Verdict) -> String {
        match &verdict.first_blocker {
            Some(ChatRef::Handle(handle)) => format!("@{}", handle),
            Some(ChatRef::Id(_)) | None => "one of the required chats".to_string(),
        }
    }

    fn state_mark(&self, state: MembershipState) -> &'static str {
        match state {
            MembershipState::Member => "✅",
            MembershipState::NotMember => "❌",
            MembershipState::Unknown => "❓",
        }
    }
}

impl VerdictFormatter for DefaultVerdictFormatter {
    fn participant_reply(&self, verdict: &Verdict) -> String {
        if verdict.busy {
            return "⏳ Your previous check is still running. Try again in a few seconds."
                .to_string();
        }
        if verdict.eligible {
            return "✅ You are in! Every subscription checks out.".to_string();
        }
        match verdict.unknown {
            true => format!(
                "❓ Can't verify your subscription to {} right now. Try again in a moment.",
                self.blocker_name(verdict)
            ),
            false => format!(
                "❌ You are not subscribed to {}. Subscribe and press the check button again.",
                self.blocker_name(verdict)
            ),
        }
    }

    fn owner_report(&self, verdict: &Verdict) -> String {
        if verdict.busy {
            return format!(
                "A check for user {} is currently in flight. Ask again in a few seconds.",
                verdict.user_id
            );
        }

        let headline = match (verdict.eligible, verdict.unknown) {
            (true, _) => "eligible",
            (false, true) => "unverifiable",
            (false, false) => "not eligible",
        };
        let mut lines = vec![format!(
            "User {} is {} (checked at {}).",
            verdict.user_id,
            headline,
            verdict.checked_at.format("%Y-%m-%d %H:%M:%S UTC")
        )];
        for result in &verdict.results {
            lines.push(format!(
                "{} {} -> {}",
                self.state_mark(result.state),
                result.chat,
                result.state.as_str()
            ));
        }
        lines.join("\n")
    }
}
