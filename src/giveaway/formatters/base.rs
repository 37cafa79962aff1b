use crate::giveaway::models::Verdict;

pub trait VerdictFormatter {
    // Returns the short answer for the participant who pressed a button:
    // eligible, not eligible, still checking or can't verify.
    fn participant_reply(&self, verdict: &Verdict) -> String;
    // Returns the detailed per-chat picture for the giveaway owner when
    // necessary to investigate a participant.
    fn owner_report(&self, verdict: &Verdict) -> String;
}
