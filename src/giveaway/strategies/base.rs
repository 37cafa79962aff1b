use chrono::{DateTime, Utc};

use crate::db::models::{EntryRow, GiveawayRow};
use crate::error::Result;

pub struct DrawOptions<'a> {
    giveaway: &'a GiveawayRow,
    entries: &'a [EntryRow],
    drawn_at: DateTime<Utc>,
}

impl<'a> DrawOptions<'a> {
    pub fn new(
        giveaway: &'a GiveawayRow,
        entries: &'a [EntryRow],
        drawn_at: DateTime<Utc>,
    ) -> Self {
        DrawOptions {
            giveaway,
            entries,
            drawn_at,
        }
    }

    // Returns the giveaway the draw is running for.
    pub fn giveaway(&self) -> &'a GiveawayRow {
        self.giveaway
    }

    // Returns the eligible entries in their stable draw order.
    pub fn entries(&self) -> &'a [EntryRow] {
        self.entries
    }

    // Returns the instant the draw was requested at.
    pub fn drawn_at(&self) -> DateTime<Utc> {
        self.drawn_at
    }
}

// What a finished selection consists of: the seed it can be replayed
// with and the winners ranked from first to last place.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DrawSelection {
    pub seed: u64,
    pub winners: Vec<EntryRow>,
}

pub trait DrawStrategy: Send + Sync {
    // Returns the ranked winners in according to the passed draw options.
    fn draw(&self, options: &DrawOptions) -> Result<DrawSelection>;
}
