use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::{DrawError, Error, Result};
use crate::giveaway::strategies::base::{DrawOptions, DrawSelection, DrawStrategy};

// Seeded without-replacement selection. The seed comes from the giveaway
// id and the draw timestamp, so a recorded draw can be replayed from the
// audit trail and produces the same winners from the same entry set.
#[derive(Debug)]
pub struct SeededDrawStrategy;

impl SeededDrawStrategy {
    pub fn new() -> Self {
        SeededDrawStrategy {}
    }

    fn check_enough_entries(&self, options: &DrawOptions) -> Result<()> {
        let eligible = options.entries().len() as u32;
        let required = options.giveaway().winners_count;
        if eligible < required {
            return Err(Error::from(DrawError::NotEnoughEligible { eligible, required }));
        }

        Ok(())
    }
}

impl DrawStrategy for SeededDrawStrategy {
    fn draw(&self, options: &DrawOptions) -> Result<DrawSelection> {
        // Partial draws are refused outright: the owner either lowers the
        // winner count or waits for more eligible entries.
        self.check_enough_entries(options)?;

        let seed = derive_seed(options.giveaway().id, options.drawn_at());
        let mut rng = StdRng::seed_from_u64(seed);
        let mut pool = options.entries().to_vec();
        let count = options.giveaway().winners_count as usize;
        let (winners, _) = pool.partial_shuffle(&mut rng, count);

        Ok(DrawSelection {
            seed,
            winners: winners.to_vec(),
        })
    }
}

fn derive_seed(giveaway_id: i64, drawn_at: DateTime<Utc>) -> u64 {
    (giveaway_id as u64) ^ (drawn_at.timestamp_millis() as u64)
}
