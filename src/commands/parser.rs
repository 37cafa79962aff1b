// Special module that contains parsers for the arguments
// of the owner-facing commands.
use chrono::Duration;

use crate::error::{Error, Result};

// Returns the giveaway identifier from a command that takes nothing else.
pub fn parse_giveaway_id(args: &str) -> Result<i64> {
    let token = match args.split_whitespace().next() {
        Some(token) => token,
        None => {
            let message = format!("Specify the giveaway identifier, e.g. /status 3.");
            return Err(Error::Giveaway(message));
        }
    };
    parse_id_token(token)
}

// Returns the winners count and the prize description for /new.
pub fn parse_new_args(args: &str) -> Result<(u32, String)> {
    let mut tokens = args.split_whitespace();
    let winners = match tokens.next() {
        Some(token) => token.parse::<u32>().map_err(|_| {
            let message = format!("The winners count `{}` is not a number.", token);
            Error::Giveaway(message)
        })?,
        None => {
            let message = format!("Usage: /new <winners> <prize description>.");
            return Err(Error::Giveaway(message));
        }
    };

    let prize = tokens.collect::<Vec<&str>>().join(" ");
    if prize.is_empty() {
        let message = format!("Usage: /new <winners> <prize description>.");
        return Err(Error::Giveaway(message));
    }
    Ok((winners, prize))
}

// Returns the giveaway identifier and the raw sponsor chat tokens. An
// empty tail clears the sponsor list.
pub fn parse_sponsors_args(args: &str) -> Result<(i64, Vec<&str>)> {
    let mut tokens = args.split_whitespace();
    let giveaway_id = match tokens.next() {
        Some(token) => parse_id_token(token)?,
        None => {
            let message = format!("Usage: /sponsors <id> <@chat or chat id> ...");
            return Err(Error::Giveaway(message));
        }
    };
    Ok((giveaway_id, tokens.collect()))
}

// Returns the giveaway identifier and how far from now the deadline is.
// `off` removes the deadline.
pub fn parse_deadline_args(args: &str) -> Result<(i64, Option<Duration>)> {
    let mut tokens = args.split_whitespace();
    let giveaway_id = match tokens.next() {
        Some(token) => parse_id_token(token)?,
        None => {
            let message = format!("Usage: /deadline <id> <30m|12h|2d|off>.");
            return Err(Error::Giveaway(message));
        }
    };
    let deadline = match tokens.next() {
        Some("off") => None,
        Some(token) => Some(parse_duration_token(token)?),
        None => {
            let message = format!("Usage: /deadline <id> <30m|12h|2d|off>.");
            return Err(Error::Giveaway(message));
        }
    };
    Ok((giveaway_id, deadline))
}

// Returns the giveaway identifier and the channel to post into.
pub fn parse_post_args(args: &str) -> Result<(i64, &str)> {
    let mut tokens = args.split_whitespace();
    let giveaway_id = match tokens.next() {
        Some(token) => parse_id_token(token)?,
        None => {
            let message = format!("Usage: /post <id> <@channel or chat id>.");
            return Err(Error::Giveaway(message));
        }
    };
    match tokens.next() {
        Some(channel) => Ok((giveaway_id, channel)),
        None => {
            let message = format!("Usage: /post <id> <@channel or chat id>.");
            Err(Error::Giveaway(message))
        }
    }
}

// Returns the giveaway identifier and the participant to look at.
pub fn parse_whynot_args(args: &str) -> Result<(i64, i64)> {
    let mut tokens = args.split_whitespace();
    let giveaway_id = match tokens.next() {
        Some(token) => parse_id_token(token)?,
        None => {
            let message = format!("Usage: /whynot <id> <user id>.");
            return Err(Error::Giveaway(message));
        }
    };
    match tokens.next() {
        Some(token) => Ok((giveaway_id, parse_id_token(token)?)),
        None => {
            let message = format!("Usage: /whynot <id> <user id>.");
            Err(Error::Giveaway(message))
        }
    }
}

fn parse_id_token(token: &str) -> Result<i64> {
    token.parse::<i64>().map_err(|_| {
        let message = format!("The identifier `{}` is not a number.", token);
        Error::Giveaway(message)
    })
}

fn parse_duration_token(token: &str) -> Result<Duration> {
    let bad_deadline = || {
        let message = format!("The deadline `{}` is not like 30m, 12h or 2d.", token);
        Error::Giveaway(message)
    };

    let (index, unit) = token.char_indices().last().ok_or_else(bad_deadline)?;
    let amount = match token[..index].parse::<i64>() {
        Ok(amount) if amount > 0 => amount,
        _ => return Err(bad_deadline()),
    };
    match unit {
        'm' => Ok(Duration::minutes(amount)),
        'h' => Ok(Duration::hours(amount)),
        'd' => Ok(Duration::days(amount)),
        _ => Err(bad_deadline()),
    }
}
