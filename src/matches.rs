//! Match upsert keyed by external event id, and per-set score extraction.

use anyhow::Result;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::{EventRecord, MatchRecord, ScoreLine, SetScore};
use crate::store::{MatchUpsert, Store};

/// Sets 1 through 5.
pub const MAX_SETS: u8 = 5;

/// Identities an event is linked to, resolved before the match is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchLinks {
    pub tournament_id: Uuid,
    pub season_id: Uuid,
    pub home_team_id: Uuid,
    pub away_team_id: Uuid,
}

pub fn match_record(event: &EventRecord, links: MatchLinks) -> MatchRecord {
    MatchRecord {
        event_id: event.event_id,
        tournament_id: links.tournament_id,
        season_id: links.season_id,
        home_team_id: links.home_team_id,
        away_team_id: links.away_team_id,
        round_name: event.round_name.clone(),
        round_type: event.round_type,
        winner: event.winner,
        status_code: event.status_code,
        status_description: event.status_description.clone(),
        start_timestamp: event.start_time,
        first_to_serve: event.first_to_serve,
    }
}

/// Insert the match, or refresh winner, status and start time of the
/// existing one. Tournament, season and teams of a stored match never change.
pub async fn upsert_match<S: Store + ?Sized>(
    store: &S,
    event: &EventRecord,
    links: MatchLinks,
) -> Result<MatchUpsert> {
    let upsert = store.upsert_match(&match_record(event, links)).await?;
    debug!(
        "Match for event {} {}",
        event.event_id,
        if upsert.created { "created" } else { "refreshed" }
    );
    Ok(upsert)
}

/// Played sets, in order.
///
/// An index is skipped when either side has no score for it. A 0-0 set is
/// indistinguishable from one never played and is skipped too.
pub fn normalize_sets(home: &ScoreLine, away: &ScoreLine) -> Vec<SetScore> {
    (1..=MAX_SETS)
        .filter_map(|set_number| {
            let (home_score, away_score) = (home.set(set_number)?, away.set(set_number)?);
            if home_score == 0 && away_score == 0 {
                return None;
            }
            match (i32::try_from(home_score), i32::try_from(away_score)) {
                (Ok(h), Ok(a)) if h >= 0 && a >= 0 => Some(SetScore {
                    set_number,
                    home_score: h,
                    away_score: a,
                }),
                _ => {
                    warn!(
                        "Ignoring set {} with unusable score {}-{}",
                        set_number, home_score, away_score
                    );
                    None
                }
            }
        })
        .collect()
}

/// Write every played set of the event. Returns how many were written.
pub async fn store_sets<S: Store + ?Sized>(
    store: &S,
    match_id: Uuid,
    event: &EventRecord,
) -> Result<usize> {
    let sets = normalize_sets(&event.home_score, &event.away_score);
    for set in &sets {
        store.upsert_set(match_id, set).await?;
    }
    Ok(sets.len())
}
