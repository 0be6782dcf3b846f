//! Normalized store for ingested tennis data.
//!
//! Natural keys carry uniqueness: external ids where the API provides them,
//! slugs otherwise. Surrogate `Uuid`s are only row handles.
//!
//! Reference entities (category, unique tournament, tournament, season,
//! team, player) are resolved with get-or-create and honor
//! [`ReferencePolicy`]. Matches, sets and statistics are upserts whose
//! mutable fields are overwritten on every pass.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::config::ReferencePolicy;
use crate::model::{
    CategoryInfo, MatchRecord, PlayerInfo, SeasonInfo, SetScore, StatisticRow, TournamentInfo,
    UniqueTournamentInfo,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Identity fields of a team, without its players.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamIdentity {
    pub external_id: Option<i64>,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchUpsert {
    pub id: Uuid,
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRef {
    pub id: Uuid,
    pub event_id: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub categories: i64,
    pub unique_tournaments: i64,
    pub tournaments: i64,
    pub seasons: i64,
    pub players: i64,
    pub teams: i64,
    pub matches: i64,
    pub match_sets: i64,
    pub match_statistics: i64,
}

impl fmt::Display for StoreCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "categories         {}", self.categories)?;
        writeln!(f, "unique_tournaments {}", self.unique_tournaments)?;
        writeln!(f, "tournaments        {}", self.tournaments)?;
        writeln!(f, "seasons            {}", self.seasons)?;
        writeln!(f, "players            {}", self.players)?;
        writeln!(f, "teams              {}", self.teams)?;
        writeln!(f, "matches            {}", self.matches)?;
        writeln!(f, "match_sets         {}", self.match_sets)?;
        write!(f, "match_statistics   {}", self.match_statistics)
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_or_create_category(
        &self,
        category: &CategoryInfo,
        policy: ReferencePolicy,
    ) -> Result<Uuid>;

    async fn get_or_create_unique_tournament(
        &self,
        unique_tournament: &UniqueTournamentInfo,
        category_id: Uuid,
        policy: ReferencePolicy,
    ) -> Result<Uuid>;

    /// Keyed by external id when present, otherwise by (name, slug).
    async fn get_or_create_tournament(
        &self,
        tournament: &TournamentInfo,
        category_id: Uuid,
        unique_tournament_id: Option<Uuid>,
        policy: ReferencePolicy,
    ) -> Result<Uuid>;

    async fn get_or_create_season(&self, season: &SeasonInfo, policy: ReferencePolicy)
        -> Result<Uuid>;

    /// Keyed by external id when present, otherwise by slug. A new player whose
    /// slug is already taken by someone with a different external id is stored
    /// under `{slug}-{external_id}`.
    async fn get_or_create_player(&self, player: &PlayerInfo, policy: ReferencePolicy)
        -> Result<Uuid>;

    /// Keyed by external id when present, otherwise by (name, slug).
    async fn get_or_create_team(&self, team: &TeamIdentity, policy: ReferencePolicy)
        -> Result<Uuid>;

    /// Idempotent.
    async fn attach_player(&self, team_id: Uuid, player_id: Uuid) -> Result<()>;

    /// Insert by event id, or refresh winner, status and start time in place.
    async fn upsert_match(&self, record: &MatchRecord) -> Result<MatchUpsert>;

    async fn find_match(&self, event_id: i64) -> Result<Option<MatchRef>>;

    async fn upsert_set(&self, match_id: Uuid, set: &SetScore) -> Result<()>;

    /// Upsert every row keyed by (match, period, group, stat), in one transaction
    /// where the backend has them. Returns the number of rows written.
    async fn upsert_statistics(&self, match_id: Uuid, rows: &[StatisticRow]) -> Result<usize>;

    async fn counts(&self) -> Result<StoreCounts>;

    /// Delete every ingested row.
    async fn purge(&self) -> Result<()>;
}
