//! In-process store with the same key semantics as the Postgres schema.
//! Backs dry runs (`ingest --memory`) and the test suite.
//!
//! Rows live in insertion-ordered tables; every natural key also has a
//! `HashMap` entry pointing at its row, so lookups stay constant-time as a
//! long range accumulates.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{MatchRef, MatchUpsert, Store, StoreCounts, TeamIdentity};
use crate::config::ReferencePolicy;
use crate::model::{
    CategoryInfo, MatchRecord, PlayerInfo, SeasonInfo, SetScore, StatisticRow, TournamentInfo,
    UniqueTournamentInfo,
};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredCategory {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredUniqueTournament {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub category_id: Uuid,
    pub ground_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredTournament {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub category_id: Uuid,
    pub unique_tournament_id: Option<Uuid>,
    pub priority: Option<i32>,
    pub external_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredSeason {
    pub id: Uuid,
    pub name: String,
    pub year: Option<String>,
    pub external_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredPlayer {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub short_name: Option<String>,
    pub country_name: Option<String>,
    pub country_alpha2: Option<String>,
    pub external_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredTeam {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub external_id: Option<i64>,
    pub player_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMatch {
    pub id: Uuid,
    pub record: MatchRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredSet {
    pub match_id: Uuid,
    pub score: SetScore,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredStatistic {
    pub match_id: Uuid,
    pub row: StatisticRow,
}

/// Every table, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub categories: Vec<StoredCategory>,
    pub unique_tournaments: Vec<StoredUniqueTournament>,
    pub tournaments: Vec<StoredTournament>,
    pub seasons: Vec<StoredSeason>,
    pub players: Vec<StoredPlayer>,
    pub teams: Vec<StoredTeam>,
    pub matches: Vec<StoredMatch>,
    pub sets: Vec<StoredSet>,
    pub statistics: Vec<StoredStatistic>,
}

impl Tables {
    pub fn match_by_event(&self, event_id: i64) -> Option<&StoredMatch> {
        self.matches.iter().find(|m| m.record.event_id == event_id)
    }

    pub fn sets_for(&self, match_id: Uuid) -> Vec<SetScore> {
        let mut sets: Vec<SetScore> = self
            .sets
            .iter()
            .filter(|s| s.match_id == match_id)
            .map(|s| s.score)
            .collect();
        sets.sort_by_key(|s| s.set_number);
        sets
    }

    pub fn statistics_for(&self, match_id: Uuid) -> Vec<&StatisticRow> {
        self.statistics
            .iter()
            .filter(|s| s.match_id == match_id)
            .map(|s| &s.row)
            .collect()
    }

    pub fn team(&self, team_id: Uuid) -> Option<&StoredTeam> {
        self.teams.iter().find(|t| t.id == team_id)
    }

    pub fn team_players(&self, team_id: Uuid) -> Vec<&StoredPlayer> {
        self.team(team_id)
            .map(|team| {
                team.player_ids
                    .iter()
                    .filter_map(|pid| self.players.iter().find(|p| p.id == *pid))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Natural key of a row that may or may not carry an external id. Rows
/// without one are keyed by (name, slug) and never match an external id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NaturalKey {
    External(i64),
    Named(String, String),
}

impl NaturalKey {
    fn of(external_id: Option<i64>, name: &str, slug: &str) -> Self {
        match external_id {
            Some(ext) => NaturalKey::External(ext),
            None => NaturalKey::Named(name.to_string(), slug.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StatisticKey {
    match_id: Uuid,
    period: String,
    group_name: String,
    stat_name: String,
}

impl StatisticKey {
    fn of(match_id: Uuid, row: &StatisticRow) -> Self {
        Self {
            match_id,
            period: row.period.clone(),
            group_name: row.group_name.clone(),
            stat_name: row.stat_name.clone(),
        }
    }
}

/// Natural key to row position in [`Tables`].
#[derive(Debug, Clone, Default)]
struct Indexes {
    categories: HashMap<String, usize>,
    unique_tournaments: HashMap<String, usize>,
    tournaments: HashMap<NaturalKey, usize>,
    seasons: HashMap<i64, usize>,
    players_by_external_id: HashMap<i64, usize>,
    players_by_slug: HashMap<String, usize>,
    teams: HashMap<NaturalKey, usize>,
    teams_by_id: HashMap<Uuid, usize>,
    matches: HashMap<i64, usize>,
    sets: HashMap<(Uuid, u8), usize>,
    statistics: HashMap<StatisticKey, usize>,
}

#[derive(Debug, Clone, Default)]
struct State {
    tables: Tables,
    index: Indexes,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every table.
    pub async fn snapshot(&self) -> Tables {
        self.inner.read().await.tables.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_or_create_category(
        &self,
        category: &CategoryInfo,
        policy: ReferencePolicy,
    ) -> Result<Uuid> {
        let mut guard = self.inner.write().await;
        let State { tables, index } = &mut *guard;

        if let Some(&pos) = index.categories.get(&category.slug) {
            let row = &mut tables.categories[pos];
            if policy == ReferencePolicy::AlwaysRefresh {
                row.name = category.name.clone();
            }
            return Ok(row.id);
        }

        let id = Uuid::new_v4();
        index.categories.insert(category.slug.clone(), tables.categories.len());
        tables.categories.push(StoredCategory {
            id,
            name: category.name.clone(),
            slug: category.slug.clone(),
        });
        Ok(id)
    }

    async fn get_or_create_unique_tournament(
        &self,
        unique_tournament: &UniqueTournamentInfo,
        category_id: Uuid,
        policy: ReferencePolicy,
    ) -> Result<Uuid> {
        let mut guard = self.inner.write().await;
        let State { tables, index } = &mut *guard;

        if let Some(&pos) = index.unique_tournaments.get(&unique_tournament.slug) {
            let row = &mut tables.unique_tournaments[pos];
            if policy == ReferencePolicy::AlwaysRefresh {
                row.name = unique_tournament.name.clone();
                row.category_id = category_id;
                row.ground_type = unique_tournament.ground_type.clone();
            }
            return Ok(row.id);
        }

        let id = Uuid::new_v4();
        index
            .unique_tournaments
            .insert(unique_tournament.slug.clone(), tables.unique_tournaments.len());
        tables.unique_tournaments.push(StoredUniqueTournament {
            id,
            name: unique_tournament.name.clone(),
            slug: unique_tournament.slug.clone(),
            category_id,
            ground_type: unique_tournament.ground_type.clone(),
        });
        Ok(id)
    }

    async fn get_or_create_tournament(
        &self,
        tournament: &TournamentInfo,
        category_id: Uuid,
        unique_tournament_id: Option<Uuid>,
        policy: ReferencePolicy,
    ) -> Result<Uuid> {
        let mut guard = self.inner.write().await;
        let State { tables, index } = &mut *guard;
        let key = NaturalKey::of(tournament.external_id, &tournament.name, &tournament.slug);

        if let Some(&pos) = index.tournaments.get(&key) {
            let row = &mut tables.tournaments[pos];
            if policy == ReferencePolicy::AlwaysRefresh {
                row.name = tournament.name.clone();
                row.slug = tournament.slug.clone();
                row.category_id = category_id;
                row.unique_tournament_id = unique_tournament_id;
                row.priority = tournament.priority;
            }
            return Ok(row.id);
        }

        let id = Uuid::new_v4();
        index.tournaments.insert(key, tables.tournaments.len());
        tables.tournaments.push(StoredTournament {
            id,
            name: tournament.name.clone(),
            slug: tournament.slug.clone(),
            category_id,
            unique_tournament_id,
            priority: tournament.priority,
            external_id: tournament.external_id,
        });
        Ok(id)
    }

    async fn get_or_create_season(
        &self,
        season: &SeasonInfo,
        policy: ReferencePolicy,
    ) -> Result<Uuid> {
        let mut guard = self.inner.write().await;
        let State { tables, index } = &mut *guard;

        if let Some(&pos) = index.seasons.get(&season.external_id) {
            let row = &mut tables.seasons[pos];
            if policy == ReferencePolicy::AlwaysRefresh {
                row.name = season.name.clone();
                row.year = season.year.clone();
            }
            return Ok(row.id);
        }

        let id = Uuid::new_v4();
        index.seasons.insert(season.external_id, tables.seasons.len());
        tables.seasons.push(StoredSeason {
            id,
            name: season.name.clone(),
            year: season.year.clone(),
            external_id: season.external_id,
        });
        Ok(id)
    }

    async fn get_or_create_player(
        &self,
        player: &PlayerInfo,
        policy: ReferencePolicy,
    ) -> Result<Uuid> {
        let mut guard = self.inner.write().await;
        let State { tables, index } = &mut *guard;

        let existing = match player.external_id {
            Some(ext) => index.players_by_external_id.get(&ext),
            None => index.players_by_slug.get(&player.slug),
        };
        if let Some(&pos) = existing {
            let row = &mut tables.players[pos];
            if policy == ReferencePolicy::AlwaysRefresh {
                row.name = player.name.clone();
                row.short_name = player.short_name.clone();
                row.country_name = player.country.name.clone();
                row.country_alpha2 = player.country.alpha2.clone();
            }
            return Ok(row.id);
        }

        let slug_taken = index.players_by_slug.contains_key(&player.slug);
        let slug = match (slug_taken, player.external_id) {
            (false, _) => player.slug.clone(),
            (true, Some(ext)) => format!("{}-{}", player.slug, ext),
            (true, None) => return Err(anyhow!("player slug {} already exists", player.slug)),
        };
        if index.players_by_slug.contains_key(&slug) {
            return Err(anyhow!("player slug {} already exists", slug));
        }

        let id = Uuid::new_v4();
        let pos = tables.players.len();
        if let Some(ext) = player.external_id {
            index.players_by_external_id.insert(ext, pos);
        }
        index.players_by_slug.insert(slug.clone(), pos);
        tables.players.push(StoredPlayer {
            id,
            name: player.name.clone(),
            slug,
            short_name: player.short_name.clone(),
            country_name: player.country.name.clone(),
            country_alpha2: player.country.alpha2.clone(),
            external_id: player.external_id,
        });
        Ok(id)
    }

    async fn get_or_create_team(
        &self,
        team: &TeamIdentity,
        policy: ReferencePolicy,
    ) -> Result<Uuid> {
        let mut guard = self.inner.write().await;
        let State { tables, index } = &mut *guard;
        let key = NaturalKey::of(team.external_id, &team.name, &team.slug);

        if let Some(&pos) = index.teams.get(&key) {
            let row = &mut tables.teams[pos];
            if policy == ReferencePolicy::AlwaysRefresh {
                row.name = team.name.clone();
                row.slug = team.slug.clone();
            }
            return Ok(row.id);
        }

        let id = Uuid::new_v4();
        let pos = tables.teams.len();
        index.teams.insert(key, pos);
        index.teams_by_id.insert(id, pos);
        tables.teams.push(StoredTeam {
            id,
            name: team.name.clone(),
            slug: team.slug.clone(),
            external_id: team.external_id,
            player_ids: Vec::new(),
        });
        Ok(id)
    }

    async fn attach_player(&self, team_id: Uuid, player_id: Uuid) -> Result<()> {
        let mut guard = self.inner.write().await;
        let State { tables, index } = &mut *guard;
        let pos = *index
            .teams_by_id
            .get(&team_id)
            .ok_or_else(|| anyhow!("team {} does not exist", team_id))?;
        let team = &mut tables.teams[pos];
        if !team.player_ids.contains(&player_id) {
            team.player_ids.push(player_id);
        }
        Ok(())
    }

    async fn upsert_match(&self, record: &MatchRecord) -> Result<MatchUpsert> {
        let mut guard = self.inner.write().await;
        let State { tables, index } = &mut *guard;

        if let Some(&pos) = index.matches.get(&record.event_id) {
            let existing = &mut tables.matches[pos];
            existing.record.winner = record.winner;
            existing.record.status_code = record.status_code;
            existing.record.status_description = record.status_description.clone();
            existing.record.start_timestamp = record.start_timestamp;
            return Ok(MatchUpsert {
                id: existing.id,
                created: false,
            });
        }

        let id = Uuid::new_v4();
        index.matches.insert(record.event_id, tables.matches.len());
        tables.matches.push(StoredMatch {
            id,
            record: record.clone(),
        });
        Ok(MatchUpsert { id, created: true })
    }

    async fn find_match(&self, event_id: i64) -> Result<Option<MatchRef>> {
        let state = self.inner.read().await;
        Ok(state.index.matches.get(&event_id).map(|&pos| MatchRef {
            id: state.tables.matches[pos].id,
            event_id,
        }))
    }

    async fn upsert_set(&self, match_id: Uuid, set: &SetScore) -> Result<()> {
        let mut guard = self.inner.write().await;
        let State { tables, index } = &mut *guard;

        match index.sets.get(&(match_id, set.set_number)) {
            Some(&pos) => tables.sets[pos].score = *set,
            None => {
                index.sets.insert((match_id, set.set_number), tables.sets.len());
                tables.sets.push(StoredSet {
                    match_id,
                    score: *set,
                });
            }
        }
        Ok(())
    }

    async fn upsert_statistics(&self, match_id: Uuid, rows: &[StatisticRow]) -> Result<usize> {
        let mut guard = self.inner.write().await;
        let State { tables, index } = &mut *guard;

        for row in rows {
            let key = StatisticKey::of(match_id, row);
            match index.statistics.get(&key) {
                Some(&pos) => tables.statistics[pos].row = row.clone(),
                None => {
                    index.statistics.insert(key, tables.statistics.len());
                    tables.statistics.push(StoredStatistic {
                        match_id,
                        row: row.clone(),
                    });
                }
            }
        }
        Ok(rows.len())
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let state = self.inner.read().await;
        let tables = &state.tables;
        Ok(StoreCounts {
            categories: tables.categories.len() as i64,
            unique_tournaments: tables.unique_tournaments.len() as i64,
            tournaments: tables.tournaments.len() as i64,
            seasons: tables.seasons.len() as i64,
            players: tables.players.len() as i64,
            teams: tables.teams.len() as i64,
            matches: tables.matches.len() as i64,
            match_sets: tables.sets.len() as i64,
            match_statistics: tables.statistics.len() as i64,
        })
    }

    async fn purge(&self) -> Result<()> {
        *self.inner.write().await = State::default();
        Ok(())
    }
}
