//! Postgres-backed store.
//!
//! Reference entities use `INSERT ... ON CONFLICT DO NOTHING RETURNING id`
//! with a follow-up `SELECT` under [`ReferencePolicy::CreateOnce`], and
//! `ON CONFLICT DO UPDATE` under [`ReferencePolicy::AlwaysRefresh`].
//! Never log the database URL; it carries credentials.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{MatchRef, MatchUpsert, Store, StoreCounts, TeamIdentity};
use crate::config::ReferencePolicy;
use crate::model::{
    CategoryInfo, MatchRecord, PlayerInfo, SeasonInfo, SetScore, StatisticRow, TournamentInfo,
    UniqueTournamentInfo,
};
use crate::retry::{connect_with_backoff, RetryPolicy};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect with retry and apply pending migrations.
    pub async fn connect(url: &str, policy: &RetryPolicy) -> Result<Self> {
        let pool = connect_with_backoff(policy, "PostgreSQL", || {
            PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
        })
        .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to apply migrations")?;
        info!("Schema is up to date");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_or_create_category(
        &self,
        category: &CategoryInfo,
        policy: ReferencePolicy,
    ) -> Result<Uuid> {
        let sql = match policy {
            ReferencePolicy::CreateOnce => {
                "INSERT INTO categories (id, name, slug) VALUES ($1, $2, $3)
                 ON CONFLICT (slug) DO NOTHING
                 RETURNING id"
            }
            ReferencePolicy::AlwaysRefresh => {
                "INSERT INTO categories (id, name, slug) VALUES ($1, $2, $3)
                 ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name
                 RETURNING id"
            }
        };

        let inserted: Option<(Uuid,)> = sqlx::query_as(sql)
            .bind(Uuid::new_v4())
            .bind(&category.name)
            .bind(&category.slug)
            .fetch_optional(&self.pool)
            .await?;

        if let Some((id,)) = inserted {
            return Ok(id);
        }

        let (id,): (Uuid,) = sqlx::query_as("SELECT id FROM categories WHERE slug = $1")
            .bind(&category.slug)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    async fn get_or_create_unique_tournament(
        &self,
        unique_tournament: &UniqueTournamentInfo,
        category_id: Uuid,
        policy: ReferencePolicy,
    ) -> Result<Uuid> {
        let sql = match policy {
            ReferencePolicy::CreateOnce => {
                "INSERT INTO unique_tournaments (id, name, slug, category_id, ground_type)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (slug) DO NOTHING
                 RETURNING id"
            }
            ReferencePolicy::AlwaysRefresh => {
                "INSERT INTO unique_tournaments (id, name, slug, category_id, ground_type)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (slug) DO UPDATE SET
                     name = EXCLUDED.name,
                     category_id = EXCLUDED.category_id,
                     ground_type = EXCLUDED.ground_type
                 RETURNING id"
            }
        };

        let inserted: Option<(Uuid,)> = sqlx::query_as(sql)
            .bind(Uuid::new_v4())
            .bind(&unique_tournament.name)
            .bind(&unique_tournament.slug)
            .bind(category_id)
            .bind(&unique_tournament.ground_type)
            .fetch_optional(&self.pool)
            .await?;

        if let Some((id,)) = inserted {
            return Ok(id);
        }

        let (id,): (Uuid,) = sqlx::query_as("SELECT id FROM unique_tournaments WHERE slug = $1")
            .bind(&unique_tournament.slug)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    async fn get_or_create_tournament(
        &self,
        tournament: &TournamentInfo,
        category_id: Uuid,
        unique_tournament_id: Option<Uuid>,
        policy: ReferencePolicy,
    ) -> Result<Uuid> {
        let conflict = match tournament.external_id {
            Some(_) => "(external_id)",
            None => "(name, slug) WHERE external_id IS NULL",
        };
        let action = match policy {
            ReferencePolicy::CreateOnce => "DO NOTHING",
            ReferencePolicy::AlwaysRefresh => {
                "DO UPDATE SET
                     name = EXCLUDED.name,
                     slug = EXCLUDED.slug,
                     category_id = EXCLUDED.category_id,
                     unique_tournament_id = EXCLUDED.unique_tournament_id,
                     priority = EXCLUDED.priority"
            }
        };
        let sql = format!(
            "INSERT INTO tournaments
                 (id, name, slug, category_id, unique_tournament_id, priority, external_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT {} {}
             RETURNING id",
            conflict, action
        );

        let inserted: Option<(Uuid,)> = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(&tournament.name)
            .bind(&tournament.slug)
            .bind(category_id)
            .bind(unique_tournament_id)
            .bind(tournament.priority)
            .bind(tournament.external_id)
            .fetch_optional(&self.pool)
            .await?;

        if let Some((id,)) = inserted {
            return Ok(id);
        }

        let (id,): (Uuid,) = match tournament.external_id {
            Some(ext) => {
                sqlx::query_as("SELECT id FROM tournaments WHERE external_id = $1")
                    .bind(ext)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT id FROM tournaments
                     WHERE name = $1 AND slug = $2 AND external_id IS NULL",
                )
                .bind(&tournament.name)
                .bind(&tournament.slug)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(id)
    }

    async fn get_or_create_season(
        &self,
        season: &SeasonInfo,
        policy: ReferencePolicy,
    ) -> Result<Uuid> {
        let sql = match policy {
            ReferencePolicy::CreateOnce => {
                "INSERT INTO seasons (id, name, year, external_id) VALUES ($1, $2, $3, $4)
                 ON CONFLICT (external_id) DO NOTHING
                 RETURNING id"
            }
            ReferencePolicy::AlwaysRefresh => {
                "INSERT INTO seasons (id, name, year, external_id) VALUES ($1, $2, $3, $4)
                 ON CONFLICT (external_id) DO UPDATE SET name = EXCLUDED.name, year = EXCLUDED.year
                 RETURNING id"
            }
        };

        let inserted: Option<(Uuid,)> = sqlx::query_as(sql)
            .bind(Uuid::new_v4())
            .bind(&season.name)
            .bind(&season.year)
            .bind(season.external_id)
            .fetch_optional(&self.pool)
            .await?;

        if let Some((id,)) = inserted {
            return Ok(id);
        }

        let (id,): (Uuid,) = sqlx::query_as("SELECT id FROM seasons WHERE external_id = $1")
            .bind(season.external_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    async fn get_or_create_player(
        &self,
        player: &PlayerInfo,
        policy: ReferencePolicy,
    ) -> Result<Uuid> {
        // Two unique keys (external id, slug): look up first so a slug clash
        // with a different player can be told apart from a repeat sighting.
        let existing: Option<(Uuid,)> = match player.external_id {
            Some(ext) => {
                sqlx::query_as("SELECT id FROM players WHERE external_id = $1")
                    .bind(ext)
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT id FROM players WHERE slug = $1")
                    .bind(&player.slug)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        if let Some((id,)) = existing {
            if policy == ReferencePolicy::AlwaysRefresh {
                sqlx::query(
                    "UPDATE players
                     SET name = $2, short_name = $3, country_name = $4, country_alpha2 = $5
                     WHERE id = $1",
                )
                .bind(id)
                .bind(&player.name)
                .bind(&player.short_name)
                .bind(&player.country.name)
                .bind(&player.country.alpha2)
                .execute(&self.pool)
                .await?;
            }
            return Ok(id);
        }

        let slug_taken: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM players WHERE slug = $1)")
                .bind(&player.slug)
                .fetch_one(&self.pool)
                .await?;

        let slug = match (slug_taken, player.external_id) {
            (false, _) => player.slug.clone(),
            (true, Some(ext)) => {
                let disambiguated = format!("{}-{}", player.slug, ext);
                warn!(
                    "Player slug '{}' already taken; storing external id {} as '{}'",
                    player.slug, ext, disambiguated
                );
                disambiguated
            }
            (true, None) => return Err(anyhow!("player slug {} already exists", player.slug)),
        };

        let (id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO players
                 (id, name, slug, short_name, country_name, country_alpha2, external_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(&player.name)
        .bind(&slug)
        .bind(&player.short_name)
        .bind(&player.country.name)
        .bind(&player.country.alpha2)
        .bind(player.external_id)
        .fetch_one(&self.pool)
        .await?;

        debug!("Created player {} ({})", player.name, slug);
        Ok(id)
    }

    async fn get_or_create_team(
        &self,
        team: &TeamIdentity,
        policy: ReferencePolicy,
    ) -> Result<Uuid> {
        let conflict = match team.external_id {
            Some(_) => "(external_id)",
            None => "(name, slug) WHERE external_id IS NULL",
        };
        let action = match policy {
            ReferencePolicy::CreateOnce => "DO NOTHING",
            ReferencePolicy::AlwaysRefresh => "DO UPDATE SET name = EXCLUDED.name, slug = EXCLUDED.slug",
        };
        let sql = format!(
            "INSERT INTO teams (id, name, slug, external_id) VALUES ($1, $2, $3, $4)
             ON CONFLICT {} {}
             RETURNING id",
            conflict, action
        );

        let inserted: Option<(Uuid,)> = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(&team.name)
            .bind(&team.slug)
            .bind(team.external_id)
            .fetch_optional(&self.pool)
            .await?;

        if let Some((id,)) = inserted {
            return Ok(id);
        }

        let (id,): (Uuid,) = match team.external_id {
            Some(ext) => {
                sqlx::query_as("SELECT id FROM teams WHERE external_id = $1")
                    .bind(ext)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT id FROM teams WHERE name = $1 AND slug = $2 AND external_id IS NULL",
                )
                .bind(&team.name)
                .bind(&team.slug)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(id)
    }

    async fn attach_player(&self, team_id: Uuid, player_id: Uuid) -> Result<()> {
        sqlx::query(
            "INSERT INTO team_players (team_id, player_id) VALUES ($1, $2)
             ON CONFLICT (team_id, player_id) DO NOTHING",
        )
        .bind(team_id)
        .bind(player_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_match(&self, record: &MatchRecord) -> Result<MatchUpsert> {
        // Identity columns (tournament, season, teams) are written once and
        // never touched by the update branch.
        let (id, created): (Uuid, bool) = sqlx::query_as(
            r#"
            INSERT INTO matches (
                id, event_id, tournament_id, season_id, home_team_id, away_team_id,
                round_name, round_type, winner_code, status_code, status_description,
                start_timestamp, first_to_serve
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (event_id) DO UPDATE SET
                winner_code = EXCLUDED.winner_code,
                status_code = EXCLUDED.status_code,
                status_description = EXCLUDED.status_description,
                start_timestamp = EXCLUDED.start_timestamp,
                updated_at = now()
            RETURNING id, (xmax = 0) AS inserted
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.event_id)
        .bind(record.tournament_id)
        .bind(record.season_id)
        .bind(record.home_team_id)
        .bind(record.away_team_id)
        .bind(&record.round_name)
        .bind(record.round_type)
        .bind(record.winner.to_code())
        .bind(record.status_code)
        .bind(&record.status_description)
        .bind(record.start_timestamp)
        .bind(record.first_to_serve)
        .fetch_one(&self.pool)
        .await?;

        Ok(MatchUpsert { id, created })
    }

    async fn find_match(&self, event_id: i64) -> Result<Option<MatchRef>> {
        let found: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM matches WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.map(|(id,)| MatchRef { id, event_id }))
    }

    async fn upsert_set(&self, match_id: Uuid, set: &SetScore) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO match_sets (match_id, set_number, home_score, away_score)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (match_id, set_number) DO UPDATE SET
                home_score = EXCLUDED.home_score,
                away_score = EXCLUDED.away_score
            "#,
        )
        .bind(match_id)
        .bind(i16::from(set.set_number))
        .bind(set.home_score)
        .bind(set.away_score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_statistics(&self, match_id: Uuid, rows: &[StatisticRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO match_statistics (
                    id, match_id, period, group_name, stat_name,
                    home_value, away_value, home_total, away_total, stat_key
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (match_id, period, group_name, stat_name) DO UPDATE SET
                    home_value = EXCLUDED.home_value,
                    away_value = EXCLUDED.away_value,
                    home_total = EXCLUDED.home_total,
                    away_total = EXCLUDED.away_total,
                    stat_key = EXCLUDED.stat_key
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(match_id)
            .bind(&row.period)
            .bind(&row.group_name)
            .bind(&row.stat_name)
            .bind(row.home_value)
            .bind(row.away_value)
            .bind(row.home_total)
            .bind(row.away_total)
            .bind(&row.stat_key)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(rows.len())
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let row: (i64, i64, i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM categories),
                (SELECT COUNT(*) FROM unique_tournaments),
                (SELECT COUNT(*) FROM tournaments),
                (SELECT COUNT(*) FROM seasons),
                (SELECT COUNT(*) FROM players),
                (SELECT COUNT(*) FROM teams),
                (SELECT COUNT(*) FROM matches),
                (SELECT COUNT(*) FROM match_sets),
                (SELECT COUNT(*) FROM match_statistics)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreCounts {
            categories: row.0,
            unique_tournaments: row.1,
            tournaments: row.2,
            seasons: row.3,
            players: row.4,
            teams: row.5,
            matches: row.6,
            match_sets: row.7,
            match_statistics: row.8,
        })
    }

    async fn purge(&self) -> Result<()> {
        sqlx::query(
            "TRUNCATE match_statistics, match_sets, matches, team_players, teams, players,
                      seasons, tournaments, unique_tournaments, categories",
        )
        .execute(&self.pool)
        .await?;
        info!("Purged all ingested rows");
        Ok(())
    }
}
