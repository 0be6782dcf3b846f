//! Per-day ingestion and the date-range driver.
//!
//! One date is fully ingested (events, then per-match statistics) before the
//! next one starts. Everything runs on the calling task.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};
use std::io::Write;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::api::wire::RawEvent;
use crate::api::EventsApi;
use crate::config::{Config, ReferencePolicy, RunConfig};
use crate::error::{IngestError, RunError};
use crate::feed::{ChangeFeed, MatchNotice};
use crate::health::HealthState;
use crate::matches::{store_sets, upsert_match, MatchLinks};
use crate::model::EventRecord;
use crate::resolve::{resolve_season, resolve_tournament};
use crate::retry::{with_backoff, RetryPolicy};
use crate::statistics::normalize_statistics;
use crate::store::Store;
use crate::teams::resolve_team;

/// Knobs shared by every day of a run.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub reference_policy: ReferencePolicy,
    /// Lower-cased tournament slug substring
    pub tournament_filter: Option<String>,
    pub retry: RetryPolicy,
    pub fetch_statistics: bool,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            reference_policy: ReferencePolicy::default(),
            tournament_filter: None,
            retry: RetryPolicy::default(),
            fetch_statistics: true,
        }
    }
}

impl From<&Config> for IngestSettings {
    fn from(config: &Config) -> Self {
        Self {
            reference_policy: config.reference_policy,
            tournament_filter: config.tournament_filter.clone(),
            retry: config.retry.clone(),
            fetch_statistics: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub events_seen: usize,
    /// Dropped for missing or unusable fields, or no season
    pub skipped: usize,
    /// Outside the tournament filter
    pub filtered: usize,
    pub matches_created: usize,
    pub matches_updated: usize,
    pub sets_written: usize,
    pub statistics_rows: usize,
    pub statistics_skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub days: usize,
    pub days_failed: usize,
    pub events_seen: usize,
    pub skipped: usize,
    pub filtered: usize,
    pub matches_created: usize,
    pub matches_updated: usize,
    pub sets_written: usize,
    pub statistics_rows: usize,
    pub statistics_skipped: usize,
}

impl RunSummary {
    fn absorb(&mut self, day: &DaySummary) {
        self.events_seen += day.events_seen;
        self.skipped += day.skipped;
        self.filtered += day.filtered;
        self.matches_created += day.matches_created;
        self.matches_updated += day.matches_updated;
        self.sets_written += day.sets_written;
        self.statistics_rows += day.statistics_rows;
        self.statistics_skipped += day.statistics_skipped;
    }
}

enum EventOutcome {
    Skipped,
    Filtered,
    Stored {
        event_id: i64,
        match_id: Uuid,
        created: bool,
        sets: usize,
    },
}

pub struct Ingestor<S: Store> {
    api: EventsApi,
    store: S,
    settings: IngestSettings,
    health: HealthState,
    feed: Option<ChangeFeed>,
}

impl<S: Store> Ingestor<S> {
    pub fn new(api: EventsApi, store: S, settings: IngestSettings) -> Self {
        Self {
            api,
            store,
            settings,
            health: HealthState::new(),
            feed: None,
        }
    }

    pub fn with_health(mut self, health: HealthState) -> Self {
        self.health = health;
        self
    }

    pub fn with_feed(mut self, feed: ChangeFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn health(&self) -> &HealthState {
        &self.health
    }

    /// Ingest every date of the run. Fails only on a store error, or when no
    /// date's event list could be fetched.
    #[instrument(skip(self, run), fields(from = %run.start_date, to = %run.end_date))]
    pub async fn ingest_range(&self, run: &RunConfig) -> Result<RunSummary, RunError> {
        let mut summary = RunSummary {
            days: run.day_count(),
            ..RunSummary::default()
        };

        for date in run.dates() {
            match self.ingest_day_with(date, &run.retry).await {
                Ok(day) => summary.absorb(&day),
                Err(IngestError::Store(e)) => {
                    self.health.record_error().await;
                    error!("Store failure on {}, aborting run: {:#}", date, e);
                    return Err(RunError::Store(e));
                }
                Err(e) => {
                    self.health.record_error().await;
                    summary.days_failed += 1;
                    warn!("Skipping {}: {}", date, e);
                }
            }
        }

        if summary.days > 0 && summary.days_failed == summary.days {
            return Err(RunError::ApiUnreachable { days: summary.days });
        }

        info!(
            "Run complete: {} days ({} failed), {} matches created, {} updated, {} sets, {} statistics rows",
            summary.days,
            summary.days_failed,
            summary.matches_created,
            summary.matches_updated,
            summary.sets_written,
            summary.statistics_rows
        );
        Ok(summary)
    }

    pub async fn ingest_day(&self, date: NaiveDate) -> Result<DaySummary, IngestError> {
        self.ingest_day_with(date, &self.settings.retry).await
    }

    #[instrument(skip(self, retry))]
    async fn ingest_day_with(
        &self,
        date: NaiveDate,
        retry: &RetryPolicy,
    ) -> Result<DaySummary, IngestError> {
        let events = with_backoff(retry, "fetch_events", || self.api.fetch_events(date)).await?;

        let mut summary = DaySummary {
            events_seen: events.len(),
            ..DaySummary::default()
        };
        let mut stored = Vec::new();

        for value in &events {
            match self.ingest_event(value).await {
                Ok(EventOutcome::Stored {
                    event_id,
                    match_id,
                    created,
                    sets,
                }) => {
                    if created {
                        summary.matches_created += 1;
                    } else {
                        summary.matches_updated += 1;
                    }
                    summary.sets_written += sets;
                    stored.push((event_id, match_id));
                }
                Ok(EventOutcome::Filtered) => summary.filtered += 1,
                Ok(EventOutcome::Skipped) => summary.skipped += 1,
                Err(IngestError::Shape(e)) => {
                    warn!("Dropping event {:?}: {}", value.get("id"), e);
                    summary.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if self.settings.fetch_statistics {
            for (event_id, match_id) in stored {
                match self.fetch_and_store_statistics(event_id, match_id, retry).await {
                    Ok(Some(rows)) => summary.statistics_rows += rows,
                    Ok(None) => summary.statistics_skipped += 1,
                    Err(IngestError::Fetch(e)) => {
                        warn!(
                            "Statistics for event {} unavailable ({}): {}",
                            event_id,
                            e.reason(),
                            e
                        );
                        summary.statistics_skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        self.health
            .record_day(date, summary.matches_created + summary.matches_updated)
            .await;
        info!(
            "{}: {} events, {} created, {} updated, {} skipped, {} filtered",
            date,
            summary.events_seen,
            summary.matches_created,
            summary.matches_updated,
            summary.skipped,
            summary.filtered
        );
        Ok(summary)
    }

    #[instrument(skip(self, value), fields(event_id = ?value.get("id")))]
    async fn ingest_event(&self, value: &Value) -> Result<EventOutcome, IngestError> {
        let raw = RawEvent::decode(value)?;
        let event = EventRecord::parse(&raw)?;
        if !event.tournament_matches(self.settings.tournament_filter.as_deref()) {
            return Ok(EventOutcome::Filtered);
        }

        let policy = self.settings.reference_policy;
        let Some(season_id) = resolve_season(&self.store, event.season.as_ref(), policy).await?
        else {
            warn!("Event {} has no season id; skipping", event.event_id);
            return Ok(EventOutcome::Skipped);
        };

        let tournament_id = resolve_tournament(&self.store, &event.tournament, policy).await?;
        let home = resolve_team(&self.store, &event.home_team, policy).await?;
        let away = resolve_team(&self.store, &event.away_team, policy).await?;

        let links = MatchLinks {
            tournament_id,
            season_id,
            home_team_id: home.team_id,
            away_team_id: away.team_id,
        };
        let upsert = upsert_match(&self.store, &event, links).await?;
        let sets = store_sets(&self.store, upsert.id, &event).await?;

        if let Some(feed) = &self.feed {
            let notice = MatchNotice {
                event_id: event.event_id,
                match_id: upsert.id,
                created: upsert.created,
                status: event.status_description.clone(),
            };
            if let Err(e) = feed.publish(&notice).await {
                warn!("Failed to publish event {}: {}", event.event_id, e);
            }
        }

        Ok(EventOutcome::Stored {
            event_id: event.event_id,
            match_id: upsert.id,
            created: upsert.created,
            sets,
        })
    }

    /// `None` when the API has no statistics for the event.
    async fn fetch_and_store_statistics(
        &self,
        event_id: i64,
        match_id: Uuid,
        retry: &RetryPolicy,
    ) -> Result<Option<usize>, IngestError> {
        let response = with_backoff(retry, "fetch_statistics", || {
            self.api.fetch_statistics(event_id)
        })
        .await?;

        if response.statistics.is_none() {
            return Ok(None);
        }
        Ok(Some(
            normalize_statistics(&self.store, match_id, &response).await?,
        ))
    }

    /// Refresh statistics of an already ingested event.
    #[instrument(skip(self))]
    pub async fn ingest_statistics(&self, event_id: i64) -> Result<usize, IngestError> {
        let found = self
            .store
            .find_match(event_id)
            .await?
            .ok_or(IngestError::MatchNotFound(event_id))?;

        let rows = self
            .fetch_and_store_statistics(event_id, found.id, &self.settings.retry)
            .await?
            .unwrap_or(0);
        info!("Stored {} statistics rows for event {}", rows, event_id);
        Ok(rows)
    }
}

/// Write one JSON line per event of `date`: the raw event and its raw
/// statistics, or `null` when they could not be fetched.
pub async fn dump_day<W: Write>(
    api: &EventsApi,
    retry: &RetryPolicy,
    date: NaiveDate,
    out: &mut W,
) -> Result<usize, IngestError> {
    let events = with_backoff(retry, "fetch_events", || api.fetch_events(date)).await?;

    for event in &events {
        let statistics = match event.get("id").and_then(Value::as_i64) {
            Some(id) => {
                match with_backoff(retry, "fetch_statistics", || api.fetch_statistics_raw(id)).await
                {
                    Ok(stats) => stats,
                    Err(e) => {
                        warn!("No statistics for event {}: {}", id, e);
                        Value::Null
                    }
                }
            }
            None => Value::Null,
        };

        let line = json!({ "event": event, "statistics": statistics });
        writeln!(out, "{}", line).map_err(anyhow::Error::from)?;
    }

    info!("Dumped {} events for {}", events.len(), date);
    Ok(events.len())
}
