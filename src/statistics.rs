//! Flattening of the period → group → item statistics tree.

use anyhow::Result;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::wire::{RawStatItem, StatisticsResponse};
use crate::model::StatisticRow;
use crate::store::Store;

pub const DEFAULT_PERIOD: &str = "ALL";

/// One row per leaf. Items without a name have no key and are dropped, as
/// are items whose fields have the wrong type.
pub fn flatten_statistics(response: &StatisticsResponse) -> Vec<StatisticRow> {
    let mut rows = Vec::new();
    let mut unnamed = 0usize;
    let mut malformed = 0usize;

    for block in response.statistics.iter().flatten() {
        let period = block
            .period
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PERIOD);

        for group in &block.groups {
            let group_name = group.group_name.as_deref().unwrap_or_default().trim();

            for value in &group.statistics_items {
                let item = match RawStatItem::decode(value) {
                    Ok(item) => item,
                    Err(e) => {
                        debug!("Skipping statistics item: {}", e);
                        malformed += 1;
                        continue;
                    }
                };
                let Some(stat_name) = item.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
                else {
                    unnamed += 1;
                    continue;
                };

                rows.push(StatisticRow {
                    period: period.to_string(),
                    group_name: group_name.to_string(),
                    stat_name: stat_name.to_string(),
                    home_value: item.home_value,
                    away_value: item.away_value,
                    home_total: item.home_total,
                    away_total: item.away_total,
                    stat_key: item.key.clone(),
                });
            }
        }
    }

    if unnamed > 0 {
        warn!("Dropped {} statistics items without a name", unnamed);
    }
    if malformed > 0 {
        warn!("Dropped {} malformed statistics items", malformed);
    }
    rows
}

/// Upsert every leaf of `response` for the match; last write wins.
pub async fn normalize_statistics<S: Store + ?Sized>(
    store: &S,
    match_id: Uuid,
    response: &StatisticsResponse,
) -> Result<usize> {
    let rows = flatten_statistics(response);
    let written = store.upsert_statistics(match_id, &rows).await?;
    debug!("Stored {} statistics rows for match {}", written, match_id);
    Ok(written)
}
