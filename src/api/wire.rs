//! Raw payload shapes of the sports-event API.
//!
//! Every field is optional: absence is preserved here and judged later by
//! [`crate::model`], which is the only place that decides what is required.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ShapeError;

/// `GET /scheduled-events/{date}`
///
/// Events stay undecoded so one malformed entry cannot take the whole date
/// down with it; see [`RawEvent::decode`].
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct EventsResponse {
    pub events: Vec<Value>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RawEvent {
    pub id: Option<i64>,
    pub tournament: Option<RawTournament>,
    pub season: Option<RawSeason>,
    pub home_team: Option<RawTeam>,
    pub away_team: Option<RawTeam>,
    pub start_timestamp: Option<i64>,
    pub status: Option<RawStatus>,
    pub winner_code: Option<i64>,
    pub round_info: Option<RawRoundInfo>,
    pub home_score: Option<RawScore>,
    pub away_score: Option<RawScore>,
    pub first_to_serve: Option<i64>,
}

impl RawEvent {
    pub fn decode(value: &Value) -> Result<Self, ShapeError> {
        Self::deserialize(value).map_err(|e| ShapeError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RawTournament {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub priority: Option<i64>,
    pub category: Option<RawCategory>,
    pub unique_tournament: Option<RawUniqueTournament>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawCategory {
    pub name: Option<String>,
    pub slug: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RawUniqueTournament {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub ground_type: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawSeason {
    pub id: Option<i64>,
    pub name: Option<String>,
    /// Usually a string such as `"2023"` or `"23/24"`, occasionally a number.
    pub year: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RawTeam {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub short_name: Option<String>,
    #[serde(rename = "type")]
    pub team_type: Option<i64>,
    pub sub_teams: Option<Vec<RawTeam>>,
    pub country: Option<RawCountry>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawCountry {
    pub name: Option<String>,
    pub alpha2: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawStatus {
    pub code: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawRoundInfo {
    pub name: Option<String>,
    pub round: Option<i64>,
}

/// Per-set games, `period1` through `period5`.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawScore {
    pub period1: Option<i64>,
    pub period2: Option<i64>,
    pub period3: Option<i64>,
    pub period4: Option<i64>,
    pub period5: Option<i64>,
}

impl RawScore {
    pub fn periods(&self) -> [Option<i64>; 5] {
        [
            self.period1,
            self.period2,
            self.period3,
            self.period4,
            self.period5,
        ]
    }
}

/// `GET /event/{id}/statistics`
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StatisticsResponse {
    pub statistics: Option<Vec<RawPeriodBlock>>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawPeriodBlock {
    pub period: Option<String>,
    pub groups: Vec<RawStatGroup>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RawStatGroup {
    pub group_name: Option<String>,
    /// Decoded one by one with [`RawStatItem::decode`]
    pub statistics_items: Vec<Value>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RawStatItem {
    pub name: Option<String>,
    pub key: Option<String>,
    pub home_value: Option<f64>,
    pub away_value: Option<f64>,
    pub home_total: Option<f64>,
    pub away_total: Option<f64>,
}

impl RawStatItem {
    pub fn decode(value: &Value) -> Result<Self, ShapeError> {
        Self::deserialize(value).map_err(|e| ShapeError::Malformed(e.to_string()))
    }
}
