//! Typed view of an API event.
//!
//! [`EventRecord::parse`] is the single validation step between wire
//! payloads and the resolvers: required fields either exist here or the
//! event is rejected with a [`ShapeError`].

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::api::wire::{
    RawCategory, RawCountry, RawEvent, RawScore, RawSeason, RawTeam, RawTournament,
    RawUniqueTournament,
};
use crate::error::ShapeError;

pub const UNKNOWN_CATEGORY_SLUG: &str = "unknown";
pub const UNKNOWN_TOURNAMENT_NAME: &str = "Unknown tournament";

/// Slug derived from a display name: lower-cased, whitespace runs become `-`.
pub fn derive_slug(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryInfo {
    pub name: String,
    pub slug: String,
}

impl CategoryInfo {
    fn parse(raw: Option<&RawCategory>) -> Self {
        let name = raw.and_then(|c| non_empty(&c.name));
        let slug = raw
            .and_then(|c| non_empty(&c.slug))
            .or_else(|| name.as_deref().map(derive_slug));
        Self {
            name: name.unwrap_or_else(|| "Unknown category".to_string()),
            slug: slug.unwrap_or_else(|| UNKNOWN_CATEGORY_SLUG.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniqueTournamentInfo {
    pub name: String,
    pub slug: String,
    pub ground_type: Option<String>,
}

impl UniqueTournamentInfo {
    fn parse(raw: &RawUniqueTournament) -> Option<Self> {
        let name = non_empty(&raw.name);
        let slug = non_empty(&raw.slug).or_else(|| name.as_deref().map(derive_slug))?;
        Some(Self {
            name: name.unwrap_or_else(|| slug.clone()),
            slug,
            ground_type: non_empty(&raw.ground_type),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TournamentInfo {
    pub external_id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub priority: Option<i32>,
    pub category: CategoryInfo,
    pub unique_tournament: Option<UniqueTournamentInfo>,
}

impl TournamentInfo {
    fn parse(raw: Option<&RawTournament>) -> Result<Self, ShapeError> {
        let raw = raw.ok_or(ShapeError::MissingField("tournament"))?;
        let name = non_empty(&raw.name).unwrap_or_else(|| UNKNOWN_TOURNAMENT_NAME.to_string());
        Ok(Self {
            external_id: raw.id,
            slug: non_empty(&raw.slug).unwrap_or_else(|| derive_slug(&name)),
            name,
            priority: raw.priority.and_then(|p| i32::try_from(p).ok()),
            category: CategoryInfo::parse(raw.category.as_ref()),
            unique_tournament: raw
                .unique_tournament
                .as_ref()
                .and_then(UniqueTournamentInfo::parse),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonInfo {
    pub external_id: i64,
    pub name: String,
    pub year: Option<String>,
}

impl SeasonInfo {
    /// `None` when the payload carries no season identifier.
    fn parse(raw: Option<&RawSeason>) -> Option<Self> {
        let raw = raw?;
        let external_id = raw.id?;
        let year = match &raw.year {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Some(Self {
            external_id,
            name: non_empty(&raw.name).unwrap_or_default(),
            year,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Country {
    pub name: Option<String>,
    pub alpha2: Option<String>,
}

impl Country {
    fn parse(raw: Option<&RawCountry>) -> Self {
        raw.map(|c| Self {
            name: non_empty(&c.name),
            alpha2: non_empty(&c.alpha2),
        })
        .unwrap_or_default()
    }
}

/// A player as described by the payload, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInfo {
    pub external_id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub short_name: Option<String>,
    pub country: Country,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamKind {
    Singles,
    Doubles,
}

impl TeamKind {
    /// 1 = singles, 2 = doubles; an absent flag means singles.
    pub fn from_flag(flag: Option<i64>) -> Result<Self, ShapeError> {
        match flag {
            None | Some(1) => Ok(Self::Singles),
            Some(2) => Ok(Self::Doubles),
            Some(other) => Err(ShapeError::UnknownTeamType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamInfo {
    pub external_id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub short_name: Option<String>,
    pub country: Country,
    pub kind: TeamKind,
    /// Doubles partners, when the payload lists them
    pub sub_teams: Vec<PlayerInfo>,
}

impl TeamInfo {
    pub fn parse(
        raw: Option<&RawTeam>,
        field: &'static str,
        name_field: &'static str,
    ) -> Result<Self, ShapeError> {
        let raw = raw.ok_or(ShapeError::MissingField(field))?;
        let name = non_empty(&raw.name).ok_or(ShapeError::MissingField(name_field))?;
        let kind = TeamKind::from_flag(raw.team_type)?;

        let sub_teams = raw
            .sub_teams
            .iter()
            .flatten()
            .filter_map(|sub| {
                // A partner listed without a name is still a partner; its
                // short name or slug stands in for the display name.
                let name = non_empty(&sub.name)
                    .or_else(|| non_empty(&sub.short_name))
                    .or_else(|| non_empty(&sub.slug))?;
                Some(PlayerInfo {
                    external_id: sub.id,
                    slug: non_empty(&sub.slug).unwrap_or_else(|| derive_slug(&name)),
                    name,
                    short_name: non_empty(&sub.short_name),
                    country: Country::parse(sub.country.as_ref()),
                })
            })
            .collect();

        Ok(Self {
            external_id: raw.id,
            slug: non_empty(&raw.slug).unwrap_or_else(|| derive_slug(&name)),
            name,
            short_name: non_empty(&raw.short_name),
            country: Country::parse(raw.country.as_ref()),
            kind,
            sub_teams,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WinnerCode {
    Home,
    Away,
    None,
}

impl WinnerCode {
    pub fn from_flag(flag: Option<i64>) -> Self {
        match flag {
            Some(1) => Self::Home,
            Some(2) => Self::Away,
            _ => Self::None,
        }
    }

    /// Stored representation: 1 home, 2 away, NULL none.
    pub fn to_code(self) -> Option<i16> {
        match self {
            Self::Home => Some(1),
            Self::Away => Some(2),
            Self::None => None,
        }
    }
}

/// Per-set games for one side; index 0 is set 1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreLine(pub [Option<i64>; 5]);

impl ScoreLine {
    fn parse(raw: Option<&RawScore>) -> Self {
        Self(raw.map(RawScore::periods).unwrap_or_default())
    }

    pub fn set(&self, set_number: u8) -> Option<i64> {
        let idx = usize::from(set_number).checked_sub(1)?;
        self.0.get(idx).copied().flatten()
    }
}

/// One event, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub event_id: i64,
    pub tournament: TournamentInfo,
    pub season: Option<SeasonInfo>,
    pub home_team: TeamInfo,
    pub away_team: TeamInfo,
    pub start_time: DateTime<Utc>,
    pub status_code: Option<i32>,
    pub status_description: Option<String>,
    pub winner: WinnerCode,
    pub round_name: Option<String>,
    pub round_type: Option<i32>,
    pub first_to_serve: Option<i16>,
    pub home_score: ScoreLine,
    pub away_score: ScoreLine,
}

impl EventRecord {
    pub fn parse(raw: &RawEvent) -> Result<Self, ShapeError> {
        let event_id = raw.id.ok_or(ShapeError::MissingField("id"))?;
        let timestamp = raw
            .start_timestamp
            .ok_or(ShapeError::MissingField("startTimestamp"))?;
        let start_time = Utc
            .timestamp_opt(timestamp, 0)
            .single()
            .ok_or(ShapeError::InvalidTimestamp(timestamp))?;

        let status = raw.status.as_ref();
        let round = raw.round_info.as_ref();

        Ok(Self {
            event_id,
            tournament: TournamentInfo::parse(raw.tournament.as_ref())?,
            season: SeasonInfo::parse(raw.season.as_ref()),
            home_team: TeamInfo::parse(raw.home_team.as_ref(), "homeTeam", "homeTeam.name")?,
            away_team: TeamInfo::parse(raw.away_team.as_ref(), "awayTeam", "awayTeam.name")?,
            start_time,
            status_code: status
                .and_then(|s| s.code)
                .and_then(|c| i32::try_from(c).ok()),
            status_description: status.and_then(|s| non_empty(&s.description)),
            winner: WinnerCode::from_flag(raw.winner_code),
            round_name: round.and_then(|r| non_empty(&r.name)),
            round_type: round
                .and_then(|r| r.round)
                .and_then(|r| i32::try_from(r).ok()),
            first_to_serve: raw.first_to_serve.and_then(|f| i16::try_from(f).ok()),
            home_score: ScoreLine::parse(raw.home_score.as_ref()),
            away_score: ScoreLine::parse(raw.away_score.as_ref()),
        })
    }

    pub fn tournament_matches(&self, filter: Option<&str>) -> bool {
        match filter {
            Some(needle) => self
                .tournament
                .slug
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            None => true,
        }
    }
}

/// Match row as written by the upserter.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub event_id: i64,
    pub tournament_id: uuid::Uuid,
    pub season_id: uuid::Uuid,
    pub home_team_id: uuid::Uuid,
    pub away_team_id: uuid::Uuid,
    pub round_name: Option<String>,
    pub round_type: Option<i32>,
    pub winner: WinnerCode,
    pub status_code: Option<i32>,
    pub status_description: Option<String>,
    pub start_timestamp: DateTime<Utc>,
    pub first_to_serve: Option<i16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetScore {
    pub set_number: u8,
    pub home_score: i32,
    pub away_score: i32,
}

/// One leaf of the statistics tree.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticRow {
    pub period: String,
    pub group_name: String,
    pub stat_name: String,
    pub home_value: Option<f64>,
    pub away_value: Option<f64>,
    pub home_total: Option<f64>,
    pub away_total: Option<f64>,
    pub stat_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawEvent {
        serde_json::from_value(value).unwrap()
    }

    fn minimal() -> Value {
        json!({
            "id": 11034695,
            "startTimestamp": 1675328400,
            "tournament": {
                "id": 294, "name": "Davis Cup, World Group I", "slug": "davis-cup-world-group-i",
                "priority": 210,
                "category": {"name": "ITF Men", "slug": "itf-men"},
                "uniqueTournament": {"name": "Davis Cup", "slug": "davis-cup", "groundType": "Hardcourt indoor"}
            },
            "season": {"id": 46730, "name": "Davis Cup 2023", "year": "2023"},
            "homeTeam": {"id": 198223, "name": "Fomin S.", "slug": "fomin-s", "type": 1},
            "awayTeam": {"id": 63438, "name": "McDonald M.", "slug": "mcdonald-mackenzie", "type": 1},
            "status": {"code": 100, "description": "Ended"},
            "winnerCode": 2,
            "roundInfo": {"name": "Qualification", "round": 1},
            "homeScore": {"period1": 4, "period2": 3},
            "awayScore": {"period1": 6, "period2": 6}
        })
    }

    #[test]
    fn parses_complete_event() {
        let event = EventRecord::parse(&raw(minimal())).unwrap();
        assert_eq!(event.event_id, 11034695);
        assert_eq!(event.start_time.timestamp(), 1675328400);
        assert_eq!(event.tournament.category.slug, "itf-men");
        assert_eq!(
            event.tournament.unique_tournament.as_ref().unwrap().ground_type.as_deref(),
            Some("Hardcourt indoor")
        );
        assert_eq!(event.season.as_ref().unwrap().year.as_deref(), Some("2023"));
        assert_eq!(event.winner, WinnerCode::Away);
        assert_eq!(event.status_description.as_deref(), Some("Ended"));
        assert_eq!(event.home_score.set(1), Some(4));
        assert_eq!(event.home_score.set(3), None);
        assert_eq!(event.home_team.kind, TeamKind::Singles);
    }

    #[test]
    fn missing_event_id_is_shape_error() {
        let mut value = minimal();
        value.as_object_mut().unwrap().remove("id");
        assert_eq!(
            EventRecord::parse(&raw(value)).unwrap_err(),
            ShapeError::MissingField("id")
        );
    }

    #[test]
    fn missing_season_id_is_kept_as_absent() {
        let mut value = minimal();
        value["season"] = json!({"name": "No id"});
        let event = EventRecord::parse(&raw(value)).unwrap();
        assert!(event.season.is_none());
    }

    #[test]
    fn numeric_season_year_is_accepted() {
        let mut value = minimal();
        value["season"]["year"] = json!(2023);
        let event = EventRecord::parse(&raw(value)).unwrap();
        assert_eq!(event.season.unwrap().year.as_deref(), Some("2023"));
    }

    #[test]
    fn unknown_team_type_is_rejected() {
        let mut value = minimal();
        value["awayTeam"]["type"] = json!(7);
        assert_eq!(
            EventRecord::parse(&raw(value)).unwrap_err(),
            ShapeError::UnknownTeamType(7)
        );
    }

    #[test]
    fn absent_category_falls_back_to_unknown() {
        let mut value = minimal();
        value["tournament"].as_object_mut().unwrap().remove("category");
        let event = EventRecord::parse(&raw(value)).unwrap();
        assert_eq!(event.tournament.category.slug, UNKNOWN_CATEGORY_SLUG);
    }

    #[test]
    fn zero_score_is_distinct_from_absent() {
        let line = ScoreLine([Some(0), None, None, None, None]);
        assert_eq!(line.set(1), Some(0));
        assert_eq!(line.set(2), None);
        assert_eq!(line.set(0), None);
        assert_eq!(line.set(6), None);
    }

    #[test]
    fn unnamed_tournament_is_kept_under_a_placeholder() {
        let mut value = minimal();
        value["tournament"].as_object_mut().unwrap().remove("name");
        value["tournament"].as_object_mut().unwrap().remove("slug");

        let event = EventRecord::parse(&raw(value)).unwrap();
        assert_eq!(event.tournament.name, UNKNOWN_TOURNAMENT_NAME);
        assert_eq!(event.tournament.slug, "unknown-tournament");
        assert_eq!(event.tournament.external_id, Some(294));
    }

    #[test]
    fn missing_tournament_is_still_rejected() {
        let mut value = minimal();
        value.as_object_mut().unwrap().remove("tournament");
        assert_eq!(
            EventRecord::parse(&raw(value)).unwrap_err(),
            ShapeError::MissingField("tournament")
        );
    }

    #[test]
    fn unnamed_partner_falls_back_to_slug() {
        let mut value = minimal();
        value["homeTeam"] = json!({
            "id": 500, "name": "Kim S. / Lee J.", "slug": "kim-s-lee-j", "type": 2,
            "subTeams": [
                {"id": 12, "name": "Kim S."},
                {"id": 13, "slug": "lee-j"},
                {"id": 14}
            ]
        });

        let event = EventRecord::parse(&raw(value)).unwrap();
        let partners: Vec<_> = event
            .home_team
            .sub_teams
            .iter()
            .map(|p| (p.external_id, p.name.as_str(), p.slug.as_str()))
            .collect();
        assert_eq!(
            partners,
            vec![(Some(12), "Kim S.", "kim-s."), (Some(13), "lee-j", "lee-j")]
        );
    }

    #[test]
    fn slug_is_lowercase_hyphenated() {
        assert_eq!(derive_slug("Olga  Danilovic"), "olga-danilovic");
        assert_eq!(derive_slug(" Kim S. "), "kim-s.");
    }

    #[test]
    fn tournament_filter_is_case_insensitive() {
        let event = EventRecord::parse(&raw(minimal())).unwrap();
        assert!(event.tournament_matches(None));
        assert!(event.tournament_matches(Some("DAVIS")));
        assert!(!event.tournament_matches(Some("itf")));
    }
}
