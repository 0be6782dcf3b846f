//! Singles/doubles decomposition of team payloads.
//!
//! A singles team wraps the one player described by its own fields. A
//! doubles team wraps its listed partners, or, when the payload omits them,
//! the two halves of its `"A / B"` display name.

use anyhow::Result;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::ReferencePolicy;
use crate::model::{derive_slug, Country, PlayerInfo, TeamInfo, TeamKind};
use crate::store::{Store, TeamIdentity};

pub const DOUBLES_NAME_SEPARATOR: &str = " / ";
pub const DOUBLES_PARTNERS: usize = 2;

/// How the players of a team were identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// From external ids in the payload
    Canonical,
    /// Derived from the doubles display name; players carry no external id
    NameSplit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamResolution {
    pub team_id: Uuid,
    pub player_ids: Vec<Uuid>,
    pub confidence: Confidence,
}

/// Players the team stands for, before they are resolved. A doubles team
/// with fewer than two usable partners is treated as if it listed none.
pub fn team_players(team: &TeamInfo) -> (Vec<PlayerInfo>, Confidence) {
    match team.kind {
        TeamKind::Singles => (
            vec![PlayerInfo {
                external_id: team.external_id,
                name: team.name.clone(),
                slug: team.slug.clone(),
                short_name: team.short_name.clone(),
                country: team.country.clone(),
            }],
            Confidence::Canonical,
        ),
        TeamKind::Doubles if team.sub_teams.len() >= DOUBLES_PARTNERS => {
            (team.sub_teams.clone(), Confidence::Canonical)
        }
        TeamKind::Doubles => (split_doubles_name(&team.name), Confidence::NameSplit),
    }
}

/// Best-effort partners of a doubles team whose payload lists none.
pub fn split_doubles_name(name: &str) -> Vec<PlayerInfo> {
    let players: Vec<PlayerInfo> = name
        .split(DOUBLES_NAME_SEPARATOR)
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .map(|fragment| PlayerInfo {
            external_id: None,
            name: fragment.to_string(),
            slug: derive_slug(fragment),
            short_name: None,
            country: Country::default(),
        })
        .collect();

    if players.len() != DOUBLES_PARTNERS {
        warn!(
            "Doubles name '{}' split into {} players instead of 2",
            name,
            players.len()
        );
    }
    players
}

#[instrument(skip(store, team), fields(team = %team.name))]
pub async fn resolve_team<S: Store + ?Sized>(
    store: &S,
    team: &TeamInfo,
    policy: ReferencePolicy,
) -> Result<TeamResolution> {
    let (players, confidence) = team_players(team);
    if confidence == Confidence::NameSplit {
        warn!(
            "Doubles team {:?} lists {} usable sub-teams; resolving players from its name",
            team.external_id,
            team.sub_teams.len()
        );
    }

    let identity = TeamIdentity {
        external_id: team.external_id,
        name: team.name.clone(),
        slug: team.slug.clone(),
    };
    let team_id = store.get_or_create_team(&identity, policy).await?;

    let mut player_ids = Vec::with_capacity(players.len());
    for player in &players {
        let player_id = store.get_or_create_player(player, policy).await?;
        store.attach_player(team_id, player_id).await?;
        player_ids.push(player_id);
    }

    debug!("Team {} resolved with {} players", team_id, player_ids.len());
    Ok(TeamResolution {
        team_id,
        player_ids,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn player(id: i64, name: &str) -> PlayerInfo {
        PlayerInfo {
            external_id: Some(id),
            name: name.to_string(),
            slug: derive_slug(name),
            short_name: None,
            country: Country::default(),
        }
    }

    fn team(id: i64, name: &str, kind: TeamKind, sub_teams: Vec<PlayerInfo>) -> TeamInfo {
        TeamInfo {
            external_id: Some(id),
            name: name.to_string(),
            slug: derive_slug(name),
            short_name: None,
            country: Country {
                name: Some("Russia".to_string()),
                alpha2: Some("RU".to_string()),
            },
            kind,
            sub_teams,
        }
    }

    #[test]
    fn name_split_trims_and_drops_empty_fragments() {
        let players = split_doubles_name("Kim S. /  Lee J.  / ");
        let names: Vec<_> = players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Kim S.", "Lee J."]);
        assert!(players.iter().all(|p| p.external_id.is_none()));
        assert_eq!(players[0].slug, "kim-s.");
    }

    #[test]
    fn singles_player_takes_team_fields() {
        let (players, confidence) = team_players(&team(198223, "Fomin S.", TeamKind::Singles, vec![]));
        assert_eq!(confidence, Confidence::Canonical);
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].external_id, Some(198223));
        assert_eq!(players[0].country.alpha2.as_deref(), Some("RU"));
    }

    #[tokio::test]
    async fn doubles_with_sub_teams_attaches_two_players() {
        let store = MemoryStore::new();
        let info = team(
            500,
            "Kim S. / Lee J.",
            TeamKind::Doubles,
            vec![player(1, "Kim S."), player(2, "Lee J.")],
        );

        let resolved = resolve_team(&store, &info, ReferencePolicy::CreateOnce).await.unwrap();
        assert_eq!(resolved.confidence, Confidence::Canonical);

        let tables = store.snapshot().await;
        assert_eq!(tables.teams.len(), 1);
        assert_eq!(tables.team_players(resolved.team_id).len(), 2);
    }

    #[tokio::test]
    async fn doubles_without_sub_teams_falls_back_to_name_split() {
        let store = MemoryStore::new();
        let info = team(501, "Kim S. / Lee J.", TeamKind::Doubles, vec![]);

        let resolved = resolve_team(&store, &info, ReferencePolicy::CreateOnce).await.unwrap();
        assert_eq!(resolved.confidence, Confidence::NameSplit);

        let tables = store.snapshot().await;
        let players = tables.team_players(resolved.team_id);
        assert_eq!(players.len(), 2);
        assert!(players.iter().all(|p| p.external_id.is_none()));
    }

    #[test]
    fn one_listed_partner_is_not_a_full_team() {
        let info = team(502, "Kim S. / Lee J.", TeamKind::Doubles, vec![player(12, "Kim S.")]);
        let (players, confidence) = team_players(&info);

        assert_eq!(confidence, Confidence::NameSplit);
        assert_eq!(players.len(), 2);
        assert!(players.iter().all(|p| p.external_id.is_none()));
    }

    #[tokio::test]
    async fn resolving_twice_keeps_one_team_and_one_link() {
        let store = MemoryStore::new();
        let info = team(198223, "Fomin S.", TeamKind::Singles, vec![]);

        let first = resolve_team(&store, &info, ReferencePolicy::CreateOnce).await.unwrap();
        let second = resolve_team(&store, &info, ReferencePolicy::CreateOnce).await.unwrap();

        assert_eq!(first, second);
        let tables = store.snapshot().await;
        assert_eq!(tables.teams.len(), 1);
        assert_eq!(tables.players.len(), 1);
        assert_eq!(tables.team_players(first.team_id).len(), 1);
    }
}
