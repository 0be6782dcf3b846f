//! Get-or-create resolution of reference entities.
//!
//! Lookups go through natural keys only. Whether a repeat sighting may
//! overwrite stored attributes is decided by [`ReferencePolicy`].

use anyhow::Result;
use tracing::debug;
use uuid::Uuid;

use crate::config::ReferencePolicy;
use crate::model::{CategoryInfo, SeasonInfo, TournamentInfo, UniqueTournamentInfo};
use crate::store::Store;

pub async fn resolve_category<S: Store + ?Sized>(
    store: &S,
    category: &CategoryInfo,
    policy: ReferencePolicy,
) -> Result<Uuid> {
    store.get_or_create_category(category, policy).await
}

pub async fn resolve_unique_tournament<S: Store + ?Sized>(
    store: &S,
    unique_tournament: &UniqueTournamentInfo,
    category_id: Uuid,
    policy: ReferencePolicy,
) -> Result<Uuid> {
    store
        .get_or_create_unique_tournament(unique_tournament, category_id, policy)
        .await
}

/// Resolves the tournament together with its category and, when the payload
/// names one, its unique tournament.
pub async fn resolve_tournament<S: Store + ?Sized>(
    store: &S,
    tournament: &TournamentInfo,
    policy: ReferencePolicy,
) -> Result<Uuid> {
    let category_id = resolve_category(store, &tournament.category, policy).await?;

    let unique_tournament_id = match &tournament.unique_tournament {
        Some(ut) => Some(resolve_unique_tournament(store, ut, category_id, policy).await?),
        None => None,
    };

    let id = store
        .get_or_create_tournament(tournament, category_id, unique_tournament_id, policy)
        .await?;
    debug!("Tournament {} ({:?}) -> {}", tournament.slug, tournament.external_id, id);
    Ok(id)
}

/// `None` means skip: the event carries no season identifier.
pub async fn resolve_season<S: Store + ?Sized>(
    store: &S,
    season: Option<&SeasonInfo>,
    policy: ReferencePolicy,
) -> Result<Option<Uuid>> {
    match season {
        Some(season) => Ok(Some(store.get_or_create_season(season, policy).await?)),
        None => Ok(None),
    }
}
