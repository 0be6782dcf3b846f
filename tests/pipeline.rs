use chrono::NaiveDate;
use mockito::{Server, ServerGuard};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use tennis_ingestion::api::EventsApi;
use tennis_ingestion::config::ApiConfig;
use tennis_ingestion::model::{SetScore, WinnerCode};
use tennis_ingestion::pipeline::dump_day;
use tennis_ingestion::retry::RetryPolicy;
use tennis_ingestion::{
    IngestError, IngestSettings, Ingestor, MemoryStore, RunConfig, RunError, Store,
};

const DAY: &str = "2023-02-02";

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 1,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        multiplier: 2.0,
    }
}

fn settings() -> IngestSettings {
    IngestSettings {
        retry: fast_retry(),
        ..IngestSettings::default()
    }
}

fn api(server: &ServerGuard) -> EventsApi {
    EventsApi::new(&ApiConfig {
        events_base_url: server.url(),
        event_base_url: server.url(),
        requests_per_minute: 6000,
    })
    .unwrap()
}

fn ingestor(server: &ServerGuard, store: MemoryStore, settings: IngestSettings) -> Ingestor<MemoryStore> {
    Ingestor::new(api(server), store, settings)
}

fn singles(id: i64, name: &str, slug: &str) -> Value {
    json!({
        "id": id, "name": name, "slug": slug, "shortName": name, "type": 1,
        "country": {"name": "France", "alpha2": "FR"}
    })
}

fn event(id: i64, home: Value, away: Value, status: &str) -> Value {
    json!({
        "id": id,
        "startTimestamp": 1675328400,
        "tournament": {
            "id": 9001, "name": "W15 Monastir", "slug": "itf-women-w15-monastir", "priority": 120,
            "category": {"name": "ITF Women", "slug": "itf-women"},
            "uniqueTournament": {"name": "W15 Monastir", "slug": "w15-monastir", "groundType": "Hardcourt outdoor"}
        },
        "season": {"id": 46730, "name": "ITF Women 2023", "year": "2023"},
        "homeTeam": home,
        "awayTeam": away,
        "status": {"code": 100, "description": status},
        "winnerCode": 1,
        "roundInfo": {"name": "Round of 32", "round": 6},
        "firstToServe": 1,
        "homeScore": {"period1": 6, "period2": 4},
        "awayScore": {"period1": 4, "period2": 6}
    })
}

fn statistics_body() -> String {
    json!({
        "statistics": [{"period": "ALL", "groups": [
            {"groupName": "Service", "statisticsItems": [
                {"name": "Aces", "key": "aces", "homeValue": 3, "awayValue": 5},
                {"name": "Double faults", "key": "doubleFaults", "homeValue": 2, "awayValue": 1}
            ]}
        ]}]
    })
    .to_string()
}

async fn mock_events(server: &mut ServerGuard, day: &str, events: Vec<Value>) {
    server
        .mock("GET", format!("/scheduled-events/{}", day).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "events": events }).to_string())
        .create_async()
        .await;
}

async fn mock_statistics(server: &mut ServerGuard, event_id: i64, status: usize, body: String) {
    server
        .mock("GET", format!("/event/{}/statistics", event_id).as_str())
        .with_status(status)
        .with_body(body)
        .create_async()
        .await;
}

#[tokio::test]
async fn two_played_sets_become_two_set_rows() {
    let mut server = Server::new_async().await;
    mock_events(
        &mut server,
        DAY,
        vec![event(1, singles(10, "Fomin S.", "fomin-s"), singles(11, "Dubois A.", "dubois-a"), "Ended")],
    )
    .await;
    mock_statistics(&mut server, 1, 200, statistics_body()).await;

    let store = MemoryStore::new();
    let summary = assert_ok!(ingestor(&server, store.clone(), settings()).ingest_day(date(DAY)).await);
    assert_eq!(summary.matches_created, 1);
    assert_eq!(summary.sets_written, 2);
    assert_eq!(summary.statistics_rows, 2);

    let tables = store.snapshot().await;
    let stored = tables.match_by_event(1).unwrap();
    assert_eq!(
        tables.sets_for(stored.id),
        vec![
            SetScore { set_number: 1, home_score: 6, away_score: 4 },
            SetScore { set_number: 2, home_score: 4, away_score: 6 },
        ]
    );
    assert_eq!(stored.record.round_name.as_deref(), Some("Round of 32"));
    assert_eq!(stored.record.first_to_serve, Some(1));
}

#[tokio::test]
async fn ingesting_a_day_twice_adds_no_rows() {
    let mut server = Server::new_async().await;
    mock_events(
        &mut server,
        DAY,
        vec![
            event(1, singles(10, "Fomin S.", "fomin-s"), singles(11, "Dubois A.", "dubois-a"), "Ended"),
            event(2, singles(12, "Kim S.", "kim-s"), singles(10, "Fomin S.", "fomin-s"), "Ended"),
        ],
    )
    .await;
    mock_statistics(&mut server, 1, 200, statistics_body()).await;
    mock_statistics(&mut server, 2, 200, statistics_body()).await;

    let store = MemoryStore::new();
    let ingestor = ingestor(&server, store.clone(), settings());

    let first = ingestor.ingest_day(date(DAY)).await.unwrap();
    let after_first = store.counts().await.unwrap();
    let second = ingestor.ingest_day(date(DAY)).await.unwrap();
    let after_second = store.counts().await.unwrap();

    assert_eq!(first.matches_created, 2);
    assert_eq!(second.matches_created, 0);
    assert_eq!(second.matches_updated, 2);
    assert_eq!(after_first, after_second);
    assert_eq!(after_second.matches, 2);
    assert_eq!(after_second.match_sets, 4);
    assert_eq!(after_second.match_statistics, 4);
    assert_eq!(after_second.players, 3);
}

#[tokio::test]
async fn reingestion_refreshes_status_in_place() {
    let store = MemoryStore::new();
    let home = singles(10, "Fomin S.", "fomin-s");
    let away = singles(11, "Dubois A.", "dubois-a");

    let mut before = Server::new_async().await;
    let mut scheduled = event(7, home.clone(), away.clone(), "Not started");
    scheduled["homeScore"] = json!({});
    scheduled["awayScore"] = json!({});
    scheduled.as_object_mut().unwrap().remove("winnerCode");
    mock_events(&mut before, DAY, vec![scheduled]).await;
    ingestor(&before, store.clone(), settings())
        .ingest_day(date(DAY))
        .await
        .unwrap();

    let mut after = Server::new_async().await;
    mock_events(&mut after, DAY, vec![event(7, home, away, "Ended")]).await;
    ingestor(&after, store.clone(), settings())
        .ingest_day(date(DAY))
        .await
        .unwrap();

    let tables = store.snapshot().await;
    assert_eq!(tables.matches.len(), 1);
    let stored = tables.match_by_event(7).unwrap();
    assert_eq!(stored.record.status_description.as_deref(), Some("Ended"));
    assert_eq!(tables.sets_for(stored.id).len(), 2);
}

#[tokio::test]
async fn reingestion_keeps_links_and_refreshes_outcome() {
    let store = MemoryStore::new();
    let no_stats = IngestSettings {
        fetch_statistics: false,
        ..settings()
    };

    let mut first = Server::new_async().await;
    mock_events(
        &mut first,
        DAY,
        vec![event(7, singles(10, "Fomin S.", "fomin-s"), singles(11, "Dubois A.", "dubois-a"), "Ended")],
    )
    .await;
    ingestor(&first, store.clone(), no_stats.clone())
        .ingest_day(date(DAY))
        .await
        .unwrap();
    let original = store.snapshot().await.match_by_event(7).unwrap().clone();

    let mut changed = event(7, singles(20, "Moreau C.", "moreau-c"), singles(11, "Dubois A.", "dubois-a"), "Ended");
    changed["tournament"]["id"] = json!(9100);
    changed["tournament"]["slug"] = json!("itf-women-w25-monastir");
    changed["season"]["id"] = json!(50000);
    changed["winnerCode"] = json!(2);
    changed["startTimestamp"] = json!(1675335600);

    let mut second = Server::new_async().await;
    mock_events(&mut second, DAY, vec![changed]).await;
    let summary = ingestor(&second, store.clone(), no_stats)
        .ingest_day(date(DAY))
        .await
        .unwrap();
    assert_eq!(summary.matches_updated, 1);

    let tables = store.snapshot().await;
    let stored = tables.match_by_event(7).unwrap();
    assert_eq!(stored.id, original.id);
    assert_eq!(stored.record.tournament_id, original.record.tournament_id);
    assert_eq!(stored.record.season_id, original.record.season_id);
    assert_eq!(stored.record.home_team_id, original.record.home_team_id);
    assert_eq!(stored.record.away_team_id, original.record.away_team_id);
    assert_eq!(stored.record.winner, WinnerCode::Away);
    assert_eq!(stored.record.start_timestamp.timestamp(), 1675335600);
    assert_ne!(stored.record.start_timestamp, original.record.start_timestamp);
}

#[tokio::test]
async fn wrongly_typed_event_is_skipped_alone() {
    let mut server = Server::new_async().await;
    mock_events(
        &mut server,
        DAY,
        vec![
            event(1, singles(10, "Fomin S.", "fomin-s"), singles(11, "Dubois A.", "dubois-a"), "Ended"),
            json!({"id": 2, "startTimestamp": "soon"}),
        ],
    )
    .await;

    let store = MemoryStore::new();
    let no_stats = IngestSettings {
        fetch_statistics: false,
        ..settings()
    };
    let summary = assert_ok!(ingestor(&server, store.clone(), no_stats).ingest_day(date(DAY)).await);

    assert_eq!(summary.events_seen, 2);
    assert_eq!(summary.matches_created, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(store.counts().await.unwrap().matches, 1);
}

#[tokio::test]
async fn dump_writes_one_line_per_event() {
    let mut server = Server::new_async().await;
    mock_events(
        &mut server,
        DAY,
        vec![
            event(1, singles(10, "Fomin S.", "fomin-s"), singles(11, "Dubois A.", "dubois-a"), "Ended"),
            event(2, singles(12, "Kim S.", "kim-s"), singles(13, "Lee J.", "lee-j"), "Ended"),
        ],
    )
    .await;
    mock_statistics(&mut server, 1, 200, statistics_body()).await;
    mock_statistics(&mut server, 2, 500, String::new()).await;

    let mut out = Vec::new();
    let written = assert_ok!(dump_day(&api(&server), &fast_retry(), date(DAY), &mut out).await);
    assert_eq!(written, 2);

    let lines: Vec<Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["event"]["id"], 1);
    assert_eq!(lines[0]["statistics"]["statistics"][0]["groups"][0]["statisticsItems"][0]["name"], "Aces");
    assert_eq!(lines[1]["event"]["id"], 2);
    assert!(lines[1]["statistics"].is_null());
}

#[tokio::test]
async fn failed_statistics_fetch_does_not_stop_the_day() {
    let mut server = Server::new_async().await;
    mock_events(
        &mut server,
        DAY,
        vec![
            event(1, singles(10, "Fomin S.", "fomin-s"), singles(11, "Dubois A.", "dubois-a"), "Ended"),
            event(2, singles(12, "Kim S.", "kim-s"), singles(13, "Lee J.", "lee-j"), "Ended"),
        ],
    )
    .await;
    mock_statistics(&mut server, 1, 500, String::new()).await;
    mock_statistics(&mut server, 2, 200, statistics_body()).await;

    let store = MemoryStore::new();
    let summary = ingestor(&server, store.clone(), settings())
        .ingest_day(date(DAY))
        .await
        .unwrap();

    assert_eq!(summary.matches_created, 2);
    assert_eq!(summary.statistics_skipped, 1);
    assert_eq!(summary.statistics_rows, 2);

    let tables = store.snapshot().await;
    let failed = tables.match_by_event(1).unwrap().id;
    let ok = tables.match_by_event(2).unwrap().id;
    assert!(tables.statistics_for(failed).is_empty());
    assert_eq!(tables.statistics_for(ok).len(), 2);
}

#[tokio::test]
async fn doubles_and_singles_resolve_to_expected_players() {
    let doubles_listed = json!({
        "id": 500, "name": "Kim S. / Lee J.", "slug": "kim-s-lee-j", "type": 2,
        "subTeams": [
            {"id": 12, "name": "Kim S.", "slug": "kim-s", "country": {"alpha2": "KR"}},
            {"id": 13, "name": "Lee J.", "slug": "lee-j", "country": {"alpha2": "KR"}}
        ]
    });
    let doubles_unlisted = json!({
        "id": 501, "name": "Moreau C. / Petit L.", "slug": "moreau-c-petit-l", "type": 2
    });

    let mut server = Server::new_async().await;
    mock_events(
        &mut server,
        DAY,
        vec![
            event(1, doubles_listed, doubles_unlisted, "Ended"),
            event(2, singles(10, "Fomin S.", "fomin-s"), singles(11, "Dubois A.", "dubois-a"), "Ended"),
        ],
    )
    .await;

    let store = MemoryStore::new();
    ingestor(&server, store.clone(), settings())
        .ingest_day(date(DAY))
        .await
        .unwrap();

    let tables = store.snapshot().await;
    let doubles = tables.match_by_event(1).unwrap();
    let listed = tables.team_players(doubles.record.home_team_id);
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|p| p.external_id.is_some()));

    let split = tables.team_players(doubles.record.away_team_id);
    let names: Vec<_> = split.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Moreau C.", "Petit L."]);
    assert!(split.iter().all(|p| p.external_id.is_none()));
    assert_eq!(split[1].slug, "petit-l.");

    let single = tables.match_by_event(2).unwrap();
    assert_eq!(tables.team_players(single.record.home_team_id).len(), 1);
    assert_eq!(tables.team_players(single.record.away_team_id).len(), 1);
}

#[tokio::test]
async fn unusable_and_filtered_events_are_counted_not_stored() {
    let home = singles(10, "Fomin S.", "fomin-s");
    let away = singles(11, "Dubois A.", "dubois-a");

    let mut no_season = event(1, home.clone(), away.clone(), "Ended");
    no_season["season"] = json!({"name": "No id"});

    let mut no_start = event(2, home.clone(), away.clone(), "Ended");
    no_start.as_object_mut().unwrap().remove("startTimestamp");

    let mut atp = event(3, home.clone(), away.clone(), "Ended");
    atp["tournament"]["id"] = json!(9100);
    atp["tournament"]["slug"] = json!("atp-dallas");

    let kept = event(4, home, away, "Ended");

    let mut server = Server::new_async().await;
    mock_events(&mut server, DAY, vec![no_season, no_start, atp, kept]).await;

    let store = MemoryStore::new();
    let filtered = IngestSettings {
        tournament_filter: Some("itf".to_string()),
        fetch_statistics: false,
        ..settings()
    };
    let summary = ingestor(&server, store.clone(), filtered)
        .ingest_day(date(DAY))
        .await
        .unwrap();

    assert_eq!(summary.events_seen, 4);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.filtered, 1);
    assert_eq!(summary.matches_created, 1);

    let tables = store.snapshot().await;
    assert_eq!(tables.matches.len(), 1);
    assert!(tables.match_by_event(4).is_some());
}

#[tokio::test]
async fn range_survives_a_failed_day() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/scheduled-events/2023-02-01")
        .with_status(503)
        .create_async()
        .await;
    mock_events(
        &mut server,
        "2023-02-02",
        vec![event(1, singles(10, "Fomin S.", "fomin-s"), singles(11, "Dubois A.", "dubois-a"), "Ended")],
    )
    .await;

    let store = MemoryStore::new();
    let ingestor = ingestor(&server, store.clone(), settings());
    let run = RunConfig::new(date("2023-02-01"), date("2023-02-02"), fast_retry(), 31).unwrap();

    let summary = ingestor.ingest_range(&run).await.unwrap();
    assert_eq!(summary.days, 2);
    assert_eq!(summary.days_failed, 1);
    assert_eq!(summary.matches_created, 1);
}

#[tokio::test]
async fn range_fails_when_every_day_fails() {
    let mut server = Server::new_async().await;
    for day in ["2023-02-01", "2023-02-02"] {
        server
            .mock("GET", format!("/scheduled-events/{}", day).as_str())
            .with_status(500)
            .create_async()
            .await;
    }

    let ingestor = ingestor(&server, MemoryStore::new(), settings());
    let run = RunConfig::new(date("2023-02-01"), date("2023-02-02"), fast_retry(), 31).unwrap();

    let err = assert_err!(ingestor.ingest_range(&run).await);
    assert!(matches!(err, RunError::ApiUnreachable { days: 2 }));
    let (_, health) = ingestor.health().report().await;
    assert_eq!(health["consecutive_errors"], 2);
}

#[tokio::test]
async fn statistics_for_unknown_event_is_match_not_found() {
    let server = Server::new_async().await;
    let ingestor = ingestor(&server, MemoryStore::new(), settings());

    let err = assert_err!(ingestor.ingest_statistics(404).await);
    assert!(matches!(err, IngestError::MatchNotFound(404)));
}

#[tokio::test]
async fn statistics_can_be_refreshed_for_one_event() {
    let mut server = Server::new_async().await;
    mock_events(
        &mut server,
        DAY,
        vec![event(1, singles(10, "Fomin S.", "fomin-s"), singles(11, "Dubois A.", "dubois-a"), "Ended")],
    )
    .await;
    mock_statistics(&mut server, 1, 200, statistics_body()).await;

    let store = MemoryStore::new();
    let ingestor = ingestor(
        &server,
        store.clone(),
        IngestSettings {
            fetch_statistics: false,
            ..settings()
        },
    );
    ingestor.ingest_day(date(DAY)).await.unwrap();
    assert_eq!(store.counts().await.unwrap().match_statistics, 0);

    let rows = ingestor.ingest_statistics(1).await.unwrap();
    assert_eq!(rows, 2);
    assert_eq!(store.counts().await.unwrap().match_statistics, 2);
}
