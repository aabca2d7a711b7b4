// Integration tests for lineup submission and the per-team pipeline.
//
// A scripted transport replays canned responses in order and records every
// request, so token refresh, error mapping and the batch run can be checked
// without a network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use escalador_app::cartola::{
    CartolaClient, HttpRequest, HttpResponse, Method, Transport, TransportError, BODY_PREVIEW_CHARS,
};
use escalador_app::pipeline::Pipeline;
use escalador_app::season::SeasonCache;
use escalador_app::submitter::Submitter;
use escalador_core::config::{ApiConfig, Config, PipelineConfig, ScoringConfig};
use escalador_core::db::Database;
use escalador_core::error::EscalacaoError;
use escalador_core::model::{Athlete, Club, LineupPayload, Match, Position, Team};

// ===========================================================================
// Test helpers
// ===========================================================================

type Scripted = std::result::Result<HttpResponse, TransportError>;

#[derive(Clone, Default)]
struct ScriptedTransport {
    responses: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl ScriptedTransport {
    fn new(responses: Vec<Scripted>) -> Self {
        ScriptedTransport {
            responses: Arc::new(Mutex::new(responses.into())),
            requests: Arc::default(),
        }
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Scripted {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other("no scripted response left".into())))
    }
}

fn ok(status: u16, body: &str) -> Scripted {
    Ok(HttpResponse {
        status,
        body: body.to_string(),
    })
}

const SUCCESS: &str = r#"{"mensagem": "Time Escalado! Boa Sorte!"}"#;

fn team(team_id: i64, access: Option<&str>) -> Team {
    Team {
        team_id,
        user_id: 1,
        name: format!("Time {team_id}"),
        access_token: access.map(str::to_string),
        refresh_token: Some("refresh-old".into()),
        id_token: Some("id-old".into()),
    }
}

fn db_with_team(access: Option<&str>) -> Database {
    let db = Database::open(":memory:").unwrap();
    db.upsert_team(&team(1, access)).unwrap();
    db
}

fn client(transport: ScriptedTransport) -> CartolaClient<ScriptedTransport> {
    CartolaClient::new(transport, ApiConfig::default())
}

fn payload() -> LineupPayload {
    LineupPayload {
        esquema: 3,
        atletas: (1..=12).collect(),
        capitao: 9,
        reservas: Default::default(),
        reserva_luxo_id: None,
    }
}

fn bearer_of(request: &HttpRequest) -> Option<&str> {
    request.bearer.as_deref()
}

// ===========================================================================
// Submitter
// ===========================================================================

#[tokio::test]
async fn successful_submission_posts_once_with_game_headers() {
    let transport = ScriptedTransport::new(vec![ok(200, SUCCESS)]);
    let db = db_with_team(Some("tok"));
    let client = client(transport.clone());

    Submitter::new(&db, &client).submit_lineup(1, &payload()).await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.method, Method::Post);
    assert!(req.url.ends_with("/auth/time/salvar"));
    assert_eq!(bearer_of(req), Some("tok"));
    assert!(req.headers.contains(&("x-glb-app", "cartola_web".to_string())));
    assert!(req.headers.contains(&("x-glb-auth", "oidc".to_string())));
    assert_eq!(req.body.as_ref().unwrap()["capitao"], 9);
}

#[tokio::test]
async fn expired_token_is_refreshed_persisted_and_retried_once() {
    let transport = ScriptedTransport::new(vec![
        ok(401, "expired"),
        ok(
            200,
            r#"{"access_token": "tok-new", "refresh_token": "refresh-new", "id_token": "id-new"}"#,
        ),
        ok(200, SUCCESS),
    ]);
    let db = db_with_team(Some("tok-old"));
    let client = client(transport.clone());

    Submitter::new(&db, &client).submit_lineup(1, &payload()).await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[1].url.ends_with("/v1/refresh-token"));
    let refresh_body = requests[1].body.as_ref().unwrap();
    assert_eq!(refresh_body["client_id"], "cartola-web@apps.globoid");
    assert_eq!(refresh_body["refresh_token"], "refresh-old");
    assert_eq!(bearer_of(&requests[2]), Some("tok-new"));

    let stored = db.team(1).unwrap().unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("tok-new"));
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-new"));
    assert_eq!(stored.id_token.as_deref(), Some("id-new"));
}

#[tokio::test]
async fn second_unauthorized_is_not_retried_again() {
    let transport = ScriptedTransport::new(vec![
        ok(401, ""),
        ok(200, r#"{"access_token": "tok-new"}"#),
        ok(401, "still expired"),
    ]);
    let db = db_with_team(Some("tok"));
    let client = client(transport.clone());

    let err = Submitter::new(&db, &client).submit_lineup(1, &payload()).await.unwrap_err();
    assert!(matches!(err, EscalacaoError::UpstreamRejected { status: 401, .. }));
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test]
async fn failed_refresh_means_token_unavailable() {
    let transport = ScriptedTransport::new(vec![ok(401, ""), ok(400, r#"{"error": "invalid_grant"}"#)]);
    let db = db_with_team(Some("tok"));
    let client = client(transport.clone());

    let err = Submitter::new(&db, &client).submit_lineup(1, &payload()).await.unwrap_err();
    assert!(matches!(err, EscalacaoError::TokenUnavailable { team_id: 1 }));
    assert_eq!(db.team(1).unwrap().unwrap().access_token.as_deref(), Some("tok"));
}

#[tokio::test]
async fn missing_token_sends_nothing() {
    let transport = ScriptedTransport::new(Vec::new());
    let db = db_with_team(None);
    let client = client(transport.clone());

    let err = Submitter::new(&db, &client).submit_lineup(1, &payload()).await.unwrap_err();
    assert!(matches!(err, EscalacaoError::TokenUnavailable { team_id: 1 }));
    let err = Submitter::new(&db, &client).submit_lineup(99, &payload()).await.unwrap_err();
    assert!(matches!(err, EscalacaoError::TokenUnavailable { team_id: 99 }));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn conflict_maps_to_upstream_conflict() {
    let transport = ScriptedTransport::new(vec![ok(409, r#"{"mensagem": "Time já escalado"}"#)]);
    let db = db_with_team(Some("tok"));
    let client = client(transport);

    let err = Submitter::new(&db, &client).submit_lineup(1, &payload()).await.unwrap_err();
    assert!(matches!(err, EscalacaoError::UpstreamConflict));
}

#[tokio::test]
async fn server_error_carries_a_body_preview() {
    let body = "e".repeat(BODY_PREVIEW_CHARS * 2);
    let transport = ScriptedTransport::new(vec![ok(500, &body)]);
    let db = db_with_team(Some("tok"));
    let client = client(transport);

    match Submitter::new(&db, &client).submit_lineup(1, &payload()).await {
        Err(EscalacaoError::UpstreamRejected { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message.chars().count(), BODY_PREVIEW_CHARS + 3);
        }
        other => panic!("expected UpstreamRejected, got {other:?}"),
    }
}

#[tokio::test]
async fn success_status_with_other_message_is_rejected() {
    let transport = ScriptedTransport::new(vec![ok(200, r#"{"mensagem": "Rodada encerrada"}"#)]);
    let db = db_with_team(Some("tok"));
    let client = client(transport);

    match Submitter::new(&db, &client).submit_lineup(1, &payload()).await {
        Err(EscalacaoError::UpstreamRejected { status, message }) => {
            assert_eq!(status, 200);
            assert_eq!(message, "Rodada encerrada");
        }
        other => panic!("expected UpstreamRejected, got {other:?}"),
    }
}

#[tokio::test]
async fn timeout_is_a_network_error() {
    let transport = ScriptedTransport::new(vec![Err(TransportError::Timeout)]);
    let db = db_with_team(Some("tok"));
    let client = client(transport);

    let err = Submitter::new(&db, &client).submit_lineup(1, &payload()).await.unwrap_err();
    assert!(matches!(err, EscalacaoError::NetworkError(_)));
}

#[tokio::test]
async fn patrimonio_is_read_from_team_data() {
    let transport = ScriptedTransport::new(vec![ok(200, r#"{"patrimonio": 123.45, "time": {}}"#)]);
    let db = db_with_team(Some("tok"));
    let client = client(transport.clone());

    let patrimonio = Submitter::new(&db, &client).fetch_patrimonio(1).await.unwrap();
    assert!((patrimonio - 123.45).abs() < 1e-9);
    let requests = transport.requests();
    assert_eq!(requests[0].method, Method::Get);
    assert!(requests[0].url.ends_with("/auth/time"));
}

// ===========================================================================
// Season cache
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn season_is_cached_for_an_hour() {
    let status = r#"{"status_mercado": 1, "rodada_atual": 5, "temporada": 2025}"#;
    let transport = ScriptedTransport::new(vec![ok(200, status), ok(200, status)]);
    let client = client(transport.clone());
    let cache = SeasonCache::default();

    assert_eq!(cache.current_season(&client).await, 2025);
    assert_eq!(cache.current_season(&client).await, 2025);
    assert_eq!(transport.requests().len(), 1);

    tokio::time::advance(std::time::Duration::from_secs(3601)).await;
    assert_eq!(cache.current_season(&client).await, 2025);
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn season_falls_back_to_the_calendar_year() {
    use chrono::Datelike;

    let transport = ScriptedTransport::new(vec![Err(TransportError::Connect("refused".into()))]);
    let client = client(transport);
    let season = SeasonCache::default().current_season(&client).await;
    assert_eq!(season, chrono::Local::now().year());
}

// ===========================================================================
// Pipeline
// ===========================================================================

const ROUND: u32 = 5;

fn config(dry_run: bool) -> Config {
    Config {
        db_path: ":memory:".into(),
        scoring: ScoringConfig {
            usar_provaveis_cartola: false,
            ..ScoringConfig::default()
        },
        api: ApiConfig::default(),
        pipeline: PipelineConfig { round: None, dry_run },
    }
}

/// Two clubs facing each other, three athletes per club and position.
fn seeded_db() -> Database {
    let db = Database::open(":memory:").unwrap();
    db.upsert_clubs(&[
        Club {
            id: 1,
            name: "Clube 1".into(),
            abbreviation: "C1".into(),
        },
        Club {
            id: 2,
            name: "Clube 2".into(),
            abbreviation: "C2".into(),
        },
    ])
    .unwrap();
    db.upsert_matches(&[Match {
        round_id: ROUND,
        home_club_id: 1,
        away_club_id: 2,
        valid: true,
        home_score: None,
        away_score: None,
    }])
    .unwrap();

    let mut athletes = Vec::new();
    let mut id = 1;
    for club in 1..=2 {
        for position in Position::ALL {
            for k in 0..3 {
                athletes.push(Athlete {
                    athlete_id: id,
                    nickname: format!("Atleta {id}"),
                    full_name: String::new(),
                    club_id: club,
                    position_id: position.id(),
                    price: 4.0 + k as f64,
                    season_avg: 3.0 + k as f64,
                    games: 4,
                    status_id: 7,
                });
                id += 1;
            }
        }
    }
    db.upsert_athletes(&athletes).unwrap();
    for club in 1..=2 {
        db.set_club_game_weight(1, club, ROUND, 1.0).unwrap();
        db.set_club_sg_weight(2, club, ROUND, 0.5).unwrap();
    }
    db
}

const MARKET_OPEN: &str = r#"{"status_mercado": 1, "rodada_atual": 5, "temporada": 2025}"#;

#[tokio::test]
async fn closed_market_refuses_to_run() {
    let transport = ScriptedTransport::new(vec![ok(
        200,
        r#"{"status_mercado": 2, "rodada_atual": 5, "temporada": 2025}"#,
    )]);
    let db = seeded_db();
    let client = client(transport.clone());
    let config = config(false);

    let err = Pipeline::new(&db, &client, &config).run_all().await.unwrap_err();
    assert!(matches!(err, EscalacaoError::MarketClosed { round: 5 }));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn batch_run_continues_past_a_failing_team() {
    let transport = ScriptedTransport::new(vec![
        ok(200, MARKET_OPEN),
        ok(200, r#"{"patrimonio": 100.0}"#),
        ok(200, SUCCESS),
    ]);
    let db = seeded_db();
    db.upsert_team(&team(1, Some("tok"))).unwrap();
    db.upsert_team(&team(2, None)).unwrap();
    let client = client(transport.clone());
    let config = config(false);

    let report = Pipeline::new(&db, &client, &config).run_all().await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.team_id, 1);
    assert_eq!(outcome.round, ROUND);
    assert!(outcome.submitted);
    assert_eq!(outcome.lineup.starters.len(), 12);
    assert!(outcome.lineup.cost <= 100.0);

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, 2);
    assert!(matches!(report.failures[0].1, EscalacaoError::TokenUnavailable { team_id: 2 }));

    let requests = transport.requests();
    assert_eq!(requests.len(), 3);
    let posted = requests[2].body.as_ref().unwrap();
    assert_eq!(posted["esquema"], 3);
    assert_eq!(posted["atletas"].as_array().unwrap().len(), 12);
}

#[tokio::test]
async fn dry_run_does_not_post() {
    let transport = ScriptedTransport::new(vec![ok(200, r#"{"patrimonio": 100.0}"#)]);
    let db = seeded_db();
    db.upsert_team(&team(1, Some("tok"))).unwrap();
    let client = client(transport.clone());
    let config = config(true);

    let outcome = Pipeline::new(&db, &client, &config)
        .run_team(&team(1, Some("tok")), ROUND)
        .await
        .unwrap();
    assert!(!outcome.submitted);
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests.iter().all(|r| r.method == Method::Get));
}

#[tokio::test]
async fn configured_round_overrides_the_market() {
    let transport = ScriptedTransport::new(vec![ok(500, "down")]);
    let db = seeded_db();
    let client = client(transport);
    let mut config = config(true);
    config.pipeline.round = Some(9);

    let round = Pipeline::new(&db, &client, &config).open_round().await.unwrap();
    assert_eq!(round, 9);
}
