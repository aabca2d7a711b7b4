// Cartola HTTP API client.
//
// Requests go through the `Transport` trait so the submitter and pipeline can
// be driven by a scripted transport in tests. `ReqwestTransport` is the real
// implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use escalador_core::config::ApiConfig;
use escalador_core::error::{EscalacaoError, Result};
use escalador_core::model::{LineupPayload, Team, TokenSet};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const REFRESH_CLIENT_ID: &str = "cartola-web@apps.globoid";
const ORIGIN: &str = "https://cartola.globo.com";
/// Response bodies quoted in errors are cut to this many characters.
pub const BODY_PREVIEW_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outgoing request, independent of the HTTP library.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        HttpRequest {
            method: Method::Get,
            url: url.into(),
            bearer: None,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        HttpRequest {
            method: Method::Post,
            url: url.into(),
            bearer: None,
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| EscalacaoError::UpstreamRejected {
            status: self.status,
            message: format!("unexpected response body ({e}): {}", body_preview(&self.body)),
        })
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("{0}")]
    Other(String),
}

impl From<TransportError> for EscalacaoError {
    fn from(err: TransportError) -> Self {
        EscalacaoError::NetworkError(err.to_string())
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// `reqwest`-backed transport with a per-request timeout.
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        };
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok(HttpResponse { status, body })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

/// First `BODY_PREVIEW_CHARS` characters of a body, with an ellipsis when cut.
pub fn body_preview(body: &str) -> String {
    let mut chars = body.chars();
    let preview: String = chars.by_ref().take(BODY_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{preview}...")
    } else {
        preview
    }
}

// ---------------------------------------------------------------------------
// Market status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketState {
    Open,
    Closed,
    Unknown,
}

impl MarketState {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => MarketState::Open,
            2 => MarketState::Closed,
            _ => MarketState::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketStatus {
    pub state: MarketState,
    pub round: Option<u32>,
    pub season: Option<i32>,
}

impl MarketStatus {
    fn unknown() -> Self {
        MarketStatus {
            state: MarketState::Unknown,
            round: None,
            season: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMarketStatus {
    status_mercado: i64,
    #[serde(default)]
    rodada_atual: Option<u32>,
    #[serde(default)]
    temporada: Option<i32>,
}

// ---------------------------------------------------------------------------
// CartolaClient
// ---------------------------------------------------------------------------

/// Typed access to the Cartola endpoints. Status handling beyond "did the
/// request reach the server" is left to callers.
pub struct CartolaClient<T: Transport> {
    transport: T,
    api: ApiConfig,
}

impl<T: Transport> CartolaClient<T> {
    pub fn new(transport: T, api: ApiConfig) -> Self {
        Self { transport, api }
    }

    pub fn api(&self) -> &ApiConfig {
        &self.api
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api.base_url.trim_end_matches('/'), path)
    }

    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!("{:?} {}", request.method, request.url);
        Ok(self.transport.send(request).await?)
    }

    /// Current market state. Non-2xx or unreadable answers are `Unknown`.
    pub async fn market_status(&self) -> Result<MarketStatus> {
        let response = self.send(HttpRequest::get(self.url("/mercado/status"))).await?;
        if !response.is_success() {
            warn!("market status returned HTTP {}", response.status);
            return Ok(MarketStatus::unknown());
        }
        match serde_json::from_str::<RawMarketStatus>(&response.body) {
            Ok(raw) => Ok(MarketStatus {
                state: MarketState::from_code(raw.status_mercado),
                round: raw.rodada_atual,
                season: raw.temporada,
            }),
            Err(e) => {
                warn!("unreadable market status: {e}");
                Ok(MarketStatus::unknown())
            }
        }
    }

    /// Unauthenticated GET of a public endpoint, parsed as JSON.
    pub async fn get_public<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let response = self.send(HttpRequest::get(self.url(path))).await?;
        if !response.is_success() {
            return Err(EscalacaoError::UpstreamRejected {
                status: response.status,
                message: body_preview(&response.body),
            });
        }
        response.json()
    }

    /// GET of an authenticated endpoint with `token`.
    pub fn authed_get(&self, path: &str, token: &str) -> HttpRequest {
        HttpRequest::get(self.url(path)).bearer(token)
    }

    pub fn team_request(&self, token: &str) -> HttpRequest {
        self.authed_get("/auth/time", token)
    }

    pub fn save_lineup_request(&self, token: &str, payload: &LineupPayload) -> Result<HttpRequest> {
        let body = serde_json::to_value(payload).map_err(|e| EscalacaoError::UpstreamRejected {
            status: 0,
            message: format!("payload could not be encoded: {e}"),
        })?;
        Ok(HttpRequest::post(self.url("/auth/time/salvar"), body)
            .bearer(token)
            .header("x-glb-app", "cartola_web")
            .header("x-glb-auth", "oidc")
            .header("Origin", ORIGIN)
            .header("Referer", format!("{ORIGIN}/")))
    }

    /// Exchange the team's refresh token for a new token set.
    pub async fn refresh_tokens(&self, team: &Team) -> Result<TokenSet> {
        let (Some(access), Some(refresh)) = (&team.access_token, &team.refresh_token) else {
            return Err(EscalacaoError::TokenUnavailable { team_id: team.team_id });
        };
        let url = format!("{}/v1/refresh-token", self.api.auth_url.trim_end_matches('/'));
        let body = json!({
            "client_id": REFRESH_CLIENT_ID,
            "refresh_token": refresh,
            "access_token": access,
            "id_token": team.id_token,
        });
        let request = HttpRequest::post(url, body)
            .header("Origin", ORIGIN)
            .header("Referer", format!("{ORIGIN}/"));

        let response = self.send(request).await?;
        if response.status != 200 {
            warn!(
                "token refresh for team {} failed with HTTP {}: {}",
                team.team_id,
                response.status,
                body_preview(&response.body)
            );
            return Err(EscalacaoError::TokenUnavailable { team_id: team.team_id });
        }
        response
            .json::<TokenSet>()
            .map_err(|_| EscalacaoError::TokenUnavailable { team_id: team.team_id })
    }
}
