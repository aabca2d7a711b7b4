// Escalation submitter: authenticated calls on behalf of a stored team.
//
// A 401 triggers one token refresh, persisted before the single retry.

use serde::Deserialize;
use tracing::{info, warn};

use escalador_core::db::Database;
use escalador_core::error::{EscalacaoError, Result};
use escalador_core::model::{LineupPayload, Team};

use crate::cartola::{body_preview, CartolaClient, HttpRequest, HttpResponse, Transport};

const UNAUTHORIZED: u16 = 401;
const CONFLICT: u16 = 409;

#[derive(Debug, Deserialize)]
struct RawTeamData {
    patrimonio: f64,
}

#[derive(Debug, Deserialize)]
struct RawSaveResponse {
    #[serde(default)]
    mensagem: Option<String>,
}

pub struct Submitter<'a, T: Transport> {
    db: &'a Database,
    client: &'a CartolaClient<T>,
}

impl<'a, T: Transport> Submitter<'a, T> {
    pub fn new(db: &'a Database, client: &'a CartolaClient<T>) -> Self {
        Self { db, client }
    }

    fn load_team(&self, team_id: i64) -> Result<Team> {
        self.db
            .team(team_id)?
            .ok_or(EscalacaoError::TokenUnavailable { team_id })
    }

    /// Send the request built by `build` with the team's access token. On
    /// 401 the tokens are refreshed and stored, and the request is sent once
    /// more with the new token. The second response is returned as is.
    pub async fn authorized<F>(&self, team_id: i64, build: F) -> Result<HttpResponse>
    where
        F: Fn(&str) -> Result<HttpRequest>,
    {
        let team = self.load_team(team_id)?;
        let Some(token) = team.access_token.as_deref().filter(|t| !t.is_empty()) else {
            return Err(EscalacaoError::TokenUnavailable { team_id });
        };

        let response = self.client.send(build(token)?).await?;
        if response.status != UNAUTHORIZED {
            return Ok(response);
        }

        info!("access token of team {team_id} expired, refreshing");
        let tokens = self.client.refresh_tokens(&team).await?;
        self.db.update_team_tokens(
            team_id,
            &tokens.access_token,
            tokens.refresh_token.as_deref(),
            tokens.id_token.as_deref(),
        )?;
        self.client.send(build(&tokens.access_token)?).await
    }

    /// Team budget ("patrimônio") from the authenticated team endpoint.
    pub async fn fetch_patrimonio(&self, team_id: i64) -> Result<f64> {
        let response = self
            .authorized(team_id, |token| Ok(self.client.team_request(token)))
            .await?;
        if response.status == UNAUTHORIZED {
            return Err(EscalacaoError::TokenUnavailable { team_id });
        }
        if !response.is_success() {
            return Err(EscalacaoError::UpstreamRejected {
                status: response.status,
                message: body_preview(&response.body),
            });
        }
        Ok(response.json::<RawTeamData>()?.patrimonio)
    }

    /// Post the lineup once (plus the single retry after a refresh).
    ///
    /// Success requires a 2xx whose `mensagem` equals the configured success
    /// message.
    pub async fn submit_lineup(&self, team_id: i64, payload: &LineupPayload) -> Result<()> {
        let response = self
            .authorized(team_id, |token| self.client.save_lineup_request(token, payload))
            .await?;

        if response.status == CONFLICT {
            warn!(
                "team {team_id}: lineup conflict (HTTP 409): {}",
                body_preview(&response.body)
            );
            return Err(EscalacaoError::UpstreamConflict);
        }
        if !response.is_success() {
            return Err(EscalacaoError::UpstreamRejected {
                status: response.status,
                message: body_preview(&response.body),
            });
        }

        let expected = &self.client.api().success_message;
        let mensagem = serde_json::from_str::<RawSaveResponse>(&response.body)
            .ok()
            .and_then(|r| r.mensagem);
        match mensagem {
            Some(m) if &m == expected => {
                info!("team {team_id}: {m}");
                Ok(())
            }
            other => Err(EscalacaoError::UpstreamRejected {
                status: response.status,
                message: other.unwrap_or_else(|| body_preview(&response.body)),
            }),
        }
    }
}
