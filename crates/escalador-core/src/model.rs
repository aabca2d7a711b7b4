// Domain types shared by the scorers, the optimizer and the datastore.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Cartola status and scheme constants
// ---------------------------------------------------------------------------

/// Status id the game assigns to athletes expected to start ("provável").
pub const STATUS_PROVAVEL: i64 = 7;
/// Status id for doubtful athletes.
pub const STATUS_DUVIDA: i64 = 2;
/// Scheme code for the 4-3-3 formation.
pub const ESQUEMA_4_3_3: u8 = 3;
/// Value of the provável mark that counts as "will play".
pub const PROVAVEL_MARK: &str = "provavel";

/// Cartola position families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Position {
    Goleiro,
    Lateral,
    Zagueiro,
    Meia,
    Atacante,
    Tecnico,
}

impl Position {
    /// All positions in canonical slot order (GK, LAT, ZAG, MEI, ATA, TEC).
    pub const ALL: [Position; 6] = [
        Position::Goleiro,
        Position::Lateral,
        Position::Zagueiro,
        Position::Meia,
        Position::Atacante,
        Position::Tecnico,
    ];

    /// Slot-filling priority. De-escalation walks this list backwards.
    pub const PRIORITY: [Position; 6] = [
        Position::Atacante,
        Position::Lateral,
        Position::Meia,
        Position::Zagueiro,
        Position::Goleiro,
        Position::Tecnico,
    ];

    /// Upstream position id (1..=6).
    pub fn id(&self) -> i64 {
        match self {
            Position::Goleiro => 1,
            Position::Lateral => 2,
            Position::Zagueiro => 3,
            Position::Meia => 4,
            Position::Atacante => 5,
            Position::Tecnico => 6,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Position::Goleiro),
            2 => Some(Position::Lateral),
            3 => Some(Position::Zagueiro),
            4 => Some(Position::Meia),
            5 => Some(Position::Atacante),
            6 => Some(Position::Tecnico),
            _ => None,
        }
    }

    /// Parse a position label. Accepts the plural keys used by the
    /// escalação settings ("atacantes"), singulars and short codes.
    pub fn from_str_pos(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "goleiros" | "goleiro" | "gol" | "gk" => Some(Position::Goleiro),
            "laterais" | "lateral" | "lat" => Some(Position::Lateral),
            "zagueiros" | "zagueiro" | "zag" => Some(Position::Zagueiro),
            "meias" | "meia" | "mei" => Some(Position::Meia),
            "atacantes" | "atacante" | "ata" => Some(Position::Atacante),
            "tecnicos" | "tecnico" | "técnico" | "tec" => Some(Position::Tecnico),
            _ => None,
        }
    }

    /// Plural key, as stored in the escalação settings.
    pub fn plural_key(&self) -> &'static str {
        match self {
            Position::Goleiro => "goleiros",
            Position::Lateral => "laterais",
            Position::Zagueiro => "zagueiros",
            Position::Meia => "meias",
            Position::Atacante => "atacantes",
            Position::Tecnico => "tecnicos",
        }
    }

    pub fn display_str(&self) -> &'static str {
        match self {
            Position::Goleiro => "Goleiro",
            Position::Lateral => "Lateral",
            Position::Zagueiro => "Zagueiro",
            Position::Meia => "Meia",
            Position::Atacante => "Atacante",
            Position::Tecnico => "Técnico",
        }
    }

    /// Starters required by the 4-3-3 formation.
    pub fn formation_count(&self) -> usize {
        match self {
            Position::Goleiro => 1,
            Position::Lateral => 2,
            Position::Zagueiro => 2,
            Position::Meia => 3,
            Position::Atacante => 3,
            Position::Tecnico => 1,
        }
    }

    /// Candidates considered per position by the combinatorial pool.
    pub fn pool_size(&self) -> usize {
        match self {
            Position::Atacante | Position::Lateral | Position::Meia => 10,
            Position::Goleiro | Position::Zagueiro | Position::Tecnico => 5,
        }
    }

    pub fn is_defensive(&self) -> bool {
        matches!(self, Position::Goleiro | Position::Zagueiro | Position::Lateral)
    }

    /// Whether this position may hold the captain armband.
    pub fn can_captain(&self) -> bool {
        !matches!(self, Position::Tecnico)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural_key())
    }
}

// ---------------------------------------------------------------------------
// Stored entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Athlete {
    pub athlete_id: i64,
    pub nickname: String,
    pub full_name: String,
    pub club_id: i64,
    pub position_id: i64,
    pub price: f64,
    pub season_avg: f64,
    pub games: i64,
    pub status_id: i64,
}

impl Athlete {
    pub fn position(&self) -> Option<Position> {
        Position::from_id(self.position_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Club {
    pub id: i64,
    pub name: String,
    pub abbreviation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub round_id: u32,
    pub home_club_id: i64,
    pub away_club_id: i64,
    pub valid: bool,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoutRow {
    pub athlete_id: i64,
    pub round_id: u32,
    pub position_id: i64,
    pub club_id: i64,
    pub entered: bool,
    pub ds: u32,
    pub ff: u32,
    pub fs: u32,
    pub fd: u32,
    pub g: u32,
    pub a: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvavelMark {
    pub athlete_id: i64,
    pub round_id: u32,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularityRow {
    pub athlete_id: i64,
    pub round_id: u32,
    pub escalacoes: i64,
}

/// Team credentials for the upstream API.
#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    pub team_id: i64,
    pub user_id: i64,
    pub name: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
}

/// Token set returned by the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Which weight profiles a (user, team) scores with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightConfiguration {
    pub id: i64,
    pub game_profile_id: i64,
    pub sg_profile_id: i64,
}

impl WeightConfiguration {
    pub const DEFAULT_GAME_PROFILE: i64 = 1;
    pub const DEFAULT_SG_PROFILE: i64 = 2;

    /// Configuration used when the (user, team) never stored one.
    pub fn fallback() -> Self {
        WeightConfiguration {
            id: 0,
            game_profile_id: Self::DEFAULT_GAME_PROFILE,
            sg_profile_id: Self::DEFAULT_SG_PROFILE,
        }
    }
}

/// Lineup strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    Standard,
    ClosedDefense,
}

impl Strategy {
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Strategy::Standard),
            2 => Some(Strategy::ClosedDefense),
            _ => None,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Strategy::Standard => 1,
            Strategy::ClosedDefense => 2,
        }
    }
}

/// Per (user, team) escalação preferences.
#[derive(Debug, Clone, PartialEq)]
pub struct EscalacaoSettings {
    pub captain_position: Position,
    pub strategy: Strategy,
    pub goalkeeper_hack: bool,
    pub formation: String,
}

impl Default for EscalacaoSettings {
    fn default() -> Self {
        EscalacaoSettings {
            captain_position: Position::Atacante,
            strategy: Strategy::Standard,
            goalkeeper_hack: false,
            formation: "4-3-3".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scores and lineups
// ---------------------------------------------------------------------------

/// One ranked athlete with the inputs that produced its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub athlete_id: i64,
    pub nickname: String,
    pub position_id: i64,
    pub club_id: i64,
    pub club_name: String,
    pub opponent_name: Option<String>,
    pub final_score: f64,
    pub popularity_weight: f64,
    /// Named raw inputs (averages, weights) that fed the formula.
    pub inputs: BTreeMap<String, f64>,
}

/// Payload accepted by the upstream save-lineup endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineupPayload {
    pub esquema: u8,
    pub atletas: Vec<i64>,
    pub capitao: i64,
    pub reservas: BTreeMap<String, i64>,
    pub reserva_luxo_id: Option<i64>,
}
