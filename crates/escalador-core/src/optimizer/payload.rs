// Upstream payload and human-readable summary of a lineup.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::Lineup;
use crate::model::{LineupPayload, ESQUEMA_4_3_3};

impl Lineup {
    /// Save-lineup payload. The luxury reserve appears both under the
    /// captain position in `reservas` and as `reserva_luxo_id`.
    pub fn to_payload(&self) -> LineupPayload {
        let reservas: BTreeMap<String, i64> = self
            .reserves
            .iter()
            .map(|(position, pick)| (position.id().to_string(), pick.athlete_id))
            .collect();
        LineupPayload {
            esquema: ESQUEMA_4_3_3,
            atletas: self.starter_ids(),
            capitao: self.captain_id,
            reservas,
            reserva_luxo_id: self.luxury.as_ref().map(|p| p.athlete_id),
        }
    }

    /// Multi-line description for logs: one line per starter, then the bench.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Escalação 4-3-3 | custo C$ {:.2}{}",
            self.cost,
            if self.closed_defense { " | defesa fechada" } else { "" }
        );
        for pick in &self.starters {
            let captain = if pick.athlete_id == self.captain_id { " (C)" } else { "" };
            let _ = writeln!(
                out,
                "  {:<9} {}{} [{}] C$ {:.2} | {:.2}",
                pick.position.display_str(),
                pick.nickname,
                captain,
                pick.athlete_id,
                pick.price,
                pick.score
            );
        }
        if !self.reserves.is_empty() {
            let _ = writeln!(out, "Reservas:");
            for (position, pick) in &self.reserves {
                let luxury = if self.luxury.as_ref().map(|l| l.athlete_id) == Some(pick.athlete_id) {
                    " (luxo)"
                } else {
                    ""
                };
                let _ = writeln!(
                    out,
                    "  {:<9} {}{} [{}] C$ {:.2}",
                    position.display_str(),
                    pick.nickname,
                    luxury,
                    pick.athlete_id,
                    pick.price
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Position;
    use crate::optimizer::Pick;

    fn pick(id: i64, position: Position) -> Pick {
        Pick {
            athlete_id: id,
            nickname: format!("Atleta{id}"),
            position,
            club_id: 1,
            price: 5.0,
            score: 1.0,
        }
    }

    fn lineup() -> Lineup {
        let mut starters = Vec::new();
        let mut id = 1;
        for position in Position::ALL {
            for _ in 0..position.formation_count() {
                starters.push(pick(id, position));
                id += 1;
            }
        }
        let mut reserves = BTreeMap::new();
        reserves.insert(Position::Atacante, pick(99, Position::Atacante));
        reserves.insert(Position::Meia, pick(98, Position::Meia));
        Lineup {
            cost: 60.0,
            starters,
            reserves,
            luxury: Some(pick(99, Position::Atacante)),
            captain_id: 9,
            captain_position: Position::Atacante,
            closed_defense: false,
        }
    }

    #[test]
    fn payload_keys_reserves_by_position_id() {
        let payload = lineup().to_payload();
        assert_eq!(payload.esquema, 3);
        assert_eq!(payload.atletas, (1..=12).collect::<Vec<i64>>());
        assert_eq!(payload.capitao, 9);
        assert_eq!(payload.reservas.get("5"), Some(&99));
        assert_eq!(payload.reservas.get("4"), Some(&98));
        assert_eq!(payload.reserva_luxo_id, Some(99));
    }

    #[test]
    fn summary_marks_captain_and_luxury() {
        let text = lineup().summary();
        assert!(text.contains("Atleta9 (C)"));
        assert!(text.contains("Atleta99 (luxo)"));
        assert_eq!(text.lines().filter(|l| l.starts_with("  ")).count(), 14);
    }
}
