use serde::{Deserialize, Serialize};

/// Tactical motifs, declared in tie-break order: when several match the same
/// ply, the earliest one is the ply's primary tactic. Checks rank last so a
/// checking sacrifice still leads with the sacrifice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TacticalTagKind {
    Fork,
    Pin,
    Skewer,
    DiscoveredAttack,
    DoubleAttack,
    BackRankThreat,
    Sacrifice,
    TrappedPiece,
    Checkmate,
    Check,
}

impl TacticalTagKind {
    pub const ALL: [TacticalTagKind; 10] = [
        Self::Fork,
        Self::Pin,
        Self::Skewer,
        Self::DiscoveredAttack,
        Self::DoubleAttack,
        Self::BackRankThreat,
        Self::Sacrifice,
        Self::TrappedPiece,
        Self::Checkmate,
        Self::Check,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fork => "fork",
            Self::Pin => "pin",
            Self::Skewer => "skewer",
            Self::DiscoveredAttack => "discovered_attack",
            Self::DoubleAttack => "double_attack",
            Self::BackRankThreat => "back_rank_threat",
            Self::Sacrifice => "sacrifice",
            Self::TrappedPiece => "trapped_piece",
            Self::Checkmate => "checkmate",
            Self::Check => "check",
        }
    }

    /// Whether suffering this motif counts against a player. Sacrifices are
    /// the mover's own material and a plain check is part of most games.
    pub fn counts_against_victim(self) -> bool {
        !matches!(self, Self::Sacrifice | Self::Check)
    }
}

impl std::fmt::Display for TacticalTagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TacticalLine {
    pub from: String,
    pub through: Vec<String>,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TacticalEvidence {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<TacticalLine>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub threatened_pieces: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defended_by: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticalTag {
    pub kind: TacticalTagKind,
    pub attacker: Option<String>,
    pub victims: Vec<String>,
    pub target_square: Option<String>,
    pub confidence: f32,
    pub note: Option<String>,
    #[serde(default)]
    pub evidence: TacticalEvidence,
}

#[cfg(test)]
mod tests {
    use super::{TacticalEvidence, TacticalLine, TacticalTag, TacticalTagKind};

    #[test]
    fn tactical_tag_serializes_with_snake_case_kind() {
        let tag = TacticalTag {
            kind: TacticalTagKind::DiscoveredAttack,
            attacker: Some(String::from("a1")),
            victims: vec![String::from("e5")],
            target_square: Some(String::from("e5")),
            confidence: 0.8,
            note: None,
            evidence: TacticalEvidence {
                lines: vec![TacticalLine {
                    from: String::from("a1"),
                    through: vec![String::from("b2"), String::from("c3"), String::from("d4")],
                    to: String::from("e5"),
                }],
                threatened_pieces: vec![String::from("e5")],
                defended_by: vec![],
            },
        };

        let json = serde_json::to_value(&tag).expect("serialize tactical tag");
        assert_eq!(json["kind"], "discovered_attack");
        assert!(json["evidence"].get("defended_by").is_none());

        let restored: TacticalTag = serde_json::from_value(json).expect("deserialize tactical tag");
        assert_eq!(tag, restored);
    }

    #[test]
    fn kinds_order_by_tie_break() {
        let mut kinds = vec![
            TacticalTagKind::Check,
            TacticalTagKind::Sacrifice,
            TacticalTagKind::TrappedPiece,
            TacticalTagKind::Pin,
            TacticalTagKind::Fork,
        ];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                TacticalTagKind::Fork,
                TacticalTagKind::Pin,
                TacticalTagKind::Sacrifice,
                TacticalTagKind::TrappedPiece,
                TacticalTagKind::Check
            ]
        );
    }

    #[test]
    fn every_kind_is_listed_once() {
        let mut all = TacticalTagKind::ALL.to_vec();
        all.dedup();
        assert_eq!(all.len(), TacticalTagKind::ALL.len());
        assert!(all.windows(2).all(|w| w[0] < w[1]));
        assert!(!TacticalTagKind::Check.counts_against_victim());
        assert!(TacticalTagKind::Checkmate.counts_against_victim());
    }
}
