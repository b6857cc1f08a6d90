use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::board_analysis::TacticalTagKind;
use crate::documents::GameAnalysis;

/// How often one motif shows up across the analysed games.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStat {
    pub motif: TacticalTagKind,
    pub occurrences: u32,
    /// Played by the player.
    pub by_player: u32,
    /// Played against the player.
    pub against_player: u32,
    pub games_with_pattern: u32,
    pub frequency_per_game: f64,
    /// 0..=100.
    pub percentage_of_games: f64,
}

/// Tactical motif counts over a whole corpus, both sides included.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TacticalPatternStats {
    pub games: u32,
    pub total_tags: u32,
    /// Tags per game.
    pub richness: f64,
    /// Most frequent first, ties in tie-break order.
    pub patterns: Vec<PatternStat>,
}

#[derive(Default)]
struct Tally {
    occurrences: u32,
    by_player: u32,
    games: u32,
}

impl TacticalPatternStats {
    pub fn from_games(games: &[GameAnalysis]) -> Self {
        let mut tallies: BTreeMap<TacticalTagKind, Tally> = BTreeMap::new();
        for game in games {
            let mut seen: Vec<TacticalTagKind> = Vec::new();
            for m in &game.moves {
                for tag in &m.tactics {
                    let tally = tallies.entry(tag.kind).or_default();
                    tally.occurrences += 1;
                    if m.mover == game.player_color {
                        tally.by_player += 1;
                    }
                    if !seen.contains(&tag.kind) {
                        seen.push(tag.kind);
                        tally.games += 1;
                    }
                }
            }
        }

        let count = games.len() as u32;
        let per_game = |n: u32| if count == 0 { 0.0 } else { f64::from(n) / f64::from(count) };
        let mut patterns: Vec<PatternStat> = tallies
            .into_iter()
            .map(|(motif, t)| PatternStat {
                motif,
                occurrences: t.occurrences,
                by_player: t.by_player,
                against_player: t.occurrences - t.by_player,
                games_with_pattern: t.games,
                frequency_per_game: per_game(t.occurrences),
                percentage_of_games: per_game(t.games) * 100.0,
            })
            .collect();
        // Stable: equal counts keep the map's motif order.
        patterns.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));

        let total_tags = patterns.iter().map(|p| p.occurrences).sum();
        Self {
            games: count,
            total_tags,
            richness: per_game(total_tags),
            patterns,
        }
    }

    pub fn most_common(&self, n: usize) -> &[PatternStat] {
        &self.patterns[..n.min(self.patterns.len())]
    }

    pub fn get(&self, motif: TacticalTagKind) -> Option<&PatternStat> {
        self.patterns.iter().find(|p| p.motif == motif)
    }
}
