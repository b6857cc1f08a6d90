use cozy_chess::{Board, Color, Move};

use super::attack_map::AttackMap;
use super::tactical_types::TacticalTag;

/// Pre-computed context passed to every tactical detector.
///
/// Carries the position before and after one move, the attack maps of both,
/// and the mover-oriented evaluations when they are known. Detectors treat it
/// as read-only; they hold no state across plies.
pub struct TacticalContext<'a> {
    /// Position before the move was played.
    pub before: &'a Board,
    /// Position after the move was played.
    pub after: &'a Board,
    /// The move that was played.
    pub mv: Move,
    /// Side to move in the *before* position, i.e. the mover.
    pub side_to_move_before: Color,
    /// Attack map for the *before* position.
    pub before_attacks: &'a AttackMap,
    /// Attack map for the *after* position.
    pub after_attacks: &'a AttackMap,
    /// Centipawns before the move, from the mover's point of view.
    pub eval_before: Option<i32>,
    /// Centipawns after the move, from the mover's point of view.
    pub eval_after: Option<i32>,
}

/// A modular tactical pattern detector.
///
/// Each detector is a zero-sized struct that inspects a `TacticalContext` and
/// returns any tactical tags it finds for the mover.
pub trait TacticalDetector {
    fn detect(&self, ctx: &TacticalContext) -> Vec<TacticalTag>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use cozy_chess::{Board, Move};

    use super::TacticalContext;
    use crate::board_analysis::attack_map::AttackMap;

    /// Owns the boards and attack maps a context borrows from.
    pub struct Fixture {
        pub before: Board,
        pub after: Board,
        pub mv: Move,
        pub before_attacks: AttackMap,
        pub after_attacks: AttackMap,
    }

    impl Fixture {
        /// Play `uci` (cozy-chess notation) on `fen`.
        pub fn new(fen: &str, uci: &str) -> Self {
            let before: Board = fen.parse().expect("valid fen");
            let mv: Move = chess::parse_uci_move(uci).expect("valid uci");
            let mut after = before.clone();
            after.play(mv);
            Self {
                before_attacks: AttackMap::compute(&before),
                after_attacks: AttackMap::compute(&after),
                before,
                after,
                mv,
            }
        }

        pub fn ctx(&self) -> TacticalContext<'_> {
            self.ctx_with_evals(None, None)
        }

        pub fn ctx_with_evals(
            &self,
            eval_before: Option<i32>,
            eval_after: Option<i32>,
        ) -> TacticalContext<'_> {
            TacticalContext {
                before: &self.before,
                after: &self.after,
                mv: self.mv,
                side_to_move_before: self.before.side_to_move(),
                before_attacks: &self.before_attacks,
                after_attacks: &self.after_attacks,
                eval_before,
                eval_after,
            }
        }
    }
}
