//! Tactical pattern detection over one move: attack maps for the positions
//! before and after it, a set of independent detectors, and a reducer that
//! deduplicates and ranks what they find.

pub mod attack_map;
pub mod back_rank_detector;
pub mod check_detector;
pub mod detector;
pub mod discovered_attack_detector;
pub mod fork_detector;
pub mod helpers;
pub mod pin_detector;
pub mod reducer;
pub mod sacrifice_detector;
pub mod skewer_detector;
pub mod tactical_types;
pub mod trapped_piece_detector;

pub use attack_map::{AttackMap, Attacker, PinInfo};
pub use detector::{TacticalContext, TacticalDetector};
pub use tactical_types::{TacticalEvidence, TacticalLine, TacticalTag, TacticalTagKind};

use back_rank_detector::BackRankDetector;
use check_detector::CheckDetector;
use chess::Position;
use discovered_attack_detector::DiscoveredAttackDetector;
use fork_detector::{DoubleAttackDetector, ForkDetector};
use pin_detector::PinDetector;
use reducer::reduce_tags;
use sacrifice_detector::SacrificeDetector;
use skewer_detector::SkewerDetector;
use trapped_piece_detector::TrappedPieceDetector;

/// Run all tactical detectors on the given context and return deduplicated,
/// ranked tags. The first tag, if any, is the move's primary tactic.
pub fn detect_tactics(ctx: &TacticalContext, max_results: Option<usize>) -> Vec<TacticalTag> {
    let detectors: [&dyn TacticalDetector; 9] = [
        &ForkDetector,
        &PinDetector,
        &SkewerDetector,
        &DiscoveredAttackDetector,
        &DoubleAttackDetector,
        &BackRankDetector,
        &SacrificeDetector,
        &TrappedPieceDetector,
        &CheckDetector,
    ];

    let tags: Vec<TacticalTag> = detectors.iter().flat_map(|d| d.detect(ctx)).collect();

    reduce_tags(tags, max_results)
}

/// Tag the move that led from `before` to `after`. Evaluations are
/// mover-oriented centipawns; without them sacrifices are not reported.
///
/// Returns nothing for the starting position, which has no move.
pub fn detect_move_tactics(
    before: &Position,
    after: &Position,
    eval_before: Option<i32>,
    eval_after: Option<i32>,
) -> Vec<TacticalTag> {
    let Some(played) = after.last_move() else {
        return vec![];
    };
    let before_attacks = AttackMap::compute(before.board());
    let after_attacks = AttackMap::compute(after.board());
    let ctx = TacticalContext {
        before: before.board(),
        after: after.board(),
        mv: played.mv,
        side_to_move_before: before.board().side_to_move(),
        before_attacks: &before_attacks,
        after_attacks: &after_attacks,
        eval_before,
        eval_after,
    };
    detect_tactics(&ctx, None)
}
