use std::collections::HashMap;

use super::tactical_types::{TacticalTag, TacticalTagKind};

/// Deduplication key for a tactical tag.
///
/// Two tags are duplicates if they have the same kind, same attacker, and
/// the same victims (as a sorted set).
#[derive(PartialEq, Eq, Hash)]
struct DedupeKey {
    kind: TacticalTagKind,
    attacker: Option<String>,
    victims: Vec<String>, // sorted
}

impl DedupeKey {
    fn from_tag(tag: &TacticalTag) -> Self {
        let mut victims = tag.victims.clone();
        victims.sort();
        Self {
            kind: tag.kind,
            attacker: tag.attacker.clone(),
            victims,
        }
    }
}

/// Reduces a collection of tactical tags by deduplicating and ranking.
///
/// 1. Deduplicates tags that share the same kind, attacker, and victims
///    (as a sorted set), keeping the one with the highest confidence.
/// 2. Sorts by motif tie-break order, then confidence descending, then
///    attacker and victims so equal tags always come out the same way.
/// 3. Truncates to `max_results` if provided.
pub fn reduce_tags(tags: Vec<TacticalTag>, max_results: Option<usize>) -> Vec<TacticalTag> {
    let mut seen: HashMap<DedupeKey, TacticalTag> = HashMap::new();

    for tag in tags {
        let key = DedupeKey::from_tag(&tag);
        seen.entry(key)
            .and_modify(|existing| {
                if tag.confidence > existing.confidence {
                    *existing = tag.clone();
                }
            })
            .or_insert(tag);
    }

    let mut result: Vec<TacticalTag> = seen.into_values().collect();

    result.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
            .then_with(|| a.attacker.cmp(&b.attacker))
            .then_with(|| a.victims.cmp(&b.victims))
    });

    if let Some(n) = max_results {
        result.truncate(n);
    }

    result
}
