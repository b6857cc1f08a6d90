use std::collections::HashMap;

use crate::game::GameResult;

/// A parsed PGN game. Moves are kept as recorded SAN; they are validated
/// when the game is replayed, not here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PgnGame {
    pub tags: HashMap<String, String>,
    pub moves: Vec<String>,
    /// `[%clk]` remaining time after each move, when the export carries it.
    pub clocks_ms: Vec<Option<u64>>,
    pub result: Option<GameResult>,
}

impl PgnGame {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.moves.is_empty()
    }
}

/// Parse a PGN string holding a single game
pub fn parse_pgn(input: &str) -> Result<PgnGame, PgnError> {
    parse_pgn_games(input)?
        .into_iter()
        .next()
        .ok_or(PgnError::InvalidFormat)
}

/// Parse every game in a PGN file
pub fn parse_pgn_games(input: &str) -> Result<Vec<PgnGame>, PgnError> {
    let chars: Vec<char> = input.chars().collect();
    let mut games = Vec::new();
    let mut game = PgnGame::default();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '[' => {
                // Tags after movetext start the next game.
                if !game.moves.is_empty() || game.result.is_some() {
                    games.push(std::mem::take(&mut game));
                }
                let end = find(&chars, i, ']').ok_or(PgnError::InvalidFormat)?;
                let raw: String = chars[i + 1..end].iter().collect();
                let (name, value) = parse_tag(&raw)?;
                game.tags.insert(name, value);
                i = end + 1;
            }
            '{' => {
                let end = find(&chars, i, '}').ok_or(PgnError::UnterminatedComment)?;
                let comment: String = chars[i + 1..end].iter().collect();
                if let (Some(ms), Some(slot)) = (parse_clock(&comment), game.clocks_ms.last_mut()) {
                    *slot = Some(ms);
                }
                i = end + 1;
            }
            ';' => {
                i = find(&chars, i, '\n').map_or(chars.len(), |end| end + 1);
            }
            '(' => i = skip_variation(&chars, i)?,
            ')' => return Err(PgnError::UnbalancedVariation),
            _ => {
                let start = i;
                while i < chars.len() && !is_delimiter(chars[i]) {
                    i += 1;
                }
                let token: String = chars[start..i].iter().collect();
                match token.as_str() {
                    "1-0" => game.result = Some(GameResult::WhiteWins),
                    "0-1" => game.result = Some(GameResult::BlackWins),
                    "1/2-1/2" => game.result = Some(GameResult::Draw),
                    "*" => {}
                    t if t.starts_with('$') => {}
                    t => {
                        let san = strip_move_number(t).trim_end_matches(['!', '?']);
                        if !san.is_empty() {
                            game.moves.push(san.to_string());
                            game.clocks_ms.push(None);
                        }
                    }
                }
            }
        }
    }

    if !game.is_empty() {
        games.push(game);
    }
    Ok(games)
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '[' | '{' | '(' | ')' | ';')
}

fn find(chars: &[char], from: usize, needle: char) -> Option<usize> {
    chars[from..]
        .iter()
        .position(|c| *c == needle)
        .map(|offset| from + offset)
}

/// Skip a (possibly nested) variation, returning the index after its `)`.
fn skip_variation(chars: &[char], start: usize) -> Result<usize, PgnError> {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i + 1);
                }
            }
            '{' => {
                i = find(chars, i, '}').ok_or(PgnError::UnterminatedComment)?;
            }
            _ => {}
        }
        i += 1;
    }
    Err(PgnError::UnbalancedVariation)
}

/// "12." / "12..." / "12.e4" -> "" / "" / "e4"
fn strip_move_number(token: &str) -> &str {
    let digits = token.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 && token[digits..].starts_with('.') {
        token[digits..].trim_start_matches('.')
    } else {
        token
    }
}

fn parse_tag(raw: &str) -> Result<(String, String), PgnError> {
    let raw = raw.trim();
    let (name, rest) = raw
        .split_once(char::is_whitespace)
        .ok_or_else(|| PgnError::InvalidTag(raw.to_string()))?;
    let value = rest
        .trim()
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .ok_or_else(|| PgnError::InvalidTag(raw.to_string()))?;
    Ok((name.to_string(), value.replace("\\\"", "\"")))
}

/// Extract `[%clk h:mm:ss(.f)]` from a comment body as milliseconds.
fn parse_clock(comment: &str) -> Option<u64> {
    let start = comment.find("[%clk")? + "[%clk".len();
    let end = start + comment[start..].find(']')?;
    let mut total = 0.0f64;
    for part in comment[start..end].trim().split(':') {
        total = total * 60.0 + part.parse::<f64>().ok()?;
    }
    Some((total * 1000.0).round() as u64)
}

#[derive(Debug, thiserror::Error)]
pub enum PgnError {
    #[error("Invalid PGN format")]
    InvalidFormat,
    #[error("Invalid tag: {0}")]
    InvalidTag(String),
    #[error("Unterminated comment")]
    UnterminatedComment,
    #[error("Unbalanced variation")]
    UnbalancedVariation,
}

#[cfg(test)]
mod tests {
    use super::*;

    const LICHESS: &str = r#"[Event "Rated Blitz game"]
[White "alice"]
[Black "bob"]
[Result "0-1"]
[TimeControl "180+2"]

1. e4 { [%clk 0:03:00] } 1... c5 { [%clk 0:02:58.5] } 2. Nf3 $1 (2. c3 d5 (2... Nf6)) 2... d6?! ; a comment
3. d4 { [%clk 0:02:40] } 0-1
"#;

    #[test]
    fn parses_tags_moves_clocks_and_result() {
        let game = parse_pgn(LICHESS).unwrap();
        assert_eq!(game.tag("White"), Some("alice"));
        assert_eq!(game.moves, vec!["e4", "c5", "Nf3", "d6", "d4"]);
        assert_eq!(
            game.clocks_ms,
            vec![Some(180_000), Some(178_500), None, None, Some(160_000)]
        );
        assert_eq!(game.result, Some(GameResult::BlackWins));
    }

    #[test]
    fn splits_multiple_games() {
        let input = "[White \"a\"]\n\n1. e4 e5 1-0\n\n[White \"b\"]\n\n1.d4 d5 1/2-1/2\n";
        let games = parse_pgn_games(input).unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[1].tag("White"), Some("b"));
        assert_eq!(games[1].moves, vec!["d4", "d5"]);
        assert_eq!(games[1].result, Some(GameResult::Draw));
    }

    #[test]
    fn rejects_broken_input() {
        assert!(matches!(
            parse_pgn("1. e4 { never closed"),
            Err(PgnError::UnterminatedComment)
        ));
        assert!(matches!(
            parse_pgn("1. e4 (1. d4"),
            Err(PgnError::UnbalancedVariation)
        ));
        assert!(matches!(parse_pgn("[White]"), Err(PgnError::InvalidTag(_))));
        assert!(matches!(parse_pgn("   "), Err(PgnError::InvalidFormat)));
    }
}
