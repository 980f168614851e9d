use rand::Rng;
use thiserror::Error;

use super::random_char;

const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const LITERAL_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_-";

/// Failures from parsing a pattern or generating codes from it.
#[derive(Debug, Clone, Error)]
pub enum CodegenError {
    #[error("invalid code pattern: {reason}")]
    PatternInvalid { reason: String },

    #[error("pattern exhausted: produced {produced} of {requested} requested unique codes")]
    PatternExhausted { requested: usize, produced: usize },
}

/// Which alphabet a `{...}` placeholder draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    Letters,
    Digits,
    Alphanumeric,
}

impl PlaceholderKind {
    pub fn alphabet(self) -> &'static [u8] {
        match self {
            PlaceholderKind::Letters => LETTERS,
            PlaceholderKind::Digits => DIGITS,
            PlaceholderKind::Alphanumeric => ALPHANUMERIC,
        }
    }

    pub fn alphabet_len(self) -> usize {
        self.alphabet().len()
    }

    fn from_token_char(c: char) -> Option<Self> {
        match c {
            'X' | 'x' => Some(PlaceholderKind::Letters),
            '9' => Some(PlaceholderKind::Digits),
            '*' => Some(PlaceholderKind::Alphanumeric),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(char),
    Placeholder(PlaceholderKind, usize),
}

/// A parsed, validated code pattern ready to render random codes.
#[derive(Debug, Clone)]
pub struct CodePattern {
    segments: Vec<Segment>,
}

impl CodePattern {
    /// Parses a pattern string per the grammar documented on the module.
    ///
    /// Fails unless the pattern contains at least one placeholder, every
    /// placeholder body is non-empty and homogeneous (all `X`/`x`, all
    /// `9`, or all `*`), every brace is closed, and every literal
    /// character is in `[A-Z0-9_-]`.
    pub fn parse(raw: &str) -> Result<Self, CodegenError> {
        let mut segments = Vec::new();
        let mut placeholder_count = 0;
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '{' {
                let mut body = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(inner) => body.push(inner),
                        None => {
                            return Err(CodegenError::PatternInvalid {
                                reason: "unterminated '{' in pattern".to_string(),
                            })
                        }
                    }
                }
                if body.is_empty() {
                    return Err(CodegenError::PatternInvalid {
                        reason: "empty placeholder '{}' in pattern".to_string(),
                    });
                }
                let kind = PlaceholderKind::from_token_char(
                    body.chars().next().expect("checked non-empty"),
                )
                .ok_or_else(|| CodegenError::PatternInvalid {
                    reason: format!("unrecognized placeholder token '{{{body}}}'"),
                })?;
                if !body
                    .chars()
                    .all(|t| PlaceholderKind::from_token_char(t) == Some(kind))
                {
                    return Err(CodegenError::PatternInvalid {
                        reason: format!("mixed placeholder characters in '{{{body}}}'"),
                    });
                }
                segments.push(Segment::Placeholder(kind, body.chars().count()));
                placeholder_count += 1;
            } else if LITERAL_ALPHABET.contains(&(c as u8)) {
                segments.push(Segment::Literal(c));
            } else {
                return Err(CodegenError::PatternInvalid {
                    reason: format!("disallowed literal character '{c}' in pattern"),
                });
            }
        }

        if placeholder_count == 0 {
            return Err(CodegenError::PatternInvalid {
                reason: "pattern must contain at least one placeholder".to_string(),
            });
        }

        Ok(Self { segments })
    }

    /// Renders one random code from this pattern.
    pub fn render(&self, rng: &mut impl Rng) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(c) => out.push(*c),
                Segment::Placeholder(kind, len) => {
                    for _ in 0..*len {
                        out.push(random_char(*kind, rng));
                    }
                }
            }
        }
        out
    }

    /// Iterates over `(kind, length)` for each placeholder in the pattern.
    pub fn placeholders(&self) -> impl Iterator<Item = (PlaceholderKind, usize)> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(kind, len) => Some((*kind, *len)),
            Segment::Literal(_) => None,
        })
    }

    /// Exact length of every code this pattern renders (fixed, since every
    /// placeholder has a fixed width).
    pub fn rendered_length(&self) -> usize {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(_) => 1,
                Segment::Placeholder(_, len) => *len,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_mixed_literal_and_placeholder() {
        let pattern = CodePattern::parse("SAVE-{XXXX}-{9999}").unwrap();
        assert_eq!(pattern.placeholders().count(), 2);
    }

    #[test]
    fn parse_rejects_pattern_without_placeholder() {
        assert!(CodePattern::parse("SAVE10").is_err());
    }

    #[test]
    fn parse_rejects_mixed_placeholder_tokens() {
        assert!(CodePattern::parse("{X9X}").is_err());
    }

    #[test]
    fn parse_rejects_unterminated_brace() {
        assert!(CodePattern::parse("SAVE-{XXX").is_err());
    }

    #[test]
    fn parse_rejects_disallowed_literal() {
        assert!(CodePattern::parse("sav#{XXX}").is_err());
    }

    #[test]
    fn render_produces_expected_length() {
        let pattern = CodePattern::parse("GIFT-{XXX}-{99}").unwrap();
        let mut rng = rand::thread_rng();
        let code = pattern.render(&mut rng);
        assert_eq!(code.len(), "GIFT-".len() + 3 + "-".len() + 2);
        assert!(code.starts_with("GIFT-"));
    }

    #[test]
    fn rendered_length_matches_actual_output() {
        let pattern = CodePattern::parse("GIFT-{XXX}-{99}").unwrap();
        assert_eq!(pattern.rendered_length(), pattern.render(&mut rand::thread_rng()).len());
    }
}
