//! # Code Generator
//!
//! Pure, stateless pattern-driven code generation. Given a pattern string
//! and a target count, produces that many unique coupon codes or fails.
//!
//! Pattern grammar: literal characters from `[A-Z0-9_-]` plus placeholder
//! tokens `{X+}`, `{9+}`, `{*+}` (one or more of `X`/`x`, `9`, or `*`
//! inside braces). Each placeholder expands to a random string of equal
//! length drawn from, respectively, A-Z, 0-9, or A-Z0-9. A pattern must
//! contain at least one placeholder.

mod pattern;

pub use pattern::{CodePattern, CodegenError, PlaceholderKind};

use rand::Rng;
use std::collections::HashSet;

/// Exact combinatorial count of distinct strings `pattern` can produce:
/// the product of each placeholder's alphabet size raised to its length.
pub fn max_unique_codes(pattern: &CodePattern) -> u128 {
    pattern
        .placeholders()
        .map(|(kind, len)| (kind.alphabet_len() as u128).pow(len as u32))
        .product()
}

/// Draws `count` unique codes from `pattern`.
///
/// Maintains an in-memory dedup set, discarding collisions, and fails
/// with [`CodegenError::PatternExhausted`] if the set can't reach
/// `count` within `10 * count` draws. Callers are expected to have
/// already checked `count <= 0.80 * max_unique_codes(pattern)` — this
/// function does not re-derive that bound, it just enforces the draw
/// cap that bound is meant to keep comfortably away from.
pub fn generate_codes(pattern: &CodePattern, count: usize) -> Result<Vec<String>, CodegenError> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut rng = rand::thread_rng();
    let mut seen = HashSet::with_capacity(count);
    let mut out = Vec::with_capacity(count);
    let max_draws = count.saturating_mul(10);

    for _ in 0..max_draws {
        if out.len() == count {
            break;
        }
        let code = pattern.render(&mut rng);
        if seen.insert(code.clone()) {
            out.push(code);
        }
    }

    if out.len() < count {
        return Err(CodegenError::PatternExhausted {
            requested: count,
            produced: out.len(),
        });
    }

    Ok(out)
}

pub(crate) fn random_char(kind: PlaceholderKind, rng: &mut impl Rng) -> char {
    let alphabet = kind.alphabet();
    let idx = rng.gen_range(0..alphabet.len());
    alphabet[idx] as char
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_unique_codes_multiplies_placeholder_alphabets() {
        let pattern = CodePattern::parse("SAVE-{9999}").unwrap();
        assert_eq!(max_unique_codes(&pattern), 10_000);
    }

    #[test]
    fn generate_codes_returns_requested_count_within_bound() {
        let pattern = CodePattern::parse("{XXXXXX}").unwrap();
        let codes = generate_codes(&pattern, 500).unwrap();
        assert_eq!(codes.len(), 500);
        let unique: HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), 500);
    }

    #[test]
    fn generate_codes_fails_when_pattern_cannot_reach_count() {
        let pattern = CodePattern::parse("{9}").unwrap();
        // Only 10 possible codes exist; 50 unique codes can never be drawn
        // no matter how many attempts the draw budget allows.
        let err = generate_codes(&pattern, 50).unwrap_err();
        assert!(matches!(err, CodegenError::PatternExhausted { .. }));
    }
}
