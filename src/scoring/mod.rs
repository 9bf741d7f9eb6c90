//! Result-code classification for recorded at-bats.
//!
//! This module is the single source of truth for what a result code
//! means: whether it produced outs, whether it was a hit, and whether
//! the batter reached base. Everything is a pure function over the
//! normalized code string; unknown codes are treated as "no out, no
//! hit" rather than an error, so a newer backend vocabulary never
//! breaks an older client.

/// Single-out codes that are exact matches after normalization.
const SINGLE_OUT_CODES: &[&str] = &["K", "OUT", "FO", "GO", "PO", "LO", "SF", "SH", "SAC"];

/// Out codes that may carry a fielder-position suffix (e.g. `GO4`, `FO7`).
const POSITIONAL_OUT_PREFIXES: &[&str] = &["FO", "GO", "PO", "LO"];

const HIT_CODES: &[&str] = &["1B", "2B", "3B", "HR"];

const WALK_CODES: &[&str] = &["BB", "IBB"];

fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn is_positional_out(code: &str) -> bool {
    POSITIONAL_OUT_PREFIXES.iter().any(|prefix| {
        code.len() > prefix.len()
            && code.starts_with(prefix)
            && code[prefix.len()..].bytes().all(|b| b.is_ascii_digit())
    })
}

fn is_double_play(code: &str) -> bool {
    code == "DOUBLE_PLAY" || code.starts_with("DP")
}

fn is_triple_play(code: &str) -> bool {
    code == "TRIPLE_PLAY" || code.starts_with("TP")
}

/// True when the code records at least one out: strikeouts, generic
/// outs, fly/ground/pop/line outs (bare or with a fielder position),
/// sacrifices, and double/triple plays.
pub fn is_out(code: &str) -> bool {
    let code = normalize(code);
    SINGLE_OUT_CODES.contains(&code.as_str())
        || is_positional_out(&code)
        || is_double_play(&code)
        || is_triple_play(&code)
}

/// Number of outs the code contributes to the inning: 3 for a triple
/// play, 2 for a double play, 1 for any other out, otherwise 0.
pub fn out_count(code: &str) -> u8 {
    let code = normalize(code);
    if is_triple_play(&code) {
        3
    } else if is_double_play(&code) {
        2
    } else if is_out(&code) {
        1
    } else {
        0
    }
}

/// True for base hits: single, double, triple, home run.
pub fn is_hit(code: &str) -> bool {
    HIT_CODES.contains(&normalize(code).as_str())
}

/// True for walks, intentional or not.
pub fn is_walk(code: &str) -> bool {
    WALK_CODES.contains(&normalize(code).as_str())
}

pub fn is_hit_by_pitch(code: &str) -> bool {
    normalize(code) == "HBP"
}

/// True when the batter ends up on base: hits, walks, hit-by-pitch,
/// reached-on-error (`E` or `E` plus fielder position), and fielder's
/// choice.
pub fn reaches_base(code: &str) -> bool {
    let code = normalize(code);
    if HIT_CODES.contains(&code.as_str())
        || WALK_CODES.contains(&code.as_str())
        || code == "HBP"
        || code == "FC"
        || code == "E"
    {
        return true;
    }
    code.len() > 1
        && code.starts_with('E')
        && code[1..].bytes().all(|b| b.is_ascii_digit())
}
