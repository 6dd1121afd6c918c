//! Instance-type glob matching: `*` and `?` only, matched against the full
//! identifier. No character classes, no recursive `**`.

/// Split a comma/whitespace separated list of glob tokens, dropping empties.
pub fn split_tokens(raw: &str) -> Vec<&str> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|tok| !tok.is_empty())
        .collect()
}

/// Whether `pattern` (containing only `*`/`?` wildcards) matches `text` in full.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    matches(&p, &t)
}

fn matches(pattern: &[char], text: &[char]) -> bool {
    // Classic DP-free recursive matcher; patterns are short instance-type
    // globs so this never comes close to pathological backtracking.
    match pattern.first() {
        None => text.is_empty(),
        Some('*') => {
            matches(&pattern[1..], text)
                || (!text.is_empty() && matches(pattern, &text[1..]))
        }
        Some('?') => !text.is_empty() && matches(&pattern[1..], &text[1..]),
        Some(c) => {
            !text.is_empty() && text[0] == *c && matches(&pattern[1..], &text[1..])
        }
    }
}

/// Whether any token in a comma/whitespace separated glob list matches `text`.
pub fn any_token_matches(raw: &str, text: &str) -> bool {
    split_tokens(raw).iter().any(|tok| glob_match(tok, text))
}
