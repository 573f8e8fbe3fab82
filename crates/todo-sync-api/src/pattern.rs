//! Case-insensitive LIKE patterns
//!
//! `%` matches any run of characters, `_` exactly one, and a backslash makes
//! the following character literal. PostgREST also reads an unescaped `*` as
//! `%`. Case folding is per character so a pattern and a title fold the same
//! way regardless of context.

/// `%term%` for a server-side substring search
///
/// `%`, `_` and `\` in `term` are escaped. A `*` cannot be escaped on the
/// server, so it goes out as `_`: the pattern then matches a superset of the
/// titles containing `term`, and callers narrow the result with
/// [`title_contains`].
pub fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        match c {
            '%' | '_' | '\\' => {
                pattern.push('\\');
                pattern.push(c);
            }
            '*' => pattern.push('_'),
            other => pattern.push(other),
        }
    }
    pattern.push('%');
    pattern
}

/// Literal case-insensitive substring test
pub fn title_contains(title: &str, term: &str) -> bool {
    fold(title).contains(&fold(term))
}

fn fold(s: &str) -> String {
    s.chars().flat_map(char::to_lowercase).collect()
}

/// Evaluate a LIKE pattern against `text`, ignoring case
pub fn ilike_matches(pattern: &str, text: &str) -> bool {
    let tokens = tokenize(pattern);
    let text: Vec<char> = text.chars().flat_map(char::to_lowercase).collect();

    // matched[j]: the tokens consumed so far can match text[..j]
    let mut matched = vec![false; text.len() + 1];
    matched[0] = true;

    for token in &tokens {
        let mut next = vec![false; text.len() + 1];
        match token {
            Token::AnyRun => {
                let mut reachable = false;
                for j in 0..=text.len() {
                    reachable |= matched[j];
                    next[j] = reachable;
                }
            }
            Token::AnyOne => {
                for j in 0..text.len() {
                    next[j + 1] = matched[j];
                }
            }
            Token::Literal(c) => {
                for j in 0..text.len() {
                    next[j + 1] = matched[j] && text[j] == *c;
                }
            }
        }
        matched = next;
    }

    matched[text.len()]
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Literal(char),
    AnyOne,
    AnyRun,
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' | '*' => {
                if tokens.last() != Some(&Token::AnyRun) {
                    tokens.push(Token::AnyRun);
                }
            }
            '_' => tokens.push(Token::AnyOne),
            '\\' => {
                let escaped = chars.next().unwrap_or('\\');
                tokens.extend(escaped.to_lowercase().map(Token::Literal));
            }
            other => tokens.extend(other.to_lowercase().map(Token::Literal)),
        }
    }
    tokens
}
