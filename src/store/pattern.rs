//! LIKE patterns for literal substring search.

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// `%needle%` with the needle escaped, so it only ever matches literally.
pub fn contains_pattern(needle: &str) -> String {
    format!("%{}%", escape_like(needle))
}

#[cfg(test)]
enum Token {
    Literal(char),
    AnyOne,
    AnyRun,
}

/// Evaluates a LIKE pattern the way PostgreSQL's ILIKE does with the default
/// backslash escape.
#[cfg(test)]
pub fn ilike(pattern: &str, haystack: &str) -> bool {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars().flat_map(char::to_lowercase);
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '\\' => Token::Literal(chars.next().unwrap_or('\\')),
            '%' => Token::AnyRun,
            '_' => Token::AnyOne,
            c => Token::Literal(c),
        });
    }

    let haystack: Vec<char> = haystack.chars().flat_map(char::to_lowercase).collect();
    let mut reachable = vec![false; haystack.len() + 1];
    reachable[0] = true;

    for token in &tokens {
        let mut next = vec![false; haystack.len() + 1];
        match token {
            Token::AnyRun => {
                let mut seen = false;
                for (i, slot) in next.iter_mut().enumerate() {
                    seen |= reachable[i];
                    *slot = seen;
                }
            }
            Token::AnyOne => {
                for i in 0..haystack.len() {
                    next[i + 1] = reachable[i];
                }
            }
            Token::Literal(expected) => {
                for i in 0..haystack.len() {
                    next[i + 1] = reachable[i] && haystack[i] == *expected;
                }
            }
        }
        reachable = next;
    }

    reachable[haystack.len()]
}
