//! Approximate matching by pattern expansion.
//!
//! Neither regex engine in use supports bounded-edit-distance matching
//! natively, so a fuzzy literal is expanded into an alternation of every
//! variant reachable with at most `max_errors` single-character edits
//! (substitution, insertion, deletion). Variants are regex sources where an
//! edited position becomes `\w`; the expansion is O(len²) per error level,
//! which is fine for the name-length strings it is used on.

use veil_core::FxHashSet;

/// One symbol of a variant: a literal character or an edited position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Piece {
    Lit(char),
    Any,
}

fn render(pieces: &[Piece]) -> String {
    let mut out = String::new();
    for piece in pieces {
        match piece {
            Piece::Lit(c) => out.push_str(&fancy_regex::escape(&c.to_string())),
            Piece::Any => out.push_str(r"\w"),
        }
    }
    out
}

fn single_edits(pieces: &[Piece]) -> Vec<Vec<Piece>> {
    let mut edits = Vec::new();
    for i in 0..pieces.len() {
        // Substitution.
        let mut sub = pieces.to_vec();
        sub[i] = Piece::Any;
        edits.push(sub);
        // Deletion.
        let mut del = pieces.to_vec();
        del.remove(i);
        edits.push(del);
    }
    // Insertion, at every gap.
    for i in 0..=pieces.len() {
        let mut ins = pieces.to_vec();
        ins.insert(i, Piece::Any);
        edits.push(ins);
    }
    edits
}

/// Regex source matching `text` with at most `max_errors` edits.
/// With zero errors this is just the escaped literal.
pub fn fuzzy_pattern(text: &str, max_errors: u32) -> String {
    let exact: Vec<Piece> = text.chars().map(Piece::Lit).collect();
    if max_errors == 0 {
        return render(&exact);
    }

    let mut variants: FxHashSet<Vec<Piece>> = FxHashSet::default();
    let mut frontier = vec![exact.clone()];
    variants.insert(exact);
    for _ in 0..max_errors {
        let mut next = Vec::new();
        for variant in &frontier {
            for edited in single_edits(variant) {
                if edited.is_empty() {
                    continue;
                }
                if variants.insert(edited.clone()) {
                    next.push(edited);
                }
            }
        }
        frontier = next;
    }

    let mut sources: Vec<String> = variants.iter().map(|v| render(v)).collect();
    // Longest-first so alternation prefers the fullest match.
    sources.sort_unstable_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    format!("(?:{})", sources.join("|"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, text: &str) -> bool {
        let re = fancy_regex::Regex::new(&format!("(?i)^(?:{pattern})$")).unwrap();
        re.is_match(text).unwrap()
    }

    #[test]
    fn zero_errors_is_exact() {
        let p = fuzzy_pattern("smith", 0);
        assert!(matches(&p, "smith"));
        assert!(!matches(&p, "smyth"));
    }

    #[test]
    fn one_error_catches_common_typos() {
        let p = fuzzy_pattern("smith", 1);
        assert!(matches(&p, "smith"), "exact still matches");
        assert!(matches(&p, "smyth"), "substitution");
        assert!(matches(&p, "smth"), "deletion");
        assert!(matches(&p, "smiith"), "insertion");
        assert!(!matches(&p, "smythe"), "two edits away");
    }

    #[test]
    fn two_errors_extend_the_radius() {
        let p = fuzzy_pattern("smith", 2);
        assert!(matches(&p, "smythe"));
        assert!(!matches(&p, "jones"));
    }

    #[test]
    fn regex_metacharacters_are_escaped() {
        let p = fuzzy_pattern("o'brien", 1);
        assert!(matches(&p, "o'brien"));
        assert!(!matches(&p, "oxbrien'x"));
    }
}
