//! Boundary-aware truncation of block text to a token budget.
//!
//! The cut point is the longest prefix whose estimate fits, pulled back to
//! the nearest natural boundary inside that prefix: sentence or clause end
//! first, then a word gap, then a hard cut that avoids splitting a
//! character sequence (combining marks, joiners, variation selectors).

use plotline_types::generation::PromptFamily;

use super::estimator::approximate_tokens;

/// Truncate `text` so that its estimate under `family` is at most
/// `max_tokens`.
///
/// Returns the input unchanged when it already fits. The result is always a
/// prefix of `text` (modulo trailing whitespace and clause punctuation) and
/// may be empty when not even the first character fits.
pub fn truncate_to_budget(text: &str, max_tokens: u32, family: PromptFamily) -> String {
    if approximate_tokens(text, family) <= max_tokens {
        return text.to_string();
    }
    if max_tokens == 0 {
        return String::new();
    }

    let cut = longest_fitting_prefix(text, max_tokens, family);
    if cut == 0 {
        return String::new();
    }

    if let Some(end) = last_phrase_boundary(text, cut) {
        return text[..end]
            .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':'))
            .to_string();
    }
    if let Some(end) = last_word_gap(text, cut) {
        return text[..end].trim_end().to_string();
    }

    text[..safe_cut(text, cut)].to_string()
}

/// The first whitespace-delimited word of `text`, hard-cut to fit
/// `max_tokens` if needed. Used as the floor for blocks that may never be
/// dropped entirely.
pub fn minimal_prefix(text: &str, max_tokens: u32, family: PromptFamily) -> String {
    let first_word = text.split_whitespace().next().unwrap_or("");
    if approximate_tokens(first_word, family) <= max_tokens.max(1) {
        return first_word.to_string();
    }
    let cut = longest_fitting_prefix(first_word, max_tokens.max(1), family);
    let cut = safe_cut(first_word, cut);
    if cut == 0 {
        // Keep one whole character rather than nothing.
        return first_word
            .chars()
            .next()
            .map(String::from)
            .unwrap_or_default();
    }
    first_word[..cut].to_string()
}

/// Largest char-boundary index `i` such that `text[..i]` fits the budget.
///
/// Binary search is valid because the estimate is monotone over prefixes.
fn longest_fitting_prefix(text: &str, max_tokens: u32, family: PromptFamily) -> usize {
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();

    let (mut lo, mut hi) = (0usize, boundaries.len() - 1);
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if approximate_tokens(&text[..boundaries[mid]], family) <= max_tokens {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    boundaries[lo]
}

/// End index of the last sentence or clause terminator in `text[..cut]` that
/// is followed by whitespace in the full text.
fn last_phrase_boundary(text: &str, cut: usize) -> Option<usize> {
    let head = &text[..cut];
    head.char_indices()
        .filter(|(_, c)| matches!(c, '.' | '!' | '?' | '…' | ';' | ':' | ','))
        .map(|(i, c)| i + c.len_utf8())
        .filter(|&end| {
            text[end..]
                .chars()
                .next()
                .is_some_and(char::is_whitespace)
        })
        .filter(|&end| end > 0)
        .last()
}

/// Start index of the last whitespace run in `text[..cut]` that is not at
/// the very beginning.
fn last_word_gap(text: &str, cut: usize) -> Option<usize> {
    let head = &text[..cut];
    let boundary = if text[cut..].chars().next().is_some_and(char::is_whitespace) {
        // The cut already sits on a word gap.
        Some(cut)
    } else {
        head.char_indices()
            .filter(|(_, c)| c.is_whitespace())
            .map(|(i, _)| i)
            .last()
    };
    boundary.filter(|&i| !head[..i].trim().is_empty())
}

/// Move `cut` left until it does not split a multi-codepoint sequence.
fn safe_cut(text: &str, mut cut: usize) -> usize {
    while cut > 0 {
        let next_joins = text[cut..].chars().next().is_some_and(is_joining);
        let prev_is_zwj = text[..cut].chars().next_back() == Some('\u{200D}');
        if !next_joins && !prev_is_zwj {
            break;
        }
        cut = text[..cut]
            .char_indices()
            .next_back()
            .map(|(i, _)| i)
            .unwrap_or(0);
    }
    cut
}

/// Code points that attach to the preceding character.
fn is_joining(c: char) -> bool {
    matches!(c,
        '\u{0300}'..='\u{036F}'
        | '\u{1AB0}'..='\u{1AFF}'
        | '\u{1DC0}'..='\u{1DFF}'
        | '\u{20D0}'..='\u{20FF}'
        | '\u{FE00}'..='\u{FE0F}'
        | '\u{FE20}'..='\u{FE2F}'
        | '\u{200D}'
        | '\u{1F3FB}'..='\u{1F3FF}'
        | '\u{E0100}'..='\u{E01EF}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAMILY: PromptFamily = PromptFamily::Markdown;

    #[test]
    fn test_fitting_text_unchanged() {
        let text = "The bell rang.";
        assert_eq!(truncate_to_budget(text, 100, FAMILY), text);
    }

    #[test]
    fn test_zero_budget_is_empty() {
        assert_eq!(truncate_to_budget("Anything at all.", 0, FAMILY), "");
    }

    #[test]
    fn test_result_fits_budget() {
        let text = "The ferryman waits at the dock. He counts coins. The river is high tonight, \
                    and the lanterns gutter in the wind. Nobody else is awake.";
        for budget in 1..approximate_tokens(text, FAMILY) {
            let out = truncate_to_budget(text, budget, FAMILY);
            assert!(approximate_tokens(&out, FAMILY) <= budget, "budget {budget}: {out:?}");
            assert!(text.starts_with(out.as_str()));
        }
    }

    #[test]
    fn test_prefers_sentence_boundary() {
        let text = "Mara drew her cloak tight. The alley smelled of rain and smoke tonight.";
        // 26 bytes for the first sentence -> 7 tokens; allow a little more.
        let out = truncate_to_budget(text, 10, FAMILY);
        assert_eq!(out, "Mara drew her cloak tight.");
    }

    #[test]
    fn test_clause_boundary_drops_trailing_comma() {
        let text = "He waited by the gate, listening for hooves that never came";
        let out = truncate_to_budget(text, 7, FAMILY);
        assert_eq!(out, "He waited by the gate");
    }

    #[test]
    fn test_decimal_point_is_not_sentence_end() {
        let text = "Version3.5isfine andthenmorewordsfollowhere";
        let out = truncate_to_budget(text, 4, FAMILY);
        assert!(!out.ends_with('.'));
    }

    #[test]
    fn test_word_boundary_when_no_punctuation() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let out = truncate_to_budget(text, 5, FAMILY);
        assert!(text.starts_with(&out));
        assert!(!out.ends_with(' '));
        let next = text[out.len()..].chars().next();
        assert!(next.is_none_or(char::is_whitespace), "cut mid-word: {out:?}");
    }

    #[test]
    fn test_hard_cut_respects_char_boundaries() {
        let text = "ééééééééééééééééééééééééééééé";
        let out = truncate_to_budget(text, 3, FAMILY);
        assert!(!out.is_empty());
        assert!(text.starts_with(&out));
    }

    #[test]
    fn test_hard_cut_keeps_combining_marks_attached() {
        // "e" followed by a combining acute accent, repeated.
        let text = "e\u{0301}".repeat(20);
        let out = truncate_to_budget(&text, 2, FAMILY);
        assert!(!out.is_empty());
        assert!(out.ends_with('\u{0301}'));
    }

    #[test]
    fn test_hard_cut_does_not_end_on_joiner() {
        let family = "\u{1F468}\u{200D}\u{1F469}\u{200D}\u{1F467}".repeat(4);
        let out = truncate_to_budget(&family, 3, FAMILY);
        assert!(!out.ends_with('\u{200D}'));
    }

    #[test]
    fn test_minimal_prefix_is_first_word() {
        assert_eq!(minimal_prefix("Identity: Mara the smuggler", 5, FAMILY), "Identity:");
    }

    #[test]
    fn test_minimal_prefix_never_empty_for_non_empty_text() {
        let text = "x".repeat(200);
        let out = minimal_prefix(&text, 1, FAMILY);
        assert!(!out.is_empty());
        assert!(approximate_tokens(&out, FAMILY) <= 1);
    }
}
