//! Heuristic detection of in-band policy refusals.
//!
//! Some backends signal a refusal structurally (a stop reason or a refusal
//! field); others just answer with prose. This module catches the prose
//! case. Only text before the first JSON bracket is inspected, so in-story
//! dialogue like "I can't let you pass" inside a JSON answer is not mistaken
//! for a refusal.

const REFUSAL_PHRASES: &[&str] = &[
    "i can't help with",
    "i cannot help with",
    "i can't assist",
    "i cannot assist",
    "i can't create",
    "i cannot create",
    "i can't write",
    "i cannot write",
    "i can't provide",
    "i cannot provide",
    "i can't continue",
    "i cannot continue",
    "i'm not able to",
    "i am not able to",
    "i'm unable to",
    "i am unable to",
    "i won't be able to",
    "i won't write",
    "i won't create",
    "i won't continue",
    "i'm sorry, but",
    "i am sorry, but",
    "as an ai",
    "i must decline",
    "i have to decline",
    "against my guidelines",
    "violates my guidelines",
    "content policy",
    "usage policies",
];

/// Longest reason excerpt carried into the attempt log.
const EXCERPT_CHARS: usize = 160;

/// If `text` reads as a refusal, return a short excerpt as the reason.
pub fn detect_refusal(text: &str) -> Option<String> {
    let lead_end = text.find(['{', '[']).unwrap_or(text.len());
    let lead = text[..lead_end].to_lowercase().replace('\u{2019}', "'");

    if !REFUSAL_PHRASES.iter().any(|phrase| lead.contains(phrase)) {
        return None;
    }

    let excerpt: String = text.trim().chars().take(EXCERPT_CHARS).collect();
    Some(excerpt)
}
