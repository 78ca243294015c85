//! Rule-based answer extraction over ranked messages.
//!
//! Extraction is an ordered chain of [`Extractor`]s, each of which either
//! claims a question/candidate pair and produces an [`Answer`] or declines.
//! The first extractor that does not decline wins; the chain order is a
//! contract (date, count, named list, fallback) because ambiguous questions
//! could otherwise fire more than one extractor.
//!
//! Before the chain runs, the question is parsed into a [`QuestionScope`]:
//! a possessive or `about/for/does/when is <Name>` pattern pulls out a
//! member name, `trip to <Place>` a location, and the ranked candidates are
//! narrowed to messages mentioning them (falling back to the unfiltered
//! list when the filter would empty it).

use std::sync::OnceLock;

use regex::Regex;

use crate::index::tokenize;
use crate::models::{Answer, RankedMessage};

/// How far (in tokens) a number may sit from a subject keyword.
const COUNT_WINDOW: usize = 8;

/// Maximum names returned by the named-list extractor.
const MAX_NAMES: usize = 5;

const NUMBER_WORDS: &[(&str, i64)] = &[
    ("zero", 0),
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
];

/// Spans the named-list extractor never treats as names.
const STOP_SPANS: &[&str] = &[
    "i", "we", "my", "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
];

fn member_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let name = r"[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?";
        vec![
            Regex::new(&format!(r"\b({name})['\u{{2019}}]s\b")).unwrap(),
            Regex::new(&format!(r"\babout\s+({name})\b")).unwrap(),
            Regex::new(&format!(r"\bfor\s+({name})\b")).unwrap(),
            Regex::new(&format!(r"\bdoes\s+({name})\b")).unwrap(),
            Regex::new(&format!(r"\b[Ww]hen is\s+({name})\b")).unwrap(),
        ]
    })
}

fn location_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b[Tt]rip to\s+([A-Z][a-zA-Z]+)\b").unwrap())
}

/// A question parsed into its scoping hints.
#[derive(Debug, Clone)]
pub struct QuestionScope {
    pub raw: String,
    pub lowered: String,
    /// Member name pulled from the question, if any.
    pub member: Option<String>,
    /// Location pulled from a `trip to <Place>` phrase, if any.
    pub location: Option<String>,
}

impl QuestionScope {
    pub fn parse(question: &str) -> Self {
        let member = member_patterns()
            .iter()
            .find_map(|p| p.captures(question))
            .map(|caps| caps[1].to_string());
        let location = location_pattern()
            .captures(question)
            .map(|caps| caps[1].to_string());
        Self {
            raw: question.to_string(),
            lowered: question.to_lowercase(),
            member,
            location,
        }
    }
}

/// Narrows candidates to messages mentioning the scoped member and/or
/// location. A filter that matches nothing is dropped rather than leaving
/// the extractors without material.
pub fn scope_candidates(scope: &QuestionScope, ranked: &[RankedMessage]) -> Vec<RankedMessage> {
    let mut candidates: Vec<RankedMessage> = ranked.to_vec();

    if let Some(member) = &scope.member {
        let member_l = member.to_lowercase();
        let filtered: Vec<RankedMessage> = candidates
            .iter()
            .filter(|r| {
                r.message.author.to_lowercase().contains(&member_l)
                    || r.text().to_lowercase().contains(&member_l)
            })
            .cloned()
            .collect();
        if !filtered.is_empty() {
            candidates = filtered;
        }
    }

    if let Some(location) = &scope.location {
        let loc_l = location.to_lowercase();
        let filtered: Vec<RankedMessage> = candidates
            .iter()
            .filter(|r| r.text().to_lowercase().contains(&loc_l))
            .cloned()
            .collect();
        if !filtered.is_empty() {
            candidates = filtered;
        }
    }

    candidates
}

/// A rule that inspects a question and candidate messages and either
/// produces a structured answer or declines.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `Some` to claim the question, `None` to decline.
    fn attempt(&self, scope: &QuestionScope, candidates: &[RankedMessage]) -> Option<Answer>;
}

/// The fixed extraction chain: date, count, named list, fallback.
pub fn default_chain() -> Vec<Box<dyn Extractor>> {
    vec![
        Box::new(DateExtractor::new()),
        Box::new(CountExtractor),
        Box::new(NameListExtractor::new()),
        Box::new(FallbackExtractor),
    ]
}

/// Runs the chain and returns the first claimed answer.
///
/// Total: the fallback extractor answers any question with at least one
/// candidate, and an empty candidate list yields the explicit no-data answer.
pub fn extract(chain: &[Box<dyn Extractor>], question: &str, ranked: &[RankedMessage]) -> Answer {
    let scope = QuestionScope::parse(question);
    let candidates = scope_candidates(&scope, ranked);

    for extractor in chain {
        if let Some(answer) = extractor.attempt(&scope, &candidates) {
            tracing::debug!(extractor = extractor.name(), "extractor claimed question");
            return answer;
        }
    }

    Answer::no_data()
}

// ════════════════════════════════════════════════════════════════════
// Date extractor
// ════════════════════════════════════════════════════════════════════

/// Fires on trip/travel cues and pulls the first date expression out of the
/// ranked candidates: calendar dates, month-day forms, and relative phrases
/// such as `next March` or `this weekend`.
pub struct DateExtractor {
    date_pattern: Regex,
}

impl DateExtractor {
    pub fn new() -> Self {
        let months = "jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec";
        let units = "week|weekend|month|year\
                     |monday|tuesday|wednesday|thursday|friday|saturday|sunday\
                     |january|february|march|april|may|june|july|august\
                     |september|october|november|december";
        let alternatives = [
            r"\b\d{4}-\d{2}-\d{2}\b".to_string(),
            r"\b\d{1,2}/\d{1,2}/\d{2,4}\b".to_string(),
            format!(r"\b(?:{months})[a-z]*\s+\d{{1,2}}(?:,\s*\d{{4}})?\b"),
            format!(r"\b\d{{1,2}}\s+(?:{months})[a-z]*(?:\s+\d{{4}})?\b"),
            format!(r"\b(?:next|this)\s+(?:{units})\b"),
            r"\b(?:today|tomorrow|tonight)\b".to_string(),
        ];
        let pattern = format!("(?i){}", alternatives.join("|"));
        Self {
            date_pattern: Regex::new(&pattern).unwrap(),
        }
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for DateExtractor {
    fn name(&self) -> &'static str {
        "date"
    }

    fn attempt(&self, scope: &QuestionScope, candidates: &[RankedMessage]) -> Option<Answer> {
        let cued = ["trip", "travel", "flight"]
            .iter()
            .any(|kw| scope.lowered.contains(kw));
        if !cued {
            return None;
        }

        for candidate in candidates {
            let text = candidate.text();
            if let Some(m) = self.date_pattern.find(&text) {
                let value = m.as_str().to_string();
                let sentence = match (&scope.member, &scope.location) {
                    (Some(member), Some(location)) => {
                        format!("{member} is planning the trip to {location} on {value}.")
                    }
                    (Some(member), None) => format!("{member}'s trip is on {value}."),
                    _ => format!("The trip is on {value}."),
                };
                return Some(Answer::date(value, sentence, candidate.message.id.clone()));
            }
        }

        None
    }
}

// ════════════════════════════════════════════════════════════════════
// Count extractor
// ════════════════════════════════════════════════════════════════════

/// Fires on `how many` + car/vehicle questions. Looks for a numeric token
/// (digits or a number word) within [`COUNT_WINDOW`] tokens of a subject
/// keyword. When candidate messages disagree, the value from the latest
/// timestamp wins and the answer is flagged as a conflict.
pub struct CountExtractor;

impl CountExtractor {
    fn count_in(text: &str) -> Option<i64> {
        let tokens = tokenize(text);
        for (i, token) in tokens.iter().enumerate() {
            if !matches!(token.as_str(), "car" | "cars" | "vehicle" | "vehicles") {
                continue;
            }
            let start = i.saturating_sub(COUNT_WINDOW);
            let end = (i + COUNT_WINDOW + 1).min(tokens.len());
            for near in &tokens[start..end] {
                if let Ok(n) = near.parse::<i64>() {
                    return Some(n);
                }
                if let Some(&(_, n)) = NUMBER_WORDS.iter().find(|(w, _)| w == near) {
                    return Some(n);
                }
            }
        }
        None
    }
}

impl Extractor for CountExtractor {
    fn name(&self) -> &'static str {
        "count"
    }

    fn attempt(&self, scope: &QuestionScope, candidates: &[RankedMessage]) -> Option<Answer> {
        let cued = scope.lowered.contains("how many")
            && (scope.lowered.contains("car") || scope.lowered.contains("vehicle"));
        if !cued {
            return None;
        }

        // (value, timestamp, message id) per candidate that yields a count,
        // in rank order.
        let hits: Vec<(i64, Option<chrono::DateTime<chrono::Utc>>, String)> = candidates
            .iter()
            .filter_map(|c| {
                Self::count_in(&c.text()).map(|n| (n, c.message.timestamp, c.message.id.clone()))
            })
            .collect();

        if hits.is_empty() {
            return None;
        }

        let mut distinct: Vec<i64> = hits.iter().map(|(n, _, _)| *n).collect();
        distinct.sort_unstable();
        distinct.dedup();

        let (value, source, conflict) = if distinct.len() > 1 {
            // Conflicting counts: most recent timestamp wins (untimestamped
            // messages lose to any timestamped one).
            let (value, _, id) = hits
                .iter()
                .max_by_key(|(_, ts, _)| *ts)
                .unwrap_or(&hits[0])
                .clone();
            tracing::warn!(
                values = ?distinct,
                winner = value,
                source = %id,
                "conflicting counts across messages; using most recent"
            );
            (value, id, true)
        } else {
            let (value, _, id) = hits[0].clone();
            (value, id, false)
        };

        let plural = if value == 1 { "" } else { "s" };
        let sentence = match &scope.member {
            Some(member) => format!("{member} has {value} car{plural}."),
            None => format!("They have {value} car{plural}."),
        };

        Some(Answer::count(value, sentence, source, conflict))
    }
}

// ════════════════════════════════════════════════════════════════════
// Named-list extractor
// ════════════════════════════════════════════════════════════════════

/// Fires on favorite/restaurant/place cues and collects capitalized
/// multi-word spans near the cue as candidate names, deduplicated in order.
pub struct NameListExtractor {
    proper_noun: Regex,
    after_preposition: Regex,
    favorite_cue: Regex,
}

impl NameListExtractor {
    pub fn new() -> Self {
        let span = r"[A-Z][A-Za-z'&.-]+(?:\s+[A-Z][A-Za-z'&.-]+)*";
        Self {
            proper_noun: Regex::new(&format!(r"\b({span})\b")).unwrap(),
            after_preposition: Regex::new(&format!(r"\b(?:at|to|in)\s+({span})")).unwrap(),
            favorite_cue: Regex::new(r"(?i)\bfavorite\b.*\brestaurant").unwrap(),
        }
    }

    fn names_in(&self, scope: &QuestionScope, candidate: &RankedMessage) -> Vec<String> {
        let text = candidate.text();
        let mut found: Vec<String> = Vec::new();

        if self.favorite_cue.is_match(&text) {
            for caps in self.proper_noun.captures_iter(&text) {
                found.push(caps[1].to_string());
            }
        }
        for caps in self.after_preposition.captures_iter(&text) {
            found.push(caps[1].to_string());
        }

        let author_l = candidate.message.author.to_lowercase();
        let member_l = scope.member.as_deref().map(str::to_lowercase);

        let mut seen: Vec<String> = Vec::new();
        let mut unique: Vec<String> = Vec::new();
        for name in found {
            let key = name.to_lowercase();
            if name.len() < 3 || STOP_SPANS.contains(&key.as_str()) {
                continue;
            }
            // The author's own name appears in the rendered text; it is
            // never a venue.
            if author_l.contains(&key) || member_l.as_deref() == Some(key.as_str()) {
                continue;
            }
            if !seen.contains(&key) {
                seen.push(key);
                unique.push(name);
            }
        }
        unique.truncate(MAX_NAMES);
        unique
    }
}

impl Default for NameListExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for NameListExtractor {
    fn name(&self) -> &'static str {
        "name_list"
    }

    fn attempt(&self, scope: &QuestionScope, candidates: &[RankedMessage]) -> Option<Answer> {
        let cued = ["favorite", "restaurant", "place"]
            .iter()
            .any(|kw| scope.lowered.contains(kw));
        if !cued {
            return None;
        }

        for candidate in candidates {
            let names = self.names_in(scope, candidate);
            if names.is_empty() {
                continue;
            }
            let joined = names.join(", ");
            let sentence = match &scope.member {
                Some(member) => format!("{member}'s favorite restaurants include: {joined}."),
                None => format!("Favorite restaurants include: {joined}."),
            };
            return Some(Answer::name_list(
                names,
                sentence,
                vec![candidate.message.id.clone()],
            ));
        }

        None
    }
}

// ════════════════════════════════════════════════════════════════════
// Fallback extractor
// ════════════════════════════════════════════════════════════════════

/// Always claims: answers with the verbatim content of the top-ranked
/// message. Declines only when there are no candidates at all.
pub struct FallbackExtractor;

impl Extractor for FallbackExtractor {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn attempt(&self, _scope: &QuestionScope, candidates: &[RankedMessage]) -> Option<Answer> {
        candidates
            .first()
            .map(|top| Answer::fallback(top.message.content.clone(), top.message.id.clone()))
    }
}
