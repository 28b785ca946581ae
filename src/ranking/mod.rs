//! Picks the right catalog result among near-duplicates.
//!
//! Two policies share the filtering idea but score in opposite directions:
//! [`rank`] selects a single best match for a recognised track (lower score
//! wins), [`rank_list`] orders results of a free-text search for the user to
//! choose from (higher score wins).

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::candidate::{Candidate, ScoredCandidate};

pub const DEFAULT_MAX_DURATION: u32 = 300;
pub const MIN_LIST_DURATION: u32 = 30;

/// Uploader markers of channels that usually carry the original recording.
const AUTHORITATIVE_UPLOADERS: &[&str] = &["topic", "official", "vevo"];

const LABEL_UPLOADERS: &[&str] = &["vevo", "records", "label", "music", "official"];
/// auto-generated "Provided to YouTube" channels
const VERIFIED_UPLOADER: &str = " - topic";
const PROMOTED_TITLE_WORDS: &[&str] = &["official", "audio"];
const NOVELTY_TITLE_WORDS: &[&str] = &["remix", "slowed", "sped up", "nightcore", "8d"];
const SHORT_FORM_MARKER: &str = "shorts";

#[derive(Debug, Clone, Copy)]
pub struct RankOptions {
    pub max_duration: u32,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            max_duration: DEFAULT_MAX_DURATION,
        }
    }
}

fn variant_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(remix|edit|cover|nightcore|8d|live|extended)\b")
            .expect("variant pattern is valid")
    })
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Score for [`rank`], lower is better.
pub fn match_score(candidate: &Candidate, artist: &str, target_duration: Option<u32>) -> i64 {
    let title = candidate.title.to_lowercase();
    let uploader = candidate.uploader.to_lowercase();
    let artist = artist.trim().to_lowercase();
    let mut score = 0i64;

    if contains_any(&uploader, AUTHORITATIVE_UPLOADERS) {
        score -= 10;
    }
    if !artist.is_empty() && title.contains(&artist) {
        score -= 5;
    }
    if let Some(target) = target_duration {
        score += (i64::from(candidate.duration_seconds) - i64::from(target)).abs();
    }

    score
}

/// Selects the single best candidate for a recognised track.
///
/// Candidates with unknown (zero) or too long duration, and titles marking a
/// remix, cover, live take and the like, are dropped before scoring. Ties go
/// to the earlier candidate. `None` means nothing survived filtering.
pub fn rank(
    candidates: &[Candidate],
    artist: &str,
    // not scored
    _title: &str,
    target_duration: Option<u32>,
    options: &RankOptions,
) -> Option<ScoredCandidate> {
    candidates
        .iter()
        .filter(|c| c.duration_seconds != 0 && c.duration_seconds <= options.max_duration)
        .filter(|c| !variant_pattern().is_match(&c.title.to_lowercase()))
        .map(|c| ScoredCandidate {
            candidate: c.clone(),
            score: match_score(c, artist, target_duration),
        })
        .min_by_key(|scored| scored.score)
}

/// Score for [`rank_list`], higher is better.
pub fn priority_score(candidate: &Candidate) -> i64 {
    let title = candidate.title.to_lowercase();
    let uploader = candidate.uploader.to_lowercase();
    let mut score = 0i64;

    if contains_any(&uploader, LABEL_UPLOADERS) {
        score += 10;
    }
    if uploader.contains(VERIFIED_UPLOADER) {
        score += 15;
    }
    if contains_any(&title, PROMOTED_TITLE_WORDS) {
        score += 5;
    }
    if contains_any(&title, NOVELTY_TITLE_WORDS) {
        score -= 10;
    }

    score
}

fn is_short_form(candidate: &Candidate) -> bool {
    candidate.url.to_lowercase().contains(SHORT_FORM_MARKER)
        || candidate.title.to_lowercase().contains(SHORT_FORM_MARKER)
}

/// Orders free-text search results for the user to pick from.
pub fn rank_list(
    candidates: &[Candidate],
    limit: usize,
    options: &RankOptions,
) -> Vec<ScoredCandidate> {
    let mut ranked = candidates
        .iter()
        .filter(|c| !c.title.trim().is_empty())
        .filter(|c| {
            c.duration_seconds >= MIN_LIST_DURATION && c.duration_seconds <= options.max_duration
        })
        .filter(|c| !is_short_form(c))
        .map(|c| ScoredCandidate {
            candidate: c.clone(),
            score: priority_score(c),
        })
        .collect::<Vec<_>>();

    // sort_by is stable, equal scores keep search order
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked.truncate(limit);
    ranked
}
