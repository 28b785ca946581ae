use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};

use log::debug;

use crate::domain::candidate::{Candidate, ScoredCandidate};

struct Offer {
    list: Vec<ScoredCandidate>,
    offered_at: Instant,
}

/// Ranked lists shown to users, waiting for them to pick an entry.
///
/// An entry is honored only while younger than the ttl. Expired entries are
/// evicted whenever they are touched and on every new offer.
pub struct PendingChoices {
    ttl: Duration,
    offers: Mutex<HashMap<String, Offer>>,
}

impl PendingChoices {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            offers: Mutex::new(HashMap::new()),
        }
    }

    fn offers(&self) -> MutexGuard<'_, HashMap<String, Offer>> {
        self.offers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn expired(&self, offer: &Offer, now: Instant) -> bool {
        now.saturating_duration_since(offer.offered_at) >= self.ttl
    }

    pub fn offer(&self, session: &str, list: Vec<ScoredCandidate>) {
        self.offer_at(session, list, Instant::now());
    }

    pub fn offer_at(&self, session: &str, list: Vec<ScoredCandidate>, now: Instant) {
        let mut offers = self.offers();
        offers.retain(|_, offer| !self.expired(offer, now));
        offers.insert(
            session.to_string(),
            Offer {
                list,
                offered_at: now,
            },
        );
    }

    /// Candidate at zero-based `index` of the session's list, if still valid.
    pub fn select(&self, session: &str, index: usize) -> Option<Candidate> {
        self.select_at(session, index, Instant::now())
    }

    pub fn select_at(&self, session: &str, index: usize, now: Instant) -> Option<Candidate> {
        let mut offers = self.offers();
        let offer = offers.get(session)?;
        if self.expired(offer, now) {
            debug!("choices of session {session} expired");
            offers.remove(session);
            return None;
        }
        offer.list.get(index).map(|scored| scored.candidate.clone())
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut offers = self.offers();
        let before = offers.len();
        offers.retain(|_, offer| !self.expired(offer, now));
        before - offers.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.offers().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(titles: &[&str]) -> Vec<ScoredCandidate> {
        titles
            .iter()
            .map(|t| ScoredCandidate {
                candidate: Candidate {
                    external_id: t.to_string(),
                    url: format!("https://www.youtube.com/watch?v={t}"),
                    title: t.to_string(),
                    uploader: "u".into(),
                    duration_seconds: 200,
                },
                score: 0,
            })
            .collect()
    }

    #[test]
    fn selection_within_ttl_is_honored_repeatedly() {
        let choices = PendingChoices::new(Duration::from_secs(60));
        let start = Instant::now();
        choices.offer_at("user", list(&["a", "b"]), start);

        let later = start + Duration::from_secs(59);
        assert_eq!(choices.select_at("user", 1, later).unwrap().title, "b");
        assert_eq!(choices.select_at("user", 0, later).unwrap().title, "a");
        assert!(choices.select_at("user", 2, later).is_none());
    }

    #[test]
    fn expired_selection_is_refused_and_evicted() {
        let choices = PendingChoices::new(Duration::from_secs(60));
        let start = Instant::now();
        choices.offer_at("user", list(&["a"]), start);

        assert!(choices.select_at("user", 0, start + Duration::from_secs(60)).is_none());
        assert!(choices.is_empty());
    }

    #[test]
    fn new_offer_replaces_list_and_sweeps_stale_sessions() {
        let choices = PendingChoices::new(Duration::from_secs(60));
        let start = Instant::now();
        choices.offer_at("old", list(&["x"]), start);
        choices.offer_at("user", list(&["a"]), start);

        let later = start + Duration::from_secs(61);
        choices.offer_at("user", list(&["c"]), later);

        assert_eq!(choices.len(), 1);
        assert_eq!(choices.select_at("user", 0, later).unwrap().title, "c");
    }

    #[test]
    fn sweep_removes_only_expired() {
        let choices = PendingChoices::new(Duration::from_secs(60));
        let start = Instant::now();
        choices.offer_at("a", list(&["x"]), start);
        choices.offer_at("b", list(&["y"]), start + Duration::from_secs(30));

        assert_eq!(choices.sweep_at(start + Duration::from_secs(70)), 1);
        assert!(choices.select_at("b", 0, start + Duration::from_secs(70)).is_some());
    }

    #[test]
    fn unknown_session_has_nothing() {
        let choices = PendingChoices::new(Duration::from_secs(60));
        assert!(choices.select("nobody", 0).is_none());
        assert_eq!(choices.sweep(), 0);
    }
}
