//! Shared app-launch fuzzy matching (spec §4.5.2).
//!
//! Exact match wins outright, then substring, then a string-similarity
//! ratio against a cutoff. A prior Windows-only implementation used a
//! `SequenceMatcher`-style ratio at a 0.6 cutoff; `cup-core` uses `strsim`'s
//! Jaro-Winkler similarity (closest crates.io analogue to `SequenceMatcher`'s
//! ratio) against a 0.5 cutoff -- a recorded deviation, see `DESIGN.md`.

use std::thread;
use std::time::{Duration, Instant};

use crate::errors::CupError;

pub const FUZZY_CUTOFF: f64 = 0.5;
const WAIT_TIMEOUT: Duration = Duration::from_secs(8);
const WAIT_POLL: Duration = Duration::from_millis(500);

/// One launchable application as discovered by a platform's app enumerator.
#[derive(Debug, Clone)]
pub struct AppCandidate {
    pub name: String,
    /// Launch-command identity: an AppID/`.lnk` path on Windows, a bundle
    /// path on macOS, a `.desktop` file on Linux.
    pub launch_id: String,
}

/// Picks the best fuzzy match for `query` among `candidates`, or `None` if
/// nothing clears [`FUZZY_CUTOFF`].
pub fn fuzzy_match<'a>(query: &str, candidates: &'a [AppCandidate]) -> Option<&'a AppCandidate> {
    let query_lower = query.to_lowercase();

    if let Some(exact) = candidates.iter().find(|c| c.name.to_lowercase() == query_lower) {
        return Some(exact);
    }
    if let Some(sub) = candidates.iter().find(|c| c.name.to_lowercase().contains(&query_lower)) {
        return Some(sub);
    }

    candidates
        .iter()
        .map(|c| (c, strsim::jaro_winkler(&query_lower, &c.name.to_lowercase())))
        .filter(|(_, score)| *score >= FUZZY_CUTOFF)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(c, _)| c)
}

/// Polls `window_exists` at [`WAIT_POLL`] intervals until it reports a
/// window, or [`WAIT_TIMEOUT`] elapses.
pub fn wait_for_window(mut window_exists: impl FnMut() -> Result<bool, CupError>) -> Result<(), CupError> {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    loop {
        if window_exists()? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(CupError::Timeout("launched app's window did not appear within 8s".into()));
        }
        thread::sleep(WAIT_POLL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<AppCandidate> {
        vec![
            AppCandidate { name: "Visual Studio Code".into(), launch_id: "code".into() },
            AppCandidate { name: "Notepad".into(), launch_id: "notepad".into() },
            AppCandidate { name: "Calculator".into(), launch_id: "calc".into() },
        ]
    }

    #[test]
    fn exact_match_wins() {
        let m = fuzzy_match("Notepad", &candidates()).unwrap();
        assert_eq!(m.launch_id, "notepad");
    }

    #[test]
    fn substring_match_when_no_exact() {
        let m = fuzzy_match("Visual Studio", &candidates()).unwrap();
        assert_eq!(m.launch_id, "code");
    }

    #[test]
    fn fuzzy_match_tolerates_typos() {
        let m = fuzzy_match("Calculater", &candidates()).unwrap();
        assert_eq!(m.launch_id, "calc");
    }

    #[test]
    fn no_match_below_cutoff() {
        assert!(fuzzy_match("xyzzy_plugh", &candidates()).is_none());
    }
}
