//! Team/event correlation.
//!
//! Searches the venue for one of the alerted teams and fuzzy-matches the
//! hits against both team names, tolerating home/away swaps. A candidate is
//! accepted only when the combined score AND both per-team scores are under
//! their thresholds.

use tracing::{debug, info};

use super::Bookmaker;
use crate::types::{EdgeRunnerError, EventSearchHit, MatchCandidate};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tokens shorter than this at either end of a name are dropped ("fc", "sc").
const MIN_TOKEN_LEN: usize = 3;

const HOME_WEIGHT: f64 = 0.6;
const AWAY_WEIGHT: f64 = 0.4;

/// Score added per character the match starts away from the beginning.
const OFFSET_PENALTY: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Maximum weighted score (0.0 = perfect) for acceptance.
    pub max_combined_score: f64,
    /// Maximum score for each team individually.
    pub max_field_score: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_combined_score: 0.25,
            max_field_score: 0.4,
        }
    }
}

// ---------------------------------------------------------------------------
// Name normalization
// ---------------------------------------------------------------------------

/// Lowercase, drop short leading/trailing tokens, collapse separators.
///
/// `"FC Barcelona"` → `"barcelona"`, `"St. Pauli"` → `"st pauli"`,
/// `"AC"` → `"ac"` (nothing survives, so the longest token is kept).
pub fn normalize_team_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let parts: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == '/' || c == '-')
        .filter(|p| !p.is_empty())
        .collect();

    let mut start = 0;
    let mut end = parts.len();
    while start < end && parts[start].chars().count() < MIN_TOKEN_LEN {
        start += 1;
    }
    while end > start && parts[end - 1].chars().count() < MIN_TOKEN_LEN {
        end -= 1;
    }

    let kept: Vec<&str> = if start < end {
        parts[start..end].to_vec()
    } else {
        // First of equally long tokens wins.
        parts
            .iter()
            .copied()
            .fold(None::<&str>, |best, p| match best {
                Some(b) if b.chars().count() >= p.chars().count() => Some(b),
                _ => Some(p),
            })
            .into_iter()
            .collect()
    };

    kept.join(" ")
        .replace(['.', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Fuzzy scoring
// ---------------------------------------------------------------------------

/// Approximate-substring distance of `pattern` within `text`, normalized
/// to 0.0 (exact) .. 1.0 (unrelated).
///
/// Edit distance of the best-matching substring divided by the pattern
/// length, plus a small penalty for how far into `text` the match starts.
pub fn field_score(pattern: &str, text: &str) -> f64 {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    if p.is_empty() || t.is_empty() {
        return 1.0;
    }

    let m = p.len();
    // prev[i] = best edit distance of p[..i] ending at the previous text column.
    let mut prev: Vec<usize> = (0..=m).collect();
    let mut best = (m, 0usize);

    for (j, tc) in t.iter().enumerate() {
        let mut cur = vec![0usize; m + 1];
        for i in 1..=m {
            let cost = usize::from(p[i - 1] != *tc);
            cur[i] = (prev[i - 1] + cost).min(prev[i] + 1).min(cur[i - 1] + 1);
        }
        if cur[m] < best.0 {
            best = (cur[m], j + 1);
        }
        prev = cur;
    }

    let (edits, end) = best;
    let start = end.saturating_sub(m);
    let score = edits as f64 / m as f64 + start as f64 * OFFSET_PENALTY;
    score.min(1.0)
}

/// Per-team and combined scores for one orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Scored {
    home: f64,
    away: f64,
    combined: f64,
}

fn score_pair(home_q: &str, away_q: &str, home_c: &str, away_c: &str) -> Scored {
    let home = field_score(home_q, home_c);
    let away = field_score(away_q, away_c);
    Scored {
        home,
        away,
        combined: HOME_WEIGHT * home + AWAY_WEIGHT * away,
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

pub struct MatchResolver {
    config: ResolverConfig,
}

impl MatchResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Find the venue event for `home` vs `away`.
    ///
    /// Searches by the home name first, then the away name when that gives
    /// nothing. `Ok(None)` means no acceptable correlation.
    pub async fn resolve(
        &self,
        bookmaker: &dyn Bookmaker,
        home: &str,
        away: &str,
    ) -> Result<Option<MatchCandidate>, EdgeRunnerError> {
        if home.trim().is_empty() || away.trim().is_empty() {
            return Ok(None);
        }

        let mut hits = bookmaker.search_events(home).await?;
        if hits.is_empty() {
            debug!(term = home, "No search hits, retrying with away team");
            hits = bookmaker.search_events(away).await?;
        }
        if hits.is_empty() {
            debug!(home, away, "No search hits for either team");
            return Ok(None);
        }

        Ok(self.best_candidate(home, away, &hits))
    }

    /// Score every hit in both orientations and apply the acceptance rule.
    pub fn best_candidate(
        &self,
        home: &str,
        away: &str,
        hits: &[EventSearchHit],
    ) -> Option<MatchCandidate> {
        let home_q = normalize_team_name(home);
        let away_q = normalize_team_name(away);

        let mut best: Option<(Scored, bool, &EventSearchHit, String, String)> = None;

        for hit in hits {
            let home_c = normalize_team_name(&hit.team_home);
            let away_c = normalize_team_name(&hit.team_away);

            let direct = score_pair(&home_q, &away_q, &home_c, &away_c);
            let swapped = score_pair(&home_q, &away_q, &away_c, &home_c);
            let (scored, is_swapped) = if swapped.combined < direct.combined {
                (swapped, true)
            } else {
                (direct, false)
            };

            debug!(
                event = %hit.event_name,
                score = format!("{:.4}", scored.combined),
                home_score = format!("{:.4}", scored.home),
                away_score = format!("{:.4}", scored.away),
                swapped = is_swapped,
                "Scored search hit"
            );

            if best.as_ref().map_or(true, |(b, ..)| scored.combined < b.combined) {
                best = Some((scored, is_swapped, hit, home_c, away_c));
            }
        }

        let (scored, swapped, hit, home_c, away_c) = best?;

        if scored.combined <= self.config.max_combined_score
            && scored.home <= self.config.max_field_score
            && scored.away <= self.config.max_field_score
        {
            info!(
                event_id = %hit.event_id,
                event = %hit.event_name,
                score = format!("{:.4}", scored.combined),
                swapped,
                "Correlated venue event"
            );
            Some(MatchCandidate {
                event_id: hit.event_id.clone(),
                event_name: hit.event_name.clone(),
                home: home_c,
                away: away_c,
                score: scored.combined,
                swapped,
            })
        } else {
            debug!(
                home = %home_q,
                away = %away_q,
                best = %hit.event_name,
                score = format!("{:.4}", scored.combined),
                home_score = format!("{:.4}", scored.home),
                away_score = format!("{:.4}", scored.away),
                "No acceptable correlation"
            );
            None
        }
    }
}

impl Default for MatchResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, home: &str, away: &str) -> EventSearchHit {
        EventSearchHit {
            event_id: id.to_string(),
            event_name: format!("{home} - {away}"),
            team_home: home.to_string(),
            team_away: away.to_string(),
            event_date: None,
        }
    }

    // -- Normalization ----------------------------------------------------

    #[test]
    fn test_normalize_drops_short_edge_tokens() {
        assert_eq!(normalize_team_name("FC Barcelona"), "barcelona");
        assert_eq!(normalize_team_name("Bayern Munich FC"), "bayern munich");
        assert_eq!(normalize_team_name("AC Milan"), "milan");
    }

    #[test]
    fn test_normalize_keeps_inner_short_tokens() {
        assert_eq!(normalize_team_name("Real de Madrid"), "real de madrid");
    }

    #[test]
    fn test_normalize_splits_on_slash_and_hyphen() {
        assert_eq!(normalize_team_name("Brighton/Hove-Albion"), "brighton hove albion");
    }

    #[test]
    fn test_normalize_all_short_keeps_longest() {
        assert_eq!(normalize_team_name("AC FC"), "ac");
        assert_eq!(normalize_team_name("PS G"), "ps");
    }

    #[test]
    fn test_normalize_dots_and_whitespace() {
        assert_eq!(normalize_team_name("  St.Pauli   Hamburg "), "st pauli hamburg");
        assert_eq!(normalize_team_name(""), "");
    }

    // -- Scoring ----------------------------------------------------------

    #[test]
    fn test_field_score_exact_and_unrelated() {
        assert_eq!(field_score("barrow", "barrow"), 0.0);
        assert!(field_score("barrow", "liverpool") > 0.4);
        assert_eq!(field_score("", "barrow"), 1.0);
    }

    #[test]
    fn test_field_score_tolerates_small_typos() {
        let s = field_score("bolton wanderers", "bolton wanderer");
        assert!(s < 0.1, "score {s}");
    }

    #[test]
    fn test_field_score_is_bounded() {
        let s = field_score("completely different", "xyz");
        assert!((0.0..=1.0).contains(&s));
    }

    // -- Candidate selection ---------------------------------------------

    #[test]
    fn test_best_candidate_direct_orientation() {
        let resolver = MatchResolver::default();
        let hits = vec![
            hit("1", "Barrow AFC", "Bolton Wanderers"),
            hit("2", "Bolton Wanderers", "Wigan Athletic"),
        ];
        let c = resolver.best_candidate("Barrow", "Bolton Wanderers", &hits).unwrap();
        assert_eq!(c.event_id, "1");
        assert!(!c.swapped);
        assert!(c.score < 0.05);
    }

    #[test]
    fn test_best_candidate_swapped_orientation() {
        let resolver = MatchResolver::default();
        let hits = vec![hit("7", "Bolton Wanderers", "Barrow")];
        let c = resolver.best_candidate("Barrow", "Bolton Wanderers", &hits).unwrap();
        assert_eq!(c.event_id, "7");
        assert!(c.swapped);
    }

    #[test]
    fn test_rejects_when_one_team_is_wrong() {
        let resolver = MatchResolver::default();
        // Home matches perfectly, away is a different club.
        let hits = vec![hit("3", "Barrow", "Accrington Stanley")];
        assert!(resolver.best_candidate("Barrow", "Bolton Wanderers", &hits).is_none());
    }

    #[test]
    fn test_rejects_unrelated_hits() {
        let resolver = MatchResolver::default();
        let hits = vec![hit("4", "Real Madrid", "Sevilla")];
        assert!(resolver.best_candidate("Barrow", "Bolton Wanderers", &hits).is_none());
    }

    #[test]
    fn test_empty_hits() {
        assert!(MatchResolver::default().best_candidate("A", "B", &[]).is_none());
    }
}
