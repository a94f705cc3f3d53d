/// Schedule encoding: labelled match results -> indexed count observations.
///
/// Callers identify teams by label. The crate maps labels to dense `0..K`
/// indices once, here, and everything downstream works on indices.
use std::collections::HashMap;

use crate::error::{Result, ScorelineError};
use crate::types::{MatchInput, MatchRecord};

/// Maps between caller-provided labels and internal 0..K indices.
#[derive(Debug, Clone)]
pub struct EntityIndex {
    labels: Vec<String>,
    label_to_idx: HashMap<String, usize>,
}

impl EntityIndex {
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let mut label_to_idx = HashMap::with_capacity(labels.len());
        for (idx, label) in labels.iter().enumerate() {
            let label = label.as_ref();
            if label_to_idx.insert(label.to_string(), idx).is_some() {
                return Err(ScorelineError::InvalidRecord(format!(
                    "duplicate entity label: {label}"
                )));
            }
        }
        Ok(EntityIndex {
            labels: labels.iter().map(|l| l.as_ref().to_string()).collect(),
            label_to_idx,
        })
    }

    /// Index every label in order of first appearance (home before away).
    pub fn from_matches(matches: &[MatchInput]) -> Self {
        let mut labels = Vec::new();
        let mut label_to_idx = HashMap::new();
        for m in matches {
            for label in [&m.home, &m.away] {
                if !label_to_idx.contains_key(label) {
                    label_to_idx.insert(label.clone(), labels.len());
                    labels.push(label.clone());
                }
            }
        }
        EntityIndex {
            labels,
            label_to_idx,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn to_idx(&self, label: &str) -> Result<usize> {
        self.label_to_idx
            .get(label)
            .copied()
            .ok_or_else(|| ScorelineError::InvalidRecord(format!("unknown entity label: {label}")))
    }

    pub fn label(&self, idx: usize) -> &str {
        &self.labels[idx]
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn convert_matches(&self, matches: &[MatchInput]) -> Result<Vec<MatchRecord>> {
        matches
            .iter()
            .map(|m| {
                Ok(MatchRecord {
                    home: self.to_idx(&m.home)?,
                    away: self.to_idx(&m.away)?,
                    home_count: m.home_count,
                    away_count: m.away_count,
                })
            })
            .collect()
    }
}

/// Observed matches in index space, plus the per-entity adjacency the
/// sampler uses to re-evaluate only the matches a coordinate touches.
#[derive(Debug, Clone)]
pub struct Schedule {
    n_entities: usize,
    records: Vec<MatchRecord>,
    /// entity -> indices into `records` where the entity plays either role.
    entity_matches: Vec<Vec<usize>>,
}

impl Schedule {
    pub fn new(n_entities: usize, records: Vec<MatchRecord>) -> Result<Self> {
        if n_entities < 2 {
            return Err(ScorelineError::InvalidConfig(format!(
                "need at least 2 entities, got {n_entities}"
            )));
        }
        if records.is_empty() {
            return Err(ScorelineError::InvalidConfig(
                "need at least one match record".to_string(),
            ));
        }

        let mut entity_matches: Vec<Vec<usize>> = vec![Vec::new(); n_entities];
        for (i, r) in records.iter().enumerate() {
            if r.home >= n_entities || r.away >= n_entities {
                return Err(ScorelineError::InvalidRecord(format!(
                    "match {i}: entity index out of range ({} vs {}, K = {n_entities})",
                    r.home, r.away
                )));
            }
            if r.home == r.away {
                return Err(ScorelineError::InvalidRecord(format!(
                    "match {i}: entity {} cannot play itself",
                    r.home
                )));
            }
            entity_matches[r.home].push(i);
            entity_matches[r.away].push(i);
        }

        Ok(Schedule {
            n_entities,
            records,
            entity_matches,
        })
    }

    pub fn n_entities(&self) -> usize {
        self.n_entities
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[MatchRecord] {
        &self.records
    }

    pub fn matches_of(&self, entity: usize) -> &[usize] {
        &self.entity_matches[entity]
    }
}

/// Encode labelled results. With `labels = None` the entity order is the
/// order of first appearance in `matches`.
pub fn encode_schedule(
    matches: &[MatchInput],
    labels: Option<&[String]>,
) -> Result<(EntityIndex, Schedule)> {
    let index = match labels {
        Some(labels) => EntityIndex::from_labels(labels)?,
        None => EntityIndex::from_matches(matches),
    };
    let records = index.convert_matches(matches)?;
    let schedule = Schedule::new(index.len(), records)?;
    Ok((index, schedule))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(home: &str, away: &str, hc: u32, ac: u32) -> MatchInput {
        MatchInput {
            home: home.to_string(),
            away: away.to_string(),
            home_count: hc,
            away_count: ac,
        }
    }

    #[test]
    fn test_encode_first_appearance_order() {
        let matches = vec![input("Leeds", "Hull", 2, 1), input("York", "Leeds", 0, 0)];
        let (index, schedule) = encode_schedule(&matches, None).unwrap();

        assert_eq!(index.labels(), &["Leeds", "Hull", "York"]);
        assert_eq!(schedule.n_entities(), 3);
        assert_eq!(schedule.records()[1].home, 2);
        assert_eq!(schedule.records()[1].away, 0);
        assert_eq!(schedule.matches_of(0), &[0, 1]);
        assert_eq!(schedule.matches_of(1), &[0]);
    }

    #[test]
    fn test_explicit_labels_and_unknown_label() {
        let labels = vec!["A".to_string(), "B".to_string()];
        let matches = vec![input("A", "C", 1, 0)];
        let err = encode_schedule(&matches, Some(&labels)).unwrap_err();
        assert!(matches!(err, ScorelineError::InvalidRecord(_)));
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let err = EntityIndex::from_labels(&["A", "B", "A"]).unwrap_err();
        assert!(err.to_string().contains("duplicate entity label"));
    }

    #[test]
    fn test_self_pairing_rejected() {
        let records = vec![MatchRecord { home: 1, away: 1, home_count: 0, away_count: 0 }];
        let err = Schedule::new(3, records).unwrap_err();
        assert!(err.to_string().contains("cannot play itself"));
    }

    #[test]
    fn test_non_positive_sizes_rejected() {
        assert!(matches!(Schedule::new(1, vec![]), Err(ScorelineError::InvalidConfig(_))));
        assert!(matches!(Schedule::new(4, vec![]), Err(ScorelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_adjacency_lists_every_match_of_an_entity() {
        let mut records = Vec::new();
        for h in 0..3 {
            for a in 0..3 {
                if h != a {
                    records.push(MatchRecord { home: h, away: a, home_count: 1, away_count: 0 });
                }
            }
        }
        let full = Schedule::new(3, records.clone()).unwrap();
        for e in 0..3 {
            assert_eq!(full.matches_of(e).len(), 4);
        }

        // Last record is (2, 1).
        records.pop();
        let partial = Schedule::new(3, records).unwrap();
        assert_eq!(partial.matches_of(0).len(), 4);
        assert_eq!(partial.matches_of(1).len(), 3);
        assert_eq!(partial.matches_of(2).len(), 3);
    }
}
