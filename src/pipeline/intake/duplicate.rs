//! Duplicate classification. Never blocks a save; only reports candidates.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::gateway::{PersistenceError, PersistenceGateway};
use crate::models::{DuplicateCandidate, DuplicateQuery};
use crate::pipeline::normalize::{name_key, normalize_id_number};

pub struct DuplicateResolver {
    persistence: Arc<dyn PersistenceGateway>,
}

impl DuplicateResolver {
    pub fn new(persistence: Arc<dyn PersistenceGateway>) -> Self {
        Self { persistence }
    }

    /// Existing guests matching `query` by id number (high confidence) or by
    /// name and birth date (medium). Each guest appears once, tagged with
    /// its strongest rule. Sorted by confidence, then creation time.
    pub async fn check(
        &self,
        query: &DuplicateQuery,
    ) -> Result<Vec<DuplicateCandidate>, PersistenceError> {
        if !is_matchable(query) {
            return Ok(Vec::new());
        }
        let hits = self.persistence.duplicate_candidates(query).await?;
        let candidates = merge_candidates(hits);
        debug!(candidates = candidates.len(), "Duplicate check complete");
        Ok(candidates)
    }
}

/// At least one rule has every field it needs.
fn is_matchable(query: &DuplicateQuery) -> bool {
    let by_id = query
        .id_number
        .as_deref()
        .and_then(normalize_id_number)
        .is_some();
    let by_name = query.birth_key().is_some()
        && name_key(query.family_name.as_deref(), query.given_name.as_deref()).is_some();
    by_id || by_name
}

fn merge_candidates(hits: Vec<DuplicateCandidate>) -> Vec<DuplicateCandidate> {
    let mut best: HashMap<Uuid, DuplicateCandidate> = HashMap::new();
    for hit in hits {
        match best.get(&hit.guest_id) {
            Some(existing) if existing.match_confidence.rank() >= hit.match_confidence.rank() => {}
            _ => {
                best.insert(hit.guest_id, hit);
            }
        }
    }
    let mut merged: Vec<DuplicateCandidate> = best.into_values().collect();
    merged.sort_by(|a, b| {
        b.match_confidence
            .rank()
            .cmp(&a.match_confidence.rank())
            .then(a.created_at.cmp(&b.created_at))
            .then(a.guest_id.cmp(&b.guest_id))
    });
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SqliteGateway;
    use crate::models::{DocumentType, MatchConfidence, MatchType, NewGuest};
    use chrono::NaiveDate;

    fn new_guest(given: &str, family: &str, id_number: Option<&str>) -> NewGuest {
        NewGuest {
            document_type: DocumentType::NationalId,
            given_name: Some(given.into()),
            family_name: Some(family.into()),
            id_number: id_number.map(str::to_string),
            document_number: None,
            birth_date: NaiveDate::from_ymd_opt(1985, 2, 3),
            birth_date_raw: Some("03.02.1985".into()),
            gender: None,
            nationality: None,
            birth_place: None,
            issue_date: None,
            expiry_date: None,
            father_name: None,
            mother_name: None,
            consent_given: true,
            source_extraction: None,
            edited_fields: Vec::new(),
        }
    }

    fn query(given: &str, family: &str, id_number: Option<&str>) -> DuplicateQuery {
        DuplicateQuery {
            id_number: id_number.map(str::to_string),
            family_name: Some(family.into()),
            given_name: Some(given.into()),
            birth_date: NaiveDate::from_ymd_opt(1985, 2, 3),
            birth_date_raw: Some("1985-02-03".into()),
        }
    }

    #[tokio::test]
    async fn both_rules_on_one_guest_reported_once_as_high() {
        let gw = Arc::new(SqliteGateway::open_in_memory().unwrap());
        let g1 = gw
            .create_guest(new_guest("Ayşe", "Kaya", Some("12345678901")))
            .await
            .unwrap();
        let resolver = DuplicateResolver::new(gw.clone());

        let found = resolver
            .check(&query("  ayşe ", "KAYA", Some("123 456 789 01")))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].guest_id, g1.id);
        assert_eq!(found[0].match_type, MatchType::IdNumber);
        assert_eq!(found[0].match_confidence, MatchConfidence::High);
    }

    #[tokio::test]
    async fn rules_are_a_union_over_different_guests() {
        let gw = Arc::new(SqliteGateway::open_in_memory().unwrap());
        let by_name = gw.create_guest(new_guest("Jan", "Novak", None)).await.unwrap();
        let by_id = gw
            .create_guest(new_guest("Other", "Person", Some("X-1")))
            .await
            .unwrap();
        let resolver = DuplicateResolver::new(gw.clone());

        let found = resolver.check(&query("Jan", "Novak", Some("x1"))).await.unwrap();
        let ids: Vec<Uuid> = found.iter().map(|c| c.guest_id).collect();
        assert_eq!(ids, vec![by_id.id, by_name.id]);
        assert_eq!(found[1].match_confidence, MatchConfidence::Medium);
    }

    #[tokio::test]
    async fn check_is_idempotent() {
        let gw = Arc::new(SqliteGateway::open_in_memory().unwrap());
        gw.create_guest(new_guest("Jan", "Novak", Some("7"))).await.unwrap();
        gw.create_guest(new_guest("Jan", "Novak", None)).await.unwrap();
        let resolver = DuplicateResolver::new(gw.clone());
        let q = query("Jan", "Novak", Some("7"));

        let first = resolver.check(&q).await.unwrap();
        let second = resolver.check(&q).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn diacritics_are_significant() {
        let gw = Arc::new(SqliteGateway::open_in_memory().unwrap());
        gw.create_guest(new_guest("José", "Núñez", None)).await.unwrap();
        let resolver = DuplicateResolver::new(gw.clone());

        assert!(resolver.check(&query("Jose", "Nunez", None)).await.unwrap().is_empty());
        assert_eq!(resolver.check(&query("JOSÉ", "NÚÑEZ", None)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unmatchable_query_is_empty() {
        let gw = Arc::new(SqliteGateway::open_in_memory().unwrap());
        gw.create_guest(new_guest("Jan", "Novak", None)).await.unwrap();
        let resolver = DuplicateResolver::new(gw.clone());

        let no_birth = DuplicateQuery {
            birth_date: None,
            birth_date_raw: None,
            ..query("Jan", "Novak", None)
        };
        assert!(resolver.check(&no_birth).await.unwrap().is_empty());
        assert!(resolver.check(&DuplicateQuery::default()).await.unwrap().is_empty());
    }
}
