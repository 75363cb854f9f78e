//! Duplicate detector (C8): fingerprints a candidate transaction and
//! scores it against existing ledger rows within a ±1 day window.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use pf_errors::Error;
use pf_primitives::{TransactionId, WalletId};
use pf_store::TransactionRepository;

/// `(wallet_id, date_bucket, signed_amount_minor, normalized_note)` — the
/// tuple used to cluster candidates with existing rows (§4.8, GLOSSARY).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub wallet_id: WalletId,
    pub date_bucket: NaiveDate,
    pub signed_amount_minor: i64,
    pub normalized_note: String,
}

/// Lowercase, trim, and collapse internal whitespace runs to a single
/// space — so "Coffee  Shop" and "coffee shop" fingerprint identically.
pub fn normalize_note(note: &str) -> String {
    note.trim().split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub fn fingerprint(
    wallet_id: WalletId,
    occurred_at: DateTime<Utc>,
    signed_amount_minor: i64,
    note: &str,
) -> Fingerprint {
    Fingerprint {
        wallet_id,
        date_bucket: occurred_at.date_naive(),
        signed_amount_minor,
        normalized_note: normalize_note(note),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateMatch {
    pub existing_transaction_id: TransactionId,
    pub confidence: u8,
    pub reason: String,
}

pub struct DuplicateDetector<R> {
    transactions: R,
}

impl<R> DuplicateDetector<R>
where
    R: TransactionRepository,
{
    pub fn new(transactions: R) -> Self {
        Self { transactions }
    }

    /// Candidates come from the store filtered to the same wallet and
    /// exact signed amount within ±1 day; this method then scores each
    /// one by field agreement. Confidence drives UI treatment only —
    /// the caller's duplicate policy decides what happens on commit
    /// (§4.8, §4.9 step 3).
    pub async fn find_matches(&self, print: &Fingerprint) -> Result<Vec<DuplicateMatch>, Error> {
        let window_start = print.date_bucket.and_hms_opt(0, 0, 0).unwrap().and_utc() - Duration::days(1);
        let window_end = print.date_bucket.and_hms_opt(23, 59, 59).unwrap().and_utc() + Duration::days(1);

        let candidates = self
            .transactions
            .find_candidates(print.wallet_id, print.signed_amount_minor, window_start, window_end)
            .await?;

        Ok(candidates
            .into_iter()
            .map(|existing| {
                let existing_bucket = existing.occurred_at.date_naive();
                let existing_note = normalize_note(&existing.note);

                let mut confidence: u8 = 60; // wallet + exact amount already matched by the query
                let mut reasons = vec!["same wallet and amount".to_string()];

                if existing_bucket == print.date_bucket {
                    confidence += 20;
                    reasons.push("same day".to_string());
                } else {
                    reasons.push("within one day".to_string());
                }

                if existing_note == print.normalized_note {
                    confidence += 20;
                    reasons.push("same note".to_string());
                } else if !existing_note.is_empty()
                    && (existing_note.contains(&print.normalized_note) || print.normalized_note.contains(&existing_note))
                {
                    confidence += 10;
                    reasons.push("similar note".to_string());
                }

                DuplicateMatch {
                    existing_transaction_id: existing.id,
                    confidence: confidence.min(100),
                    reason: reasons.join("; "),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_primitives::Currency;
    use pf_store::{InMemoryStore, NewTransaction, TransactionRepository, UserRepository, WalletRepository};

    #[tokio::test]
    async fn exact_same_day_and_note_scores_highest() {
        let store = InMemoryStore::new();
        let user = store.create("a@b.com", "A", None, Currency::Usd).await.unwrap();
        let wallet = store
            .create(user.id, "Cash", pf_store::WalletType::Cash, Currency::Usd)
            .await
            .unwrap();

        let now = Utc::now();
        store
            .bulk_create(vec![NewTransaction {
                wallet_id: wallet.id,
                category_id: None,
                amount_minor: -500,
                currency: Currency::Usd,
                occurred_at: now,
                note: "Coffee Shop".into(),
                import_batch_id: None,
            }])
            .await
            .unwrap();

        let detector = DuplicateDetector::new(store);
        let print = fingerprint(wallet.id, now, -500, "coffee  shop");
        let matches = detector.find_matches(&print).await.unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].confidence, 100);
    }

    #[tokio::test]
    async fn different_amount_never_surfaces_as_candidate() {
        let store = InMemoryStore::new();
        let user = store.create("a@b.com", "A", None, Currency::Usd).await.unwrap();
        let wallet = store
            .create(user.id, "Cash", pf_store::WalletType::Cash, Currency::Usd)
            .await
            .unwrap();

        let now = Utc::now();
        store
            .bulk_create(vec![NewTransaction {
                wallet_id: wallet.id,
                category_id: None,
                amount_minor: -500,
                currency: Currency::Usd,
                occurred_at: now,
                note: "Coffee".into(),
                import_batch_id: None,
            }])
            .await
            .unwrap();

        let detector = DuplicateDetector::new(store);
        let print = fingerprint(wallet.id, now, -999, "coffee");
        assert!(detector.find_matches(&print).await.unwrap().is_empty());
    }
}
