//! Periodic score recomputation.
//!
//! Scores decay with age, so they must be recomputed even when nothing is
//! voted on. The batch updater sweeps every active document, rewrites its
//! score, and flags documents past the inactivity threshold so later sweeps
//! skip them. A new vote clears the flag and puts the document back in the
//! sweep.
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use voting_repository::DocumentsRepository;
use voting_shared::types::Collection;

use crate::config::EngineConfig;
use crate::scoring::recalculate_score_at;

const SWEPT_COLLECTIONS: &[Collection] = &[
    Collection::Posts,
    Collection::Comments,
    Collection::TagRevisions,
];

/// Tally of one batch sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Documents whose score was rewritten.
    pub updated: u64,
    /// Documents flagged inactive during this sweep (also counted in
    /// `updated`).
    pub deactivated: u64,
    /// Documents that failed to update and were skipped.
    pub failed: u64,
}

/// Recomputes time-decayed scores across all active documents.
pub struct BatchScoreUpdater {
    documents: Arc<dyn DocumentsRepository>,
    config: EngineConfig,
}

impl BatchScoreUpdater {
    pub fn new(documents: Arc<dyn DocumentsRepository>, config: EngineConfig) -> Self {
        Self { documents, config }
    }

    /// Runs one sweep at the current time. See [`BatchScoreUpdater::run_at`].
    pub async fn run(&self) -> BatchOutcome {
        self.run_at(Utc::now()).await
    }

    /// Runs one sweep as of `now`.
    ///
    /// A failure on one document is logged and skipped; the sweep always
    /// visits every active document.
    pub async fn run_at(&self, now: DateTime<Utc>) -> BatchOutcome {
        let threshold = Duration::days(self.config.inactivity_threshold_days);
        let mut outcome = BatchOutcome::default();

        for collection in SWEPT_COLLECTIONS {
            let documents = match self.documents.active_documents(*collection).await {
                Ok(documents) => documents,
                Err(error) => {
                    tracing::error!(%collection, %error, "failed to list active documents");
                    outcome.failed += 1;
                    continue;
                }
            };

            for document in documents {
                let score = recalculate_score_at(&document, &self.config.score, now);
                let deactivate = now - document.posted_at > threshold;
                let inactive = if deactivate { Some(true) } else { None };
                match self
                    .documents
                    .set_score(document.collection, document.id, score, inactive)
                    .await
                {
                    Ok(()) => {
                        outcome.updated += 1;
                        if deactivate {
                            outcome.deactivated += 1;
                        }
                    }
                    Err(error) => {
                        tracing::error!(
                            %collection,
                            document = %document.id,
                            %error,
                            "failed to update score"
                        );
                        outcome.failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            updated = outcome.updated,
            deactivated = outcome.deactivated,
            failed = outcome.failed,
            "score sweep finished"
        );
        outcome
    }
}
