//! Outer retry rounds over chunks that failed a full fetch.
use crate::error::ChunkError;
use crate::state::{ChunkLedger, ChunkSpec};
use crate::worker::ChunkFetcher;
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{error, info};

/// Re-runs failed chunks in concurrent rounds until none fail or the round
/// budget is spent.
#[derive(Clone)]
pub struct RetryCoordinator {
    fetcher: ChunkFetcher,
    max_rounds: u32,
}

impl RetryCoordinator {
    pub fn new(fetcher: ChunkFetcher, max_rounds: u32) -> Self {
        RetryCoordinator {
            fetcher,
            max_rounds,
        }
    }

    /// Drains the failed set of `ledger`, returning the chunks still failing.
    ///
    /// Each round takes a snapshot of the failed chunks, clears the set and
    /// fetches every chunk of the snapshot at once. Chunks failing again land
    /// back in the set for the next round.
    pub async fn drain(&self, ledger: &Arc<ChunkLedger>) -> Vec<ChunkSpec> {
        for round in 1..=self.max_rounds {
            let snapshot = ledger.take_failed().await;
            if snapshot.is_empty() {
                break;
            }

            info!(
                "Retrying {} failed chunks (round {}/{})",
                snapshot.len(),
                round,
                self.max_rounds
            );
            self.fetcher
                .observer()
                .message(format!("Retrying {} chunks...", snapshot.len()));

            let tasks: Vec<_> = snapshot
                .iter()
                .cloned()
                .map(|spec| {
                    let fetcher = self.fetcher.clone();
                    let ledger = ledger.clone();
                    tokio::spawn(async move { fetcher.fetch(spec, &ledger).await })
                })
                .collect();

            for (spec, result) in snapshot.iter().zip(join_all(tasks).await) {
                if let Err(e) = result {
                    error!("Fetch task for part {} did not finish: {}", spec.index, e);
                    let aborted = ChunkError::Aborted {
                        reason: e.to_string(),
                    };
                    ledger.mark_failed(spec, &aborted).await;
                }
            }
        }

        ledger.failed_specs().await
    }
}
