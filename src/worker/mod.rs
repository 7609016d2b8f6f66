//! Spend Worker
//!
//! Witness computation and proof generation run as background tasks on a
//! dedicated rayon pool, never on the validation thread. Each task carries
//! a cancellation token, publishes its stage on a watch channel and hands
//! its result back over a oneshot channel.
//!
//! A task owns the [`SpendReservation`] for its mint. Completing the spend
//! marks the mint pending; any failure or cancellation drops the
//! reservation, which leaves the mint unspent and selectable again.

use crate::chain::ChainHandle;
use crate::config::{SecurityLevel, WorkerConfig};
use crate::crypto::Commitment;
use crate::error::{Result, ZerocoinError};
use crate::proof::{Destination, ProofEngine, SpendProof};
use crate::wallet::{SpendReservation, WitnessKey};
use crate::witness::WitnessCalculator;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ZerocoinError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Stage of a spend task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpendProgress {
    Queued,
    PreparingWitness,
    BuildingWitness { hashed: u64, total: u64 },
    Proving { members: usize },
    Finished,
    Cancelled,
    Failed(String),
}

impl SpendProgress {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SpendProgress::Finished | SpendProgress::Cancelled | SpendProgress::Failed(_)
        )
    }
}

pub struct SpendRequest {
    pub chain: ChainHandle,
    pub reservation: SpendReservation,
    /// Absent means a self-payment to a fresh wallet destination
    pub destination: Option<Destination>,
    pub security_level: SecurityLevel,
    /// Absent means the latest final checkpoint covering the mint
    pub checkpoint_height: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SpendOutcome {
    pub proof: SpendProof,
    pub destination: Destination,
    pub commitment: Commitment,
}

/// Handle to a running spend
pub struct SpendTask {
    cancel: CancellationToken,
    progress: watch::Receiver<SpendProgress>,
    result: oneshot::Receiver<Result<SpendOutcome>>,
}

impl SpendTask {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Receiver of stage updates
    pub fn progress(&self) -> watch::Receiver<SpendProgress> {
        self.progress.clone()
    }

    pub fn current_progress(&self) -> SpendProgress {
        self.progress.borrow().clone()
    }

    /// Block until the task finishes. Must not be called from async code.
    pub fn wait(self) -> Result<SpendOutcome> {
        self.result
            .blocking_recv()
            .map_err(|_| ZerocoinError::WorkerUnavailable)?
    }

    pub async fn join(self) -> Result<SpendOutcome> {
        self.result
            .await
            .map_err(|_| ZerocoinError::WorkerUnavailable)?
    }
}

pub struct SpendWorker {
    pool: rayon::ThreadPool,
    engine: ProofEngine,
    calculator: WitnessCalculator,
}

impl SpendWorker {
    pub fn new(config: &WorkerConfig, engine: ProofEngine) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads.max(1))
            .thread_name(|i| format!("zerocoin-spend-{i}"))
            .build()
            .map_err(|e| ZerocoinError::Config(format!("failed to build spend worker pool: {e}")))?;
        Ok(Self {
            pool,
            engine,
            calculator: WitnessCalculator::new(config.progress_interval),
        })
    }

    pub fn spawn_spend(&self, request: SpendRequest) -> SpendTask {
        let cancel = CancellationToken::new();
        let (progress_tx, progress_rx) = watch::channel(SpendProgress::Queued);
        let (result_tx, result_rx) = oneshot::channel();

        let engine = self.engine.clone();
        let calculator = self.calculator.clone();
        let token = cancel.clone();
        self.pool.spawn(move || {
            let outcome = run_spend(&engine, &calculator, request, &token, &progress_tx);
            let last = match &outcome {
                Ok(_) => SpendProgress::Finished,
                Err(ZerocoinError::Cancelled) => {
                    info!("Spend task cancelled");
                    SpendProgress::Cancelled
                }
                Err(err) => {
                    warn!("Spend task failed: {}", err);
                    SpendProgress::Failed(err.to_string())
                }
            };
            progress_tx.send_replace(last);
            if result_tx.send(outcome).is_err() {
                debug!("Spend task finished with nobody waiting");
            }
        });

        SpendTask {
            cancel,
            progress: progress_rx,
            result: result_rx,
        }
    }
}

fn run_spend(
    engine: &ProofEngine,
    calculator: &WitnessCalculator,
    request: SpendRequest,
    cancel: &CancellationToken,
    progress: &watch::Sender<SpendProgress>,
) -> Result<SpendOutcome> {
    let SpendRequest {
        chain,
        reservation,
        destination,
        security_level,
        checkpoint_height,
    } = request;
    cancel.check()?;
    progress.send_replace(SpendProgress::PreparingWitness);

    let mint = reservation.mint().clone();
    let wallet = reservation.wallet();
    let job = {
        let state = chain.read();
        calculator.prepare(&state, &mint, checkpoint_height, security_level)?
    };

    let key = WitnessKey {
        commitment: *mint.commitment(),
        checkpoint_height: job.checkpoint_height(),
        security_level,
    };
    let witness = match wallet.cached_witness(&key) {
        Some(witness) => {
            debug!("Reusing cached witness for checkpoint {}", key.checkpoint_height);
            witness
        }
        None => {
            let witness = job.compute(cancel, calculator.progress_interval(), &mut |hashed, total| {
                progress.send_replace(SpendProgress::BuildingWitness { hashed, total });
            })?;
            wallet.cache_witness(key, witness.clone());
            witness
        }
    };
    cancel.check()?;

    progress.send_replace(SpendProgress::Proving {
        members: witness.window.len(),
    });
    let destination = destination.unwrap_or_else(|| wallet.fresh_destination());
    let proof = engine.generate_spend_proof(&mint, &witness, &destination, cancel)?;
    cancel.check()?;

    reservation.complete();
    Ok(SpendOutcome {
        proof,
        destination,
        commitment: *mint.commitment(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(ZerocoinError::Cancelled)));
    }

    #[test]
    fn test_terminal_stages() {
        assert!(SpendProgress::Finished.is_terminal());
        assert!(SpendProgress::Failed("x".into()).is_terminal());
        assert!(!SpendProgress::Proving { members: 3 }.is_terminal());
    }

    #[test]
    fn test_worker_pool_builds() {
        let config = WorkerConfig {
            threads: 1,
            progress_interval: 8,
        };
        assert!(SpendWorker::new(&config, ProofEngine::default()).is_ok());
    }
}
