//! The settlement keeper loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use keystone_contracts::{ContractEvent, EscrowCall, EscrowEvent, EventKind, VerifierEvent};
use keystone_core::{Address, BlockNumber, EscrowState, TxHash, Wei};
use keystone_ledger::{LedgerClient, LogFilter, RevertReason, Transaction};
use tokio::time::MissedTickBehavior;

use crate::error::KeeperError;
use crate::processed::ProcessedConditions;
use crate::registry::{EscrowEntry, Registry};

/// What happened when the keeper tried to settle one escrow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// `release` was mined successfully.
    Released { tx_hash: TxHash, amount: Option<Wei> },
    /// The keeper does not act for this escrow's seller.
    IdentityMismatch { seller: Address },
    /// The escrow is not in `Funded`.
    NotFunded { state: EscrowState },
    /// The simulated `release` reverted; nothing was submitted.
    PrecheckFailed { reason: RevertReason },
    /// The submitted `release` reverted.
    Reverted { tx_hash: TxHash, reason: RevertReason },
    /// The ledger could not be reached or answered with an error.
    Failed { error: String },
}

impl ReleaseOutcome {
    pub fn is_released(&self) -> bool {
        matches!(self, Self::Released { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAttempt {
    pub escrow: Address,
    pub verifier: Address,
    pub condition_id: u64,
    pub outcome: ReleaseOutcome,
}

/// Summary of one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Inclusive block range scanned; `None` if there were no new blocks.
    pub blocks: Option<(BlockNumber, BlockNumber)>,
    /// Fulfilment events seen in the range.
    pub events: usize,
    /// Events for conditions already processed.
    pub duplicates: usize,
    /// Events with no registered escrow.
    pub unmatched: usize,
    pub attempts: Vec<ReleaseAttempt>,
}

impl TickReport {
    pub fn released(&self) -> usize {
        self.attempts.iter().filter(|a| a.outcome.is_released()).count()
    }

    pub fn is_quiet(&self) -> bool {
        self.events == 0
    }
}

/// Watches verifiers for fulfilled conditions and settles linked escrows.
pub struct SettlementKeeper {
    ledger: Arc<dyn LedgerClient>,
    identity: Address,
    registry: Registry,
    processed: ProcessedConditions,
    cursor: Option<BlockNumber>,
    poll_interval: Duration,
}

impl SettlementKeeper {
    pub fn new(ledger: Arc<dyn LedgerClient>, identity: Address, registry: Registry, poll_interval: Duration) -> Self {
        Self {
            ledger,
            identity,
            registry,
            processed: ProcessedConditions::new(),
            cursor: None,
            poll_interval,
        }
    }

    pub fn identity(&self) -> Address {
        self.identity
    }

    pub fn cursor(&self) -> Option<BlockNumber> {
        self.cursor
    }

    pub fn processed(&self) -> &ProcessedConditions {
        &self.processed
    }

    /// Position the cursor at the current chain tip. Only events mined
    /// after this point are acted on.
    pub async fn start(&mut self) -> Result<BlockNumber, KeeperError> {
        let tip = self.ledger.block_number().await?;
        self.cursor = Some(tip);
        tracing::info!(
            identity = %self.identity,
            tip,
            escrows = self.registry.escrows().len(),
            verifiers = self.registry.verifier_addresses().len(),
            "settlement keeper started"
        );
        Ok(tip)
    }

    /// Fetch fulfilment events mined since the last poll and act on them.
    pub async fn tick(&mut self) -> Result<TickReport, KeeperError> {
        let cursor = self.cursor.ok_or(KeeperError::NotStarted)?;
        let tip = self.ledger.block_number().await?;
        let mut report = TickReport::default();
        if tip <= cursor {
            return Ok(report);
        }
        let from = cursor + 1;
        report.blocks = Some((from, tip));

        let verifiers = self.registry.verifier_addresses();
        let logs = if verifiers.is_empty() {
            Vec::new()
        } else {
            let filter = LogFilter::new()
                .addresses(verifiers.iter().copied())
                .kind(EventKind::VerifierConditionFulfilled)
                .blocks(from, tip);
            self.ledger.get_logs(filter).await?
        };
        self.cursor = Some(tip);

        for log in logs {
            let ContractEvent::Verifier(VerifierEvent::ConditionFulfilled { condition_id }) = log.event else {
                continue;
            };
            report.events += 1;
            let verifier = log.address;

            if self.processed.contains(verifier, condition_id) {
                report.duplicates += 1;
                continue;
            }

            tracing::info!(
                %verifier,
                condition_id,
                block = log.block_number,
                tx = %log.tx_hash,
                "external condition fulfilled"
            );

            let entries: Vec<EscrowEntry> = self.registry.matching(verifier, condition_id).cloned().collect();
            if entries.is_empty() {
                tracing::warn!(%verifier, condition_id, "no registered escrow for condition");
                report.unmatched += 1;
            }
            for entry in entries {
                let outcome = self.attempt_release(&entry).await;
                report.attempts.push(ReleaseAttempt {
                    escrow: entry.address,
                    verifier,
                    condition_id,
                    outcome,
                });
            }

            self.processed.mark(verifier, condition_id);
        }

        Ok(report)
    }

    async fn attempt_release(&self, entry: &EscrowEntry) -> ReleaseOutcome {
        let escrow = entry.address;
        let snapshot = match self.ledger.escrow(escrow).await {
            Ok(snapshot) => snapshot,
            Err(e) => return failed(escrow, e),
        };

        // The on-chain seller is authoritative.
        let seller = snapshot.seller();
        if seller != entry.seller {
            tracing::warn!(%escrow, registry = %entry.seller, on_chain = %seller, "registry seller differs from escrow");
        }
        if self.identity != seller {
            tracing::warn!(%escrow, %seller, identity = %self.identity, "keeper identity is not the escrow seller");
            return ReleaseOutcome::IdentityMismatch { seller };
        }

        let state = snapshot.state();
        if state != EscrowState::Funded {
            tracing::warn!(%escrow, %state, "escrow not funded, skipping release");
            return ReleaseOutcome::NotFunded { state };
        }

        let tx = Transaction::escrow(self.identity, escrow, EscrowCall::Release);
        match self.ledger.simulate(tx.clone()).await {
            Ok(receipt) => {
                if let Some(reason) = receipt.revert_reason() {
                    tracing::warn!(%escrow, %reason, "release pre-check failed");
                    return ReleaseOutcome::PrecheckFailed { reason: reason.clone() };
                }
            }
            Err(e) => return failed(escrow, e),
        }
        tracing::debug!(%escrow, "release pre-check passed");

        let receipt = match self.ledger.send_transaction(tx).await {
            Ok(receipt) => receipt,
            Err(e) => return failed(escrow, e),
        };
        if let Some(reason) = receipt.revert_reason() {
            tracing::error!(%escrow, tx = %receipt.tx_hash, %reason, "release reverted");
            return ReleaseOutcome::Reverted {
                tx_hash: receipt.tx_hash,
                reason: reason.clone(),
            };
        }

        let amount = receipt.events().find_map(|event| match event {
            ContractEvent::Escrow(EscrowEvent::Released { amount, .. }) => Some(*amount),
            _ => None,
        });
        tracing::info!(
            %escrow,
            tx = %receipt.tx_hash,
            block = receipt.block_number,
            amount_ether = %amount.map(|a| a.format_ether()).unwrap_or_else(|| "?".into()),
            "escrow released"
        );
        ReleaseOutcome::Released {
            tx_hash: receipt.tx_hash,
            amount,
        }
    }

    /// Poll on a fixed interval until `shutdown` resolves. Tick errors are
    /// logged and the next interval retries.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), KeeperError>
    where
        F: Future<Output = ()>,
    {
        if self.cursor.is_none() {
            self.start().await?;
        }

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("settlement keeper stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(report) if !report.is_quiet() => tracing::info!(
                            events = report.events,
                            released = report.released(),
                            duplicates = report.duplicates,
                            unmatched = report.unmatched,
                            "poll complete"
                        ),
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "poll failed, retrying next interval"),
                    }
                }
            }
        }
        Ok(())
    }

    /// Tear down the keeper, discarding the processed-condition set.
    pub fn shutdown(self) {
        tracing::info!(
            processed = self.processed.len(),
            cursor = ?self.cursor,
            "settlement keeper shut down"
        );
    }
}

fn failed(escrow: Address, error: impl std::fmt::Display) -> ReleaseOutcome {
    tracing::error!(%escrow, error = %error, "release attempt failed");
    ReleaseOutcome::Failed {
        error: error.to_string(),
    }
}
