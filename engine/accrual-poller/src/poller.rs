//! Reconciliation poller
//!
//! Every cycle walks the unresolved orders, asks the accrual authority about
//! each one and hands decided verdicts to the ledger. Lookups run through a
//! bounded pool paced by a shared [`RequestLimiter`]. A 429 stops the cycle
//! from admitting further lookups; lookups already in flight finish and
//! commit normally, then the run loop cools down before the next cycle.

use crate::client::AccrualSource;
use crate::config::PollerConfig;
use crate::error::{AccrualError, PollerError};
use crate::limiter::RequestLimiter;
use ledger_store::{LedgerStore, Order, ResolutionOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// What one poll cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Lookups sent to the authority
    pub dispatched: usize,
    /// Resolutions written to the ledger
    pub applied: usize,
    /// Verdicts that did not move the order
    pub unchanged: usize,
    /// Orders the authority has not decided on yet
    pub pending: usize,
    /// Lookups or ledger writes that failed
    pub failed: usize,
    /// Orders left for a later cycle because of a rate limit, including the
    /// lookup that was refused
    pub abandoned: usize,
    pub throttled: bool,
}

impl CycleReport {
    fn record(&mut self, outcome: &Reconciled) {
        match outcome {
            Reconciled::Applied => self.applied += 1,
            Reconciled::Unchanged => self.unchanged += 1,
            Reconciled::Pending => self.pending += 1,
            Reconciled::Failed => self.failed += 1,
            Reconciled::RateLimited => self.abandoned += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconciled {
    Applied,
    Unchanged,
    Pending,
    Failed,
    RateLimited,
}

/// Drives unresolved orders to a terminal status
pub struct AccrualPoller {
    ledger: Arc<dyn LedgerStore>,
    source: Arc<dyn AccrualSource>,
    limiter: Arc<RequestLimiter>,
    config: PollerConfig,
}

impl AccrualPoller {
    /// Create a new poller
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        source: Arc<dyn AccrualSource>,
        config: PollerConfig,
    ) -> Self {
        let limiter = Arc::new(RequestLimiter::new(config.request_spacing(), config.burst));
        Self { ledger, source, limiter, config }
    }

    /// Run one poll cycle over every unresolved order
    pub async fn run_cycle(&self) -> Result<CycleReport, PollerError> {
        let orders = self.ledger.list_unresolved_orders().await?;
        let total = orders.len();

        let permits = Arc::new(Semaphore::new(self.config.max_in_flight));
        let throttled = Arc::new(AtomicBool::new(false));
        let mut lookups = JoinSet::new();
        let mut report = CycleReport::default();

        for order in orders {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            if throttled.load(Ordering::SeqCst) {
                break;
            }

            self.limiter.acquire().await;
            if throttled.load(Ordering::SeqCst) {
                break;
            }

            report.dispatched += 1;
            let ledger = self.ledger.clone();
            let source = self.source.clone();
            let throttled = throttled.clone();

            lookups.spawn(async move {
                let outcome = reconcile(ledger.as_ref(), source.as_ref(), &order).await;
                if outcome == Reconciled::RateLimited {
                    throttled.store(true, Ordering::SeqCst);
                }
                drop(permit);
                outcome
            });
        }

        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    error!("Lookup task failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        report.abandoned += total - report.dispatched;
        report.throttled = throttled.load(Ordering::SeqCst);
        Ok(report)
    }

    /// Poll until `shutdown` flips to true. A running cycle is always allowed
    /// to finish; the wait between cycles and the cooldown are not.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Accrual poller started (interval={:?}, max_in_flight={})",
            self.config.poll_interval(),
            self.config.max_in_flight
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    // a dropped sender counts as shutdown
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            match self.run_cycle().await {
                Ok(report) if report.throttled => {
                    warn!(
                        applied = report.applied,
                        abandoned = report.abandoned,
                        "Accrual authority rate limited the cycle, cooling down for {:?}",
                        self.config.rate_limit_cooldown()
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(self.config.rate_limit_cooldown()) => {}
                        _ = shutdown.changed() => {}
                    }
                    // next cycle starts as soon as the cooldown is over
                    ticker.reset_immediately();
                }
                Ok(report) if report.dispatched > 0 => {
                    info!(
                        dispatched = report.dispatched,
                        applied = report.applied,
                        unchanged = report.unchanged,
                        pending = report.pending,
                        failed = report.failed,
                        "Poll cycle complete"
                    );
                }
                Ok(_) => debug!("No unresolved orders"),
                Err(e) => error!("Poll cycle failed: {}", e),
            }
        }

        info!("Accrual poller stopped");
    }
}

async fn reconcile(ledger: &dyn LedgerStore, source: &dyn AccrualSource, order: &Order) -> Reconciled {
    match reconcile_order(ledger, source, order).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_rate_limited() => {
            debug!(order = %order.number, "Lookup refused with 429");
            Reconciled::RateLimited
        }
        Err(e) => {
            let timeout = matches!(&e, PollerError::Accrual(a) if a.is_timeout());
            warn!(order = %order.number, timeout, "Failed to reconcile order: {}", e);
            Reconciled::Failed
        }
    }
}

async fn reconcile_order(
    ledger: &dyn LedgerStore,
    source: &dyn AccrualSource,
    order: &Order,
) -> Result<Reconciled, PollerError> {
    let Some(response) = source.lookup(&order.number).await? else {
        return Ok(Reconciled::Pending);
    };

    if response.order != order.number {
        return Err(AccrualError::OrderMismatch {
            requested: order.number.clone(),
            received: response.order,
        }
        .into());
    }

    let Some(resolution) = response.resolution()? else {
        return Ok(Reconciled::Pending);
    };

    if resolution.status() == order.status {
        return Ok(Reconciled::Unchanged);
    }

    match ledger.apply_resolution(&order.number, resolution).await? {
        ResolutionOutcome::Applied => {
            info!(order = %order.number, login = %order.login, "Order moved to {}", resolution.status());
            Ok(Reconciled::Applied)
        }
        ResolutionOutcome::NoOp | ResolutionOutcome::NotFound => Ok(Reconciled::Unchanged),
    }
}
