//! Remote call budget tracking
//!
//! The remote API reports how many calls remain before it starts throttling.
//! `QuotaGate` owns the last observed value and blocks callers until a batch
//! of calls of known size can be made.

use crate::error::{HarvestError, HarvestResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default wait between capacity probes
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(60);

/// Something that can report the remaining call budget
#[async_trait]
pub trait QuotaProbe: Send + Sync {
    /// Ask the remote how many calls remain
    async fn probe_quota(&self) -> HarvestResult<u32>;
}

/// Last observed remaining-call budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    /// Remaining calls as last reported by the remote
    pub remaining: u32,

    /// Calls below which no further work is started
    pub safety_floor: u32,
}

impl QuotaState {
    /// Create a state from an assumed starting budget
    pub fn new(assumed_remaining: u32, safety_floor: u32) -> Self {
        Self {
            remaining: assumed_remaining,
            safety_floor,
        }
    }

    /// Whether `calls` more calls keep the budget at or above the floor
    pub fn can_spend(&self, calls: u32) -> bool {
        self.remaining >= self.safety_floor.saturating_add(calls)
    }

    /// Whether the budget has dropped below the safety floor
    pub fn below_floor(&self) -> bool {
        self.remaining < self.safety_floor
    }

    /// Record a remaining count reported by a response
    pub fn observe(&mut self, remaining: u32) {
        self.remaining = remaining;
    }

    /// Account for calls whose responses did not report a remaining count
    pub fn spend(&mut self, calls: u32) {
        self.remaining = self.remaining.saturating_sub(calls);
    }

    /// Apply a response's reported quota, falling back to a single decrement
    pub fn record_call(&mut self, reported: Option<u32>) {
        match reported {
            Some(remaining) => self.observe(remaining),
            None => self.spend(1),
        }
    }
}

/// Blocks until the remote budget covers a known number of calls
pub struct QuotaGate {
    probe: Arc<dyn QuotaProbe>,
    state: QuotaState,
    backoff: Duration,
}

impl QuotaGate {
    /// Create a gate with the default backoff
    pub fn new(probe: Arc<dyn QuotaProbe>, state: QuotaState) -> Self {
        Self {
            probe,
            state,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Override the wait between probes
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Current quota state
    pub fn state(&self) -> QuotaState {
        self.state
    }

    /// Mutable access for components that record per-call quota
    pub fn state_mut(&mut self) -> &mut QuotaState {
        &mut self.state
    }

    /// Wait until at least `calls_needed` calls remain, probing the remote
    pub async fn ensure_capacity(
        &mut self,
        calls_needed: u32,
        cancel: &CancellationToken,
    ) -> HarvestResult<()> {
        self.ensure_capacity_from(calls_needed, None, cancel).await
    }

    /// Like `ensure_capacity`, but trusts `initial` for the first check
    ///
    /// Callers that just received a response carrying the remaining count
    /// pass it here to avoid an extra probe call.
    pub async fn ensure_capacity_from(
        &mut self,
        calls_needed: u32,
        initial: Option<u32>,
        cancel: &CancellationToken,
    ) -> HarvestResult<()> {
        let mut snapshot = initial;

        loop {
            if cancel.is_cancelled() {
                return Err(HarvestError::Cancelled);
            }

            let remaining = match snapshot.take() {
                Some(remaining) => remaining,
                None => self.probe_remaining().await,
            };
            self.state.observe(remaining);

            if remaining >= calls_needed {
                debug!("Quota ok: {} remaining, {} needed", remaining, calls_needed);
                return Ok(());
            }

            info!(
                "Quota low: {} remaining, {} needed; waiting {}s",
                remaining,
                calls_needed,
                self.backoff.as_secs()
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(HarvestError::Cancelled),
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }
    }

    /// Probe the remote, treating failures as zero capacity
    async fn probe_remaining(&self) -> u32 {
        match self.probe.probe_quota().await {
            Ok(remaining) => remaining,
            Err(e) => {
                warn!("Quota probe failed, assuming none remaining: {}", e);
                0
            }
        }
    }
}
