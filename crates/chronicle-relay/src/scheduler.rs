//! Periodic profile refresh, trust rebuild and archival driver.
//!
//! The scheduler owns the only [`TrustWriter`]. It starts in
//! [`SchedulerState::Initializing`], runs one full cycle (profile load, trust
//! rebuild, then an archival pass when enabled), switches to
//! [`SchedulerState::Steady`] and from then on runs one cycle per tick until
//! shutdown. Steady cycles archive first, then refresh profiles and rebuild
//! trust. The host waits for `Steady` before it starts serving.
//!
//! Failures inside a cycle are logged; the loop keeps going.

use crate::policy::OwnerSet;
use crate::registry::RootRegistry;
use crate::sync::{Archiver, ProfileRefresher};
use crate::trust::{TrustBuilder, TrustWriter};
use metrics::counter;
use nostr_sdk::PublicKey;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Lifecycle of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// First cycle not finished yet.
    Initializing,
    /// First cycle done, running on the timer.
    Steady,
}

/// Configuration for the refresh loop.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between cycles.
    pub interval: Duration,

    /// Run an archival pass each cycle.
    pub archive_enabled: bool,

    /// Time budget for one archival pass.
    pub archive_budget: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 3600),
            archive_enabled: false,
            archive_budget: Duration::from_secs(24 * 60),
        }
    }
}

/// Drives trust rebuilds and archival passes.
pub struct RefreshScheduler {
    owners: Arc<OwnerSet>,
    builder: TrustBuilder,
    writer: TrustWriter,
    archiver: Option<Arc<Archiver>>,
    profiles: Option<Arc<ProfileRefresher>>,
    registry: Option<Arc<RootRegistry>>,
    config: SchedulerConfig,
    state_tx: watch::Sender<SchedulerState>,
}

impl RefreshScheduler {
    pub fn new(
        owners: Arc<OwnerSet>,
        builder: TrustBuilder,
        writer: TrustWriter,
        config: SchedulerConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Initializing);
        Self {
            owners,
            builder,
            writer,
            archiver: None,
            profiles: None,
            registry: None,
            config,
            state_tx,
        }
    }

    /// Archive owner history each cycle when archival is enabled.
    pub fn with_archiver(mut self, archiver: Arc<Archiver>) -> Self {
        self.archiver = Some(archiver);
        self
    }

    /// Refresh trust network profiles before every trust rebuild.
    pub fn with_profiles(mut self, profiles: Arc<ProfileRefresher>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    /// Compact the registry file at the end of each cycle.
    pub fn with_registry(mut self, registry: Arc<RootRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Watch the scheduler's state.
    pub fn state(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    /// Run until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }
        tracing::info!(
            "Refresh scheduler starting: interval {:?}, archival {}",
            self.config.interval,
            if self.config.archive_enabled { "on" } else { "off" }
        );

        tokio::select! {
            _ = self.cycle() => {}
            _ = shutdown.changed() => return,
        }
        self.state_tx.send_replace(SchedulerState::Steady);
        tracing::info!("Initial refresh complete, scheduler steady");

        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.interval,
            self.config.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            tokio::select! {
                _ = self.cycle() => {}
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("Refresh scheduler stopped");
    }

    async fn cycle(&self) {
        let started = Instant::now();
        let initializing = *self.state_tx.borrow() == SchedulerState::Initializing;

        // Archival reads the trust network, so the first cycle builds it first
        if initializing {
            self.refresh_profiles().await;
            self.refresh_trust().await;
            self.archive().await;
        } else {
            self.archive().await;
            self.refresh_profiles().await;
            self.refresh_trust().await;
        }

        if let Some(registry) = &self.registry
            && let Err(e) = registry.persist()
        {
            tracing::error!("Failed to compact root registry: {}", e);
        }

        counter!("scheduler_cycles_total").increment(1);
        tracing::debug!("Refresh cycle took {:.1}s", started.elapsed().as_secs_f64());
    }

    async fn refresh_profiles(&self) {
        let Some(profiles) = &self.profiles else {
            return;
        };
        let members: Vec<PublicKey> = self
            .writer
            .handle()
            .snapshot()
            .members()
            .copied()
            .collect();
        profiles.refresh(&members).await;
    }

    async fn refresh_trust(&self) {
        match self.builder.rebuild(&self.owners.to_vec()).await {
            Ok(network) => {
                let size = network.len();
                let previous = self.writer.install(network);
                tracing::info!("Trust network: {} -> {} members", previous.len(), size);
            }
            Err(e) => {
                tracing::error!("Trust rebuild failed, keeping previous network: {}", e);
            }
        }
    }

    async fn archive(&self) {
        if !self.config.archive_enabled {
            return;
        }
        if let Some(archiver) = &self.archiver {
            archiver.run(self.config.archive_budget).await;
        }
    }
}
