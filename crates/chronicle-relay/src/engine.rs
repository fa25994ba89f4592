//! Wiring of the engine components around a host.

use crate::config::Config;
use crate::host::{Broadcaster, EventStore, RemotePool};
use crate::policy::{AcceptancePolicy, Counters, OwnerSet, PolicyChain};
use crate::registry::RootRegistry;
use crate::scheduler::{RefreshScheduler, SchedulerState};
use crate::sync::{Archiver, BackupPropagator, ConversationFetcher, ProfileRefresher};
use crate::tasks::TaskSupervisor;
use crate::trust::{TrustBuilder, TrustHandle, TrustNetwork, trust_channel};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A fully wired engine.
///
/// [`Engine::start`] runs the first refresh cycle; the host should only
/// serve traffic once it returns. Inbound events go through
/// [`Engine::policy_chain`].
pub struct Engine {
    registry: Arc<RootRegistry>,
    trust: TrustHandle,
    counters: Arc<Counters>,
    chain: PolicyChain,
    supervisor: Arc<TaskSupervisor>,
    scheduler: Option<RefreshScheduler>,
    scheduler_task: Option<JoinHandle<()>>,
}

impl Engine {
    /// Build every component. Fails on an unusable config or registry file.
    pub fn build(
        config: &Config,
        store: Arc<dyn EventStore>,
        broadcaster: Arc<dyn Broadcaster>,
        pool: Arc<dyn RemotePool>,
    ) -> Result<Self> {
        config.validate()?;
        let owner_keys = config.owners()?;
        let owners = Arc::new(OwnerSet::new(owner_keys.iter().copied()));

        let registry = Arc::new(RootRegistry::open(config.registry_path())?);
        tracing::info!("Monitoring {} threads", registry.size());

        let (trust_writer, trust) = trust_channel(TrustNetwork::from_owners(&owner_keys));
        let supervisor = Arc::new(TaskSupervisor::new());
        let counters = Arc::new(Counters::new());

        let fetcher = Arc::new(ConversationFetcher::new(
            Arc::clone(&pool),
            Arc::clone(&store),
            config.fetch_config(),
        ));
        let backup = Arc::new(BackupPropagator::new(
            Arc::clone(&pool),
            config.backup_relays.clone(),
            Arc::clone(&supervisor),
        ));

        let profiles = Arc::new(ProfileRefresher::new(
            Arc::clone(&pool),
            Arc::clone(&store),
            config.profile_config(),
        ));

        let policy = Arc::new(
            AcceptancePolicy::new(
                Arc::clone(&owners),
                trust.clone(),
                Arc::clone(&registry),
                store,
                broadcaster,
            )
            .with_backfill(fetcher, Arc::clone(&supervisor))
            .with_backup(backup)
            .with_counters(Arc::clone(&counters)),
        );

        let archiver = Arc::new(Archiver::new(
            Arc::clone(&pool),
            Arc::clone(&policy),
            owner_keys,
            config.seed_relays.clone(),
        ));
        let scheduler = RefreshScheduler::new(
            owners,
            TrustBuilder::new(pool, config.trust_config()),
            trust_writer,
            config.scheduler_config(),
        )
        .with_archiver(archiver)
        .with_profiles(profiles)
        .with_registry(Arc::clone(&registry));

        let chain = PolicyChain::with_defaults().with_event_rule(policy);

        Ok(Self {
            registry,
            trust,
            counters,
            chain,
            supervisor,
            scheduler: Some(scheduler),
            scheduler_task: None,
        })
    }

    /// Start the refresh scheduler and wait for its first cycle.
    pub async fn start(&mut self) -> Result<()> {
        let Some(scheduler) = self.scheduler.take() else {
            return Err(Error::Config("engine already started".into()));
        };

        let mut state = scheduler.state();
        let task = tokio::spawn(scheduler.run(self.supervisor.shutdown_signal()));
        self.scheduler_task = Some(task);

        state
            .wait_for(|s| *s == SchedulerState::Steady)
            .await
            .map_err(|_| Error::Config("scheduler stopped before it was ready".into()))?;
        Ok(())
    }

    /// Reject chains to install into the host.
    pub fn policy_chain(&self) -> &PolicyChain {
        &self.chain
    }

    pub fn registry(&self) -> &Arc<RootRegistry> {
        &self.registry
    }

    pub fn trust(&self) -> &TrustHandle {
        &self.trust
    }

    pub fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }

    /// Cancel background work and write the registry out.
    pub async fn shutdown(mut self) -> Result<()> {
        self.supervisor.shutdown();
        if let Some(task) = self.scheduler_task.take()
            && let Err(e) = task.await
        {
            tracing::warn!("Scheduler task ended abnormally: {}", e);
        }
        self.registry.persist()?;
        tracing::info!(
            "Engine stopped: {} accepted, {} rejected, {} threads",
            self.counters.accepted(),
            self.counters.rejected(),
            self.registry.size()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::testing::{MockPool, contact_list, note, reply};
    use nostr_sdk::Keys;
    use tempfile::TempDir;

    fn config(tmp: &TempDir, owner: &Keys) -> Config {
        Config {
            owner_pubkeys: vec![owner.public_key().to_hex()],
            db_path: tmp.path().join("db"),
            min_followers: 1,
            fetch_sync: true,
            backup_relays: vec!["wss://backup.example.com".to_string()],
            seed_relays: vec!["wss://seed.example.com".to_string()],
            trust_hops: 1,
            archive_window_minutes: Some(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_engine_lifecycle() {
        let tmp = TempDir::new().unwrap();
        let owner = Keys::generate();
        let friend = Keys::generate();
        let pool = MockPool::new();
        pool.script(contact_list(&owner, &[friend.public_key()], 100));
        let history = note(&owner, "archived root");
        pool.script(history.clone());
        let host = Arc::new(MemoryHost::new());

        let mut engine = Engine::build(
            &config(&tmp, &owner),
            Arc::clone(&host) as Arc<dyn EventStore>,
            Arc::clone(&host) as Arc<dyn Broadcaster>,
            Arc::clone(&pool) as Arc<dyn RemotePool>,
        )
        .unwrap();
        engine.start().await.unwrap();

        // First cycle rebuilt trust and archived owner history
        assert!(engine.trust().contains(&friend.public_key()));
        assert!(host.contains(&history.id).await.unwrap());
        assert!(engine.registry().includes(&history.id));

        let answer = reply(&friend, history.id, "trusted answer");
        assert!(engine.policy_chain().reject_event(&answer).await.is_none());
        let spam = reply(&Keys::generate(), history.id, "spam");
        assert!(engine.policy_chain().reject_event(&spam).await.is_some());
        assert_eq!(engine.counters().rejected(), 1);

        let registry_path = engine.registry().path().to_path_buf();
        engine.shutdown().await.unwrap();

        let reloaded = RootRegistry::open(registry_path).unwrap();
        assert!(reloaded.includes(&history.id));
    }

    #[tokio::test]
    async fn test_start_twice_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let owner = Keys::generate();
        let pool = MockPool::new();
        pool.script(contact_list(&owner, &[], 100));
        let host = Arc::new(MemoryHost::new());

        let mut engine = Engine::build(
            &config(&tmp, &owner),
            Arc::clone(&host) as Arc<dyn EventStore>,
            host as Arc<dyn Broadcaster>,
            pool as Arc<dyn RemotePool>,
        )
        .unwrap();
        engine.start().await.unwrap();
        assert!(engine.start().await.is_err());
        engine.shutdown().await.unwrap();
    }
}
