//! Background maintenance loop.
//!
//! Once configuration is ready the maintainer repeatedly looks for one node
//! that carries a venue cross-reference but no name yet, and enriches it:
//!
//! ```text
//! Idle(delay) → Discover → Enrich(node) → Reschedule(Short) → Idle(work delay)
//!                    └──────────┴──────→ Reschedule(Long)  → Idle(idle delay)
//! ```
//!
//! Every failure, whether the discovery query came back empty, the backend
//! errored, or enrichment failed, takes the long branch. The loop itself
//! never stops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};
use venuebot_shared::namespace::{rdfs, schema, wgs84};
use venuebot_shared::{Literal, MaintainerConfig, Result, StoragePayload, VenueBotError};
use venuebot_storage::GraphStore;

use crate::identifier;
use crate::lookup::LookupPipeline;
use crate::scheduler::{Promise, Scheduler};

/// Which delay the next cycle waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Work was found; drain the backlog quickly.
    Short,
    /// Nothing to do, or the cycle failed.
    Long,
}

/// Observable state of the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintainerState {
    /// Configuration has not been signalled yet.
    Stopped,
    /// Waiting for the next cycle.
    Idle { delay: Duration },
    /// Running the discovery query.
    Discover,
    /// Enriching a discovered node.
    Enrich { node: String },
    /// A cycle finished; the next one waits for this backoff.
    Reschedule(Backoff),
}

/// Delays between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintainerDelays {
    /// After a cycle that enriched a node.
    pub work: Duration,
    /// After a cycle that found nothing or failed.
    pub idle: Duration,
}

impl MaintainerDelays {
    pub fn after(&self, backoff: Backoff) -> Duration {
        match backoff {
            Backoff::Short => self.work,
            Backoff::Long => self.idle,
        }
    }
}

impl From<&MaintainerConfig> for MaintainerDelays {
    fn from(config: &MaintainerConfig) -> Self {
        Self {
            work: Duration::from_millis(config.work_delay_ms),
            idle: Duration::from_millis(config.idle_delay_ms),
        }
    }
}

/// State carried between the stages of one cycle.
#[derive(Debug, Default)]
struct WorkSession {
    node: Option<String>,
}

/// Query selecting one spatial thing with a venue cross-reference and no name.
///
/// Oldest first. A venue the source keeps failing on stays first in line and
/// holds the rest of the backlog back.
pub fn discovery_query() -> StoragePayload {
    StoragePayload::query(
        "SELECT n.uri AS node
         FROM nodes n
         JOIN node_types t ON t.node_uri = n.uri AND t.type_uri = ?1
         WHERE EXISTS (
             SELECT 1 FROM node_properties s
             WHERE s.node_uri = n.uri AND s.predicate = ?2 AND s.value_text LIKE ?3
         )
         AND NOT EXISTS (
             SELECT 1 FROM node_properties p
             WHERE p.node_uri = n.uri AND p.predicate = ?4
         )
         ORDER BY n.created_at, n.uri
         LIMIT 1",
        vec![
            Literal::from(wgs84::SPATIAL_THING),
            Literal::from(rdfs::SEE_ALSO),
            Literal::from(format!("{}%", identifier::reference_prefix())),
            Literal::from(schema::NAME),
        ],
    )
}

async fn find_work_node(store: &dyn GraphStore) -> Result<String> {
    let rows = store.execute_query(&discovery_query()).await?;
    rows.first()
        .and_then(|row| row.about.clone())
        .ok_or_else(|| VenueBotError::no_match("no node is awaiting venue details"))
}

/// Drives periodic discovery and enrichment.
pub struct Maintainer {
    scheduler: Scheduler,
    store: Arc<dyn GraphStore>,
    pipeline: Arc<LookupPipeline>,
    delays: MaintainerDelays,
    state: watch::Sender<MaintainerState>,
    started: AtomicBool,
}

impl Maintainer {
    pub fn new(
        scheduler: Scheduler,
        store: Arc<dyn GraphStore>,
        pipeline: Arc<LookupPipeline>,
        delays: MaintainerDelays,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(MaintainerState::Stopped);
        Arc::new(Self {
            scheduler,
            store,
            pipeline,
            delays,
            state,
            started: AtomicBool::new(false),
        })
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<MaintainerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> MaintainerState {
        self.state.borrow().clone()
    }

    fn transition(&self, next: MaintainerState) {
        debug!(state = ?next, "maintainer transition");
        self.state.send_replace(next);
    }

    /// Start the loop. Only the first call has an effect; returns whether
    /// this call started it.
    pub fn on_configuration_ready(self: &Arc<Self>) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("maintainer already running");
            return false;
        }
        info!(
            work_delay_ms = self.delays.work.as_millis() as u64,
            idle_delay_ms = self.delays.idle.as_millis() as u64,
            "starting maintainer"
        );
        let this = Arc::clone(self);
        // The loop never settles; nothing awaits it.
        let _ = self.scheduler.defer(this.drive());
        true
    }

    async fn drive(self: Arc<Self>) -> Result<()> {
        let mut delay = self.delays.work;
        loop {
            self.transition(MaintainerState::Idle { delay });
            let this = Arc::clone(&self);
            let backoff = match self
                .scheduler
                .schedule_task(delay, move || this.run_cycle())
                .await
            {
                Ok(backoff) => backoff,
                // Only reachable when the cycle task itself died.
                Err(_) => Backoff::Long,
            };
            self.transition(MaintainerState::Reschedule(backoff));
            delay = self.delays.after(backoff);
        }
    }

    /// Run one Discover → Enrich cycle. Always settles with a backoff.
    pub fn run_cycle(self: &Arc<Self>) -> Promise<Backoff> {
        self.transition(MaintainerState::Discover);

        let store = Arc::clone(&self.store);
        let this = Arc::clone(self);

        self.scheduler
            .resolved(WorkSession::default())
            .then(move |mut session| async move {
                session.node = Some(find_work_node(store.as_ref()).await?);
                Ok(session)
            })
            .then(move |session| async move {
                let node = session
                    .node
                    .ok_or_else(|| VenueBotError::no_match("work session has no node"))?;
                this.transition(MaintainerState::Enrich { node: node.clone() });
                this.pipeline.schedule(node, None, false).await
            })
            .then_or_else(
                |result| async move {
                    let node = result.first().and_then(|n| n.about.as_deref());
                    info!(?node, "node enriched; work remaining");
                    Ok(Backoff::Short)
                },
                |error| async move {
                    match &error {
                        VenueBotError::NoMatchingNode { .. } => info!("no work"),
                        _ => info!(%error, "no work this cycle"),
                    }
                    Ok(Backoff::Long)
                },
            )
    }
}
