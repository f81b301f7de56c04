//! Venue lookup pipeline: resolve → fetch → translate → persist → publish.
//!
//! Each stage is a promise continuation; the first failing stage settles the
//! returned promise with its error and no later stage runs.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};
use venuebot_foursquare::{FoursquareClient, VenueSource};
use venuebot_shared::namespace::prov;
use venuebot_shared::{
    Credentials, FoursquareConfig, Result, ResultCollection, StoragePayload, VenueBotError,
};
use venuebot_storage::GraphStore;

use crate::identifier;
use crate::publish::Publisher;
use crate::scheduler::{Promise, Scheduler};
use crate::translate::translate;

/// Builds a venue source for a set of credentials.
pub type SourceFactory = Box<dyn Fn(&Credentials) -> Result<Arc<dyn VenueSource>> + Send + Sync>;

/// Factory producing [`FoursquareClient`]s for the configured endpoint.
pub fn foursquare_factory(config: FoursquareConfig) -> SourceFactory {
    Box::new(move |credentials: &Credentials| {
        let client = FoursquareClient::new(credentials.clone(), &config)?;
        Ok(Arc::new(client) as Arc<dyn VenueSource>)
    })
}

/// A configured source and the credentials it was built from.
struct ActiveSource {
    credentials: Credentials,
    source: Arc<dyn VenueSource>,
}

/// Enriches graph nodes from the external venue source.
pub struct LookupPipeline {
    scheduler: Scheduler,
    store: Arc<dyn GraphStore>,
    publisher: Arc<dyn Publisher>,
    factory: SourceFactory,
    /// Replaced on configuration events; never held across an await.
    source: RwLock<Option<ActiveSource>>,
    identity: String,
}

impl LookupPipeline {
    /// Create an unconfigured pipeline. `identity` is stamped on every
    /// enriched node as its provenance.
    pub fn new(
        scheduler: Scheduler,
        store: Arc<dyn GraphStore>,
        publisher: Arc<dyn Publisher>,
        factory: SourceFactory,
        identity: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            scheduler,
            store,
            publisher,
            factory,
            source: RwLock::new(None),
            identity: identity.into(),
        })
    }

    /// Apply a configuration event.
    ///
    /// `None` clears the source. Unchanged credentials keep the current
    /// source. Returns whether the source was rebuilt or cleared.
    pub fn configure(&self, credentials: Option<&Credentials>) -> Result<bool> {
        let mut active = self.source.write().unwrap_or_else(PoisonError::into_inner);

        let Some(credentials) = credentials else {
            let had_source = active.take().is_some();
            if had_source {
                warn!("venue source credentials removed; lookups disabled");
            }
            return Ok(had_source);
        };

        if active
            .as_ref()
            .is_some_and(|current| &current.credentials == credentials)
        {
            debug!("venue source credentials unchanged");
            return Ok(false);
        }

        let source = (self.factory)(credentials)?;
        *active = Some(ActiveSource {
            credentials: credentials.clone(),
            source,
        });
        info!(client_id = %credentials.identifier, "venue source configured");
        Ok(true)
    }

    /// Whether a venue source is available.
    pub fn is_configured(&self) -> bool {
        self.source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn current_source(&self) -> Result<Arc<dyn VenueSource>> {
        self.source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|active| Arc::clone(&active.source))
            .ok_or(VenueBotError::SourceUnavailable)
    }

    /// Enrich `node_uri` from the venue source and persist the result.
    ///
    /// With `explicit_reference` the venue comes from that reference URI;
    /// otherwise the node's first venue reference is used. Either way the
    /// record is translated onto the stored node, or onto a bare payload
    /// when the node does not exist yet.
    /// Settles with the storage backend's update result.
    pub fn enrich(
        self: &Arc<Self>,
        node_uri: &str,
        explicit_reference: Option<&str>,
    ) -> Promise<ResultCollection> {
        let node = node_uri.to_string();
        debug!(%node, explicit = ?explicit_reference, "enrichment requested");

        let resolution = match explicit_reference {
            Some(reference) => {
                let venue = identifier::resolve_reference_uri(reference);
                let store = Arc::clone(&self.store);
                let node = node.clone();
                self.scheduler.defer(async move {
                    let base = match store.get_node(&StoragePayload::about(node.as_str())).await {
                        Ok(existing) => existing,
                        Err(VenueBotError::NoMatchingNode { .. }) => StoragePayload::about(node),
                        Err(e) => return Err(e),
                    };
                    Ok((venue, base))
                })
            }
            None => {
                let store = Arc::clone(&self.store);
                let node = node.clone();
                self.scheduler.defer(async move {
                    let existing = store.get_node(&StoragePayload::about(node)).await?;
                    Ok((identifier::find_existing_reference(&existing), existing))
                })
            }
        };

        let this = Arc::clone(self);
        let store = Arc::clone(&self.store);
        let identity = self.identity.clone();

        resolution
            .then(move |(venue, base)| async move {
                let venue = venue.ok_or(VenueBotError::NoVenueIdentifier { node })?;
                let source = this.current_source()?;
                Ok((venue, source, base))
            })
            .then(|(venue, source, base)| async move {
                debug!(%venue, "fetching venue record");
                let record = source.fetch_venue(venue.as_str()).await?;
                Ok((record, base))
            })
            .then(move |(record, base)| async move {
                // Translating onto the stored node keeps its other cross-references.
                let mut payload = translate(&record, base);
                payload.add_reference(prov::WAS_ATTRIBUTED_TO, identity);
                Ok(payload)
            })
            .then(move |payload| async move {
                let result = store.update_node(&payload).await?;
                info!(node = ?payload.about, "venue details stored");
                Ok(result)
            })
    }

    /// Defer [`enrich`](Self::enrich), then publish each stored node as an
    /// update, or as a creation when `created` is set.
    pub fn schedule(
        self: &Arc<Self>,
        node_uri: impl Into<String>,
        explicit_reference: Option<String>,
        created: bool,
    ) -> Promise<ResultCollection> {
        let this = Arc::clone(self);
        let publisher = Arc::clone(&self.publisher);
        let node = node_uri.into();

        self.scheduler
            .defer(async move { this.enrich(&node, explicit_reference.as_deref()).await })
            .then(move |result| async move {
                for payload in &result.results {
                    if created {
                        publisher.publish_create(payload).await?;
                    } else {
                        publisher.publish_update(payload).await?;
                    }
                }
                Ok(result)
            })
    }
}
