//! In-memory collaborators for core tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use venuebot_foursquare::{VenueLocation, VenueRecord, VenueSource};
use venuebot_shared::namespace::{rdfs, schema};
use venuebot_shared::{
    Credentials, FindResult, Literal, Result, ResultCollection, StoragePayload, VenueBotError,
};
use venuebot_storage::GraphStore;

use crate::lookup::LookupPipeline;
use crate::publish::Publisher;
use crate::scheduler::Scheduler;

pub(crate) fn cafe_record() -> VenueRecord {
    VenueRecord {
        id: "123".into(),
        name: "Cafe".into(),
        location: VenueLocation {
            lat: Some(1.0),
            lng: Some(2.0),
            ..VenueLocation::default()
        },
    }
}

// ---------------------------------------------------------------------------
// FakeStore
// ---------------------------------------------------------------------------

/// Graph store keeping nodes in a map. `execute_query` ignores the query
/// text and answers as the discovery query would.
#[derive(Default)]
pub(crate) struct FakeStore {
    nodes: Mutex<BTreeMap<String, StoragePayload>>,
    updates: Mutex<Vec<StoragePayload>>,
    pub gets: AtomicUsize,
    pub queries: AtomicUsize,
    pub fail_queries: AtomicBool,
    /// Answer finds from existing nodes only, ignoring `create_if_missing`.
    pub refuse_create: AtomicBool,
    next_id: AtomicUsize,
}

impl FakeStore {
    pub fn with_nodes(nodes: impl IntoIterator<Item = StoragePayload>) -> Arc<Self> {
        let store = Self::default();
        {
            let mut map = store.nodes.lock().unwrap();
            for node in nodes {
                map.insert(node.about.clone().unwrap(), node);
            }
        }
        Arc::new(store)
    }

    pub fn node(&self, uri: &str) -> Option<StoragePayload> {
        self.nodes.lock().unwrap().get(uri).cloned()
    }

    pub fn updates(&self) -> Vec<StoragePayload> {
        self.updates.lock().unwrap().clone()
    }
}

fn matches(node: &StoragePayload, template: &StoragePayload) -> bool {
    node.types.is_superset(&template.types)
        && template.properties.iter().all(|(key, values)| {
            values.iter().all(|v| node.property(key).contains(v))
        })
}

fn is_unenriched_venue(node: &StoragePayload) -> bool {
    let prefix = crate::identifier::reference_prefix();
    node.property(rdfs::SEE_ALSO)
        .iter()
        .filter_map(Literal::as_str)
        .any(|v| v.starts_with(&prefix))
        && node.property(schema::NAME).is_empty()
}

#[async_trait]
impl GraphStore for FakeStore {
    async fn get_node(&self, payload: &StoragePayload) -> Result<StoragePayload> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let uri = payload.about.clone().unwrap_or_default();
        self.node(&uri)
            .ok_or_else(|| VenueBotError::no_match(format!("node {uri} does not exist")))
    }

    async fn find_nodes(&self, payload: &StoragePayload) -> Result<ResultCollection> {
        let mut nodes = self.nodes.lock().unwrap();
        let mut results: Vec<StoragePayload> = nodes
            .values()
            .filter(|node| matches(node, payload))
            .cloned()
            .map(|mut node| {
                node.flags.find_result = Some(FindResult::Found);
                node
            })
            .collect();

        if results.is_empty()
            && payload.flags.create_if_missing
            && !self.refuse_create.load(Ordering::SeqCst)
        {
            let uri = format!("urn:fake:{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            let mut node = payload.clone();
            node.about = Some(uri.clone());
            node.flags = Default::default();
            nodes.insert(uri, node.clone());
            node.flags.find_result = Some(FindResult::Created);
            results.push(node);
        }
        Ok(ResultCollection::new(results))
    }

    async fn update_node(&self, payload: &StoragePayload) -> Result<ResultCollection> {
        let uri = payload
            .about
            .clone()
            .ok_or_else(|| VenueBotError::validation("update without uri"))?;
        self.updates.lock().unwrap().push(payload.clone());

        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes
            .entry(uri.clone())
            .or_insert_with(|| StoragePayload::about(uri));
        node.types.extend(payload.types.iter().cloned());
        for (key, values) in &payload.properties {
            node.properties.insert(key.clone(), values.clone());
        }
        for (predicate, targets) in &payload.references {
            for target in targets {
                node.add_reference(predicate.clone(), target.clone());
            }
        }
        Ok(ResultCollection::new(vec![node.clone()]))
    }

    async fn execute_query(&self, _payload: &StoragePayload) -> Result<ResultCollection> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(VenueBotError::QueryFailure("backend offline".into()));
        }
        let nodes = self.nodes.lock().unwrap();
        let rows = nodes
            .values()
            .filter(|node| is_unenriched_venue(node))
            .take(1)
            .map(|node| StoragePayload {
                about: node.about.clone(),
                ..StoragePayload::default()
            })
            .collect();
        Ok(ResultCollection::new(rows))
    }
}

// ---------------------------------------------------------------------------
// FakeSource
// ---------------------------------------------------------------------------

/// Venue source serving canned records.
#[derive(Default)]
pub(crate) struct FakeSource {
    records: BTreeMap<String, VenueRecord>,
    pub fetches: AtomicUsize,
    pub builds: AtomicUsize,
}

impl FakeSource {
    pub fn with_records(records: impl IntoIterator<Item = VenueRecord>) -> Arc<Self> {
        Arc::new(Self {
            records: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
            ..Self::default()
        })
    }
}

#[async_trait]
impl VenueSource for FakeSource {
    async fn fetch_venue(&self, id: &str) -> Result<VenueRecord> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.records
            .get(id)
            .cloned()
            .ok_or_else(|| VenueBotError::Network(format!("HTTP 404 for venue {id}")))
    }

    async fn search(&self, _near: &str, _query: Option<&str>, limit: u32) -> Result<Vec<VenueRecord>> {
        Ok(self.records.values().take(limit as usize).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// RecordingPublisher
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct RecordingPublisher {
    updates: Mutex<Vec<StoragePayload>>,
    creates: Mutex<Vec<StoragePayload>>,
    pub created: Notify,
}

impl RecordingPublisher {
    pub fn updates(&self) -> Vec<StoragePayload> {
        self.updates.lock().unwrap().clone()
    }

    pub fn creates(&self) -> Vec<StoragePayload> {
        self.creates.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish_update(&self, payload: &StoragePayload) -> Result<()> {
        self.updates.lock().unwrap().push(payload.clone());
        Ok(())
    }

    async fn publish_create(&self, payload: &StoragePayload) -> Result<()> {
        self.creates.lock().unwrap().push(payload.clone());
        self.created.notify_one();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub(crate) fn test_credentials() -> Credentials {
    Credentials {
        identifier: "test-id".into(),
        secret: "test-secret".into(),
    }
}

/// A pipeline over fakes. The factory hands out `source` and counts builds.
pub(crate) fn pipeline_with(
    store: &Arc<impl GraphStore + 'static>,
    source: &Arc<FakeSource>,
    configured: bool,
) -> (Arc<LookupPipeline>, Arc<RecordingPublisher>) {
    let publisher = Arc::new(RecordingPublisher::default());
    let factory_source = Arc::clone(source);
    let pipeline = LookupPipeline::new(
        Scheduler::current().unwrap(),
        Arc::clone(store) as Arc<dyn GraphStore>,
        Arc::clone(&publisher) as Arc<dyn Publisher>,
        Box::new(move |_: &Credentials| {
            factory_source.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::clone(&factory_source) as Arc<dyn VenueSource>)
        }),
        "urn:test:bot",
    );
    if configured {
        pipeline.configure(Some(&test_credentials())).unwrap();
    }
    (pipeline, publisher)
}
