//! Request dispatch for venue knowledge.
//!
//! A [`KnowledgeProvider`] claims requests whose form declares every type in
//! its [`CapabilityDeclaration`] and references a venue. It find-or-creates
//! the matching node, answers with the results and enriches freshly created
//! nodes in the background.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};
use venuebot_shared::namespace::wgs84;
use venuebot_shared::{MessageKind, Request, Response, StoragePayload};
use venuebot_storage::GraphStore;

use crate::identifier;
use crate::lookup::LookupPipeline;
use crate::publish::Publisher;
use crate::scheduler::{Promise, Scheduler};

/// Types a request must carry before a provider handles it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDeclaration(BTreeSet<String>);

impl CapabilityDeclaration {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(types.into_iter().map(Into::into).collect())
    }

    /// The declaration of the venue provider.
    pub fn spatial_things() -> Self {
        Self::new([wgs84::SPATIAL_THING])
    }

    /// Whether `declared` includes every required type. Extra types are fine.
    pub fn is_satisfied_by(&self, declared: &BTreeSet<String>) -> bool {
        self.0.intersection(declared).count() == self.0.len()
    }
}

/// Answers venue requests from the graph.
pub struct KnowledgeProvider {
    required: CapabilityDeclaration,
    scheduler: Scheduler,
    store: Arc<dyn GraphStore>,
    pipeline: Arc<LookupPipeline>,
    publisher: Arc<dyn Publisher>,
}

impl KnowledgeProvider {
    pub fn new(
        required: CapabilityDeclaration,
        scheduler: Scheduler,
        store: Arc<dyn GraphStore>,
        pipeline: Arc<LookupPipeline>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            required,
            scheduler,
            store,
            pipeline,
            publisher,
        }
    }

    /// Claim `request` if it is a venue request.
    ///
    /// Returns `None` when the request is not for this provider. Otherwise
    /// the promise settles with the search response, or with `None` when the
    /// lookup produced no results. Enrichment of created nodes is not part of
    /// the promise.
    pub fn handle_request(&self, request: &Request) -> Option<Promise<Option<Response>>> {
        if !self.required.is_satisfied_by(&request.form.types) {
            debug!(request = ?request.id, "request types not covered");
            return None;
        }
        let venue = identifier::venue_of_request(&request.form)?;
        debug!(request = ?request.id, %venue, "claiming venue request");

        let mut template: StoragePayload = request.form.clone();
        template.flags.create_if_missing = true;

        let store = Arc::clone(&self.store);
        let pipeline = Arc::clone(&self.pipeline);
        let publisher = Arc::clone(&self.publisher);
        let request_id = request.id.clone();

        let promise = self
            .scheduler
            .defer(async move { store.find_nodes(&template).await })
            .then(move |results| async move {
                for created in results.created() {
                    let Some(node) = created.about.clone() else {
                        warn!("created node has no uri");
                        continue;
                    };
                    info!(%node, "node created; scheduling enrichment");
                    let _ = pipeline.schedule(node.clone(), None, true).then_or_else(
                        |_| async { Ok(()) },
                        move |error| async move {
                            warn!(%node, %error, "enrichment of created node failed");
                            Ok(())
                        },
                    );
                }

                if results.is_empty() {
                    return Ok(None);
                }
                Ok(Some(publisher.create_response(
                    MessageKind::SearchResponse,
                    results,
                    request_id,
                )))
            });
        Some(promise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeSource, FakeStore, RecordingPublisher, cafe_record, pipeline_with};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use venuebot_shared::{FindResult, Literal};
    use venuebot_shared::namespace::{rdfs, schema};

    const EXTRA: &str = "http://example.org/Extra";

    fn provider_over(
        store: &Arc<FakeStore>,
        source: &Arc<FakeSource>,
    ) -> (KnowledgeProvider, Arc<RecordingPublisher>) {
        let (pipeline, publisher) = pipeline_with(store, source, true);
        let provider = KnowledgeProvider::new(
            CapabilityDeclaration::spatial_things(),
            Scheduler::current().unwrap(),
            Arc::clone(store) as Arc<dyn GraphStore>,
            pipeline,
            Arc::clone(&publisher) as Arc<dyn Publisher>,
        );
        (provider, publisher)
    }

    fn venue_request(types: &[&str]) -> Request {
        let mut form = StoragePayload::new();
        for t in types {
            form.add_type(*t);
        }
        form.add_property(rdfs::SEE_ALSO, "foursquare://venues/123");
        Request {
            id: Some("req-1".into()),
            form,
        }
    }

    #[test]
    fn capability_match_is_a_subset_test() {
        let required = CapabilityDeclaration::spatial_things();
        let declared = |types: &[&str]| -> BTreeSet<String> {
            types.iter().map(|t| t.to_string()).collect()
        };

        assert!(required.is_satisfied_by(&declared(&[wgs84::SPATIAL_THING])));
        assert!(required.is_satisfied_by(&declared(&[wgs84::SPATIAL_THING, EXTRA])));
        assert!(!required.is_satisfied_by(&declared(&[])));
        assert!(!required.is_satisfied_by(&declared(&[EXTRA])));

        let pair = CapabilityDeclaration::new([wgs84::SPATIAL_THING, EXTRA]);
        assert!(!pair.is_satisfied_by(&declared(&[wgs84::SPATIAL_THING])));
    }

    #[tokio::test]
    async fn superset_request_is_handled_and_empty_is_not() {
        let store = Arc::new(FakeStore::default());
        let source = FakeSource::with_records([cafe_record()]);
        let (provider, _) = provider_over(&store, &source);

        assert!(provider
            .handle_request(&venue_request(&[wgs84::SPATIAL_THING, EXTRA]))
            .is_some());
        assert!(provider.handle_request(&venue_request(&[])).is_none());
    }

    #[tokio::test]
    async fn request_without_venue_reference_is_not_handled() {
        let store = Arc::new(FakeStore::default());
        let source = FakeSource::with_records([cafe_record()]);
        let (provider, _) = provider_over(&store, &source);

        let mut request = venue_request(&[wgs84::SPATIAL_THING]);
        request.form.properties.clear();
        request
            .form
            .add_property(rdfs::SEE_ALSO, "http://dbpedia.org/resource/Cafe");
        assert!(provider.handle_request(&request).is_none());
    }

    #[tokio::test]
    async fn created_node_is_enriched_after_response() {
        let store = Arc::new(FakeStore::default());
        let source = FakeSource::with_records([cafe_record()]);
        let (provider, publisher) = provider_over(&store, &source);

        let response = provider
            .handle_request(&venue_request(&[wgs84::SPATIAL_THING]))
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.kind, MessageKind::SearchResponse);
        assert_eq!(response.request_id.as_deref(), Some("req-1"));
        assert_eq!(response.payload.len(), 1);
        let created = response.payload.first().unwrap();
        assert_eq!(created.flags.find_result, Some(FindResult::Created));
        let uri = created.about.clone().unwrap();

        tokio::time::timeout(Duration::from_secs(5), publisher.created.notified())
            .await
            .unwrap();
        let creates = publisher.creates();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].about.as_deref(), Some(uri.as_str()));
        assert_eq!(creates[0].property(schema::NAME), &[Literal::from("Cafe")]);
        assert!(publisher.updates().is_empty());
    }

    #[tokio::test]
    async fn empty_lookup_settles_without_response() {
        let store = Arc::new(FakeStore::default());
        store.refuse_create.store(true, Ordering::SeqCst);
        let source = FakeSource::with_records([cafe_record()]);
        let (provider, publisher) = provider_over(&store, &source);

        let outcome = provider
            .handle_request(&venue_request(&[wgs84::SPATIAL_THING]))
            .unwrap()
            .await
            .unwrap();
        assert!(outcome.is_none());

        tokio::task::yield_now().await;
        assert!(publisher.creates().is_empty());
        assert!(publisher.updates().is_empty());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_creation_enrichment_keeps_response() {
        let store = Arc::new(FakeStore::default());
        let source = Arc::new(FakeSource::default());
        let (provider, publisher) = provider_over(&store, &source);

        let response = provider
            .handle_request(&venue_request(&[wgs84::SPATIAL_THING]))
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.payload.len(), 1);

        tokio::time::timeout(Duration::from_secs(5), async {
            while source.fetches.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        tokio::task::yield_now().await;
        assert!(publisher.creates().is_empty());
        assert!(store.updates().is_empty());
    }

    #[tokio::test]
    async fn existing_node_is_not_re_enriched() {
        let store = Arc::new(FakeStore::default());
        let source = FakeSource::with_records([cafe_record()]);
        let (provider, publisher) = provider_over(&store, &source);
        let request = venue_request(&[wgs84::SPATIAL_THING]);

        provider.handle_request(&request).unwrap().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), publisher.created.notified())
            .await
            .unwrap();

        let second = provider
            .handle_request(&request)
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            second.payload.first().unwrap().flags.find_result,
            Some(FindResult::Found)
        );

        tokio::task::yield_now().await;
        assert_eq!(publisher.creates().len(), 1);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }
}
