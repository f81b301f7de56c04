//! Graph-side venue search: popular venues and adopting search hits.

use std::sync::Arc;

use tracing::{info, instrument};
use venuebot_shared::namespace::{event, query, rdfs, schema, wgs84};
use venuebot_shared::{Literal, Result, StoragePayload, VenueBotError};
use venuebot_storage::GraphStore;

use crate::identifier::{self, VenueId};
use crate::lookup::LookupPipeline;

/// A venue node ranked by how many events take place there.
#[derive(Debug, Clone, PartialEq)]
pub struct PopularVenue {
    pub node: String,
    pub name: Option<String>,
    /// Number of incoming event `place` references.
    pub degree: i64,
}

/// Query for the `limit` venue nodes with the most events.
pub fn popular_venues_query(limit: u32) -> StoragePayload {
    let mut payload = StoragePayload::query(
        "SELECT n.uri AS node,
                COUNT(r.node_uri) AS rels,
                (SELECT p.value_text FROM node_properties p
                 WHERE p.node_uri = n.uri AND p.predicate = ?3
                 ORDER BY p.position LIMIT 1) AS name
         FROM nodes n
         JOIN node_types t ON t.node_uri = n.uri AND t.type_uri = ?1
         JOIN node_references r ON r.target_uri = n.uri AND r.predicate = ?4
         WHERE EXISTS (
             SELECT 1 FROM node_properties s
             WHERE s.node_uri = n.uri AND s.predicate = ?2 AND s.value_text LIKE ?5
         )
         GROUP BY n.uri
         ORDER BY rels DESC, n.uri
         LIMIT ?6",
        vec![
            Literal::from(wgs84::SPATIAL_THING),
            Literal::from(rdfs::SEE_ALSO),
            Literal::from(schema::NAME),
            Literal::from(event::PLACE),
            Literal::from(format!("{}%", identifier::reference_prefix())),
            Literal::from(i64::from(limit)),
        ],
    );
    let key = &mut payload.flags.translation_key;
    key.insert("name".into(), schema::NAME.into());
    key.insert("rels".into(), query::DEGREE.into());
    payload
}

/// Venue nodes ordered by event count, most popular first.
#[instrument(skip_all, fields(limit = limit))]
pub async fn popular_venues(store: &dyn GraphStore, limit: u32) -> Result<Vec<PopularVenue>> {
    let rows = store.execute_query(&popular_venues_query(limit)).await?;
    let venues = rows
        .results
        .into_iter()
        .filter_map(|row| {
            let node = row.about?;
            let name = row
                .flags
                .columns
                .get(schema::NAME)
                .and_then(Literal::as_str)
                .map(String::from);
            let degree = match row.flags.columns.get(query::DEGREE) {
                Some(Literal::Integer(n)) => *n,
                _ => 0,
            };
            Some(PopularVenue { node, name, degree })
        })
        .collect();
    Ok(venues)
}

/// Find-or-create the node for `venue` and, if it is new, enrich it.
///
/// Returns the node as stored. A freshly created node is published as a
/// creation once its details are stored.
#[instrument(skip_all, fields(%venue))]
pub async fn adopt_venue(
    store: &dyn GraphStore,
    pipeline: &Arc<LookupPipeline>,
    venue: &VenueId,
) -> Result<StoragePayload> {
    let reference = venue.reference_uri();
    let mut template = StoragePayload::new();
    template.add_type(wgs84::SPATIAL_THING);
    template.add_property(rdfs::SEE_ALSO, reference.as_str());
    template.flags.create_if_missing = true;

    let found = store.find_nodes(&template).await?;
    let node = found
        .first()
        .cloned()
        .ok_or_else(|| VenueBotError::no_match(format!("no node for venue {venue}")))?;

    if !node.was_created() {
        info!(node = ?node.about, "venue already known");
        return Ok(node);
    }

    let uri = node
        .about
        .clone()
        .ok_or_else(|| VenueBotError::validation("created node has no uri"))?;
    let enriched = pipeline.schedule(uri, Some(reference), true).await?;
    enriched
        .first()
        .cloned()
        .ok_or_else(|| VenueBotError::no_match(format!("enriched node for venue {venue}")))
}
