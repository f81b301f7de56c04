//! Venue cross-reference parsing.
//!
//! Nodes link to the venue source through `rdfs:seeAlso` values of the form
//! `foursquare://venues/<id>`. Anything else resolves to no venue.

use url::Url;
use venuebot_shared::namespace::{FOURSQUARE_SCHEME, rdfs, wgs84};
use venuebot_shared::{Literal, StoragePayload};

/// Host component of a venue reference.
const VENUES_HOST: &str = "venues";

/// Identifier of a venue in the external source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VenueId(String);

impl VenueId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The canonical cross-reference URI of this venue.
    pub fn reference_uri(&self) -> String {
        format!("{}{}", reference_prefix(), self.0)
    }
}

/// Common prefix of every venue cross-reference URI.
pub fn reference_prefix() -> String {
    format!("{FOURSQUARE_SCHEME}://{VENUES_HOST}/")
}

impl std::fmt::Display for VenueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve `foursquare://venues/<id>` to its venue id.
///
/// Returns `None` for any other scheme, host, or path shape, including
/// strings that do not parse as URIs.
pub fn resolve_reference_uri(uri: &str) -> Option<VenueId> {
    let url = Url::parse(uri).ok()?;
    if url.scheme() != FOURSQUARE_SCHEME || url.host_str() != Some(VENUES_HOST) {
        return None;
    }
    if url.query().is_some() || url.fragment().is_some() {
        return None;
    }

    let mut segments = url.path_segments()?;
    match (segments.next(), segments.next()) {
        (Some(id), None) if !id.is_empty() => Some(VenueId::new(id)),
        _ => None,
    }
}

/// First `rdfs:seeAlso` value of `node` that resolves to a venue, in stored order.
pub fn find_existing_reference(node: &StoragePayload) -> Option<VenueId> {
    node.property(rdfs::SEE_ALSO)
        .iter()
        .filter_map(Literal::as_str)
        .find_map(resolve_reference_uri)
}

/// Venue referenced by a request form: only spatial things qualify.
pub fn venue_of_request(form: &StoragePayload) -> Option<VenueId> {
    if !form.has_type(wgs84::SPATIAL_THING) {
        return None;
    }
    find_existing_reference(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_canonical_reference() {
        assert_eq!(
            resolve_reference_uri("foursquare://venues/4be0b4f0652b0f475f607311"),
            Some(VenueId::new("4be0b4f0652b0f475f607311"))
        );
    }

    #[test]
    fn rejects_other_shapes() {
        for uri in [
            "",
            "not a uri",
            "foursquare:venues/1",
            "foursquare://venues/",
            "foursquare://venues",
            "foursquare://venues/1/2",
            "foursquare://users/1",
            "http://venues/1",
            "https://foursquare.com/v/1",
            "foursquare://venues/1?x=y",
            "foursquare://venues//1",
        ] {
            assert_eq!(resolve_reference_uri(uri), None, "{uri}");
        }
    }

    #[test]
    fn reference_uri_round_trips() {
        let id = VenueId::new("abc123");
        assert_eq!(id.reference_uri(), "foursquare://venues/abc123");
        assert_eq!(resolve_reference_uri(&id.reference_uri()), Some(id));
    }

    #[test]
    fn scans_references_in_stored_order() {
        let mut node = StoragePayload::new();
        node.add_property(rdfs::SEE_ALSO, "http://dbpedia.org/resource/Cafe");
        node.add_property(rdfs::SEE_ALSO, 7_i64);
        node.add_property(rdfs::SEE_ALSO, "foursquare://venues/first");
        node.add_property(rdfs::SEE_ALSO, "foursquare://venues/second");
        assert_eq!(find_existing_reference(&node), Some(VenueId::new("first")));
    }

    #[test]
    fn no_references_means_no_venue() {
        assert_eq!(find_existing_reference(&StoragePayload::new()), None);
    }

    #[test]
    fn request_must_be_spatial_thing() {
        let mut form = StoragePayload::new();
        form.add_property(rdfs::SEE_ALSO, "foursquare://venues/1");
        assert_eq!(venue_of_request(&form), None);

        form.add_type(wgs84::SPATIAL_THING);
        assert_eq!(venue_of_request(&form), Some(VenueId::new("1")));
    }
}
