//! Vocabulary URIs shared by the graph, the translator, and the queries.

/// W3C WGS84 geo vocabulary.
pub mod wgs84 {
    pub const SPATIAL_THING: &str = "http://www.w3.org/2003/01/geo/wgs84_pos#SpatialThing";
    pub const LAT: &str = "http://www.w3.org/2003/01/geo/wgs84_pos#lat";
    pub const LONG: &str = "http://www.w3.org/2003/01/geo/wgs84_pos#long";
}

/// schema.org.
pub mod schema {
    pub const NAME: &str = "http://schema.org/name";
}

/// RDF Schema.
pub mod rdfs {
    pub const SEE_ALSO: &str = "http://www.w3.org/2000/01/rdf-schema#seeAlso";
}

/// Event ontology.
pub mod event {
    pub const PLACE: &str = "http://purl.org/NET/c4dm/event.owl#place";
}

/// W3C provenance.
pub mod prov {
    pub const WAS_ATTRIBUTED_TO: &str = "http://www.w3.org/ns/prov#wasAttributedTo";
}

/// Result keys produced by graph queries.
pub mod query {
    /// Payload property carrying the query text.
    pub const TEXT: &str = "urn:venuebot:storage#query";
    /// Number of incoming relationships of a result node.
    pub const DEGREE: &str = "http://degree";
}

/// Scheme prefix of venue cross-references (`foursquare://venues/<id>`).
pub const FOURSQUARE_SCHEME: &str = "foursquare";
