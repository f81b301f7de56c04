//! Venue record → graph payload mapping.

use venuebot_foursquare::VenueRecord;
use venuebot_shared::StoragePayload;
use venuebot_shared::namespace::{rdfs, schema, wgs84};

use crate::identifier::VenueId;

/// Write the venue's type, cross-reference, name and coordinates into `target`.
///
/// Coordinates are only written when both latitude and longitude are known.
/// `about` is left untouched.
pub fn translate(record: &VenueRecord, mut target: StoragePayload) -> StoragePayload {
    target.add_type(wgs84::SPATIAL_THING);
    target.add_property(rdfs::SEE_ALSO, VenueId::new(&record.id).reference_uri());
    target.set_property(schema::NAME, record.name.as_str());

    if let (Some(lat), Some(lng)) = (record.location.lat, record.location.lng) {
        target.set_property(wgs84::LAT, lat);
        target.set_property(wgs84::LONG, lng);
    }

    target
}
