//! Venue enrichment core for venuebot.
//!
//! Links graph nodes to Foursquare venues and keeps their details current.
//! Two entry points feed the [`lookup::LookupPipeline`]: the background
//! [`maintainer::Maintainer`] and the request-driven
//! [`provider::KnowledgeProvider`]. All stages run as [`scheduler::Promise`]
//! continuations on the tokio runtime.

pub mod identifier;
pub mod lookup;
pub mod maintainer;
pub mod provider;
pub mod publish;
pub mod scheduler;
pub mod search;
pub mod translate;

#[cfg(test)]
mod test_support;

pub use identifier::VenueId;
pub use lookup::{LookupPipeline, SourceFactory, foursquare_factory};
pub use maintainer::{Backoff, Maintainer, MaintainerDelays, MaintainerState};
pub use provider::{CapabilityDeclaration, KnowledgeProvider};
pub use publish::{JsonLinesPublisher, Publisher};
pub use scheduler::{Promise, Resolver, Scheduler};
pub use search::{PopularVenue, adopt_venue, popular_venues};
