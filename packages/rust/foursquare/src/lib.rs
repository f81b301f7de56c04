//! Foursquare venue source.
//!
//! [`VenueSource`] is the contract the enrichment pipeline fetches venue
//! records through. [`FoursquareClient`] implements it against the
//! Foursquare v2 REST API using userless (client id + secret) auth.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;
use venuebot_shared::{Credentials, FoursquareConfig, Result, VenueBotError};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("venuebot/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A venue as returned by the external source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: VenueLocation,
}

/// Location block of a venue record. Every field is optional upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VenueLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

// ---------------------------------------------------------------------------
// VenueSource
// ---------------------------------------------------------------------------

/// Read access to an external venue database.
#[async_trait]
pub trait VenueSource: Send + Sync {
    /// Fetch the full record of one venue.
    async fn fetch_venue(&self, id: &str) -> Result<VenueRecord>;

    /// Search venues near a place, optionally filtered by a query string.
    async fn search(&self, near: &str, query: Option<&str>, limit: u32) -> Result<Vec<VenueRecord>>;
}

// ---------------------------------------------------------------------------
// Wire envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: T,
}

#[derive(Debug, Deserialize)]
struct VenueResponse {
    venue: VenueRecord,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    venues: Vec<VenueRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorMeta {
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error_detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    meta: ErrorMeta,
}

// ---------------------------------------------------------------------------
// FoursquareClient
// ---------------------------------------------------------------------------

/// HTTP client for the Foursquare v2 API.
#[derive(Debug, Clone)]
pub struct FoursquareClient {
    http: Client,
    base: Url,
    version: String,
    credentials: Credentials,
}

impl FoursquareClient {
    /// Build a client for `credentials` using the endpoint settings in `config`.
    pub fn new(credentials: Credentials, config: &FoursquareConfig) -> Result<Self> {
        let base = Url::parse(config.api_base.trim_end_matches('/')).map_err(|e| {
            VenueBotError::config(format!("invalid foursquare api_base '{}': {e}", config.api_base))
        })?;
        if base.cannot_be_a_base() {
            return Err(VenueBotError::config(format!(
                "foursquare api_base '{}' cannot carry a path",
                config.api_base
            )));
        }

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VenueBotError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base,
            version: config.api_version.clone(),
            credentials,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T> {
        debug!(%url, "foursquare request");

        let response = self
            .http
            .get(url.clone())
            .query(&[
                ("client_id", self.credentials.identifier.as_str()),
                ("client_secret", self.credentials.secret.as_str()),
                ("v", self.version.as_str()),
            ])
            .query(query)
            .send()
            .await
            .map_err(|e| VenueBotError::Network(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VenueBotError::Network(format!("failed to read body from {url}: {e}")))?;

        if !status.is_success() {
            let meta = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.meta)
                .unwrap_or_default();
            return Err(VenueBotError::Network(format!(
                "foursquare returned HTTP {status}: {} {}",
                meta.error_type.unwrap_or_default(),
                meta.error_detail.unwrap_or_default()
            )));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| VenueBotError::parse(format!("invalid foursquare response: {e}")))?;
        Ok(envelope.response)
    }
}

#[async_trait]
impl VenueSource for FoursquareClient {
    #[instrument(skip(self))]
    async fn fetch_venue(&self, id: &str) -> Result<VenueRecord> {
        let url = self.endpoint(&["venues", id]);
        let response: VenueResponse = self.get(url, &[]).await?;
        Ok(response.venue)
    }

    #[instrument(skip(self))]
    async fn search(&self, near: &str, query: Option<&str>, limit: u32) -> Result<Vec<VenueRecord>> {
        let url = self.endpoint(&["venues", "search"]);
        let mut params = vec![("near", near.to_string()), ("limit", limit.to_string())];
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            params.push(("query", q.to_string()));
        }
        let response: SearchResponse = self.get(url, &params).await?;
        Ok(response.venues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> FoursquareClient {
        let config = FoursquareConfig {
            api_base: server.uri(),
            ..FoursquareConfig::default()
        };
        let credentials = Credentials {
            identifier: "cid".into(),
            secret: "csecret".into(),
        };
        FoursquareClient::new(credentials, &config).unwrap()
    }

    #[tokio::test]
    async fn fetch_venue_unwraps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/venues/123"))
            .and(query_param("client_id", "cid"))
            .and(query_param("client_secret", "csecret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"meta":{"code":200},"response":{"venue":{"id":"123","name":"Cafe","location":{"lat":1.0,"lng":2.0,"address":"1 Main St"}}}}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let venue = client_for(&server).fetch_venue("123").await.unwrap();
        assert_eq!(venue.id, "123");
        assert_eq!(venue.name, "Cafe");
        assert_eq!(venue.location.lat, Some(1.0));
        assert_eq!(venue.location.lng, Some(2.0));
        assert_eq!(venue.location.address.as_deref(), Some("1 Main St"));
    }

    #[tokio::test]
    async fn search_passes_near_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/venues/search"))
            .and(query_param("near", "Chicago, IL"))
            .and(query_param("query", "coffee"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"response":{"venues":[{"id":"a","name":"Bean"},{"id":"b","name":"Brew","location":{"city":"Chicago"}}]}}"#,
            ))
            .mount(&server)
            .await;

        let venues = client_for(&server)
            .search("Chicago, IL", Some("coffee"), 5)
            .await
            .unwrap();
        assert_eq!(venues.len(), 2);
        assert_eq!(venues[0].name, "Bean");
        assert!(venues[0].location.lat.is_none());
        assert_eq!(venues[1].location.city.as_deref(), Some("Chicago"));
    }

    #[tokio::test]
    async fn error_status_surfaces_detail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/venues/bad"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"meta":{"code":400,"errorType":"param_error","errorDetail":"Value bad is invalid for venue id"}}"#,
            ))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_venue("bad").await.unwrap_err();
        match err {
            VenueBotError::Network(msg) => {
                assert!(msg.contains("400"));
                assert!(msg.contains("param_error"));
            }
            other => panic!("expected Network error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/venues/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_venue("1").await.unwrap_err();
        assert!(matches!(err, VenueBotError::Parse { .. }));
    }

    #[test]
    fn endpoint_appends_to_base_path() {
        let config = FoursquareConfig::default();
        let client = FoursquareClient::new(
            Credentials {
                identifier: "i".into(),
                secret: "s".into(),
            },
            &config,
        )
        .unwrap();
        assert_eq!(
            client.endpoint(&["venues", "abc"]).as_str(),
            "https://api.foursquare.com/v2/venues/abc"
        );
    }
}
