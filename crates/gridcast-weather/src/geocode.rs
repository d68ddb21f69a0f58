//! Reverse geocoding: convert coordinates to a human-readable place label.
//! The default backend is Nominatim (OpenStreetMap) - free, no API key required.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::types::{GeocodeError, GeodeticPoint, UNKNOWN_PLACE};

const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = "Gridcast/0.1.0";

/// Address fields relevant to a place label, finest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    /// District or neighbourhood (e.g. "Jongno-gu")
    pub sub_locality: Option<String>,
    /// City or town
    pub locality: Option<String>,
    /// Province or metropolitan area
    pub admin_area: Option<String>,
}

/// Reverse-geocoding collaborator.
pub trait ReverseGeocoder: Send + Sync {
    fn reverse_geocode(
        &self,
        point: GeodeticPoint,
    ) -> impl Future<Output = Result<Address, GeocodeError>> + Send;
}

impl<T: ReverseGeocoder> ReverseGeocoder for std::sync::Arc<T> {
    fn reverse_geocode(
        &self,
        point: GeodeticPoint,
    ) -> impl Future<Output = Result<Address, GeocodeError>> + Send {
        self.as_ref().reverse_geocode(point)
    }
}

/// Compose the display label for an address.
///
/// Sub-locality, a space, then locality or (failing that) the admin area.
/// Missing parts become empty strings.
pub fn compose_place_name(address: &Address) -> String {
    let sub = address.sub_locality.as_deref().unwrap_or("");
    let broad = address
        .locality
        .as_deref()
        .or(address.admin_area.as_deref())
        .unwrap_or("");
    format!("{} {}", sub, broad)
}

/// Turns coordinates into a place label, never failing.
#[derive(Debug, Clone)]
pub struct PlaceNamer<G> {
    geocoder: G,
}

impl<G: ReverseGeocoder> PlaceNamer<G> {
    pub fn new(geocoder: G) -> Self {
        Self { geocoder }
    }

    /// Label for `point`, or [`UNKNOWN_PLACE`] when geocoding fails.
    pub async fn name(&self, point: GeodeticPoint) -> String {
        match self.geocoder.reverse_geocode(point).await {
            Ok(address) => {
                let name = compose_place_name(&address);
                tracing::info!("Reverse geocoded to: {}", name);
                name
            }
            Err(e) => {
                tracing::warn!("Reverse geocode failed, using placeholder: {}", e);
                UNKNOWN_PLACE.to_string()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    suburb: Option<String>,
    city_district: Option<String>,
    borough: Option<String>,
    quarter: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    state: Option<String>,
    province: Option<String>,
}

impl From<NominatimAddress> for Address {
    fn from(addr: NominatimAddress) -> Self {
        Self {
            sub_locality: addr
                .city_district
                .or(addr.borough)
                .or(addr.suburb)
                .or(addr.quarter),
            locality: addr.city.or(addr.town).or(addr.village),
            admin_area: addr.state.or(addr.province),
        }
    }
}

/// Nominatim-backed [`ReverseGeocoder`].
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }
}

impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse_geocode(&self, point: GeodeticPoint) -> Result<Address, GeocodeError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("lat", point.latitude.to_string()),
                ("lon", point.longitude.to_string()),
                ("format", "json".to_string()),
                ("addressdetails", "1".to_string()),
                ("zoom", "14".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::debug!("Reverse geocode returned status {}", response.status());
            return Err(GeocodeError::Status(response.status().as_u16()));
        }

        let body: NominatimResponse = response.json().await?;
        let address = body.address.ok_or(GeocodeError::NoMatch)?;
        Ok(address.into())
    }
}
