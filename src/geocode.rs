// Geocoding contract and the marker routing decision: whether a pair of map
// locations turns into a domestic or an international price query.

use crate::package::PackageSpec;
use crate::service::PriceQuery;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const UNITED_STATES: &str = "United States";

/// Where a map coordinate lands, as reported by the geocoding provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Location {
    pub zip_code: Option<String>,
    pub country: Option<String>,
    /// Two letter code, upper case.
    pub country_code: Option<String>,
}

impl Location {
    pub fn is_united_states(&self) -> bool {
        self.country.as_deref() == Some(UNITED_STATES)
    }

    /// A coordinate that resolved to neither a postal code nor a country.
    pub fn is_unresolved(&self) -> bool {
        self.zip_code.is_none() && self.country.is_none()
    }

    /// Text a forward lookup should search for: the zip code inside the
    /// United States, the country name elsewhere.
    pub fn forward_query(&self) -> Option<&str> {
        if self.is_united_states() {
            self.zip_code.as_deref()
        } else {
            self.country.as_deref()
        }
    }
}

/// A placed map marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerPosition {
    pub lng: f64,
    pub lat: f64,
    pub loc: Location,
}

#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("Geocoding provider error: {0}")]
    Provider(String),

    #[error("Please select a location within a country")]
    Unresolved { lng: f64, lat: f64 },
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse(&self, lng: f64, lat: f64) -> Result<Location, GeocodeError>;

    /// Coordinates `(lng, lat)` of a location, `None` when the provider has no match.
    async fn forward(&self, location: &Location) -> Result<Option<(f64, f64)>, GeocodeError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("Please set the origin marker inside of the United States")]
    OriginOutsideUnitedStates,

    #[error("Please set the destination marker on a zip code or a country")]
    DestinationUnresolved,
}

/// Decides which query a pair of markers produces. Shipments always leave
/// from a US zip code; a destination outside the United States is priced
/// by country name.
pub fn route(origin: &Location, destination: &Location, spec: &PackageSpec) -> Result<PriceQuery, RouteError> {
    let zip_origination = origin
        .zip_code
        .clone()
        .ok_or(RouteError::OriginOutsideUnitedStates)?;

    if !destination.is_united_states() {
        let country = destination
            .country
            .clone()
            .ok_or(RouteError::DestinationUnresolved)?;
        return Ok(PriceQuery::International {
            country,
            spec: spec.clone(),
        });
    }

    let zip_destination = destination
        .zip_code
        .clone()
        .ok_or(RouteError::DestinationUnresolved)?;
    Ok(PriceQuery::Domestic {
        zip_origination,
        zip_destination,
        spec: spec.clone(),
    })
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;

    /// Resolves coordinates by nearest longitude among a fixed set of places.
    pub struct PlacesGeocoder {
        pub places: Vec<MarkerPosition>,
    }

    #[async_trait]
    impl Geocoder for PlacesGeocoder {
        async fn reverse(&self, lng: f64, lat: f64) -> Result<Location, GeocodeError> {
            self.places
                .iter()
                .find(|p| (p.lng - lng).abs() < 1.0 && (p.lat - lat).abs() < 1.0)
                .map(|p| p.loc.clone())
                .ok_or(GeocodeError::Unresolved { lng, lat })
        }

        async fn forward(&self, location: &Location) -> Result<Option<(f64, f64)>, GeocodeError> {
            Ok(self
                .places
                .iter()
                .find(|p| p.loc.forward_query() == location.forward_query())
                .map(|p| (p.lng, p.lat)))
        }
    }

    pub fn us(zip: &str) -> Location {
        Location {
            zip_code: Some(zip.to_string()),
            country: Some(UNITED_STATES.to_string()),
            country_code: Some("US".to_string()),
        }
    }

    pub fn abroad(country: &str, code: &str) -> Location {
        Location {
            zip_code: None,
            country: Some(country.to_string()),
            country_code: Some(code.to_string()),
        }
    }
}
