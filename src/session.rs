// Per-user query session: the current package, both map markers and the
// in-flight price query. State is written back to its store on every change.

use crate::client::RateApi;
use crate::geocode::{route, GeocodeError, Geocoder, Location, MarkerPosition, RouteError};
use crate::package::PackageSpec;
use crate::service::{PriceError, PriceOutcome, PriceQuery, PriceService};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Geocode(#[from] GeocodeError),
}

/// Everything a session remembers between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionState {
    pub package: PackageSpec,
    pub origin: Option<MarkerPosition>,
    pub destination: Option<MarkerPosition>,
    pub saved_at: Option<DateTime<Utc>>,
}

pub trait SessionStore: Send + Sync {
    /// `None` on first launch.
    fn load(&self) -> Result<Option<SessionState>, SessionError>;
    fn save(&self, state: &SessionState) -> Result<(), SessionError>;
}

/// Keeps the session as one pretty-printed JSON document.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for JsonFileStore {
    fn load(&self) -> Result<Option<SessionState>, SessionError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    fn save(&self, state: &SessionState) -> Result<(), SessionError> {
        let json = serde_json::to_vec_pretty(state)?;
        // Written beside the target, then renamed into place.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerRole {
    Origin,
    Destination,
}

pub type QueryHandle = JoinHandle<Result<PriceOutcome, PriceError>>;

pub struct QuerySession<A, S> {
    state: SessionState,
    store: S,
    service: Arc<PriceService<A>>,
    in_flight: Mutex<Option<AbortHandle>>,
}

impl<A: RateApi, S: SessionStore> QuerySession<A, S> {
    /// Restores the stored session, or starts from the default package.
    pub fn open(store: S, service: Arc<PriceService<A>>) -> Result<Self, SessionError> {
        let state = match store.load()? {
            Some(state) => {
                debug!(saved_at = ?state.saved_at, "restored session");
                state
            }
            None => SessionState::default(),
        };
        Ok(Self {
            state,
            store,
            service,
            in_flight: Mutex::new(None),
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn set_package(&mut self, package: PackageSpec) -> Result<(), SessionError> {
        self.state.package = package;
        self.persist()
    }

    pub fn set_marker(&mut self, role: MarkerRole, marker: MarkerPosition) -> Result<(), SessionError> {
        match role {
            MarkerRole::Origin => self.state.origin = Some(marker),
            MarkerRole::Destination => self.state.destination = Some(marker),
        }
        self.persist()
    }

    /// Places a marker at a coordinate, resolving it through the geocoder.
    pub async fn move_marker(
        &mut self,
        role: MarkerRole,
        lng: f64,
        lat: f64,
        geocoder: &dyn Geocoder,
    ) -> Result<Location, SessionError> {
        let loc = geocoder.reverse(lng, lat).await?;
        if loc.is_unresolved() {
            return Err(GeocodeError::Unresolved { lng, lat }.into());
        }
        info!(?role, zip = ?loc.zip_code, country = ?loc.country, "marker moved");
        self.set_marker(role, MarkerPosition { lng, lat, loc: loc.clone() })?;
        Ok(loc)
    }

    /// The query the current markers and package describe. `None` until both
    /// markers are placed.
    pub fn current_query(&self) -> Result<Option<PriceQuery>, RouteError> {
        let (Some(origin), Some(destination)) = (&self.state.origin, &self.state.destination) else {
            return Ok(None);
        };
        route(&origin.loc, &destination.loc, &self.state.package).map(Some)
    }

    /// Starts a price query, aborting any query of this session still running.
    pub fn submit(&self, query: PriceQuery) -> QueryHandle {
        let service = Arc::clone(&self.service);
        let handle = tokio::spawn(async move { service.quote(&query).await });

        if let Some(previous) = self.in_flight.lock().replace(handle.abort_handle()) {
            if !previous.is_finished() {
                debug!("aborting superseded price query");
                previous.abort();
            }
        }
        handle
    }

    /// Re-runs the query for the current state, if there is one.
    pub fn refresh(&self) -> Result<Option<QueryHandle>, RouteError> {
        Ok(self.current_query()?.map(|query| self.submit(query)))
    }

    fn persist(&mut self) -> Result<(), SessionError> {
        self.state.saved_at = Some(Utc::now());
        self.store.save(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expander::{expand, expand_intl};
    use crate::geocode::fakes::{abroad, us, PlacesGeocoder};
    use crate::package::{PackageType, ServiceType};
    use crate::request::{RequestBuilder, DEFAULT_MAX_PACKAGES_PER_REQUEST};
    use crate::service::fakes::CannedApi;
    use crate::xml_response::samples::DOMESTIC_RESPONSE;
    use std::time::Duration;
    use tempfile::TempDir;

    fn service(api: CannedApi) -> Arc<PriceService<CannedApi>> {
        Arc::new(PriceService::new(
            api,
            RequestBuilder::new("TEST", DEFAULT_MAX_PACKAGES_PER_REQUEST),
        ))
    }

    fn store(dir: &TempDir) -> JsonFileStore {
        JsonFileStore::new(dir.path().join("session.json"))
    }

    fn marker(loc: Location) -> MarkerPosition {
        MarkerPosition {
            lng: -95.0,
            lat: 39.0,
            loc,
        }
    }

    #[test]
    fn test_first_launch_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let session = QuerySession::open(store(&dir), service(CannedApi::answering(DOMESTIC_RESPONSE))).unwrap();

        assert_eq!(session.state().package, PackageSpec::default());
        assert!(session.state().origin.is_none());
        assert_eq!(session.current_query(), Ok(None));
    }

    #[test]
    fn test_stored_package_expands_identically() {
        let dir = TempDir::new().unwrap();
        let api = service(CannedApi::answering(DOMESTIC_RESPONSE));

        for service_type in ServiceType::VARIANTS {
            for package_type in PackageType::VARIANTS {
                for (pounds, ounces) in [(0.0, 2.0), (0.0, 10.0), (2.0, 0.0)] {
                    let package = PackageSpec {
                        pounds,
                        ounces,
                        service_type: service_type.clone(),
                        package_type,
                        ..PackageSpec::default()
                    };

                    let mut session = QuerySession::open(store(&dir), Arc::clone(&api)).unwrap();
                    session.set_package(package.clone()).unwrap();

                    let reopened = QuerySession::open(store(&dir), Arc::clone(&api)).unwrap();
                    let restored = &reopened.state().package;
                    assert_eq!(restored, &package);
                    assert_eq!(expand(restored), expand(&package));
                    assert_eq!(expand_intl(restored), expand_intl(&package));
                }
            }
        }
    }

    #[test]
    fn test_markers_are_persisted() {
        let dir = TempDir::new().unwrap();
        let api = service(CannedApi::answering(DOMESTIC_RESPONSE));

        let mut session = QuerySession::open(store(&dir), Arc::clone(&api)).unwrap();
        session.set_marker(MarkerRole::Origin, marker(us("94107"))).unwrap();
        session
            .set_marker(MarkerRole::Destination, marker(abroad("Canada", "CA")))
            .unwrap();

        let reopened = QuerySession::open(store(&dir), api).unwrap();
        assert_eq!(reopened.state().origin, Some(marker(us("94107"))));
        assert!(reopened.state().saved_at.is_some());
        assert!(matches!(
            reopened.current_query(),
            Ok(Some(PriceQuery::International { ref country, .. })) if country == "Canada"
        ));
    }

    #[test]
    fn test_corrupt_store_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), "{ not json").unwrap();

        let result = QuerySession::open(store, service(CannedApi::answering(DOMESTIC_RESPONSE)));
        assert!(matches!(result, Err(SessionError::Serialization(_))));
    }

    #[test]
    fn test_stored_strings_are_accepted() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(
            store.path(),
            r#"{"package": {"pounds": "0", "ounces": "3", "width": "7", "length": "5",
                "height": "1", "price": "0", "machinable": "TRUE",
                "serviceType": "FIRST CLASS", "packageType": "LETTER"}}"#,
        )
        .unwrap();

        let state = store.load().unwrap().unwrap();
        assert_eq!(state.package.service_type, ServiceType::FirstClass);
        assert_eq!(state.package.ounces, 3.0);
        assert!(state.origin.is_none());
    }

    #[tokio::test]
    async fn test_move_marker_geocodes_and_routes() {
        let dir = TempDir::new().unwrap();
        let geocoder = PlacesGeocoder {
            places: vec![
                MarkerPosition { lng: -122.4, lat: 37.8, loc: us("94107") },
                MarkerPosition { lng: -74.0, lat: 40.7, loc: us("10001") },
            ],
        };
        let mut session =
            QuerySession::open(store(&dir), service(CannedApi::answering(DOMESTIC_RESPONSE))).unwrap();

        let loc = session
            .move_marker(MarkerRole::Origin, -122.4, 37.8, &geocoder)
            .await
            .unwrap();
        assert_eq!(loc.zip_code.as_deref(), Some("94107"));
        assert_eq!(session.current_query(), Ok(None));

        session
            .move_marker(MarkerRole::Destination, -74.0, 40.7, &geocoder)
            .await
            .unwrap();
        assert!(matches!(
            session.current_query(),
            Ok(Some(PriceQuery::Domestic { ref zip_destination, .. })) if zip_destination == "10001"
        ));

        let missed = session.move_marker(MarkerRole::Destination, 0.0, 0.0, &geocoder).await;
        assert!(matches!(missed, Err(SessionError::Geocode(_))));
    }

    #[tokio::test]
    async fn test_origin_outside_united_states() {
        let dir = TempDir::new().unwrap();
        let mut session =
            QuerySession::open(store(&dir), service(CannedApi::answering(DOMESTIC_RESPONSE))).unwrap();
        session.set_marker(MarkerRole::Origin, marker(abroad("Mexico", "MX"))).unwrap();
        session.set_marker(MarkerRole::Destination, marker(us("10001"))).unwrap();

        assert!(matches!(session.refresh(), Err(RouteError::OriginOutsideUnitedStates)));
    }

    #[tokio::test]
    async fn test_new_query_aborts_superseded_one() {
        let dir = TempDir::new().unwrap();
        let api = CannedApi::answering(DOMESTIC_RESPONSE).with_delay(Duration::from_millis(200));
        let session = QuerySession::open(store(&dir), service(api)).unwrap();

        let query = PriceQuery::Domestic {
            zip_origination: "94107".to_string(),
            zip_destination: "10001".to_string(),
            spec: PackageSpec {
                service_type: ServiceType::Priority,
                package_type: PackageType::Package,
                ..PackageSpec::default()
            },
        };

        let first = session.submit(query.clone());
        let second = session.submit(query);

        let first = first.await;
        assert!(first.is_err_and(|e| e.is_cancelled()));

        let second = second.await.unwrap().unwrap();
        assert!(matches!(second, PriceOutcome::Packages(ref outcomes) if outcomes.len() == 2));
    }
}
