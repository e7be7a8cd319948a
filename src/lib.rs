// Postage rate lookups against the USPS Web Tools rate API

pub mod client;
pub mod config;
pub mod expander;
pub mod geocode;
pub mod logging;
pub mod normalizer;
pub mod package;
pub mod request;
pub mod server;
pub mod service;
pub mod session;
pub mod xml_response;

// Re-export key types for convenience
pub use client::{ApiError, ClientConfig, ClientError, RateApi, UspsClient};
pub use expander::{expand, expand_intl, Expansion, IntlMailType, RateRequestDescriptor};
pub use geocode::{Geocoder, Location, MarkerPosition};
pub use normalizer::{normalize, PackageOutcome, PackageResult, QuoteError, RateQuoteLine};
pub use package::{PackageSpec, PackageType, ServiceType};
pub use request::{RequestBuilder, WireRequest};
pub use service::{PriceError, PriceOutcome, PriceQuery, PriceService};
pub use session::{JsonFileStore, QuerySession, SessionStore};
pub use xml_response::{parse_response, ProcessingError, RateResponse};
