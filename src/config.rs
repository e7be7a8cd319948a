// Command line and environment configuration.

use crate::client::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_MS};
use crate::geocode::{route, Location, RouteError, UNITED_STATES};
use crate::package::{PackageSpec, PackageType, ServiceType};
use crate::request::DEFAULT_MAX_PACKAGES_PER_REQUEST;
use crate::service::PriceQuery;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "postage-rates")]
#[command(about = "Compare USPS postage rates for a shipment")]
pub struct Cli {
    /// Debug level logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP price API.
    Serve(ServeArgs),
    /// Price a single shipment and print the rates, cheapest first.
    Quote(QuoteArgs),
}

/// Upstream rate service settings.
#[derive(Debug, Clone, Args)]
pub struct UpstreamArgs {
    #[arg(long, env = "USPS_USER_ID", hide_env_values = true)]
    pub user_id: String,

    #[arg(long, env = "USPS_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(long, env = "MAX_PACKAGES_PER_REQUEST", default_value_t = DEFAULT_MAX_PACKAGES_PER_REQUEST)]
    pub max_packages_per_request: usize,

    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,
}

impl UpstreamArgs {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            user_id: self.user_id.clone(),
            timeout_ms: self.timeout_ms,
            max_packages_per_request: self.max_packages_per_request,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub upstream: UpstreamArgs,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,
}

impl ServeArgs {
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Clone, Args)]
pub struct QuoteArgs {
    #[command(flatten)]
    pub upstream: UpstreamArgs,

    /// Origin zip code.
    #[arg(long)]
    pub from: String,

    /// Destination zip code.
    #[arg(long, required_unless_present = "country", conflicts_with = "country")]
    pub to: Option<String>,

    /// Destination country name, for international shipments.
    #[arg(long)]
    pub country: Option<String>,

    #[arg(long, default_value_t = 0.0)]
    pub pounds: f64,

    #[arg(long, default_value_t = 1.0)]
    pub ounces: f64,

    #[arg(long, default_value_t = 7.0)]
    pub width: f64,

    #[arg(long, default_value_t = 5.0)]
    pub length: f64,

    #[arg(long, default_value_t = 1.0)]
    pub height: f64,

    /// Declared value of the contents, in dollars.
    #[arg(long, default_value_t = 0.0)]
    pub value: f64,

    #[arg(long)]
    pub non_machinable: bool,

    /// ALL, PRIORITY, FIRST CLASS, or a service name to filter international rates by.
    #[arg(long, default_value = "ALL")]
    pub service: ServiceType,

    /// ALL, LETTER, POSTCARD, LARGEENVELOPE, PACKAGE or FLATRATE.
    #[arg(long = "package", default_value = "ALL")]
    pub package_type: PackageType,

    /// Remember the package in this session file.
    #[arg(long, env = "POSTAGE_SESSION_FILE")]
    pub session: Option<PathBuf>,
}

impl QuoteArgs {
    pub fn package(&self) -> PackageSpec {
        PackageSpec {
            pounds: self.pounds,
            ounces: self.ounces,
            width: self.width,
            length: self.length,
            height: self.height,
            declared_value: self.value,
            machinable: !self.non_machinable,
            service_type: self.service.clone(),
            package_type: self.package_type,
        }
    }

    pub fn origin(&self) -> Location {
        Location {
            zip_code: Some(self.from.clone()),
            country: Some(UNITED_STATES.to_string()),
            country_code: Some("US".to_string()),
        }
    }

    pub fn destination(&self) -> Location {
        match &self.country {
            Some(country) => Location {
                zip_code: None,
                country: Some(country.clone()),
                country_code: None,
            },
            None => Location {
                zip_code: self.to.clone(),
                ..self.origin()
            },
        }
    }

    pub fn query(&self) -> Result<PriceQuery, RouteError> {
        route(&self.origin(), &self.destination(), &self.package())
    }
}
