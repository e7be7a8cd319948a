// Request builder: serializes expanded descriptors into the upstream's XML
// request documents, split into batches the upstream will accept.
use crate::expander::{IntlMailType, RateRequestDescriptor};
use crate::package::{Dimensions, PackageSpec};
use crate::xml_response::ProcessingError;
use serde::Serialize;
use std::fmt;

/// Upstream limit on `<Package>` elements per request.
pub const DEFAULT_MAX_PACKAGES_PER_REQUEST: usize = 25;

const REVISION: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiName {
    RateV4,
    IntlRateV2,
}

impl ApiName {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiName::RateV4 => "RateV4",
            ApiName::IntlRateV2 => "IntlRateV2",
        }
    }
}

impl fmt::Display for ApiName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One upstream call: the `API` and `XML` form fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    pub api: ApiName,
    pub xml: String,
    /// `ID` attributes of the packages in this batch, in document order.
    pub package_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename = "RateV4Request", rename_all = "PascalCase")]
struct XmlRateV4Request<'a> {
    #[serde(rename = "@USERID")]
    user_id: &'a str,
    revision: u8,
    #[serde(rename = "Package")]
    packages: Vec<XmlDomesticPackageRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct XmlDomesticPackageRequest<'a> {
    #[serde(rename = "@ID")]
    id: String,
    service: &'static str,
    first_class_mail_type: &'static str,
    zip_origination: &'a str,
    zip_destination: &'a str,
    pounds: String,
    ounces: String,
    container: &'static str,
    width: String,
    length: String,
    height: String,
    value: String,
    machinable: &'static str,
    return_service_info: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename = "IntlRateV2Request", rename_all = "PascalCase")]
struct XmlIntlRateV2Request<'a> {
    #[serde(rename = "@USERID")]
    user_id: &'a str,
    revision: u8,
    #[serde(rename = "Package")]
    packages: Vec<XmlIntlPackageRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct XmlIntlPackageRequest<'a> {
    #[serde(rename = "@ID")]
    id: String,
    pounds: String,
    ounces: String,
    machinable: &'static str,
    mail_type: &'static str,
    value_of_contents: String,
    country: &'a str,
    width: String,
    length: String,
    height: String,
}

fn flag(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "TRUE",
        Some(false) => "FALSE",
        None => "",
    }
}

// Absent dimensions are sent as empty elements.
fn dimension_fields(dimensions: Option<Dimensions>) -> (String, String, String) {
    match dimensions {
        Some(d) => (d.width.to_string(), d.length.to_string(), d.height.to_string()),
        None => Default::default(),
    }
}

fn to_xml<T: Serialize>(document: &T) -> Result<String, ProcessingError> {
    quick_xml::se::to_string(document).map_err(|e| ProcessingError::ConversionError(e.to_string()))
}

/// Serializes descriptors into upstream requests. Holds no per-query state.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    user_id: String,
    max_packages_per_request: usize,
}

impl RequestBuilder {
    pub fn new(user_id: impl Into<String>, max_packages_per_request: usize) -> Self {
        Self {
            user_id: user_id.into(),
            max_packages_per_request: max_packages_per_request.max(1),
        }
    }

    pub fn max_packages_per_request(&self) -> usize {
        self.max_packages_per_request
    }

    /// Builds `RateV4` requests. Package IDs are the descriptor indices.
    pub fn build_domestic(
        &self,
        descriptors: &[RateRequestDescriptor],
        zip_origination: &str,
        zip_destination: &str,
        spec: &PackageSpec,
    ) -> Result<Vec<WireRequest>, ProcessingError> {
        let packages: Vec<_> = descriptors
            .iter()
            .enumerate()
            .map(|(index, descriptor)| {
                let (width, length, height) = dimension_fields(descriptor.dimensions);
                XmlDomesticPackageRequest {
                    id: index.to_string(),
                    service: descriptor.service.label(),
                    first_class_mail_type: descriptor
                        .first_class_mail_type
                        .map(|mail_type| mail_type.label())
                        .unwrap_or_default(),
                    zip_origination,
                    zip_destination,
                    pounds: spec.pounds.to_string(),
                    ounces: spec.ounces.to_string(),
                    container: descriptor.container.label(),
                    width,
                    length,
                    height,
                    value: spec.declared_value.to_string(),
                    machinable: flag(descriptor.machinable),
                    return_service_info: "TRUE",
                }
            })
            .collect();

        self.batches(packages, |batch| {
            let ids = batch.iter().map(|p| p.id.clone()).collect();
            let document = XmlRateV4Request {
                user_id: &self.user_id,
                revision: REVISION,
                packages: batch,
            };
            Ok(WireRequest {
                api: ApiName::RateV4,
                xml: to_xml(&document)?,
                package_ids: ids,
            })
        })
    }

    /// Builds `IntlRateV2` requests, one package per mail type.
    pub fn build_international(
        &self,
        mail_types: &[IntlMailType],
        country: &str,
        spec: &PackageSpec,
    ) -> Result<Vec<WireRequest>, ProcessingError> {
        let packages: Vec<_> = mail_types
            .iter()
            .enumerate()
            .map(|(index, mail_type)| {
                let dimensions = mail_type.carries_dimensions().then(|| spec.dimensions());
                let (width, length, height) = dimension_fields(dimensions);
                XmlIntlPackageRequest {
                    id: index.to_string(),
                    pounds: spec.pounds.to_string(),
                    ounces: spec.ounces.to_string(),
                    machinable: flag(Some(spec.machinable)),
                    mail_type: mail_type.label(),
                    value_of_contents: spec.declared_value.to_string(),
                    country,
                    width,
                    length,
                    height,
                }
            })
            .collect();

        self.batches(packages, |batch| {
            let ids = batch.iter().map(|p| p.id.clone()).collect();
            let document = XmlIntlRateV2Request {
                user_id: &self.user_id,
                revision: REVISION,
                packages: batch,
            };
            Ok(WireRequest {
                api: ApiName::IntlRateV2,
                xml: to_xml(&document)?,
                package_ids: ids,
            })
        })
    }

    fn batches<P>(
        &self,
        packages: Vec<P>,
        mut build: impl FnMut(Vec<P>) -> Result<WireRequest, ProcessingError>,
    ) -> Result<Vec<WireRequest>, ProcessingError> {
        let mut requests = Vec::new();
        let mut remaining = packages.into_iter().peekable();
        while remaining.peek().is_some() {
            let batch: Vec<P> = remaining.by_ref().take(self.max_packages_per_request).collect();
            requests.push(build(batch)?);
        }
        Ok(requests)
    }
}
