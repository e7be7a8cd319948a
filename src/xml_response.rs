// Upstream rate response documents and the decoder that picks the right one.
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// Error types for XML processing
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("XML parse error: {0}")]
    XmlParseError(String),

    #[error("XML serialization error: {0}")]
    ConversionError(String),

    #[error("Unexpected response document: <{0}>")]
    UnexpectedRoot(String),

    #[error("Response document is empty")]
    MissingRoot,
}

/// A decoded upstream response document.
#[derive(Debug, Clone, PartialEq)]
pub enum RateResponse {
    Domestic(XmlRateV4Response),
    International(XmlIntlRateResponse),
    /// The whole request was rejected (bad credentials, malformed XML, ...).
    Error(XmlError),
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
#[serde(rename = "RateV4Response")]
pub struct XmlRateV4Response {
    #[serde(rename = "Package")]
    pub packages: Vec<XmlDomesticPackage>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlDomesticPackage {
    #[serde(rename = "@ID")]
    pub id: String,
    pub zip_origination: String,
    pub zip_destination: String,
    pub pounds: String,
    pub ounces: String,
    pub container: String,
    #[serde(rename = "Postage")]
    pub postages: Vec<XmlPostage>,
    pub error: Option<XmlError>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlPostage {
    #[serde(rename = "@CLASSID")]
    pub class_id: String,
    pub mail_service: String,
    pub rate: String,
}

// The international endpoint answers with either `IntlRateV2Response` or
// `IntlRateV4Response` depending on the upstream revision; the body is the same.
#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
#[serde(rename = "IntlRateV2Response")]
pub struct XmlIntlRateResponse {
    #[serde(rename = "Package")]
    pub packages: Vec<XmlIntlPackage>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlIntlPackage {
    #[serde(rename = "@ID")]
    pub id: String,
    #[serde(rename = "Service")]
    pub services: Vec<XmlIntlService>,
    pub error: Option<XmlError>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlIntlService {
    #[serde(rename = "@ID")]
    pub id: String,
    pub pounds: String,
    pub ounces: String,
    pub mail_type: String,
    pub country: String,
    pub postage: String,
    pub svc_commitments: String,
    pub svc_description: Option<String>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct XmlError {
    pub number: String,
    pub source: String,
    pub description: String,
}

fn root_element(xml: &str) -> Result<String, ProcessingError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Ok(Event::Eof) => return Err(ProcessingError::MissingRoot),
            Err(e) => {
                return Err(ProcessingError::XmlParseError(format!(
                    "error at position {}: {}",
                    reader.error_position(),
                    e
                )))
            }
            _ => (),
        }
    }
}

fn decode<'a, T: Deserialize<'a>>(xml: &'a str) -> Result<T, ProcessingError> {
    from_str(xml).map_err(|e| ProcessingError::XmlParseError(e.to_string()))
}

/// Decodes an upstream response body, dispatching on its root element.
pub fn parse_response(xml: &str) -> Result<RateResponse, ProcessingError> {
    let root = root_element(xml)?;
    match root.as_str() {
        "Error" => decode(xml).map(RateResponse::Error),
        "RateV4Response" => decode(xml).map(RateResponse::Domestic),
        "IntlRateV2Response" | "IntlRateV4Response" => {
            debug!(root = %root, "decoding international rate response");
            decode(xml).map(RateResponse::International)
        }
        _ => Err(ProcessingError::UnexpectedRoot(root)),
    }
}


#[cfg(test)]
mod tests {
    use super::samples::*;
    use super::*;

    #[test]
    fn test_parse_domestic_response() {
        let response = parse_response(DOMESTIC_RESPONSE).unwrap();
        let RateResponse::Domestic(doc) = response else {
            panic!("expected a domestic document");
        };

        assert_eq!(doc.packages.len(), 3);
        let first = &doc.packages[0];
        assert_eq!(first.id, "0");
        assert_eq!(first.zip_destination, "10001");
        assert_eq!(first.postages.len(), 1);
        assert_eq!(first.postages[0].class_id, "1");
        assert_eq!(first.postages[0].rate, "5.20");
        assert_eq!(
            first.postages[0].mail_service,
            "Priority Mail 2-Day&lt;sup&gt;&#8482;&lt;/sup&gt;"
        );
        assert!(first.error.is_none());

        let failed = &doc.packages[2];
        assert!(failed.postages.is_empty());
        assert_eq!(
            failed.error.as_ref().map(|e| e.description.as_str()),
            Some("Please enter a valid weight.")
        );
    }

    #[test]
    fn test_parse_international_response() {
        let RateResponse::International(doc) = parse_response(INTL_RESPONSE).unwrap() else {
            panic!("expected an international document");
        };

        let services = &doc.packages[0].services;
        assert_eq!(services.len(), 3);
        assert_eq!(services[0].postage, "47.20");
        assert_eq!(services[0].country, "CANADA");
        assert!(services[2].svc_description.is_none());
    }

    #[test]
    fn test_parse_international_v4_root() {
        let xml = INTL_RESPONSE.replace("IntlRateV2Response", "IntlRateV4Response");
        let response = parse_response(&xml).unwrap();
        assert!(matches!(response, RateResponse::International(doc) if doc.packages.len() == 1));
    }

    #[test]
    fn test_parse_top_level_error() {
        let RateResponse::Error(error) = parse_response(ERROR_RESPONSE).unwrap() else {
            panic!("expected an error document");
        };
        assert_eq!(error.number, "80040B1A");
        assert_eq!(error.source, "USPSCOM::DoAuth");
    }

    #[test]
    fn test_unexpected_root_is_rejected() {
        let result = parse_response("<TrackResponse></TrackResponse>");
        assert!(matches!(result, Err(ProcessingError::UnexpectedRoot(root)) if root == "TrackResponse"));
    }

    #[test]
    fn test_empty_body_is_rejected() {
        assert!(matches!(parse_response("   "), Err(ProcessingError::MissingRoot)));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse_response("<RateV4Response><Package></RateV4Response>").is_err());
    }
}
