// Package description submitted by the user and the weight rules that gate
// which mail classes the upstream will price for it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Heaviest letter or postcard, in ounces (pounds must be zero).
pub const LETTER_MAX_OUNCES: f64 = 3.5;
/// Heaviest domestic first-class flat or package, in ounces.
pub const FIRST_CLASS_MAX_OUNCES: f64 = 13.0;
/// Heaviest international large envelope or small package, in ounces.
pub const INTL_ENVELOPE_MAX_OUNCES: f64 = 16.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidPackage {
    #[error("Unknown package type: {0}")]
    UnknownPackageType(String),

    #[error("{field} must be a finite, non-negative number (got {value})")]
    OutOfRange { field: &'static str, value: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum PackageType {
    All,
    Letter,
    Postcard,
    LargeEnvelope,
    Package,
    FlatRate,
}

impl PackageType {
    pub const VARIANTS: [PackageType; 6] = [
        PackageType::All,
        PackageType::Letter,
        PackageType::Postcard,
        PackageType::LargeEnvelope,
        PackageType::Package,
        PackageType::FlatRate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PackageType::All => "ALL",
            PackageType::Letter => "LETTER",
            PackageType::Postcard => "POSTCARD",
            PackageType::LargeEnvelope => "LARGEENVELOPE",
            PackageType::Package => "PACKAGE",
            PackageType::FlatRate => "FLATRATE",
        }
    }
}

impl FromStr for PackageType {
    type Err = InvalidPackage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_uppercase();
        match normalized.as_str() {
            "ALL" => Ok(PackageType::All),
            "LETTER" => Ok(PackageType::Letter),
            "POSTCARD" | "POSTCARDS" => Ok(PackageType::Postcard),
            "LARGEENVELOPE" => Ok(PackageType::LargeEnvelope),
            "PACKAGE" => Ok(PackageType::Package),
            "FLATRATE" => Ok(PackageType::FlatRate),
            _ => Err(InvalidPackage::UnknownPackageType(s.to_string())),
        }
    }
}

impl TryFrom<String> for PackageType {
    type Error = InvalidPackage;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PackageType> for &'static str {
    fn from(value: PackageType) -> Self {
        value.as_str()
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested service level.
///
/// Domestic queries understand `ALL`, `PRIORITY` and `FIRST CLASS`. International
/// queries may also name a specific service (e.g. "Priority Mail Express"), which
/// is only used to filter the upstream answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceType {
    All,
    Priority,
    FirstClass,
    Named(String),
}

impl ServiceType {
    pub const VARIANTS: [ServiceType; 3] =
        [ServiceType::All, ServiceType::Priority, ServiceType::FirstClass];

    pub fn as_str(&self) -> &str {
        match self {
            ServiceType::All => "ALL",
            ServiceType::Priority => "PRIORITY",
            ServiceType::FirstClass => "FIRST CLASS",
            ServiceType::Named(name) => name,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, ServiceType::All)
    }
}

impl From<String> for ServiceType {
    fn from(value: String) -> Self {
        let upper = value.trim().to_uppercase().replace(['-', '_'], " ");
        match upper.as_str() {
            "ALL" => ServiceType::All,
            "PRIORITY" => ServiceType::Priority,
            "FIRST CLASS" => ServiceType::FirstClass,
            _ => ServiceType::Named(value.trim().to_string()),
        }
    }
}

impl From<ServiceType> for String {
    fn from(value: ServiceType) -> Self {
        match value {
            ServiceType::Named(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl FromStr for ServiceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ServiceType::from(s.to_string()))
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub length: f64,
    pub height: f64,
}

/// What the user wants to ship. Read-only for the duration of one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSpec {
    #[serde(deserialize_with = "de::number")]
    pub pounds: f64,
    #[serde(deserialize_with = "de::number")]
    pub ounces: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub width: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub length: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub height: f64,
    /// Declared value of the contents, in dollars.
    #[serde(rename = "price", default, deserialize_with = "de::number")]
    pub declared_value: f64,
    #[serde(default = "default_machinable", deserialize_with = "de::flag")]
    pub machinable: bool,
    pub service_type: ServiceType,
    pub package_type: PackageType,
}

fn default_machinable() -> bool {
    true
}

impl Default for PackageSpec {
    fn default() -> Self {
        Self {
            pounds: 0.0,
            ounces: 1.0,
            width: 7.0,
            length: 5.0,
            height: 1.0,
            declared_value: 0.0,
            machinable: true,
            service_type: ServiceType::All,
            package_type: PackageType::All,
        }
    }
}

impl PackageSpec {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            length: self.length,
            height: self.height,
        }
    }

    /// True when the package weighs no pounds and at most `limit` ounces.
    pub fn within_ounces(&self, limit: f64) -> bool {
        self.pounds == 0.0 && self.ounces <= limit
    }

    pub fn is_letter_weight(&self) -> bool {
        self.within_ounces(LETTER_MAX_OUNCES)
    }

    pub fn validate(&self) -> Result<(), InvalidPackage> {
        let fields = [
            ("pounds", self.pounds),
            ("ounces", self.ounces),
            ("width", self.width),
            ("length", self.length),
            ("height", self.height),
            ("price", self.declared_value),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(InvalidPackage::OutOfRange { field, value });
            }
        }
        Ok(())
    }
}

// The browser form posts every field as a string, stored preferences may hold
// numbers; accept both.
mod de {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlagOrText {
        Flag(bool),
        Text(String),
    }

    pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match NumberOrText::deserialize(deserializer)? {
            NumberOrText::Number(n) => Ok(n),
            NumberOrText::Text(text) if text.trim().is_empty() => Ok(0.0),
            NumberOrText::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("invalid number: {text:?}"))),
        }
    }

    pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match Option::<FlagOrText>::deserialize(deserializer)? {
            None => Ok(super::default_machinable()),
            Some(FlagOrText::Flag(flag)) => Ok(flag),
            Some(FlagOrText::Text(text)) => match text.trim().to_uppercase().as_str() {
                "TRUE" | "1" | "YES" => Ok(true),
                "FALSE" | "0" | "NO" | "" => Ok(false),
                _ => Err(D::Error::custom(format!("invalid flag: {text:?}"))),
            },
        }
    }
}
