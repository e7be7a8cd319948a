// Request expansion: turns a coarse package/service selection into every
// concrete combination the upstream rate API will price.
//
// Eligibility is expressed as ordered rule tables evaluated against the
// package weight. A type that is too heavy simply contributes nothing.

use crate::package::{
    Dimensions, PackageSpec, PackageType, ServiceType, FIRST_CLASS_MAX_OUNCES,
    INTL_ENVELOPE_MAX_OUNCES, LETTER_MAX_OUNCES,
};
use std::fmt;
use tracing::debug;

/// Result of an expansion. `NoValidCombination` means nothing should be sent upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum Expansion<T> {
    Requests(Vec<T>),
    NoValidCombination,
}

impl<T> Expansion<T> {
    pub fn requests(&self) -> &[T] {
        match self {
            Expansion::Requests(requests) => requests,
            Expansion::NoValidCombination => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.requests().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests().is_empty()
    }
}

impl<T> From<Vec<T>> for Expansion<T> {
    fn from(requests: Vec<T>) -> Self {
        if requests.is_empty() {
            Expansion::NoValidCombination
        } else {
            Expansion::Requests(requests)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DomesticService {
    FirstClass,
    Priority,
    PriorityMailExpress,
    RetailGround,
    ParcelSelectGround,
    Media,
}

impl DomesticService {
    pub fn label(self) -> &'static str {
        match self {
            DomesticService::FirstClass => "First Class",
            DomesticService::Priority => "Priority",
            DomesticService::PriorityMailExpress => "Priority Mail Express",
            DomesticService::RetailGround => "Retail Ground",
            DomesticService::ParcelSelectGround => "Parcel Select Ground",
            DomesticService::Media => "Media",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FirstClassMailType {
    Letter,
    Flat,
    Postcard,
    PackageServiceRetail,
}

impl FirstClassMailType {
    pub fn label(self) -> &'static str {
        match self {
            FirstClassMailType::Letter => "LETTER",
            FirstClassMailType::Flat => "FLAT",
            FirstClassMailType::Postcard => "POSTCARD",
            FirstClassMailType::PackageServiceRetail => "PACKAGE SERVICE RETAIL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlatRateContainer {
    Envelope,
    PaddedEnvelope,
    LegalEnvelope,
    SmallEnvelope,
    WindowEnvelope,
    GiftCardEnvelope,
    SmallBox,
    MediumBox,
    LargeBox,
}

impl FlatRateContainer {
    pub const ALL: [FlatRateContainer; 9] = [
        FlatRateContainer::Envelope,
        FlatRateContainer::PaddedEnvelope,
        FlatRateContainer::LegalEnvelope,
        FlatRateContainer::SmallEnvelope,
        FlatRateContainer::WindowEnvelope,
        FlatRateContainer::GiftCardEnvelope,
        FlatRateContainer::SmallBox,
        FlatRateContainer::MediumBox,
        FlatRateContainer::LargeBox,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FlatRateContainer::Envelope => "FLAT RATE ENVELOPE",
            FlatRateContainer::PaddedEnvelope => "PADDED FLAT RATE ENVELOPE",
            FlatRateContainer::LegalEnvelope => "LEGAL FLAT RATE ENVELOPE",
            FlatRateContainer::SmallEnvelope => "SM FLAT RATE ENVELOPE",
            FlatRateContainer::WindowEnvelope => "WINDOW FLAT RATE ENVELOPE",
            FlatRateContainer::GiftCardEnvelope => "GIFT CARD FLAT RATE ENVELOPE",
            FlatRateContainer::SmallBox => "SM FLAT RATE BOX",
            FlatRateContainer::MediumBox => "MD FLAT RATE BOX",
            FlatRateContainer::LargeBox => "LG FLAT RATE BOX",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Container {
    Variable,
    FlatRate(FlatRateContainer),
}

impl Container {
    pub fn label(self) -> &'static str {
        match self {
            Container::Variable => "VARIABLE",
            Container::FlatRate(container) => container.label(),
        }
    }
}

/// One concrete domestic rate request.
#[derive(Debug, Clone, PartialEq)]
pub struct RateRequestDescriptor {
    pub service: DomesticService,
    pub container: Container,
    pub first_class_mail_type: Option<FirstClassMailType>,
    /// Omitted for letter, postcard and flat formats.
    pub dimensions: Option<Dimensions>,
    /// `None` leaves the upstream `Machinable` element empty.
    pub machinable: Option<bool>,
}

pub type DescriptorKey = (DomesticService, Container, Option<FirstClassMailType>);

impl RateRequestDescriptor {
    pub fn key(&self) -> DescriptorKey {
        (self.service, self.container, self.first_class_mail_type)
    }
}

impl fmt::Display for RateRequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.first_class_mail_type {
            Some(mail_type) => write!(f, "{} / {}", self.service.label(), mail_type.label()),
            None => write!(f, "{} / {}", self.service.label(), self.container.label()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WeightLimit {
    Letter,
    FirstClass,
    IntlEnvelope,
    Any,
}

impl WeightLimit {
    fn admits(self, spec: &PackageSpec) -> bool {
        match self {
            WeightLimit::Letter => spec.within_ounces(LETTER_MAX_OUNCES),
            WeightLimit::FirstClass => spec.within_ounces(FIRST_CLASS_MAX_OUNCES),
            WeightLimit::IntlEnvelope => spec.within_ounces(INTL_ENVELOPE_MAX_OUNCES),
            WeightLimit::Any => true,
        }
    }
}

struct FirstClassRule {
    package_type: PackageType,
    limit: WeightLimit,
    mail_type: FirstClassMailType,
}

// Every matching row contributes. FLATRATE has no first-class rows.
const FIRST_CLASS_RULES: &[FirstClassRule] = &[
    FirstClassRule {
        package_type: PackageType::Letter,
        limit: WeightLimit::Letter,
        mail_type: FirstClassMailType::Letter,
    },
    FirstClassRule {
        package_type: PackageType::LargeEnvelope,
        limit: WeightLimit::FirstClass,
        mail_type: FirstClassMailType::Flat,
    },
    FirstClassRule {
        package_type: PackageType::Package,
        limit: WeightLimit::FirstClass,
        mail_type: FirstClassMailType::PackageServiceRetail,
    },
    FirstClassRule {
        package_type: PackageType::Postcard,
        limit: WeightLimit::Letter,
        mail_type: FirstClassMailType::Postcard,
    },
    FirstClassRule {
        package_type: PackageType::All,
        limit: WeightLimit::Letter,
        mail_type: FirstClassMailType::Letter,
    },
    FirstClassRule {
        package_type: PackageType::All,
        limit: WeightLimit::FirstClass,
        mail_type: FirstClassMailType::Flat,
    },
    FirstClassRule {
        package_type: PackageType::All,
        limit: WeightLimit::Letter,
        mail_type: FirstClassMailType::Postcard,
    },
    FirstClassRule {
        package_type: PackageType::All,
        limit: WeightLimit::FirstClass,
        mail_type: FirstClassMailType::PackageServiceRetail,
    },
];

/// First-class mail classes the upstream accepts for this package at its weight.
pub fn first_class_mail_types(spec: &PackageSpec) -> Vec<FirstClassMailType> {
    FIRST_CLASS_RULES
        .iter()
        .filter(|rule| rule.package_type == spec.package_type && rule.limit.admits(spec))
        .map(|rule| rule.mail_type)
        .collect()
}

fn carries_dimensions(spec: &PackageSpec, mail_type: Option<FirstClassMailType>) -> bool {
    match mail_type {
        Some(FirstClassMailType::PackageServiceRetail) => true,
        Some(_) => false,
        None => !matches!(
            spec.package_type,
            PackageType::Letter | PackageType::Postcard | PackageType::LargeEnvelope
        ),
    }
}

fn descriptor(
    spec: &PackageSpec,
    service: DomesticService,
    container: Container,
    first_class_mail_type: Option<FirstClassMailType>,
    machinable: Option<bool>,
) -> RateRequestDescriptor {
    RateRequestDescriptor {
        service,
        container,
        first_class_mail_type,
        dimensions: carries_dimensions(spec, first_class_mail_type).then(|| spec.dimensions()),
        machinable,
    }
}

fn expand_first_class(spec: &PackageSpec, out: &mut Vec<RateRequestDescriptor>) {
    for mail_type in first_class_mail_types(spec) {
        out.push(descriptor(
            spec,
            DomesticService::FirstClass,
            Container::Variable,
            Some(mail_type),
            Some(spec.machinable),
        ));
    }
}

fn expand_priority(spec: &PackageSpec, out: &mut Vec<RateRequestDescriptor>) {
    let flat_rate = matches!(spec.package_type, PackageType::FlatRate | PackageType::All);
    for service in [DomesticService::Priority, DomesticService::PriorityMailExpress] {
        if flat_rate {
            for container in FlatRateContainer::ALL {
                out.push(descriptor(
                    spec,
                    service,
                    Container::FlatRate(container),
                    None,
                    None,
                ));
            }
        } else {
            out.push(descriptor(spec, service, Container::Variable, None, None));
        }
    }
}

fn expand_ground(spec: &PackageSpec, out: &mut Vec<RateRequestDescriptor>) {
    for service in [
        DomesticService::RetailGround,
        DomesticService::ParcelSelectGround,
        DomesticService::Media,
    ] {
        out.push(descriptor(
            spec,
            service,
            Container::Variable,
            None,
            Some(spec.machinable),
        ));
    }
}

/// Expands a domestic query into concrete upstream requests.
pub fn expand(spec: &PackageSpec) -> Expansion<RateRequestDescriptor> {
    let mut descriptors = Vec::new();

    match &spec.service_type {
        ServiceType::FirstClass => expand_first_class(spec, &mut descriptors),
        // Postcards only ship first class, whatever service was selected.
        _ if spec.package_type == PackageType::Postcard => {
            expand_first_class(spec, &mut descriptors)
        }
        ServiceType::Priority => expand_priority(spec, &mut descriptors),
        ServiceType::All => {
            expand_first_class(spec, &mut descriptors);
            expand_priority(spec, &mut descriptors);
            expand_ground(spec, &mut descriptors);
        }
        ServiceType::Named(name) => {
            debug!(service = %name, "named services are not expanded for domestic queries");
        }
    }

    debug!(
        service_type = %spec.service_type,
        package_type = %spec.package_type,
        count = descriptors.len(),
        "expanded domestic query"
    );
    descriptors.into()
}

/// International mail type, as named by the upstream `MailType` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntlMailType {
    Letter,
    LargeEnvelope,
    /// Alias of `LargeEnvelope`; the upstream accepts either label.
    Envelope,
    Package,
    Postcards,
    FlatRate,
}

impl IntlMailType {
    pub fn label(self) -> &'static str {
        match self {
            IntlMailType::Letter => "LETTER",
            IntlMailType::LargeEnvelope => "LARGEENVELOPE",
            IntlMailType::Envelope => "ENVELOPE",
            IntlMailType::Package => "PACKAGE",
            IntlMailType::Postcards => "POSTCARDS",
            IntlMailType::FlatRate => "FLATRATE",
        }
    }

    pub fn carries_dimensions(self) -> bool {
        !matches!(
            self,
            IntlMailType::Letter | IntlMailType::LargeEnvelope | IntlMailType::Postcards
        )
    }
}

impl fmt::Display for IntlMailType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

struct IntlRule {
    package_type: PackageType,
    limit: WeightLimit,
    mail_types: &'static [IntlMailType],
}

// The first row matching both package type and weight wins.
const INTL_RULES: &[IntlRule] = &[
    IntlRule {
        package_type: PackageType::Letter,
        limit: WeightLimit::Letter,
        mail_types: &[IntlMailType::Letter],
    },
    IntlRule {
        package_type: PackageType::LargeEnvelope,
        limit: WeightLimit::IntlEnvelope,
        mail_types: &[IntlMailType::LargeEnvelope, IntlMailType::Envelope],
    },
    IntlRule {
        package_type: PackageType::Package,
        limit: WeightLimit::IntlEnvelope,
        mail_types: &[IntlMailType::Package],
    },
    IntlRule {
        package_type: PackageType::Postcard,
        limit: WeightLimit::Letter,
        mail_types: &[IntlMailType::Postcards],
    },
    IntlRule {
        package_type: PackageType::All,
        limit: WeightLimit::Letter,
        mail_types: &[
            IntlMailType::Letter,
            IntlMailType::Postcards,
            IntlMailType::Package,
            IntlMailType::LargeEnvelope,
        ],
    },
    IntlRule {
        package_type: PackageType::All,
        limit: WeightLimit::Any,
        mail_types: &[IntlMailType::Package, IntlMailType::LargeEnvelope],
    },
    IntlRule {
        package_type: PackageType::FlatRate,
        limit: WeightLimit::Any,
        mail_types: &[IntlMailType::FlatRate],
    },
];

/// Expands an international query into the mail types to request.
pub fn expand_intl(spec: &PackageSpec) -> Expansion<IntlMailType> {
    let mail_types = INTL_RULES
        .iter()
        .find(|rule| rule.package_type == spec.package_type && rule.limit.admits(spec))
        .map(|rule| rule.mail_types.to_vec())
        .unwrap_or_default();

    debug!(
        package_type = %spec.package_type,
        count = mail_types.len(),
        "expanded international query"
    );
    mail_types.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use test_case::test_case;

    fn spec(service_type: ServiceType, package_type: PackageType, pounds: f64, ounces: f64) -> PackageSpec {
        PackageSpec {
            pounds,
            ounces,
            service_type,
            package_type,
            ..PackageSpec::default()
        }
    }

    fn keys(expansion: &Expansion<RateRequestDescriptor>) -> Vec<DescriptorKey> {
        expansion.requests().iter().map(|d| d.key()).collect()
    }

    #[test_case(ServiceType::Priority, PackageType::FlatRate, 0.0, 2.0, 18; "priority flat rate")]
    #[test_case(ServiceType::Priority, PackageType::All, 2.0, 0.0, 18; "priority all types")]
    #[test_case(ServiceType::Priority, PackageType::Package, 2.0, 0.0, 2; "priority variable")]
    #[test_case(ServiceType::All, PackageType::All, 0.0, 2.0, 25; "everything at letter weight")]
    #[test_case(ServiceType::All, PackageType::All, 0.0, 10.0, 23; "everything at flat weight")]
    #[test_case(ServiceType::All, PackageType::All, 3.0, 0.0, 21; "everything too heavy for first class")]
    #[test_case(ServiceType::All, PackageType::Package, 0.0, 5.0, 6; "all services for a package")]
    #[test_case(ServiceType::FirstClass, PackageType::All, 0.0, 2.0, 4; "first class all types")]
    #[test_case(ServiceType::FirstClass, PackageType::FlatRate, 0.0, 2.0, 0; "first class flat rate")]
    #[test_case(ServiceType::Priority, PackageType::Postcard, 0.0, 1.0, 1; "postcard forces first class")]
    #[test_case(ServiceType::Named("Media Mail".to_string()), PackageType::Package, 0.0, 1.0, 0; "named service")]
    fn test_descriptor_counts(
        service_type: ServiceType,
        package_type: PackageType,
        pounds: f64,
        ounces: f64,
        expected: usize,
    ) {
        let expansion = expand(&spec(service_type, package_type, pounds, ounces));
        assert_eq!(expansion.len(), expected);
    }

    #[test]
    fn test_everything_at_two_ounces() {
        let expansion = expand(&spec(ServiceType::All, PackageType::All, 0.0, 2.0));
        let keys = keys(&expansion);

        let unique: HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len(), "duplicate descriptors: {keys:?}");

        let first_class: Vec<_> = keys
            .iter()
            .filter_map(|(service, _, mail_type)| {
                (*service == DomesticService::FirstClass).then_some(*mail_type)
            })
            .collect();
        assert_eq!(
            first_class,
            vec![
                Some(FirstClassMailType::Letter),
                Some(FirstClassMailType::Flat),
                Some(FirstClassMailType::Postcard),
                Some(FirstClassMailType::PackageServiceRetail),
            ]
        );

        for service in [DomesticService::Priority, DomesticService::PriorityMailExpress] {
            let containers: Vec<_> = keys
                .iter()
                .filter(|(s, _, _)| *s == service)
                .map(|(_, container, _)| *container)
                .collect();
            let expected: Vec<_> = FlatRateContainer::ALL.into_iter().map(Container::FlatRate).collect();
            assert_eq!(containers, expected);
        }

        for service in [
            DomesticService::RetailGround,
            DomesticService::ParcelSelectGround,
            DomesticService::Media,
        ] {
            assert!(keys.contains(&(service, Container::Variable, None)));
        }
    }

    #[test]
    fn test_priority_flat_rate_uses_every_container_per_service() {
        let expansion = expand(&spec(ServiceType::Priority, PackageType::FlatRate, 0.0, 8.0));
        let unique: HashSet<_> = keys(&expansion).into_iter().collect();
        assert_eq!(unique.len(), 18);
        assert!(expansion
            .requests()
            .iter()
            .all(|d| d.machinable.is_none() && matches!(d.container, Container::FlatRate(_))));
    }

    #[test]
    fn test_no_letters_above_letter_weight() {
        for tenths in 36..=160 {
            let ounces = f64::from(tenths) / 10.0;
            for package_type in PackageType::VARIANTS {
                for service_type in ServiceType::VARIANTS {
                    let s = spec(service_type, package_type, 0.0, ounces);
                    assert!(expand(&s)
                        .requests()
                        .iter()
                        .all(|d| d.first_class_mail_type != Some(FirstClassMailType::Letter)));
                    assert!(!expand_intl(&s).requests().contains(&IntlMailType::Letter));
                }
            }
        }
    }

    #[test]
    fn test_heavy_letter_has_no_valid_combination() {
        let expansion = expand(&spec(ServiceType::All, PackageType::Letter, 0.0, 10.0));
        // Priority and ground services still price a heavy letter.
        assert_eq!(expansion.len(), 5);
        assert!(expansion
            .requests()
            .iter()
            .all(|d| d.service != DomesticService::FirstClass));

        let expansion = expand(&spec(ServiceType::FirstClass, PackageType::Letter, 0.0, 10.0));
        assert_eq!(expansion, Expansion::NoValidCombination);
    }

    #[test]
    fn test_letter_mail_omits_dimensions_and_keeps_machinable() {
        let mut s = spec(ServiceType::FirstClass, PackageType::Letter, 0.0, 1.0);
        s.machinable = false;
        let expansion = expand(&s);
        let letter = &expansion.requests()[0];
        assert_eq!(letter.first_class_mail_type, Some(FirstClassMailType::Letter));
        assert_eq!(letter.dimensions, None);
        assert_eq!(letter.machinable, Some(false));
    }

    #[test]
    fn test_dimensions_follow_underlying_type() {
        let expansion = expand(&spec(ServiceType::All, PackageType::All, 0.0, 2.0));
        for d in expansion.requests() {
            let expect_dims = !matches!(
                d.first_class_mail_type,
                Some(FirstClassMailType::Letter | FirstClassMailType::Postcard | FirstClassMailType::Flat)
            );
            assert_eq!(d.dimensions.is_some(), expect_dims, "{d}");
        }

        let expansion = expand(&spec(ServiceType::Priority, PackageType::LargeEnvelope, 0.0, 2.0));
        assert!(expansion.requests().iter().all(|d| d.dimensions.is_none()));
    }

    #[test_case(PackageType::Letter, 0.0, 3.0, vec![IntlMailType::Letter]; "light letter")]
    #[test_case(PackageType::Letter, 0.0, 4.0, vec![]; "heavy letter")]
    #[test_case(PackageType::LargeEnvelope, 0.0, 16.0, vec![IntlMailType::LargeEnvelope, IntlMailType::Envelope]; "large envelope")]
    #[test_case(PackageType::LargeEnvelope, 1.0, 0.0, vec![]; "heavy large envelope")]
    #[test_case(PackageType::Package, 0.0, 12.0, vec![IntlMailType::Package]; "small package")]
    #[test_case(PackageType::Postcard, 0.0, 1.0, vec![IntlMailType::Postcards]; "postcard")]
    #[test_case(PackageType::All, 0.0, 2.0, vec![IntlMailType::Letter, IntlMailType::Postcards, IntlMailType::Package, IntlMailType::LargeEnvelope]; "all light")]
    #[test_case(PackageType::All, 4.0, 0.0, vec![IntlMailType::Package, IntlMailType::LargeEnvelope]; "all heavy")]
    #[test_case(PackageType::FlatRate, 20.0, 0.0, vec![IntlMailType::FlatRate]; "flat rate ignores weight")]
    fn test_intl_mail_types(package_type: PackageType, pounds: f64, ounces: f64, expected: Vec<IntlMailType>) {
        let expansion = expand_intl(&spec(ServiceType::All, package_type, pounds, ounces));
        assert_eq!(expansion, Expansion::from(expected));
    }

    #[test]
    fn test_intl_dimension_exemptions() {
        assert!(!IntlMailType::Letter.carries_dimensions());
        assert!(!IntlMailType::LargeEnvelope.carries_dimensions());
        assert!(!IntlMailType::Postcards.carries_dimensions());
        assert!(IntlMailType::Envelope.carries_dimensions());
        assert!(IntlMailType::Package.carries_dimensions());
        assert!(IntlMailType::FlatRate.carries_dimensions());
    }
}
