// Price service: one query cycle. Expands the package, builds the upstream
// batches, issues them concurrently and maps every package back to a result.

use crate::client::{ApiError, RateApi};
use crate::expander::{expand, expand_intl, Expansion};
use crate::normalizer::{
    domestic_lines, international_lines, PackageOutcome, PackageResult, ServiceFilter,
};
use crate::package::{InvalidPackage, PackageSpec};
use crate::request::{RequestBuilder, WireRequest};
use crate::xml_response::{ProcessingError, RateResponse};
use futures::future::join_all;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum PriceError {
    #[error("Invalid package: {0}")]
    InvalidPackage(#[from] InvalidPackage),

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] ApiError),

    #[error("Request building failed: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Every package was rejected upstream: {0}")]
    AllPackagesFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PriceQuery {
    Domestic {
        zip_origination: String,
        zip_destination: String,
        spec: PackageSpec,
    },
    International {
        country: String,
        spec: PackageSpec,
    },
}

impl PriceQuery {
    pub fn spec(&self) -> &PackageSpec {
        match self {
            PriceQuery::Domestic { spec, .. } | PriceQuery::International { spec, .. } => spec,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PriceOutcome {
    /// Nothing was eligible; no upstream request was made.
    NoValidCombination,
    /// One entry per expanded package, in expansion order.
    Packages(Vec<PackageOutcome>),
}

pub struct PriceService<A> {
    api: A,
    builder: RequestBuilder,
}

impl<A: RateApi> PriceService<A> {
    pub fn new(api: A, builder: RequestBuilder) -> Self {
        Self { api, builder }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn builder(&self) -> &RequestBuilder {
        &self.builder
    }

    pub async fn quote(&self, query: &PriceQuery) -> Result<PriceOutcome, PriceError> {
        query.spec().validate()?;

        match query {
            PriceQuery::Domestic {
                zip_origination,
                zip_destination,
                spec,
            } => {
                let Expansion::Requests(descriptors) = expand(spec) else {
                    info!(%zip_origination, %zip_destination, "no valid domestic combination");
                    return Ok(PriceOutcome::NoValidCombination);
                };
                let requests =
                    self.builder
                        .build_domestic(&descriptors, zip_origination, zip_destination, spec)?;
                let labels: Vec<String> = descriptors.iter().map(ToString::to_string).collect();

                let responses = self.dispatch(&requests).await?;
                let outcomes = collect_outcomes(&requests, responses, &labels, |response| match response {
                    RateResponse::Domestic(doc) => Ok(doc
                        .packages
                        .iter()
                        .map(|p| (p.id.clone(), domestic_lines(p)))
                        .collect()),
                    _ => Err(ProcessingError::UnexpectedRoot("international response".to_string())),
                })?;
                info!(%zip_origination, %zip_destination, packages = outcomes.len(), "domestic quote complete");
                packages_or_failure(outcomes)
            }
            PriceQuery::International { country, spec } => {
                let Expansion::Requests(mail_types) = expand_intl(spec) else {
                    info!(%country, "no valid international combination");
                    return Ok(PriceOutcome::NoValidCombination);
                };
                let requests = self.builder.build_international(&mail_types, country, spec)?;
                let labels: Vec<String> = mail_types.iter().map(ToString::to_string).collect();
                let filter = ServiceFilter::for_service(&spec.service_type);

                let responses = self.dispatch(&requests).await?;
                let outcomes = collect_outcomes(&requests, responses, &labels, |response| match response {
                    RateResponse::International(doc) => Ok(doc
                        .packages
                        .iter()
                        .map(|p| (p.id.clone(), international_lines(p, filter.as_ref())))
                        .collect()),
                    _ => Err(ProcessingError::UnexpectedRoot("domestic response".to_string())),
                })?;
                info!(%country, packages = outcomes.len(), "international quote complete");
                packages_or_failure(outcomes)
            }
        }
    }

    // All batches are in flight together; results come back in request order.
    async fn dispatch(&self, requests: &[WireRequest]) -> Result<Vec<RateResponse>, PriceError> {
        let results = join_all(requests.iter().map(|request| self.api.fetch(request))).await;

        results
            .into_iter()
            .zip(requests)
            .map(|(result, request)| {
                result.map_err(|e| {
                    error!(api = %request.api, xml = %request.xml, error = %e, "rate request failed");
                    PriceError::Upstream(e)
                })
            })
            .collect()
    }
}

// A query where no package priced is a failed query, not a list of errors.
fn packages_or_failure(outcomes: Vec<PackageOutcome>) -> Result<PriceOutcome, PriceError> {
    let errors: Vec<&str> = outcomes
        .iter()
        .filter_map(|outcome| match &outcome.result {
            PackageResult::Error(message) => Some(message.as_str()),
            PackageResult::Quotes(_) => None,
        })
        .collect();

    if !outcomes.is_empty() && errors.len() == outcomes.len() {
        for (outcome, message) in outcomes.iter().zip(&errors) {
            warn!(package = %outcome.id, request = %outcome.request, error = %message, "package rejected");
        }
        return Err(PriceError::AllPackagesFailed(errors[0].to_string()));
    }
    Ok(PriceOutcome::Packages(outcomes))
}

fn collect_outcomes(
    requests: &[WireRequest],
    responses: Vec<RateResponse>,
    labels: &[String],
    mut package_results: impl FnMut(&RateResponse) -> Result<HashMap<String, PackageResult>, ProcessingError>,
) -> Result<Vec<PackageOutcome>, PriceError> {
    let mut outcomes = Vec::new();

    for (request, response) in requests.iter().zip(responses) {
        let mut results = match &response {
            // A rejected document fails every package of its batch.
            RateResponse::Error(err) => request
                .package_ids
                .iter()
                .map(|id| (id.clone(), PackageResult::Error(err.description.clone())))
                .collect(),
            document => package_results(document).map_err(ApiError::from)?,
        };

        for id in &request.package_ids {
            let result = results.remove(id).unwrap_or_else(|| {
                warn!(package = %id, "package missing from rate response");
                PackageResult::Error("No rate returned for this package".to_string())
            });
            let label = id
                .parse::<usize>()
                .ok()
                .and_then(|index| labels.get(index))
                .cloned()
                .unwrap_or_default();
            outcomes.push(PackageOutcome {
                id: id.clone(),
                request: label,
                result,
            });
        }
    }

    Ok(outcomes)
}
