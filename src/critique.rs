//! Critique collaborator interface
//!
//! The reasoning service that turns visual and textual signals into
//! structured findings is an external collaborator: the pipeline treats it as
//! an opaque call with its own timeout and error semantics, and tolerates
//! empty or malformed output downstream in the composer.

use crate::report::Findings;
use crate::{CaptureResult, Result};
use std::future::Future;

/// Evidence handed to the critique service for one job
#[derive(Debug)]
pub struct CritiqueRequest<'a> {
    pub url: &'a str,
    pub notes: Option<&'a str>,
    pub desktop: &'a CaptureResult,
    pub mobile: &'a CaptureResult,
    pub mobile_menu: Option<&'a CaptureResult>,
}

/// Contract for the external reasoning service. Errors propagate unchanged;
/// retry policy, if any, belongs to the caller's orchestration layer.
pub trait CritiqueService {
    fn critique(
        &self,
        request: CritiqueRequest<'_>,
    ) -> impl Future<Output = Result<Findings>> + Send;
}

/// Stub for runs without a reasoning backend: returns empty findings, which
/// the composer renders as explicit placeholder content.
#[derive(Debug, Default)]
pub struct NullCritique;

impl CritiqueService for NullCritique {
    fn critique(
        &self,
        _request: CritiqueRequest<'_>,
    ) -> impl Future<Output = Result<Findings>> + Send {
        async { Ok(Findings::default()) }
    }
}
