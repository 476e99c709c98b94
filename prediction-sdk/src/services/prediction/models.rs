//! Request, wire and canonical types for the prediction service
//!
//! Wire types decode permissively (every field optional) and stay private to
//! the crate; callers only ever see the canonical types produced by the
//! normalizer.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::mapping::{decode_json, DecodedPayload};
use crate::error::{Result, ServiceError};

/// The remote operations the client knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    PassingChance,
    PassingMark,
    Clustering,
    Trigger,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::PassingChance,
        OperationKind::PassingMark,
        OperationKind::Clustering,
        OperationKind::Trigger,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::PassingChance => "passing_chance",
            OperationKind::PassingMark => "passing_mark",
            OperationKind::Clustering => "clustering",
            OperationKind::Trigger => "trigger",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            OperationKind::PassingChance => "/api/v1/predictions/passing-chance",
            OperationKind::PassingMark => "/api/v1/predictions/passing-mark",
            OperationKind::Clustering => "/api/v1/clustering/recommend",
            OperationKind::Trigger => "/api/v1/predictions/trigger",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connectivity probe endpoint
pub const HEALTH_PATH: &str = "/api/v1/predictions/test";

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Feature vectors per subject name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassingChanceRequest {
    pub subjects: BTreeMap<String, Vec<f64>>,
}

impl PassingChanceRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subject(mut self, name: impl Into<String>, features: Vec<f64>) -> Self {
        self.subjects.insert(name.into(), features);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassingMarkRequest {
    pub subject: String,
    pub features: Vec<f64>,
}

/// Study programmes are identified by number on the current API and by code on older ones
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StudyProgramId {
    Number(i64),
    Code(String),
}

impl fmt::Display for StudyProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StudyProgramId::Number(n) => write!(f, "{}", n),
            StudyProgramId::Code(code) => f.write_str(code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusteringMethod {
    Cluster,
    Distance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringRequest {
    #[serde(rename = "subjectIds", default, skip_serializing_if = "Vec::is_empty")]
    pub subject_ids: Vec<i64>,

    #[serde(rename = "studyProgramId")]
    pub study_program_id: StudyProgramId,

    #[serde(rename = "maxRecommendations", skip_serializing_if = "Option::is_none")]
    pub max_recommendations: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<ClusteringMethod>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_clusters: Option<u32>,

    /// Raw focus vectors accepted by older service versions
    #[serde(rename = "focusVectors", skip_serializing_if = "Option::is_none")]
    pub focus_vectors: Option<Vec<Vec<f64>>>,
}

impl ClusteringRequest {
    pub fn for_subjects(study_program_id: StudyProgramId, subject_ids: Vec<i64>) -> Self {
        Self {
            subject_ids,
            study_program_id,
            max_recommendations: None,
            method: None,
            n_clusters: None,
            focus_vectors: None,
        }
    }

    pub fn max_recommendations(mut self, max: u32) -> Self {
        self.max_recommendations = Some(max);
        self
    }

    pub fn method(mut self, method: ClusteringMethod) -> Self {
        self.method = Some(method);
        self
    }
}

// ---------------------------------------------------------------------------
// Wire responses
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ChanceWire {
    pub results: Option<HashMap<String, ChanceEntryWire>>,
}

/// Either a prediction or a per-subject error object
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChanceEntryWire {
    pub probability: Option<f64>,
    pub percentage: Option<String>,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl DecodedPayload for ChanceWire {
    fn decode(body: &str) -> Result<Self> {
        let wire: ChanceWire = decode_json(body)?;
        if wire.results.is_none() {
            return Err(ServiceError::parsing("passing-chance response has no results"));
        }
        Ok(wire)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MarkWire {
    pub subject: Option<String>,
    pub distribution: Option<BTreeMap<String, f64>>,
    pub chosen_grade: Option<String>,
}

impl DecodedPayload for MarkWire {
    fn decode(body: &str) -> Result<Self> {
        let wire: MarkWire = decode_json(body)?;
        match wire.subject.as_deref() {
            Some(subject) if !subject.trim().is_empty() => Ok(wire),
            _ => Err(ServiceError::parsing("passing-mark response has no subject")),
        }
    }
}

/// Union of the legacy and current clustering contracts
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ClusteringWire {
    #[serde(rename = "studyProgramId")]
    pub study_program_id: Option<StudyProgramId>,
    pub method: Option<String>,
    #[serde(rename = "selectedSubjects")]
    pub selected_subjects: Option<Vec<SelectedSubjectWire>>,
    pub centroid: Option<Vec<f64>>,
    #[serde(rename = "selectedClusters")]
    pub selected_clusters: Option<Vec<i64>>,
    pub recommendations: Option<Vec<RecommendationWire>>,

    // legacy contract
    pub offset_applied: Option<i64>,
    pub cluster_indices: Option<Vec<i64>>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SelectedSubjectWire {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub code: Option<String>,
    pub cluster_label: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RecommendationWire {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub code: Option<String>,
    pub abbreviation: Option<String>,
    pub cluster_label: Option<i64>,
    pub distance: Option<f64>,
    pub similarity_score: Option<f64>,
}

impl DecodedPayload for ClusteringWire {
    fn decode(body: &str) -> Result<Self> {
        let wire: ClusteringWire = decode_json(body)?;
        let recognised = wire.cluster_indices.is_some()
            || wire.selected_clusters.is_some()
            || wire.recommendations.is_some();
        if !recognised {
            return Err(ServiceError::parsing(
                "clustering response matches neither the legacy nor the current schema",
            ));
        }
        Ok(wire)
    }
}

/// Trigger and probe replies: any success body is accepted
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Acknowledgement {
    pub body: String,
}

impl DecodedPayload for Acknowledgement {
    fn decode(body: &str) -> Result<Self> {
        Ok(Self { body: body.to_string() })
    }
}

// ---------------------------------------------------------------------------
// Canonical results
// ---------------------------------------------------------------------------

/// Passing chance per subject; empty when no predictions are available
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassingChance {
    pub subjects: BTreeMap<String, SubjectChance>,
}

impl PassingChance {
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    pub fn get(&self, subject: &str) -> Option<&SubjectChance> {
        self.subjects.get(subject)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubjectChance {
    Available {
        /// 0.0..=1.0
        probability: f64,
        /// e.g. "42.00%"
        label: String,
    },
    /// The service could not predict this subject (e.g. no model for it)
    Unavailable {
        /// Per-subject status reported by the service (422 bad input, 500 model failure)
        http_status: Option<u16>,
        code: Option<String>,
        message: Option<String>,
    },
}

/// Predicted grade distribution for one subject
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassingMark {
    pub subject: Option<String>,
    pub chosen_grade: Option<String>,
    pub distribution: BTreeMap<String, f64>,
}

/// Which wire contract a clustering answer arrived in; informational only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchemaVersion {
    Legacy,
    Current,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedSubject {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub code: Option<String>,
    pub cluster_label: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub code: Option<String>,
    pub abbreviation: Option<String>,
    pub cluster_label: Option<i64>,
    pub distance: Option<f64>,
    pub similarity: Option<f64>,
}

/// A clustering answer from the service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusteringRecommendation {
    pub study_program_id: Option<StudyProgramId>,
    pub method: Option<String>,
    pub cluster_indices: Vec<i64>,
    pub selected_subjects: Vec<SelectedSubject>,
    pub recommendations: Vec<Recommendation>,
    pub centroid: Vec<f64>,
    pub schema: SchemaVersion,
}

impl ClusteringRecommendation {
    pub fn is_empty(&self) -> bool {
        self.cluster_indices.is_empty() && self.recommendations.is_empty()
    }
}

/// Why a canonical result came from the fallback provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackCause {
    /// Rejected locally by the circuit breaker
    CircuitOpen,
    /// Transient failures exhausted the retry budget
    RemoteUnavailable,
    /// The service refused the request (4xx) or it could not be sent
    RequestRejected,
    /// The service answered with a body that could not be decoded
    BadResponse,
    /// The caller cancelled or its deadline passed
    Cancelled,
}

impl FallbackCause {
    pub fn from_error(err: &ServiceError) -> Self {
        if err.is_circuit_open() {
            FallbackCause::CircuitOpen
        } else if err.is_cancelled() {
            FallbackCause::Cancelled
        } else if err.is_retryable() {
            FallbackCause::RemoteUnavailable
        } else if matches!(err.root(), ServiceError::Parsing(_)) {
            FallbackCause::BadResponse
        } else {
            FallbackCause::RequestRejected
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackCause::CircuitOpen => "circuit_open",
            FallbackCause::RemoteUnavailable => "remote_unavailable",
            FallbackCause::RequestRejected => "request_rejected",
            FallbackCause::BadResponse => "bad_response",
            FallbackCause::Cancelled => "cancelled",
        }
    }
}

/// Result of a clustering call; "nothing similar found" and "could not ask"
/// are different variants
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClusteringOutcome {
    /// The service answered with clusters or recommendations
    Recommended(ClusteringRecommendation),
    /// The service answered but found nothing similar
    NothingFound(ClusteringRecommendation),
    /// The service could not be asked; there are no recommendations
    Unavailable { cause: FallbackCause },
}

impl ClusteringOutcome {
    pub fn from_answer(answer: ClusteringRecommendation) -> Self {
        if answer.is_empty() {
            ClusteringOutcome::NothingFound(answer)
        } else {
            ClusteringOutcome::Recommended(answer)
        }
    }

    /// Recommendations, empty unless the service recommended something
    pub fn recommendations(&self) -> &[Recommendation] {
        match self {
            ClusteringOutcome::Recommended(answer) | ClusteringOutcome::NothingFound(answer) => {
                &answer.recommendations
            }
            ClusteringOutcome::Unavailable { .. } => &[],
        }
    }

    pub fn cluster_indices(&self) -> &[i64] {
        match self {
            ClusteringOutcome::Recommended(answer) | ClusteringOutcome::NothingFound(answer) => {
                &answer.cluster_indices
            }
            ClusteringOutcome::Unavailable { .. } => &[],
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, ClusteringOutcome::Unavailable { .. })
    }
}

/// A canonical result and where it came from
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction<T> {
    /// Normalized from a successful remote answer
    Live(T),
    /// Supplied by the fallback provider
    Fallback { value: T, cause: FallbackCause },
}

impl<T> Prediction<T> {
    pub fn value(&self) -> &T {
        match self {
            Prediction::Live(value) | Prediction::Fallback { value, .. } => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Prediction::Live(value) | Prediction::Fallback { value, .. } => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Prediction::Fallback { .. })
    }

    pub fn cause(&self) -> Option<FallbackCause> {
        match self {
            Prediction::Live(_) => None,
            Prediction::Fallback { cause, .. } => Some(*cause),
        }
    }
}
