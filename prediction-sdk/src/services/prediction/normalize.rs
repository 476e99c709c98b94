//! Schema normalization
//!
//! Turns decoded wire payloads into canonical results. Clustering answers
//! may arrive in the legacy flat shape or the current structured one; both
//! end up as the same [`ClusteringRecommendation`].

use std::collections::BTreeSet;

use tracing::debug;

use super::models::{
    Acknowledgement, ChanceEntryWire, ChanceWire, ClusteringRecommendation, ClusteringWire, MarkWire,
    PassingChance, PassingMark, Recommendation, RecommendationWire, SchemaVersion, SelectedSubject,
    SelectedSubjectWire, SubjectChance,
};

/// Conversion of a decoded payload into its canonical shape. Never fails:
/// required fields were checked when the payload was decoded.
pub trait Normalize {
    type Canonical;

    fn normalize(self) -> Self::Canonical;
}

impl Normalize for ChanceWire {
    type Canonical = PassingChance;

    fn normalize(self) -> PassingChance {
        let subjects = self
            .results
            .unwrap_or_default()
            .into_iter()
            .map(|(subject, entry)| (subject, entry.normalize()))
            .collect();
        PassingChance { subjects }
    }
}

impl Normalize for ChanceEntryWire {
    type Canonical = SubjectChance;

    fn normalize(self) -> SubjectChance {
        match self.probability {
            Some(probability) if self.error.is_none() => {
                let label = self
                    .percentage
                    .unwrap_or_else(|| format!("{:.2}%", probability * 100.0));
                SubjectChance::Available { probability, label }
            }
            _ => SubjectChance::Unavailable {
                http_status: self.status,
                code: self.error,
                message: self.message,
            },
        }
    }
}

impl Normalize for MarkWire {
    type Canonical = PassingMark;

    fn normalize(self) -> PassingMark {
        PassingMark {
            subject: self.subject,
            chosen_grade: self.chosen_grade,
            distribution: self.distribution.unwrap_or_default(),
        }
    }
}

impl Normalize for ClusteringWire {
    type Canonical = ClusteringRecommendation;

    fn normalize(self) -> ClusteringRecommendation {
        let recommendations: Vec<Recommendation> = self
            .recommendations
            .unwrap_or_default()
            .into_iter()
            .map(RecommendationWire::into_canonical)
            .collect();

        // Legacy indices win only when present and non-null
        let (cluster_indices, schema) = match self.cluster_indices {
            Some(indices) => {
                if let Some(offset) = self.offset_applied {
                    debug!(offset, "legacy clustering answer carries an index offset");
                }
                (indices, SchemaVersion::Legacy)
            }
            None => {
                let indices = self
                    .selected_clusters
                    .unwrap_or_else(|| labels_of(&recommendations));
                (indices, SchemaVersion::Current)
            }
        };

        ClusteringRecommendation {
            study_program_id: self.study_program_id,
            method: self.method,
            cluster_indices,
            selected_subjects: self
                .selected_subjects
                .unwrap_or_default()
                .into_iter()
                .map(SelectedSubjectWire::into_canonical)
                .collect(),
            recommendations,
            centroid: self.centroid.unwrap_or_default(),
            schema,
        }
    }
}

impl Normalize for Acknowledgement {
    type Canonical = ();

    fn normalize(self) {}
}

/// Distinct cluster labels of the recommendations, in first-seen order
fn labels_of(recommendations: &[Recommendation]) -> Vec<i64> {
    let mut seen = BTreeSet::new();
    recommendations
        .iter()
        .filter_map(|r| r.cluster_label)
        .filter(|label| seen.insert(*label))
        .collect()
}

impl RecommendationWire {
    fn into_canonical(self) -> Recommendation {
        Recommendation {
            id: self.id,
            name: self.name,
            code: self.code,
            abbreviation: self.abbreviation,
            cluster_label: self.cluster_label,
            distance: self.distance,
            similarity: self.similarity_score,
        }
    }
}

impl SelectedSubjectWire {
    fn into_canonical(self) -> SelectedSubject {
        SelectedSubject {
            id: self.id,
            name: self.name,
            code: self.code,
            cluster_label: self.cluster_label,
        }
    }
}
