use crate::{
    capability::{Capabilities, Feature},
    physical::{Candidate, DeviceKind, DeviceProperties},
    surface::Surface,
};
use smallvec::SmallVec;
use std::{
    fmt::{self, Debug},
    sync::Arc,
};

/// Outcome of evaluating one requirement against one candidate.
///
/// There is no partial state: a candidate is either rejected outright or
/// contributes a finite weight to the total score. Weights may be negative,
/// a penalty that still allows selection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Score {
    Rejected,
    Accepted(f32),
}

impl Score {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Score::Rejected)
    }
}

type FeaturePredicate = Arc<dyn Fn(&Capabilities) -> bool + Send + Sync>;
type PropertyPredicate = Arc<dyn Fn(&DeviceProperties) -> bool + Send + Sync>;
type FilterFn = Arc<dyn Fn(&Candidate) -> Score + Send + Sync>;

/// One criterion of a selection run.
///
/// A requirement without a failure weight is critical: a candidate failing
/// it is rejected. Giving it a failure weight (possibly zero or negative)
/// turns it into a preference that merely shifts the candidate's score.
///
/// Evaluation is deterministic for a given candidate and has no observable
/// side effects.
#[derive(Clone)]
pub enum Requirement {
    /// Device extension, matched by name against the candidate's set.
    Extension {
        name: String,
        on_success: f32,
        on_failure: Option<f32>,
    },

    /// Predicate over the queried capability set. `features` lists what the
    /// predicate reads; accepted requirements with positive weight get
    /// those features enabled on the built device.
    Feature {
        features: SmallVec<[Feature; 2]>,
        predicate: FeaturePredicate,
        on_success: f32,
        on_failure: Option<f32>,
    },

    /// Predicate over device properties and limits. Binary: accept with
    /// weight zero or reject.
    Property { predicate: PropertyPredicate },

    /// Escape hatch for checks that need side queries against the adapter,
    /// e.g. presentation-surface compatibility.
    Filter { filter: FilterFn },
}

impl Requirement {
    /// Critical extension requirement with weight zero.
    pub fn extension(name: impl Into<String>) -> Self {
        Requirement::Extension {
            name: name.into(),
            on_success: 0.0,
            on_failure: None,
        }
    }

    /// Critical requirement for a single feature.
    pub fn feature(feature: Feature) -> Self {
        Requirement::Feature {
            features: SmallVec::from_slice(&[feature]),
            predicate: Arc::new(move |caps| caps.supports(feature)),
            on_success: 0.0,
            on_failure: None,
        }
    }

    /// Critical requirement over several capability fields at once.
    /// `features` must list every feature the predicate reads.
    pub fn feature_predicate(
        features: &[Feature],
        predicate: impl Fn(&Capabilities) -> bool + Send + Sync + 'static,
    ) -> Self {
        Requirement::Feature {
            features: SmallVec::from_slice(features),
            predicate: Arc::new(predicate),
            on_success: 0.0,
            on_failure: None,
        }
    }

    pub fn property(
        predicate: impl Fn(&DeviceProperties) -> bool + Send + Sync + 'static,
    ) -> Self {
        Requirement::Property {
            predicate: Arc::new(predicate),
        }
    }

    pub fn filter(
        filter: impl Fn(&Candidate) -> Score + Send + Sync + 'static,
    ) -> Self {
        Requirement::Filter {
            filter: Arc::new(filter),
        }
    }

    /// Anisotropic filtering with at least `min` maximum anisotropy.
    pub fn anisotropy(min: f32) -> Self {
        Requirement::property(move |props| props.max_sampler_anisotropy >= min)
    }

    /// Rewards discrete hardware without rejecting anything else.
    pub fn prefer_discrete(weight: f32) -> Self {
        Requirement::filter(move |candidate| {
            match candidate.properties().kind {
                Some(DeviceKind::Discrete) => Score::Accepted(weight),
                _ => Score::Accepted(0.0),
            }
        })
    }

    /// Rejects candidates with no queue family able to present to
    /// `surface`. Folding this into selection keeps an unusable candidate
    /// from winning and failing later at queue resolution.
    pub fn presentation(surface: &Surface) -> Self {
        let surface = surface.clone();
        Requirement::filter(move |candidate| {
            for family in 0..candidate.families().len() {
                match candidate.supports_presentation(family, &surface) {
                    Ok(true) => return Score::Accepted(0.0),
                    Ok(false) => {}
                    Err(error) => {
                        tracing::warn!(%error, "presentation query failed");
                        return Score::Rejected;
                    }
                }
            }
            Score::Rejected
        })
    }

    /// Sets the weight contributed when the requirement is met.
    /// Meaningful for extension and feature requirements.
    pub fn weighted(mut self, weight: f32) -> Self {
        debug_assert!(weight.is_finite());
        match &mut self {
            Requirement::Extension { on_success, .. }
            | Requirement::Feature { on_success, .. } => *on_success = weight,
            Requirement::Property { .. } | Requirement::Filter { .. } => {}
        }
        self
    }

    /// Makes the requirement non-critical: failing it contributes
    /// `weight` instead of rejecting the candidate.
    pub fn optional(mut self, weight: f32) -> Self {
        debug_assert!(weight.is_finite());
        match &mut self {
            Requirement::Extension { on_failure, .. }
            | Requirement::Feature { on_failure, .. } => {
                *on_failure = Some(weight)
            }
            Requirement::Property { .. } | Requirement::Filter { .. } => {}
        }
        self
    }

    pub fn evaluate(&self, candidate: &Candidate) -> Score {
        match self {
            Requirement::Extension {
                name,
                on_success,
                on_failure,
            } => {
                if candidate.has_extension(name) {
                    Score::Accepted(*on_success)
                } else {
                    fail(*on_failure)
                }
            }
            Requirement::Feature {
                predicate,
                on_success,
                on_failure,
                ..
            } => {
                if predicate(candidate.capabilities()) {
                    Score::Accepted(*on_success)
                } else {
                    fail(*on_failure)
                }
            }
            Requirement::Property { predicate } => {
                if predicate(candidate.properties()) {
                    Score::Accepted(0.0)
                } else {
                    Score::Rejected
                }
            }
            Requirement::Filter { filter } => filter(candidate),
        }
    }

    /// Extension switched on for the built device when this requirement
    /// scored a positive weight and the candidate reports it.
    pub(crate) fn granted_extension(&self) -> Option<&str> {
        match self {
            Requirement::Extension { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Features switched on for the built device when this requirement
    /// scored a positive weight, where the candidate reports them.
    pub(crate) fn granted_features(&self) -> &[Feature] {
        match self {
            Requirement::Feature { features, .. } => features,
            _ => &[],
        }
    }
}

fn fail(on_failure: Option<f32>) -> Score {
    match on_failure {
        Some(weight) => Score::Accepted(weight),
        None => Score::Rejected,
    }
}

impl Debug for Requirement {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Extension {
                name,
                on_success,
                on_failure,
            } => fmt
                .debug_struct("Extension")
                .field("name", name)
                .field("on_success", on_success)
                .field("on_failure", on_failure)
                .finish(),
            Requirement::Feature {
                features,
                on_success,
                on_failure,
                ..
            } => fmt
                .debug_struct("Feature")
                .field("features", features)
                .field("on_success", on_success)
                .field("on_failure", on_failure)
                .finish(),
            Requirement::Property { .. } => fmt.write_str("Property"),
            Requirement::Filter { .. } => fmt.write_str("Filter"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capability::CapabilityMode,
        mock::TestAdapter,
        physical::Candidate,
    };

    fn candidate(adapter: TestAdapter) -> Candidate {
        Candidate::query(Box::new(adapter), &CapabilityMode::Flat)
    }

    #[test]
    fn critical_extension_rejects_when_missing() {
        let with = candidate(TestAdapter::named("a").with_extension("X"));
        let without = candidate(TestAdapter::named("b"));

        let req = Requirement::extension("X").weighted(1.0);
        assert_eq!(req.evaluate(&with), Score::Accepted(1.0));
        assert_eq!(req.evaluate(&without), Score::Rejected);
    }

    #[test]
    fn optional_extension_scores_fallback_weight() {
        let without = candidate(TestAdapter::named("b"));
        let req = Requirement::extension("Y").weighted(2.0).optional(0.0);
        assert_eq!(req.evaluate(&without), Score::Accepted(0.0));
    }

    #[test]
    fn negative_fallback_is_a_penalty_not_a_rejection() {
        let without = candidate(TestAdapter::named("b"));
        let req = Requirement::extension("Y").weighted(2.0).optional(-1.0);
        assert_eq!(req.evaluate(&without), Score::Accepted(-1.0));
    }

    #[test]
    fn feature_requirement_reads_capability_view() {
        let with = candidate(
            TestAdapter::named("a").with_flat_feature(Feature::GeometryShader),
        );
        let without = candidate(TestAdapter::named("b"));

        let req = Requirement::feature(Feature::GeometryShader).weighted(1.0);
        assert_eq!(req.evaluate(&with), Score::Accepted(1.0));
        assert_eq!(req.evaluate(&without), Score::Rejected);
    }

    #[test]
    fn anisotropy_threshold_is_binary() {
        let strong = candidate(TestAdapter::named("a").with_anisotropy(16.0));
        let weak = candidate(TestAdapter::named("b").with_anisotropy(1.0));

        let req = Requirement::anisotropy(8.0);
        assert_eq!(req.evaluate(&strong), Score::Accepted(0.0));
        assert_eq!(req.evaluate(&weak), Score::Rejected);
    }

    #[test]
    fn prefer_discrete_never_rejects() {
        let discrete = candidate(
            TestAdapter::named("a").with_kind(DeviceKind::Discrete),
        );
        let integrated = candidate(
            TestAdapter::named("b").with_kind(DeviceKind::Integrated),
        );

        let req = Requirement::prefer_discrete(5.0);
        assert_eq!(req.evaluate(&discrete), Score::Accepted(5.0));
        assert_eq!(req.evaluate(&integrated), Score::Accepted(0.0));
    }
}
