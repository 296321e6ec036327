use crate::{
    assert_error,
    capability::CapabilityMode,
    physical::{AdapterTrait, Candidate},
    requirement::{Requirement, Score},
};
use ordered_float::NotNan;

/// Why one candidate was excluded from a selection run.
#[derive(Clone, Debug)]
pub struct RejectedCandidate {
    /// Name the adapter reported.
    pub name: String,

    /// Index of the rejecting requirement in the requirement list,
    /// or `None` when the summed score was not comparable.
    pub requirement: Option<usize>,
}

/// Every enumerated candidate was rejected by at least one critical
/// requirement.
#[derive(Debug, thiserror::Error)]
#[error("no suitable device among {} candidate(s)", rejected.len())]
pub struct NoSuitableDevice {
    pub rejected: Vec<RejectedCandidate>,
}

/// Outcome of a selection run. The per-requirement weights of the winner
/// are retained: the device builder reads them to decide what to enable.
#[derive(Debug)]
pub struct Selection {
    pub candidate: Candidate,

    /// Sum of the weights below.
    pub total: f32,

    /// Weight each requirement contributed, index-aligned with the
    /// requirement list the run was given.
    pub outcomes: Vec<f32>,
}

/// Runs the requirement set against every adapter and picks the
/// best-scoring survivor.
///
/// Requirements are evaluated in list order and a candidate is dropped at
/// its first rejection. The incumbent is replaced only by a strictly
/// greater total, so among equal scores the candidate enumerated first
/// wins; callers can rely on that for reproducible selection.
pub fn select(
    adapters: Vec<Box<dyn AdapterTrait>>,
    requirements: &[Requirement],
    mode: &CapabilityMode,
) -> Result<Selection, NoSuitableDevice> {
    let mut best: Option<(NotNan<f32>, Selection)> = None;
    let mut rejected = Vec::new();

    for adapter in adapters {
        let candidate = Candidate::query(adapter, mode);
        let name = candidate.properties().name.clone();

        match evaluate(&candidate, requirements) {
            Err(requirement) => {
                tracing::debug!(%name, requirement, "candidate rejected");
                rejected.push(RejectedCandidate {
                    name,
                    requirement: Some(requirement),
                });
            }
            Ok(outcomes) => {
                let total: f32 = outcomes.iter().sum();
                let total = match NotNan::new(total) {
                    Ok(total) => total,
                    Err(_) => {
                        tracing::warn!(%name, "candidate score is not a number");
                        rejected.push(RejectedCandidate {
                            name,
                            requirement: None,
                        });
                        continue;
                    }
                };
                tracing::debug!(%name, score = total.into_inner(), "candidate accepted");
                if best.as_ref().map_or(true, |(incumbent, _)| total > *incumbent)
                {
                    best = Some((
                        total,
                        Selection {
                            candidate,
                            total: total.into_inner(),
                            outcomes,
                        },
                    ));
                }
            }
        }
    }

    match best {
        Some((_, selection)) => {
            tracing::info!(
                name = %selection.candidate.properties().name,
                score = selection.total,
                "device selected"
            );
            Ok(selection)
        }
        None => Err(NoSuitableDevice { rejected }),
    }
}

/// Evaluates all requirements against one candidate. Returns the index of
/// the first rejecting requirement, or the weight list otherwise.
fn evaluate(
    candidate: &Candidate,
    requirements: &[Requirement],
) -> Result<Vec<f32>, usize> {
    let mut outcomes = Vec::with_capacity(requirements.len());
    for (index, requirement) in requirements.iter().enumerate() {
        match requirement.evaluate(candidate) {
            Score::Rejected => return Err(index),
            Score::Accepted(weight) => outcomes.push(weight),
        }
    }
    Ok(outcomes)
}

#[allow(dead_code)]
fn check() {
    assert_error::<NoSuitableDevice>();
}
