use super::Decision;
use crate::config::Settings;

/// Reduces a profile's per-image interest scores to one decision.
///
/// LIKE when the mean exceeds `threshold`, or when at least
/// `min_high_count` images score above `high_score`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    pub threshold: f32,
    pub high_score: f32,
    pub min_high_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyOutcome {
    pub average: f32,
    pub high_count: usize,
    pub decision: Decision,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.2,
            high_score: 0.9,
            min_high_count: 2,
        }
    }
}

impl DecisionPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            threshold: settings.thresh,
            high_score: settings.high_score,
            min_high_count: settings.min_high_count,
        }
    }

    /// An empty list averages to 0.0 and is always a dislike.
    pub fn decide(&self, scores: &[f32]) -> PolicyOutcome {
        if scores.is_empty() {
            return PolicyOutcome {
                average: 0.0,
                high_count: 0,
                decision: Decision::Dislike,
            };
        }
        let average = scores.iter().sum::<f32>() / scores.len() as f32;
        let high_count = scores.iter().filter(|&&s| s > self.high_score).count();
        let many_high = self.min_high_count > 0 && high_count >= self.min_high_count;
        let decision = if average > self.threshold || many_high {
            Decision::Like
        } else {
            Decision::Dislike
        };
        PolicyOutcome {
            average,
            high_count,
            decision,
        }
    }
}
