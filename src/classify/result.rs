use serde::Serialize;

use crate::error::{ClassifyError, ClassifyResult};

/// Output of one inference call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Prediction {
    /// Most probable class.
    pub label: String,
    /// Per-class probabilities, highest first.
    pub probabilities: Vec<(String, f64)>,
}

impl Prediction {
    /// Build a prediction from unordered class probabilities.
    pub fn from_probabilities(
        probabilities: impl IntoIterator<Item = (String, f64)>,
    ) -> ClassifyResult<Self> {
        let mut probabilities: Vec<(String, f64)> = probabilities
            .into_iter()
            .filter(|(_, p)| p.is_finite())
            .collect();
        probabilities.sort_by(|a, b| b.1.total_cmp(&a.1));
        let label = probabilities
            .first()
            .map(|(label, _)| label.clone())
            .ok_or_else(|| ClassifyError::inference_failed("model produced no class scores"))?;
        Ok(Self {
            label,
            probabilities,
        })
    }

    pub fn confidence(&self) -> f64 {
        self.probabilities.first().map(|(_, p)| *p).unwrap_or(0.0)
    }

    pub fn top(&self, n: usize) -> &[(String, f64)] {
        &self.probabilities[..n.min(self.probabilities.len())]
    }
}

/// Numerically stable softmax.
pub(crate) fn softmax(scores: &[f32]) -> Vec<f64> {
    let max = scores
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![0.0; scores.len()];
    }
    let exps: Vec<f64> = scores
        .iter()
        .map(|s| if s.is_finite() { ((s - max) as f64).exp() } else { 0.0 })
        .collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_by_probability() -> ClassifyResult<()> {
        let p = Prediction::from_probabilities(vec![
            ("cat".to_string(), 0.2),
            ("dog".to_string(), 0.7),
            ("fox".to_string(), 0.1),
        ])?;
        assert_eq!(p.label, "dog");
        assert_eq!(p.confidence(), 0.7);
        assert_eq!(p.top(2)[1].0, "cat");
        assert_eq!(p.top(10).len(), 3);
        Ok(())
    }

    #[test]
    fn empty_scores_are_an_inference_failure() {
        let err = Prediction::from_probabilities(Vec::new()).unwrap_err();
        assert!(matches!(err, ClassifyError::InferenceFailed(_)));
    }

    #[test]
    fn softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f64 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }
}
