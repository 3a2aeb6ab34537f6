use crate::config::FusionConfig;
use crate::ml::MlSignal;
use crate::rules::RuleEvaluation;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Phishing,
    Benign,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Phishing => "PHISHING",
            Verdict::Benign => "BENIGN",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FusionWeights {
    pub rules_weight: f64,
    pub ml_weight: f64,
}

/// Fused outcome with the inputs needed to audit how the score was derived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub final_score: f64,
    pub verdict: Verdict,
    pub rules_triggered: Vec<String>,
    pub weights: FusionWeights,
}

/// Combines the symbolic rule score with the classifier probability.
/// Pure and total; a degraded ML signal participates unchanged, since its
/// floored probability already suppresses its influence.
pub struct DecisionEngine {
    config: FusionConfig,
}

impl DecisionEngine {
    pub fn new(config: FusionConfig) -> Self {
        DecisionEngine { config }
    }

    pub fn fuse(&self, rule_eval: &RuleEvaluation, ml_signal: &MlSignal) -> Decision {
        let raw = rule_eval.score * self.config.rules_weight
            + ml_signal.probability * self.config.ml_weight;
        let final_score = round3(raw.clamp(0.0, 1.0));

        let verdict = if final_score >= self.config.verdict_threshold {
            Verdict::Phishing
        } else {
            Verdict::Benign
        };

        Decision {
            final_score,
            verdict,
            rules_triggered: rule_eval
                .triggered
                .iter()
                .map(|outcome| outcome.rule_id.clone())
                .collect(),
            weights: FusionWeights {
                rules_weight: self.config.rules_weight,
                ml_weight: self.config.ml_weight,
            },
        }
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::ConfidenceBand;
    use crate::rules::RuleOutcome;

    fn evaluation(score: f64, rule_ids: &[&str]) -> RuleEvaluation {
        RuleEvaluation {
            score,
            triggered: rule_ids
                .iter()
                .map(|id| RuleOutcome {
                    rule_id: id.to_string(),
                    description: String::new(),
                    weight: 0.1,
                })
                .collect(),
        }
    }

    fn signal(probability: f64) -> MlSignal {
        MlSignal {
            probability,
            confidence_band: ConfidenceBand::Low,
            source_label: "stub".to_string(),
            degraded: false,
        }
    }

    fn engine() -> DecisionEngine {
        DecisionEngine::new(FusionConfig::default())
    }

    #[test]
    fn test_weighted_fusion() {
        let decision = engine().fuse(&evaluation(0.5, &["urgent_subject"]), &signal(0.5));
        assert_eq!(decision.final_score, 0.5);
        assert_eq!(decision.verdict, Verdict::Phishing);
        assert_eq!(decision.weights.rules_weight, 0.4);
        assert_eq!(decision.weights.ml_weight, 0.6);
    }

    #[test]
    fn test_verdict_threshold_boundary() {
        // 0.4 * 0.4 + 0.56 * 0.6 = 0.496 -> BENIGN; nudging ML to 0.57 crosses.
        let below = engine().fuse(&evaluation(0.4, &[]), &signal(0.56));
        assert_eq!(below.final_score, 0.496);
        assert_eq!(below.verdict, Verdict::Benign);

        let above = engine().fuse(&evaluation(0.4, &[]), &signal(0.57));
        assert_eq!(above.final_score, 0.502);
        assert_eq!(above.verdict, Verdict::Phishing);
    }

    #[test]
    fn test_score_rounded_to_three_decimals() {
        let decision = engine().fuse(&evaluation(0.3333, &[]), &signal(0.3333));
        assert_eq!(decision.final_score, 0.333);
    }

    #[test]
    fn test_degraded_floor_barely_moves_score() {
        let decision = engine().fuse(&evaluation(0.0, &[]), &signal(0.05));
        assert_eq!(decision.final_score, 0.03);
        assert_eq!(decision.verdict, Verdict::Benign);
    }

    #[test]
    fn test_rule_order_preserved_in_explanation() {
        let decision = engine().fuse(
            &evaluation(0.6, &["suspicious_sender_domain", "urgent_subject"]),
            &signal(0.05),
        );
        assert_eq!(
            decision.rules_triggered,
            vec!["suspicious_sender_domain", "urgent_subject"]
        );
    }

    #[test]
    fn test_custom_policy_surface() {
        let engine = DecisionEngine::new(FusionConfig {
            rules_weight: 1.0,
            ml_weight: 0.0,
            verdict_threshold: 0.3,
        });
        let decision = engine.fuse(&evaluation(0.35, &[]), &signal(0.99));
        assert_eq!(decision.final_score, 0.35);
        assert_eq!(decision.verdict, Verdict::Phishing);
    }
}
