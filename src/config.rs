use anyhow::bail;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub ml: MlConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Keyword lists and per-rule weights for the heuristic battery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    pub suspicious_tlds: Vec<String>,
    pub urgency_keywords: Vec<String>,
    pub suspicious_phrases: Vec<String>,
    pub weights: RuleWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleWeights {
    pub suspicious_sender_domain: f64,
    pub urgent_subject: f64,
    pub multiple_domains: f64,
    pub url_mismatch: f64,
    pub suspicious_phrases: f64,
}

/// How rule and ML scores combine into the final verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    pub rules_weight: f64,
    pub ml_weight: f64,
    pub verdict_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlConfig {
    /// Lower clamp on every reported probability, including degraded readings.
    pub probability_floor: f64,
    pub high_confidence_cutoff: f64,
    pub medium_confidence_cutoff: f64,
    /// Cleaned classifier input is truncated to this many characters.
    pub max_input_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub on_parse_failure: ParseFailurePolicy,
}

/// What to do with mail the parser cannot make sense of. `FailOpen` lets it
/// through as BENIGN so malformed-but-legitimate mail is never blocked;
/// `FailClosed` flags it as PHISHING for deployments that quarantine instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseFailurePolicy {
    FailOpen,
    FailClosed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub database_path: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        RulesConfig {
            suspicious_tlds: vec![
                "ru".to_string(),
                "cn".to_string(),
                "tk".to_string(),
                "ml".to_string(),
                "ga".to_string(),
                "cf".to_string(),
            ],
            urgency_keywords: vec![
                "urgent".to_string(),
                "immediate".to_string(),
                "action required".to_string(),
                "verify".to_string(),
                "confirm".to_string(),
            ],
            suspicious_phrases: vec![
                "click here".to_string(),
                "login now".to_string(),
                "update your information".to_string(),
                "account suspended".to_string(),
            ],
            weights: RuleWeights::default(),
        }
    }
}

impl Default for RuleWeights {
    fn default() -> Self {
        RuleWeights {
            suspicious_sender_domain: 0.30,
            urgent_subject: 0.20,
            multiple_domains: 0.25,
            url_mismatch: 0.15,
            suspicious_phrases: 0.10,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        FusionConfig {
            rules_weight: 0.4,
            ml_weight: 0.6,
            verdict_threshold: 0.5,
        }
    }
}

impl Default for MlConfig {
    fn default() -> Self {
        MlConfig {
            probability_floor: 0.05,
            high_confidence_cutoff: 0.80,
            medium_confidence_cutoff: 0.50,
            max_input_chars: 4096,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            on_parse_failure: ParseFailurePolicy::FailOpen,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        PersistenceConfig {
            enabled: false,
            database_path: "/var/lib/mail-sentinel/history.db".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        weight_in_range(
            "rules.weights.suspicious_sender_domain",
            self.rules.weights.suspicious_sender_domain,
        )?;
        weight_in_range(
            "rules.weights.urgent_subject",
            self.rules.weights.urgent_subject,
        )?;
        weight_in_range(
            "rules.weights.multiple_domains",
            self.rules.weights.multiple_domains,
        )?;
        weight_in_range("rules.weights.url_mismatch", self.rules.weights.url_mismatch)?;
        weight_in_range(
            "rules.weights.suspicious_phrases",
            self.rules.weights.suspicious_phrases,
        )?;

        fraction_in_range("fusion.rules_weight", self.fusion.rules_weight)?;
        fraction_in_range("fusion.ml_weight", self.fusion.ml_weight)?;
        fraction_in_range("fusion.verdict_threshold", self.fusion.verdict_threshold)?;

        weight_in_range("ml.probability_floor", self.ml.probability_floor)?;
        fraction_in_range("ml.high_confidence_cutoff", self.ml.high_confidence_cutoff)?;
        fraction_in_range(
            "ml.medium_confidence_cutoff",
            self.ml.medium_confidence_cutoff,
        )?;
        if self.ml.medium_confidence_cutoff > self.ml.high_confidence_cutoff {
            bail!("ml.medium_confidence_cutoff must not exceed ml.high_confidence_cutoff");
        }
        if self.ml.max_input_chars == 0 {
            bail!("ml.max_input_chars must be greater than zero");
        }
        Ok(())
    }
}

fn weight_in_range(name: &str, value: f64) -> anyhow::Result<()> {
    if !(value > 0.0 && value <= 1.0) {
        bail!("{name} must be in (0, 1], got {value}");
    }
    Ok(())
}

fn fraction_in_range(name: &str, value: f64) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&value) {
        bail!("{name} must be in [0, 1], got {value}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_tuned_battery() {
        let config = Config::default();
        assert_eq!(config.rules.weights.suspicious_sender_domain, 0.30);
        assert_eq!(config.rules.weights.urgent_subject, 0.20);
        assert_eq!(config.rules.weights.multiple_domains, 0.25);
        assert_eq!(config.rules.weights.url_mismatch, 0.15);
        assert_eq!(config.rules.weights.suspicious_phrases, 0.10);
        assert_eq!(config.fusion.rules_weight, 0.4);
        assert_eq!(config.fusion.ml_weight, 0.6);
        assert_eq!(config.fusion.verdict_threshold, 0.5);
        assert_eq!(config.ml.probability_floor, 0.05);
        assert_eq!(config.scan.on_parse_failure, ParseFailurePolicy::FailOpen);
        assert!(config.rules.suspicious_tlds.contains(&"ru".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let restored: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(restored.rules.suspicious_tlds, config.rules.suspicious_tlds);
        assert_eq!(
            restored.fusion.verdict_threshold,
            config.fusion.verdict_threshold
        );
        assert_eq!(restored.persistence.enabled, config.persistence.enabled);
    }

    #[test]
    fn test_partial_yaml_uses_section_defaults() {
        let yaml = "fusion:\n  rules_weight: 0.5\n  ml_weight: 0.5\n  verdict_threshold: 0.6\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.fusion.verdict_threshold, 0.6);
        assert_eq!(config.ml.probability_floor, 0.05);
        assert_eq!(config.rules.urgency_keywords.len(), 5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.fusion.verdict_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ml.probability_floor = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ml.medium_confidence_cutoff = 0.9;
        config.ml.high_confidence_cutoff = 0.8;
        assert!(config.validate().is_err());
    }
}
