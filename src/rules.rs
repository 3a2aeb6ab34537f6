use crate::config::RulesConfig;
use crate::domain_utils;
use crate::parser::{BodyContent, Headers, UrlRecord};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub description: String,
    pub weight: f64,
}

/// Aggregate of the heuristic battery. `triggered` preserves evaluation
/// order; the order carries no meaning beyond display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleEvaluation {
    pub score: f64,
    pub triggered: Vec<RuleOutcome>,
}

/// Fixed battery of deterministic checks over a parsed email. Evaluation is
/// pure: missing fields count as absent, never as errors. Weights and keyword
/// lists come from [`RulesConfig`] so the battery can be tuned without
/// touching code.
pub struct RuleEngine {
    config: RulesConfig,
}

impl RuleEngine {
    pub fn new(config: RulesConfig) -> Self {
        RuleEngine { config }
    }

    pub fn evaluate(
        &self,
        headers: &Headers,
        urls: &[UrlRecord],
        body: &BodyContent,
    ) -> RuleEvaluation {
        let mut triggered: Vec<RuleOutcome> = Vec::new();
        let weights = &self.config.weights;
        let sender_domain = domain_utils::sender_domain(&headers.from);

        if let Some(domain) = sender_domain.as_deref() {
            if domain_utils::has_disallowed_tld(domain, &self.config.suspicious_tlds) {
                triggered.push(outcome(
                    "suspicious_sender_domain",
                    "Sender domain is from a suspicious TLD",
                    weights.suspicious_sender_domain,
                ));
            }
        }

        let subject = headers.subject.to_lowercase();
        if self
            .config
            .urgency_keywords
            .iter()
            .any(|keyword| subject.contains(&keyword.to_lowercase()))
        {
            triggered.push(outcome(
                "urgent_subject",
                "Subject contains urgent or action-oriented keywords",
                weights.urgent_subject,
            ));
        }

        let domains: HashSet<&str> = urls
            .iter()
            .map(|record| record.domain.as_str())
            .filter(|domain| !domain.is_empty())
            .collect();
        if domains.len() > 1 {
            triggered.push(outcome(
                "multiple_domains",
                "Email contains URLs from multiple different domains",
                weights.multiple_domains,
            ));
        }

        if let Some(domain) = sender_domain.as_deref() {
            if urls
                .iter()
                .any(|record| !record.domain.eq_ignore_ascii_case(domain))
            {
                triggered.push(outcome(
                    "url_mismatch",
                    "URLs point to domains different from sender domain",
                    weights.url_mismatch,
                ));
            }
        }

        let body_text = format!(
            "{} {}",
            body.plain_text.as_deref().unwrap_or(""),
            body.html.as_deref().unwrap_or("")
        )
        .to_lowercase();
        if self
            .config
            .suspicious_phrases
            .iter()
            .any(|phrase| body_text.contains(&phrase.to_lowercase()))
        {
            triggered.push(outcome(
                "suspicious_phrases",
                "Body contains common phishing phrases",
                weights.suspicious_phrases,
            ));
        }

        for hit in &triggered {
            log::debug!("Rule triggered: {} (weight {})", hit.rule_id, hit.weight);
        }

        let total: f64 = triggered.iter().map(|hit| hit.weight).sum();
        RuleEvaluation {
            score: total.min(1.0),
            triggered,
        }
    }
}

fn outcome(rule_id: &str, description: &str, weight: f64) -> RuleOutcome {
    RuleOutcome {
        rule_id: rule_id.to_string(),
        description: description.to_string(),
        weight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> RuleEngine {
        RuleEngine::new(RulesConfig::default())
    }

    fn headers(from: &str, subject: &str) -> Headers {
        Headers {
            from: from.to_string(),
            reply_to: None,
            subject: subject.to_string(),
            received: Vec::new(),
        }
    }

    fn body(plain: &str) -> BodyContent {
        BodyContent {
            plain_text: Some(plain.to_string()),
            html: None,
        }
    }

    fn url(url: &str, domain: &str) -> UrlRecord {
        UrlRecord {
            url: url.to_string(),
            domain: domain.to_string(),
        }
    }

    #[test]
    fn test_clean_email_triggers_nothing() {
        let eval = engine().evaluate(
            &headers("admin@example.com", "Meeting Tomorrow"),
            &[],
            &body("Let's meet at 10am"),
        );
        assert_eq!(eval.score, 0.0);
        assert!(eval.triggered.is_empty());
    }

    #[test]
    fn test_phishing_battery_in_table_order() {
        let eval = engine().evaluate(
            &headers("attacker@phishing.ru", "URGENT Action Required"),
            &[],
            &body("Click here now to verify your account!"),
        );
        let ids: Vec<&str> = eval
            .triggered
            .iter()
            .map(|hit| hit.rule_id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec!["suspicious_sender_domain", "urgent_subject", "suspicious_phrases"]
        );
        assert!((eval.score - 0.60).abs() < 1e-9);
    }

    #[test]
    fn test_multiple_domains_and_mismatch() {
        let urls = [
            url("https://example.com/a", "example.com"),
            url("https://evil.net/b", "evil.net"),
        ];
        let eval = engine().evaluate(&headers("bob@example.com", "hello"), &urls, &body(""));
        let ids: Vec<&str> = eval
            .triggered
            .iter()
            .map(|hit| hit.rule_id.as_str())
            .collect();
        assert_eq!(ids, vec!["multiple_domains", "url_mismatch"]);
        assert!((eval.score - 0.40).abs() < 1e-9);
    }

    #[test]
    fn test_matching_single_domain_is_quiet() {
        let urls = [url("https://example.com/a", "example.com")];
        let eval = engine().evaluate(&headers("bob@example.com", "hello"), &urls, &body(""));
        assert!(eval.triggered.is_empty());
    }

    #[test]
    fn test_url_rules_need_no_sender_for_multiple_domains() {
        let urls = [
            url("https://a.com/x", "a.com"),
            url("https://b.com/y", "b.com"),
        ];
        let eval = engine().evaluate(&headers("", ""), &urls, &body(""));
        let ids: Vec<&str> = eval
            .triggered
            .iter()
            .map(|hit| hit.rule_id.as_str())
            .collect();
        assert_eq!(ids, vec!["multiple_domains"]);
    }

    #[test]
    fn test_phrases_found_in_html_body() {
        let eval = engine().evaluate(
            &headers("bob@example.com", "newsletter"),
            &[],
            &BodyContent {
                plain_text: None,
                html: Some("<a>Login NOW</a>".to_string()),
            },
        );
        let ids: Vec<&str> = eval
            .triggered
            .iter()
            .map(|hit| hit.rule_id.as_str())
            .collect();
        assert_eq!(ids, vec!["suspicious_phrases"]);
    }

    #[test]
    fn test_score_capped_at_one() {
        let mut config = RulesConfig::default();
        config.weights.suspicious_sender_domain = 0.9;
        config.weights.urgent_subject = 0.9;
        let engine = RuleEngine::new(config);
        let eval = engine.evaluate(
            &headers("attacker@phishing.ru", "URGENT: verify"),
            &[],
            &body(""),
        );
        assert_eq!(eval.score, 1.0);
        assert_eq!(eval.triggered.len(), 2);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let engine = engine();
        let headers = headers("attacker@phishing.ru", "URGENT Action Required");
        let urls = [
            url("https://a.com/x", "a.com"),
            url("https://b.com/y", "b.com"),
        ];
        let body = body("Click here now to verify your account!");
        let first = engine.evaluate(&headers, &urls, &body);
        let second = engine.evaluate(&headers, &urls, &body);
        assert_eq!(first, second);
    }
}
