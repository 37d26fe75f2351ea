use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::detection::{Label, Verdict};

static REAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)real voice[^0-9%]*(\d+(?:\.\d+)?)%").unwrap());
static FAKE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ai generated[^0-9%]*(\d+(?:\.\d+)?)%").unwrap());

fn captured_pct(re: &Regex, text: &str) -> Option<f32> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f32>().ok())
        .map(|v| v / 100.0)
}

/// Extracts the two labeled percentages from the service's markdown reply and
/// derives a structured verdict. Missing percentages default to 0.5/0.5; a
/// reply that carries no percentages at all but an explicit AI-generated
/// verdict line still yields a FAKE result (mirrors the service's own
/// degraded output), anything else is UNKNOWN.
///
/// `source`, `latency_ms` are the caller's to fill in.
pub fn parse_result(markdown: &str, suspicion_threshold: f32) -> Verdict {
    let real = captured_pct(&REAL_RE, markdown);
    let fake = captured_pct(&FAKE_RE, markdown);

    // The verdict line, not the percentage labels: every well-formed reply
    // contains the literal "AI Generated" in its probability table.
    let shouted_fake = markdown.to_uppercase().contains("LIKELY AI GENERATED");

    let (label, real_prob, fake_prob) = match (real, fake) {
        (None, None) if shouted_fake => (Label::Fake, 0.3, 0.7),
        (None, None) => (Label::Unknown, 0.5, 0.5),
        (real, fake) => {
            let real_prob = real.unwrap_or(0.5);
            let fake_prob = fake.unwrap_or(0.5);
            let label = if fake_prob > real_prob || shouted_fake {
                Label::Fake
            } else {
                Label::Real
            };
            (label, real_prob, fake_prob)
        }
    };

    Verdict {
        label,
        confidence: real_prob.max(fake_prob),
        real_prob,
        fake_prob,
        suspicious: fake_prob > suspicion_threshold,
        timestamp: Utc::now(),
        source: String::new(),
        raw: Some(markdown.to_string()),
        latency_ms: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fake_result() {
        let verdict = parse_result(
            "🎯 Prediction Results:\n🟢 **Real Voice**: 20.0%\n🔴 **AI Generated**: 80.0%\n",
            0.65,
        );
        assert_eq!(verdict.label, Label::Fake);
        assert!((verdict.confidence - 0.8).abs() < 1e-6);
        assert!((verdict.real_prob - 0.2).abs() < 1e-6);
        assert!(verdict.suspicious);
    }

    #[test]
    fn test_parse_real_result() {
        let verdict = parse_result(
            "🟢 **Real Voice**: 91.5%\n🔴 **AI Generated**: 8.5%\n**Verdict**: ✅ LIKELY REAL VOICE",
            0.65,
        );
        assert_eq!(verdict.label, Label::Real);
        assert!((verdict.confidence - 0.915).abs() < 1e-6);
        assert!(!verdict.suspicious);
    }

    #[test]
    fn test_parse_without_percentages() {
        let verdict = parse_result("something went sideways", 0.65);
        assert_eq!(verdict.label, Label::Unknown);
        assert_eq!(verdict.confidence, 0.5);
        assert!(!verdict.suspicious);
    }

    #[test]
    fn test_parse_verdict_line_without_percentages() {
        let verdict = parse_result("**Verdict**: 🚨 LIKELY AI GENERATED", 0.65);
        assert_eq!(verdict.label, Label::Fake);
        assert!((verdict.fake_prob - 0.7).abs() < 1e-6);
        assert!(verdict.suspicious);
    }

    #[test]
    fn test_percentage_table_alone_is_not_a_fake_verdict() {
        // "AI Generated" appears as a row label in every reply; only the
        // verdict line may flip the label
        let verdict = parse_result(
            "🟢 **Real Voice**: 70.0%\n🔴 **AI Generated**: 30.0%",
            0.65,
        );
        assert_eq!(verdict.label, Label::Real);
    }
}
