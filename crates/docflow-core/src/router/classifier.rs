//! Classification collaborators.
//!
//! A classifier turns request text into ranked `{label, parameters,
//! confidence}` candidates, given the registered capabilities as context.
//! Labels are not trusted: the router drops anything that is not a
//! registered capability name.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::DocflowError;
use crate::models::capability::CapabilitySummary;
use crate::models::routing::{Classification, ParamValue, Parameters};
use crate::registry::{similarity, tokenize};

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Candidates ordered best first.
    async fn classify(
        &self,
        text: &str,
        context: &[CapabilitySummary],
    ) -> Result<Vec<Classification>, DocflowError>;

    fn name(&self) -> &'static str;
}

// ─── Keyword classifier ────────────────────────────────────────────────────

/// Offline classifier built on registry token overlap.
///
/// Each capability is scored with [`similarity`]; confidences are the
/// score shares across all capabilities that matched at all, so a lone
/// matching capability is a confident pick while near-equal matches split
/// the confidence.
#[derive(Debug, Default, Clone)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(
        &self,
        text: &str,
        context: &[CapabilitySummary],
    ) -> Result<Vec<Classification>, DocflowError> {
        let extracted = extract_parameters(text);
        let scored: Vec<(&CapabilitySummary, f64)> = context
            .iter()
            .map(|c| (c, similarity(text, &c.name, &c.description)))
            .filter(|(_, s)| *s > 0.0)
            .collect();
        let total: f64 = scored.iter().map(|(_, s)| s).sum();

        let mut out: Vec<Classification> = scored
            .into_iter()
            .map(|(c, score)| Classification {
                label: c.name.clone(),
                parameters: extracted
                    .iter()
                    .filter(|(k, _)| c.parameters.contains(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                confidence: score / total,
            })
            .collect();
        out.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

/// Pull parameters out of free text.
///
/// Recognises client/wave phrases ("CEP Wave 6", "CEP W6", "CEP W 6") and
/// explicit `key=value` tokens.
pub fn extract_parameters(text: &str) -> Parameters {
    let mut params = Parameters::new();
    let words: Vec<&str> = text
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| matches!(c, ',' | '.' | ';' | ':' | '"' | '\'' | '(' | ')')))
        .filter(|w| !w.is_empty())
        .collect();

    for (i, word) in words.iter().enumerate() {
        let next = words.get(i + 1).map(|w| w.to_lowercase());
        let after = words.get(i + 2).copied();

        let wave = match next.as_deref() {
            Some("wave") | Some("w") => after.and_then(parse_wave),
            Some(w) if w.starts_with('w') => parse_wave(&w[1..]),
            _ => None,
        };
        if let Some(wave) = wave {
            params.insert("wave_number".into(), ParamValue::Number(wave as f64));
            if tokenize(word).len() == 1 && word.chars().any(|c| c.is_alphabetic()) {
                params.insert("client_name".into(), ParamValue::Text(word.to_string()));
            }
            break;
        }
    }

    // Standalone "wave 6" without a client prefix
    if !params.contains_key("wave_number") {
        for pair in words.windows(2) {
            if pair[0].eq_ignore_ascii_case("wave") {
                if let Some(wave) = parse_wave(pair[1]) {
                    params.insert("wave_number".into(), ParamValue::Number(wave as f64));
                    break;
                }
            }
        }
    }

    for word in &words {
        if let Some((key, value)) = word.split_once('=') {
            if !key.is_empty() && !value.is_empty() {
                params.insert(key.to_string(), ParamValue::parse(value));
            }
        }
    }
    params
}

fn parse_wave(s: &str) -> Option<u32> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

// ─── LLM classifier ────────────────────────────────────────────────────────

/// Settings for an OpenAI-compatible `chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct LlmClassifierConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

/// Classifier backed by a chat-completions model.
pub struct LlmClassifier {
    client: reqwest::Client,
    config: LlmClassifierConfig,
}

#[derive(Debug, Deserialize)]
struct CandidateList {
    #[serde(default)]
    candidates: Vec<Classification>,
}

const SYSTEM_PROMPT: &str = "You route document-generation requests to capabilities. \
Reply with JSON only, shaped as {\"candidates\": [{\"label\": <capability name>, \
\"parameters\": {<key>: <string or number>}, \"confidence\": <0..1>}]}, best first. \
Use only the capability names and parameter keys you are given.";

impl LlmClassifier {
    pub fn new(config: LlmClassifierConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
        }
    }

    fn user_prompt(text: &str, context: &[CapabilitySummary]) -> String {
        let mut prompt = String::from("Capabilities:\n");
        for c in context {
            prompt.push_str(&format!(
                "- {} (parameters: {}): {}\n",
                c.name,
                c.parameters.join(", "),
                c.description
            ));
        }
        prompt.push_str("\nRequest:\n");
        prompt.push_str(text);
        prompt
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        text: &str,
        context: &[CapabilitySummary],
    ) -> Result<Vec<Classification>, DocflowError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = serde_json::json!({
            "model": self.config.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": Self::user_prompt(text, context) }
            ]
        });

        tracing::info!(
            "[Classifier] Calling chat completions: {} (model: {})",
            url,
            self.config.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| DocflowError::ClassificationUnavailable(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let response_text = response.text().await.map_err(|e| {
            DocflowError::ClassificationUnavailable(format!("Failed to read response body: {}", e))
        })?;
        if !status.is_success() {
            return Err(DocflowError::ClassificationUnavailable(format!(
                "API returned {}: {}",
                status, response_text
            )));
        }

        let json: serde_json::Value = serde_json::from_str(&response_text).map_err(|e| {
            DocflowError::ClassificationUnavailable(format!("Failed to parse response JSON: {}", e))
        })?;
        let content = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or("");

        let mut candidates = parse_candidates(content)?;
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(candidates)
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

/// Parse the model's JSON reply, tolerating code fences and prose around it.
fn parse_candidates(content: &str) -> Result<Vec<Classification>, DocflowError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if e > s => &content[s..=e],
        _ => {
            return Err(DocflowError::ClassificationUnavailable(
                "Model reply contained no JSON object".into(),
            ))
        }
    };
    let list: CandidateList = serde_json::from_str(json).map_err(|e| {
        DocflowError::ClassificationUnavailable(format!("Malformed candidate list: {}", e))
    })?;
    Ok(list
        .candidates
        .into_iter()
        .map(|mut c| {
            c.confidence = c.confidence.clamp(0.0, 1.0);
            c
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(name: &str, description: &str, params: &[&str]) -> CapabilitySummary {
        CapabilitySummary {
            name: name.into(),
            description: description.into(),
            parameters: params.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_extract_client_and_wave() {
        let p = extract_parameters("Create document for CEP Wave 6");
        assert_eq!(p["client_name"], ParamValue::Text("CEP".into()));
        assert_eq!(p["wave_number"], ParamValue::Number(6.0));

        let p = extract_parameters("run notices for ACME W12, please");
        assert_eq!(p["client_name"], ParamValue::Text("ACME".into()));
        assert_eq!(p["wave_number"], ParamValue::Number(12.0));

        let p = extract_parameters("documents for wave 3 region=EMEA");
        assert!(!p.contains_key("client_name"));
        assert_eq!(p["wave_number"], ParamValue::Number(3.0));
        assert_eq!(p["region"], ParamValue::Text("EMEA".into()));
    }

    #[tokio::test]
    async fn test_keyword_classifier_ranks_and_filters_params() {
        let context = vec![
            summary(
                "Open Negotiation Agent",
                "Create open negotiation documents for a client wave",
                &["client_name", "wave_number"],
            ),
            summary("Invoice Agent", "Builds invoices", &[]),
        ];
        let out = KeywordClassifier::new()
            .classify("Create document for CEP Wave 6", &context)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "Open Negotiation Agent");
        assert!((out[0].confidence - 1.0).abs() < 1e-9);
        assert_eq!(out[0].parameters.len(), 2);
    }

    #[test]
    fn test_parse_candidates_tolerates_fences() {
        let reply = "```json\n{\"candidates\": [{\"label\": \"A\", \"parameters\": {\"wave_number\": 6}, \"confidence\": 1.4}]}\n```";
        let c = parse_candidates(reply).unwrap();
        assert_eq!(c[0].label, "A");
        assert_eq!(c[0].confidence, 1.0);
        assert!(matches!(
            parse_candidates("no idea"),
            Err(DocflowError::ClassificationUnavailable(_))
        ));
    }
}
