//! YAML configuration.
//!
//! Looked up at `./docflow.yaml`, then `<config dir>/docflow/docflow.yaml`.
//! `${VAR}` and `${VAR:-default}` references are expanded from the
//! environment before parsing. Missing sections fall back to defaults.
//!
//! ```yaml
//! server:
//!   port: 3310
//!   db_path: ${DOCFLOW_DATA:-.}/docflow.db
//! pipeline:
//!   max_retries: 3
//!   allow_partial: true
//! router:
//!   confidence_threshold: 0.7
//!   classifier:
//!     kind: llm
//!     base_url: https://api.openai.com/v1
//!     api_key: ${OPENAI_API_KEY}
//!     model: gpt-4o-mini
//! resolver:
//!   root: /srv/documents
//! capabilities:
//!   - name: Open Negotiation Agent
//!     endpointUri: http://localhost:8000/api/v1/generate
//!     inputPatterns:
//!       - { name: excel, pattern: "{client_name} W{wave_number}*.xlsx" }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DocflowError;
use crate::models::capability::CapabilityDescriptor;
use crate::pipeline::{PipelineConfig, RetryPolicy};
use crate::router::{Classifier, KeywordClassifier, LlmClassifier, LlmClassifierConfig, RouterConfig};

pub const CONFIG_FILE_NAME: &str = "docflow.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocflowConfig {
    pub server: ServerSection,
    pub pipeline: PipelineSection,
    pub router: RouterSection,
    pub resolver: ResolverSection,
    /// Capabilities registered (upserted) at startup.
    pub capabilities: Vec<CapabilityDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub db_path: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3310,
            db_path: "docflow.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub call_timeout_secs: u64,
    pub allow_partial: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
            call_timeout_secs: 300,
            allow_partial: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    pub confidence_threshold: f64,
    pub tie_epsilon: f64,
    pub classifier: ClassifierSection,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            tie_epsilon: 0.05,
            classifier: ClassifierSection::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    #[default]
    Keyword,
    Llm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSection {
    pub kind: ClassifierKind,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            kind: ClassifierKind::Keyword,
            base_url: None,
            api_key: None,
            model: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSection {
    pub root: String,
    pub fuzzy_match: bool,
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            fuzzy_match: false,
        }
    }
}

impl DocflowConfig {
    /// Parse YAML text after environment expansion.
    pub fn from_yaml_str(text: &str) -> Result<Self, DocflowError> {
        let expanded = resolve_env_vars(text);
        let config: DocflowConfig = serde_yaml::from_str(&expanded)
            .map_err(|e| DocflowError::BadRequest(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, DocflowError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DocflowError::BadRequest(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Load from `explicit` if given (it must exist), else from the first
    /// default location that exists, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, DocflowError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        for candidate in Self::default_paths() {
            if candidate.is_file() {
                tracing::info!("Loading config from {}", candidate.display());
                return Self::from_file(&candidate);
            }
        }
        Ok(Self::default())
    }

    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("docflow").join(CONFIG_FILE_NAME));
        }
        paths
    }

    pub fn validate(&self) -> Result<(), DocflowError> {
        let threshold = self.router.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(DocflowError::BadRequest(format!(
                "router.confidence_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if self.router.tie_epsilon < 0.0 {
            return Err(DocflowError::BadRequest(
                "router.tie_epsilon must not be negative".into(),
            ));
        }
        if self.pipeline.call_timeout_secs == 0 {
            return Err(DocflowError::BadRequest(
                "pipeline.call_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            retry: RetryPolicy {
                max_retries: self.pipeline.max_retries,
                base_delay: Duration::from_millis(self.pipeline.retry_base_delay_ms),
                max_delay: Duration::from_millis(self.pipeline.retry_max_delay_ms),
            },
            call_timeout: Duration::from_secs(self.pipeline.call_timeout_secs),
            allow_partial: self.pipeline.allow_partial,
        }
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            confidence_threshold: self.router.confidence_threshold,
            tie_epsilon: self.router.tie_epsilon,
        }
    }

    pub fn build_classifier(&self) -> Result<Arc<dyn Classifier>, DocflowError> {
        let section = &self.router.classifier;
        match section.kind {
            ClassifierKind::Keyword => Ok(Arc::new(KeywordClassifier::new())),
            ClassifierKind::Llm => {
                let (Some(base_url), Some(model)) = (&section.base_url, &section.model) else {
                    return Err(DocflowError::BadRequest(
                        "router.classifier.kind = llm needs base_url and model".into(),
                    ));
                };
                Ok(Arc::new(LlmClassifier::new(LlmClassifierConfig {
                    base_url: base_url.clone(),
                    api_key: section.api_key.clone().unwrap_or_default(),
                    model: model.clone(),
                    timeout: Duration::from_secs(section.timeout_secs),
                })))
            }
        }
    }
}

/// Resolve environment variable references in a string.
/// Supports `${ENV_VAR}` and `${ENV_VAR:-default}` syntax; unset variables
/// without a default are left as written.
pub fn resolve_env_vars(input: &str) -> String {
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &regex::Captures| {
        let var_expr = &caps[1];
        if let Some(idx) = var_expr.find(":-") {
            let var_name = &var_expr[..idx];
            let default_val = &var_expr[idx + 2..];
            std::env::var(var_name).unwrap_or_else(|_| default_val.to_string())
        } else {
            std::env::var(var_expr).unwrap_or_else(|_| format!("${{{}}}", var_expr))
        }
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("DOCFLOW_TEST_CONFIG_VAR", "hello");
        assert_eq!(resolve_env_vars("${DOCFLOW_TEST_CONFIG_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix-${DOCFLOW_TEST_CONFIG_VAR}-suffix"),
            "prefix-hello-suffix"
        );
        assert_eq!(resolve_env_vars("${DOCFLOW_UNSET_VAR:-fallback}"), "fallback");
        assert_eq!(resolve_env_vars("${DOCFLOW_UNSET_VAR}"), "${DOCFLOW_UNSET_VAR}");
        std::env::remove_var("DOCFLOW_TEST_CONFIG_VAR");
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = DocflowConfig::from_yaml_str("pipeline:\n  max_retries: 2\n").unwrap();
        assert_eq!(config.pipeline.max_retries, 2);
        assert_eq!(config.pipeline.call_timeout_secs, 300);
        assert_eq!(config.server.port, 3310);
        assert_eq!(config.router.classifier.kind, ClassifierKind::Keyword);
        assert!(!config.resolver.fuzzy_match);

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.retry.max_retries, 2);
        assert_eq!(pipeline.retry.base_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_capabilities_and_env_expansion() {
        std::env::set_var("DOCFLOW_TEST_WORKER", "http://worker:8000");
        let yaml = r#"
resolver:
  root: /srv/docs
  fuzzy_match: true
capabilities:
  - name: Open Negotiation Agent
    endpointUri: ${DOCFLOW_TEST_WORKER}/run
    inputPatterns:
      - { name: excel, pattern: "{client_name} W{wave_number}*.xlsx" }
    generators: [groups, notices]
"#;
        let config = DocflowConfig::from_yaml_str(yaml).unwrap();
        std::env::remove_var("DOCFLOW_TEST_WORKER");
        assert!(config.resolver.fuzzy_match);
        assert_eq!(config.capabilities.len(), 1);
        assert_eq!(config.capabilities[0].endpoint_uri, "http://worker:8000/run");
        assert_eq!(config.capabilities[0].generators, vec!["groups", "notices"]);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(DocflowConfig::from_yaml_str("router:\n  confidence_threshold: 1.5\n").is_err());
        let llm = DocflowConfig::from_yaml_str("router:\n  classifier:\n    kind: llm\n").unwrap();
        assert!(llm.build_classifier().is_err());
    }
}
