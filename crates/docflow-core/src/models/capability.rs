use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DocflowError;
use crate::template;

/// Generator kind used when a capability does not declare any.
pub const DEFAULT_GENERATOR: &str = "document";

/// A named glob pattern describing one required input file.
///
/// `pattern` is relative to the resolver root and may contain `{param}`
/// placeholders, e.g. `"{client_name} W{wave_number}*.xlsx"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputPattern {
    pub name: String,
    pub pattern: String,
}

impl InputPattern {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
        }
    }

    /// Number of literal (non-wildcard, non-placeholder) characters.
    /// Used as the secondary specificity measure when routing ties.
    pub fn literal_len(&self) -> usize {
        template::literal(&self.pattern)
            .chars()
            .filter(|c| !matches!(c, '*' | '?' | '[' | ']'))
            .count()
    }
}

/// A registrable unit of downstream work: a worker endpoint plus its
/// input and payload contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDescriptor {
    pub name: String,
    pub endpoint_uri: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_patterns: Vec<InputPattern>,
    /// Payload field → template with `{param}` / `{files.<input>}` substitution.
    #[serde(default)]
    pub payload_mapping: BTreeMap<String, String>,
    /// Parameter keys a routing decision must supply. When empty, the key set
    /// is inferred from the placeholders used by patterns and templates.
    #[serde(default)]
    pub parameters: Vec<String>,
    /// Generation kinds fanned out concurrently during GENERATING.
    #[serde(default)]
    pub generators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default = "crate::models::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "crate::models::now")]
    pub updated_at: DateTime<Utc>,
}

impl CapabilityDescriptor {
    pub fn new(name: impl Into<String>, endpoint_uri: impl Into<String>) -> Self {
        let now = crate::models::now();
        Self {
            name: name.into(),
            endpoint_uri: endpoint_uri.into(),
            description: String::new(),
            input_patterns: Vec::new(),
            payload_mapping: BTreeMap::new(),
            parameters: Vec::new(),
            generators: Vec::new(),
            timeout_secs: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.input_patterns.push(InputPattern::new(name, pattern));
        self
    }

    pub fn with_mapping(mut self, field: impl Into<String>, template: impl Into<String>) -> Self {
        self.payload_mapping.insert(field.into(), template.into());
        self
    }

    pub fn with_parameters<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_generators<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.generators = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Reject descriptors that cannot be registered. No partial registration:
    /// this runs before anything is written.
    pub fn validate(&self) -> Result<(), DocflowError> {
        if self.name.trim().is_empty() {
            return Err(DocflowError::InvalidDescriptor("name is required".into()));
        }
        if self.endpoint_uri.trim().is_empty() {
            return Err(DocflowError::InvalidDescriptor(format!(
                "endpoint is required for '{}'",
                self.name
            )));
        }

        let mut seen = BTreeSet::new();
        for input in &self.input_patterns {
            if input.name.trim().is_empty() || input.pattern.trim().is_empty() {
                return Err(DocflowError::InvalidDescriptor(format!(
                    "input patterns of '{}' need a name and a pattern",
                    self.name
                )));
            }
            if !seen.insert(input.name.as_str()) {
                return Err(DocflowError::InvalidDescriptor(format!(
                    "duplicate input name '{}'",
                    input.name
                )));
            }
        }

        self.validate_templates(&seen)?;

        let mut kinds = BTreeSet::new();
        for kind in &self.generators {
            if kind.trim().is_empty() || !kinds.insert(kind.as_str()) {
                return Err(DocflowError::InvalidDescriptor(format!(
                    "generator kinds of '{}' must be unique and non-empty",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Placeholders must be well formed, file references must name a
    /// declared input, and a declared parameter set must cover every
    /// parameter placeholder.
    fn validate_templates(&self, inputs: &BTreeSet<&str>) -> Result<(), DocflowError> {
        let declared: BTreeSet<&str> = self.parameters.iter().map(String::as_str).collect();
        let check_parameter = |key: &str, source: &str| -> Result<(), DocflowError> {
            if !declared.is_empty() && !declared.contains(key) {
                return Err(DocflowError::InvalidDescriptor(format!(
                    "'{}' uses parameter '{}' which is not in the declared parameters of '{}'",
                    source, key, self.name
                )));
            }
            Ok(())
        };
        let check_input = |input: &str, source: &str| -> Result<(), DocflowError> {
            if !inputs.contains(input) {
                return Err(DocflowError::InvalidDescriptor(format!(
                    "'{}' references undeclared input '{}' of '{}'",
                    source, input, self.name
                )));
            }
            Ok(())
        };

        for input in &self.input_patterns {
            template::check_balanced(&input.pattern)?;
            for key in template::keys(&input.pattern) {
                if template::file_reference(&key).is_some() {
                    return Err(DocflowError::InvalidDescriptor(format!(
                        "input pattern '{}' cannot reference files",
                        input.pattern
                    )));
                }
                check_parameter(&key, &input.pattern)?;
            }
        }

        for source in self.payload_mapping.values() {
            if let Some(input) = template::legacy_file_reference(source) {
                check_input(input, source)?;
                continue;
            }
            template::check_balanced(source)?;
            for key in template::keys(source) {
                match template::file_reference(&key) {
                    Some(input) => check_input(input, source)?,
                    None => check_parameter(&key, source)?,
                }
            }
        }
        Ok(())
    }

    /// Generation kinds, falling back to a single default generator.
    pub fn generator_kinds(&self) -> Vec<String> {
        if self.generators.is_empty() {
            vec![DEFAULT_GENERATOR.to_string()]
        } else {
            self.generators.clone()
        }
    }

    /// The fixed parameter key set for this capability.
    pub fn parameter_keys(&self) -> BTreeSet<String> {
        if !self.parameters.is_empty() {
            return self.parameters.iter().cloned().collect();
        }
        let templates = self
            .input_patterns
            .iter()
            .map(|p| p.pattern.as_str())
            .chain(self.payload_mapping.values().map(String::as_str));
        templates
            .flat_map(template::keys)
            .filter(|key| template::file_reference(key).is_none())
            .collect()
    }

    /// Routing specificity: (pattern count, total literal pattern length).
    pub fn specificity(&self) -> (usize, usize) {
        (
            self.input_patterns.len(),
            self.input_patterns.iter().map(InputPattern::literal_len).sum(),
        )
    }
}

/// The `{name, description}` view of a capability handed to classifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySummary {
    pub name: String,
    pub description: String,
    pub parameters: Vec<String>,
}

impl From<&CapabilityDescriptor> for CapabilitySummary {
    fn from(c: &CapabilityDescriptor) -> Self {
        Self {
            name: c.name.clone(),
            description: c.description.clone(),
            parameters: c.parameter_keys().into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opn() -> CapabilityDescriptor {
        CapabilityDescriptor::new("Open Negotiation Agent", "http://localhost:8000/run")
            .with_input("excel", "{client_name} W{wave_number}*.xlsx")
            .with_input("template", "*Template*.docx")
            .with_mapping("request_id", "opn_{client_name}_{wave_number}")
            .with_mapping("excel_path", "{files.excel}")
    }

    #[test]
    fn test_validate_requires_name_and_endpoint() {
        assert!(opn().validate().is_ok());
        let missing_name = CapabilityDescriptor::new("  ", "http://x");
        assert!(matches!(
            missing_name.validate(),
            Err(DocflowError::InvalidDescriptor(_))
        ));
        let missing_endpoint = CapabilityDescriptor::new("x", "");
        assert!(matches!(
            missing_endpoint.validate(),
            Err(DocflowError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_inputs() {
        let c = opn().with_input("excel", "*.xlsx");
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_undeclared_file_reference() {
        let c = opn().with_mapping("roster_path", "{files.roster}");
        assert!(matches!(c.validate(), Err(DocflowError::InvalidDescriptor(_))));

        let c = opn().with_mapping("roster_path", "resolved_roster_path");
        assert!(c.validate().is_err());

        let c = opn().with_mapping("template_path", "resolved_template_path");
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_uncovered_placeholders() {
        let c = opn().with_parameters(["client_name"]);
        assert!(matches!(c.validate(), Err(DocflowError::InvalidDescriptor(_))));

        let c = opn().with_parameters(["client_name", "wave_number"]);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_malformed_placeholders() {
        let c = opn().with_mapping("label", "{client_name W6");
        assert!(c.validate().is_err());
        let c = CapabilityDescriptor::new("x", "http://x").with_input("excel", "{files.excel}.xlsx");
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_parameter_keys_inferred_from_templates() {
        let keys: Vec<_> = opn().parameter_keys().into_iter().collect();
        assert_eq!(keys, vec!["client_name", "wave_number"]);

        let declared = opn().with_parameters(["client_name", "wave_number", "region"]);
        assert_eq!(declared.parameter_keys().len(), 3);
    }

    #[test]
    fn test_specificity_counts_literals() {
        let p = InputPattern::new("excel", "{client_name} W{wave_number}*.xlsx");
        // " W" + ".xlsx"
        assert_eq!(p.literal_len(), 7);
        assert_eq!(opn().specificity().0, 2);
    }

    #[test]
    fn test_default_generator() {
        assert_eq!(opn().generator_kinds(), vec![DEFAULT_GENERATOR.to_string()]);
        let two = opn().with_generators(["groups", "notices"]);
        assert_eq!(two.generator_kinds().len(), 2);
    }
}
