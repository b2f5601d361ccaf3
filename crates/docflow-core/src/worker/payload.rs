//! Payload construction from a capability's `payload_mapping`.
//!
//! Template forms:
//! - `{param}` substitutes an extracted parameter; a template that is exactly
//!   one numeric parameter stays a JSON number
//! - `{files.<input>}` substitutes the path bound to that input
//! - `resolved_<input>_path` (whole template) is shorthand for `{files.<input>}`
//! - anything else is a literal string
//!
//! Parameter keys are checked against the capability's fixed key set before
//! anything is rendered.

use serde_json::{Map, Value};

use crate::error::DocflowError;
use crate::models::capability::CapabilityDescriptor;
use crate::models::files::ResolvedFileSet;
use crate::models::routing::{ParamValue, Parameters};
use crate::template;

/// Reject parameter sets that do not match the capability's key set exactly.
pub fn check_parameters(
    capability: &CapabilityDescriptor,
    parameters: &Parameters,
) -> Result<(), DocflowError> {
    let expected = capability.parameter_keys();
    let unknown: Vec<&str> = parameters
        .keys()
        .filter(|k| !expected.contains(*k))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(DocflowError::InvalidParameters(format!(
            "'{}' does not accept parameter(s): {}",
            capability.name,
            unknown.join(", ")
        )));
    }
    let missing: Vec<&str> = expected
        .iter()
        .filter(|k| !parameters.contains_key(*k))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(DocflowError::InvalidParameters(format!(
            "'{}' requires parameter(s): {}",
            capability.name,
            missing.join(", ")
        )));
    }
    Ok(())
}

/// Build the worker payload. `overrides` are merged last and win.
pub fn build_payload(
    capability: &CapabilityDescriptor,
    parameters: &Parameters,
    files: &ResolvedFileSet,
    overrides: Option<&Map<String, Value>>,
) -> Result<Value, DocflowError> {
    check_parameters(capability, parameters)?;

    let mut payload = Map::new();
    if capability.payload_mapping.is_empty() {
        for (key, value) in parameters {
            payload.insert(key.clone(), value.as_json());
        }
        if !files.is_empty() {
            let paths: Map<String, Value> = files
                .iter()
                .map(|f| (f.name.clone(), Value::String(f.path.clone())))
                .collect();
            payload.insert("files".into(), Value::Object(paths));
        }
    } else {
        for (field, template) in &capability.payload_mapping {
            payload.insert(field.clone(), render(template, parameters, files)?);
        }
    }

    if let Some(overrides) = overrides {
        for (key, value) in overrides {
            payload.insert(key.clone(), value.clone());
        }
    }
    Ok(Value::Object(payload))
}

fn render(template: &str, parameters: &Parameters, files: &ResolvedFileSet) -> Result<Value, DocflowError> {
    if let Some(input) = template::legacy_file_reference(template) {
        return lookup_file(input, files).map(|p| Value::String(p.to_string()));
    }

    if let Some(key) = template::sole_key(template) {
        let number = parameters
            .get(&key)
            .filter(|v| matches!(v, ParamValue::Number(_)));
        if let Some(value) = number {
            return Ok(value.as_json());
        }
    }

    let rendered = template::render(template, |key| match template::file_reference(key) {
        Some(input) => lookup_file(input, files).map(str::to_string),
        None => parameters.get(key).map(ToString::to_string).ok_or_else(|| {
            DocflowError::InvalidParameters(format!(
                "Template '{}' references unknown parameter '{}'",
                template, key
            ))
        }),
    })?;
    Ok(Value::String(rendered))
}

fn lookup_file<'a>(input: &str, files: &'a ResolvedFileSet) -> Result<&'a str, DocflowError> {
    files.path_of(input).ok_or_else(|| {
        DocflowError::InvalidParameters(format!("No resolved file for input '{}'", input))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::files::ResolvedFile;

    fn capability() -> CapabilityDescriptor {
        CapabilityDescriptor::new("Open Negotiation Agent", "http://localhost:8000/run")
            .with_input("excel", "{client_name} W{wave_number}*.xlsx")
            .with_mapping("client", "{client_name}")
            .with_mapping("wave", "{wave_number}")
            .with_mapping("label", "{client_name} W{wave_number}")
            .with_mapping("excel_path", "{files.excel}")
            .with_mapping("legacy_path", "resolved_excel_path")
            .with_mapping("mode", "full")
    }

    fn params() -> Parameters {
        let mut p = Parameters::new();
        p.insert("client_name".into(), ParamValue::from("CEP"));
        p.insert("wave_number".into(), ParamValue::from(6));
        p
    }

    fn files() -> ResolvedFileSet {
        let mut f = ResolvedFileSet::new();
        f.insert(ResolvedFile {
            name: "excel".into(),
            pattern: "CEP W6*.xlsx".into(),
            path: "/data/CEP W6 OPNNEG.xlsx".into(),
        });
        f
    }

    #[test]
    fn test_renders_templates() {
        let payload = build_payload(&capability(), &params(), &files(), None).unwrap();
        assert_eq!(payload["client"], "CEP");
        assert_eq!(payload["wave"], 6);
        assert_eq!(payload["label"], "CEP W6");
        assert_eq!(payload["excel_path"], "/data/CEP W6 OPNNEG.xlsx");
        assert_eq!(payload["legacy_path"], "/data/CEP W6 OPNNEG.xlsx");
        assert_eq!(payload["mode"], "full");
    }

    #[test]
    fn test_overrides_win() {
        let overrides = serde_json::json!({"mode": "draft", "extra": true});
        let payload = build_payload(
            &capability(),
            &params(),
            &files(),
            overrides.as_object(),
        )
        .unwrap();
        assert_eq!(payload["mode"], "draft");
        assert_eq!(payload["extra"], true);
    }

    #[test]
    fn test_rejects_unknown_and_missing_keys() {
        let mut extra = params();
        extra.insert("region".into(), ParamValue::from("EMEA"));
        assert!(matches!(
            build_payload(&capability(), &extra, &files(), None),
            Err(DocflowError::InvalidParameters(_))
        ));

        let mut missing = params();
        missing.remove("wave_number");
        assert!(matches!(
            build_payload(&capability(), &missing, &files(), None),
            Err(DocflowError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_empty_mapping_passes_parameters_through() {
        let cap = CapabilityDescriptor::new("plain", "http://x").with_parameters(["wave_number"]);
        let mut p = Parameters::new();
        p.insert("wave_number".into(), ParamValue::from(6));
        let payload = build_payload(&cap, &p, &ResolvedFileSet::new(), None).unwrap();
        assert_eq!(payload, serde_json::json!({"wave_number": 6}));
    }
}
