//! `{key}` placeholder templates shared by input patterns and payload
//! mappings.
//!
//! A placeholder is `{` + anything but braces + `}`; surrounding whitespace
//! in the key is ignored. `{files.<input>}` names a resolved input file.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::DocflowError;

const FILES_PREFIX: &str = "files.";

fn placeholder_re() -> Result<&'static Regex, DocflowError> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^{}]+)\}"))
        .as_ref()
        .map_err(|e| DocflowError::Internal(format!("Invalid placeholder pattern: {}", e)))
}

/// Placeholder keys in order of appearance.
pub fn keys(template: &str) -> Vec<String> {
    let Ok(re) = placeholder_re() else {
        return Vec::new();
    };
    re.captures_iter(template)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|key| !key.is_empty())
        .collect()
}

/// The key when the whole template is a single placeholder.
pub fn sole_key(template: &str) -> Option<String> {
    let trimmed = template.trim();
    let re = placeholder_re().ok()?;
    let caps = re.captures(trimmed)?;
    let whole = caps.get(0)?;
    if whole.start() != 0 || whole.end() != trimmed.len() {
        return None;
    }
    caps.get(1).map(|m| m.as_str().trim().to_string())
}

/// The template with every placeholder removed.
pub fn literal(template: &str) -> String {
    match placeholder_re() {
        Ok(re) => re.replace_all(template, "").into_owned(),
        Err(_) => template.to_string(),
    }
}

/// Reject braces that do not form a placeholder.
pub fn check_balanced(template: &str) -> Result<(), DocflowError> {
    let rest = literal(template);
    if rest.contains('{') || rest.contains('}') {
        return Err(DocflowError::InvalidDescriptor(format!(
            "Unbalanced placeholder braces in '{}'",
            template
        )));
    }
    Ok(())
}

/// The input name of a `files.<input>` key.
pub fn file_reference(key: &str) -> Option<&str> {
    key.strip_prefix(FILES_PREFIX)
}

/// The input name of the `resolved_<input>_path` whole-template shorthand.
pub fn legacy_file_reference(template: &str) -> Option<&str> {
    template
        .strip_prefix("resolved_")
        .and_then(|rest| rest.strip_suffix("_path"))
        .filter(|input| !input.is_empty())
}

/// Replace every placeholder with `lookup(key)`. The first lookup error
/// aborts rendering.
pub fn render<F>(template: &str, mut lookup: F) -> Result<String, DocflowError>
where
    F: FnMut(&str) -> Result<String, DocflowError>,
{
    let re = placeholder_re()?;
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in re.captures_iter(template) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        out.push_str(&lookup(key.as_str().trim())?);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_in_order() {
        assert_eq!(
            keys("{client_name} W{ wave_number }*.xlsx"),
            vec!["client_name", "wave_number"]
        );
        assert_eq!(keys("{files.excel}"), vec!["files.excel"]);
        assert!(keys("plain.docx").is_empty());
    }

    #[test]
    fn test_sole_key() {
        assert_eq!(sole_key(" {wave_number} ").as_deref(), Some("wave_number"));
        assert_eq!(sole_key("W{wave_number}"), None);
        assert_eq!(sole_key("{a}{b}"), None);
    }

    #[test]
    fn test_unbalanced_braces_rejected() {
        assert!(check_balanced("{client_name} W{wave_number}").is_ok());
        assert!(check_balanced("{client_name W6").is_err());
        assert!(check_balanced("client} W6").is_err());
        assert!(check_balanced("{{wave}}").is_err());
    }

    #[test]
    fn test_render_propagates_lookup_errors() {
        let out = render("{client} W{wave}", |key| match key {
            "client" => Ok("CEP".into()),
            "wave" => Ok("6".into()),
            other => Err(DocflowError::InvalidParameters(other.into())),
        })
        .unwrap();
        assert_eq!(out, "CEP W6");

        let err = render("{region}", |key| {
            Err(DocflowError::InvalidParameters(key.to_string()))
        });
        assert!(matches!(err, Err(DocflowError::InvalidParameters(k)) if k == "region"));
    }

    #[test]
    fn test_file_references() {
        assert_eq!(file_reference("files.excel"), Some("excel"));
        assert_eq!(file_reference("client_name"), None);
        assert_eq!(legacy_file_reference("resolved_excel_path"), Some("excel"));
        assert_eq!(legacy_file_reference("resolved__path"), None);
        assert_eq!(legacy_file_reference("excel_path"), None);
    }
}
