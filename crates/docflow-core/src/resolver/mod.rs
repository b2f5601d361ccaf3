//! File resolver: turns a capability's input patterns plus extracted
//! parameters into concrete files under a configured root.
//!
//! Resolution is read-only and deterministic for a fixed filesystem
//! snapshot. For every pattern:
//!
//! - zero matches → [`DocflowError::MissingInput`]
//! - one match → bound
//! - several matches → [`DocflowError::AmbiguousInput`], unless fuzzy
//!   matching is enabled, in which case the most recently modified file
//!   wins (a tie on the newest time is still ambiguous)

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use glob::{MatchOptions, Pattern};

use crate::error::DocflowError;
use crate::models::capability::InputPattern;
use crate::models::files::{FileInfo, ResolvedFile, ResolvedFileSet};
use crate::models::routing::Parameters;
use crate::template;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

#[derive(Debug, Clone)]
pub struct FileResolver {
    root: PathBuf,
    fuzzy_match: bool,
}

impl FileResolver {
    pub fn new(root: impl Into<PathBuf>, fuzzy_match: bool) -> Self {
        Self {
            root: root.into(),
            fuzzy_match,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fuzzy_match(&self) -> bool {
        self.fuzzy_match
    }

    /// Resolve every pattern; the first failure aborts the whole set.
    pub fn resolve(
        &self,
        patterns: &[InputPattern],
        parameters: &Parameters,
    ) -> Result<ResolvedFileSet, DocflowError> {
        if !self.root.is_dir() {
            return Err(DocflowError::BadRequest(format!(
                "Resolver root does not exist: {}",
                self.root.display()
            )));
        }
        let mut set = ResolvedFileSet::new();
        for input in patterns {
            set.insert(self.resolve_one(input, parameters)?);
        }
        Ok(set)
    }

    /// Same as [`resolve`](Self::resolve), run on the blocking pool.
    pub async fn resolve_async(
        &self,
        patterns: Vec<InputPattern>,
        parameters: Parameters,
    ) -> Result<ResolvedFileSet, DocflowError> {
        let resolver = self.clone();
        tokio::task::spawn_blocking(move || resolver.resolve(&patterns, &parameters))
            .await
            .map_err(|e| DocflowError::Internal(format!("Task join error: {}", e)))?
    }

    pub fn resolve_one(
        &self,
        input: &InputPattern,
        parameters: &Parameters,
    ) -> Result<ResolvedFile, DocflowError> {
        let (display, escaped) = substitute(&input.pattern, parameters)?;
        check_relative(&display)?;

        let full = format!(
            "{}/{}",
            Pattern::escape(&self.root.to_string_lossy()),
            escaped
        );
        let mut candidates: Vec<PathBuf> = glob::glob_with(&full, MATCH_OPTIONS)
            .map_err(|e| DocflowError::InvalidParameters(format!("Bad pattern '{}': {}", display, e)))?
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();
        candidates.sort();

        let chosen = match candidates.len() {
            0 => return Err(DocflowError::MissingInput(display)),
            1 => candidates.remove(0),
            _ if self.fuzzy_match => newest(&display, candidates)?,
            _ => {
                return Err(DocflowError::AmbiguousInput {
                    pattern: display,
                    candidates: candidates.iter().map(|p| p.display().to_string()).collect(),
                })
            }
        };

        let path = chosen.canonicalize().unwrap_or(chosen);
        tracing::debug!(input = %input.name, path = %path.display(), "[Resolver] Bound input");
        Ok(ResolvedFile {
            name: input.name.clone(),
            pattern: display,
            path: path.display().to_string(),
        })
    }

    /// File metadata for a (resolved) path.
    pub fn describe(&self, path: &str) -> FileInfo {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => FileInfo {
                exists: true,
                path: path.to_string(),
                name: Path::new(path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned()),
                size: Some(meta.len()),
            },
            _ => FileInfo {
                exists: false,
                path: path.to_string(),
                name: None,
                size: None,
            },
        }
    }
}

/// Substitute `{key}` placeholders. Returns the readable pattern and the
/// glob pattern with parameter values escaped.
fn substitute(pattern: &str, parameters: &Parameters) -> Result<(String, String), DocflowError> {
    let value_of = |key: &str| {
        parameters.get(key).map(ToString::to_string).ok_or_else(|| {
            DocflowError::InvalidParameters(format!(
                "Pattern '{}' references unknown parameter '{}'",
                pattern, key
            ))
        })
    };
    let display = template::render(pattern, value_of)?;
    let escaped = template::render(pattern, |key| value_of(key).map(|v| Pattern::escape(&v)))?;
    Ok((display, escaped))
}

fn check_relative(pattern: &str) -> Result<(), DocflowError> {
    let path = Path::new(pattern);
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(DocflowError::InvalidParameters(format!(
            "Pattern '{}' must stay inside the resolver root",
            pattern
        )));
    }
    Ok(())
}

fn newest(pattern: &str, candidates: Vec<PathBuf>) -> Result<PathBuf, DocflowError> {
    let mut stamped: Vec<(SystemTime, PathBuf)> = candidates
        .into_iter()
        .map(|p| {
            let modified = std::fs::metadata(&p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, p)
        })
        .collect();
    stamped.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let newest_time = stamped[0].0;
    let tied: Vec<String> = stamped
        .iter()
        .filter(|(t, _)| *t == newest_time)
        .map(|(_, p)| p.display().to_string())
        .collect();
    if tied.len() > 1 {
        return Err(DocflowError::AmbiguousInput {
            pattern: pattern.to_string(),
            candidates: tied,
        });
    }
    Ok(stamped.swap_remove(0).1)
}
