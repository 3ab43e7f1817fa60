use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Bounds applied to every inbound keyword list.
#[derive(Debug, Clone, Copy)]
pub struct KeywordLimits {
    pub max_count: usize,
    pub max_length: usize,
}

impl Default for KeywordLimits {
    fn default() -> Self {
        Self {
            max_count: 50,
            max_length: 64,
        }
    }
}

/// Trim, drop empty and over-length entries, dedup case-insensitively and cap the count.
///
/// The first occurrence of a keyword keeps its casing and position.
pub fn sanitize_keywords<I, S>(keywords: I, limits: KeywordLimits) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for keyword in keywords {
        let trimmed = keyword.as_ref().trim();
        if trimmed.is_empty() || trimmed.chars().count() > limits.max_length {
            continue;
        }
        if !seen.insert(trimmed.to_lowercase()) {
            continue;
        }
        out.push(trimmed.to_string());
        if out.len() >= limits.max_count {
            break;
        }
    }

    out
}

/// Split a `?keywords=a,b` style value.
pub fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Deserialize)]
struct KeywordFile {
    keywords: Vec<serde_json::Value>,
}

/// Load the default keyword list from a `{"keywords": [...]}` JSON file.
///
/// Any failure is logged and yields an empty list.
pub fn load_keywords_from_file(path: &Path) -> Vec<String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read keywords file {:?}: {}", path, e);
            return Vec::new();
        }
    };

    match serde_json::from_str::<KeywordFile>(&content) {
        Ok(file) => {
            let keywords: Vec<String> = file
                .keywords
                .into_iter()
                .map(|value| match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
            info!("Loaded {} default keywords from {:?}", keywords.len(), path);
            keywords
        }
        Err(e) => {
            warn!("Failed to parse keywords file {:?}: {}", path, e);
            Vec::new()
        }
    }
}
