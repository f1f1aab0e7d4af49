use std::collections::HashSet;

/// Longest stem a generated file or directory name may have, in characters.
pub const MAX_NAME_LEN: usize = 100;

const FORBIDDEN: &[char] = &['/', '\\', ':', '"', '*', '?', '<', '>', '|'];

/// Turns a display name into a filesystem-safe file stem.
///
/// Forbidden characters and whitespace become `-`, dash runs collapse, leading
/// and trailing dashes or dots are dropped. Never returns an empty string.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if FORBIDDEN.contains(&c) || c.is_whitespace() || c.is_control() {
            '-'
        } else {
            c
        };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_matches(|c| c == '-' || c == '.');
    let truncated: String = trimmed.chars().take(MAX_NAME_LEN).collect();
    let cleaned = truncated.trim_end_matches(|c| c == '-' || c == '.');
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Hands out names unique within one directory: `Name`, `Name-2`, `Name-3`...
///
/// Comparison ignores case so the result is also unique on case-insensitive
/// filesystems.
#[derive(Debug, Default)]
pub struct UniqueNames {
    taken: HashSet<String>,
}

impl UniqueNames {
    pub fn claim(&mut self, stem: &str) -> String {
        if self.taken.insert(stem.to_lowercase()) {
            return stem.to_string();
        }
        let mut n = 2;
        loop {
            let suffix = format!("-{n}");
            let room = MAX_NAME_LEN.saturating_sub(suffix.chars().count());
            let base: String = stem.chars().take(room).collect();
            let candidate = format!("{}{suffix}", base.trim_end_matches(|c| c == '-' || c == '.'));
            if self.taken.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }
}
