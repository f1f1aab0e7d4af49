use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const KEY_FEATURE_FLAGS: &str = "featureFlags";
pub const KEY_ENCRYPTED_API_KEY: &str = "encryptedApiKey";
pub const KEY_MIRROR_DIRECTORY: &str = "mirrorDirectory";
pub const KEY_MIRROR_MARKDOWN: &str = "mirrorMarkdown";

pub const FLAG_AI_SUMMARY: &str = "aiArticleSummary";
pub const FLAG_DATA_MIRROR: &str = "dataMirror";
pub const FLAG_CALENDAR_EVENTS: &str = "calendarEvents";

/// Flags that always appear in [`Settings::feature_flags`], defaulting to off.
pub const KNOWN_FEATURE_FLAGS: &[&str] = &[FLAG_AI_SUMMARY, FLAG_DATA_MIRROR, FLAG_CALENDAR_EVENTS];

pub type FeatureFlags = BTreeMap<String, bool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorMode {
    /// Verbatim copies of the collection files.
    Raw,
    /// One markdown document per item.
    Markdown,
}

/// The free-form settings document.
///
/// Unknown keys are preserved; the accessors below give the typed view of the
/// keys this crate owns, with a default for each missing key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(pub Map<String, Value>);

impl Settings {
    pub fn feature_flags(&self) -> FeatureFlags {
        let mut flags: FeatureFlags = KNOWN_FEATURE_FLAGS
            .iter()
            .map(|name| (name.to_string(), false))
            .collect();
        if let Some(Value::Object(stored)) = self.0.get(KEY_FEATURE_FLAGS) {
            for (name, value) in stored {
                flags.insert(name.clone(), value.as_bool().unwrap_or(false));
            }
        }
        flags
    }

    pub fn is_enabled(&self, flag: &str) -> bool {
        self.feature_flags().get(flag).copied().unwrap_or(false)
    }

    pub fn set_feature_flag(&mut self, flag: &str, enabled: bool) {
        let entry = self
            .0
            .entry(KEY_FEATURE_FLAGS.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(flags) = entry {
            flags.insert(flag.to_string(), Value::Bool(enabled));
        }
    }

    pub fn mirror_directory(&self) -> Option<String> {
        self.0
            .get(KEY_MIRROR_DIRECTORY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .map(str::to_string)
    }

    pub fn set_mirror_directory(&mut self, dir: Option<&str>) {
        match dir.map(str::trim).filter(|d| !d.is_empty()) {
            Some(dir) => {
                self.0
                    .insert(KEY_MIRROR_DIRECTORY.to_string(), Value::String(dir.to_string()));
            }
            None => {
                self.0.remove(KEY_MIRROR_DIRECTORY);
            }
        }
    }

    pub fn mirror_mode(&self) -> MirrorMode {
        match self.0.get(KEY_MIRROR_MARKDOWN).and_then(Value::as_bool) {
            Some(true) => MirrorMode::Markdown,
            _ => MirrorMode::Raw,
        }
    }

    pub fn set_mirror_mode(&mut self, mode: MirrorMode) {
        self.0.insert(
            KEY_MIRROR_MARKDOWN.to_string(),
            Value::Bool(mode == MirrorMode::Markdown),
        );
    }

    pub fn encrypted_api_key(&self) -> Option<&str> {
        self.0
            .get(KEY_ENCRYPTED_API_KEY)
            .and_then(Value::as_str)
            .filter(|blob| !blob.is_empty())
    }

    pub fn set_encrypted_api_key(&mut self, sealed: Option<String>) {
        match sealed {
            Some(blob) => {
                self.0
                    .insert(KEY_ENCRYPTED_API_KEY.to_string(), Value::String(blob));
            }
            None => {
                self.0.remove(KEY_ENCRYPTED_API_KEY);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(value: Value) -> Settings {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn known_flags_default_to_false() {
        let flags = Settings::default().feature_flags();
        for name in KNOWN_FEATURE_FLAGS {
            assert_eq!(flags.get(*name), Some(&false));
        }
    }

    #[test]
    fn stored_flags_override_defaults_and_unknown_flags_survive() {
        let s = settings(json!({"featureFlags": {"dataMirror": true, "beta": true}}));
        let flags = s.feature_flags();
        assert_eq!(flags.get("dataMirror"), Some(&true));
        assert_eq!(flags.get("beta"), Some(&true));
        assert_eq!(flags.get("aiArticleSummary"), Some(&false));
    }

    #[test]
    fn setting_a_flag_replaces_a_malformed_flag_map() {
        let mut s = settings(json!({"featureFlags": "oops"}));
        s.set_feature_flag("dataMirror", true);
        assert!(s.is_enabled("dataMirror"));
    }

    #[test]
    fn blank_mirror_directory_counts_as_unset() {
        let mut s = settings(json!({"mirrorDirectory": "   "}));
        assert_eq!(s.mirror_directory(), None);
        s.set_mirror_directory(Some("/tmp/mirror"));
        assert_eq!(s.mirror_directory().as_deref(), Some("/tmp/mirror"));
        s.set_mirror_directory(Some(""));
        assert!(!s.0.contains_key(KEY_MIRROR_DIRECTORY));
    }

    #[test]
    fn mirror_mode_defaults_to_raw() {
        let mut s = Settings::default();
        assert_eq!(s.mirror_mode(), MirrorMode::Raw);
        s.set_mirror_mode(MirrorMode::Markdown);
        assert_eq!(s.mirror_mode(), MirrorMode::Markdown);
    }
}
