use serde::{Deserialize, Serialize};

/// Per-group moderation configuration.
///
/// A group with no stored record behaves exactly like `GroupSettings::default()`:
/// anti-spam and AI moderation on, escalation at 3 warnings, new users not muted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupSettings {
    pub welcome_enabled: bool,
    pub welcome_message: Option<String>,
    pub anti_spam_enabled: bool,
    pub ai_moderation_enabled: bool,
    pub max_warnings: u32,
    pub mute_new_users: bool,
    pub delete_service_messages: bool,
    pub allowed_links: Vec<String>,
    pub banned_words: Vec<String>,
    pub auto_translate: bool,
    pub target_language: String,
    pub sentiment_analysis: bool,
    pub media_filtering: bool,
    pub forward_filtering: bool,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            welcome_enabled: true,
            welcome_message: None,
            anti_spam_enabled: true,
            ai_moderation_enabled: true,
            max_warnings: 3,
            mute_new_users: false,
            delete_service_messages: true,
            allowed_links: Vec::new(),
            banned_words: vec!["spam".to_string(), "scam".to_string()],
            auto_translate: false,
            target_language: "en".to_string(),
            sentiment_analysis: false,
            media_filtering: false,
            forward_filtering: false,
        }
    }
}

/// Partial update for [`GroupSettings`]; unset fields keep their prior value.
///
/// No range validation happens here: callers keep `max_warnings` positive.
#[derive(Clone, Debug, Default)]
pub struct GroupSettingsPatch {
    pub welcome_enabled: Option<bool>,
    pub welcome_message: Option<Option<String>>,
    pub anti_spam_enabled: Option<bool>,
    pub ai_moderation_enabled: Option<bool>,
    pub max_warnings: Option<u32>,
    pub mute_new_users: Option<bool>,
    pub delete_service_messages: Option<bool>,
    pub allowed_links: Option<Vec<String>>,
    pub banned_words: Option<Vec<String>>,
    pub auto_translate: Option<bool>,
    pub target_language: Option<String>,
    pub sentiment_analysis: Option<bool>,
    pub media_filtering: Option<bool>,
    pub forward_filtering: Option<bool>,
}

impl GroupSettings {
    pub fn merged(&self, patch: GroupSettingsPatch) -> GroupSettings {
        let mut out = self.clone();
        if let Some(v) = patch.welcome_enabled {
            out.welcome_enabled = v;
        }
        if let Some(v) = patch.welcome_message {
            out.welcome_message = v;
        }
        if let Some(v) = patch.anti_spam_enabled {
            out.anti_spam_enabled = v;
        }
        if let Some(v) = patch.ai_moderation_enabled {
            out.ai_moderation_enabled = v;
        }
        if let Some(v) = patch.max_warnings {
            out.max_warnings = v;
        }
        if let Some(v) = patch.mute_new_users {
            out.mute_new_users = v;
        }
        if let Some(v) = patch.delete_service_messages {
            out.delete_service_messages = v;
        }
        if let Some(v) = patch.allowed_links {
            out.allowed_links = v;
        }
        if let Some(v) = patch.banned_words {
            out.banned_words = v;
        }
        if let Some(v) = patch.auto_translate {
            out.auto_translate = v;
        }
        if let Some(v) = patch.target_language {
            out.target_language = v;
        }
        if let Some(v) = patch.sentiment_analysis {
            out.sentiment_analysis = v;
        }
        if let Some(v) = patch.media_filtering {
            out.media_filtering = v;
        }
        if let Some(v) = patch.forward_filtering {
            out.forward_filtering = v;
        }
        out
    }
}

/// Per-group new-member verification configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    pub enabled: bool,
    /// Challenge TTL in seconds.
    pub timeout: u64,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: 300,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct VerificationSettingsPatch {
    pub enabled: Option<bool>,
    pub timeout: Option<u64>,
}

impl VerificationSettings {
    pub fn merged(&self, patch: VerificationSettingsPatch) -> VerificationSettings {
        VerificationSettings {
            enabled: patch.enabled.unwrap_or(self.enabled),
            timeout: patch.timeout.unwrap_or(self.timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_safe() {
        let s = GroupSettings::default();
        assert!(s.anti_spam_enabled);
        assert!(s.ai_moderation_enabled);
        assert_eq!(s.max_warnings, 3);
        assert!(!s.mute_new_users);
        assert_eq!(s.banned_words, vec!["spam", "scam"]);
        assert_eq!(s.target_language, "en");
    }

    #[test]
    fn merge_keeps_unset_fields() {
        let base = GroupSettings::default();
        let merged = base.merged(GroupSettingsPatch {
            max_warnings: Some(5),
            auto_translate: Some(true),
            ..Default::default()
        });
        assert_eq!(merged.max_warnings, 5);
        assert!(merged.auto_translate);
        // untouched fields retain defaults
        assert!(merged.anti_spam_enabled);
        assert_eq!(merged.banned_words, base.banned_words);
    }

    #[test]
    fn merge_can_clear_welcome_message() {
        let base = GroupSettings {
            welcome_message: Some("hi".to_string()),
            ..Default::default()
        };
        let merged = base.merged(GroupSettingsPatch {
            welcome_message: Some(None),
            ..Default::default()
        });
        assert_eq!(merged.welcome_message, None);
    }

    #[test]
    fn verification_defaults_and_merge() {
        let s = VerificationSettings::default();
        assert!(!s.enabled);
        assert_eq!(s.timeout, 300);

        let merged = s.merged(VerificationSettingsPatch {
            enabled: Some(true),
            ..Default::default()
        });
        assert!(merged.enabled);
        assert_eq!(merged.timeout, 300);
    }
}
