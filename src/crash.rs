//! Crash alert model
//!
//! Decodes the alerting platform's event payload into a [`CrashAlert`].
//! Every field is optional on the wire; missing strings default to empty
//! and a payload without an `issue` object decodes to `None`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single detected failure event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashIssue {
    #[serde(default)]
    pub id: String,
    /// Crash signal or exception class
    #[serde(default)]
    pub title: String,
    /// Free-text location hint
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub app_version: String,
}

impl CrashIssue {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        subtitle: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            subtitle: subtitle.into(),
            app_version: app_version.into(),
        }
    }

    /// Title and subtitle joined, the text the signal parser scans.
    pub fn signal_text(&self) -> String {
        format!("{} {}", self.title, self.subtitle)
    }

    pub(crate) fn or_na(value: &str) -> &str {
        if value.trim().is_empty() {
            "N/A"
        } else {
            value
        }
    }
}

/// Which alert stream raised the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    NewFatal,
    NewNonFatal,
    Regression,
    Velocity,
    /// Raised by the manual trigger
    Test,
}

impl AlertKind {
    /// Parse the route segment used by the webhook server.
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "fatal" => Some(AlertKind::NewFatal),
            "nonfatal" | "non-fatal" => Some(AlertKind::NewNonFatal),
            "regression" => Some(AlertKind::Regression),
            "velocity" => Some(AlertKind::Velocity),
            "test" => Some(AlertKind::Test),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::NewFatal => "New fatal issue",
            AlertKind::NewNonFatal => "New non-fatal issue",
            AlertKind::Regression => "Regressed issue",
            AlertKind::Velocity => "Trending issue (velocity alert)",
            AlertKind::Test => "Test crash alert",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            AlertKind::NewFatal => "🔥",
            AlertKind::NewNonFatal => "✨",
            AlertKind::Regression => "↩️",
            AlertKind::Velocity => "📈",
            AlertKind::Test => "🧪",
        }
    }
}

/// Mobile platform the crashing app runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Ios,
    Android,
    Unknown,
}

impl Platform {
    pub fn from_app_id(app_id: &str) -> Self {
        let lower = app_id.to_lowercase();
        if lower.contains("ios") {
            Platform::Ios
        } else if lower.contains("android") {
            Platform::Android
        } else {
            Platform::Unknown
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Platform::Ios => "🍎 iOS",
            Platform::Android => "🤖 Android",
            Platform::Unknown => "Unknown",
        }
    }
}

/// A decoded alert: the issue plus the envelope details shown to users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashAlert {
    pub kind: AlertKind,
    pub issue: CrashIssue,
    pub platform: Platform,
    /// Overrides the kind's default header label (manual trigger descriptions)
    pub label_override: Option<String>,
}

impl CrashAlert {
    pub fn new(kind: AlertKind, issue: CrashIssue, platform: Platform) -> Self {
        Self {
            kind,
            issue,
            platform,
            label_override: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label_override = Some(label.into());
        self
    }

    pub fn label(&self) -> &str {
        self.label_override.as_deref().unwrap_or(self.kind.label())
    }

    /// Decode an alert event.
    ///
    /// Accepts the issue under `data.payload.issue`, `payload.issue` or
    /// `data.issue`. Returns `None` when no issue object is present or it
    /// does not have the expected shape.
    pub fn from_event(kind: AlertKind, event: &Value) -> Option<Self> {
        let issue_value = [
            event.pointer("/data/payload/issue"),
            event.pointer("/payload/issue"),
            event.pointer("/data/issue"),
        ]
        .into_iter()
        .flatten()
        .find(|v| v.is_object())?;

        let issue: CrashIssue = serde_json::from_value(issue_value.clone()).ok()?;
        let app_id = event.get("appId").and_then(Value::as_str).unwrap_or("");

        Some(Self::new(kind, issue, Platform::from_app_id(app_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_event_reads_nested_payload() {
        let event = json!({
            "appId": "1:240595016161:ios:d252a48f861e6f240d5aa0",
            "data": {"payload": {"issue": {
                "id": "CRASH_001",
                "title": "EXC_BREAKPOINT",
                "subtitle": "UserService.swift line 53 in getCurrentUserName",
                "appVersion": "1.0.2"
            }}}
        });
        let alert = CrashAlert::from_event(AlertKind::NewFatal, &event).unwrap();
        assert_eq!(alert.issue.id, "CRASH_001");
        assert_eq!(alert.issue.app_version, "1.0.2");
        assert_eq!(alert.platform, Platform::Ios);
        assert_eq!(alert.label(), "New fatal issue");
    }

    #[test]
    fn test_from_event_accepts_flat_payload() {
        let event = json!({"payload": {"issue": {"title": "SIGSEGV"}}});
        let alert = CrashAlert::from_event(AlertKind::Velocity, &event).unwrap();
        assert_eq!(alert.issue.title, "SIGSEGV");
        assert_eq!(alert.issue.subtitle, "");
        assert_eq!(alert.platform, Platform::Unknown);
    }

    #[test]
    fn test_from_event_without_issue_is_none() {
        assert!(CrashAlert::from_event(AlertKind::NewFatal, &json!({"data": {}})).is_none());
        assert!(CrashAlert::from_event(AlertKind::NewFatal, &json!({"payload": {"issue": "x"}})).is_none());
    }

    #[test]
    fn test_from_event_rejects_wrong_field_types() {
        let event = json!({"payload": {"issue": {"title": 42}}});
        assert!(CrashAlert::from_event(AlertKind::NewFatal, &event).is_none());
    }

    #[test]
    fn test_alert_kind_slugs() {
        assert_eq!(AlertKind::from_slug("regression"), Some(AlertKind::Regression));
        assert_eq!(AlertKind::from_slug("non-fatal"), Some(AlertKind::NewNonFatal));
        assert!(AlertKind::from_slug("unknown").is_none());
    }

    #[test]
    fn test_label_override() {
        let alert = CrashAlert::new(AlertKind::Test, CrashIssue::default(), Platform::Ios)
            .with_label("[test] force unwrap");
        assert_eq!(alert.label(), "[test] force unwrap");
    }
}
