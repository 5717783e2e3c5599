//! Manual crash trigger
//!
//! A catalogue of named crash scenarios mirroring the demo app's deliberate
//! failures, plus [`ScenarioRunner`], which feeds them (or a custom issue)
//! through the regular [`CrashPipeline`].

use crate::crash::{AlertKind, CrashAlert, CrashIssue};
use crate::pipeline::CrashPipeline;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

/// App id stamped on synthetic events; selects the iOS platform label.
pub const TEST_APP_ID: &str = "1:240595016161:ios:d252a48f861e6f240d5aa0";

const SCENARIO_APP_VERSION: &str = "1.0.2";
const CUSTOM_ISSUE_ID: &str = "CUSTOM_TEST";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Scenario {
    pub id: &'static str,
    pub title: &'static str,
    pub subtitle: &'static str,
    pub description: &'static str,
}

const fn scenario(
    id: &'static str,
    title: &'static str,
    subtitle: &'static str,
    description: &'static str,
) -> Scenario {
    Scenario {
        id,
        title,
        subtitle,
        description,
    }
}

const BREAKPOINT: &str = "EXC_BREAKPOINT";
const INDEX_OUT_OF_RANGE: &str = "Fatal error: Index out of range";

pub static SCENARIOS: &[Scenario] = &[
    scenario("force_unwrap_user", BREAKPOINT, "CrashScenarios.swift - UserService.getCurrentUserName() line 53", "Crash 1: force unwrap of a nil current user"),
    scenario("nested_optional", BREAKPOINT, "CrashScenarios.swift - UserService.getFirstFriendEmail() line 58", "Crash 2: nested optional chain force unwrapped"),
    scenario("dict_force_unwrap", BREAKPOINT, "CrashScenarios.swift - UserService.getCachedUser(id:) line 63", "Crash 3: dictionary lookup force unwrapped on a missing key"),
    scenario("division_empty_array", BREAKPOINT, "CrashScenarios.swift - CartService.getAveragePrice() line 71", "Crash 4: integer division by the count of an empty cart"),
    scenario("empty_filter_index", INDEX_OUT_OF_RANGE, "CrashScenarios.swift - CartService.getMostDiscountedItem() line 77", "Crash 5: indexing [0] into an empty filter result"),
    scenario("force_cast", BREAKPOINT, "CrashScenarios.swift - CartService.processPayment(method:) line 82", "Crash 6: as! cast to the wrong payment type"),
    scenario("race_condition", "EXC_BAD_ACCESS (code=1, address=0x0)", "CrashScenarios.swift - OrderService.fetchOrdersAsync(completion:) line 101", "Crash 7: concurrent array mutation from several threads"),
    scenario("order_not_found", BREAKPOINT, "CrashScenarios.swift - OrderService.getOrderShippingLabel(orderId:) line 109", "Crash 8: first(where:) force unwrapped for a missing order"),
    scenario("invalid_url", BREAKPOINT, "CrashScenarios.swift - NetworkManager.fetchData(from:) line 118", "Crash 9: URL(string:) force unwrapped on an invalid string"),
    scenario("json_type_mismatch", BREAKPOINT, "CrashScenarios.swift - NetworkManager.parseResponse(data:) line 124", "Crash 10: try! JSON decode with a mismatched type"),
    scenario("appview2_fatal", "[CrashlyticsReport.debug.dylib] AppView2.swift - closure #1 in closure #1 in AppView2.body.getter", BREAKPOINT, "Crash 11: fatalError raised from a SwiftUI button action"),
    scenario("appview2_index", INDEX_OUT_OF_RANGE, "AppView2.swift - closure #3 in closure #1 in AppView2.body.getter", "Crash 12: out-of-range array access in a SwiftUI button action"),
    scenario("empty_last_message", BREAKPOINT, "CrashScenarios.swift - ChatService.getLastMessage() line 180", "Crash 13: last! on an empty message list"),
    scenario("string_index_overflow", "Fatal error: String index is out of bounds", "CrashScenarios.swift - ChatService.getMessagePreview(messageId:) line 187", "Crash 14: string index offset past the end of a short message"),
    scenario("remove_at_invalid", INDEX_OUT_OF_RANGE, "CrashScenarios.swift - ChatService.removeTypingUser(at:) line 193", "Crash 15: remove(at:) with an index past the end"),
    scenario("invalid_regex", "NSInternalInconsistencyException", "CrashScenarios.swift - SearchService.searchWithRegex(pattern:in:) line 201", "Crash 16: try! NSRegularExpression with an invalid pattern"),
    scenario("search_cache_miss", BREAKPOINT, "CrashScenarios.swift - SearchService.getTopSearchResult(query:) line 209", "Crash 17: search cache lookup force unwrapped on a miss"),
    scenario("pagination_overflow", "Fatal error: Range requires lowerBound <= upperBound", "CrashScenarios.swift - SearchService.getSearchPage(query:page:pageSize:) line 216", "Crash 18: page range beyond the result count"),
    scenario("nil_deeplink", BREAKPOINT, "CrashScenarios.swift - NotificationService.handleNotification(_:) line 225", "Crash 19: notification deep link force unwrapped when absent"),
    scenario("payload_type_error", BREAKPOINT, "CrashScenarios.swift - NotificationService.getNotificationTitle(_:) line 233", "Crash 20: notification payload value force cast to String"),
    scenario("badge_overflow", BREAKPOINT, "CrashScenarios.swift - NotificationService.incrementBadge(for:) line 240", "Crash 21: badge counter incremented past Int.max"),
    scenario("empty_shuffle", BREAKPOINT, "CrashScenarios.swift - MediaService.getShuffledTrack() line 250", "Crash 22: randomElement()! on an empty playlist"),
    scenario("negative_index", INDEX_OUT_OF_RANGE, "CrashScenarios.swift - MediaService.getPreviousTrack(currentIndex:) line 256", "Crash 23: previous track lookup with index -1"),
    scenario("int_exact_fail", BREAKPOINT, "CrashScenarios.swift - MediaService.getTrackProgress(current:total:) line 262", "Crash 24: Int(exactly:) force unwrapped on a fractional value"),
    scenario("settings_type_mismatch", BREAKPOINT, "CrashScenarios.swift - ProfileService.getNotificationPreference() line 271", "Crash 25: settings value force cast to the wrong type"),
    scenario("empty_languages", BREAKPOINT, "CrashScenarios.swift - ProfileService.getPrimaryLanguage() line 278", "Crash 26: first! on an empty language list"),
    scenario("string_to_int_fail", BREAKPOINT, "CrashScenarios.swift - ProfileService.getUserAge() line 284", "Crash 27: Int(String)! on a non-numeric age"),
    scenario("cache_miss_image", BREAKPOINT, "CrashScenarios.swift - CacheManager.getCachedImage(key:) line 293", "Crash 28: image cache lookup force unwrapped on a miss"),
    scenario("file_not_found", "NSCocoaErrorDomain (260)", "CrashScenarios.swift - CacheManager.getCacheFileSize(at:) line 299", "Crash 29: try! reading attributes of a missing file"),
    scenario("date_format_mismatch", BREAKPOINT, "CrashScenarios.swift - DateFormatterService.parseServerDate(dateString:) line 308", "Crash 30: server date in an unexpected format force unwrapped"),
    scenario("date_calc_fail", BREAKPOINT, "CrashScenarios.swift - DateFormatterService.getDaysBetween(start:end:) line 315", "Crash 31: unparseable date string 'not-a-date' force unwrapped"),
    scenario("codable_infinity", "NSInvalidArgumentException", "CrashScenarios.swift - DeepCopyService.deepCopy(object:) line 325", "Crash 32: try! JSONEncoder on Double.infinity"),
];

pub fn find(id: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.id == id)
}

/// Pseudo-random pick, seeded from the clock.
pub fn pick_random() -> &'static Scenario {
    let nanos = chrono::Utc::now().timestamp_subsec_nanos() as usize;
    &SCENARIOS[nanos % SCENARIOS.len()]
}

impl Scenario {
    pub fn issue(&self) -> CrashIssue {
        CrashIssue::new(
            format!("TEST_{}", self.id),
            self.title,
            self.subtitle,
            SCENARIO_APP_VERSION,
        )
    }

    pub fn alert(&self) -> CrashAlert {
        test_alert(self.issue(), Some(self.description))
    }
}

/// Body of a custom trigger request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomIssue {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub app_version: Option<String>,
    /// Some callers put the scenario id in the body instead of the query
    #[serde(default)]
    pub scenario: Option<String>,
}

impl CustomIssue {
    /// `None` unless a non-empty title was supplied.
    pub fn issue(&self) -> Option<CrashIssue> {
        let title = self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Some(CrashIssue::new(
            CUSTOM_ISSUE_ID,
            title,
            non_empty(&self.subtitle).unwrap_or_else(|| "N/A".to_string()),
            non_empty(&self.app_version).unwrap_or_else(|| "1.0.0".to_string()),
        ))
    }
}

/// Synthetic alert event in the same shape the alerting platform sends.
pub fn fake_event(issue: &CrashIssue) -> Value {
    let issue = json!({
        "id": issue.id,
        "title": issue.title,
        "subtitle": issue.subtitle,
        "appVersion": issue.app_version,
    });
    json!({
        "appId": TEST_APP_ID,
        "data": { "payload": { "issue": issue.clone() } },
        "payload": { "issue": issue },
    })
}

fn test_alert(issue: CrashIssue, description: Option<&str>) -> CrashAlert {
    let event = fake_event(&issue);
    let label = match description {
        Some(d) => format!("[test] {}", d),
        None => "[test] Crash alert".to_string(),
    };
    CrashAlert::from_event(AlertKind::Test, &event)
        .unwrap_or_else(|| CrashAlert::new(AlertKind::Test, issue, crate::crash::Platform::Ios))
        .with_label(label)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioResult {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one trigger request, mapped onto an HTTP status by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerResponse {
    Ok(Value),
    UnknownScenario(Value),
    Failed(Value),
}

impl TriggerResponse {
    pub fn status(&self) -> u16 {
        match self {
            TriggerResponse::Ok(_) => 200,
            TriggerResponse::UnknownScenario(_) => 400,
            TriggerResponse::Failed(_) => 500,
        }
    }

    pub fn body(&self) -> &Value {
        match self {
            TriggerResponse::Ok(v) | TriggerResponse::UnknownScenario(v) | TriggerResponse::Failed(v) => v,
        }
    }
}

pub struct ScenarioRunner {
    pipeline: Arc<CrashPipeline>,
}

impl ScenarioRunner {
    pub fn new(pipeline: Arc<CrashPipeline>) -> Self {
        Self { pipeline }
    }

    /// Dispatch a trigger request.
    ///
    /// `all` and `list` take precedence over a custom body; a custom body
    /// with a title takes precedence over a named scenario; no scenario at
    /// all picks one at random.
    pub async fn trigger(&self, scenario: Option<&str>, custom: Option<&CustomIssue>) -> TriggerResponse {
        let scenario = scenario
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| custom.and_then(|c| c.scenario.as_deref()));

        match scenario {
            Some("all") => {
                let results = self.run_all().await;
                return TriggerResponse::Ok(json!({ "success": true, "results": results }));
            }
            Some("list") => return TriggerResponse::Ok(catalogue()),
            _ => {}
        }

        if let Some(issue) = custom.and_then(CustomIssue::issue) {
            return self.run_one(test_alert(issue, None)).await;
        }

        let chosen = match scenario {
            Some(id) => match find(id) {
                Some(s) => s,
                None => {
                    let available: Vec<Value> = SCENARIOS
                        .iter()
                        .map(|s| json!({ "id": s.id, "description": s.description }))
                        .collect();
                    return TriggerResponse::UnknownScenario(json!({
                        "error": format!("Scenario '{}' not found", id),
                        "available": available,
                    }));
                }
            },
            None => pick_random(),
        };

        self.run_one(chosen.alert()).await
    }

    /// Run every scenario in catalogue order. One failure never stops the rest.
    pub async fn run_all(&self) -> Vec<ScenarioResult> {
        let mut results = Vec::with_capacity(SCENARIOS.len());
        for scenario in SCENARIOS {
            let result = match self.pipeline.handle_alert(&scenario.alert()).await {
                Ok(_) => ScenarioResult {
                    id: scenario.id.to_string(),
                    success: true,
                    error: None,
                },
                Err(e) => ScenarioResult {
                    id: scenario.id.to_string(),
                    success: false,
                    error: Some(e.to_string()),
                },
            };
            results.push(result);
        }
        results
    }

    async fn run_one(&self, alert: CrashAlert) -> TriggerResponse {
        info!(issue_id = %alert.issue.id, title = %alert.issue.title, "Running test crash alert");
        let issue = json!({
            "id": alert.issue.id,
            "title": alert.issue.title,
            "subtitle": alert.issue.subtitle,
            "appVersion": alert.issue.app_version,
        });
        match self.pipeline.handle_alert(&alert).await {
            Ok(_) => TriggerResponse::Ok(json!({ "success": true, "issue": issue })),
            Err(e) => {
                error!(error = %e, "Test crash alert failed");
                TriggerResponse::Failed(json!({ "success": false, "error": e.to_string() }))
            }
        }
    }
}

fn catalogue() -> Value {
    json!({
        "scenarios": SCENARIOS,
        "usage": {
            "random": "GET /test-crash",
            "specific": "GET /test-crash?scenario=force_unwrap_user",
            "all": "GET /test-crash?scenario=all",
            "custom": "POST /test-crash with JSON body { title, subtitle, appVersion }",
        },
    })
}
