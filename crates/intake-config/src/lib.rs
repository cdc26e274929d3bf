// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading and validation for the intent intake service.
//!
//! All settings come from the environment (no config file). [`Settings`]
//! holds the parsed values; [`Settings::from_env`] reads the variables named
//! in the service docs, and [`Settings::validate`] performs semantic checks
//! (timezone validity, threshold ranges) before the daemon starts serving.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is absent.
    #[error("missing required environment variable: {var}")]
    MissingVar {
        /// Variable name.
        var: &'static str,
    },

    /// A variable was present but could not be parsed.
    #[error("invalid value for {var}: {reason}")]
    ParseError {
        /// Variable name.
        var: &'static str,
        /// Human-readable parse failure.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Runtime settings for the intake daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Postgres connection string.
    pub database_url: String,
    /// Bearer token required on every `/v1/*` request.
    pub intent_service_token: String,
    /// IANA timezone used to resolve relative due dates.
    pub user_timezone: String,
    /// Confidence floor below which intents are rejected.
    pub min_confidence_to_write: f64,
    /// Maximum number of relative-value inferences per intent.
    pub max_inferred_fields: usize,
    /// Dispatch ready plans to the gateway when true.
    pub execute_actions: bool,
    /// Hours before an open clarification expires.
    pub clarification_expiry_hours: i64,
    /// Resolver score a project candidate must reach.
    pub project_resolution_threshold: f64,
    /// Required lead of the top candidate over the runner-up.
    pub project_resolution_margin: f64,
    /// Action gateway base URL; execution is unconfigured when empty.
    pub gateway_base_url: Option<String>,
    /// Bearer token for the gateway.
    pub gateway_bearer_token: Option<String>,
    /// Gateway path for `notion.tasks.create`.
    pub gateway_tasks_create_path: String,
    /// Gateway path for `notion.tasks.update`.
    pub gateway_tasks_update_path: String,
    /// Gateway path for `notion.list.add_item`.
    pub gateway_lists_add_item_path: String,
    /// Gateway path for `notion.note.capture`.
    pub gateway_notes_capture_path: String,
    /// Gateway request timeout in seconds.
    pub gateway_timeout_seconds: f64,
    /// Project search API base URL; the stub resolver is used when empty.
    pub context_api_base_url: Option<String>,
    /// Bearer token for the project search API.
    pub context_api_bearer_token: Option<String>,
    /// Search path on the project search API.
    pub context_api_project_search_path: String,
    /// Project search request timeout in seconds.
    pub context_api_timeout_seconds: f64,
    /// Comma-separated allowed CORS origins; empty disables CORS.
    pub intent_cors_origins: String,
    /// Service version reported by `/version`.
    pub version: String,
    /// Git SHA reported by `/version`.
    pub git_sha: String,
    /// Artifact schema version stamped on journal rows.
    pub artifact_version: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            intent_service_token: "change-me".into(),
            user_timezone: "Europe/London".into(),
            min_confidence_to_write: 0.75,
            max_inferred_fields: 2,
            execute_actions: false,
            clarification_expiry_hours: 72,
            project_resolution_threshold: 0.90,
            project_resolution_margin: 0.10,
            gateway_base_url: None,
            gateway_bearer_token: None,
            gateway_tasks_create_path: "/v1/tasks/create".into(),
            gateway_tasks_update_path: "/v1/tasks/update".into(),
            gateway_lists_add_item_path: "/v1/lists/add-item".into(),
            gateway_notes_capture_path: "/v1/notes/capture".into(),
            gateway_timeout_seconds: 10.0,
            context_api_base_url: None,
            context_api_bearer_token: None,
            context_api_project_search_path: "/v1/projects/search".into(),
            context_api_timeout_seconds: 5.0,
            intent_cors_origins: String::new(),
            version: "0.0.0".into(),
            git_sha: "unknown".into(),
            artifact_version: 1,
        }
    }
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Load settings from an explicit variable map (testable seam).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut settings = Settings {
            database_url: require(vars, "DATABASE_URL")?,
            intent_service_token: require(vars, "INTENT_SERVICE_TOKEN")?,
            ..Settings::default()
        };

        if let Some(value) = get(vars, "USER_TIMEZONE") {
            settings.user_timezone = value;
        }
        if let Some(value) = get(vars, "MIN_CONFIDENCE_TO_WRITE") {
            settings.min_confidence_to_write = parse(&value, "MIN_CONFIDENCE_TO_WRITE")?;
        }
        if let Some(value) = get(vars, "MAX_INFERRED_FIELDS") {
            settings.max_inferred_fields = parse(&value, "MAX_INFERRED_FIELDS")?;
        }
        if let Some(value) = get(vars, "EXECUTE_ACTIONS") {
            settings.execute_actions = parse_bool(&value, "EXECUTE_ACTIONS")?;
        }
        if let Some(value) = get(vars, "CLARIFICATION_EXPIRY_HOURS") {
            settings.clarification_expiry_hours = parse(&value, "CLARIFICATION_EXPIRY_HOURS")?;
        }
        if let Some(value) = get(vars, "PROJECT_RESOLUTION_THRESHOLD") {
            settings.project_resolution_threshold = parse(&value, "PROJECT_RESOLUTION_THRESHOLD")?;
        }
        if let Some(value) = get(vars, "PROJECT_RESOLUTION_MARGIN") {
            settings.project_resolution_margin = parse(&value, "PROJECT_RESOLUTION_MARGIN")?;
        }
        settings.gateway_base_url = get(vars, "GATEWAY_BASE_URL");
        settings.gateway_bearer_token = get(vars, "GATEWAY_BEARER_TOKEN");
        if let Some(value) = get(vars, "GATEWAY_TASKS_CREATE_PATH") {
            settings.gateway_tasks_create_path = value;
        }
        if let Some(value) = get(vars, "GATEWAY_TASKS_UPDATE_PATH") {
            settings.gateway_tasks_update_path = value;
        }
        if let Some(value) = get(vars, "GATEWAY_LISTS_ADD_ITEM_PATH") {
            settings.gateway_lists_add_item_path = value;
        }
        if let Some(value) = get(vars, "GATEWAY_NOTES_CAPTURE_PATH") {
            settings.gateway_notes_capture_path = value;
        }
        if let Some(value) = get(vars, "GATEWAY_TIMEOUT_SECONDS") {
            settings.gateway_timeout_seconds = parse(&value, "GATEWAY_TIMEOUT_SECONDS")?;
        }
        settings.context_api_base_url = get(vars, "CONTEXT_API_BASE_URL");
        settings.context_api_bearer_token = get(vars, "CONTEXT_API_BEARER_TOKEN");
        if let Some(value) = get(vars, "CONTEXT_API_PROJECT_SEARCH_PATH") {
            settings.context_api_project_search_path = value;
        }
        if let Some(value) = get(vars, "CONTEXT_API_TIMEOUT_SECONDS") {
            settings.context_api_timeout_seconds = parse(&value, "CONTEXT_API_TIMEOUT_SECONDS")?;
        }
        if let Some(value) = get(vars, "INTENT_CORS_ORIGINS") {
            settings.intent_cors_origins = value;
        }
        if let Some(value) = get(vars, "VERSION") {
            settings.version = value;
        }
        if let Some(value) = get(vars, "GIT_SHA") {
            settings.git_sha = value;
        }
        if let Some(value) = get(vars, "ARTIFACT_VERSION") {
            settings.artifact_version = parse(&value, "ARTIFACT_VERSION")?;
        }

        Ok(settings)
    }

    /// Semantic validation: timezone, ranges, expiry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut reasons: Vec<String> = Vec::new();

        if self.user_timezone.parse::<chrono_tz::Tz>().is_err() {
            reasons.push(format!("unknown IANA timezone '{}'", self.user_timezone));
        }
        for (name, value) in [
            ("min_confidence_to_write", self.min_confidence_to_write),
            (
                "project_resolution_threshold",
                self.project_resolution_threshold,
            ),
            ("project_resolution_margin", self.project_resolution_margin),
        ] {
            if !(0.0..=1.0).contains(&value) {
                reasons.push(format!("{name} {value} outside [0, 1]"));
            }
        }
        if self.clarification_expiry_hours <= 0 {
            reasons.push(format!(
                "clarification_expiry_hours {} must be positive",
                self.clarification_expiry_hours
            ));
        }
        if self.gateway_timeout_seconds <= 0.0 {
            reasons.push("gateway_timeout_seconds must be positive".into());
        }
        if self.context_api_timeout_seconds <= 0.0 {
            reasons.push("context_api_timeout_seconds must be positive".into());
        }

        if reasons.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError { reasons })
        }
    }

    /// The CORS origin list, split and trimmed; empty when CORS is off.
    pub fn cors_origins(&self) -> Vec<String> {
        self.intent_cors_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// True when both gateway endpoint and credential are configured.
    pub fn gateway_configured(&self) -> bool {
        matches!(&self.gateway_base_url, Some(url) if !url.is_empty())
            && matches!(&self.gateway_bearer_token, Some(token) if !token.is_empty())
    }
}

fn get(vars: &HashMap<String, String>, var: &str) -> Option<String> {
    vars.get(var).filter(|v| !v.is_empty()).cloned()
}

fn require(vars: &HashMap<String, String>, var: &'static str) -> Result<String, ConfigError> {
    get(vars, var).ok_or(ConfigError::MissingVar { var })
}

fn parse<T: FromStr>(value: &str, var: &'static str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::ParseError {
        var,
        reason: e.to_string(),
    })
}

fn parse_bool(value: &str, var: &'static str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::ParseError {
            var,
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}
