//! Server configuration read once from the process environment.

use std::env;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_TASK_ID_PREFIX: &str = "TASK-";

/// Which backend holds tasks and members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataMode {
    Local,
    SharePoint,
}

impl DataMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::SharePoint => "sharepoint",
        }
    }
}

impl fmt::Display for DataMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    pub base_url: String,
    pub authority_host: String,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Pre-issued bearer token; wins over client credentials
    pub static_token: Option<String>,
    pub site_id: Option<String>,
    pub tasks_list_id: Option<String>,
    pub team_list_id: Option<String>,
}

impl GraphConfig {
    pub fn has_credentials(&self) -> bool {
        self.static_token.is_some()
            || (self.tenant_id.is_some() && self.client_id.is_some() && self.client_secret.is_some())
    }

    /// Variables still needed before the remote lists can be used.
    pub fn missing_for_sharepoint(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.site_id.is_none() {
            missing.push("SHAREPOINT_SITE_ID");
        }
        if self.tasks_list_id.is_none() {
            missing.push("SHAREPOINT_TASKS_LIST_ID");
        }
        if !self.has_credentials() {
            if self.tenant_id.is_none() {
                missing.push("AZURE_TENANT_ID");
            }
            if self.client_id.is_none() {
                missing.push("AZURE_CLIENT_ID");
            }
            if self.client_secret.is_none() {
                missing.push("AZURE_CLIENT_SECRET");
            }
        }
        missing
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailConfig {
    pub sender: Option<String>,
    pub project_lead: Option<String>,
    pub manager: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertScheduleConfig {
    pub enabled: bool,
    pub hour: u32,
    pub minute: u32,
}

impl Default for AlertScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hour: 8,
            minute: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub requested_mode: DataMode,
    pub graph: GraphConfig,
    pub mail: MailConfig,
    pub frontend_auth: bool,
    pub production: bool,
    pub static_dir: Option<PathBuf>,
    pub task_id_prefix: String,
    pub alert_schedule: AlertScheduleConfig,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let flag = |name: &str, default: bool| {
            get(name)
                .and_then(|v| match v.as_str() {
                    "1" | "true" | "TRUE" | "yes" | "YES" | "on" => Some(true),
                    "0" | "false" | "FALSE" | "no" | "NO" | "off" => Some(false),
                    _ => None,
                })
                .unwrap_or(default)
        };
        let number = |name: &str, default: u32| {
            get(name)
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(default)
        };

        let production = get("APP_ENV")
            .or_else(|| get("NODE_ENV"))
            .is_some_and(|v| v.eq_ignore_ascii_case("production"));
        let requested_mode = match get("DATA_MODE") {
            Some(mode) if mode.eq_ignore_ascii_case("sharepoint") => DataMode::SharePoint,
            _ => DataMode::Local,
        };
        let static_dir = get("STATIC_DIR")
            .map(PathBuf::from)
            .or_else(|| production.then(|| PathBuf::from("dist")));
        let defaults = AlertScheduleConfig::default();

        Self {
            port: get("PORT")
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(DEFAULT_PORT),
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            requested_mode,
            graph: GraphConfig {
                base_url: get("GRAPH_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                authority_host: get("AZURE_AUTHORITY_HOST")
                    .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                tenant_id: get("AZURE_TENANT_ID"),
                client_id: get("AZURE_CLIENT_ID"),
                client_secret: get("AZURE_CLIENT_SECRET"),
                static_token: get("GRAPH_TOKEN"),
                site_id: get("SHAREPOINT_SITE_ID"),
                tasks_list_id: get("SHAREPOINT_TASKS_LIST_ID"),
                team_list_id: get("SHAREPOINT_TEAM_LIST_ID"),
            },
            mail: MailConfig {
                sender: get("NOTIFICATION_SENDER_EMAIL"),
                project_lead: get("PM_EMAIL"),
                manager: get("MANAGER_EMAIL"),
            },
            frontend_auth: flag("FRONTEND_AUTH", false),
            production,
            static_dir,
            task_id_prefix: get("TASK_ID_PREFIX").unwrap_or_else(|| DEFAULT_TASK_ID_PREFIX.to_string()),
            alert_schedule: AlertScheduleConfig {
                enabled: flag("ALERT_SCHEDULE", defaults.enabled),
                hour: number("ALERT_HOUR", defaults.hour).min(23),
                minute: number("ALERT_MINUTE", defaults.minute).min(59),
            },
        }
    }

    /// Local-mode configuration rooted at `data_dir`, used by tests and tools.
    pub fn local(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::from_lookup(|_| None);
        config.data_dir = data_dir.into();
        config
    }

    /// The backend actually used. Falls back to local mode, with a warning
    /// naming each missing variable, when SharePoint is not fully configured.
    pub fn resolve_mode(&self) -> DataMode {
        if self.requested_mode == DataMode::Local {
            return DataMode::Local;
        }
        let missing = self.graph.missing_for_sharepoint();
        if missing.is_empty() {
            return DataMode::SharePoint;
        }
        for name in &missing {
            log::warn!("DATA_MODE=sharepoint but {} is not set", name);
        }
        log::warn!("Falling back to local mode");
        DataMode::Local
    }

    /// Mail goes out only with a sender and Graph credentials.
    pub fn mail_enabled(&self) -> bool {
        self.mail.sender.is_some() && self.graph.has_credentials()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.data_dir, PathBuf::from("."));
        assert_eq!(cfg.resolve_mode(), DataMode::Local);
        assert_eq!(cfg.graph.base_url, DEFAULT_GRAPH_BASE_URL);
        assert_eq!(cfg.task_id_prefix, "TASK-");
        assert_eq!(cfg.alert_schedule, AlertScheduleConfig::default());
        assert!(!cfg.production);
        assert_eq!(cfg.static_dir, None);
        assert!(!cfg.mail_enabled());
    }

    #[test]
    fn test_sharepoint_needs_site_list_and_credentials() {
        let partial = config(&[("DATA_MODE", "sharepoint"), ("SHAREPOINT_SITE_ID", "site")]);
        assert_eq!(
            partial.graph.missing_for_sharepoint(),
            vec![
                "SHAREPOINT_TASKS_LIST_ID",
                "AZURE_TENANT_ID",
                "AZURE_CLIENT_ID",
                "AZURE_CLIENT_SECRET"
            ]
        );
        assert_eq!(partial.resolve_mode(), DataMode::Local);

        let full = config(&[
            ("DATA_MODE", "sharepoint"),
            ("SHAREPOINT_SITE_ID", "site"),
            ("SHAREPOINT_TASKS_LIST_ID", "tasks"),
            ("GRAPH_TOKEN", "abc"),
        ]);
        assert_eq!(full.resolve_mode(), DataMode::SharePoint);
    }

    #[test]
    fn test_blank_values_are_unset() {
        let cfg = config(&[("PORT", " "), ("PM_EMAIL", "")]);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.mail.project_lead, None);
    }

    #[test]
    fn test_production_serves_dist() {
        let cfg = config(&[("APP_ENV", "production")]);
        assert!(cfg.production);
        assert_eq!(cfg.static_dir, Some(PathBuf::from("dist")));
    }

    #[test]
    fn test_alert_schedule_parsing() {
        let cfg = config(&[("ALERT_HOUR", "17"), ("ALERT_MINUTE", "75"), ("ALERT_SCHEDULE", "off")]);
        assert_eq!(
            cfg.alert_schedule,
            AlertScheduleConfig {
                enabled: false,
                hour: 17,
                minute: 59
            }
        );
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let cfg = config(&[("GRAPH_BASE_URL", "http://127.0.0.1:9000/v1.0/")]);
        assert_eq!(cfg.graph.base_url, "http://127.0.0.1:9000/v1.0");
    }

    #[test]
    fn test_mail_enabled_needs_sender_and_credentials() {
        assert!(!config(&[("NOTIFICATION_SENDER_EMAIL", "bot@example.com")]).mail_enabled());
        assert!(config(&[
            ("NOTIFICATION_SENDER_EMAIL", "bot@example.com"),
            ("GRAPH_TOKEN", "t")
        ])
        .mail_enabled());
    }
}
