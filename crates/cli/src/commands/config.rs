use std::env;
use std::fs;
use std::path::Path;

use diplomas_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

const FIELDS: &[(&str, &str)] = &[
    ("database.url", "DIPLOMAS_DATABASE_URL"),
    ("database.max_connections", "DIPLOMAS_DATABASE_MAX_CONNECTIONS"),
    ("database.timeout_secs", "DIPLOMAS_DATABASE_TIMEOUT_SECS"),
    ("server.bind_address", "DIPLOMAS_SERVER_BIND_ADDRESS"),
    ("server.port", "DIPLOMAS_SERVER_PORT"),
    ("server.graceful_shutdown_secs", "DIPLOMAS_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ("logging.level", "DIPLOMAS_LOGGING_LEVEL"),
    ("logging.format", "DIPLOMAS_LOGGING_FORMAT"),
    ("workflow.rejection_policy", "DIPLOMAS_WORKFLOW_REJECTION_POLICY"),
    ("workflow.role_matching", "DIPLOMAS_WORKFLOW_ROLE_MATCHING"),
];

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for &(key_path, env_key) in FIELDS {
        let source = field_source(
            key_path,
            &env_keys(env_key),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(key_path, &effective_value(&config, key_path), source));
    }

    let steps = config
        .workflow
        .template
        .steps
        .iter()
        .map(|step| match step.required_role.as_deref() {
            Some(role) => format!("{} [{role}]", step.title),
            None => step.title.clone(),
        })
        .collect::<Vec<_>>()
        .join(" -> ");
    lines.push(render_line(
        "workflow.steps",
        &steps,
        field_source("workflow.steps", &[], config_file_doc.as_ref(), config_file_path.as_deref()),
    ));

    lines.join("\n")
}

fn effective_value(config: &AppConfig, key_path: &str) -> String {
    match key_path {
        "database.url" => config.database.url.clone(),
        "database.max_connections" => config.database.max_connections.to_string(),
        "database.timeout_secs" => config.database.timeout_secs.to_string(),
        "server.bind_address" => config.server.bind_address.clone(),
        "server.port" => config.server.port.to_string(),
        "server.graceful_shutdown_secs" => config.server.graceful_shutdown_secs.to_string(),
        "logging.level" => config.logging.level.clone(),
        "logging.format" => format!("{:?}", config.logging.format),
        "workflow.rejection_policy" => format!("{:?}", config.workflow.rejection_policy),
        "workflow.role_matching" => format!("{:?}", config.workflow.role_matching),
        _ => "<unknown>".to_string(),
    }
}

/// Logging keys also accept the short `DIPLOMAS_LOG_*` aliases.
fn env_keys(env_key: &'static str) -> Vec<&'static str> {
    match env_key {
        "DIPLOMAS_LOGGING_LEVEL" => vec![env_key, "DIPLOMAS_LOG_LEVEL"],
        "DIPLOMAS_LOGGING_FORMAT" => vec![env_key, "DIPLOMAS_LOG_FORMAT"],
        _ => vec![env_key],
    }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
