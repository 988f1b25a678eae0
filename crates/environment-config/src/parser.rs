//! Configuration parser with environment variable substitution

use crate::{ConfigError, EnvironmentConfig, Result};
use regex::Regex;
use serde_json::Value;
use std::path::Path;

/// Parse a YAML configuration file
pub fn parse_file(path: impl AsRef<Path>) -> Result<EnvironmentConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_str(&content)
}

/// Parse YAML configuration from a string
///
/// `${VAR}` and `${VAR:-default}` are substituted in the name and in every
/// string of the service settings.
pub fn parse_str(content: &str) -> Result<EnvironmentConfig> {
    let mut config: EnvironmentConfig = serde_yaml::from_str(content)?;

    if let Some(name) = &config.name {
        config.name = Some(substitute_env_vars(name)?);
    }
    for decl in config.services.values_mut() {
        substitute_value(&mut decl.settings)?;
    }

    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration
///
/// Cycles are not checked here; the environment rejects them when built.
fn validate_config(config: &EnvironmentConfig) -> Result<()> {
    if config.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ConfigError::ValidationError(
            "Environment name must not be empty".to_string(),
        ));
    }

    for (id, decl) in &config.services {
        if decl.kind.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Service '{}' has no kind",
                id
            )));
        }

        for dep in &decl.depends_on {
            if dep == id {
                return Err(ConfigError::ValidationError(format!(
                    "Service '{}' depends on itself",
                    id
                )));
            }
            if !config.services.contains_key(dep) {
                return Err(ConfigError::ValidationError(format!(
                    "Service '{}' depends on unknown service '{}'",
                    id, dep
                )));
            }
        }
    }

    Ok(())
}

/// Substitute environment variables in a string
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::ValidationError(format!("Bad substitution pattern: {}", e)))?;
    let mut result = String::with_capacity(input.len());
    let mut last = 0;
    let mut missing = Vec::new();

    for cap in re.captures_iter(input) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let var_expr = &cap[1];

        // ${VAR:-default}
        let (var_name, default_value) = match var_expr.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (var_expr, None),
        };

        result.push_str(&input[last..full_match.start()]);
        match (std::env::var(var_name), default_value) {
            (Ok(value), _) => result.push_str(&value),
            (Err(_), Some(default)) => result.push_str(default),
            (Err(_), None) => missing.push(var_name.to_string()),
        }
        last = full_match.end();
    }
    result.push_str(&input[last..]);

    if !missing.is_empty() {
        return Err(ConfigError::EnvVarNotFound(missing.join(", ")));
    }

    Ok(result)
}

fn substitute_value(value: &mut Value) -> Result<()> {
    match value {
        Value::String(s) => *s = substitute_env_vars(s)?,
        Value::Array(items) => {
            for item in items {
                substitute_value(item)?;
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                substitute_value(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}
