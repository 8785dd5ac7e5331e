//! Configuration parser with environment variable substitution

use crate::{Config, ConfigError, DEFAULT_CONFIG_PATH, Result};
use regex::{Captures, Regex};
use std::path::Path;
use tracing::{debug, info};

/// Longest identifier the daemon will generate
pub const MAX_ID_LENGTH: usize = 64;

/// Parse a YAML configuration file
pub fn parse_file(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    debug!("Parsing config file {}", path.display());
    parse_str(&content)
}

/// Parse YAML configuration from a string
///
/// Command strings have `${VAR}` references substituted from the process
/// environment before validation.
pub fn parse_str(content: &str) -> Result<Config> {
    // An empty document is an empty config, not a YAML error
    if content.trim().is_empty() {
        return Ok(Config::default());
    }

    let mut config: Config = serde_yaml::from_str(content)?;
    for command in config.aliases.values_mut().chain(config.autostart.values_mut()) {
        *command = substitute_env_vars(command)?;
    }
    validate_config(&config)?;
    Ok(config)
}

/// Load the file at `path`, or the default file when `path` is `None`
///
/// An explicitly named file must exist. A missing default file yields an
/// empty configuration.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => parse_file(path),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                parse_file(default)
            } else {
                info!("No {} found, running with an empty config", DEFAULT_CONFIG_PATH);
                Ok(Config::default())
            }
        }
    }
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    for (section, table) in [("alias", &config.aliases), ("autostart", &config.autostart)] {
        for (name, command) in table {
            if name.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{} names must not be empty",
                    section
                )));
            }
            if command.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{} '{}' has an empty command",
                    section, name
                )));
            }
        }
    }

    let id_length = config.settings.id_length;
    if id_length == 0 || id_length > MAX_ID_LENGTH {
        return Err(ConfigError::ValidationError(format!(
            "id_length must be between 1 and {}, got {}",
            MAX_ID_LENGTH, id_length
        )));
    }

    if config.settings.output_limit_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "output_limit_bytes must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

/// Substitute environment variables in a string
///
/// Supports `${VAR}` and `${VAR:-default}`.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    substitute_with(input, |name| std::env::var(name).ok())
}

/// Substitute `${VAR}` references using `lookup`
pub fn substitute_with<F>(input: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let re = Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::ValidationError(format!("bad variable pattern: {}", e)))?;
    let mut missing = Vec::new();

    let result = re.replace_all(input, |cap: &Captures<'_>| {
        let var_expr = &cap[1];

        // Handle default values: ${VAR:-default}
        let (var_name, default_value) = match var_expr.find(":-") {
            Some(pos) => (&var_expr[..pos], Some(&var_expr[pos + 2..])),
            None => (var_expr, None),
        };

        match (lookup(var_name), default_value) {
            (Some(value), _) => value,
            (None, Some(default)) => default.to_string(),
            (None, None) => {
                missing.push(var_name.to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(ConfigError::EnvVarNotFound(missing.join(", ")));
    }

    Ok(result.into_owned())
}
