//! Turns configured command strings into service specifications
//!
//! A command string is split on whitespace into a program and its
//! arguments. When the program names an alias, the alias's command line is
//! substituted and the remaining arguments are appended. Alias resolution is
//! one level deep.

use crate::{Config, ConfigError, Result};
use supervisor_core::ServiceSpec;

/// A program with its positional arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Program to execute
    pub program: String,
    /// Positional arguments
    pub args: Vec<String>,
}

impl CommandLine {
    /// Split `line` on whitespace, failing when it holds no program
    pub fn parse(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| ConfigError::ValidationError("empty command line".to_string()))?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    /// Append extra positional arguments
    pub fn with_args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.args.extend(args);
        self
    }

    /// Specification running this command line from the default directory
    pub fn into_spec(self) -> ServiceSpec {
        ServiceSpec::new(self.program).with_args(self.args)
    }
}

/// Command line registered under alias `name`
pub fn resolve_alias(config: &Config, name: &str) -> Result<CommandLine> {
    let command = config
        .aliases
        .get(name)
        .ok_or_else(|| ConfigError::UnknownAlias(name.to_string()))?;
    CommandLine::parse(command)
}

/// Resolve `line`, expanding an alias in program position
fn expand(config: &Config, line: &str) -> Result<CommandLine> {
    let parsed = CommandLine::parse(line)?;
    if config.aliases.contains_key(&parsed.program) {
        let CommandLine { program, args } = parsed;
        return Ok(resolve_alias(config, &program)?.with_args(args));
    }
    Ok(parsed)
}

/// Service specifications for every autostart entry, ordered by name
pub fn autostart_specs(config: &Config) -> Result<Vec<(String, ServiceSpec)>> {
    config
        .autostart
        .iter()
        .map(|(name, line)| Ok((name.clone(), expand(config, line)?.into_spec())))
        .collect()
}
