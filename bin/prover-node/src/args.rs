use std::{fs, path::PathBuf};

use argh::FromArgs;
use toml::value::Table;
use trellis_config::Config;

use crate::errors::ConfigError;

#[derive(Debug, Clone, FromArgs)]
#[argh(description = "Trellis epoch prover node")]
pub struct Args {
    // Config non-overriding args
    #[argh(option, short = 'c', description = "path to configuration")]
    pub config: Option<PathBuf>,

    #[argh(option, default = "1", description = "number of the epoch to prove")]
    pub epoch: u64,

    #[argh(option, default = "2", description = "blocks in the epoch")]
    pub blocks: usize,

    #[argh(option, default = "4", description = "transactions per block")]
    pub txs_per_block: usize,

    #[argh(option, default = "0", description = "seed for the synthetic workload")]
    pub seed: u64,

    // Config overriding args
    /// Number of proving agents, overriding `agents.count`.
    #[argh(option, description = "number of proving agents")]
    pub agents: Option<usize>,

    /// Other generic overrides to the config toml.
    /// Will be used, for example, as `-o broker.max_retries=5 -o prover.simulated_delay_ms=20`
    #[argh(option, short = 'o', description = "generic config overrides")]
    pub overrides: Vec<String>,
}

impl Args {
    /// Get strings of overrides gathered from args.
    pub fn get_overrides(&self) -> Vec<String> {
        let mut overrides = self.overrides.clone();
        overrides.extend(self.get_direct_overrides());
        overrides
    }

    /// Overrides passed directly as args and not as overrides.
    fn get_direct_overrides(&self) -> Vec<String> {
        let mut overrides = Vec::new();
        if let Some(agents) = self.agents {
            overrides.push(format!("agents.count={agents}"));
        }
        overrides
    }
}

/// Builds the config from defaults, then the config file if one was given, then overrides.
pub fn get_config(args: &Args) -> Result<Config, ConfigError> {
    let mut table = match toml::Value::try_from(Config::default())? {
        toml::Value::Table(table) => table,
        _ => Table::new(),
    };

    if let Some(path) = &args.config {
        let file: Table = toml::from_str(&fs::read_to_string(path)?)?;
        merge_tables(&mut table, file);
    }

    for (path, value) in args
        .get_overrides()
        .iter()
        .map(|o| parse_override(o))
        .collect::<Result<Vec<_>, _>>()?
    {
        apply_override(&path, value, &mut table)?;
    }

    Ok(toml::Value::Table(table).try_into()?)
}

/// Recursively writes `overlay` over `base`. Tables are merged, everything else replaced.
fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base)), toml::Value::Table(overlay)) => {
                merge_tables(base, overlay)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

type Override = (String, toml::Value);

/// Parses an override. This first splits the string by '=' to get key and value and then splits
/// the key by '.' which is the update path.
pub fn parse_override(override_str: &str) -> Result<Override, ConfigError> {
    let (key, value_str) = override_str
        .split_once('=')
        .ok_or(ConfigError::InvalidOverride(override_str.to_string()))?;
    Ok((key.to_string(), parse_value(value_str)))
}

/// Apply override to config.
pub fn apply_override(
    path: &str,
    value: toml::Value,
    table: &mut Table,
) -> Result<(), ConfigError> {
    match path.split_once('.') {
        None => {
            table.insert(path.to_string(), value);
            Ok(())
        }
        Some((key, rest)) => {
            if let Some(t) = table.get_mut(key).and_then(|v| v.as_table_mut()) {
                apply_override(rest, value, t)
            } else if table.contains_key(key) {
                Err(ConfigError::TraverseNonTableAt(key.to_string()))
            } else {
                Err(ConfigError::MissingKey(key.to_string()))
            }
        }
    }
}

/// Parses a string into a toml value. Tries `i64`, then `f64`, then `bool`, and defaults to
/// `String`.
fn parse_value(str_value: &str) -> toml::Value {
    str_value
        .parse::<i64>()
        .map(toml::Value::Integer)
        .or_else(|_| str_value.parse::<f64>().map(toml::Value::Float))
        .or_else(|_| str_value.parse::<bool>().map(toml::Value::Boolean))
        .unwrap_or_else(|_| toml::Value::String(str_value.to_string()))
}
