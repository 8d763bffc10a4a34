//! Engine configuration for the CLI.

use hostrun_core::EngineConfig;

/// Load the configuration file if given, then apply environment overrides.
pub fn load(path: Option<&str>) -> anyhow::Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    config.apply_env()?;
    tracing::debug!("Deadline {:?}, budget {:?}", config.deadline, config.script_budget);
    Ok(config)
}

/// Print the effective configuration as JSON.
pub fn execute(config: &EngineConfig) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
