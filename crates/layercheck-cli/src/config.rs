//! Scenario selection for a CLI run
//!
//! Scenarios come from a YAML suite file when `--config` is given, otherwise
//! from the built-in catalog. Command-line overrides are applied on top:
//! 1. `--pool` / `LAYERCHECK_POOL` moves every scenario (and its Dockerfile
//!    override for the old pool) to another pool
//! 2. `--builder` replaces the builder backend
//! 3. `--skip-cleanup` / `LAYERCHECK_SKIP_CLEANUP` disables teardown

use std::path::Path;

use layercheck_common::resources::BuilderType;
use layercheck_scenario::{catalog, ScenarioOptions, SuiteConfig};

use crate::{Error, Result};

/// Command-line settings that override every selected scenario
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    /// Pool to run in
    pub pool: Option<String>,
    /// Builder backend
    pub builder: Option<BuilderType>,
    /// Leave fixtures in place
    pub skip_cleanup: bool,
}

impl Overrides {
    /// Apply to one scenario
    pub fn apply(&self, mut scenario: ScenarioOptions) -> ScenarioOptions {
        if let Some(pool) = &self.pool {
            if let Some(dockerfile) = scenario.dockerfile_overrides.remove(&scenario.pool_name) {
                scenario.dockerfile_overrides.insert(pool.clone(), dockerfile);
            }
            scenario.pool_name = pool.clone();
        }
        if let Some(builder) = self.builder {
            scenario.builder_type = builder;
        }
        if self.skip_cleanup {
            scenario.skip_cleanup = true;
        }
        scenario
    }
}

/// Load and validate a suite file
pub fn load_suite(path: &Path) -> Result<SuiteConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let suite: SuiteConfig = serde_yaml::from_str(&text).map_err(|source| Error::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    suite.validate()?;
    Ok(suite)
}

/// Available scenarios: the suite file's, or the built-in catalog
pub fn available(config: Option<&Path>) -> Result<Vec<ScenarioOptions>> {
    match config {
        Some(path) => Ok(load_suite(path)?.scenarios),
        None => Ok(catalog::all()),
    }
}

/// Pick scenarios by name, in the order given; every one when `names` is empty
pub fn select(available: Vec<ScenarioOptions>, names: &[String]) -> Result<Vec<ScenarioOptions>> {
    if names.is_empty() {
        return Ok(available);
    }

    let known: Vec<String> = available.iter().map(|s| s.name.clone()).collect();
    names
        .iter()
        .map(|name| {
            available
                .iter()
                .find(|s| &s.name == name)
                .cloned()
                .ok_or_else(|| Error::unknown_scenario(name, &known))
        })
        .collect()
}
