use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::MutationEngine;
use crate::error::ConfigError;
use crate::filter::MethodFilter;
use crate::operators::{Mutator, OperatorRegistry};
use crate::prescan::{DEFAULT_AVOIDED_CALLS, DEFAULT_EXCLUDED_ORIGINS};
use crate::source::ByteSource;

/// Engine settings as read from a JSON config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub mutators: Vec<Mutator>,
    /// Method names to mutate; empty means every method.
    pub target_methods: Vec<String>,
    pub excluded_origins: Vec<String>,
    pub avoided_calls: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            mutators: vec![Mutator::Defaults],
            target_methods: Vec::new(),
            excluded_origins: DEFAULT_EXCLUDED_ORIGINS.iter().map(|s| s.to_string()).collect(),
            avoided_calls: DEFAULT_AVOIDED_CALLS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn method_filter(&self) -> MethodFilter {
        if self.target_methods.is_empty() {
            MethodFilter::all()
        } else {
            MethodFilter::named(self.target_methods.iter().cloned())
        }
    }

    pub fn registry(&self) -> OperatorRegistry {
        OperatorRegistry::from_mutators(&self.mutators)
    }

    pub fn build_engine<S: ByteSource>(&self, source: S) -> MutationEngine<S> {
        MutationEngine::new(source, self.registry(), self.method_filter())
            .with_excluded_origins(&self.excluded_origins)
            .with_avoided_calls(&self.avoided_calls)
    }
}
