// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `ConfigLoader` collaborator (spec §4.3, §6): loads a project's
//! effective config, optionally resolving relative paths against the
//! project directory.

use std::path::PathBuf;

use async_trait::async_trait;
use qm_core::Result;
use serde::{Deserialize, Serialize};

/// The subset of config this crate cares about: where the state store
/// lives and the event bus buffer size. Unknown fields are tolerated on
/// read (spec §6) — the full config *schema* is out of scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub state: StateSection,
    pub event_bus: EventBusSection,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSection {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusSection {
    pub buffer_size: Option<usize>,
}

/// Resolves the process-wide global config file path (spec §6
/// `GlobalConfigPath()`). Treated as opaque bytes by the snapshot engine.
pub fn global_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| {
        qm_core::Error::InvalidPath(PathBuf::from("$HOME (unresolvable)"))
    })?;
    Ok(home.join(".quorum").join("config.yaml"))
}

#[async_trait]
pub trait ConfigLoader: Send + Sync {
    async fn load(&self) -> Result<ProjectConfig>;
}

/// YAML-backed loader, tolerant of unknown fields and missing files (an
/// absent config file loads as `ProjectConfig::default()`).
pub struct YamlConfigLoader {
    config_path: PathBuf,
    project_dir: PathBuf,
    resolve_paths: bool,
}

impl YamlConfigLoader {
    pub fn new(config_path: impl Into<PathBuf>, project_dir: impl Into<PathBuf>, resolve_paths: bool) -> Self {
        Self {
            config_path: config_path.into(),
            project_dir: project_dir.into(),
            resolve_paths,
        }
    }

    fn resolve(&self, p: PathBuf) -> PathBuf {
        if self.resolve_paths && p.is_relative() {
            self.project_dir.join(p)
        } else {
            p
        }
    }
}

#[async_trait]
impl ConfigLoader for YamlConfigLoader {
    async fn load(&self) -> Result<ProjectConfig> {
        if !self.config_path.is_file() {
            return Ok(ProjectConfig::default());
        }
        let bytes = std::fs::read(&self.config_path)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ProjectConfig::default());
        }
        let mut cfg: ProjectConfig = serde_yaml::from_slice(&bytes)?;
        if let Some(path) = cfg.state.path.take() {
            cfg.state.path = Some(self.resolve(path));
        }
        Ok(cfg)
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct FakeConfigLoader {
        config: Arc<Mutex<ProjectConfig>>,
    }

    impl FakeConfigLoader {
        pub fn new(config: ProjectConfig) -> Self {
            Self {
                config: Arc::new(Mutex::new(config)),
            }
        }

        pub fn set(&self, config: ProjectConfig) {
            *self.config.lock() = config;
        }
    }

    #[async_trait]
    impl ConfigLoader for FakeConfigLoader {
        async fn load(&self) -> Result<ProjectConfig> {
            Ok(self.config.lock().clone())
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
