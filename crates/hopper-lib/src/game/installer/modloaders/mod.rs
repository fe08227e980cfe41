pub mod fabric;
pub mod forge;
pub mod legacy_fabric;
pub mod neoforge;
pub mod quilt;
pub mod server_jar;

use crate::error::{InstallError, InstallResult};
use crate::game::installer::config::InstallerConfig;
use crate::game::installer::core::artifact::ArtifactRef;
use crate::game::installer::core::hashing::HashEngine;
use crate::game::installer::core::pool::{DownloadPool, PoolContext, PoolReport};
use crate::game::installer::core::traits::LoaderStrategy;
use crate::game::installer::types::{
    CancelToken, InstancePaths, LoaderKind, LoaderRequest, ProgressReporter, Side,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared handles a loader strategy works with during one run.
#[derive(Clone)]
pub struct LoaderContext {
    pub client: Client,
    pub config: Arc<InstallerConfig>,
    pub hashes: Arc<HashEngine>,
    pub reporter: Arc<dyn ProgressReporter>,
    pub cancel: CancelToken,
    pub request: LoaderRequest,
    pub paths: InstancePaths,
}

impl LoaderContext {
    pub fn side(&self) -> Side {
        self.request.side
    }

    pub fn minecraft_version(&self) -> &str {
        &self.request.minecraft_version
    }

    pub fn temp_dir(&self) -> &PathBuf {
        &self.request.temp_dir
    }

    pub fn pool_context(&self, label: impl Into<String>) -> PoolContext {
        PoolContext::new(
            self.client.clone(),
            self.hashes.clone(),
            self.reporter.clone(),
            self.cancel.clone(),
        )
        .with_workers(self.config.concurrency)
        .with_deadline(self.config.pool_deadline())
        .with_label(label)
    }

    /// Fetch a batch where every artifact is mandatory.
    pub async fn fetch_required(
        &self,
        artifacts: Vec<ArtifactRef>,
        label: &str,
    ) -> InstallResult<PoolReport> {
        let pool = DownloadPool::from_artifacts(artifacts);
        pool.execute_all(&self.pool_context(label)).await.into_required()
    }
}

/// Arguments a loader adds on top of the vanilla version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchArguments {
    #[serde(default)]
    pub game: Vec<String>,
    #[serde(default)]
    pub jvm: Vec<String>,
    /// Pre-1.13 single string form (`minecraftArguments`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_minecraft_arguments: Option<String>,
}

impl LaunchArguments {
    /// Plain string arguments from a version JSON `arguments` object. Rule-gated
    /// entries are launch-time concerns and are left to the launcher.
    pub fn from_version_json(arguments: Option<&serde_json::Value>, legacy: Option<String>) -> Self {
        let collect = |key: &str| -> Vec<String> {
            arguments
                .and_then(|a| a.get(key))
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };
        Self {
            game: collect("game"),
            jvm: collect("jvm"),
            legacy_minecraft_arguments: legacy,
        }
    }
}

/// Runtime requirements produced by a loader strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLoader {
    pub kind: LoaderKind,
    pub version: String,
    pub main_class: String,
    pub libraries: Vec<ArtifactRef>,
    pub arguments: LaunchArguments,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_jar: Option<String>,
}

type StrategyFactory = fn() -> Box<dyn LoaderStrategy>;

/// Static table from loader kind to strategy constructor.
pub struct LoaderRegistry {
    factories: HashMap<LoaderKind, StrategyFactory>,
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl LoaderRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Every loader this crate ships.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(LoaderKind::Forge, || Box::new(forge::InstallerLoader::forge()));
        registry.register(LoaderKind::NeoForge, || Box::new(neoforge::loader()));
        registry.register(LoaderKind::Fabric, || Box::new(fabric::loader()));
        registry.register(LoaderKind::Quilt, || Box::new(quilt::loader()));
        registry.register(LoaderKind::LegacyFabric, || Box::new(legacy_fabric::loader()));
        registry
    }

    pub fn register(&mut self, kind: LoaderKind, factory: StrategyFactory) {
        self.factories.insert(kind, factory);
    }

    pub fn create(&self, kind: LoaderKind) -> InstallResult<Box<dyn LoaderStrategy>> {
        self.factories
            .get(&kind)
            .map(|factory| factory())
            .ok_or_else(|| InstallError::config(format!("no strategy registered for loader {}", kind)))
    }

    pub fn supports(&self, kind: LoaderKind) -> bool {
        self.factories.contains_key(&kind)
    }
}
