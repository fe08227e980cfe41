//! Meta-API loaders: Fabric and the forks that publish the same API shape
//! (Quilt, LegacyFabric). Their "installer" is a JSON profile.

use super::server_jar::ServerJarAssembler;
use super::{LaunchArguments, LoaderContext, ResolvedLoader};
use crate::error::{InstallError, InstallResult};
use crate::game::installer::config::Endpoints;
use crate::game::installer::core::artifact::{ArtifactRef, HashAlgorithm, HashCode};
use crate::game::installer::core::downloader::download_json;
use crate::game::installer::core::traits::LoaderStrategy;
use crate::game::installer::modloaders::forge::processor::ProcessorRunner;
use crate::game::installer::modloaders::forge::profile::InstallProfile;
use crate::game::installer::types::{LoaderKind, LoaderRequest, LoaderVersionSelector, Side};
use crate::utils::maven::MavenCoordinate;
use crate::utils::version::is_below;
use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Which meta service a [`MetaLoader`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaFlavor {
    Fabric,
    Quilt,
    LegacyFabric,
}

impl MetaFlavor {
    pub fn kind(&self) -> LoaderKind {
        match self {
            MetaFlavor::Fabric => LoaderKind::Fabric,
            MetaFlavor::Quilt => LoaderKind::Quilt,
            MetaFlavor::LegacyFabric => LoaderKind::LegacyFabric,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            MetaFlavor::Fabric => "Fabric",
            MetaFlavor::Quilt => "Quilt",
            MetaFlavor::LegacyFabric => "LegacyFabric",
        }
    }

    pub fn meta_url<'a>(&self, endpoints: &'a Endpoints) -> &'a str {
        match self {
            MetaFlavor::Fabric => &endpoints.fabric_meta,
            MetaFlavor::Quilt => &endpoints.quilt_meta,
            MetaFlavor::LegacyFabric => &endpoints.legacy_fabric_meta,
        }
    }

    pub fn maven_url<'a>(&self, endpoints: &'a Endpoints) -> &'a str {
        match self {
            MetaFlavor::Fabric => &endpoints.fabric_maven,
            MetaFlavor::Quilt => &endpoints.quilt_maven,
            MetaFlavor::LegacyFabric => &endpoints.legacy_fabric_maven,
        }
    }

    /// Entry point of the generated launch jar. It reads the real main class
    /// from the bundled launch properties.
    pub fn server_launcher_main_class(&self) -> &'static str {
        match self {
            MetaFlavor::Fabric | MetaFlavor::LegacyFabric => {
                "net.fabricmc.loader.launch.server.FabricServerLauncher"
            }
            MetaFlavor::Quilt => "org.quiltmc.loader.impl.launch.server.QuiltServerLauncher",
        }
    }

    /// Prefix of the generated server files.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            MetaFlavor::Fabric | MetaFlavor::LegacyFabric => "fabric",
            MetaFlavor::Quilt => "quilt",
        }
    }

    /// Loader versions below this are shaded into the launch jar; at or above it
    /// the jar only carries a `Class-Path`. `None` means always shade.
    pub fn shading_threshold(&self) -> Option<&'static str> {
        match self {
            MetaFlavor::LegacyFabric => Some("0.12.5"),
            MetaFlavor::Fabric | MetaFlavor::Quilt => None,
        }
    }

    pub fn shades(&self, loader_version: &str) -> bool {
        self.shading_threshold()
            .map(|threshold| is_below(loader_version, threshold))
            .unwrap_or(true)
    }
}

#[derive(Debug, Deserialize)]
struct LoaderListEntry {
    loader: LoaderInfo,
}

#[derive(Debug, Deserialize)]
struct LoaderInfo {
    version: String,
    #[serde(default)]
    stable: Option<bool>,
}

impl LoaderInfo {
    /// Quilt omits `stable`; its pre-releases carry a `-` suffix instead.
    fn is_stable(&self) -> bool {
        self.stable.unwrap_or_else(|| !self.version.contains('-'))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaProfile {
    pub id: String,
    #[serde(default)]
    pub inherits_from: Option<String>,
    pub main_class: String,
    #[serde(default)]
    pub arguments: Option<serde_json::Value>,
    #[serde(default)]
    pub libraries: Vec<MetaLibrary>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetaLibrary {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

pub struct MetaLoader {
    flavor: MetaFlavor,
    version: Option<String>,
    profile: Option<MetaProfile>,
}

pub fn loader() -> MetaLoader {
    MetaLoader::new(MetaFlavor::Fabric)
}

impl MetaLoader {
    pub fn new(flavor: MetaFlavor) -> Self {
        Self {
            flavor,
            version: None,
            profile: None,
        }
    }

    pub fn flavor(&self) -> MetaFlavor {
        self.flavor
    }

    fn loader_list_url(&self, ctx: &LoaderContext) -> String {
        format!(
            "{}/versions/loader/{}",
            self.flavor.meta_url(&ctx.config.endpoints).trim_end_matches('/'),
            ctx.minecraft_version()
        )
    }

    fn profile(&self) -> InstallResult<&MetaProfile> {
        self.profile.as_ref().ok_or_else(|| {
            InstallError::config(format!(
                "{} profile requested before version resolution",
                self.flavor.display_name()
            ))
        })
    }

    fn version(&self) -> InstallResult<&str> {
        self.version.as_deref().ok_or_else(|| {
            InstallError::config(format!("{} version not resolved", self.flavor.display_name()))
        })
    }

    async fn latest(&self, ctx: &LoaderContext) -> InstallResult<String> {
        let url = self.loader_list_url(ctx);
        let entries: Vec<LoaderListEntry> = download_json(&ctx.client, &url).await?;
        let chosen = entries
            .iter()
            .find(|e| e.loader.is_stable())
            .or_else(|| entries.first())
            .ok_or_else(|| {
                InstallError::config(format!(
                    "no {} loader versions for Minecraft {}",
                    self.flavor.display_name(),
                    ctx.minecraft_version()
                ))
            })?;
        Ok(chosen.loader.version.clone())
    }

    async fn check_exact(&self, ctx: &LoaderContext, version: &str) -> InstallResult<()> {
        let url = format!("{}/{}", self.loader_list_url(ctx), version);
        let response = ctx
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| InstallError::transport(&url, e))?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => Err(InstallError::config(format!(
                "{} {} does not exist for Minecraft {}",
                self.flavor.display_name(),
                version,
                ctx.minecraft_version()
            ))),
            status => Err(InstallError::transport(url, format!("HTTP error {}", status))),
        }
    }

    async fn fetch_profile(&self, ctx: &LoaderContext, version: &str) -> InstallResult<MetaProfile> {
        let kind = match ctx.side() {
            Side::Client => "profile",
            Side::Server => "server",
        };
        let url = format!("{}/{}/{}/json", self.loader_list_url(ctx), version, kind);
        download_json(&ctx.client, &url).await
    }

    async fn resolve(&mut self, ctx: &LoaderContext, request: &LoaderRequest) -> InstallResult<String> {
        let version = match &request.selector {
            // Meta services mark builds stable, not recommended.
            LoaderVersionSelector::Latest | LoaderVersionSelector::Recommended => self.latest(ctx).await?,
            LoaderVersionSelector::Exact(v) => {
                self.check_exact(ctx, v).await?;
                v.clone()
            }
            LoaderVersionSelector::Pinned(v) => v.clone(),
        };
        log::info!(
            "Using {} loader version: {}",
            self.flavor.display_name(),
            version
        );

        let profile = self.fetch_profile(ctx, &version).await?;
        log::debug!(
            "{} profile {} inherits {:?}",
            self.flavor.display_name(),
            profile.id,
            profile.inherits_from
        );
        self.profile = Some(profile);
        self.version = Some(version.clone());
        Ok(version)
    }

    fn library_refs(&self, ctx: &LoaderContext) -> InstallResult<Vec<ArtifactRef>> {
        let profile = self.profile()?;
        let default_maven = self.flavor.maven_url(&ctx.config.endpoints);
        profile
            .libraries
            .iter()
            .map(|library| {
                let coords = MavenCoordinate::parse(&library.name)?;
                let repository = library.url.as_deref().unwrap_or(default_maven);
                let hash = library
                    .sha1
                    .as_deref()
                    .map(|sha1| HashCode::parse(HashAlgorithm::Sha1, sha1))
                    .transpose()?;
                Ok(ArtifactRef::new(
                    coords.to_string(),
                    coords.url(repository),
                    coords.local_path(&ctx.paths.libraries_dir),
                )
                .with_optional_size(library.size)
                .with_optional_hash(hash))
            })
            .collect()
    }

    fn server_jar_name(&self) -> String {
        format!("{}-server-launch.jar", self.flavor.file_prefix())
    }

    async fn assemble_server(&self, ctx: &LoaderContext) -> InstallResult<()> {
        let profile = self.profile()?;
        let version = self.version()?;
        let libraries: Vec<_> = self
            .library_refs(ctx)?
            .into_iter()
            .map(|a| a.destination)
            .collect();
        let prefix = self.flavor.file_prefix();
        let root = ctx.paths.root.clone();
        let output = root.join(self.server_jar_name());
        let assembler = ServerJarAssembler::new(self.flavor.server_launcher_main_class())
            .with_entry(
                format!("{}-server-launch.properties", prefix),
                format!("launch.mainClass={}\n", profile.main_class),
            )
            .with_libraries(libraries)
            .shade(self.flavor.shades(version))
            .class_path_root(&root);

        log::info!(
            "Assembling {} server launch jar ({})",
            self.flavor.display_name(),
            if assembler.is_shading() { "shaded" } else { "class-path" }
        );
        tokio::task::spawn_blocking(move || assembler.write_to(&output))
            .await
            .map_err(|e| InstallError::Other(e.into()))??;

        let server_jar = ctx
            .paths
            .minecraft_jar
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| InstallError::config("server jar path has no file name"))?;
        tokio::fs::write(
            root.join(format!("{}-server-launcher.properties", prefix)),
            format!("serverJar={}\n", server_jar),
        )
        .await?;
        Ok(())
    }

    /// Keep the loader profile beside the vanilla versions so a launcher can
    /// find it by id.
    async fn write_client_profile(&self, ctx: &LoaderContext) -> InstallResult<()> {
        let profile = self.profile()?;
        let dir = ctx.paths.versions_dir.join(&profile.id);
        tokio::fs::create_dir_all(&dir).await?;
        let body = serde_json::to_vec_pretty(profile)?;
        crate::game::installer::transaction::write_atomic(&dir.join(format!("{}.json", profile.id)), &body)
            .await
    }
}

impl LoaderStrategy for MetaLoader {
    fn kind(&self) -> LoaderKind {
        self.flavor.kind()
    }

    fn resolve_version<'a>(
        &'a mut self,
        ctx: &'a LoaderContext,
        request: &'a LoaderRequest,
    ) -> BoxFuture<'a, InstallResult<String>> {
        Box::pin(self.resolve(ctx, request))
    }

    fn download_and_extract_installer<'a>(
        &'a mut self,
        _ctx: &'a LoaderContext,
    ) -> BoxFuture<'a, InstallResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn install_profile(&self, _ctx: &LoaderContext) -> InstallResult<Option<InstallProfile>> {
        Ok(None)
    }

    fn libraries(&self, ctx: &LoaderContext) -> InstallResult<Vec<ArtifactRef>> {
        self.library_refs(ctx)
    }

    fn run_processors<'a>(
        &'a mut self,
        ctx: &'a LoaderContext,
        _runner: &'a dyn ProcessorRunner,
    ) -> BoxFuture<'a, InstallResult<()>> {
        Box::pin(async move {
            match ctx.side() {
                Side::Server => self.assemble_server(ctx).await,
                Side::Client => self.write_client_profile(ctx).await,
            }
        })
    }

    fn resolved(&self, ctx: &LoaderContext) -> InstallResult<ResolvedLoader> {
        let profile = self.profile()?;
        Ok(ResolvedLoader {
            kind: self.flavor.kind(),
            version: self.version()?.to_string(),
            main_class: profile.main_class.clone(),
            libraries: self.library_refs(ctx)?,
            arguments: LaunchArguments::from_version_json(profile.arguments.as_ref(), None),
            server_jar: ctx.side().is_server().then(|| self.server_jar_name()),
        })
    }
}
