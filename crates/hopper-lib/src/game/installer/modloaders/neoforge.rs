//! NeoForge shares Forge's installer protocol. What differs is where versions
//! are listed and how they are named.

use super::forge::InstallerLoader;
use super::LoaderContext;
use crate::error::{InstallError, InstallResult};
use crate::game::installer::core::downloader::download_json;
use crate::utils::version::latest_with_prefix;
use serde::Deserialize;

pub fn loader() -> InstallerLoader {
    InstallerLoader::neoforge()
}

/// 1.20.1 NeoForge kept Forge's artifact name.
pub fn artifact_for(minecraft_version: &str) -> &'static str {
    if minecraft_version == "1.20.1" {
        "forge"
    } else {
        "neoforge"
    }
}

/// NeoForge versions drop the leading `1.`: Minecraft 1.21.1 maps to `21.1.x`,
/// and 1.21 to `21.0.x`.
pub fn version_prefix(minecraft_version: &str) -> String {
    if minecraft_version == "1.20.1" {
        return "1.20.1-".to_string();
    }
    let mut parts = minecraft_version.split('.').skip(1);
    let minor = parts.next().unwrap_or("0");
    let patch = parts.next().unwrap_or("0");
    format!("{}.{}.", minor, patch)
}

#[derive(Debug, Deserialize)]
struct MavenVersions {
    #[serde(default)]
    versions: Vec<String>,
}

pub async fn available_versions(ctx: &LoaderContext) -> InstallResult<Vec<String>> {
    let url = format!(
        "{}/net/neoforged/{}",
        ctx.config.endpoints.neoforge_versions.trim_end_matches('/'),
        artifact_for(ctx.minecraft_version())
    );
    let listing: MavenVersions = download_json(&ctx.client, &url).await?;
    Ok(listing.versions)
}

pub async fn latest(ctx: &LoaderContext) -> InstallResult<String> {
    let versions = available_versions(ctx).await?;
    let prefix = version_prefix(ctx.minecraft_version());
    latest_with_prefix(&versions, &prefix).ok_or_else(|| {
        InstallError::config(format!(
            "no NeoForge versions for Minecraft {}",
            ctx.minecraft_version()
        ))
    })
}

pub async fn check_exact(ctx: &LoaderContext, version: &str) -> InstallResult<()> {
    let versions = available_versions(ctx).await?;
    if versions.iter().any(|v| v == version) {
        Ok(())
    } else {
        Err(InstallError::config(format!(
            "NeoForge {} does not exist for Minecraft {}",
            version,
            ctx.minecraft_version()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_per_minecraft_line() {
        assert_eq!(version_prefix("1.20.1"), "1.20.1-");
        assert_eq!(version_prefix("1.20.4"), "20.4.");
        assert_eq!(version_prefix("1.21"), "21.0.");
        assert_eq!(version_prefix("1.21.1"), "21.1.");
    }

    #[test]
    fn artifact_names() {
        assert_eq!(artifact_for("1.20.1"), "forge");
        assert_eq!(artifact_for("1.21.1"), "neoforge");
    }

    #[test]
    fn latest_ignores_other_lines() {
        let versions: Vec<String> = ["21.0.167", "21.1.9", "21.1.65", "21.1.65-beta", "21.3.1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            latest_with_prefix(&versions, &version_prefix("1.21.1")).as_deref(),
            Some("21.1.65")
        );
    }
}
