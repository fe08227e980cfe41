/// Readers for the files an extracted Forge/NeoForge installer carries.
use super::profile::{ForgeInstallProfile, ForgeVersionInfo};
use crate::error::{InstallError, InstallResult};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Parse `install_profile.json` from an extracted installer.
pub async fn parse_install_profile(extracted_dir: &Path) -> InstallResult<ForgeInstallProfile> {
    let path = extracted_dir.join("install_profile.json");
    log::debug!("Parsing install profile from {:?}", path);
    let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
        InstallError::config(format!("install_profile.json missing from installer: {}", e))
    })?;
    let profile: ForgeInstallProfile = serde_json::from_str(&contents)?;
    match &profile {
        ForgeInstallProfile::Modern(p) => log::debug!(
            "Parsed install profile: spec={}, processors={}",
            p.spec,
            p.processors.len()
        ),
        ForgeInstallProfile::Legacy(p) => {
            log::debug!("Parsed legacy install profile for {}", p.version_info.id)
        }
    }
    Ok(profile)
}

/// Parse the loader version JSON named by the profile's `json` field
/// (`/version.json` when absent).
pub async fn parse_version_json(
    extracted_dir: &Path,
    json_path: Option<&str>,
) -> InstallResult<ForgeVersionInfo> {
    let relative = json_path.unwrap_or("/version.json").trim_start_matches('/');
    let path = relative
        .split('/')
        .fold(extracted_dir.to_path_buf(), |acc, segment| acc.join(segment));
    log::debug!("Parsing version.json from {:?}", path);
    let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
        InstallError::config(format!("{} missing from installer: {}", relative, e))
    })?;
    let version_info: ForgeVersionInfo = serde_json::from_str(&contents)?;
    log::debug!(
        "Parsed version info: id={}, inheritsFrom={:?}",
        version_info.id,
        version_info.inherits_from
    );
    Ok(version_info)
}

/// Location of a bundled library inside the extracted installer's `maven/` tree.
pub fn bundled_library(extracted_dir: &Path, relative_path: &str) -> Option<PathBuf> {
    let path = relative_path
        .split('/')
        .fold(extracted_dir.join("maven"), |acc, segment| acc.join(segment));
    path.is_file().then_some(path)
}

/// Read `Main-Class` from a jar's manifest. Continuation lines are unfolded.
pub fn extract_main_class_from_jar(jar_path: &Path) -> InstallResult<String> {
    let file = std::fs::File::open(jar_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut manifest_file = archive.by_name("META-INF/MANIFEST.MF").map_err(|_| {
        InstallError::config(format!("MANIFEST.MF not found in {}", jar_path.display()))
    })?;

    let mut manifest_content = String::new();
    manifest_file.read_to_string(&mut manifest_content)?;

    let mut unfolded: Vec<String> = Vec::new();
    for line in manifest_content.lines() {
        match (line.strip_prefix(' '), unfolded.last_mut()) {
            (Some(rest), Some(previous)) => previous.push_str(rest),
            _ => unfolded.push(line.to_string()),
        }
    }

    unfolded
        .iter()
        .find_map(|line| line.strip_prefix("Main-Class:").map(|v| v.trim().to_string()))
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            InstallError::config(format!(
                "Main-Class attribute not found in {}",
                jar_path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    #[test]
    fn main_class_from_wrapped_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("tool.jar");
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&jar).unwrap());
        zip.start_file("META-INF/MANIFEST.MF", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(
            b"Manifest-Version: 1.0\r\nMain-Class: net.minecraftforge.binarypatcher.Cons\r\n ole\r\n\r\n",
        )
        .unwrap();
        zip.finish().unwrap();

        assert_eq!(
            extract_main_class_from_jar(&jar).unwrap(),
            "net.minecraftforge.binarypatcher.Console"
        );
    }

    #[test]
    fn missing_manifest_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("empty.jar");
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&jar).unwrap());
        zip.start_file("a.txt", SimpleFileOptions::default()).unwrap();
        zip.finish().unwrap();
        let err = extract_main_class_from_jar(&jar).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ConfigurationError);
    }

    #[tokio::test]
    async fn version_json_from_custom_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(
            dir.path().join("data/version.json"),
            r#"{"id": "neoforge-21.1.65", "mainClass": "cpw.mods.bootstraplauncher.BootstrapLauncher"}"#,
        )
        .unwrap();
        let info = parse_version_json(dir.path(), Some("/data/version.json")).await.unwrap();
        assert_eq!(info.id, "neoforge-21.1.65");
        assert!(info.libraries.is_empty());
    }
}
