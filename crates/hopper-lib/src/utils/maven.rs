use crate::error::{InstallError, InstallResult};
use std::fmt;
use std::path::{Path, PathBuf};

/// A parsed maven coordinate: `group:artifact:version[:classifier][@extension]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenCoordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub classifier: Option<String>,
    pub extension: String,
}

impl MavenCoordinate {
    pub fn parse(coords: &str) -> InstallResult<Self> {
        let (body, extension) = match coords.split_once('@') {
            Some((body, ext)) => (body, ext.to_string()),
            None => (coords, "jar".to_string()),
        };

        let parts: Vec<&str> = body.split(':').collect();
        if parts.len() < 3 || parts.len() > 4 || parts.iter().any(|p| p.is_empty()) {
            return Err(InstallError::config(format!(
                "Invalid maven coordinates: {}",
                coords
            )));
        }

        Ok(Self {
            group: parts[0].to_string(),
            artifact: parts[1].to_string(),
            version: parts[2].to_string(),
            classifier: parts.get(3).map(|c| c.to_string()),
            extension,
        })
    }

    /// Copy of this coordinate with a different classifier.
    pub fn with_classifier(&self, classifier: &str) -> Self {
        Self {
            classifier: Some(classifier.to_string()),
            ..self.clone()
        }
    }

    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(clf) => format!(
                "{}-{}-{}.{}",
                self.artifact, self.version, clf, self.extension
            ),
            None => format!("{}-{}.{}", self.artifact, self.version, self.extension),
        }
    }

    /// Repository-relative path with forward slashes.
    pub fn relative_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group.replace('.', "/"),
            self.artifact,
            self.version,
            self.file_name()
        )
    }

    pub fn local_path(&self, libraries_dir: &Path) -> PathBuf {
        let mut path = libraries_dir.to_path_buf();
        for segment in self.relative_path().split('/') {
            path.push(segment);
        }
        path
    }

    pub fn url(&self, repository: &str) -> String {
        format!("{}/{}", repository.trim_end_matches('/'), self.relative_path())
    }
}

impl fmt::Display for MavenCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(clf) = &self.classifier {
            write!(f, ":{}", clf)?;
        }
        if self.extension != "jar" {
            write!(f, "@{}", self.extension)?;
        }
        Ok(())
    }
}

/// Convert maven coordinates straight to a path under `libraries_dir`.
pub fn maven_to_path(coords: &str, libraries_dir: &Path) -> InstallResult<PathBuf> {
    Ok(MavenCoordinate::parse(coords)?.local_path(libraries_dir))
}
