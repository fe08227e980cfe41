//! Runnable server launch jar for meta-API loaders.
//!
//! The launch jar either carries every library's classes itself (shaded) or
//! points at them through a `Class-Path` manifest attribute.

use crate::error::{InstallError, InstallResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
const MANIFEST_LINE_BYTES: usize = 72;

static SIGNATURE_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^META-INF/[^/]+\.(SF|DSA|RSA|EC)$").expect("valid regex"));

/// True for jar signature files that cannot survive repacking.
pub fn is_signature_entry(name: &str) -> bool {
    SIGNATURE_ENTRY.is_match(name)
}

/// Render a jar manifest. Attribute lines are wrapped at 72 bytes with a
/// single-space continuation, CRLF terminated.
pub fn render_manifest(attributes: &[(&str, &str)]) -> String {
    let mut out = String::new();
    for (name, value) in attributes {
        let line = format!("{}: {}", name, value);
        let mut start = 0;
        let mut first = true;
        while start < line.len() {
            // Continuation lines spend one byte on the leading space.
            let room = if first { MANIFEST_LINE_BYTES } else { MANIFEST_LINE_BYTES - 1 };
            let mut end = (start + room).min(line.len());
            while !line.is_char_boundary(end) {
                end -= 1;
            }
            if !first {
                out.push(' ');
            }
            out.push_str(&line[start..end]);
            out.push_str("\r\n");
            start = end;
            first = false;
        }
    }
    out.push_str("\r\n");
    out
}

/// Counts from one assembly, mostly for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledJar {
    pub path: PathBuf,
    pub entries: usize,
    pub skipped_duplicates: usize,
    pub skipped_signatures: usize,
}

#[derive(Debug, Clone)]
pub struct ServerJarAssembler {
    main_class: String,
    extra_entries: Vec<(String, Vec<u8>)>,
    libraries: Vec<PathBuf>,
    shade: bool,
    class_path_root: PathBuf,
}

impl ServerJarAssembler {
    pub fn new(main_class: impl Into<String>) -> Self {
        Self {
            main_class: main_class.into(),
            extra_entries: Vec::new(),
            libraries: Vec::new(),
            shade: true,
            class_path_root: PathBuf::new(),
        }
    }

    /// Add a generated file, written straight after the manifest.
    pub fn with_entry(mut self, name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.extra_entries.push((name.into(), contents.into()));
        self
    }

    /// Library jars in classpath order.
    pub fn with_libraries(mut self, libraries: Vec<PathBuf>) -> Self {
        self.libraries = libraries;
        self
    }

    pub fn shade(mut self, shade: bool) -> Self {
        self.shade = shade;
        self
    }

    /// Directory `Class-Path` entries are made relative to (where the jar lives).
    pub fn class_path_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.class_path_root = root.into();
        self
    }

    pub fn is_shading(&self) -> bool {
        self.shade
    }

    /// Space separated, forward-slash relative paths of every library.
    pub fn class_path(&self) -> InstallResult<String> {
        let mut entries = Vec::with_capacity(self.libraries.len());
        for library in &self.libraries {
            let relative = library.strip_prefix(&self.class_path_root).map_err(|_| {
                InstallError::config(format!(
                    "library {} is outside {}",
                    library.display(),
                    self.class_path_root.display()
                ))
            })?;
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            entries.push(parts.join("/"));
        }
        Ok(entries.join(" "))
    }

    /// Write the jar. Output goes to a sibling `.part` file first and is
    /// renamed into place once complete.
    pub fn write_to(&self, output: &Path) -> InstallResult<AssembledJar> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let part = output.with_extension("jar.part");
        let result = self.write_part(&part, output);
        match result {
            Ok(assembled) => {
                std::fs::rename(&part, output)?;
                log::info!(
                    "[server-jar] wrote {:?}: {} entries, {} duplicates and {} signatures skipped",
                    output,
                    assembled.entries,
                    assembled.skipped_duplicates,
                    assembled.skipped_signatures
                );
                Ok(assembled)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&part);
                Err(e)
            }
        }
    }

    fn write_part(&self, part: &Path, output: &Path) -> InstallResult<AssembledJar> {
        let mut zip = ZipWriter::new(BufWriter::new(File::create(part)?));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut seen: HashSet<String> = HashSet::new();
        let mut assembled = AssembledJar {
            path: output.to_path_buf(),
            entries: 0,
            skipped_duplicates: 0,
            skipped_signatures: 0,
        };

        let class_path = if self.shade { None } else { Some(self.class_path()?) };
        let mut attributes = vec![("Manifest-Version", "1.0"), ("Main-Class", self.main_class.as_str())];
        if let Some(cp) = class_path.as_deref() {
            attributes.push(("Class-Path", cp));
        }

        // Manifest first, always.
        zip.start_file(MANIFEST_PATH, options)?;
        zip.write_all(render_manifest(&attributes).as_bytes())?;
        seen.insert(MANIFEST_PATH.to_string());
        assembled.entries += 1;

        for (name, contents) in &self.extra_entries {
            if !seen.insert(name.clone()) {
                assembled.skipped_duplicates += 1;
                continue;
            }
            zip.start_file(name.as_str(), options)?;
            zip.write_all(contents)?;
            assembled.entries += 1;
        }

        if self.shade {
            for library in &self.libraries {
                let mut archive = ZipArchive::new(File::open(library).map_err(|e| {
                    InstallError::transport(library.display().to_string(), e)
                })?)?;
                for i in 0..archive.len() {
                    let mut entry = archive.by_index(i)?;
                    if entry.is_dir() {
                        continue;
                    }
                    let name = entry.name().to_string();
                    if is_signature_entry(&name) {
                        assembled.skipped_signatures += 1;
                        continue;
                    }
                    if !seen.insert(name.clone()) {
                        assembled.skipped_duplicates += 1;
                        continue;
                    }
                    zip.start_file(name.as_str(), options)?;
                    std::io::copy(&mut entry, &mut zip)?;
                    assembled.entries += 1;
                }
            }
        }

        let mut writer = zip.finish()?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(assembled)
    }
}
