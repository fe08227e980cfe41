//! Runs an install profile's processor chain.
//!
//! Every token in the chain is resolved before the first processor starts, so a
//! broken profile fails as a configuration error with nothing on disk touched.

use super::parser::extract_main_class_from_jar;
use super::profile::{InstallProfile, Processor};
use crate::error::{InstallError, InstallResult};
use crate::game::installer::config::InstallerConfig;
use crate::game::installer::core::artifact::{HashAlgorithm, HashCode};
use crate::game::installer::core::hashing::HashEngine;
use crate::game::installer::types::{CancelToken, ProgressReporter, Side};
use crate::utils::maven::maven_to_path;
use crate::utils::process::{classpath_separator, HopperCommandExt};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("valid regex"));

/// A processor with every token resolved, ready to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorInvocation {
    /// The processor jar's maven coordinates, used in logs and errors.
    pub name: String,
    pub jar: PathBuf,
    pub classpath: Vec<PathBuf>,
    pub main_class: Option<String>,
    pub args: Vec<String>,
}

impl ProcessorInvocation {
    /// `jar` followed by the declared classpath, joined for `-cp`.
    pub fn classpath_string(&self) -> String {
        std::iter::once(&self.jar)
            .chain(self.classpath.iter())
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(classpath_separator())
    }
}

/// Launches one processor and waits for it to exit.
pub trait ProcessorRunner: Send + Sync {
    fn run<'a>(&'a self, invocation: &'a ProcessorInvocation) -> BoxFuture<'a, InstallResult<()>>;
}

/// Runs processors as `java -cp <jar:classpath> <Main-Class> <args>`.
#[derive(Debug, Clone)]
pub struct JavaProcessorRunner {
    java: Option<PathBuf>,
    timeout: Duration,
}

impl JavaProcessorRunner {
    pub fn new(java: Option<PathBuf>, timeout: Duration) -> Self {
        Self { java, timeout }
    }

    pub fn from_config(config: &InstallerConfig) -> Self {
        Self::new(config.java_path.clone(), config.processor_timeout())
    }

    fn java_program(&self) -> InstallResult<PathBuf> {
        match &self.java {
            Some(path) => Ok(path.clone()),
            None => which::which("java").map_err(|e| {
                InstallError::config(format!("no java executable configured or on PATH: {}", e))
            }),
        }
    }

    async fn execute(&self, invocation: &ProcessorInvocation) -> InstallResult<()> {
        let java = self.java_program()?;
        let main_class = match &invocation.main_class {
            Some(main_class) => main_class.clone(),
            None => {
                let jar = invocation.jar.clone();
                tokio::task::spawn_blocking(move || extract_main_class_from_jar(&jar))
                    .await
                    .map_err(|e| InstallError::processor(&invocation.name, e))??
            }
        };

        log::debug!("Processor classpath: {}", invocation.classpath_string());
        log::debug!("Processor main class: {}", main_class);
        log::debug!("Processor args: {:?}", invocation.args);

        let mut command = Command::new(&java);
        command
            .arg("-cp")
            .arg(invocation.classpath_string())
            .arg(&main_class)
            .args(&invocation.args)
            .suppress_console()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                InstallError::processor(
                    &invocation.name,
                    format!("timed out after {}s", self.timeout.as_secs()),
                )
            })?
            .map_err(|e| {
                InstallError::processor(
                    &invocation.name,
                    format!("failed to spawn {}: {}", java.display(), e),
                )
            })?;

        if !output.status.success() {
            log::error!("Processor {} failed:", invocation.name);
            log::error!("  Main class: {}", main_class);
            log::error!("  Args: {:?}", invocation.args);
            log::error!("  stdout: {}", String::from_utf8_lossy(&output.stdout));
            log::error!("  stderr: {}", String::from_utf8_lossy(&output.stderr));
            return Err(InstallError::processor(
                &invocation.name,
                format!("exited with code {:?}", output.status.code()),
            ));
        }
        Ok(())
    }
}

impl ProcessorRunner for JavaProcessorRunner {
    fn run<'a>(&'a self, invocation: &'a ProcessorInvocation) -> BoxFuture<'a, InstallResult<()>> {
        Box::pin(self.execute(invocation))
    }
}

/// Where a chain's tokens point.
#[derive(Debug, Clone)]
pub struct ProcessorEnvironment {
    pub side: Side,
    pub libraries_dir: PathBuf,
    /// Extracted installer; `/path` data values live here.
    pub installer_dir: PathBuf,
    /// Base for relative output paths.
    pub temp_dir: PathBuf,
    /// Vanilla version JSON handed to the `DEOBF_REALMS` task.
    pub version_json: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOutput {
    pub path: PathBuf,
    pub expected: HashCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedProcessor {
    pub invocation: ProcessorInvocation,
    pub outputs: Vec<PlannedOutput>,
}

fn wrapped<'s>(value: &'s str, open: char, close: char) -> Option<&'s str> {
    if value.len() >= 2 && value.starts_with(open) && value.ends_with(close) {
        Some(&value[open.len_utf8()..value.len() - close.len_utf8()])
    } else {
        None
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

struct TokenResolver<'p> {
    profile: &'p InstallProfile,
    env: &'p ProcessorEnvironment,
    published: HashMap<String, String>,
}

impl<'p> TokenResolver<'p> {
    fn library(&self, coords: &str) -> InstallResult<String> {
        Ok(path_string(&maven_to_path(coords, &self.env.libraries_dir)?))
    }

    /// Forge data conventions: `[coords]`, `'literal'`, `/installer/path`, else verbatim.
    fn interpret(&self, raw: &str) -> InstallResult<String> {
        if let Some(coords) = wrapped(raw, '[', ']') {
            return self.library(coords);
        }
        if let Some(literal) = wrapped(raw, '\'', '\'') {
            return Ok(literal.to_string());
        }
        if let Some(inner) = raw.strip_prefix('/') {
            let mut path = self.env.installer_dir.clone();
            for segment in inner.split('/').filter(|s| !s.is_empty()) {
                path.push(segment);
            }
            return Ok(path_string(&path));
        }
        Ok(raw.to_string())
    }

    fn token(&self, key: &str, processor: &Processor) -> InstallResult<String> {
        if let Some(value) = self.published.get(key) {
            return Ok(value.clone());
        }
        match self.profile.value(key, self.env.side) {
            Some(raw) => self.interpret(raw),
            None => Err(InstallError::config(format!(
                "processor {} references unresolved token {{{}}}",
                processor.jar, key
            ))),
        }
    }

    fn substitute(&self, template: &str, processor: &Processor) -> InstallResult<String> {
        if let Some(coords) = wrapped(template, '[', ']') {
            return self.library(coords);
        }
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in TOKEN.captures_iter(template) {
            let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&template[last..whole.start()]);
            out.push_str(&self.token(key.as_str(), processor)?);
            last = whole.end();
        }
        out.push_str(&template[last..]);
        Ok(out)
    }

    fn output_path(&self, key: &str, processor: &Processor) -> InstallResult<PathBuf> {
        let resolved = match wrapped(key, '{', '}') {
            Some(token) => self.token(token, processor)?,
            None => self.substitute(key, processor)?,
        };
        let path = PathBuf::from(resolved);
        Ok(if path.is_absolute() {
            path
        } else {
            self.env.temp_dir.join(path)
        })
    }

    fn output_hash(&self, value: &str, processor: &Processor) -> InstallResult<HashCode> {
        let text = match wrapped(value, '{', '}') {
            Some(token) => self.token(token, processor)?,
            None => match wrapped(value, '\'', '\'') {
                Some(literal) => literal.to_string(),
                None => value.to_string(),
            },
        };
        let text = wrapped(&text, '\'', '\'').unwrap_or(&text).to_string();
        HashCode::parse(HashAlgorithm::Sha1, &text).map_err(|_| {
            InstallError::config(format!(
                "processor {} declares output hash {:?} that is not a sha1",
                processor.jar, text
            ))
        })
    }
}

/// Executes an [`InstallProfile`]'s processors in order.
pub struct InstallProfileProcessor<'a> {
    runner: &'a dyn ProcessorRunner,
    hashes: Arc<HashEngine>,
    cancel: CancelToken,
    reporter: Arc<dyn ProgressReporter>,
}

impl<'a> InstallProfileProcessor<'a> {
    pub fn new(
        runner: &'a dyn ProcessorRunner,
        hashes: Arc<HashEngine>,
        cancel: CancelToken,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            runner,
            hashes,
            cancel,
            reporter,
        }
    }

    /// Resolve the whole chain for `env.side`. Outputs with a token become
    /// visible to the processors after them, never before.
    pub fn plan(
        profile: &InstallProfile,
        env: &ProcessorEnvironment,
    ) -> InstallResult<Vec<PlannedProcessor>> {
        let mut resolver = TokenResolver {
            profile,
            env,
            published: HashMap::new(),
        };
        let mut plan = Vec::new();

        for processor in profile.processors_for(env.side) {
            let jar = maven_to_path(&processor.jar, &env.libraries_dir)?;
            let classpath = processor
                .classpath
                .iter()
                .map(|coords| maven_to_path(coords, &env.libraries_dir))
                .collect::<InstallResult<Vec<_>>>()?;

            let mut args = processor
                .args
                .iter()
                .map(|arg| resolver.substitute(arg, processor))
                .collect::<InstallResult<Vec<_>>>()?;
            if processor.args.iter().any(|a| a == "DEOBF_REALMS") {
                if let Some(json) = &env.version_json {
                    args.push("--json".to_string());
                    args.push(path_string(json));
                    args.push("--libs".to_string());
                    args.push(path_string(&env.libraries_dir));
                }
            }

            let mut outputs = Vec::with_capacity(processor.outputs.len());
            let mut new_tokens = Vec::new();
            for declared in &processor.outputs {
                let path = resolver.output_path(&declared.path, processor)?;
                let expected = resolver.output_hash(&declared.hash, processor)?;
                if let Some(token) = &declared.token {
                    new_tokens.push((token.clone(), path_string(&path)));
                }
                outputs.push(PlannedOutput { path, expected });
            }
            for (token, value) in new_tokens {
                if profile.data.contains_key(&token) {
                    log::warn!("Processor {} output shadows data token {}", processor.jar, token);
                }
                resolver.published.insert(token, value);
            }

            plan.push(PlannedProcessor {
                invocation: ProcessorInvocation {
                    name: processor.jar.clone(),
                    jar,
                    classpath,
                    main_class: processor.main_class.clone(),
                    args,
                },
                outputs,
            });
        }
        Ok(plan)
    }

    /// Run every processor for `env.side`, returning how many ran.
    pub async fn run(&self, profile: &InstallProfile, env: &ProcessorEnvironment) -> InstallResult<usize> {
        let plan = Self::plan(profile, env)?;
        let total = plan.len();
        if total == 0 {
            log::info!("No processors to execute");
            return Ok(0);
        }
        log::info!("Executing {} processors for {}", total, profile.version_id);

        for (idx, step) in plan.iter().enumerate() {
            if self.cancel.is_cancelled() {
                log::info!("Cancelled before processor {}/{}", idx + 1, total);
                return Err(InstallError::Cancelled);
            }
            let name = &step.invocation.name;
            self.reporter.set_sub_progress(
                idx as f32 / total as f32,
                &format!("Running processor {}/{}: {}", idx + 1, total, name),
            );
            log::info!("Running processor {}/{}: {}", idx + 1, total, name);

            self.runner.run(&step.invocation).await.map_err(|e| match e {
                InstallError::Cancelled | InstallError::ProcessorExecutionFailure { .. } => e,
                other => InstallError::processor(name, other),
            })?;
            self.verify_outputs(step).await?;
        }

        self.reporter.set_sub_progress(1.0, "Processors complete");
        Ok(total)
    }

    /// Outputs are always hashed fresh; a cached digest could predate the run.
    async fn verify_outputs(&self, step: &PlannedProcessor) -> InstallResult<()> {
        let name = &step.invocation.name;
        for output in &step.outputs {
            if !output.path.is_file() {
                return Err(InstallError::processor(
                    name,
                    format!("declared output {} was not produced", output.path.display()),
                ));
            }
            let hashes = self.hashes.clone();
            let path = output.path.clone();
            let actual = tokio::task::spawn_blocking(move || hashes.hash_uncached(&path, HashAlgorithm::Sha1))
                .await
                .map_err(|e| InstallError::processor(name, e))?
                .map_err(|e| InstallError::processor(name, e))?;
            if actual != output.expected {
                return Err(InstallError::processor(
                    name,
                    format!(
                        "output {} hash mismatch: expected {}, got {}",
                        output.path.display(),
                        output.expected.value(),
                        actual.value()
                    ),
                ));
            }
            log::debug!("Verified processor output {:?}", output.path);
        }
        Ok(())
    }
}
