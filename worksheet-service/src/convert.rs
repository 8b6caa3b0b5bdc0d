//! DOCX to PDF conversion through external office tools.
//!
//! Tools are tried in order until one produces a non-empty PDF. When every
//! tool fails, a copy of the DOCX is left next to the requested PDF so the
//! caller still has a document to hand out.
use std::{
    collections::BTreeMap,
    ffi::OsStr,
    path::{Path, PathBuf},
    process::{Output, Stdio},
    time::Duration,
};

use anyhow::{Context, anyhow, bail};
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::config::EnvVars;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConversionMethod {
    Unoconv(String),
    LibreOffice(String),
}

impl ConversionMethod {
    pub fn binary(&self) -> &str {
        match self {
            ConversionMethod::Unoconv(bin) | ConversionMethod::LibreOffice(bin) => bin,
        }
    }

    pub fn family(&self) -> &'static str {
        match self {
            ConversionMethod::Unoconv(_) => "unoconv",
            ConversionMethod::LibreOffice(_) => "libreoffice",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConversionError {
    #[error("input file does not exist: {0}")]
    MissingInput(PathBuf),
    #[error("DOCX to PDF conversion failed - check server PDF conversion tools (LibreOffice/unoconv)")]
    AllMethodsFailed {
        /// Copy of the input left beside the requested output, if it could be made
        fallback: Option<PathBuf>,
        attempts: Vec<String>,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct ToolReport {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Converter {
    methods: Vec<ConversionMethod>,
    timeout: Duration,
    retries: u32,
}

impl Converter {
    pub fn new(methods: Vec<ConversionMethod>, timeout: Duration, retries: u32) -> Self {
        Converter {
            methods,
            timeout,
            retries,
        }
    }

    /// unoconv first, then every configured LibreOffice binary.
    pub fn from_env(env_vars: &EnvVars) -> Self {
        let mut methods = vec![ConversionMethod::Unoconv(env_vars.unoconv_path.clone())];
        methods.extend(
            env_vars
                .libreoffice_paths
                .iter()
                .cloned()
                .map(ConversionMethod::LibreOffice),
        );
        Converter::new(
            methods,
            env_vars.conversion_timeout,
            env_vars.conversion_retries,
        )
    }

    pub fn methods(&self) -> &[ConversionMethod] {
        &self.methods
    }

    #[instrument(skip(self), err(Debug))]
    pub async fn convert(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<ConversionMethod, ConversionError> {
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Err(ConversionError::MissingInput(input.to_path_buf()));
        }

        let mut attempts = vec![];
        for method in &self.methods {
            if let Err(e) = probe(method.binary()).await {
                debug!(binary = method.binary(), "skipping unavailable tool: {e:#}");
                attempts.push(format!("{}: {e:#}", method.binary()));
                continue;
            }

            for attempt in 0..=self.retries {
                match self.run_method(method, input, output).await {
                    Ok(()) => {
                        info!(binary = method.binary(), attempt, "converted to pdf");
                        return Ok(method.clone());
                    }
                    Err(e) => {
                        warn!(binary = method.binary(), attempt, "conversion failed: {e:#}");
                        attempts.push(format!("{}: {e:#}", method.binary()));
                    }
                }
            }
        }

        let fallback = fallback_path(output);
        let fallback = match tokio::fs::copy(input, &fallback).await {
            Ok(_) => Some(fallback),
            Err(e) => {
                warn!("could not keep fallback docx: {e}");
                None
            }
        };
        Err(ConversionError::AllMethodsFailed { fallback, attempts })
    }

    async fn run_method(
        &self,
        method: &ConversionMethod,
        input: &Path,
        output: &Path,
    ) -> anyhow::Result<()> {
        match method {
            ConversionMethod::Unoconv(bin) => {
                let args = [
                    OsStr::new("-f"),
                    OsStr::new("pdf"),
                    OsStr::new("-o"),
                    output.as_os_str(),
                    input.as_os_str(),
                ];
                let result = run(bin, &args, self.timeout).await?;
                if !result.status.success() {
                    bail!(
                        "exited with {}: {}",
                        result.status,
                        String::from_utf8_lossy(&result.stderr).trim()
                    );
                }
            }
            ConversionMethod::LibreOffice(bin) => {
                let out_dir = match output.parent() {
                    Some(dir) if !dir.as_os_str().is_empty() => dir,
                    _ => Path::new("."),
                };
                let args = [
                    OsStr::new("--headless"),
                    OsStr::new("--convert-to"),
                    OsStr::new("pdf"),
                    OsStr::new("--outdir"),
                    out_dir.as_os_str(),
                    input.as_os_str(),
                ];
                let result = run(bin, &args, self.timeout).await?;
                if !result.status.success() {
                    bail!(
                        "exited with {}: {}",
                        result.status,
                        String::from_utf8_lossy(&result.stderr).trim()
                    );
                }

                let stem = input
                    .file_stem()
                    .ok_or_else(|| anyhow!("input has no file name"))?;
                let mut produced = out_dir.join(stem);
                produced.set_extension("pdf");
                if produced != output {
                    tokio::fs::rename(&produced, output)
                        .await
                        .with_context(|| format!("moving {}", produced.display()))?;
                }
            }
        }

        if !non_empty_file(output).await {
            bail!("no pdf written to {}", output.display());
        }
        Ok(())
    }

    /// Availability and version of every configured tool.
    pub async fn tool_status(&self) -> BTreeMap<String, ToolReport> {
        let mut tools = BTreeMap::new();
        for method in &self.methods {
            let report = match probe(method.binary()).await {
                Ok(version) => ToolReport {
                    available: true,
                    version: Some(version),
                    error: None,
                },
                Err(e) => ToolReport {
                    available: false,
                    version: None,
                    error: Some(format!("{e:#}")),
                },
            };
            tools.insert(method.binary().to_string(), report);
        }
        tools
    }
}

/// Runs `<bin> --version` and returns the first line it prints.
async fn probe(bin: &str) -> anyhow::Result<String> {
    let result = run(bin, &[OsStr::new("--version")], PROBE_TIMEOUT).await?;
    if !result.status.success() {
        bail!("version check exited with {}", result.status);
    }
    let first_line = |bytes: &[u8]| {
        String::from_utf8_lossy(bytes)
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(String::from)
    };
    Ok(first_line(&result.stdout)
        .or_else(|| first_line(&result.stderr))
        .unwrap_or_default())
}

/// The child is killed if it outlives `limit`.
async fn run(bin: &str, args: &[&OsStr], limit: Duration) -> anyhow::Result<Output> {
    let child = Command::new(bin)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to start {bin}"))?;

    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(result) => result.with_context(|| format!("failed to wait for {bin}")),
        Err(_) => bail!("timed out after {}s", limit.as_secs_f32()),
    }
}

async fn non_empty_file(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

/// `report.pdf` -> `report_fallback.docx`
fn fallback_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    output.with_file_name(format!("{stem}_fallback.docx"))
}
