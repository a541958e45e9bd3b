use super::{RawDataSource, SourceError};
use crate::schema::parse_json_from_output;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::sync::OnceCell;

/// What the installed `xcresulttool` supports, scraped from its help text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// `get test-results ...` subcommands (Xcode 16+).
    pub test_results: bool,
    /// `--legacy` flag required for the object graph commands.
    pub legacy_flag: bool,
}

impl Capabilities {
    pub fn from_help(get_help: &str, object_help: &str) -> Self {
        Self {
            test_results: get_help.contains("test-results"),
            legacy_flag: get_help.contains("--legacy") || object_help.contains("--legacy"),
        }
    }
}

/// Runs `xcrun xcresulttool` to read a result bundle.
pub struct XcResultTool {
    xcrun_path: PathBuf,
    capabilities: OnceCell<Capabilities>,
}

impl XcResultTool {
    pub fn new() -> Self {
        Self::with_path("xcrun")
    }

    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            xcrun_path: path.as_ref().to_path_buf(),
            capabilities: OnceCell::new(),
        }
    }

    pub async fn capabilities(&self) -> Result<Capabilities, SourceError> {
        self.capabilities
            .get_or_try_init(|| async {
                let get_help = self.run_text(&["help", "get"]).await?;
                // Older tools have no `object` subcommand; that just means no --legacy.
                let object_help = self
                    .run_text(&["help", "get", "object"])
                    .await
                    .unwrap_or_default();
                let capabilities = Capabilities::from_help(&get_help, &object_help);
                tracing::debug!(?capabilities, "probed xcresulttool");
                Ok(capabilities)
            })
            .await
            .copied()
    }

    /// JSON schema embedded in the help output of `get test-results tests`.
    pub async fn fetch_schema(&self) -> Result<Value, SourceError> {
        let help = self
            .run_text(&["help", "get", "test-results", "tests"])
            .await?;
        parse_json_from_output(&help).map_err(SourceError::Fetch)
    }

    fn validate_bundle(bundle_path: &str) -> Result<&Path, SourceError> {
        let path = Path::new(bundle_path);
        if !path.exists() {
            return Err(SourceError::InvalidBundle(path.to_path_buf()));
        }

        let has_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("xcresult"));
        if !has_extension && !path.join("Info.plist").is_file() {
            return Err(SourceError::InvalidBundle(path.to_path_buf()));
        }
        Ok(path)
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>, SourceError> {
        let output = Command::new(&self.xcrun_path)
            .arg("xcresulttool")
            .args(args)
            .output()
            .await
            .map_err(|e| {
                SourceError::ToolUnavailable(format!("{}: {}", self.xcrun_path.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code().unwrap_or(-1);
            return Err(SourceError::Fetch(format!(
                "xcresulttool {} exited with code {}: {}",
                args.join(" "),
                code,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }

    async fn run_text(&self, args: &[&str]) -> Result<String, SourceError> {
        let stdout = self.run(args).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    async fn run_json(&self, args: &[&str]) -> Result<Value, SourceError> {
        let stdout = self.run(args).await?;
        Ok(serde_json::from_slice(&stdout)?)
    }

    async fn legacy_args<'a>(&self, mut args: Vec<&'a str>) -> Vec<&'a str> {
        let legacy = self
            .capabilities()
            .await
            .map(|c| c.legacy_flag)
            .unwrap_or(false);
        if legacy {
            args.push("--legacy");
        }
        args
    }
}

impl Default for XcResultTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RawDataSource for XcResultTool {
    async fn get_data(&self, bundle_path: &str) -> Result<Value, SourceError> {
        let path = Self::validate_bundle(bundle_path)?;
        let path_str = path.to_string_lossy().into_owned();
        let path_str = path_str.as_str();
        let capabilities = self.capabilities().await?;

        if capabilities.test_results {
            let mut tests = self
                .run_json(&["get", "test-results", "tests", "--path", path_str])
                .await?;

            match self
                .run_json(&["get", "test-results", "summary", "--path", path_str])
                .await
            {
                Ok(summary) => {
                    if let (Some(obj), Some(failures)) =
                        (tests.as_object_mut(), summary.get("testFailures"))
                    {
                        obj.insert("testFailures".to_string(), failures.clone());
                    }
                }
                Err(e) => {
                    tracing::warn!(bundle = bundle_path, error = %e, "failed to fetch test summary")
                }
            }
            return Ok(tests);
        }

        let args = self
            .legacy_args(vec!["get", "--format", "json", "--path", path_str])
            .await;
        self.run_json(&args).await
    }

    async fn get_detail(&self, bundle_path: &str, reference_id: &str) -> Option<Value> {
        let args = self
            .legacy_args(vec![
                "get",
                "--format",
                "json",
                "--path",
                bundle_path,
                "--id",
                reference_id,
            ])
            .await;

        match self.run_json(&args).await {
            Ok(detail) => Some(detail),
            Err(e) => {
                tracing::warn!(bundle = bundle_path, reference_id, error = %e, "detail fetch failed");
                None
            }
        }
    }
}

/// Writes an executable `xcrun` stand-in into `dir`. Every invocation appends
/// its arguments to `dir/calls.log` before `body` runs with them as `$*`.
#[cfg(all(test, unix))]
pub(crate) fn fake_xcrun(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("xcrun");
    let script = format!(
        "#!/bin/sh\necho \"$*\" >> \"$(dirname \"$0\")/calls.log\"\n{}\n",
        body
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(all(test, unix))]
pub(crate) fn recorded_calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(String::from)
        .collect()
}
