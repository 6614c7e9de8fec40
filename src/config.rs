//! Settings parsing and runner configuration resolution.
//!
//! [`IntentSettings`] is the host-facing settings document, loaded from TOML.
//! [`RunnerConfig`] is the immutable snapshot derived from it that decides how
//! the runner subprocess is launched; any difference between two snapshots
//! means the running process must be replaced.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Deserialize;

use crate::models::SamplingParams;
use crate::{IntentError, Result};

/// Device name required when `force_npu` is set.
pub const NPU_DEVICE: &str = "NPU";

/// Inference backend hosted by the runner process.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Local model directory loaded onto a device.
    #[default]
    Local,
    /// Remote provider reached through an API client inside the runner.
    Api,
}

impl Backend {
    /// Value passed to the runner's `--backend` flag.
    #[must_use]
    pub fn as_arg(self) -> &'static str {
        match self {
            Self::Local => "openvino",
            Self::Api => "api",
        }
    }
}

/// Runner subprocess settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct RunnerSettings {
    /// Selected backend.
    pub backend: Backend,
    /// Interpreter used to launch the runner script.
    pub python: String,
    /// Runner script path.
    pub script: String,
    /// Model directory for the local backend.
    pub model_dir: Option<String>,
    /// Target device for the local backend.
    pub device: String,
    /// Default per-request token budget passed on the runner command line.
    pub max_tokens: u32,
    /// Maximum prompt length for the local pipeline; 0 selects the default.
    pub max_prompt_len: u32,
    /// Refuse to run on anything but the NPU.
    pub force_npu: bool,
    /// Model compilation cache; defaults to `<model_dir>/.ov_cache`.
    pub cache_dir: Option<String>,
    /// Runner diagnostics log; defaults to `llm_intent_runner.log`.
    pub log_file: Option<String>,
    /// Provider name for the API backend.
    pub api_provider: Option<String>,
    /// Model name for the API backend.
    pub api_model: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: Option<String>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            backend: Backend::Local,
            python: default_python(),
            script: default_script(),
            model_dir: None,
            device: NPU_DEVICE.to_owned(),
            max_tokens: default_max_tokens(),
            max_prompt_len: default_max_prompt_len(),
            force_npu: false,
            cache_dir: None,
            log_file: None,
            api_provider: None,
            api_model: None,
            api_key_env: None,
        }
    }
}

/// Audit log settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct AuditSettings {
    /// Whether audit entries are written.
    pub enabled: bool,
    /// Audit log file path.
    pub path: String,
    /// Size threshold in bytes after which the log is rotated.
    pub max_bytes: u64,
    /// Number of rotated siblings kept (`.1` … `.keep`).
    pub keep: u32,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "llm_intent.log".into(),
            max_bytes: 5 * 1024 * 1024,
            keep: 3,
        }
    }
}

fn default_python() -> String {
    "python".into()
}

fn default_script() -> String {
    "tools/llm_runner/runner.py".into()
}

fn default_max_tokens() -> u32 {
    20_000
}

fn default_max_prompt_len() -> u32 {
    4096
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_cold_start_grace_ms() -> u64 {
    120_000
}

/// Settings document for the intent broker, parsed from `intent.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct IntentSettings {
    /// Master switch; when off, enqueue calls are no-ops.
    pub enabled: bool,
    /// Surface successes and failures to the host and log them.
    pub debug: bool,
    /// Steady-state exchange timeout; 0 waits forever.
    pub timeout_ms: u64,
    /// Minimum timeout for the first exchange after a spawn.
    pub cold_start_grace_ms: u64,
    /// Token budget attached to each request.
    pub max_tokens: u32,
    /// Sampling parameters attached to each request.
    pub sampling: SamplingParams,
    /// Runner subprocess settings.
    pub runner: RunnerSettings,
    /// Audit log settings.
    pub audit: AuditSettings,
    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for IntentSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            debug: false,
            timeout_ms: default_timeout_ms(),
            cold_start_grace_ms: default_cold_start_grace_ms(),
            max_tokens: default_max_tokens(),
            sampling: SamplingParams::default(),
            runner: RunnerSettings::default(),
            audit: AuditSettings::default(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl IntentSettings {
    /// Load and validate settings from a TOML file.
    ///
    /// Relative paths inside the file resolve against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns `IntentError::Config` if the file cannot be read, contains
    /// invalid TOML, or fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|err| IntentError::Config(format!("failed to read settings: {err}")))?;
        let mut settings = Self::from_toml_str(&raw)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            settings.base_dir = parent.to_path_buf();
        }
        Ok(settings)
    }

    /// Parse settings from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `IntentError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let settings: Self = toml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Steady-state exchange timeout, `None` when waiting is unbounded.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Cold-start grace period applied to the first exchange after a spawn.
    #[must_use]
    pub fn cold_start_grace(&self) -> Duration {
        Duration::from_millis(self.cold_start_grace_ms)
    }

    /// Absolute-or-base-relative audit log path.
    #[must_use]
    pub fn audit_path(&self) -> PathBuf {
        resolve_path(&self.base_dir, &self.audit.path)
    }

    fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(IntentError::Config(
                "max_tokens must be greater than zero".into(),
            ));
        }
        if self.audit.max_bytes == 0 {
            return Err(IntentError::Config(
                "audit.max_bytes must be greater than zero".into(),
            ));
        }
        if let Some(top_p) = self.sampling.top_p {
            if !(top_p > 0.0 && top_p <= 1.0) {
                return Err(IntentError::Config(format!(
                    "sampling.top_p must be in (0, 1], got {top_p}"
                )));
            }
        }
        Ok(())
    }
}

/// Settings shared between the host thread and the worker thread.
///
/// The host may replace the settings at any time; the worker takes a fresh
/// snapshot for every request.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings(Arc<RwLock<IntentSettings>>);

impl SharedSettings {
    /// Wrap an initial settings value.
    #[must_use]
    pub fn new(settings: IntentSettings) -> Self {
        Self(Arc::new(RwLock::new(settings)))
    }

    /// Clone the current settings.
    #[must_use]
    pub fn snapshot(&self) -> IntentSettings {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the current settings.
    pub fn replace(&self, settings: IntentSettings) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }
}

/// Immutable launch configuration for the runner subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Selected backend.
    pub backend: Backend,
    /// Interpreter program.
    pub python_path: PathBuf,
    /// Runner script.
    pub runner_path: PathBuf,
    /// Model directory (local backend).
    pub model_dir: Option<PathBuf>,
    /// Target device (local backend).
    pub device: String,
    /// Default token budget.
    pub max_tokens: u32,
    /// Maximum prompt length.
    pub max_prompt_len: u32,
    /// NPU-only mode.
    pub force_npu: bool,
    /// Compilation cache directory (local backend).
    pub cache_dir: Option<PathBuf>,
    /// Runner diagnostics log, read back on channel failures.
    pub log_path: PathBuf,
    /// API provider (API backend).
    pub api_provider: String,
    /// API model (API backend).
    pub api_model: String,
    /// API key environment variable (API backend).
    pub api_key_env: String,
}

impl RunnerConfig {
    /// Derive the launch configuration from the current settings.
    ///
    /// Pure: does not touch the file system and performs no validation;
    /// see [`RunnerConfig::validate`].
    #[must_use]
    pub fn resolve(settings: &IntentSettings) -> Self {
        let base = &settings.base_dir;
        let runner = &settings.runner;
        let model_dir = non_empty(runner.model_dir.as_deref()).map(|dir| resolve_path(base, dir));
        let cache_dir = match non_empty(runner.cache_dir.as_deref()) {
            Some(dir) => Some(resolve_path(base, dir)),
            None => model_dir.as_ref().map(|dir| dir.join(".ov_cache")),
        };
        let log_path = resolve_path(
            base,
            non_empty(runner.log_file.as_deref()).unwrap_or("llm_intent_runner.log"),
        );
        let device = if runner.device.trim().is_empty() {
            NPU_DEVICE.to_owned()
        } else {
            runner.device.trim().to_owned()
        };
        let max_prompt_len = if runner.max_prompt_len == 0 {
            default_max_prompt_len()
        } else {
            runner.max_prompt_len
        };

        Self {
            backend: runner.backend,
            python_path: resolve_program(base, runner.python.trim()),
            runner_path: if runner.script.trim().is_empty() {
                PathBuf::new()
            } else {
                resolve_path(base, runner.script.trim())
            },
            model_dir,
            device,
            max_tokens: runner.max_tokens,
            max_prompt_len,
            force_npu: runner.force_npu,
            cache_dir,
            log_path,
            api_provider: runner.api_provider.clone().unwrap_or_default(),
            api_model: runner.api_model.clone().unwrap_or_default(),
            api_key_env: runner.api_key_env.clone().unwrap_or_default(),
        }
    }

    /// Check that the fields required by the selected backend are present.
    ///
    /// # Errors
    ///
    /// Returns `IntentError::Config` describing the first missing or
    /// conflicting field.
    pub fn validate(&self) -> Result<()> {
        if self.python_path.as_os_str().is_empty() || self.runner_path.as_os_str().is_empty() {
            return Err(IntentError::Config(
                "runner configuration is incomplete: python and script are required".into(),
            ));
        }
        match self.backend {
            Backend::Local => {
                if self.model_dir.is_none() {
                    return Err(IntentError::Config(
                        "local backend requires runner.model_dir".into(),
                    ));
                }
                if self.force_npu && !self.device.eq_ignore_ascii_case(NPU_DEVICE) {
                    return Err(IntentError::Config(format!(
                        "force_npu requires device {NPU_DEVICE}, got {}",
                        self.device
                    )));
                }
            }
            Backend::Api => {
                if self.api_provider.trim().is_empty() || self.api_model.trim().is_empty() {
                    return Err(IntentError::Config(
                        "api backend requires runner.api_provider and runner.api_model".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Arguments passed to the interpreter, starting with the runner script.
    #[must_use]
    pub fn command_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            self.runner_path.clone().into(),
            "--backend".into(),
            self.backend.as_arg().into(),
        ];
        match self.backend {
            Backend::Local => {
                if let Some(model_dir) = &self.model_dir {
                    args.push("--model-dir".into());
                    args.push(model_dir.clone().into());
                }
                args.push("--device".into());
                args.push(self.device.clone().into());
                if let Some(cache_dir) = &self.cache_dir {
                    args.push("--cache-dir".into());
                    args.push(cache_dir.clone().into());
                }
            }
            Backend::Api => {
                args.push("--api-provider".into());
                args.push(self.api_provider.clone().into());
                args.push("--api-model".into());
                args.push(self.api_model.clone().into());
                if !self.api_key_env.is_empty() {
                    args.push("--api-key-env".into());
                    args.push(self.api_key_env.clone().into());
                }
            }
        }
        args.push("--max-tokens".into());
        args.push(self.max_tokens.to_string().into());
        args.push("--max-prompt-len".into());
        args.push(self.max_prompt_len.to_string().into());
        args.push("--log-file".into());
        args.push(self.log_path.clone().into());
        if self.force_npu {
            args.push("--force-npu".into());
        }
        args
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn resolve_path(base: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Bare program names are left for `PATH` lookup; anything with a separator
/// resolves like a path.
fn resolve_program(base: &Path, raw: &str) -> PathBuf {
    if raw.is_empty() {
        return PathBuf::new();
    }
    if raw.contains('/') || raw.contains('\\') {
        resolve_path(base, raw)
    } else {
        PathBuf::from(raw)
    }
}
