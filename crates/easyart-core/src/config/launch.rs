//! Worker launch configuration
//!
//! Locating the interpreter and worker script is the caller's job; this only
//! describes how to start them once known.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[cfg(windows)]
const DEFAULT_EXECUTABLE: &str = "python.exe";
#[cfg(not(windows))]
const DEFAULT_EXECUTABLE: &str = "python3";

const DEFAULT_SCRIPT: &str = "middle_layer/worker.py";

/// Interpreter flag that disables stdio buffering in the worker
const DEFAULT_UNBUFFERED_FLAG: &str = "-u";

fn default_executable() -> PathBuf {
    PathBuf::from(DEFAULT_EXECUTABLE)
}

fn default_script() -> PathBuf {
    PathBuf::from(DEFAULT_SCRIPT)
}

fn default_unbuffered_flag() -> Option<String> {
    Some(DEFAULT_UNBUFFERED_FLAG.to_string())
}

/// How to start the worker process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerLaunchConfig {
    /// Interpreter or program to run
    #[serde(default = "default_executable")]
    pub executable: PathBuf,
    /// Flag placed before the script to disable output buffering; `None` to omit
    #[serde(default = "default_unbuffered_flag")]
    pub unbuffered_flag: Option<String>,
    /// Worker script passed to the executable
    #[serde(default = "default_script")]
    pub script: PathBuf,
    /// Working directory; defaults to the script's directory
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Arguments appended after the script
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Extra environment variables for the worker
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for WorkerLaunchConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            unbuffered_flag: default_unbuffered_flag(),
            script: default_script(),
            working_dir: None,
            extra_args: Vec::new(),
            env: HashMap::new(),
        }
    }
}

impl WorkerLaunchConfig {
    pub fn new(executable: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            script: script.into(),
            ..Self::default()
        }
    }

    pub fn with_unbuffered_flag(mut self, flag: Option<String>) -> Self {
        self.unbuffered_flag = flag;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Executable path with `~` expanded
    pub fn resolved_executable(&self) -> PathBuf {
        expand_path(&self.executable)
    }

    /// Script path with `~` expanded
    pub fn resolved_script(&self) -> PathBuf {
        expand_path(&self.script)
    }

    /// Arguments passed to the executable, in order.
    ///
    /// A relative script is made absolute when the worker runs in another
    /// directory, so it still names the same file.
    pub fn command_line(&self) -> Vec<OsString> {
        let mut args = Vec::with_capacity(2 + self.extra_args.len());
        if let Some(flag) = &self.unbuffered_flag {
            args.push(OsString::from(flag));
        }
        args.push(self.spawn_script().into_os_string());
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }

    fn spawn_script(&self) -> PathBuf {
        let script = self.resolved_script();
        if script.is_relative() && self.resolved_working_dir().is_some() {
            std::path::absolute(&script).unwrap_or(script)
        } else {
            script
        }
    }

    /// Directory the worker runs in, if one can be determined
    pub fn resolved_working_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.working_dir {
            return Some(expand_path(dir));
        }
        self.resolved_script()
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }

    /// Merge with another launch config (other takes precedence where set)
    pub fn merge(&mut self, other: WorkerLaunchConfig) {
        self.executable = other.executable;
        self.unbuffered_flag = other.unbuffered_flag;
        self.script = other.script;
        if other.working_dir.is_some() {
            self.working_dir = other.working_dir;
        }
        if !other.extra_args.is_empty() {
            self.extra_args = other.extra_args;
        }
        self.env.extend(other.env);
    }
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
