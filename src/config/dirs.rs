//! # Runtime directory resolution.
//!
//! Each directory is resolved independently:
//! ```text
//! config dir: --configDir  ─► $MESOS_SANDBOX      ─► /etc
//! bin dir:    --binDir     ─────────────────────────► /usr/bin
//! tmp dir:    --tmpDir     ─► $MESOS_SANDBOX/tmp  ─► /tmp
//! ```
//! Empty flag values and an empty `MESOS_SANDBOX` count as unset.

use std::path::{Path, PathBuf};

use super::{
    DEFAULT_BIN_DIR, DEFAULT_CONFIG_DIR_FALLBACK, DEFAULT_TMP_DIR_FALLBACK, ENV_MESOS_SANDBOX,
};

/// Explicit directory overrides, usually straight from CLI flags.
#[derive(Clone, Debug, Default)]
pub struct DirFlags {
    pub bin: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub tmp: Option<PathBuf>,
}

/// Resolved directories used to launch the managed process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dirs {
    /// Location of the database executables.
    pub bin: PathBuf,
    /// Location of the instance config file.
    pub config: PathBuf,
    /// Scratch space handed to the process as `TMPDIR`.
    pub tmp: PathBuf,
}

impl Dirs {
    /// Resolves directories against the current `MESOS_SANDBOX`.
    pub fn resolve(flags: &DirFlags) -> Self {
        Self::resolve_with(flags, sandbox_dir().as_deref())
    }

    /// Resolves directories against an explicit sandbox path.
    pub fn resolve_with(flags: &DirFlags, sandbox: Option<&Path>) -> Self {
        let config = explicit(&flags.config)
            .or_else(|| sandbox.map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR_FALLBACK));
        let bin = explicit(&flags.bin).unwrap_or_else(|| PathBuf::from(DEFAULT_BIN_DIR));
        let tmp = explicit(&flags.tmp)
            .or_else(|| sandbox.map(|s| s.join("tmp")))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TMP_DIR_FALLBACK));
        Self { bin, config, tmp }
    }
}

/// Returns the sandbox directory, if the orchestrator provided one.
pub fn sandbox_dir() -> Option<PathBuf> {
    std::env::var_os(ENV_MESOS_SANDBOX)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn explicit(flag: &Option<PathBuf>) -> Option<PathBuf> {
    flag.as_ref().filter(|p| !p.as_os_str().is_empty()).cloned()
}
