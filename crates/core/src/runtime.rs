//! Locate the ONNX Runtime shared library for the `load-dynamic` build.

use std::env;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

pub const ORT_DYLIB_ENV: &str = "ORT_DYLIB_PATH";

#[cfg(target_os = "linux")]
const ORT_LIB_NAME: &str = "libonnxruntime.so";
#[cfg(target_os = "macos")]
const ORT_LIB_NAME: &str = "libonnxruntime.dylib";
#[cfg(windows)]
const ORT_LIB_NAME: &str = "onnxruntime.dll";
#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
const ORT_LIB_NAME: &str = "libonnxruntime.so";

/// Search directories for the runtime library, in probe order:
///   1. each of `extra_dirs`
///   2. `<exe_dir>/` (Windows only)
///   3. `<exe_dir>/lib/`
///   4. `<exe_dir>/../lib/`
///   5. `<cwd>/lib/`
///   6. `/usr/local/lib/`, `/usr/lib/` (Unix only)
pub fn candidate_lib_dirs(extra_dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = extra_dirs.to_vec();
    let mut push = |dir: PathBuf| {
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    };
    if let Ok(exe) = env::current_exe().and_then(|p| p.canonicalize()) {
        if let Some(exe_dir) = exe.parent() {
            #[cfg(windows)]
            push(exe_dir.to_path_buf());
            push(exe_dir.join("lib"));
            if let Some(parent) = exe_dir.parent() {
                push(parent.join("lib"));
            }
        }
    }
    if let Ok(cwd) = env::current_dir() {
        push(cwd.join("lib"));
    }
    #[cfg(unix)]
    {
        push(PathBuf::from("/usr/local/lib"));
        push(PathBuf::from("/usr/lib"));
    }
    dirs
}

pub fn find_ort_dylib_in_dirs(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(ORT_LIB_NAME))
        .find(|candidate| candidate.is_file())
}

/// Point `ORT_DYLIB_PATH` at the first runtime library found, unless the
/// caller already set it. Call before any ORT API is used.
pub fn setup_runtime_libs(extra_dirs: &[PathBuf]) -> Option<PathBuf> {
    if let Some(existing) = env::var_os(ORT_DYLIB_ENV) {
        return Some(PathBuf::from(existing));
    }
    let found = find_ort_dylib_in_dirs(&candidate_lib_dirs(extra_dirs))?;
    env::set_var(ORT_DYLIB_ENV, &found);
    Some(found)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeLibStatus {
    Found(PathBuf),
    Missing(PathBuf),
    Unset,
}

pub fn runtime_lib_status() -> RuntimeLibStatus {
    match env::var_os(ORT_DYLIB_ENV) {
        Some(path) if Path::new(&path).is_file() => RuntimeLibStatus::Found(path.into()),
        Some(path) => RuntimeLibStatus::Missing(path.into()),
        None => RuntimeLibStatus::Unset,
    }
}

/// Log which runtime library was resolved. Call after tracing is initialized.
pub fn log_runtime_lib_status() {
    match runtime_lib_status() {
        RuntimeLibStatus::Found(path) => info!(path = %path.display(), "ORT library"),
        RuntimeLibStatus::Missing(path) => {
            warn!(path = %path.display(), "{ORT_DYLIB_ENV} set but file not found")
        }
        RuntimeLibStatus::Unset => {
            warn!("{ORT_DYLIB_ENV} not set, ORT will try default search paths")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn candidate_lib_dirs_contains_system_paths() {
        let dirs = candidate_lib_dirs(&[]);
        assert!(dirs.contains(&PathBuf::from("/usr/local/lib")));
        assert!(dirs.contains(&PathBuf::from("/usr/lib")));
    }

    #[test]
    fn candidate_lib_dirs_puts_extra_dirs_first() {
        let extra = PathBuf::from("/opt/tensorprep/lib");
        let dirs = candidate_lib_dirs(std::slice::from_ref(&extra));
        assert_eq!(dirs.first(), Some(&extra));
        if let Ok(cwd) = env::current_dir() {
            assert!(dirs.contains(&cwd.join("lib")));
        }
    }

    #[test]
    fn find_ort_dylib_prefers_first_match() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join(ORT_LIB_NAME), b"").unwrap();
        let dirs = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        assert_eq!(
            find_ort_dylib_in_dirs(&dirs),
            Some(second.path().join(ORT_LIB_NAME))
        );

        std::fs::write(first.path().join(ORT_LIB_NAME), b"").unwrap();
        assert_eq!(
            find_ort_dylib_in_dirs(&dirs),
            Some(first.path().join(ORT_LIB_NAME))
        );
    }

    #[test]
    fn find_ort_dylib_in_empty_dirs() {
        let empty = tempfile::tempdir().unwrap();
        assert_eq!(find_ort_dylib_in_dirs(&[empty.path().to_path_buf()]), None);
    }
}
