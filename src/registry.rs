use std::path::{Path, PathBuf};

use crate::builtins;

/// What a command word resolves to.
pub enum Resolution {
    Builtin,
    External(PathBuf),
    NotFound,
}

/// Resolve a command word against the builtin table, then `PATH`.
pub fn resolve(cmd: &str) -> Resolution {
    if builtins::is_builtin(cmd) {
        Resolution::Builtin
    } else if let Some(path) = find_in_path(cmd) {
        Resolution::External(path)
    } else {
        Resolution::NotFound
    }
}

/// Check if a path points to an executable file.
pub fn is_executable(path: &Path) -> bool {
    let Ok(meta) = path.metadata() else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        return meta.permissions().mode() & 0o111 != 0;
    }

    #[cfg(not(unix))]
    {
        let extension = match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => return false,
        };
        let pathext =
            std::env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());
        pathext
            .split(';')
            .any(|ext| extension == ext.trim_start_matches('.').to_ascii_lowercase())
    }
}

/// Search `PATH` for an executable with the given name.
pub fn find_in_path(cmd: &str) -> Option<PathBuf> {
    let path_var = std::env::var("PATH").ok()?;
    let separator = if cfg!(windows) { ';' } else { ':' };

    for dir in path_var.split(separator) {
        let full_path = Path::new(dir).join(cmd);
        if is_executable(&full_path) {
            return Some(full_path);
        }
        if cfg!(windows) {
            for ext in &["exe", "cmd", "bat", "com"] {
                let with_ext = full_path.with_extension(ext);
                if is_executable(&with_ext) {
                    return Some(with_ext);
                }
            }
        }
    }
    None
}
