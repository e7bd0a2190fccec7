//! Build error taxonomy.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors that abort a build.
///
/// Input errors (`InvalidSpec` through `UnavailableModules`) are raised while
/// the build setup is constructed, before any folder is created or any
/// download is attempted.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid python spec: {spec}")]
    InvalidSpec { spec: String },

    #[error("Python family '{family}' is not yet supported")]
    UnsupportedFamily { family: String },

    #[error("{spec} is not in the supported list")]
    UnsupportedVersion { spec: String },

    #[error("Invalid target '{target}', expected <platform>-<architecture>")]
    InvalidTarget { target: String },

    #[error("Refusing path with space: {}", path.display())]
    PathWithSpace { path: PathBuf },

    #[error("Unknown modules: {}", names.join(", "))]
    UnknownModules { names: Vec<String> },

    #[error("Modules not available on {target}: {}", names.join(", "))]
    UnavailableModules { target: String, names: Vec<String> },

    #[error("Compiling on platform '{platform}' is not yet supported")]
    UnsupportedPlatform { platform: String },

    #[error("`{command}` {}{}", exit_status(*code), log_hint(log))]
    ToolFailure {
        command: String,
        code: Option<i32>,
        log: Option<PathBuf>,
    },

    #[error("failed to fetch {url}: {message}")]
    FetchFailure { url: String, message: String },

    #[error("Build failed: {summary}")]
    ValidationFailure { summary: String },
}

/// `failed with exit code 2`, or `was killed by a signal` when the process
/// has no exit code.
pub fn exit_status(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("failed with exit code {}", code),
        None => "was killed by a signal".to_string(),
    }
}

fn log_hint(log: &Option<PathBuf>) -> String {
    match log {
        Some(path) => format!(" (see {})", path.display()),
        None => String::new(),
    }
}

impl BuildError {
    /// Whether this error was caused by bad user input rather than a failed build step.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            BuildError::InvalidSpec { .. }
                | BuildError::UnsupportedFamily { .. }
                | BuildError::UnsupportedVersion { .. }
                | BuildError::InvalidTarget { .. }
                | BuildError::PathWithSpace { .. }
                | BuildError::UnknownModules { .. }
                | BuildError::UnavailableModules { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_modules_lists_all_names() {
        let err = BuildError::UnknownModules {
            names: vec!["foo".to_string(), "bar".to_string()],
        };
        assert_eq!(err.to_string(), "Unknown modules: foo, bar");
        assert!(err.is_input_error());
    }

    #[test]
    fn test_tool_failure_mentions_log() {
        let err = BuildError::ToolFailure {
            command: "./configure --prefix=/deps".to_string(),
            code: Some(2),
            log: Some(PathBuf::from("build/cpython-3.9.6/logs/01-readline.log")),
        };
        assert_eq!(
            err.to_string(),
            "`./configure --prefix=/deps` failed with exit code 2 \
             (see build/cpython-3.9.6/logs/01-readline.log)"
        );
        assert!(!err.is_input_error());

        let killed = BuildError::ToolFailure {
            command: "make".to_string(),
            code: None,
            log: None,
        };
        assert_eq!(killed.to_string(), "`make` was killed by a signal");
    }
}
