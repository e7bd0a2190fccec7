//! Subprocess execution utilities.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output, Stdio};

use anyhow::{Context, Result};

/// Builder for subprocess execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    /// Build from a whitespace-separated command such as `"/bin/sh configure"`.
    ///
    /// Returns `None` for an empty command line.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(ProcessBuilder::new(program).args(parts))
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set several environment variables, on top of the inherited environment.
    pub fn envs<'a>(mut self, vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (key, value) in vars {
            self.env.insert(key.clone(), value.clone());
        }
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Build the Command.
    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Execute the command and wait for completion, capturing its output.
    pub fn exec(&self) -> Result<Output> {
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.program.display()))?;

        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to wait for `{}`", self.program.display()))?;

        Ok(output)
    }

    /// Execute with stdout and stderr both appended to `log`.
    ///
    /// The command line itself is written to the log first so that the log
    /// reads as a transcript of the module's build.
    pub fn exec_logged(&self, log: &Path) -> Result<ExitStatus> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .with_context(|| format!("failed to open log file: {}", log.display()))?;
        writeln!(file, "$ {}", self.display_command())?;

        let stderr = file
            .try_clone()
            .with_context(|| format!("failed to open log file: {}", log.display()))?;

        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::from(file));
        cmd.stderr(Stdio::from(stderr));

        let status = cmd
            .status()
            .with_context(|| format!("failed to execute `{}`", self.program.display()))?;
        Ok(status)
    }

    /// Execute and return status only.
    pub fn status(&self) -> Result<ExitStatus> {
        let mut cmd = self.build_command();
        let status = cmd
            .status()
            .with_context(|| format!("failed to execute `{}`", self.program.display()))?;
        Ok(status)
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// First of `candidates` found in PATH, with its resolved location.
pub fn find_first<'a>(candidates: &[&'a str]) -> Option<(&'a str, PathBuf)> {
    candidates
        .iter()
        .find_map(|name| find_executable(name).map(|path| (*name, path)))
}

/// Number of `make` jobs to use: half the CPUs, only when there are more than 2.
pub fn default_make_jobs() -> Option<usize> {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    make_jobs_for(cpus)
}

fn make_jobs_for(cpus: usize) -> Option<usize> {
    (cpus > 2).then_some(cpus / 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_builder() {
        let output = ProcessBuilder::new("echo").arg("hello").exec().unwrap();

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.trim() == "hello" || stdout.contains("hello"));
    }

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("./configure").args(["--prefix=/deps", "--enable-static=yes"]);

        assert_eq!(
            pb.display_command(),
            "./configure --prefix=/deps --enable-static=yes"
        );
    }

    #[test]
    fn test_from_command_line() {
        let pb = ProcessBuilder::from_command_line("/bin/sh configure").unwrap();
        assert_eq!(pb.get_program(), Path::new("/bin/sh"));
        assert_eq!(pb.get_args(), &["configure".to_string()]);
        assert!(ProcessBuilder::from_command_line("   ").is_none());
    }

    #[test]
    fn test_exec_logged_appends_transcript() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = tmp.path().join("01-zlib.log");

        let status = ProcessBuilder::new("echo").arg("configured").exec_logged(&log).unwrap();
        assert!(status.success());

        let contents = std::fs::read_to_string(&log).unwrap();
        assert!(contents.starts_with("$ echo configured\n"));
        assert!(contents.contains("configured\n"));
    }

    #[test]
    fn test_make_jobs_heuristic() {
        assert_eq!(make_jobs_for(1), None);
        assert_eq!(make_jobs_for(2), None);
        assert_eq!(make_jobs_for(8), Some(4));
        assert_eq!(make_jobs_for(3), Some(1));
    }
}
