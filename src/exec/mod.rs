use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use flowcell::{StaticConfig, Template, Vars};

use crate::fs::Fs;

/// Run a subprocess
mod run_cmd;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unable to start {0}")]
    Spawn(String, #[source] std::io::Error),
    #[error("{0} failed with {1}; see {2}")]
    Failed(String, String, String),
    #[error("{0} was killed after running for {1}")]
    Timeout(String, String),
}

/// A rendered shell command line and how to run it.
#[derive(Debug, Clone)]
pub struct Cmd {
    label: String,
    line: String,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    truncate_log: bool,
}

impl Cmd {
    pub fn new(label: &str, line: String) -> Self {
        Self {
            label: label.to_owned(),
            line,
            cwd: None,
            env: Vec::with_capacity(0),
            truncate_log: false,
        }
    }

    pub fn cwd(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// Set an environment variable for the child; its value never appears in logs.
    pub fn env(mut self, key: &str, val: &str) -> Self {
        self.env.push((key.to_owned(), val.to_owned()));
        self
    }

    /// Start the log file afresh instead of appending to it.
    pub fn truncate_log(mut self) -> Self {
        self.truncate_log = true;
        self
    }

    /// Append extra arguments to the command line.
    pub fn with_args(mut self, extra: &str) -> Self {
        self.line.push(' ');
        self.line.push_str(extra.trim());
        self
    }
}

/// Runs tools from the `[Commands]` section, logging their output.
///
/// Shared by reference between pool workers.
#[derive(Debug, Clone, Copy)]
pub struct Runner<'a> {
    config: &'a StaticConfig,
    fs: &'a Fs,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a StaticConfig, fs: &'a Fs) -> Self {
        Self { config, fs }
    }

    /// Render the `[Commands]` template for `tool`.
    pub fn cmd(&self, tool: &str, vars: &Vars) -> Result<Cmd> {
        let line = self.config.command(tool)?.render(vars)?;
        Ok(Cmd::new(tool, line))
    }

    /// Like `cmd`, but renders `default` when `tool` is not configured.
    pub fn cmd_or(&self, tool: &str, default: &str, vars: &Vars) -> Result<Cmd> {
        if self.has(tool) {
            return self.cmd(tool, vars);
        }
        let line = Template::new(tool, default)?.render(vars)?;
        Ok(Cmd::new(tool, line))
    }

    pub fn has(&self, tool: &str) -> bool {
        self.config.has_command(tool)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.config.system.tool_timeout
    }

    /// Run `cmd`, sending stdout and stderr to `log`.
    pub fn run(&self, cmd: &Cmd, log: &Path) -> Result<()> {
        log::info!("[{}] running: {}", cmd.label, cmd.line);
        let file = if cmd.truncate_log {
            self.fs.create_file(log)?
        } else {
            self.fs.append_file(log)?
        };
        run_cmd::run_logged(cmd, file, log, self.timeout())
            .with_context(|| format!("running {}", cmd.label))?;
        Ok(())
    }

    /// Shortcut for `run(&cmd(tool, vars)?, log)`.
    pub fn run_tool(&self, tool: &str, vars: &Vars, log: &Path) -> Result<()> {
        self.run(&self.cmd(tool, vars)?, log)
    }

    /// Run `cmd` and return its trimmed stdout. Output is not logged.
    pub fn capture(&self, cmd: &Cmd) -> Result<String> {
        log::debug!("[{}] capturing output", cmd.label);
        let out = run_cmd::capture(cmd, self.timeout())
            .with_context(|| format!("running {}", cmd.label))?;
        Ok(out.trim_end_matches('\n').to_owned())
    }
}

/// Quote a path for use in a `sh -c` command line.
pub fn quote(path: &Path) -> String {
    let s = path.to_string_lossy();
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Quote each path and join with spaces.
pub fn quote_all<'p, I: IntoIterator<Item = &'p PathBuf>>(paths: I) -> String {
    paths
        .into_iter()
        .map(|p| quote(p))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn test_quote() {
        assert_eq!("'/out/run'", quote(Path::new("/out/run")));
        assert_eq!(r"'/out/it'\''s'", quote(Path::new("/out/it's")));
        let paths = vec![PathBuf::from("/a b"), PathBuf::from("/c")];
        assert_eq!("'/a b' '/c'", quote_all(&paths));
    }
}
