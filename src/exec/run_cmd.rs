use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use util::format_duration;

use super::{Cmd, Error};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

fn shell(cmd: &Cmd) -> Command {
    let mut command = Command::new("bash");
    command.args(["-euo", "pipefail", "-c", &cmd.line]);
    if let Some(cwd) = &cmd.cwd {
        command.current_dir(cwd);
    }
    for (k, v) in &cmd.env {
        command.env(k, v);
    }
    // own process group, so a timeout can kill everything the shell started:
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command
}

/// Run `cmd` under bash, copying its stdout and stderr into `log_file`.
/// Based on:
/// <https://stackoverflow.com/questions/66060139/how-to-tee-stdout-stderr-from-a-subprocess-in-rust>
pub fn run_logged(
    cmd: &Cmd,
    log_file: File,
    log_path: &Path,
    timeout: Option<Duration>,
) -> Result<(), Error> {
    let spawn_err = |e| Error::Spawn(cmd.label.clone(), e);
    let err_file = log_file.try_clone().map_err(spawn_err)?;

    let mut child = shell(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;

    let child_out = child.stdout.take();
    let child_err = child.stderr.take();
    let thread_out = thread::spawn(move || child_out.map(|s| communicate(s, log_file)));
    let thread_err = thread::spawn(move || child_err.map(|s| communicate(s, err_file)));

    let status = wait(&mut child, &cmd.label, timeout);

    // a panicking reader only loses log output, not the exit status:
    for (stream, handle) in [("stdout", thread_out), ("stderr", thread_err)] {
        match handle.join() {
            Ok(Some(Err(e))) => log::warn!("[{}] lost {stream} output: {e}", cmd.label),
            Err(_) => log::warn!("[{}] {stream} reader panicked", cmd.label),
            _ => {}
        }
    }

    let status = status?;
    log::debug!("[{}] finished with {status}", cmd.label);
    if status.success() {
        Ok(())
    } else {
        Err(Error::Failed(
            cmd.label.clone(),
            status.to_string(),
            log_path.to_string_lossy().into_owned(),
        ))
    }
}

/// Run `cmd` and collect its stdout; stderr is discarded.
pub fn capture(cmd: &Cmd, timeout: Option<Duration>) -> Result<String, Error> {
    let spawn_err = |e| Error::Spawn(cmd.label.clone(), e);
    let mut child = shell(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(spawn_err)?;
    let child_out = child.stdout.take();
    let reader = thread::spawn(move || {
        let mut out = String::new();
        if let Some(mut s) = child_out {
            s.read_to_string(&mut out)?;
        }
        Ok::<_, std::io::Error>(out)
    });
    let status = wait(&mut child, &cmd.label, timeout)?;
    let out = match reader.join() {
        Ok(res) => res.map_err(spawn_err)?,
        Err(_) => String::new(),
    };
    if status.success() {
        Ok(out)
    } else {
        Err(Error::Failed(cmd.label.clone(), status.to_string(), "stderr".to_owned()))
    }
}

fn wait(child: &mut Child, label: &str, timeout: Option<Duration>) -> Result<ExitStatus, Error> {
    let io_err = |e| Error::Spawn(label.to_owned(), e);
    let Some(timeout) = timeout else {
        return child.wait().map_err(io_err);
    };
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(io_err)? {
            return Ok(status);
        }
        if start.elapsed() >= timeout {
            log::error!("[{label}] timed out after {}; killing", format_duration(timeout));
            kill_group(child);
            child.wait().map_err(io_err)?;
            return Err(Error::Timeout(label.to_owned(), format_duration(timeout)));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn kill_group(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let killed = Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if matches!(killed, Ok(s) if s.success()) {
            return;
        }
    }
    if let Err(e) = child.kill() {
        log::warn!("unable to kill child process {}: {e}", child.id());
    }
}

fn communicate<R: Read, W: Write>(mut stream: R, mut file: W) -> std::io::Result<()> {
    let mut buf = [0u8; 4096];
    loop {
        let num_read = stream.read(&mut buf)?;
        if num_read == 0 {
            break;
        }
        file.write_all(&buf[..num_read])?;
    }
    file.flush()
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_output_goes_to_log() -> Result<()> {
        let dir = tempdir()?;
        let log = dir.path().join("bcl.log");
        let cmd = Cmd::new("echo", "echo out; echo err >&2".to_owned());
        run_logged(&cmd, File::create(&log)?, &log, None)?;
        let text = fs::read_to_string(&log)?;
        assert!(text.contains("out\n"));
        assert!(text.contains("err\n"));
        Ok(())
    }

    #[test]
    fn test_failure_and_pipefail() -> Result<()> {
        let dir = tempdir()?;
        let log = dir.path().join("fail.log");
        let cmd = Cmd::new("pipe", "false | cat".to_owned());
        let err = run_logged(&cmd, File::create(&log)?, &log, None).unwrap_err();
        assert!(matches!(err, Error::Failed(label, _, _) if label == "pipe"));
        Ok(())
    }

    #[test]
    fn test_timeout_kills_child() -> Result<()> {
        let dir = tempdir()?;
        let log = dir.path().join("slow.log");
        let cmd = Cmd::new("slow", "sleep 30".to_owned());
        let start = Instant::now();
        let err = run_logged(
            &cmd,
            File::create(&log)?,
            &log,
            Some(Duration::from_millis(300)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Timeout(..)));
        assert!(start.elapsed() < Duration::from_secs(10));
        Ok(())
    }

    #[test]
    fn test_capture_with_env_and_cwd() -> Result<()> {
        let dir = tempdir()?;
        let cmd = Cmd::new("pw", "printf '%s\\n' \"$SECRET\"; pwd >&2".to_owned())
            .env("SECRET", "correct-horse")
            .cwd(dir.path());
        assert_eq!("correct-horse\n", capture(&cmd, None)?);
        Ok(())
    }
}
