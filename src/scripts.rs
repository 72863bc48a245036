use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

/// How long a script may run before it is killed. Detection scripts are
/// expected to print one line and exit; anything still alive after this is
/// considered wedged.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const WAIT_POLL: Duration = Duration::from_millis(25);

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("file not found or inaccessible")]
    NotFound,

    #[error("file is not executable")]
    NotExecutable,

    #[error("unable to execute: {0}")]
    Io(#[from] io::Error),

    #[error("killed after running for {} second(s)", .0.as_secs())]
    TimedOut(Duration),

    #[error("got gibberish from child process")]
    Gibberish,
}

/// A directory of operator-provided executables, addressed by the file names
/// the configuration references them with.
#[derive(Debug, Clone)]
pub struct ScriptDir {
    root: PathBuf,
    timeout: Duration,
}

impl ScriptDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Same directory with a different kill deadline for [`ScriptDir::run`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Checks that `name` exists under the directory and may be executed,
    /// without running it.
    pub fn check(&self, name: &str) -> Result<(), ScriptError> {
        let path = self.resolve(name);

        if !path.exists() {
            return Err(ScriptError::NotFound);
        }

        if !is_executable(&path) {
            return Err(ScriptError::NotExecutable);
        }

        Ok(())
    }

    /// Runs `name` with an optional single argument and returns its trimmed
    /// standard output. The exit status is captured but not consulted; only
    /// the output decides whether an invocation was useful.
    pub fn run(&self, name: &str, arg: Option<&str>) -> Result<String, ScriptError> {
        let path = self.resolve(name);

        debug!("executing script: {}", path.display());

        let mut command = Command::new(&path);
        if let Some(arg) = arg {
            command.arg(arg);
        }

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        // Drain stdout while the child runs. A script that prints more than
        // the pipe buffer holds would otherwise block on write and never
        // exit.
        let pipe = child.stdout.take();
        let reader = thread::spawn(move || -> io::Result<Vec<u8>> {
            let mut stdout = Vec::new();
            if let Some(mut pipe) = pipe {
                pipe.read_to_end(&mut stdout)?;
            }
            Ok(stdout)
        });

        self.reap(&mut child)?;

        // The child is gone, so the reader is at EOF or about to hit it.
        let stdout = match reader.join() {
            Ok(stdout) => stdout?,
            Err(_) => Vec::new(),
        };

        let output = String::from_utf8(stdout).map_err(|_| ScriptError::Gibberish)?;

        Ok(output.trim().to_string())
    }

    // Bounded wait. Scripts run synchronously in the middle of a round, and
    // one wedged script must not stall every other host forever.
    fn reap(&self, child: &mut Child) -> Result<(), ScriptError> {
        let deadline = Instant::now() + self.timeout;

        loop {
            match child.try_wait()? {
                Some(_status) => return Ok(()),

                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ScriptError::TimedOut(self.timeout));
                }

                None => thread::sleep(WAIT_POLL),
            }
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };

    unsafe { libc::access(path.as_ptr(), libc::X_OK) == 0 }
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

#[cfg(all(test, unix))]
pub(crate) mod test_util {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Drops an executable `/bin/sh` script into `dir` for tests to invoke.
    pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
