//! Handing control to the cached executable.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::Path;
use std::process::Command;

/// Starts the resolved executable in place of the current process.
pub trait Launcher {
    /// Run `program` with `args`, inheriting stdio and environment.
    ///
    /// A real launch never returns: on Unix the process image is replaced,
    /// elsewhere the child's exit code becomes ours. `Ok` therefore only
    /// comes from launchers that record instead of run.
    ///
    /// # Errors
    ///
    /// Returns the error that prevented the launch.
    fn launch(&self, program: &Path, args: &[OsString]) -> io::Result<()>;
}

/// The operating system launcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    #[cfg(unix)]
    fn launch(&self, program: &Path, args: &[OsString]) -> io::Result<()> {
        use std::os::unix::process::CommandExt;

        Err(Command::new(program).args(args).exec())
    }

    #[cfg(not(unix))]
    fn launch(&self, program: &Path, args: &[OsString]) -> io::Result<()> {
        let status = Command::new(program).args(args).status()?;
        std::process::exit(status.code().unwrap_or(1));
    }
}

/// Dry-run stand-in for a launch: the target must be a regular file.
pub fn check_runnable(path: &Path) -> io::Result<()> {
    let meta = fs::metadata(path)?;
    if !meta.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a regular file: {}", path.display()),
        ));
    }
    Ok(())
}

/// Set `rwx` for everyone, minus the process umask.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> io::Result<()> {
    use nix::sys::stat::{Mode, umask};
    use std::os::unix::fs::PermissionsExt;

    let mask = umask(Mode::empty());
    umask(mask);
    let mode = 0o777 & !u32::from(mask.bits());
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

/// No permission bits to set here.
#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}
