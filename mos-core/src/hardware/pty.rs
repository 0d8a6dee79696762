//! Pseudo-terminal plumbing shared by the serial devices.

use std::fs::File;
use std::os::fd::{FromRawFd, IntoRawFd};

use nix::fcntl::OFlag;
use nix::pty::{grantpt, posix_openpt, ptsname_r, unlockpt};
use nix::sys::termios::{cfmakeraw, tcgetattr, tcsetattr, SetArg};

use crate::hardware::DeviceError;

fn pty_err(device: &'static str, what: &str, errno: nix::Error) -> DeviceError {
    DeviceError::Init {
        device,
        msg: format!("{}: {}", what, errno),
    }
}

/// Open a pty master, returning the master handle and the slave path a host
/// terminal can attach to. `raw` disables echo and line discipline so bytes
/// travel unmangled.
pub fn open_pty(device: &'static str, raw: bool) -> Result<(File, String), DeviceError> {
    let master = posix_openpt(OFlag::O_RDWR).map_err(|e| pty_err(device, "posix_openpt", e))?;
    grantpt(&master).map_err(|e| pty_err(device, "grantpt", e))?;
    unlockpt(&master).map_err(|e| pty_err(device, "unlockpt", e))?;
    let path = ptsname_r(&master).map_err(|e| pty_err(device, "ptsname", e))?;

    // Safety: into_raw_fd transfers ownership of the descriptor, so the File
    // is its single owner from here on.
    let file = unsafe { File::from_raw_fd(master.into_raw_fd()) };

    if raw {
        let mut termios = tcgetattr(&file).map_err(|e| pty_err(device, "tcgetattr", e))?;
        cfmakeraw(&mut termios);
        tcsetattr(&file, SetArg::TCSANOW, &termios)
            .map_err(|e| pty_err(device, "tcsetattr", e))?;
    }

    Ok((file, path))
}
