// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Signal delivery and liveness probes for agent pids.

use crate::domain::runtime::{ProcessControl, ProcessError, Signal};

#[derive(Debug, Clone, Copy, Default)]
pub struct UnixProcessControl;

impl UnixProcessControl {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
fn raw_signal(signal: Signal) -> libc::c_int {
    match signal {
        Signal::Terminate => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    }
}

#[cfg(unix)]
fn to_pid(pid: u32) -> Option<libc::pid_t> {
    // 0 and negative pids address process groups; never signal those.
    libc::pid_t::try_from(pid).ok().filter(|p| *p > 0)
}

#[cfg(unix)]
impl ProcessControl for UnixProcessControl {
    fn signal(&self, pid: u32, signal: Signal) -> Result<(), ProcessError> {
        let Some(raw_pid) = to_pid(pid) else {
            return Err(ProcessError::NotFound(pid));
        };
        let rc = unsafe { libc::kill(raw_pid, raw_signal(signal)) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ESRCH) => Err(ProcessError::NotFound(pid)),
            Some(libc::EPERM) => Err(ProcessError::PermissionDenied(pid)),
            _ => Err(ProcessError::Signal { pid, signal, source: err }),
        }
    }

    fn is_alive(&self, pid: u32) -> bool {
        let Some(raw_pid) = to_pid(pid) else {
            return false;
        };
        if unsafe { libc::kill(raw_pid, 0) } == 0 {
            return true;
        }
        // EPERM: the process exists but belongs to someone else.
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}
