// Privilege and environment assembly for dispatched commands.
//
// Resolves a target user through the system identity directory
// (getpwnam_r / getgrouplist) and builds the child environment: the
// inherited process environment, the account's HOME/USER/LOGNAME/SHELL
// when switching users, then the entry's own NAME=VALUE assignments.
//
// Lookup and assembly never require root. The actual identity switch
// happens at spawn time via uid/gid/groups on the child command; when the
// daemon lacks the privilege for it the spawn fails with EPERM and is
// reported as that execution's failure.

use crate::errors::PrepareError;
use std::ffi::{CStr, CString};
use std::os::unix::process::CommandExt;

/// A resolved system account.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionUser {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    /// Full supplementary group list, including the primary gid.
    pub groups: Vec<u32>,
    pub home: String,
    pub shell: String,
}

/// Credentials and environment for one execution.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// `None` means run as the invoking process's identity.
    pub user: Option<ExecutionUser>,
    /// Ordered environment; later overlay entries replaced earlier ones
    /// of the same name in place.
    pub env: Vec<(String, String)>,
}

impl ExecutionContext {
    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Assemble the execution context for `(user, extra_env)`.
pub fn prepare(user: Option<&str>, extra_env: &[String]) -> Result<ExecutionContext, PrepareError> {
    let mut env: Vec<(String, String)> = std::env::vars().collect();

    let user = match user.filter(|u| !u.is_empty()) {
        Some(name) => {
            let account = lookup_user(name)?;
            overlay(&mut env, "HOME", &account.home);
            overlay(&mut env, "USER", &account.name);
            overlay(&mut env, "LOGNAME", &account.name);
            overlay(&mut env, "SHELL", &account.shell);
            Some(account)
        }
        None => None,
    };

    for assignment in extra_env {
        if let Some((name, value)) = assignment.split_once('=') {
            overlay(&mut env, name, value);
        }
    }

    Ok(ExecutionContext { user, env })
}

/// Build the child process for a shell command under this context:
/// `sh -c <command>` with a cleared environment and, when switching
/// users, uid/gid plus the supplementary group list.
pub fn build_command(shell_command: &str, context: &ExecutionContext) -> tokio::process::Command {
    let mut command = std::process::Command::new("sh");
    command.arg("-c").arg(shell_command);
    command.env_clear();
    for (name, value) in &context.env {
        command.env(name, value);
    }
    if let Some(user) = &context.user {
        let uid = user.uid;
        let gid = user.gid;
        let groups: Vec<libc::gid_t> = user.groups.iter().map(|&g| g as libc::gid_t).collect();
        // setgroups must run while the child still holds the daemon's
        // privilege, so all three identity changes happen in one hook
        // instead of the builder's uid/gid setters (whose own setuid
        // runs before pre_exec hooks). A failure here surfaces from
        // spawn as that execution's error.
        unsafe {
            command.pre_exec(move || {
                if libc::setgroups(groups.len(), groups.as_ptr()) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                if libc::setgid(gid) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                if libc::setuid(uid) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }
    tokio::process::Command::from(command)
}

fn overlay(env: &mut Vec<(String, String)>, name: &str, value: &str) {
    match env.iter_mut().find(|(n, _)| n.as_str() == name) {
        Some(slot) => slot.1 = value.to_string(),
        None => env.push((name.to_string(), value.to_string())),
    }
}

/// Resolve an account by name via getpwnam_r.
pub fn lookup_user(name: &str) -> Result<ExecutionUser, PrepareError> {
    let cname = CString::new(name).map_err(|_| PrepareError::UnknownUser(name.to_string()))?;

    let mut passwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0u8; 4096];
    loop {
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let rc = unsafe {
            libc::getpwnam_r(
                cname.as_ptr(),
                &mut passwd,
                buf.as_mut_ptr().cast::<libc::c_char>(),
                buf.len(),
                &mut result,
            )
        };
        if rc == libc::ERANGE {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 {
            return Err(PrepareError::LookupFailed {
                user: name.to_string(),
                source: std::io::Error::from_raw_os_error(rc),
            });
        }
        if result.is_null() {
            return Err(PrepareError::UnknownUser(name.to_string()));
        }

        let home = unsafe { CStr::from_ptr(passwd.pw_dir) }
            .to_string_lossy()
            .into_owned();
        let shell = unsafe { CStr::from_ptr(passwd.pw_shell) }
            .to_string_lossy()
            .into_owned();
        let groups = group_list(&cname, passwd.pw_gid, name)?;

        return Ok(ExecutionUser {
            name: name.to_string(),
            uid: passwd.pw_uid,
            gid: passwd.pw_gid,
            groups,
            home,
            shell,
        });
    }
}

fn group_list(name: &CStr, gid: libc::gid_t, user: &str) -> Result<Vec<u32>, PrepareError> {
    let mut capacity: libc::c_int = 16;
    loop {
        let mut groups = vec![0 as libc::gid_t; capacity as usize];
        let mut count = capacity;
        let rc = unsafe { libc::getgrouplist(name.as_ptr(), gid, groups.as_mut_ptr(), &mut count) };
        if rc == -1 {
            if count > capacity {
                capacity = count;
                continue;
            }
            return Err(PrepareError::GroupListFailed(user.to_string()));
        }
        groups.truncate(count as usize);
        return Ok(groups.into_iter().map(|g| g as u32).collect());
    }
}
