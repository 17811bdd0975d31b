use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use crate::redirect::RedirectionContext;

/// The outcome of spawning an external program: either a captured form that
/// streams through pipes, or an interactive form that hands the program a
/// pseudoterminal.
pub enum Launched {
    Pipe(PipeChild),
    Pty(PtyChild),
}

/// A child spawned with stdout/stderr captured through anonymous pipes.
pub struct PipeChild {
    pub child: std::process::Child,
}

/// A child spawned attached to a pseudoterminal slave.
#[cfg(unix)]
pub struct PtyChild {
    pub master_fd: i32,
    pub pid: libc::pid_t,
}

#[cfg(not(unix))]
pub struct PtyChild {
    _private: (),
}

/// Spawn `program` with `args`. Uses the pipe form when the stage is
/// redirected or non-terminal (`ctx.is_redirected()`); otherwise allocates a
/// PTY so the foreign program can drive the real terminal interactively.
pub fn launch(
    program: &Path,
    args: &[String],
    ctx: &mut RedirectionContext,
) -> io::Result<Launched> {
    if ctx.is_redirected() {
        launch_pipe(program, args, ctx).map(Launched::Pipe)
    } else {
        launch_pty(program, args).map(Launched::Pty)
    }
}

fn launch_pipe(
    program: &Path,
    args: &[String],
    ctx: &mut RedirectionContext,
) -> io::Result<PipeChild> {
    let mut command = Command::new(program);
    command.args(args);

    command.stdin(ctx.input_to_stdio());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    reset_inherited_signals(&mut command);

    let child = command.spawn()?;
    Ok(PipeChild { child })
}

/// Reset signals the shell ignores back to `SIG_DFL` before exec, so a
/// pipeline stage doesn't inherit the shell's own signal dispositions.
fn reset_inherited_signals(command: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        unsafe {
            command.pre_exec(|| {
                for &sig in &[libc::SIGINT, libc::SIGQUIT, libc::SIGPIPE] {
                    if libc::signal(sig, libc::SIG_DFL) == libc::SIG_ERR {
                        return Err(io::Error::last_os_error());
                    }
                }
                Ok(())
            });
        }
    }
}

#[cfg(unix)]
fn launch_pty(program: &Path, args: &[String]) -> io::Result<PtyChild> {
    use std::ffi::CString;
    use std::os::unix::io::RawFd;

    let mut master: RawFd = -1;
    let mut slave: RawFd = -1;

    // SAFETY: openpty fills both fds on success; we check the return value.
    let rc = unsafe {
        libc::openpty(
            &mut master,
            &mut slave,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: fork() duplicates the calling process; both branches only
    // touch process-local state or freshly-owned fds afterward.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        let err = io::Error::last_os_error();
        unsafe {
            libc::close(master);
            libc::close(slave);
        }
        return Err(err);
    }

    if pid == 0 {
        // Child: attach the slave as our controlling terminal and exec.
        unsafe {
            libc::close(master);
            libc::setsid();
            if libc::ioctl(slave, libc::TIOCSCTTY as _, 0) != 0 {
                std::process::exit(126);
            }
            libc::dup2(slave, 0);
            libc::dup2(slave, 1);
            libc::dup2(slave, 2);
            if slave > 2 {
                libc::close(slave);
            }
        }

        // SAFETY: only mutated before exec, in the freshly forked child.
        unsafe { std::env::set_var("TERM", "xterm-256color") };

        let c_program = match CString::new(program.as_os_str().to_string_lossy().as_bytes()) {
            Ok(s) => s,
            Err(_) => std::process::exit(126),
        };
        let mut c_args: Vec<CString> = Vec::with_capacity(args.len() + 2);
        c_args.push(c_program.clone());
        for a in args {
            if let Ok(s) = CString::new(a.as_bytes()) {
                c_args.push(s);
            }
        }
        let mut argv: Vec<*const libc::c_char> =
            c_args.iter().map(|s| s.as_ptr()).collect();
        argv.push(std::ptr::null());

        unsafe {
            libc::execvp(c_program.as_ptr(), argv.as_ptr());
        }
        let err = io::Error::last_os_error();
        let _ = writeln!(io::stderr(), "Failed to exec: {err}");
        std::process::exit(127);
    }

    // Parent: close the slave, we only talk to the master.
    unsafe { libc::close(slave) };
    Ok(PtyChild { master_fd: master, pid })
}

#[cfg(not(unix))]
fn launch_pty(_program: &Path, _args: &[String]) -> io::Result<PtyChild> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "PTY sessions are only supported on Unix",
    ))
}

/// Map a spawn/exec error to the bit-exact "Failed to exec" message and a
/// nonzero exit code.
pub fn exec_error_message(err: &io::Error) -> String {
    format!("Failed to exec: {err}")
}
