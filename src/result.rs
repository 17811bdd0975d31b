use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::launcher::{PipeChild, PtyChild};
use crate::redirect::RedirectionContext;
use crate::status;

/// A command's result, produced once by a handler and consumed exactly once
/// by [`CommandResult::output`] to drive its sink(s).
pub enum CommandResult {
    Pipe(PipeResult),
    Pty(PtyResult),
}

impl CommandResult {
    pub fn output(self, ctx: &mut RedirectionContext) -> io::Result<i32> {
        match self {
            CommandResult::Pipe(r) => r.output(ctx),
            CommandResult::Pty(r) => r.output(ctx),
        }
    }
}

/// Drains a child's stdout (calling thread) and stderr (helper thread)
/// concurrently into the stage's sinks, serialized by a per-result lock so a
/// chunk from one channel never interleaves with a chunk from the other
/// mid-write.
pub struct PipeResult {
    child: PipeChild,
    /// Force a flush after every write — used when the sink is a terminal.
    flush: bool,
}

impl PipeResult {
    pub fn new(child: PipeChild, flush: bool) -> Self {
        PipeResult { child, flush }
    }

    pub fn output(mut self, ctx: &mut RedirectionContext) -> io::Result<i32> {
        let lock = Arc::new(Mutex::new(()));
        let flush = self.flush;

        let stderr_reader = self.child.child.stderr.take();
        let stderr_writer = ctx.clone_stderr_writer()?;
        let stderr_lock = Arc::clone(&lock);
        let stderr_thread = std::thread::spawn(move || -> io::Result<()> {
            if let Some(reader) = stderr_reader {
                drain(reader, stderr_writer, stderr_lock, flush)?;
            }
            Ok(())
        });

        if let Some(reader) = self.child.child.stdout.take() {
            let stdout_writer = ctx.clone_stdout_writer()?;
            drain(reader, stdout_writer, Arc::clone(&lock), flush)?;
        }

        let _ = stderr_thread.join();

        let exit_status = self.child.child.wait()?;
        Ok(status::exit_code(exit_status))
    }
}

/// Copy `reader` to `writer` in chunks, writes serialized by `lock`. If the
/// stream produced any output and the last byte wasn't `\n`, append one.
fn drain(
    mut reader: impl Read,
    mut writer: Box<dyn Write + Send>,
    lock: Arc<Mutex<()>>,
    flush: bool,
) -> io::Result<()> {
    let mut buf = [0u8; 8192];
    let mut last_byte: Option<u8> = None;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        {
            let _guard = lock.lock().unwrap();
            writer.write_all(&buf[..n])?;
            if flush {
                writer.flush()?;
            }
        }
        last_byte = Some(buf[n - 1]);
    }

    if let Some(b) = last_byte {
        if b != b'\n' {
            let _guard = lock.lock().unwrap();
            writer.write_all(b"\n")?;
        }
    }

    Ok(())
}

/// RAII guard: enables terminal raw mode on construction and restores it on
/// drop, even on panic — so a PTY session never leaves the controlling
/// terminal in a broken state.
struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> io::Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        Ok(RawModeGuard)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

/// Forwards real stdin into a PTY master while a foreign program owns the
/// terminal, and copies the master's output back to the sink.
pub struct PtyResult {
    child: PtyChild,
}

impl PtyResult {
    pub fn new(child: PtyChild) -> Self {
        PtyResult { child }
    }

    #[cfg(unix)]
    pub fn output(self, ctx: &mut RedirectionContext) -> io::Result<i32> {
        let _raw_mode = RawModeGuard::enter()?;

        let master_fd = self.child.master_fd;
        let child_end = Arc::new(AtomicBool::new(false));
        let forwarder_flag = Arc::clone(&child_end);
        let forwarder = std::thread::spawn(move || forward_keystrokes(master_fd, forwarder_flag));

        let mut writer = ctx.clone_stdout_writer()?;
        let mut buf = [0u8; 1024];
        loop {
            let n = retry_eintr(|| unsafe {
                libc::read(master_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) as i64
            });
            if n <= 0 {
                break;
            }
            writer.write_all(&buf[..n as usize])?;
        }

        child_end.store(true, Ordering::SeqCst);
        let _ = forwarder.join();

        let mut raw_status: libc::c_int = 0;
        retry_eintr(|| unsafe { libc::waitpid(self.child.pid, &mut raw_status, 0) as i64 });
        unsafe { libc::close(master_fd) };

        Ok(status::exit_code_from_wait_status(raw_status).unwrap_or(1))
    }

    #[cfg(not(unix))]
    pub fn output(self, _ctx: &mut RedirectionContext) -> io::Result<i32> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "PTY sessions are only supported on Unix",
        ))
    }
}

#[cfg(unix)]
fn forward_keystrokes(master_fd: i32, child_end: Arc<AtomicBool>) {
    let mut buf = [0u8; 1024];
    while !child_end.load(Ordering::SeqCst) {
        let mut pollfd = libc::pollfd {
            fd: 0,
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = retry_eintr(|| unsafe { libc::poll(&mut pollfd, 1, 100) as i64 });
        if ready <= 0 {
            continue;
        }
        if pollfd.revents & libc::POLLIN == 0 {
            continue;
        }
        let n = retry_eintr(|| unsafe {
            libc::read(0, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) as i64
        });
        if n <= 0 {
            break;
        }
        unsafe {
            libc::write(master_fd, buf.as_ptr() as *const libc::c_void, n as usize);
        }
    }
}

#[cfg(unix)]
fn retry_eintr(mut f: impl FnMut() -> i64) -> i64 {
    loop {
        let rc = f();
        if rc < 0 && io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return rc;
    }
}
