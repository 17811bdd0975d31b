use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal, Write};

use crate::parser::{Channel, RedirectMode, Stage};

/// Where a stage's stdin comes from.
pub enum InputSource {
    Inherit,
    File(File),
    Pipe(os_pipe::PipeReader),
}

/// Where a stage's stdout/stderr goes.
pub enum OutputSink {
    Inherit,
    File(File),
    Pipe(os_pipe::PipeWriter),
}

impl OutputSink {
    fn as_writer(&mut self) -> Option<&mut dyn Write> {
        match self {
            OutputSink::Inherit => None,
            OutputSink::File(f) => Some(f),
            OutputSink::Pipe(p) => Some(p),
        }
    }
}

/// Per-stage I/O bindings, owning every descriptor it opens and guaranteeing
/// their release exactly once.
pub struct RedirectionContext {
    pub input: InputSource,
    pub output: OutputSink,
    pub error: OutputSink,
    pub is_piped: bool,
    closed: bool,
    input_closed: bool,
}

impl RedirectionContext {
    /// Build a context from a stage's parsed channel map, opening every
    /// redirected file in the requested mode and creating deferred-touch
    /// files empty without opening them for further I/O.
    pub fn from_stage(stage: &Stage) -> io::Result<Self> {
        let mut ctx = RedirectionContext {
            input: InputSource::Inherit,
            output: OutputSink::Inherit,
            error: OutputSink::Inherit,
            is_piped: stage.is_piped,
            closed: false,
            input_closed: false,
        };

        if let Some((path, mode)) = stage.channels.get(&Channel::Stdout) {
            ctx.output = OutputSink::File(open_for_mode(path, *mode)?);
        }
        if let Some((path, mode)) = stage.channels.get(&Channel::Stderr) {
            ctx.error = OutputSink::File(open_for_mode(path, *mode)?);
        }
        for path in &stage.deferred_touches {
            File::create(path)?;
        }

        Ok(ctx)
    }

    pub fn set_input(&mut self, input: InputSource) {
        self.input = input;
        self.input_closed = false;
    }

    pub fn set_output(&mut self, output: OutputSink) {
        self.output = output;
    }

    pub fn set_error(&mut self, error: OutputSink) {
        self.error = error;
    }

    /// True iff this stage is part of a pipeline, or the output/error sink
    /// is not a real terminal — either because it was redirected to a file
    /// or pipe, or because the shell's own stdout/stderr isn't a tty (e.g.
    /// when the shell itself is run with its output captured).
    pub fn is_redirected(&self) -> bool {
        self.is_piped || !self.output_is_tty() || !self.error_is_tty()
    }

    fn output_is_tty(&self) -> bool {
        match self.output {
            OutputSink::Inherit => io::stdout().is_terminal(),
            OutputSink::File(_) | OutputSink::Pipe(_) => false,
        }
    }

    fn error_is_tty(&self) -> bool {
        match self.error {
            OutputSink::Inherit => io::stderr().is_terminal(),
            OutputSink::File(_) | OutputSink::Pipe(_) => false,
        }
    }

    /// Release only the input resource. Idempotent.
    pub fn close_input(&mut self) {
        if self.input_closed {
            return;
        }
        self.input = InputSource::Inherit;
        self.input_closed = true;
    }

    /// Release every channel. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.close_input();
        self.output = OutputSink::Inherit;
        self.error = OutputSink::Inherit;
        self.closed = true;
    }

    pub fn write_stdout(&mut self, buf: &[u8]) -> io::Result<()> {
        match self.output.as_writer() {
            Some(w) => w.write_all(buf),
            None => io::stdout().write_all(buf),
        }
    }

    pub fn write_stderr(&mut self, buf: &[u8]) -> io::Result<()> {
        match self.error.as_writer() {
            Some(w) => w.write_all(buf),
            None => io::stderr().write_all(buf),
        }
    }

    /// Convert the input side into a [`Stdio`](std::process::Stdio) for a
    /// spawned external program, taking ownership of whatever descriptor
    /// was bound.
    pub fn input_to_stdio(&mut self) -> std::process::Stdio {
        match std::mem::replace(&mut self.input, InputSource::Inherit) {
            InputSource::Inherit => std::process::Stdio::inherit(),
            InputSource::File(f) => std::process::Stdio::from(f),
            InputSource::Pipe(p) => std::process::Stdio::from(p),
        }
    }

    /// An independent writable handle onto the stdout sink, for use from a
    /// helper thread alongside the main thread's own access.
    pub fn clone_stdout_writer(&self) -> io::Result<Box<dyn Write + Send>> {
        match &self.output {
            OutputSink::Inherit => Ok(Box::new(io::stdout())),
            OutputSink::File(f) => Ok(Box::new(f.try_clone()?)),
            OutputSink::Pipe(p) => Ok(Box::new(p.try_clone()?)),
        }
    }

    /// An independent writable handle onto the stderr sink.
    pub fn clone_stderr_writer(&self) -> io::Result<Box<dyn Write + Send>> {
        match &self.error {
            OutputSink::Inherit => Ok(Box::new(io::stderr())),
            OutputSink::File(f) => Ok(Box::new(f.try_clone()?)),
            OutputSink::Pipe(p) => Ok(Box::new(p.try_clone()?)),
        }
    }
}

impl Drop for RedirectionContext {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_for_mode(path: &str, mode: RedirectMode) -> io::Result<File> {
    match mode {
        RedirectMode::Truncate => File::create(path),
        RedirectMode::Append => OpenOptions::new().create(true).append(true).open(path),
    }
}
