use std::io;

use crate::builtins::{self, BuiltinOutcome};
use crate::launcher::{self, Launched};
use crate::parser::{Channel, ParsedLine, Stage};
use crate::redirect::{InputSource, OutputSink, RedirectionContext};
use crate::registry::{self, Resolution};
use crate::result::{CommandResult, PipeResult, PtyResult};

/// Run one parsed input line end to end: fork every non-terminal pipe
/// stage, run the terminal stage in this process, and reap every forked
/// child before returning the terminal stage's exit code. Never returns if
/// the `exit` builtin was invoked — the process exits directly.
pub fn run_pipeline(parsed: ParsedLine) -> i32 {
    #[cfg(unix)]
    {
        let mut child_pids: Vec<libc::pid_t> = Vec::new();
        let mut prev_stdin: Option<InputSource> = None;

        for stage in &parsed.pipe_stages {
            match fork_stage(stage, prev_stdin.take()) {
                Ok((pid, next_stdin)) => {
                    child_pids.push(pid);
                    prev_stdin = next_stdin;
                }
                Err(e) => {
                    eprintln!("corsh: {e}");
                    reap_all(&child_pids);
                    return 1;
                }
            }
        }

        let (status, exit_requested) = match run_terminal_stage(&parsed.terminal_stage, prev_stdin) {
            Ok(TerminalOutcome::Continue(code)) => (code, false),
            Ok(TerminalOutcome::Exit) => (0, true),
            Err(e) => {
                eprintln!("corsh: {e}");
                (1, false)
            }
        };

        reap_all(&child_pids);

        if exit_requested {
            std::process::exit(0);
        }

        status
    }

    #[cfg(not(unix))]
    {
        let _ = parsed;
        eprintln!("corsh: pipelines require a Unix host (fork/waitpid)");
        1
    }
}

#[cfg(unix)]
enum TerminalOutcome {
    Continue(i32),
    Exit,
}

/// Fork a single non-terminal stage. The parent releases its copy of the
/// stage's descriptors and returns immediately with the child's pid and the
/// input the *next* stage should read from; the child runs the resolved
/// handler to completion and exits with its result code (or the force-exit
/// sentinel `127` if `exit` was invoked inside it).
#[cfg(unix)]
fn fork_stage(
    stage: &Stage,
    prev_stdin: Option<InputSource>,
) -> io::Result<(libc::pid_t, Option<InputSource>)> {
    let mut ctx = RedirectionContext::from_stage(stage)?;
    if let Some(input) = prev_stdin {
        ctx.set_input(input);
    }
    let next_stdin = wire_stage_output(&mut ctx, stage)?;
    let resolution = registry::resolve(&stage.program);

    // SAFETY: fork() duplicates this process; the child only touches
    // process-local state (ctx, stage) before exiting.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(io::Error::last_os_error());
    }

    if pid == 0 {
        let code = run_forked_body(stage, &resolution, &mut ctx);
        ctx.close();
        std::process::exit(code);
    }

    ctx.close();
    Ok((pid, next_stdin))
}

/// Wire up this stage's output so the next stage can read from it: a fresh
/// anonymous pipe when the output is still the terminal, or a fresh
/// read-open of the file it was redirected to (the `a > f | b` reuse
/// semantic).
fn wire_stage_output(ctx: &mut RedirectionContext, stage: &Stage) -> io::Result<Option<InputSource>> {
    if matches!(ctx.output, OutputSink::Inherit) {
        let (reader, writer) = os_pipe::pipe()?;
        ctx.set_output(OutputSink::Pipe(writer));
        Ok(Some(InputSource::Pipe(reader)))
    } else if let Some((path, _)) = stage.channels.get(&Channel::Stdout) {
        Ok(Some(InputSource::File(std::fs::File::open(path)?)))
    } else {
        Ok(None)
    }
}

/// Run a non-terminal stage's handler to completion and return the exit
/// code its forked process should terminate with. Command-not-found uses 1,
/// not 127 — 127 is reserved exclusively for an explicit `exit` so the
/// reaping loop can tell a deliberate force-exit from an unrelated failure.
#[cfg(unix)]
fn run_forked_body(stage: &Stage, resolution: &Resolution, ctx: &mut RedirectionContext) -> i32 {
    match resolution {
        Resolution::Builtin => match builtins::execute(&stage.program, &stage.args, ctx) {
            BuiltinOutcome::Continue(code) => code,
            BuiltinOutcome::Exit => 127,
        },
        Resolution::NotFound => {
            let _ = ctx.write_stderr(format!("{}: command not found\n", stage.program).as_bytes());
            1
        }
        Resolution::External(path) => match launcher::launch(path, &stage.args, ctx) {
            Ok(Launched::Pipe(child)) => {
                match CommandResult::Pipe(PipeResult::new(child, false)).output(ctx) {
                    Ok(code) => code,
                    Err(_) => 1,
                }
            }
            Ok(Launched::Pty(_)) => {
                unreachable!("non-terminal stages are always redirected, never PTY")
            }
            Err(e) => {
                let _ = ctx.write_stderr(launcher::exec_error_message(&e).as_bytes());
                let _ = ctx.write_stderr(b"\n");
                1
            }
        },
    }
}

/// Run the terminal stage in this process (not forked), so builtins like
/// `cd` and `exit` take effect on the shell itself.
#[cfg(unix)]
fn run_terminal_stage(
    stage: &Stage,
    prev_stdin: Option<InputSource>,
) -> io::Result<TerminalOutcome> {
    let mut ctx = RedirectionContext::from_stage(stage)?;
    if let Some(input) = prev_stdin {
        ctx.set_input(input);
    }

    let resolution = registry::resolve(&stage.program);
    let outcome = match resolution {
        Resolution::Builtin => match builtins::execute(&stage.program, &stage.args, &mut ctx) {
            BuiltinOutcome::Continue(code) => TerminalOutcome::Continue(code),
            BuiltinOutcome::Exit => TerminalOutcome::Exit,
        },
        Resolution::NotFound => {
            let _ = ctx.write_stderr(format!("{}: command not found\n", stage.program).as_bytes());
            TerminalOutcome::Continue(127)
        }
        Resolution::External(path) => {
            let flush_on_write = matches!(ctx.output, OutputSink::Inherit);
            match launcher::launch(&path, &stage.args, &mut ctx) {
                Ok(Launched::Pipe(child)) => {
                    let code =
                        CommandResult::Pipe(PipeResult::new(child, flush_on_write)).output(&mut ctx)?;
                    TerminalOutcome::Continue(code)
                }
                Ok(Launched::Pty(child)) => {
                    let code = CommandResult::Pty(PtyResult::new(child)).output(&mut ctx)?;
                    TerminalOutcome::Continue(code)
                }
                Err(e) => {
                    let _ = ctx.write_stderr(launcher::exec_error_message(&e).as_bytes());
                    let _ = ctx.write_stderr(b"\n");
                    TerminalOutcome::Continue(1)
                }
            }
        }
    };

    ctx.close();
    Ok(outcome)
}

/// Reap every forked child. If any of them exited with the force-exit
/// sentinel (127), terminate every remaining sibling and exit the shell.
#[cfg(unix)]
fn reap_all(child_pids: &[libc::pid_t]) {
    loop {
        let mut raw_status: libc::c_int = 0;
        let waited = unsafe { libc::waitpid(-1, &mut raw_status, 0) };

        if waited < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            break;
        }
        if waited == 0 {
            continue;
        }

        let exited_127 =
            unsafe { libc::WIFEXITED(raw_status) } && unsafe { libc::WEXITSTATUS(raw_status) } == 127;
        if exited_127 {
            terminate_all_cmds(child_pids);
            std::process::exit(0);
        }
    }
}

#[cfg(unix)]
fn terminate_all_cmds(child_pids: &[libc::pid_t]) {
    for &pid in child_pids {
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
    }
}
