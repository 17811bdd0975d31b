use crate::redirect::RedirectionContext;
use crate::registry;

/// The list of all builtin command names.
const BUILTINS: &[&str] = &["cd", "pwd", "exit", "echo", "type"];

/// Returns true if the command name is a shell builtin.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// What running a builtin asked the shell to do next.
pub enum BuiltinOutcome {
    /// The builtin ran to completion; the pipeline continues with this
    /// exit code.
    Continue(i32),
    /// The `exit` builtin was invoked. The caller decides what this means:
    /// a real shell-wide exit(0) if run in the parent, or the force-exit
    /// sentinel (127) if run inside a forked pipeline stage.
    Exit,
}

/// Execute a builtin command, writing output through the stage's
/// redirection context.
pub fn execute(program: &str, args: &[String], ctx: &mut RedirectionContext) -> BuiltinOutcome {
    match program {
        "cd" => BuiltinOutcome::Continue(builtin_cd(args, ctx)),
        "pwd" => BuiltinOutcome::Continue(builtin_pwd(ctx)),
        "exit" => BuiltinOutcome::Exit,
        "echo" => BuiltinOutcome::Continue(builtin_echo(args, ctx)),
        "type" => BuiltinOutcome::Continue(builtin_type(args, ctx)),
        _ => {
            let _ = ctx.write_stderr(format!("corsh: unknown builtin: {program}\n").as_bytes());
            BuiltinOutcome::Continue(1)
        }
    }
}

/// `cd` with zero args goes to `$HOME`; with one, expands a leading `~` and
/// resolves to an absolute path; with more than one, errors. The error
/// message always names the raw, pre-expansion input — never the resolved
/// path.
fn builtin_cd(args: &[String], ctx: &mut RedirectionContext) -> i32 {
    if args.len() > 1 {
        let _ = ctx.write_stderr(b"cd: too many arguments\n");
        return 1;
    }

    let raw_input = args.first().map(String::as_str).unwrap_or("~");
    let expanded = expand_tilde(raw_input);

    if std::env::set_current_dir(&expanded).is_err() {
        let _ = ctx.write_stderr(format!("cd: {raw_input}: No such file or directory\n").as_bytes());
        return 1;
    }

    0
}

fn expand_tilde(input: &str) -> String {
    if input == "~" {
        return std::env::var("HOME").unwrap_or_else(|_| "/".to_string());
    }
    if let Some(rest) = input.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/".to_string());
        return format!("{home}/{rest}");
    }
    input.to_string()
}

fn builtin_pwd(ctx: &mut RedirectionContext) -> i32 {
    match std::env::current_dir() {
        Ok(path) => {
            let _ = ctx.write_stdout(format!("{}\n", path.display()).as_bytes());
            0
        }
        Err(e) => {
            let _ = ctx.write_stderr(format!("pwd: {e}\n").as_bytes());
            1
        }
    }
}

fn builtin_echo(args: &[String], ctx: &mut RedirectionContext) -> i32 {
    let _ = ctx.write_stdout(format!("{}\n", args.join(" ")).as_bytes());
    0
}

/// Every line — builtin, path-resolved, or not-found — goes to stdout.
/// `type` never writes to stderr.
fn builtin_type(args: &[String], ctx: &mut RedirectionContext) -> i32 {
    let mut exit_code = 0;
    for arg in args {
        if is_builtin(arg) {
            let _ = ctx.write_stdout(format!("{arg} is a shell builtin\n").as_bytes());
        } else {
            match registry::find_in_path(arg) {
                Some(path) => {
                    let _ = ctx.write_stdout(format!("{arg} is {}\n", path.display()).as_bytes());
                }
                None => {
                    let _ = ctx.write_stdout(format!("{arg} not found\n").as_bytes());
                    exit_code = 1;
                }
            }
        }
    }
    exit_code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn ctx_for(line: &str) -> RedirectionContext {
        let parsed = parse(line).unwrap().unwrap();
        RedirectionContext::from_stage(&parsed.terminal_stage).unwrap()
    }

    #[test]
    fn echo_joins_with_single_spaces() {
        let mut ctx = ctx_for("echo hello world");
        let path = std::env::temp_dir().join(format!("corsh_echo_{}.txt", std::process::id()));
        ctx.set_output(crate::redirect::OutputSink::File(
            std::fs::File::create(&path).unwrap(),
        ));
        let outcome = execute("echo", &["hello".into(), "world".into()], &mut ctx);
        assert!(matches!(outcome, BuiltinOutcome::Continue(0)));
        ctx.close();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "hello world\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn cd_too_many_arguments() {
        let mut ctx = ctx_for("cd a b");
        let path = std::env::temp_dir().join(format!("corsh_cd_err_{}.txt", std::process::id()));
        ctx.set_error(crate::redirect::OutputSink::File(
            std::fs::File::create(&path).unwrap(),
        ));
        let outcome = execute("cd", &["a".into(), "b".into()], &mut ctx);
        assert!(matches!(outcome, BuiltinOutcome::Continue(1)));
        ctx.close();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "cd: too many arguments\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn cd_missing_directory_reports_raw_input() {
        let mut ctx = ctx_for("cd nope");
        let path = std::env::temp_dir().join(format!("corsh_cd_missing_{}.txt", std::process::id()));
        ctx.set_error(crate::redirect::OutputSink::File(
            std::fs::File::create(&path).unwrap(),
        ));
        let outcome = execute(
            "cd",
            &["/definitely/does/not/exist".into()],
            &mut ctx,
        );
        assert!(matches!(outcome, BuiltinOutcome::Continue(1)));
        ctx.close();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "cd: /definitely/does/not/exist: No such file or directory\n"
        );
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn type_not_found_goes_to_stdout() {
        let mut ctx = ctx_for("type notacommand");
        let path = std::env::temp_dir().join(format!("corsh_type_{}.txt", std::process::id()));
        ctx.set_output(crate::redirect::OutputSink::File(
            std::fs::File::create(&path).unwrap(),
        ));
        let outcome = execute("type", &["notacommand".into()], &mut ctx);
        assert!(matches!(outcome, BuiltinOutcome::Continue(1)));
        ctx.close();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "notacommand not found\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn type_builtin_reports_shell_builtin() {
        let mut ctx = ctx_for("type echo");
        let path = std::env::temp_dir().join(format!("corsh_type_builtin_{}.txt", std::process::id()));
        ctx.set_output(crate::redirect::OutputSink::File(
            std::fs::File::create(&path).unwrap(),
        ));
        execute("type", &["echo".into()], &mut ctx);
        ctx.close();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "echo is a shell builtin\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn exit_returns_exit_outcome() {
        let mut ctx = ctx_for("exit");
        assert!(matches!(execute("exit", &[], &mut ctx), BuiltinOutcome::Exit));
    }
}
