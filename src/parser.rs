use std::collections::HashMap;

use crate::lexer::{self, RedirectOp, Token};

/// Which standard stream a redirection targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Stdout,
    Stderr,
}

/// Truncate vs. append for a file redirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    Truncate,
    Append,
}

/// One command within a pipeline: its program, arguments, the redirections
/// that win (one per channel), and the paths that were overridden by a
/// later same-channel redirection but must still be created empty.
#[derive(Debug, Clone)]
pub struct Stage {
    pub program: String,
    pub args: Vec<String>,
    pub channels: HashMap<Channel, (String, RedirectMode)>,
    pub deferred_touches: Vec<String>,
    /// True when this stage participates in a pipeline, regardless of its
    /// own redirections.
    pub is_piped: bool,
}

/// The parsed form of one input line: zero or more non-terminal pipe
/// stages feeding into a single terminal stage.
#[derive(Debug)]
pub struct ParsedLine {
    pub pipe_stages: Vec<Stage>,
    pub terminal_stage: Stage,
}

const PARSE_ERROR: &str = "parse error near `\\n'";

/// Parse a raw input line into a pipeline.
///
/// Returns `Ok(None)` for empty/whitespace-only input (re-prompt with no
/// side effects). Returns `Err` with the bit-exact parse-error message on a
/// trailing operator or any other malformed stage.
pub fn parse(input: &str) -> Result<Option<ParsedLine>, String> {
    let tokens = lexer::tokenize(input);
    if tokens.is_empty() {
        return Ok(None);
    }

    let groups = split_on_pipes(&tokens)?;
    let mut stages: Vec<Stage> = groups
        .into_iter()
        .map(parse_stage)
        .collect::<Result<_, _>>()?;

    let terminal_stage = stages.pop().expect("split_on_pipes yields >= 1 group");
    let piped = !stages.is_empty();
    let mut pipe_stages = stages;
    for stage in &mut pipe_stages {
        stage.is_piped = true;
    }
    let mut terminal_stage = terminal_stage;
    terminal_stage.is_piped = piped;

    Ok(Some(ParsedLine {
        pipe_stages,
        terminal_stage,
    }))
}

/// Split a token stream on `|` into stage-sized groups. A leading, trailing,
/// or doubled `|` yields an empty group, which is a parse error.
fn split_on_pipes(tokens: &[Token]) -> Result<Vec<Vec<Token>>, String> {
    let mut groups: Vec<Vec<Token>> = vec![Vec::new()];
    for tok in tokens {
        if *tok == Token::Pipe {
            groups.push(Vec::new());
        } else {
            groups.last_mut().unwrap().push(tok.clone());
        }
    }
    if groups.iter().any(Vec::is_empty) {
        return Err(PARSE_ERROR.to_string());
    }
    Ok(groups)
}

fn parse_stage(tokens: Vec<Token>) -> Result<Stage, String> {
    let mut words = Vec::new();
    let mut channels: HashMap<Channel, (String, RedirectMode)> = HashMap::new();
    let mut deferred_touches = Vec::new();
    let mut iter = tokens.into_iter();

    while let Some(tok) = iter.next() {
        match tok {
            Token::Word(w) => words.push(w),
            Token::Redirect(op) => {
                let path = match iter.next() {
                    Some(Token::Word(p)) => p,
                    _ => return Err(PARSE_ERROR.to_string()),
                };
                let (channel, mode) = channel_and_mode(op);
                if let Some((old_path, _)) = channels.insert(channel, (path, mode)) {
                    deferred_touches.push(old_path);
                }
            }
            Token::Pipe => unreachable!("pipes are split out before stage parsing"),
        }
    }

    if words.is_empty() {
        return Err(PARSE_ERROR.to_string());
    }
    let program = words.remove(0);

    Ok(Stage {
        program,
        args: words,
        channels,
        deferred_touches,
        is_piped: false,
    })
}

fn channel_and_mode(op: RedirectOp) -> (Channel, RedirectMode) {
    match op {
        RedirectOp::StdoutTruncate => (Channel::Stdout, RedirectMode::Truncate),
        RedirectOp::StdoutAppend => (Channel::Stdout, RedirectMode::Append),
        RedirectOp::StderrTruncate => (Channel::Stderr, RedirectMode::Truncate),
        RedirectOp::StderrAppend => (Channel::Stderr, RedirectMode::Append),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_command() {
        let parsed = parse("echo hello world").unwrap().unwrap();
        assert!(parsed.pipe_stages.is_empty());
        assert_eq!(parsed.terminal_stage.program, "echo");
        assert_eq!(parsed.terminal_stage.args, vec!["hello", "world"]);
        assert!(!parsed.terminal_stage.is_piped);
    }

    #[test]
    fn empty_input_returns_none() {
        assert!(parse("").unwrap().is_none());
        assert!(parse("   ").unwrap().is_none());
    }

    #[test]
    fn pipeline_splits_into_stages() {
        let parsed = parse("echo hi | cat | cat").unwrap().unwrap();
        assert_eq!(parsed.pipe_stages.len(), 2);
        assert_eq!(parsed.pipe_stages[0].program, "echo");
        assert_eq!(parsed.pipe_stages[1].program, "cat");
        assert_eq!(parsed.terminal_stage.program, "cat");
        assert!(parsed.pipe_stages.iter().all(|s| s.is_piped));
        assert!(parsed.terminal_stage.is_piped);
    }

    #[test]
    fn trailing_pipe_is_parse_error() {
        assert_eq!(parse("echo hi |").unwrap_err(), PARSE_ERROR);
    }

    #[test]
    fn leading_pipe_is_parse_error() {
        assert_eq!(parse("| echo hi").unwrap_err(), PARSE_ERROR);
    }

    #[test]
    fn trailing_redirect_is_parse_error() {
        assert_eq!(parse("echo hi >").unwrap_err(), PARSE_ERROR);
    }

    #[test]
    fn overwritten_redirection_is_deferred() {
        let parsed = parse("echo one > a.txt > b.txt").unwrap().unwrap();
        let stage = parsed.terminal_stage;
        assert_eq!(
            stage.channels.get(&Channel::Stdout).map(|(p, _)| p.as_str()),
            Some("b.txt")
        );
        assert_eq!(stage.deferred_touches, vec!["a.txt".to_string()]);
    }

    #[test]
    fn stderr_redirection() {
        let parsed = parse("cmd 2> err.txt").unwrap().unwrap();
        let (path, mode) = parsed.terminal_stage.channels[&Channel::Stderr].clone();
        assert_eq!(path, "err.txt");
        assert_eq!(mode, RedirectMode::Truncate);
    }

    #[test]
    fn append_redirection() {
        let parsed = parse("cmd >> out.txt").unwrap().unwrap();
        let (_, mode) = &parsed.terminal_stage.channels[&Channel::Stdout];
        assert_eq!(*mode, RedirectMode::Append);
    }
}
