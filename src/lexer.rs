/// One lexical unit produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A plain word: a command name, argument, or filename.
    Word(String),
    /// One of the six fixed redirection operators.
    Redirect(RedirectOp),
    /// The pipe separator `|`.
    Pipe,
}

/// The fixed redirection operator table (§3 of the design doc this was built from).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOp {
    /// `>` or `1>`
    StdoutTruncate,
    /// `>>` or `1>>`
    StdoutAppend,
    /// `2>`
    StderrTruncate,
    /// `2>>`
    StderrAppend,
}

/// States for the tokenizer state machine.
enum State {
    /// Between tokens — whitespace is skipped
    Normal,
    /// Building an unquoted word — whitespace ends it
    InWord,
    /// Inside double quotes — whitespace is preserved
    InDoubleQuote,
    /// Inside single quotes — everything is literal
    InSingleQuote,
}

/// Tokenize a shell input line into words and operators.
///
/// Handles:
/// - Unquoted words split by whitespace
/// - Double-quoted strings ("hello world" → one token)
/// - Single-quoted strings ('hello world' → one token)
/// - Backslash escapes (hello\ world → one token)
/// - `>`, `>>`, `1>`, `1>>`, `2>`, `2>>` and `|` recognized even without
///   surrounding whitespace (e.g. `cmd>file` is three tokens)
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut current = String::new();
    let mut state = State::Normal;
    // Some(d) when `current` consists of exactly the single unquoted,
    // unescaped digit `d` ('1' or '2') and nothing else has touched it yet —
    // the only shape that's allowed to bind to a following '>' as an
    // fd-prefixed operator.
    let mut bare_digit: Option<char> = None;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        match (&state, ch) {
            (State::Normal, ' ' | '\t') => {}
            (State::Normal, '"') => {
                bare_digit = None;
                state = State::InDoubleQuote;
            }
            (State::Normal, '\'') => {
                bare_digit = None;
                state = State::InSingleQuote;
            }
            (State::Normal | State::InWord, '|') => {
                flush_word(&mut current, &mut tokens);
                tokens.push(Token::Pipe);
                bare_digit = None;
                state = State::Normal;
            }
            (State::Normal | State::InWord, '>') => {
                let fd = take_fd_prefix(&mut current, &mut bare_digit);
                flush_word(&mut current, &mut tokens);
                let append = matches!(chars.peek(), Some('>')).then(|| chars.next());
                tokens.push(Token::Redirect(redirect_op(fd, append.is_some())));
                state = State::Normal;
            }
            (State::Normal, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                bare_digit = None;
                state = State::InWord;
            }
            (State::Normal, c) => {
                bare_digit = if c == '1' || c == '2' { Some(c) } else { None };
                current.push(c);
                state = State::InWord;
            }

            (State::InWord, ' ' | '\t') => {
                flush_word(&mut current, &mut tokens);
                bare_digit = None;
                state = State::Normal;
            }
            (State::InWord, '"') => {
                bare_digit = None;
                state = State::InDoubleQuote;
            }
            (State::InWord, '\'') => {
                bare_digit = None;
                state = State::InSingleQuote;
            }
            (State::InWord, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                bare_digit = None;
            }
            (State::InWord, c) => {
                current.push(c);
                bare_digit = None;
            }

            (State::InDoubleQuote, '"') => {
                state = State::InWord;
            }
            (State::InDoubleQuote, '\\') => {
                match chars.peek() {
                    Some('"' | '\\') => {
                        current.push(chars.next().unwrap());
                    }
                    _ => current.push('\\'),
                }
            }
            (State::InDoubleQuote, c) => {
                current.push(c);
            }

            (State::InSingleQuote, '\'') => {
                state = State::InWord;
            }
            (State::InSingleQuote, c) => {
                current.push(c);
            }
        }
    }

    // An unterminated quote is closed leniently at end of input.
    flush_word(&mut current, &mut tokens);

    tokens
}

fn flush_word(current: &mut String, tokens: &mut Vec<Token>) {
    if !current.is_empty() {
        tokens.push(Token::Word(std::mem::take(current)));
    }
}

/// If `current` is a bare `1`/`2` eligible to bind to a following `>`,
/// consume it (clearing `current`) and return the fd it names; otherwise
/// return the default fd (1, stdout) and leave `current` untouched.
fn take_fd_prefix(current: &mut String, bare_digit: &mut Option<char>) -> i32 {
    if let Some(d) = *bare_digit {
        if current.as_str() == d.to_string() {
            current.clear();
            *bare_digit = None;
            return if d == '2' { 2 } else { 1 };
        }
    }
    1
}

fn redirect_op(fd: i32, append: bool) -> RedirectOp {
    match (fd, append) {
        (2, false) => RedirectOp::StderrTruncate,
        (2, true) => RedirectOp::StderrAppend,
        (_, false) => RedirectOp::StdoutTruncate,
        (_, true) => RedirectOp::StdoutAppend,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(tokens: &[Token]) -> Vec<&str> {
        tokens
            .iter()
            .filter_map(|t| match t {
                Token::Word(w) => Some(w.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn simple_command() {
        let tokens = tokenize("echo hello world");
        assert_eq!(words(&tokens), vec!["echo", "hello", "world"]);
    }

    #[test]
    fn double_quotes_preserve_spaces() {
        let tokens = tokenize(r#"echo "hello   world""#);
        assert_eq!(words(&tokens), vec!["echo", "hello   world"]);
    }

    #[test]
    fn single_quotes_preserve_spaces() {
        let tokens = tokenize("echo 'hello   world'");
        assert_eq!(words(&tokens), vec!["echo", "hello   world"]);
    }

    #[test]
    fn backslash_escapes_space() {
        let tokens = tokenize(r"echo hello\ world");
        assert_eq!(words(&tokens), vec!["echo", "hello world"]);
    }

    #[test]
    fn mixed_quoting() {
        let tokens = tokenize(r#"echo "a"'b'c"#);
        assert_eq!(words(&tokens), vec!["echo", "abc"]);
    }

    #[test]
    fn empty_input_is_empty() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn quotes_mid_word() {
        let tokens = tokenize(r#"he"llo wor"ld"#);
        assert_eq!(words(&tokens), vec!["hello world"]);
    }

    #[test]
    fn backslash_in_double_quotes() {
        let tokens = tokenize(r#""hello\\world""#);
        assert_eq!(words(&tokens), vec![r"hello\world"]);

        let tokens = tokenize(r#""hello\"world""#);
        assert_eq!(words(&tokens), vec![r#"hello"world"#]);
    }

    #[test]
    fn single_quotes_no_escaping() {
        let tokens = tokenize(r"'hello\nworld'");
        assert_eq!(words(&tokens), vec![r"hello\nworld"]);
    }

    #[test]
    fn operator_without_whitespace() {
        let tokens = tokenize("cmd>file");
        assert_eq!(
            tokens,
            vec![
                Token::Word("cmd".into()),
                Token::Redirect(RedirectOp::StdoutTruncate),
                Token::Word("file".into()),
            ]
        );
    }

    #[test]
    fn fd_prefixed_operators() {
        assert_eq!(
            tokenize("cmd 1> out"),
            vec![
                Token::Word("cmd".into()),
                Token::Redirect(RedirectOp::StdoutTruncate),
                Token::Word("out".into()),
            ]
        );
        assert_eq!(
            tokenize("cmd 2>> err"),
            vec![
                Token::Word("cmd".into()),
                Token::Redirect(RedirectOp::StderrAppend),
                Token::Word("err".into()),
            ]
        );
    }

    #[test]
    fn digit_prefix_requires_bare_digit() {
        // "foo1>bar" — the '1' is part of the word "foo1", not an fd prefix.
        let tokens = tokenize("foo1>bar");
        assert_eq!(
            tokens,
            vec![
                Token::Word("foo1".into()),
                Token::Redirect(RedirectOp::StdoutTruncate),
                Token::Word("bar".into()),
            ]
        );
    }

    #[test]
    fn quoted_digit_never_binds() {
        let tokens = tokenize("echo '2'>out");
        assert_eq!(
            tokens,
            vec![
                Token::Word("echo".into()),
                Token::Word("2".into()),
                Token::Redirect(RedirectOp::StdoutTruncate),
                Token::Word("out".into()),
            ]
        );
    }

    #[test]
    fn pipe_without_whitespace() {
        let tokens = tokenize("a|b");
        assert_eq!(
            tokens,
            vec![Token::Word("a".into()), Token::Pipe, Token::Word("b".into())]
        );
    }

    #[test]
    fn trailing_operator_is_tokenized_bare() {
        let tokens = tokenize("echo hi >");
        assert_eq!(
            tokens,
            vec![
                Token::Word("echo".into()),
                Token::Word("hi".into()),
                Token::Redirect(RedirectOp::StdoutTruncate),
            ]
        );
    }

    #[test]
    fn unterminated_quote_closes_leniently() {
        let tokens = tokenize(r#"echo "unterminated"#);
        assert_eq!(words(&tokens), vec!["echo", "unterminated"]);
    }
}
