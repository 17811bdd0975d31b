use std::io::{self, Write};

/// Reads one line of input per prompt. Deliberately minimal — no history,
/// no tab-completion, no key bindings. A richer implementation can replace
/// this without the rest of the shell noticing; it only ever calls `ask()`.
pub struct Prompt {
    stdin: io::Stdin,
}

impl Prompt {
    pub fn new() -> Self {
        Prompt { stdin: io::stdin() }
    }

    /// Show the prompt and read one line. Returns `None` on EOF.
    pub fn ask(&self) -> Option<String> {
        print!("$ ");
        if io::stdout().flush().is_err() {
            return None;
        }

        let mut input = String::new();
        match self.stdin.read_line(&mut input) {
            Ok(0) => None,
            Ok(_) => Some(input.trim_end_matches('\n').to_string()),
            Err(_) => None,
        }
    }
}

impl Default for Prompt {
    fn default() -> Self {
        Self::new()
    }
}
