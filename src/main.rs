mod builtins;
mod launcher;
mod lexer;
mod orchestrator;
mod parser;
mod prompt;
mod redirect;
mod registry;
mod result;
mod status;

use std::io;

fn main() {
    ctrlc::set_handler(|| {
        println!();
        let _ = io::Write::flush(&mut io::stdout());
    })
    .expect("Failed to set Ctrl-C handler");

    let prompt = prompt::Prompt::new();

    loop {
        let Some(line) = prompt.ask() else {
            break;
        };

        match parser::parse(&line) {
            Ok(None) => continue,
            Ok(Some(parsed)) => {
                orchestrator::run_pipeline(parsed);
            }
            Err(message) => println!("{message}"),
        }
    }
}
