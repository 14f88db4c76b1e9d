//! Console implementation of the manual-fallback channel.
//!
//! On a terminal, wraps `rustyline_async::Readline` for async line reading
//! with proper handling of EOF (Ctrl+D) and interrupt (Ctrl+C). When stdin
//! is piped, reads plain lines and writes prompts to stderr so stdout stays
//! reserved for the result.
//!
//! The terminal is only put into raw mode when manual input is actually
//! needed, so runs that never fall back leave it untouched.

use std::io::{IsTerminal, Write};

use rustyline_async::{Readline, ReadlineEvent, SharedWriter};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use plotline_core::generation::manual::{InputEvent, ManualChannel};

const PROMPT: &str = "manual> ";

enum Console {
    Terminal { rl: Readline, writer: SharedWriter },
    Piped { lines: Lines<BufReader<Stdin>> },
}

impl Console {
    fn open() -> Self {
        if std::io::stdin().is_terminal() {
            match Readline::new(PROMPT.to_string()) {
                Ok((rl, writer)) => return Console::Terminal { rl, writer },
                Err(e) => tracing::warn!("Readline unavailable, reading plain lines: {e}"),
            }
        }
        Console::Piped {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

/// Manual channel over the process's stdin and terminal.
#[derive(Default)]
pub struct ConsoleChannel {
    console: Option<Console>,
}

impl ConsoleChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn console(&mut self) -> &mut Console {
        self.console.get_or_insert_with(Console::open)
    }
}

impl ManualChannel for ConsoleChannel {
    async fn present(&mut self, text: &str) {
        match self.console() {
            Console::Terminal { writer, .. } => {
                let _ = writeln!(writer, "{text}");
            }
            Console::Piped { .. } => eprintln!("{text}"),
        }
    }

    async fn read_line(&mut self) -> InputEvent {
        match self.console() {
            Console::Terminal { rl, .. } => match rl.readline().await {
                Ok(ReadlineEvent::Line(line)) => InputEvent::Line(line),
                Ok(ReadlineEvent::Eof) => InputEvent::Eof,
                Ok(ReadlineEvent::Interrupted) => InputEvent::Interrupted,
                Err(_) => InputEvent::Eof,
            },
            Console::Piped { lines } => match lines.next_line().await {
                Ok(Some(line)) => InputEvent::Line(line),
                Ok(None) | Err(_) => InputEvent::Eof,
            },
        }
    }
}
