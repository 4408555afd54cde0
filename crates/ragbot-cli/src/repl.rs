//! Line-oriented console interaction.

use std::io::{self, BufRead, BufReader, Write};
use std::time::Instant;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ragbot_rag::{Assistant, RagError};
use ragbot_types::ContextStatus;

/// What the user typed at a prompt.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Line(String),
    Blank,
    Exit,
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            Input::Blank
        } else if line.eq_ignore_ascii_case("exit") {
            Input::Exit
        } else {
            Input::Line(line.to_string())
        }
    }
}

/// Reads prompts from stdin until EOF, `exit` or cancellation.
///
/// Lines are read on a dedicated thread, so a read still blocked in the
/// terminal never holds up runtime shutdown.
pub struct Console {
    lines: mpsc::Receiver<io::Result<String>>,
    cancel: CancellationToken,
}

impl Console {
    pub fn new(cancel: CancellationToken) -> Self {
        Self::from_reader(BufReader::new(io::stdin()), cancel)
    }

    pub fn from_reader<R>(mut reader: R, cancel: CancellationToken) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        std::thread::spawn(move || {
            loop {
                let mut line = String::new();
                let next = match reader.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => Ok(line),
                    Err(e) => Err(e),
                };
                let failed = next.is_err();
                if tx.blocking_send(next).is_err() || failed {
                    break;
                }
            }
        });
        Self { lines: rx, cancel }
    }

    /// Next non-blank line, or `None` when the session should end.
    pub async fn read(&mut self, prompt: &str) -> Result<Option<String>> {
        loop {
            print!("{prompt}");
            io::stdout().flush()?;

            let line = tokio::select! {
                _ = self.cancel.cancelled() => None,
                line = self.lines.recv() => line.transpose()?,
            };
            let Some(line) = line else {
                // EOF (Ctrl+D) or Ctrl+C
                println!();
                return Ok(None);
            };

            match Input::parse(&line) {
                Input::Line(text) => return Ok(Some(text)),
                Input::Blank => continue,
                Input::Exit => return Ok(None),
            }
        }
    }
}

/// Ask `assistant` and print its reply.
///
/// Returns `false` when the session was cancelled and should end.
pub async fn ask(assistant: &mut Assistant, label: &str, question: &str, timed: bool) -> bool {
    let started = Instant::now();
    match assistant.chat(question).await {
        Ok(answer) => {
            println!("\n{label}: {}", answer.text);
            if let Some(hint) = context_hint(answer.context) {
                println!("  ({hint})");
            } else if !answer.sources.is_empty() {
                println!("  [sources: {}]", answer.sources.join(", "));
            }
            if timed {
                println!("  [response time: {:.2}s]", started.elapsed().as_secs_f64());
            }
            true
        }
        Err(e) if e.is_cancelled() => {
            eprintln!("\n[cancelled]");
            false
        }
        Err(RagError::EmptyQuestion) => true,
        Err(e) => {
            eprintln!("\n[error: {e}]");
            true
        }
    }
}

fn context_hint(status: ContextStatus) -> Option<&'static str> {
    match status {
        ContextStatus::Found | ContextStatus::Disabled => None,
        ContextStatus::Empty => Some("no relevant context found in the documents"),
        ContextStatus::AllSourcesFailed => Some("every source failed; answered without context"),
    }
}
