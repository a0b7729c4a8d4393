//! Operator commands typed on stdin while the pose stream is running.
//!
//! Supported commands:
//!   r | reset     – zero the pose on the bridge and locally
//!   s | status    – show bridge pid and listening address
//!   h | help      – show this list
//!   q | quit      – close the bridge and exit

use std::io::{self, BufRead};

use colored::Colorize;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reset,
    Status,
    Help,
    Quit,
    Unknown(String),
}

/// Map one input line to a command; `None` for a blank line.
pub fn parse_command(line: &str) -> Option<Command> {
    let cmd = line.trim();
    if cmd.is_empty() {
        return None;
    }
    Some(match cmd.to_ascii_lowercase().as_str() {
        "r" | "reset" => Command::Reset,
        "s" | "status" => Command::Status,
        "h" | "help" | "?" => Command::Help,
        "q" | "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(cmd.to_string()),
    })
}

/// Read stdin on a dedicated thread and forward parsed commands.
///
/// The channel closes when stdin reaches EOF or the receiver is dropped.
pub fn spawn_stdin_reader(tx: mpsc::UnboundedSender<Command>) -> io::Result<()> {
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "stdin read failed; operator commands disabled");
                        break;
                    }
                };
                if let Some(cmd) = parse_command(&line)
                    && tx.send(cmd).is_err()
                {
                    break;
                }
            }
        })
        .map(|_| ())
}

pub fn print_help() {
    println!("  {}  zero the pose", "r, reset ".bold().cyan());
    println!("  {}  bridge pid and listening address", "s, status".bold().cyan());
    println!("  {}  this list", "h, help  ".bold().cyan());
    println!("  {}  close the bridge and exit", "q, quit  ".bold().cyan());
}
