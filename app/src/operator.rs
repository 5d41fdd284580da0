//! ABOUTME: Operator commands typed on stdin while the pipeline runs
//! ABOUTME: `b` adopts the latest frame as background, `q` quits

use std::fmt;
use std::str::FromStr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Replace the background estimate with the most recent frame
    SetBackground,
    Quit,
}

impl FromStr for OperatorCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "b" | "B" => Ok(Self::SetBackground),
            "q" | "Q" | "quit" => Ok(Self::Quit),
            other => Err(format!("unknown command '{}', expected b or q", other)),
        }
    }
}

impl fmt::Display for OperatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetBackground => write!(f, "set-background"),
            Self::Quit => write!(f, "quit"),
        }
    }
}

/// Forward commands parsed from `input` lines until it closes or the receiver goes away
pub async fn forward_commands<R>(input: R, tx: mpsc::Sender<OperatorCommand>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read operator input");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<OperatorCommand>() {
            Ok(command) => {
                debug!(%command, "Operator command");
                if tx.send(command).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!("{}", e),
        }
    }
}

/// Read operator commands from the process stdin on a background task
pub fn spawn_stdin_reader(tx: mpsc::Sender<OperatorCommand>) -> JoinHandle<()> {
    tokio::spawn(forward_commands(BufReader::new(tokio::io::stdin()), tx))
}
