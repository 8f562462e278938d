//! Line-oriented control console on stdin.
//!
//! Each line is one `Command`; the coordinator's reply is printed back.
//! EOF closes the console but leaves the pipeline running.

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::actor::{Command, CoordinatorHandle};
use crate::core::Shutdown;

/// Read commands until EOF, `quit` or shutdown.
pub async fn run(handle: CoordinatorHandle, shutdown: Shutdown) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    crate::debug!("cmd"; "console ready, type `help`");

    loop {
        let line = tokio::select! {
            _ = shutdown.wait() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                crate::debug!("cmd"; "stdin closed");
                break;
            }
            Err(e) => {
                crate::warn!("cmd"; "cannot read stdin: {}", e);
                break;
            }
        };

        match parse_line(&line) {
            None => {}
            Some(Err(e)) => crate::warn!("cmd"; "{}", e),
            Some(Ok(command)) => {
                let reply = handle.command(command).await;
                println!("{reply}");
                if command == Command::Quit {
                    break;
                }
            }
        }
    }
}

/// Blank lines and `#` comments are skipped.
fn parse_line(line: &str) -> Option<Result<Command, String>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(line.parse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WasmMode;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("# note"), None);
        assert_eq!(
            parse_line("mode m\n"),
            Some(Ok(Command::SetWasmMode(WasmMode::Medium)))
        );
        assert!(matches!(parse_line("fly"), Some(Err(_))));
    }
}
