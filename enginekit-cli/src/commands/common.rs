//! Helpers shared across CLI commands.

use std::sync::Arc;

use console::style;
use enginekit::{EngineManager, OperationResult};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::CliError;

/// Token cancelled on the first Ctrl-C.
///
/// The handler can only be installed once per process.
pub fn interrupt_token() -> Result<CancellationToken, CliError> {
    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;
    Ok(token)
}

/// Run an install that `interrupt` can cancel.
pub async fn install_interruptible(
    manager: &Arc<EngineManager>,
    interrupt: &CancellationToken,
) -> OperationResult {
    let watcher = {
        let manager = Arc::clone(manager);
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            interrupt.cancelled().await;
            manager.cancel_install();
        })
    };

    let result = manager.install().await;
    watcher.abort();
    result
}

/// Print one `{"type": "result", ...}` line on stdout.
pub fn print_result_line<T: Serialize>(command: &str, result: &T) {
    let line = serde_json::json!({
        "type": "result",
        "command": command,
        "result": result,
    });
    println!("{}", line);
}

/// Print a one-line outcome with a check or cross.
pub fn print_outcome(success: bool, message: &str) {
    if success {
        println!("{} {}", style("✓").green().bold(), message);
    } else {
        println!("{} {}", style("✗").red().bold(), message);
    }
}

/// Map a façade result onto the CLI error type.
pub fn check(result: &OperationResult, kind: fn(String) -> CliError) -> Result<(), CliError> {
    if result.success {
        Ok(())
    } else if result.cancelled {
        Err(CliError::Cancelled)
    } else {
        let detail = match &result.error {
            Some(error) => format!("{}: {}", result.message, error),
            None => result.message.clone(),
        };
        Err(kind(detail))
    }
}
