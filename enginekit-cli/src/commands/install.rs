//! Install and uninstall commands.

use std::sync::Arc;

use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;

use super::common::{check, install_interruptible, interrupt_token, print_outcome, print_result_line};
use crate::error::CliError;
use crate::progress::ConsoleChannel;
use crate::runner::CliRunner;

/// Run the install command.
pub async fn run(runner: &CliRunner, worker: bool) -> Result<(), CliError> {
    runner.log_startup("install");
    let interrupt = interrupt_token()?;

    if worker {
        let manager = Arc::new(runner.worker_manager()?);
        let result = install_interruptible(&manager, &interrupt).await;
        print_result_line("install", &result);
        return check(&result, CliError::Install);
    }

    let config = runner.config();
    println!("enginekit v{}", enginekit::VERSION);
    println!("Installing into {}", config.paths.data_dir.display());
    println!("Press Ctrl+C to cancel");
    println!();

    let channel = Arc::new(ConsoleChannel::new());
    let manager = Arc::new(runner.manager(channel.clone())?);
    let result = install_interruptible(&manager, &interrupt).await;
    channel.finish();

    print_outcome(result.success, &result.message);
    check(&result, CliError::Install)
}

/// Run the uninstall command.
pub async fn uninstall(runner: &CliRunner, force: bool) -> Result<(), CliError> {
    runner.log_startup("uninstall");
    let install_dir = runner.config().installer_config().install_dir();

    if !force {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Remove {} and cached downloads?",
                style(install_dir.display()).bold()
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let manager = runner.manager(Arc::new(ConsoleChannel::hidden()))?;
    let result = manager.uninstall().await;
    print_outcome(result.success, &result.message);
    check(&result, CliError::Install)
}
