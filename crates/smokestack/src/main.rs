use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

#[tokio::main]
async fn main() -> Result<()> {
    let parsed = cli::Cli::parse();

    match parsed.dispatch().await {
        Ok(()) => Ok(()),
        Err(err) => {
            // Configuration problems exit 2 so wrappers can tell a broken
            // invocation apart from a failed run (exit 1).
            if let Some(core_err) = err.downcast_ref::<smokestack_core::errors::SmokestackError>() {
                if core_err.is_configuration() {
                    eprintln!("Error: {}", core_err);
                    std::process::exit(2);
                }
            }
            if let Some(verdict) = err.downcast_ref::<commands::run::RunFailed>() {
                eprintln!("Error: {}", verdict);
                std::process::exit(1);
            }

            Err(err)
        }
    }
}
