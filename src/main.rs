use std::process::ExitCode;

use patisserie::{application::error::AppError, config, infra::telemetry};
use tracing::{dispatcher, error, info};

mod console;

use console::Console;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report_application_error(&error);
            error.exit_code()
        }
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
    }
    match serde_json::to_string_pretty(&error.report()) {
        Ok(report) => eprintln!("{}\n{report}", error.presentation_message()),
        Err(_) => eprintln!("{}: {error}", error.presentation_message()),
    }
}

async fn run() -> Result<(), AppError> {
    let (args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;
    info!(
        backend = settings.backend.url.as_ref().map(|url| url.as_str()).unwrap_or("<unset>"),
        bucket = %settings.storage.bucket,
        "Configuration loaded"
    );

    let mut console = Console::connect(&settings, &args.credentials).await?;
    let outcome = console.dispatch(args.command).await;
    console.close().await;
    outcome
}
