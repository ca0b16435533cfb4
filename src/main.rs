use clap::Parser;
use file_sorter::cli::{Cli, run};
use file_sorter::config::Settings;
use file_sorter::logging;
use file_sorter::output::OutputFormatter;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            OutputFormatter::error(&format!("Error loading configuration: {}", e));
            return ExitCode::FAILURE;
        }
    };

    let log_dir = settings.log_dir();
    let _guard = match logging::init(cli.verbose, Some(&log_dir)) {
        Ok(guard) => guard,
        Err(e) => {
            OutputFormatter::warning(&format!("File logging disabled: {}", e));
            logging::init(cli.verbose, None).ok().flatten()
        }
    };

    if let Err(e) = run(cli.command, &settings) {
        OutputFormatter::error(&format!("{:#}", e));
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
