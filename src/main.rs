mod cli;
mod jq_exec;
mod logging;

use colored::Colorize;

fn main() {
    let command_line_interface = cli::CommandLineInterface::load();
    logging::init_logging(command_line_interface.verbosity());
    if let Err(error) = command_line_interface.run() {
        eprintln!("{} {error:#}", "error:".red().bold());
        std::process::exit(1);
    }
}
