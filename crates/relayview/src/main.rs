mod bindings;
mod cli;
mod paths;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Config(config_cmd)) => run::handle_config_command(&cli.run, config_cmd.action),
        None => run::run(cli.run),
    }
}
