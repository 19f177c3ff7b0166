use clap::Parser;

use chainstate::cli::Cli;
use chainstate::logging;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match &cli.log {
        Some(directives) => logging::init_with_directives(directives),
        None => logging::init(),
    }

    cli.execute()?;
    Ok(())
}
