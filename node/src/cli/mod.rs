use clap::Parser;

mod block;
mod crypto;
pub mod init;
mod reindex;

#[derive(Parser, Debug, Clone)]
#[command()]
pub struct Cli {
    /// Log filter directives, overriding RUST_LOG.
    #[clap(long, global = true)]
    pub log: Option<String>,
    #[command(subcommand)]
    pub subcommand: Subcommand,
}

#[derive(Clone, Debug, clap::Subcommand)]
pub enum Subcommand {
    Init(init::InitCmd),
    GenerateKeypair(crypto::GenerateKeypairCmd),
    Reindex(reindex::ReindexCmd),
    ShowBlock(block::ShowBlockCmd),
}

impl Cli {
    pub fn execute(self) -> anyhow::Result<()> {
        match self.subcommand {
            Subcommand::Init(init) => init.execute(),
            Subcommand::GenerateKeypair(cmd) => cmd.execute(),
            Subcommand::Reindex(cmd) => cmd.execute(),
            Subcommand::ShowBlock(cmd) => cmd.execute(),
        }
    }
}
