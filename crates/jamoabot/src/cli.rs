use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "jamoa")]
#[command(author, version, about = "Telegram bot for managing teams, participants and their payment cards", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot (long polling)
    Run,

    /// Re-encrypt legacy plaintext card rows and exit
    MigrateCards {
        /// Only report how many rows would be rewritten
        #[arg(long)]
        dry_run: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
