use clap::Parser;

/// Command line args for the runner-manager daemon.
#[derive(Parser, Debug, Clone)]
#[clap(version, author)]
pub struct Args {
    /// The path to load the config file from.
    #[clap(short, long, default_value = "runner.yml")]
    pub config: String,
    /// Don't actually create or delete pods; log what would happen.
    #[clap(long, default_value_t)]
    pub dry_run: bool,
}
