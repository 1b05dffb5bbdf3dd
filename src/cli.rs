use clap::Parser;

/// Distributed web-mirroring worker.
///
/// All operational configuration comes from the environment (see README);
/// the command line only carries process-level switches.
#[derive(Parser)]
#[command(name = "mirror-worker")]
#[command(about = "Consumes URL jobs from AMQP and mirrors pages to disk")]
#[command(version)]
pub struct Cli {
    /// Log level filter, overriding RUST_LOG (e.g. "debug" or
    /// "mirror_worker=trace,lapin=warn")
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
