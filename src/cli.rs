use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "uptime-core")]
#[command(version = concat!("Ver:", env!("CARGO_PKG_VERSION")))]
#[command(about = "API-uptime monitoring core: scheduler, prober, incident and alert engines")]
pub struct Cli {
    /// Run one scheduler tick and exit instead of running forever.
    #[arg(long = "once")]
    pub once: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
