use clap::{Args, Parser, Subcommand};
use scopechain_rs::ChainConfig;

#[derive(Parser)]
#[command(
    name = "scopechain",
    version,
    about = "Live multi-device acquisition chain with rolling per-channel history",
    long_about = "Read line-protocol sample streams from several devices at once, route every \n\
                  line to its global channel and keep a fixed-depth history per channel.\n\
                  Device addresses are started through a command template such as\n\
                  \"ssh root@{address} measurements/stream.x\" ($SCOPECHAIN_COMMAND)."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Connect sources and fill the ring buffer bank
    Watch(WatchArgs),
    /// Validate protocol lines from a capture file or stdin
    Decode(DecodeArgs),
    /// Show the effective chain configuration
    Config(ConfigArgs),
}

/// Line layout options shared by every command that decodes lines
#[derive(Args, Clone)]
pub struct LayoutArgs {
    /// Samples per line
    #[arg(long)]
    pub width: Option<usize>,

    /// Physical inputs per source
    #[arg(long)]
    pub selectors: Option<usize>,

    /// Lines start with a sequence number
    #[arg(long, default_value_t = false)]
    pub sequence: bool,

    /// Lines carry a sample-rate token before the selector
    #[arg(long, default_value_t = false)]
    pub rate_token: bool,
}

impl LayoutArgs {
    pub fn apply(&self, config: &mut ChainConfig) {
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(selectors) = self.selectors {
            config.selectors_per_source = selectors;
        }
        if self.sequence {
            config.layout.sequence = true;
        }
        if self.rate_token {
            config.layout.sample_rate = true;
        }
    }
}

#[derive(Args)]
pub struct WatchArgs {
    /// Sources in registration order: device address, tcp://HOST:PORT or file:PATH
    #[arg(required = true, num_args = 1..)]
    pub sources: Vec<String>,

    /// Command template for device addresses, must contain {address}
    #[arg(long, env = "SCOPECHAIN_COMMAND")]
    pub command: Option<String>,

    /// JSON configuration file
    #[arg(long)]
    pub config: Option<String>,

    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Ring depth per channel
    #[arg(long)]
    pub depth: Option<usize>,

    /// Value of never-written slots (zero or nan)
    #[arg(long)]
    pub fill: Option<String>,

    /// Subtract the mean of every vector before storing it
    #[arg(long, default_value_t = false)]
    pub mean_removal: bool,

    /// Store the log-magnitude spectrum of every vector
    #[arg(long, default_value_t = false, requires = "sample_rate")]
    pub spectrum: bool,

    /// Sample rate in Hz used for the spectrum frequency axis
    #[arg(long)]
    pub sample_rate: Option<f64>,

    /// First spectrum bin kept
    #[arg(long, default_value_t = 2)]
    pub low_bin: usize,

    /// Highest spectrum frequency kept, in Hz
    #[arg(long, default_value_t = 100_000.0)]
    pub max_frequency: f64,

    /// Stop after this many milliseconds (default: until every source ends)
    #[arg(long)]
    pub duration_ms: Option<u64>,

    /// Read cycle period in milliseconds
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Print the summary as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Output file for the summary (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct DecodeArgs {
    /// Capture file (default: stdin)
    pub file: Option<String>,

    /// JSON configuration file
    #[arg(long)]
    pub config: Option<String>,

    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Include sample values in JSON output
    #[arg(long, default_value_t = false)]
    pub samples: bool,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// JSON configuration file
    #[arg(long)]
    pub config: Option<String>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
