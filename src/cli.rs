use clap::ValueHint;

use std::path::PathBuf;

#[derive(clap::Parser, Debug, Clone)]
#[command(version, about)]
pub struct Args {
    /// Path to the config file.
    ///
    /// By default, alertfeed looks for a file named `alertfeed.toml` in the following directories
    /// (in order):
    ///
    /// - `./` (the current directory)
    /// - `/etc`
    ///
    /// If none is found, the built-in sources are used.
    #[arg(
        short,
        long = "config",
        env = "ALERTFEED_CONFIG",
        value_hint(ValueHint::FilePath)
    )]
    pub config_path: Option<PathBuf>,

    /// Directory holding the generated feeds.
    #[arg(long, env = "ALERTFEED_OUTPUT_DIR", value_hint(ValueHint::DirPath))]
    pub output_dir: Option<PathBuf>,

    /// Maximum number of listing pages to read per source.
    #[arg(long, env = "ALERTFEED_MAX_PAGES")]
    pub max_pages: Option<u32>,

    /// Write the feeds but do not commit and push them.
    #[arg(long, env = "ALERTFEED_NO_PUBLISH")]
    pub no_publish: bool,

    /// Only process the named source (may be repeated).
    #[arg(long = "source", value_name = "NAME")]
    pub sources: Vec<String>,
}

impl Args {
    pub fn parse() -> Self {
        clap::Parser::parse()
    }
}
