//! Command line arguments and config file loading shared by the sparkwatch
//! binaries.

use ::std::{fs::File, io::BufReader};

use ::clap::Parser;
use ::serde::de::DeserializeOwned;
use ::serde_json::from_reader;

use crate::error::{Result, SparkwatchError};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
/// Command line arguments for the sparkwatch binaries.
pub struct Args {
    /// path to the config file
    #[arg(long)]
    pub config_path: String,
}

impl Args {
    /// helper function for exporting the `clap::Parser::parse` function
    pub fn parse_args() -> Self {
        Args::parse()
    }
}

/// Parse a configuration value from the JSON config file.
pub fn read_config<T: DeserializeOwned>(path: &str) -> Result<T> {
    let file = File::open(path).map_err(SparkwatchError::fail_to_load_config)?;
    let reader = BufReader::new(file);
    from_reader(reader).map_err(SparkwatchError::fail_to_load_config)
}
