//! データセットの時間軸を `--gap` ごとに間引いて保存します。
//!
//! ```bash
//! cargo run --release --bin downsample -- --file Data/Cylinder2D.json --gap 2
//! ```

use c2p::cli::DownsampleCli;
use c2p::experiment;
use clap::Parser;
use env_logger::Env;
use log::error;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = DownsampleCli::parse();

    if let Err(e) = experiment::downsample(&cli) {
        error!("{e}");
        std::process::exit(1);
    }
}
