//! # c2p: 濃度の観測から速度場と圧力場を推定する PINN
//!
//! `clap` クレートを利用して、学習・追加学習・推論を `--mode` で切り替えます。
//!
//! ## 使い方
//!
//! ### 学習
//! ```bash
//! cargo run --release -- --data Data/Cylinder2D_flower.json --T 201 --N 5000 --mode train
//! ```
//!
//! ### 保存済みの重みで推論
//! ```bash
//! cargo run --release -- --mode input --model_path pinn_model.mpk
//! ```

use c2p::cli::Cli;
use c2p::experiment;
use clap::Parser;
use env_logger::Env;
use log::error;

/// プログラムのエントリーポイント。
fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(e) = experiment::run(&cli) {
        error!("{e}");
        std::process::exit(1);
    }
}
