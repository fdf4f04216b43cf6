use clap::Parser;
use std::path::PathBuf;

/// clapで `c2p` のコマンドラインを定義します。
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Infer velocity and pressure from concentration with a physics-informed neural network (Burn)", long_about = None)]
pub struct Cli {
    /// 流れ場データセット (JSON: t_star, x_star, y_star, C_star, U_star, V_star, P_star)
    #[arg(long, default_value = "Data/Cylinder2D_flower.json")]
    pub data: PathBuf,

    /// 観測に使う時刻の数 (最初と最後の時刻を含む)
    #[arg(long = "T", default_value_t = 201)]
    pub time_count: usize,

    /// 観測に使う空間点の数
    #[arg(long = "N", default_value_t = 157859)]
    pub point_count: usize,

    /// 実行モード: train (新規学習して保存), resume (読み込んで追加学習), input (読み込んで推論のみ)
    #[arg(long, default_value = "train")]
    pub mode: String,

    /// 重みファイルのパス。resume / input では必須で、存在している必要があります
    #[arg(long = "model_path")]
    pub model_path: Option<PathBuf>,

    /// ネットワーク構成の JSON (省略時は重みファイル横の設定、なければ既定値)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 学習に使う壁時計時間 (秒)
    #[arg(long = "time-budget", default_value_t = 60.0)]
    pub time_budget: f64,

    #[arg(long = "learning-rate", default_value_t = 1e-3)]
    pub learning_rate: f64,

    /// 予測結果と誤差を書き出す JSON
    #[arg(long, default_value = "Results/C2P_result.json")]
    pub output: PathBuf,

    /// 損失グラフの出力先
    #[arg(long = "loss-plot", default_value = "loss_graph.png")]
    pub loss_plot: PathBuf,

    /// 損失グラフを描画しない
    #[arg(long = "no-plot")]
    pub no_plot: bool,

    /// 乱数シード (設定ファイルの値を上書き)
    #[arg(long)]
    pub seed: Option<u64>,
}

/// clapで `downsample` のコマンドラインを定義します。
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Decimate the time axis of a flow dataset", long_about = None)]
pub struct DownsampleCli {
    /// 元のデータセット (JSON)
    #[arg(long)]
    pub file: PathBuf,

    /// 何ステップごとに時刻を残すか (1 以上)
    #[arg(long, default_value_t = 2)]
    pub gap: usize,

    /// 出力先 (省略時は元ファイルと同じ場所の `<名前>_tsplit_<gap>.json`)
    #[arg(long)]
    pub output: Option<PathBuf>,
}
