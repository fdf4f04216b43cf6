use burn::config::ConfigError;
use burn::record::RecorderError;
use std::path::PathBuf;
use thiserror::Error;

/// c2p 全体で使うエラー型。
#[derive(Debug, Error)]
pub enum PinnError {
    /// 実行モードや層構成など、設定値が不正な場合。
    #[error("設定エラー: {0}")]
    Configuration(String),

    /// 重みファイルが存在しない場合。新しい重みで黙って続行はしません。
    #[error("モデルファイル '{}' が見つかりません", .0.display())]
    ModelNotFound(PathBuf),

    /// 並列な入力列の長さ、またはテンソル形状が一致しない場合。
    #[error("入力形状が一致しません: {0}")]
    ShapeMismatch(String),

    /// 損失が NaN / Inf になった場合。
    #[error("学習が発散しました (It: {iteration}, Loss: {loss})")]
    DivergedTraining { iteration: usize, loss: f64 },

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("テンソルデータの変換に失敗しました: {0}")]
    TensorData(String),

    #[error("グラフの描画に失敗しました: {0}")]
    Plot(String),
}

pub type Result<T> = std::result::Result<T, PinnError>;
