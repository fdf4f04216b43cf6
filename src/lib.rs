//! # 濃度から速度・圧力を推定する物理情報ニューラルネットワーク (PINN) ライブラリ
//!
//! `burn` フレームワークを使用して、散在する濃度の観測値と 2 次元非圧縮
//! Navier–Stokes 方程式・移流拡散方程式の残差を同時に学習し、
//! 観測されていない速度場と圧力場を推定するためのコンポーネントを提供します。
//!
//! データ側と方程式側の評価は 1 つのネットワーク [`model::FlowNet`] を共有し、
//! 方程式側は入力に関する微分 ([`jet`]) と一緒に評価されます。

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod experiment;
pub mod inference;
pub mod jet;
pub mod model;
pub mod pinn;
pub mod schedule;
pub mod training;

pub use error::{PinnError, Result};

/// モデルを保存するファイル名
pub const MODEL_FILENAME: &str = "pinn_model.mpk";
