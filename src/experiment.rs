//! データの読み込みから学習・推論・誤差評価・結果の保存までを通して実行します。

use crate::MODEL_FILENAME;
use crate::checkpoint::CheckpointStore;
use crate::cli::{Cli, DownsampleCli};
use crate::config::{PinnConfig, TrainingConfig};
use crate::data::{FlowDataset, centered, relative_error};
use crate::error::{PinnError, Result};
use crate::inference::InferenceEngine;
use crate::training::{Trainer, TrainingReport, plot_loss_history};
use burn::backend::{Autodiff, NdArray};
use burn::config::Config;
use burn::module::AutodiffModule;
use burn::optim::AdamConfig;
use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;

type TrainBackend = Autodiff<NdArray<f32>>;
type InferBackend = NdArray<f32>;

/// 実行モード。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// 新しい重みから学習して保存
    Train,
    /// 保存済みの重みから追加学習して保存
    Resume,
    /// 保存済みの重みで推論のみ
    InferOnly,
}

impl FromStr for RunMode {
    type Err = PinnError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Self::Train),
            "resume" => Ok(Self::Resume),
            "input" | "infer" => Ok(Self::InferOnly),
            other => Err(PinnError::Configuration(format!(
                "不明な実行モードです: '{other}' (train, resume, input のいずれか)"
            ))),
        }
    }
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Resume => "resume",
            Self::InferOnly => "input",
        }
    }
}

/// 検証済みの実行計画。学習を始める前にすべての設定エラーをここで検出します。
#[derive(Debug)]
pub struct ExperimentPlan {
    pub mode: RunMode,
    pub checkpoint: PathBuf,
    pub config: PinnConfig,
}

impl ExperimentPlan {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mode = RunMode::from_str(&cli.mode)?;
        let checkpoint = match (mode, &cli.model_path) {
            (RunMode::Train, path) => CheckpointStore::resolve::<InferBackend>(
                path.as_deref().unwrap_or(Path::new(MODEL_FILENAME)),
            ),
            (_, None) => {
                return Err(PinnError::Configuration(format!(
                    "--mode {} には --model_path が必要です",
                    mode.as_str()
                )));
            }
            (_, Some(path)) => {
                let file = CheckpointStore::resolve::<InferBackend>(path);
                if !file.is_file() {
                    return Err(PinnError::ModelNotFound(file));
                }
                file
            }
        };

        let sibling = config_path(&checkpoint);
        let mut config = match &cli.config {
            Some(path) => PinnConfig::load(path)?,
            None if mode != RunMode::Train && sibling.is_file() => PinnConfig::load(&sibling)?,
            None => PinnConfig::new(),
        };
        if let Some(seed) = cli.seed {
            config.seed = seed;
        }
        config.validate()?;

        Ok(Self {
            mode,
            checkpoint,
            config,
        })
    }
}

/// 重みファイルと同じ場所に置く構成ファイル。
pub fn config_path(checkpoint: &Path) -> PathBuf {
    checkpoint.with_extension("json")
}

/// スナップショット 1 つ分の相対誤差。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SnapshotErrors {
    pub c: f64,
    pub u: f64,
    pub v: f64,
    pub p: f64,
}

/// 結果ファイルの内容。各場は N 行 × T 列です。
#[derive(Debug, Serialize)]
struct ExperimentResult<'a> {
    #[serde(rename = "C_pred")]
    c_pred: &'a [Vec<f32>],
    #[serde(rename = "U_pred")]
    u_pred: &'a [Vec<f32>],
    #[serde(rename = "V_pred")]
    v_pred: &'a [Vec<f32>],
    #[serde(rename = "P_pred")]
    p_pred: &'a [Vec<f32>],
    #[serde(rename = "Error c")]
    error_c: f64,
    #[serde(rename = "Error u")]
    error_u: f64,
    #[serde(rename = "Error v")]
    error_v: f64,
    #[serde(rename = "Error p")]
    error_p: f64,
    snapshots: &'a [SnapshotErrors],
}

/// `run` の結果。
#[derive(Debug)]
pub struct ExperimentSummary {
    pub mode: RunMode,
    pub training: Option<TrainingReport>,
    pub checkpoint: PathBuf,
    pub snapshots: Vec<SnapshotErrors>,
    pub output: PathBuf,
}

/// `c2p` の本体。
pub fn run(cli: &Cli) -> Result<ExperimentSummary> {
    let plan = ExperimentPlan::from_cli(cli)?;
    info!("Working on [{}] mode", plan.mode.as_str());

    let dataset = FlowDataset::load(&cli.data)?;
    info!(
        "データセットを読み込みました: T = {}, N = {}",
        dataset.time_steps(),
        dataset.points()
    );

    let (model, report) = match plan.mode {
        RunMode::Train | RunMode::Resume => {
            // 観測点と選点は学習するときだけ抽出する
            let mut rng = StdRng::seed_from_u64(plan.config.seed);
            let observations =
                dataset.sample_observations(cli.time_count, cli.point_count, &mut rng)?;
            let collocation =
                dataset.sample_collocation(dataset.time_steps(), dataset.points(), &mut rng)?;
            let training = TrainingConfig::new(AdamConfig::new())
                .with_time_budget_secs(cli.time_budget)
                .with_learning_rate(cli.learning_rate);

            let mut trainer = Trainer::<TrainBackend>::new(
                &plan.config,
                training.optimizer.clone(),
                &observations,
                &collocation,
                Default::default(),
            )?;
            if plan.mode == RunMode::Resume {
                trainer.load_weights(&plan.checkpoint)?;
            }
            let report = trainer.train(training.time_budget()?, training.learning_rate)?;
            trainer.save_weights(&plan.checkpoint)?;
            plan.config.save(config_path(&plan.checkpoint))?;
            info!("=> モデルを '{}' に保存しました。", plan.checkpoint.display());
            (trainer.into_model().valid(), Some(report))
        }
        RunMode::InferOnly => {
            let engine = InferenceEngine::<InferBackend>::from_checkpoint(
                &plan.config.layers,
                &plan.checkpoint,
                Default::default(),
            )?;
            (engine.model().clone(), None)
        }
    };

    if let Some(report) = &report {
        if !cli.no_plot {
            match plot_loss_history(&report.history, &cli.loss_plot) {
                Ok(()) => info!("=> 損失グラフを '{}' に保存しました。", cli.loss_plot.display()),
                Err(e) => warn!("{e}"),
            }
        }
    }

    let engine = InferenceEngine::new(model, Default::default());
    let snapshots = evaluate(&engine, &dataset, &cli.output)?;

    Ok(ExperimentSummary {
        mode: plan.mode,
        training: report,
        checkpoint: plan.checkpoint,
        snapshots,
        output: cli.output.clone(),
    })
}

/// 全スナップショットを予測して誤差を求め、結果を JSON に書き出します。
fn evaluate(
    engine: &InferenceEngine<InferBackend>,
    dataset: &FlowDataset,
    output: &Path,
) -> Result<Vec<SnapshotErrors>> {
    let (points, steps) = (dataset.points(), dataset.time_steps());
    let mut fields = [(); 4].map(|_| vec![vec![0.0f32; steps]; points]);
    let mut snapshots = Vec::with_capacity(steps);

    for k in 0..steps {
        let snapshot = dataset.snapshot(k)?;
        let prediction = engine.predict(&snapshot.t, &snapshot.x, &snapshot.y)?;

        for (field, values) in fields
            .iter_mut()
            .zip([&prediction.c, &prediction.u, &prediction.v, &prediction.p])
        {
            for (row, &value) in field.iter_mut().zip(values) {
                row[k] = value;
            }
        }

        let errors = SnapshotErrors {
            c: relative_error(&prediction.c, &snapshot.c),
            u: relative_error(&prediction.u, &snapshot.u),
            v: relative_error(&prediction.v, &snapshot.v),
            p: relative_error(&centered(&prediction.p), &centered(&snapshot.p)),
        };
        debug!(
            "Snapshot {k}: Error c: {:e}, Error u: {:e}, Error v: {:e}, Error p: {:e}",
            errors.c, errors.u, errors.v, errors.p
        );
        snapshots.push(errors);
    }

    if let Some(middle) = snapshots.get(steps / 2) {
        info!(
            "Snapshot {}: Error c: {:e}, Error u: {:e}, Error v: {:e}, Error p: {:e}",
            steps / 2,
            middle.c,
            middle.u,
            middle.v,
            middle.p
        );
    }

    let last = snapshots.last().copied().unwrap_or(SnapshotErrors {
        c: f64::NAN,
        u: f64::NAN,
        v: f64::NAN,
        p: f64::NAN,
    });
    let [c_pred, u_pred, v_pred, p_pred] = &fields;
    let result = ExperimentResult {
        c_pred,
        u_pred,
        v_pred,
        p_pred,
        error_c: last.c,
        error_u: last.u,
        error_v: last.v,
        error_p: last.p,
        snapshots: &snapshots,
    };
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    serde_json::to_writer(BufWriter::new(File::create(output)?), &result)?;
    info!("=> 結果を '{}' に保存しました。", output.display());

    Ok(snapshots)
}

/// 間引いたデータセットの既定の出力先 `<名前>_tsplit_<gap>.json`。
pub fn downsample_output(file: &Path, gap: usize) -> PathBuf {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    file.with_file_name(format!("{stem}_tsplit_{gap}.json"))
}

/// `downsample` の本体。書き出したファイルのパスを返します。
pub fn downsample(cli: &DownsampleCli) -> Result<PathBuf> {
    let dataset = FlowDataset::load(&cli.file)?;
    let decimated = dataset.decimate_time(cli.gap)?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| downsample_output(&cli.file, cli.gap));
    decimated.save(&output)?;
    info!(
        "時間方向を間引きました (gap = {}): {} -> {} ステップ, '{}'",
        cli.gap,
        dataset.time_steps(),
        decimated.time_steps(),
        output.display()
    );
    Ok(output)
}
