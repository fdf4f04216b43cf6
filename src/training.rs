use crate::checkpoint::CheckpointStore;
use crate::config::{FlowConstants, PinnConfig};
use crate::context::ComputeContext;
use crate::data::{CollocationSet, ObservationSet};
use crate::error::{PinnError, Result};
use crate::inference::{self, Prediction};
use crate::model::FlowNet;
use crate::pinn::{PinnLoss, navier_stokes_2d, pinn_loss};
use crate::schedule::LearningRateSchedule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::module::AutodiffModule;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Int, Tensor, TensorData};
use log::info;
use plotters::prelude::*;
use rand::Rng;
use rand::seq::index;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// 何イテレーションごとに経過時間を測り、損失を記録するか
pub const LOG_INTERVAL: usize = 10;

/// `Trainer` の状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    Idle,
    Running,
    /// 時間切れで終了、または発散で中断
    Finished,
}

/// ログを出したチェックポイントでの損失。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossRecord {
    pub iteration: usize,
    pub running_time: Duration,
    pub total: f64,
    pub physics: f64,
    pub learning_rate: f64,
}

/// `train` の結果。
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub iterations: usize,
    pub running_time: Duration,
    pub final_loss: f64,
    pub history: Vec<LossRecord>,
}

/// 1 イテレーション分のミニバッチ。
struct Batch<B: Backend> {
    t_data: Tensor<B, 2>,
    x_data: Tensor<B, 2>,
    y_data: Tensor<B, 2>,
    c_data: Tensor<B, 2>,
    t_eqns: Tensor<B, 2>,
    x_eqns: Tensor<B, 2>,
    y_eqns: Tensor<B, 2>,
}

/// 観測データへの適合と方程式の残差を同時に最小化する学習器。
///
/// ネットワークは 1 つだけで、データブランチと方程式ブランチは同じ重みを読みます。
/// 重みを書き換えるのはオプティマイザの更新だけです。
pub struct Trainer<B: AutodiffBackend> {
    context: ComputeContext<B>,
    model: FlowNet<B>,
    /// `[N_data, 4]` (t, x, y, c)
    observations: Tensor<B, 2>,
    /// `[N_eqns, 3]` (t, x, y)
    collocation: Tensor<B, 2>,
    batch_size: usize,
    constants: FlowConstants,
    optimizer: AdamConfig,
    store: CheckpointStore,
    state: TrainerState,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// 計算環境を作り、観測データの統計で入力を標準化したネットワークを初期化します。
    pub fn new(
        config: &PinnConfig,
        optimizer: AdamConfig,
        observations: &ObservationSet,
        collocation: &CollocationSet,
        device: B::Device,
    ) -> Result<Self> {
        config.validate()?;
        let context = ComputeContext::<B>::new(device, config.seed);
        let device = context.device();

        let (mean, scale) = observations.input_statistics();
        let model = FlowNet::new(&config.layers, device)?.with_input_normalization(mean, scale);
        let observations = Tensor::from_data(
            TensorData::new(observations.interleaved(), [observations.len(), 4]),
            device,
        );
        let collocation = Tensor::from_data(
            TensorData::new(collocation.interleaved(), [collocation.len(), 3]),
            device,
        );

        Ok(Self {
            model,
            observations,
            collocation,
            batch_size: config.batch_size,
            constants: config.constants()?,
            optimizer,
            store: CheckpointStore::new(),
            state: TrainerState::Idle,
            context,
        })
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    pub fn model(&self) -> &FlowNet<B> {
        &self.model
    }

    pub fn into_model(self) -> FlowNet<B> {
        self.model
    }

    pub fn device(&self) -> &B::Device {
        self.context.device()
    }

    /// データ側と方程式側のバッチサイズ。
    pub fn batch_sizes(&self) -> (usize, usize) {
        let [n_data, _] = self.observations.dims();
        (self.batch_size.min(n_data), self.batch_size)
    }

    /// 累積学習時間が `total_time` に達するまで学習します。
    ///
    /// 収束判定や反復回数の上限はありません。`LOG_INTERVAL` ごとに経過時間を
    /// 加算し、同じバッチで損失を計算し直してログに出します。損失が有限でなく
    /// なった場合は `DivergedTraining` で中断します。
    pub fn train<S: LearningRateSchedule>(
        &mut self,
        total_time: Duration,
        schedule: S,
    ) -> Result<TrainingReport> {
        self.state = TrainerState::Running;
        let mut optim = self.optimizer.init();

        let mut history = Vec::new();
        let mut final_loss = f64::NAN;
        let mut running_time = Duration::ZERO;
        let mut start_time = Instant::now();
        let mut iteration = 0;

        info!(
            "学習を開始します - バッチサイズ (data, eqns): {:?}, 制限時間: {:.2?}",
            self.batch_sizes(),
            total_time
        );

        while running_time < total_time {
            let batch = self.sample_batch();
            let learning_rate = schedule.learning_rate(iteration, running_time);

            let loss = batch_loss(&self.model, &batch, self.constants)?;
            let grads = GradientsParams::from_grads(loss.total().backward(), &self.model);
            self.model = optim.step(learning_rate, self.model.clone(), grads);

            if iteration % LOG_INTERVAL == 0 {
                let elapsed = start_time.elapsed();
                running_time += elapsed;

                // 記録用の損失は勾配グラフを作らない内部バックエンドで求める
                let loss = batch_loss(&self.model.valid(), &batch.inner(), self.constants)?;
                let total = loss.total().into_scalar().elem::<f64>();
                let physics = loss.physics().into_scalar().elem::<f64>();
                if !total.is_finite() {
                    self.state = TrainerState::Finished;
                    return Err(PinnError::DivergedTraining {
                        iteration,
                        loss: total,
                    });
                }

                info!(
                    "It: {}, Loss: {:.3e}, Time: {:.2}s, Running Time: {}, Learning Rate: {:.1e}",
                    iteration,
                    total,
                    elapsed.as_secs_f64(),
                    format_running_time(running_time),
                    learning_rate
                );
                history.push(LossRecord {
                    iteration,
                    running_time,
                    total,
                    physics,
                    learning_rate,
                });
                final_loss = total;
                start_time = Instant::now();
            }
            iteration += 1;
        }

        self.state = TrainerState::Finished;
        info!("学習が完了しました。 => 学習時間: {:.2?}", running_time);
        Ok(TrainingReport {
            iterations: iteration,
            running_time,
            final_loss,
            history,
        })
    }

    /// 学習済みのネットワークで (c, u, v, p) を予測します。
    pub fn predict(&self, t: &[f32], x: &[f32], y: &[f32]) -> Result<Prediction> {
        inference::predict(&self.model, self.context.device(), t, x, y)
    }

    pub fn save_weights(&self, path: &Path) -> Result<PathBuf> {
        self.store.save(&self.model, path)
    }

    /// 保存済みの重みで現在のネットワークを置き換えます。
    pub fn load_weights(&mut self, path: &Path) -> Result<()> {
        let device = self.context.device().clone();
        self.model = self.store.load(self.model.clone(), path, &device)?;
        Ok(())
    }

    fn sample_batch(&mut self) -> Batch<B> {
        let [n_data, _] = self.observations.dims();
        let [n_eqns, _] = self.collocation.dims();
        let (data_size, eqns_size) = self.batch_sizes();

        let rng = self.context.rng();
        let idx_data = draw_indices(rng, n_data, data_size);
        let idx_eqns = draw_indices(rng, n_eqns, eqns_size);

        let device = self.context.device();
        let data = self.observations.clone().select(0, index_tensor(&idx_data, device));
        let eqns = self.collocation.clone().select(0, index_tensor(&idx_eqns, device));
        let (nd, ne) = (idx_data.len(), idx_eqns.len());

        Batch {
            t_data: data.clone().slice([0..nd, 0..1]),
            x_data: data.clone().slice([0..nd, 1..2]),
            y_data: data.clone().slice([0..nd, 2..3]),
            c_data: data.slice([0..nd, 3..4]),
            t_eqns: eqns.clone().slice([0..ne, 0..1]),
            x_eqns: eqns.clone().slice([0..ne, 1..2]),
            y_eqns: eqns.slice([0..ne, 2..3]),
        }
    }
}

impl<B: AutodiffBackend> Batch<B> {
    fn inner(&self) -> Batch<B::InnerBackend> {
        Batch {
            t_data: self.t_data.clone().inner(),
            x_data: self.x_data.clone().inner(),
            y_data: self.y_data.clone().inner(),
            c_data: self.c_data.clone().inner(),
            t_eqns: self.t_eqns.clone().inner(),
            x_eqns: self.x_eqns.clone().inner(),
            y_eqns: self.y_eqns.clone().inner(),
        }
    }
}

/// データブランチと方程式ブランチを同じネットワークで評価して損失を組み立てます。
fn batch_loss<B: Backend>(
    model: &FlowNet<B>,
    batch: &Batch<B>,
    constants: FlowConstants,
) -> Result<PinnLoss<B>> {
    let data = model.evaluate(
        batch.t_data.clone(),
        batch.x_data.clone(),
        batch.y_data.clone(),
    )?;
    let flow = model.evaluate_with_derivatives(
        batch.t_eqns.clone(),
        batch.x_eqns.clone(),
        batch.y_eqns.clone(),
    )?;
    let residuals = navier_stokes_2d(&flow, constants);
    Ok(pinn_loss(data.c, batch.c_data.clone(), residuals))
}

/// `amount` 個の添字を引きます。
///
/// 1 回の抽出の中では重複させません。母数が足りない場合に限り、
/// 個数を保つために重複を許して引きます。
pub(crate) fn draw_indices<R: Rng + ?Sized>(rng: &mut R, population: usize, amount: usize) -> Vec<usize> {
    if amount <= population {
        index::sample(rng, population, amount).into_vec()
    } else {
        (0..amount).map(|_| rng.random_range(0..population)).collect()
    }
}

fn index_tensor<B: AutodiffBackend>(indices: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let values: Vec<i64> = indices.iter().map(|&i| i as i64).collect();
    Tensor::from_data(TensorData::new(values, [indices.len()]), device)
}

/// 表示用の累積時間。60 秒までは秒、1 時間までは分、それ以上は時間。
pub fn format_running_time(running_time: Duration) -> String {
    let secs = running_time.as_secs_f64();
    if secs <= 60.0 {
        format!("{secs:.2}s")
    } else if secs <= 3600.0 {
        format!("{:.2}min", secs / 60.0)
    } else {
        format!("{:.2}h", secs / 3600.0)
    }
}

/// 学習過程の損失をグラフとして PNG ファイルに出力します。
pub fn plot_loss_history(history: &[LossRecord], path: &Path) -> Result<()> {
    draw_loss_history(history, path).map_err(|e| PinnError::Plot(e.to_string()))
}

fn draw_loss_history(
    history: &[LossRecord],
    path: &Path,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let log10 = |v: f64| v.max(f64::MIN_POSITIVE).log10();
    let values = history.iter().flat_map(|r| [log10(r.total), log10(r.physics)]);
    let (min_log_loss, max_log_loss) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let (min_log_loss, max_log_loss) = if min_log_loss.is_finite() {
        (min_log_loss - 0.5, max_log_loss + 0.5)
    } else {
        (-6.0, 0.0)
    };
    let last_iteration = history.last().map_or(1, |r| r.iteration.max(1));

    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Loss History", ("sans-serif", 40).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0..last_iteration, min_log_loss..max_log_loss)?;
    chart
        .configure_mesh()
        .y_desc("Loss (log10 scale)")
        .x_desc("Iteration")
        .draw()?;
    chart
        .draw_series(LineSeries::new(
            history.iter().map(|r| (r.iteration, log10(r.total))),
            &RED,
        ))?
        .label("Total Loss")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
    chart
        .draw_series(LineSeries::new(
            history.iter().map(|r| (r.iteration, log10(r.physics))),
            &BLUE,
        ))?
        .label("Physics Loss")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}
