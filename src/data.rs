//! 観測データ・コロケーション点・流れ場データセット。

use crate::error::{PinnError, Result};
use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// 濃度の観測値 (t, x, y, c)。4 本の列は同じ長さです。
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSet {
    t: Vec<f32>,
    x: Vec<f32>,
    y: Vec<f32>,
    c: Vec<f32>,
}

impl ObservationSet {
    pub fn new(t: Vec<f32>, x: Vec<f32>, y: Vec<f32>, c: Vec<f32>) -> Result<Self> {
        let n = t.len();
        if x.len() != n || y.len() != n || c.len() != n {
            return Err(PinnError::ShapeMismatch(format!(
                "観測データの長さが違います: t={}, x={}, y={}, c={}",
                n,
                x.len(),
                y.len(),
                c.len()
            )));
        }
        if n == 0 {
            return Err(PinnError::ShapeMismatch("観測データが空です".to_string()));
        }
        Ok(Self { t, x, y, c })
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// 行優先に並べた `[n, 4]` の値 (t, x, y, c)。
    pub fn interleaved(&self) -> Vec<f32> {
        let mut rows = Vec::with_capacity(self.len() * 4);
        for i in 0..self.len() {
            rows.extend([self.t[i], self.x[i], self.y[i], self.c[i]]);
        }
        rows
    }

    /// (t, x, y) 各列の平均と標準偏差。入力の標準化に使います。
    pub fn input_statistics(&self) -> ([f32; 3], [f32; 3]) {
        let stats = [&self.t, &self.x, &self.y].map(|column| mean_and_std(column));
        (stats.map(|(mean, _)| mean), stats.map(|(_, std)| std))
    }
}

/// ラベルのないコロケーション点 (t, x, y)。
#[derive(Debug, Clone, PartialEq)]
pub struct CollocationSet {
    t: Vec<f32>,
    x: Vec<f32>,
    y: Vec<f32>,
}

impl CollocationSet {
    pub fn new(t: Vec<f32>, x: Vec<f32>, y: Vec<f32>) -> Result<Self> {
        let n = t.len();
        if x.len() != n || y.len() != n {
            return Err(PinnError::ShapeMismatch(format!(
                "コロケーション点の長さが違います: t={}, x={}, y={}",
                n,
                x.len(),
                y.len()
            )));
        }
        if n == 0 {
            return Err(PinnError::ShapeMismatch("コロケーション点が空です".to_string()));
        }
        Ok(Self { t, x, y })
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// 行優先に並べた `[n, 3]` の値 (t, x, y)。
    pub fn interleaved(&self) -> Vec<f32> {
        let mut rows = Vec::with_capacity(self.len() * 3);
        for i in 0..self.len() {
            rows.extend([self.t[i], self.x[i], self.y[i]]);
        }
        rows
    }
}

fn mean_and_std(values: &[f32]) -> (f32, f32) {
    let n = values.len().max(1) as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = values.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    (mean as f32, var.sqrt() as f32)
}

/// 流れ場のデータセット。
///
/// `t_star` は T 個の時刻、`x_star`/`y_star` は N 個の空間点、
/// 各場は N 行 × T 列 (空間点ごとの時系列) です。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDataset {
    pub t_star: Vec<f32>,
    pub x_star: Vec<f32>,
    pub y_star: Vec<f32>,
    #[serde(rename = "C_star")]
    pub c_star: Vec<Vec<f32>>,
    #[serde(rename = "U_star")]
    pub u_star: Vec<Vec<f32>>,
    #[serde(rename = "V_star")]
    pub v_star: Vec<Vec<f32>>,
    #[serde(rename = "P_star")]
    pub p_star: Vec<Vec<f32>>,
}

/// あるスナップショット時刻の問い合わせ点と正解値。
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub t: Vec<f32>,
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub c: Vec<f32>,
    pub u: Vec<f32>,
    pub v: Vec<f32>,
    pub p: Vec<f32>,
}

impl FlowDataset {
    /// JSON ファイルから読み込み、形状を検証します。
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let dataset: Self = serde_json::from_reader(reader)?;
        dataset.validate()?;
        Ok(dataset)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    /// 時刻の数 T
    pub fn time_steps(&self) -> usize {
        self.t_star.len()
    }

    /// 空間点の数 N
    pub fn points(&self) -> usize {
        self.x_star.len()
    }

    pub fn validate(&self) -> Result<()> {
        let (n, t) = (self.points(), self.time_steps());
        if self.y_star.len() != n {
            return Err(PinnError::ShapeMismatch(format!(
                "x_star と y_star の長さが違います: {} != {}",
                n,
                self.y_star.len()
            )));
        }
        for (name, field) in self.fields() {
            if field.len() != n || field.iter().any(|row| row.len() != t) {
                return Err(PinnError::ShapeMismatch(format!(
                    "{name} は {n}x{t} である必要があります"
                )));
            }
        }
        Ok(())
    }

    fn fields(&self) -> [(&'static str, &Vec<Vec<f32>>); 4] {
        [
            ("C_star", &self.c_star),
            ("U_star", &self.u_star),
            ("V_star", &self.v_star),
            ("P_star", &self.p_star),
        ]
    }

    /// 時間軸を `gap` ごとに間引きます。出力の時刻数は `ceil(T / gap)`。
    pub fn decimate_time(&self, gap: usize) -> Result<Self> {
        if gap == 0 {
            return Err(PinnError::Configuration(
                "gap は 1 以上である必要があります".to_string(),
            ));
        }
        self.validate()?;
        let steps = self.time_steps();
        let kept: Vec<usize> = (0..steps.div_ceil(gap))
            .map(|i| (i * gap).min(steps.saturating_sub(1)))
            .collect();
        let pick_row = |row: &Vec<f32>| kept.iter().map(|&j| row[j]).collect::<Vec<f32>>();
        let pick = |field: &Vec<Vec<f32>>| field.iter().map(&pick_row).collect::<Vec<_>>();

        Ok(Self {
            t_star: kept.iter().map(|&j| self.t_star[j]).collect(),
            x_star: self.x_star.clone(),
            y_star: self.y_star.clone(),
            c_star: pick(&self.c_star),
            u_star: pick(&self.u_star),
            v_star: pick(&self.v_star),
            p_star: pick(&self.p_star),
        })
    }

    /// 濃度の観測データを抜き出します。
    ///
    /// 時刻は最初と最後を必ず含めて `time_count` 個、空間点は `point_count` 個を
    /// 重複なしで選び、すべての (空間点, 時刻) の組を空間点ごとに並べます。
    pub fn sample_observations<R: Rng + ?Sized>(
        &self,
        time_count: usize,
        point_count: usize,
        rng: &mut R,
    ) -> Result<ObservationSet> {
        let (times, points) = self.sample_indices(time_count, point_count, rng)?;
        let mut columns = [Vec::new(), Vec::new(), Vec::new(), Vec::new()];
        for &i in &points {
            for &j in &times {
                columns[0].push(self.t_star[j]);
                columns[1].push(self.x_star[i]);
                columns[2].push(self.y_star[i]);
                columns[3].push(self.c_star[i][j]);
            }
        }
        let [t, x, y, c] = columns;
        ObservationSet::new(t, x, y, c)
    }

    /// 方程式の残差を評価するコロケーション点を抜き出します。
    ///
    /// 行の長さがそろっていないデータセットは `ShapeMismatch` になります。
    pub fn sample_collocation<R: Rng + ?Sized>(
        &self,
        time_count: usize,
        point_count: usize,
        rng: &mut R,
    ) -> Result<CollocationSet> {
        let (times, points) = self.sample_indices(time_count, point_count, rng)?;
        let mut columns = [Vec::new(), Vec::new(), Vec::new()];
        for &i in &points {
            for &j in &times {
                columns[0].push(self.t_star[j]);
                columns[1].push(self.x_star[i]);
                columns[2].push(self.y_star[i]);
            }
        }
        let [t, x, y] = columns;
        CollocationSet::new(t, x, y)
    }

    fn sample_indices<R: Rng + ?Sized>(
        &self,
        time_count: usize,
        point_count: usize,
        rng: &mut R,
    ) -> Result<(Vec<usize>, Vec<usize>)> {
        self.validate()?;
        let (steps, points) = (self.time_steps(), self.points());
        if time_count < 2 || time_count > steps {
            return Err(PinnError::Configuration(format!(
                "時刻数は 2 以上 {steps} 以下である必要があります: {time_count}"
            )));
        }
        if point_count == 0 || point_count > points {
            return Err(PinnError::Configuration(format!(
                "空間点数は 1 以上 {points} 以下である必要があります: {point_count}"
            )));
        }

        let mut times = Vec::with_capacity(time_count);
        times.push(0);
        times.extend(
            index::sample(rng, steps - 2, time_count - 2)
                .into_iter()
                .map(|j| j + 1),
        );
        times.push(steps - 1);
        let points = index::sample(rng, points, point_count).into_vec();
        Ok((times, points))
    }

    /// `k` 番目の時刻における全空間点。
    pub fn snapshot(&self, k: usize) -> Result<Snapshot> {
        self.validate()?;
        let t = *self.t_star.get(k).ok_or_else(|| {
            PinnError::Configuration(format!(
                "スナップショット {k} は範囲外です (T = {})",
                self.time_steps()
            ))
        })?;
        let column = |field: &Vec<Vec<f32>>| field.iter().map(|row| row[k]).collect::<Vec<f32>>();
        Ok(Snapshot {
            t: vec![t; self.points()],
            x: self.x_star.clone(),
            y: self.y_star.clone(),
            c: column(&self.c_star),
            u: column(&self.u_star),
            v: column(&self.v_star),
            p: column(&self.p_star),
        })
    }
}

/// 相対誤差 `sqrt(mean((pred - exact)²) / mean((exact - mean(exact))²))`。
pub fn relative_error(pred: &[f32], exact: &[f32]) -> f64 {
    let n = exact.len().max(1) as f64;
    let mean = exact.iter().map(|&e| e as f64).sum::<f64>() / n;
    let error = pred
        .iter()
        .zip(exact)
        .map(|(&p, &e)| (p as f64 - e as f64).powi(2))
        .sum::<f64>()
        / n;
    let spread = exact.iter().map(|&e| (e as f64 - mean).powi(2)).sum::<f64>() / n;
    (error / spread).sqrt()
}

/// 平均を引いた値。圧力は定数の差を除いて比較します。
pub fn centered(values: &[f32]) -> Vec<f32> {
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / values.len().max(1) as f64;
    values.iter().map(|&v| (v as f64 - mean) as f32).collect()
}
