use crate::checkpoint::CheckpointStore;
use crate::error::{PinnError, Result};
use crate::model::FlowNet;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use std::path::Path;

/// 問い合わせ点ごとの (c, u, v, p)。
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub c: Vec<f32>,
    pub u: Vec<f32>,
    pub v: Vec<f32>,
    pub p: Vec<f32>,
}

impl Prediction {
    pub fn len(&self) -> usize {
        self.c.len()
    }

    pub fn is_empty(&self) -> bool {
        self.c.is_empty()
    }
}

/// 学習済みネットワークをデータブランチとして任意の点で評価します。
#[derive(Debug)]
pub struct InferenceEngine<B: Backend> {
    model: FlowNet<B>,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    pub fn new(model: FlowNet<B>, device: B::Device) -> Self {
        Self { model, device }
    }

    /// 保存済みの重みを読み込んで推論器を作ります。
    pub fn from_checkpoint(layers: &[usize], path: &Path, device: B::Device) -> Result<Self> {
        let template = FlowNet::new(layers, &device)?;
        let model = CheckpointStore::new().load(template, path, &device)?;
        Ok(Self::new(model, device))
    }

    pub fn model(&self) -> &FlowNet<B> {
        &self.model
    }

    pub fn predict(&self, t: &[f32], x: &[f32], y: &[f32]) -> Result<Prediction> {
        predict(&self.model, &self.device, t, x, y)
    }
}

/// 副作用のない順伝播で (c, u, v, p) を求めます。1 点でも全場でも構いません。
pub fn predict<B: Backend>(
    model: &FlowNet<B>,
    device: &B::Device,
    t: &[f32],
    x: &[f32],
    y: &[f32],
) -> Result<Prediction> {
    if t.len() != x.len() || t.len() != y.len() {
        return Err(PinnError::ShapeMismatch(format!(
            "t, x, y の長さが違います: {}, {}, {}",
            t.len(),
            x.len(),
            y.len()
        )));
    }
    if t.is_empty() {
        return Ok(Prediction {
            c: Vec::new(),
            u: Vec::new(),
            v: Vec::new(),
            p: Vec::new(),
        });
    }

    let fields = model.evaluate(column(t, device), column(x, device), column(y, device))?;
    Ok(Prediction {
        c: to_vec(fields.c)?,
        u: to_vec(fields.u)?,
        v: to_vec(fields.v)?,
        p: to_vec(fields.p)?,
    })
}

pub(crate) fn column<B: Backend>(values: &[f32], device: &B::Device) -> Tensor<B, 2> {
    Tensor::from_data(TensorData::new(values.to_vec(), [values.len(), 1]), device)
}

pub(crate) fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| PinnError::TensorData(format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn engine() -> InferenceEngine<TestBackend> {
        let device = Default::default();
        let model = FlowNet::new(&[3, 10, 10, 4], &device).unwrap();
        InferenceEngine::new(model, device)
    }

    #[test]
    fn predict_is_idempotent() {
        let engine = engine();
        let (t, x, y) = ([0.0, 0.5, 1.0], [1.0, 2.0, 3.0], [-1.0, 0.0, 1.0]);
        let first = engine.predict(&t, &x, &y).unwrap();
        let second = engine.predict(&t, &x, &y).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn single_point_matches_full_batch() {
        let engine = engine();
        let batch = engine.predict(&[0.2, 0.4], &[1.5, -1.5], &[0.3, 0.6]).unwrap();
        let single = engine.predict(&[0.4], &[-1.5], &[0.6]).unwrap();
        assert!((batch.u[1] - single.u[0]).abs() < 1e-6);
        assert!((batch.p[1] - single.p[0]).abs() < 1e-6);
    }

    #[test]
    fn rejects_mismatched_query_lengths() {
        let engine = engine();
        let result = engine.predict(&[0.0, 1.0], &[0.0, 1.0], &[0.0]);
        assert!(matches!(result, Err(PinnError::ShapeMismatch(_))));
    }

    #[test]
    fn missing_checkpoint_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let result = InferenceEngine::<TestBackend>::from_checkpoint(
            &[3, 10, 4],
            &dir.path().join("nothing-here"),
            Default::default(),
        );
        assert!(matches!(result, Err(PinnError::ModelNotFound(_))));
    }
}
