use crate::MODEL_FILENAME;
use crate::error::{PinnError, Result};
use crate::model::FlowNet;
use burn::module::Module;
use burn::record::{FileRecorder, FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;
use log::info;
use std::path::{Path, PathBuf};

/// ネットワークの重みをファイルに保存・復元します。
///
/// 精度を落とさずに保存するので、読み込んだモデルは保存前と同じ推論結果を返します。
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    recorder: NamedMpkFileRecorder<FullPrecisionSettings>,
}

impl Default for CheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self {
            recorder: NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
        }
    }

    /// 実際に読み書きするファイルのパス。
    ///
    /// ディレクトリが渡された場合はその中の `pinn_model.mpk`、それ以外は
    /// 拡張子を `.mpk` に揃えたパスです。
    pub fn resolve<B: Backend>(path: &Path) -> PathBuf {
        let file = if path.is_dir() {
            path.join(MODEL_FILENAME)
        } else {
            path.to_path_buf()
        };
        file.with_extension(
            <NamedMpkFileRecorder<FullPrecisionSettings> as FileRecorder<B>>::file_extension(),
        )
    }

    /// 重みを保存します。既存のファイルは上書きされます。
    pub fn save<B: Backend>(&self, model: &FlowNet<B>, path: &Path) -> Result<PathBuf> {
        let file = Self::resolve::<B>(path);
        if let Some(parent) = file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("学習済みモデルを '{}' に保存中...", file.display());
        model.clone().save_file(file.clone(), &self.recorder)?;
        Ok(file)
    }

    /// `template` と同じ構成のネットワークに重みを読み込みます。
    ///
    /// ファイルがなければ `ModelNotFound` を返し、新しい重みで続行はしません。
    pub fn load<B: Backend>(
        &self,
        template: FlowNet<B>,
        path: &Path,
        device: &B::Device,
    ) -> Result<FlowNet<B>> {
        let file = Self::resolve::<B>(path);
        if !file.is_file() {
            return Err(PinnError::ModelNotFound(file));
        }
        info!("保存済みモデルを '{}' からロード中...", file.display());
        let model = template.load_file(file, &self.recorder, device)?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{Tensor, TensorData};

    type TestBackend = NdArray<f32>;

    fn column(values: &[f32]) -> Tensor<TestBackend, 2> {
        Tensor::from_data(
            TensorData::new(values.to_vec(), [values.len(), 1]),
            &Default::default(),
        )
    }

    fn outputs(model: &FlowNet<TestBackend>) -> Vec<f32> {
        let input = Tensor::cat(
            vec![
                column(&[0.0, 0.5, 1.0]),
                column(&[1.0, -2.0, 3.0]),
                column(&[0.2, 0.4, -0.6]),
            ],
            1,
        );
        model.forward(input).into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn saved_weights_reproduce_predictions() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new();
        let model = FlowNet::<TestBackend>::new(&[3, 8, 8, 4], &device)
            .unwrap()
            .with_input_normalization([1.0, 2.0, 3.0], [0.5, 1.5, 2.5]);

        let file = store.save(&model, &dir.path().join("weights")).unwrap();
        assert_eq!(file, dir.path().join("weights.mpk"));
        assert!(file.is_file());

        let fresh = FlowNet::<TestBackend>::new(&[3, 8, 8, 4], &device).unwrap();
        assert_ne!(outputs(&fresh), outputs(&model));
        let restored = store.load(fresh, &file, &device).unwrap();
        assert_eq!(outputs(&restored), outputs(&model));
    }

    #[test]
    fn directory_path_stores_default_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = CheckpointStore::resolve::<TestBackend>(dir.path());
        assert_eq!(resolved, dir.path().join(MODEL_FILENAME));
    }

    #[test]
    fn missing_checkpoint_is_reported() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let template = FlowNet::<TestBackend>::new(&[3, 4], &device).unwrap();
        let result = CheckpointStore::new().load(template, &dir.path().join("absent.mpk"), &device);
        assert!(matches!(result, Err(PinnError::ModelNotFound(_))));
    }
}
