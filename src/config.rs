use crate::error::PinnError;
use burn::config::Config;
use burn::optim::AdamConfig;
use std::time::Duration;

/// ネットワーク構成と流れの物理定数。
///
/// 重みファイルと同じ場所に JSON として保存され、再開・推論時に同じ構成の
/// ネットワークを組み立てるために使われます。
#[derive(Config, Debug)]
pub struct PinnConfig {
    /// 各層の幅。先頭は (t, x, y) の 3、末尾は (c, u, v, p) の 4。
    #[config(default = "default_layers()")]
    pub layers: Vec<usize>,
    /// 1 イテレーションあたりのバッチサイズ
    #[config(default = 10000)]
    pub batch_size: usize,
    /// ペクレ数
    #[config(default = 100.0)]
    pub pec: f64,
    /// レイノルズ数
    #[config(default = 100.0)]
    pub rey: f64,
    /// パラメータ初期化とミニバッチ抽出の乱数シード
    #[config(default = 1234)]
    pub seed: u64,
}

/// 隠れ層 10 層 × 幅 200。
pub fn default_layers() -> Vec<usize> {
    let mut layers = vec![3];
    layers.extend(std::iter::repeat_n(4 * 50, 10));
    layers.push(4);
    layers
}

impl PinnConfig {
    /// 層構成・バッチサイズ・物理定数を検証します。
    pub fn validate(&self) -> crate::Result<()> {
        validate_layers(&self.layers)?;
        if self.batch_size == 0 {
            return Err(PinnError::Configuration(
                "batch_size は 1 以上である必要があります".to_string(),
            ));
        }
        FlowConstants::new(self.pec, self.rey)?;
        Ok(())
    }

    pub fn constants(&self) -> crate::Result<FlowConstants> {
        FlowConstants::new(self.pec, self.rey)
    }
}

/// 学習ループの設定。
#[derive(Config)]
pub struct TrainingConfig {
    pub optimizer: AdamConfig,
    /// 学習に使う壁時計時間 (秒)
    #[config(default = 60.0)]
    pub time_budget_secs: f64,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
}

impl TrainingConfig {
    pub fn time_budget(&self) -> crate::Result<Duration> {
        Duration::try_from_secs_f64(self.time_budget_secs).map_err(|_| {
            PinnError::Configuration(format!(
                "学習時間が不正です: {}",
                self.time_budget_secs
            ))
        })
    }
}

/// ペクレ数とレイノルズ数。どちらも正でなければなりません。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowConstants {
    pec: f64,
    rey: f64,
}

impl FlowConstants {
    pub fn new(pec: f64, rey: f64) -> crate::Result<Self> {
        if !(pec.is_finite() && pec > 0.0) || !(rey.is_finite() && rey > 0.0) {
            return Err(PinnError::Configuration(format!(
                "Pec と Rey は正の値である必要があります (Pec: {pec}, Rey: {rey})"
            )));
        }
        Ok(Self { pec, rey })
    }

    pub fn pec(&self) -> f64 {
        self.pec
    }

    pub fn rey(&self) -> f64 {
        self.rey
    }
}

pub(crate) fn validate_layers(layers: &[usize]) -> crate::Result<()> {
    if layers.len() < 2 {
        return Err(PinnError::Configuration(format!(
            "層構成には入力層と出力層が必要です: {layers:?}"
        )));
    }
    if layers[0] != 3 || layers[layers.len() - 1] != 4 {
        return Err(PinnError::Configuration(format!(
            "層構成は 3 で始まり 4 で終わる必要があります: {layers:?}"
        )));
    }
    if layers.contains(&0) {
        return Err(PinnError::Configuration(format!(
            "幅 0 の層は使えません: {layers:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_reference_network() {
        let config = PinnConfig::new();
        assert_eq!(config.layers.len(), 12);
        assert_eq!(config.layers[1], 200);
        assert_eq!(config.batch_size, 10000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_constants() {
        assert!(FlowConstants::new(0.0, 100.0).is_err());
        assert!(FlowConstants::new(100.0, -1.0).is_err());
        assert!(FlowConstants::new(f64::NAN, 1.0).is_err());
        assert!(FlowConstants::new(100.0, 100.0).is_ok());
    }

    #[test]
    fn rejects_bad_layer_widths() {
        assert!(validate_layers(&[3]).is_err());
        assert!(validate_layers(&[2, 8, 4]).is_err());
        assert!(validate_layers(&[3, 8, 3]).is_err());
        assert!(validate_layers(&[3, 0, 4]).is_err());
        assert!(validate_layers(&[3, 4]).is_ok());
    }

    #[test]
    fn config_survives_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pinn_config.json");
        let config = PinnConfig::new().with_layers(vec![3, 8, 4]).with_batch_size(16);
        config.save(&path).unwrap();

        let loaded = PinnConfig::load(&path).unwrap();
        assert_eq!(loaded.layers, vec![3, 8, 4]);
        assert_eq!(loaded.batch_size, 16);
    }

    #[test]
    fn training_config_converts_time_budget() {
        let config = TrainingConfig::new(AdamConfig::new()).with_time_budget_secs(1.5);
        assert_eq!(config.time_budget().unwrap(), Duration::from_millis(1500));
        assert_eq!(config.learning_rate, 1e-3);

        let broken = TrainingConfig::new(AdamConfig::new()).with_time_budget_secs(-1.0);
        assert!(matches!(
            broken.time_budget(),
            Err(PinnError::Configuration(_))
        ));
    }
}
