use burn::tensor::backend::Backend;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// 学習・推論で使う計算環境。
///
/// デバイスとミニバッチ抽出用の乱数生成器をまとめ、`Trainer` の生成時に渡されます。
/// プロセス全体で共有されるセッションは持ちません。
#[derive(Debug)]
pub struct ComputeContext<B: Backend> {
    device: B::Device,
    rng: StdRng,
}

impl<B: Backend> ComputeContext<B> {
    /// バックエンドの乱数（重みの初期化）とミニバッチ抽出の乱数を同じシードで初期化します。
    pub fn new(device: B::Device, seed: u64) -> Self {
        B::seed(seed);
        Self {
            device,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}
