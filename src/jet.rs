//! 入力座標に関する微分の前進モード伝播。
//!
//! 値と一緒に ∂/∂t, ∂/∂x, ∂/∂y と ∂²/∂x², ∂²/∂y² を各層に通して運びます。
//! どれも通常のテンソル演算で組み立てるので、残差を重みで微分する逆伝播は
//! そのまま `Autodiff` バックエンドに任せられます。

use burn::nn::{Linear, Tanh};
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// 値と入力微分の組。すべて `[n, width]`。
#[derive(Debug, Clone)]
pub struct Jet<B: Backend> {
    pub value: Tensor<B, 2>,
    pub d_t: Tensor<B, 2>,
    pub d_x: Tensor<B, 2>,
    pub d_y: Tensor<B, 2>,
    pub d_xx: Tensor<B, 2>,
    pub d_yy: Tensor<B, 2>,
}

impl<B: Backend> Jet<B> {
    /// 標準化済みの入力 `[n, 3]` から始まる Jet を作ります。
    ///
    /// `scale` は標準化に使った `[1, 3]` の幅で、入力の接ベクトルは `e_k / scale_k` になります。
    pub fn seed(standardized: Tensor<B, 2>, scale: Tensor<B, 2>) -> Self {
        let [n, _] = standardized.dims();
        let device = standardized.device();
        let inv_scale = scale.recip();
        let direction = |axis: usize| {
            let columns: Vec<Tensor<B, 2>> = (0..3)
                .map(|j| {
                    if j == axis {
                        Tensor::<B, 2>::ones([n, 1], &device)
                    } else {
                        Tensor::<B, 2>::zeros([n, 1], &device)
                    }
                })
                .collect();
            Tensor::cat(columns, 1) * inv_scale.clone()
        };

        Self {
            d_t: direction(0),
            d_x: direction(1),
            d_y: direction(2),
            d_xx: Tensor::zeros([n, 3], &device),
            d_yy: Tensor::zeros([n, 3], &device),
            value: standardized,
        }
    }

    /// アフィン層 `z W + b`。微分には線形部分 `W` だけが掛かります。
    pub fn linear(self, layer: &Linear<B>) -> Self {
        let weight = layer.weight.val();
        let apply = |d: Tensor<B, 2>| d.matmul(weight.clone());
        Self {
            value: layer.forward(self.value),
            d_t: apply(self.d_t),
            d_x: apply(self.d_x),
            d_y: apply(self.d_y),
            d_xx: apply(self.d_xx),
            d_yy: apply(self.d_yy),
        }
    }

    /// `a = tanh(h)`, `a' = 1 - a²`, `a'' = -2 a a'`。
    pub fn tanh(self, activation: &Tanh) -> Self {
        let a = activation.forward(self.value);
        let slope = (a.clone() * a.clone()).neg().add_scalar(1.0);
        let curvature = a.clone().mul(slope.clone()).mul_scalar(-2.0);

        let d_xx = curvature.clone() * self.d_x.clone() * self.d_x.clone()
            + slope.clone() * self.d_xx;
        let d_yy = curvature * self.d_y.clone() * self.d_y.clone() + slope.clone() * self.d_yy;

        Self {
            value: a,
            d_t: slope.clone() * self.d_t,
            d_x: slope.clone() * self.d_x,
            d_y: slope * self.d_y,
            d_xx,
            d_yy,
        }
    }

    /// 出力の `k` 列目だけを取り出します。
    pub fn column(&self, k: usize) -> FieldDerivatives<B> {
        let [n, _] = self.value.dims();
        let take = |tensor: &Tensor<B, 2>| tensor.clone().slice([0..n, k..k + 1]);
        FieldDerivatives {
            value: take(&self.value),
            t: take(&self.d_t),
            x: take(&self.d_x),
            y: take(&self.d_y),
            xx: take(&self.d_xx),
            yy: take(&self.d_yy),
        }
    }
}

/// スカラー場 1 つとその偏微分。すべて `[n, 1]`。
#[derive(Debug, Clone)]
pub struct FieldDerivatives<B: Backend> {
    pub value: Tensor<B, 2>,
    pub t: Tensor<B, 2>,
    pub x: Tensor<B, 2>,
    pub y: Tensor<B, 2>,
    pub xx: Tensor<B, 2>,
    pub yy: Tensor<B, 2>,
}

/// 方程式ブランチの出力 (c, u, v, p) とその偏微分。
#[derive(Debug, Clone)]
pub struct FlowJet<B: Backend> {
    pub c: FieldDerivatives<B>,
    pub u: FieldDerivatives<B>,
    pub v: FieldDerivatives<B>,
    pub p: FieldDerivatives<B>,
}

impl<B: Backend> FlowJet<B> {
    /// 出力層の Jet `[n, 4]` を場ごとに分けます。
    pub fn from_output(output: &Jet<B>) -> Self {
        Self {
            c: output.column(0),
            u: output.column(1),
            v: output.column(2),
            p: output.column(3),
        }
    }
}
