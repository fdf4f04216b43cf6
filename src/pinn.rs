use crate::config::FlowConstants;
use crate::jet::FlowJet;
use burn::nn::loss::{MseLoss, Reduction};
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// 支配方程式の残差。すべて `[n, 1]` で、厳密解なら 0 になります。
#[derive(Debug, Clone)]
pub struct Residuals<B: Backend> {
    /// 移流拡散方程式
    pub e1: Tensor<B, 2>,
    /// x 方向運動量
    pub e2: Tensor<B, 2>,
    /// y 方向運動量
    pub e3: Tensor<B, 2>,
    /// 連続の式
    pub e4: Tensor<B, 2>,
}

/// 2 次元非圧縮 Navier–Stokes 方程式と移流拡散方程式の残差を計算します。
pub fn navier_stokes_2d<B: Backend>(flow: &FlowJet<B>, constants: FlowConstants) -> Residuals<B> {
    let FlowJet { c, u, v, p } = flow;
    let diffusivity = 1.0 / constants.pec();
    let viscosity = 1.0 / constants.rey();

    let advect = |t: &Tensor<B, 2>, x: &Tensor<B, 2>, y: &Tensor<B, 2>| {
        t.clone() + u.value.clone() * x.clone() + v.value.clone() * y.clone()
    };

    let e1 = advect(&c.t, &c.x, &c.y) - (c.xx.clone() + c.yy.clone()).mul_scalar(diffusivity);
    let e2 = advect(&u.t, &u.x, &u.y) + p.x.clone()
        - (u.xx.clone() + u.yy.clone()).mul_scalar(viscosity);
    let e3 = advect(&v.t, &v.x, &v.y) + p.y.clone()
        - (v.xx.clone() + v.yy.clone()).mul_scalar(viscosity);
    let e4 = u.x.clone() + v.y.clone();

    Residuals { e1, e2, e3, e4 }
}

/// 学習損失の内訳。
#[derive(Debug, Clone)]
pub struct PinnLoss<B: Backend> {
    /// 観測濃度に対する二乗平均誤差
    pub data: Tensor<B, 1>,
    /// 4 つの残差それぞれの二乗平均
    pub equations: [Tensor<B, 1>; 4],
}

impl<B: Backend> PinnLoss<B> {
    /// 5 項の重みなし和。
    pub fn total(&self) -> Tensor<B, 1> {
        self.data.clone() + self.physics()
    }

    /// 残差 4 項の和。
    pub fn physics(&self) -> Tensor<B, 1> {
        let [e1, e2, e3, e4] = self.equations.clone();
        e1 + e2 + e3 + e4
    }
}

/// データ適合誤差と残差をまとめて損失にします。
pub fn pinn_loss<B: Backend>(
    c_pred: Tensor<B, 2>,
    c_observed: Tensor<B, 2>,
    residuals: Residuals<B>,
) -> PinnLoss<B> {
    let mse = MseLoss::new();
    let to_zero = |e: Tensor<B, 2>| mse.forward(e.clone(), Tensor::zeros_like(&e), Reduction::Mean);
    let Residuals { e1, e2, e3, e4 } = residuals;
    PinnLoss {
        data: mse.forward(c_pred, c_observed, Reduction::Mean),
        equations: [to_zero(e1), to_zero(e2), to_zero(e3), to_zero(e4)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jet::FieldDerivatives;
    use approx::assert_abs_diff_eq;
    use burn::backend::NdArray;
    use burn::tensor::{ElementConversion, TensorData};

    type TestBackend = NdArray<f64>;

    fn column(values: Vec<f64>) -> Tensor<TestBackend, 2> {
        let n = values.len();
        Tensor::from_data(TensorData::new(values, [n, 1]), &Default::default())
    }

    fn max_abs(tensor: Tensor<TestBackend, 2>) -> f64 {
        tensor.abs().max().into_scalar().elem::<f64>()
    }

    fn field(points: &[(f64, f64, f64)], f: impl Fn(f64, f64, f64) -> [f64; 6]) -> FieldDerivatives<TestBackend> {
        let rows: Vec<[f64; 6]> = points.iter().map(|&(t, x, y)| f(t, x, y)).collect();
        let pick = |k: usize| column(rows.iter().map(|row| row[k]).collect());
        FieldDerivatives {
            value: pick(0),
            t: pick(1),
            x: pick(2),
            y: pick(3),
            xx: pick(4),
            yy: pick(5),
        }
    }

    /// 減衰する Taylor–Green 渦と、その流線関数に沿って拡散するだけの濃度場。
    fn taylor_green(points: &[(f64, f64, f64)], pec: f64, rey: f64) -> FlowJet<TestBackend> {
        let nu = 1.0 / rey;
        let kappa = 1.0 / pec;
        let f = move |t: f64| (-2.0 * nu * t).exp();
        let g = move |t: f64| (-2.0 * kappa * t).exp();

        // [value, t, x, y, xx, yy]
        let c = field(points, |t, x, y| {
            let s = x.cos() * y.cos() * g(t);
            [s, -2.0 * kappa * s, -x.sin() * y.cos() * g(t), -x.cos() * y.sin() * g(t), -s, -s]
        });
        let u = field(points, |t, x, y| {
            let s = -x.cos() * y.sin() * f(t);
            [s, -2.0 * nu * s, x.sin() * y.sin() * f(t), -x.cos() * y.cos() * f(t), -s, -s]
        });
        let v = field(points, |t, x, y| {
            let s = x.sin() * y.cos() * f(t);
            [s, -2.0 * nu * s, x.cos() * y.cos() * f(t), -x.sin() * y.sin() * f(t), -s, -s]
        });
        let p = field(points, |t, x, y| {
            let decay = f(t) * f(t);
            let s = -0.25 * ((2.0 * x).cos() + (2.0 * y).cos()) * decay;
            [
                s,
                -4.0 * nu * s,
                0.5 * (2.0 * x).sin() * decay,
                0.5 * (2.0 * y).sin() * decay,
                (2.0 * x).cos() * decay,
                (2.0 * y).cos() * decay,
            ]
        });
        FlowJet { c, u, v, p }
    }

    fn sample_points() -> Vec<(f64, f64, f64)> {
        (0..25)
            .map(|i| {
                let s = i as f64;
                (0.1 * s, (0.37 * s).sin() * 3.0, (0.23 * s).cos() * 2.0 + 0.5)
            })
            .collect()
    }

    #[test]
    fn exact_navier_stokes_solution_has_zero_residuals() {
        let constants = FlowConstants::new(50.0, 100.0).unwrap();
        let flow = taylor_green(&sample_points(), 50.0, 100.0);
        let residuals = navier_stokes_2d(&flow, constants);

        assert_abs_diff_eq!(max_abs(residuals.e1), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(max_abs(residuals.e2), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(max_abs(residuals.e3), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(max_abs(residuals.e4), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn wrong_reynolds_number_leaves_momentum_residual() {
        let constants = FlowConstants::new(50.0, 10.0).unwrap();
        let flow = taylor_green(&sample_points(), 50.0, 100.0);
        let residuals = navier_stokes_2d(&flow, constants);

        assert_abs_diff_eq!(max_abs(residuals.e1), 0.0, epsilon = 1e-12);
        assert!(max_abs(residuals.e2) > 1e-3);
        assert_abs_diff_eq!(max_abs(residuals.e4), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn loss_is_zero_for_exact_fit_and_positive_otherwise() {
        let constants = FlowConstants::new(100.0, 100.0).unwrap();
        let flow = taylor_green(&sample_points(), 100.0, 100.0);
        let c = flow.c.value.clone();

        let exact = pinn_loss(c.clone(), c.clone(), navier_stokes_2d(&flow, constants));
        assert_abs_diff_eq!(exact.total().into_scalar().elem::<f64>(), 0.0, epsilon = 1e-20);

        let shifted = pinn_loss(c.clone().add_scalar(0.5), c, navier_stokes_2d(&flow, constants));
        assert_abs_diff_eq!(shifted.data.clone().into_scalar().elem::<f64>(), 0.25, epsilon = 1e-12);
        assert!(shifted.total().into_scalar().elem::<f64>() >= 0.25);
    }
}
