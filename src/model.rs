use crate::config::validate_layers;
use crate::error::{PinnError, Result};
use crate::jet::{FlowJet, Jet};
use burn::module::{Module, Param};
use burn::nn::{Linear, LinearConfig, Tanh};
use burn::prelude::Backend;
use burn::tensor::Tensor;

/// (t, x, y) を受け取り (c, u, v, p) を返す、データ側と方程式側で共有されるネットワーク。
///
/// 隠れ層の間は tanh、出力層は恒等写像の多層パーセプトロン（MLP）です。
/// 入力は学習データの平均と標準偏差で標準化してから最初の層に渡します。
/// 標準化の値は学習されませんが、重みと一緒に保存されます。
#[derive(Module, Debug)]
pub struct FlowNet<B: Backend> {
    linears: Vec<Linear<B>>,
    activation: Tanh,
    input_mean: Param<Tensor<B, 2>>,
    input_scale: Param<Tensor<B, 2>>,
}

/// データブランチの出力。すべて `[n, 1]`。
#[derive(Debug, Clone)]
pub struct FlowFields<B: Backend> {
    pub c: Tensor<B, 2>,
    pub u: Tensor<B, 2>,
    pub v: Tensor<B, 2>,
    pub p: Tensor<B, 2>,
}

impl<B: Backend> FlowNet<B> {
    /// 層の幅の列から新しいネットワークを初期化します。
    pub fn new(layers: &[usize], device: &B::Device) -> Result<Self> {
        validate_layers(layers)?;
        let linears = layers
            .windows(2)
            .map(|pair| LinearConfig::new(pair[0], pair[1]).init(device))
            .collect();
        Ok(Self {
            linears,
            activation: Tanh::new(),
            input_mean: constant(Tensor::zeros([1, 3], device)),
            input_scale: constant(Tensor::ones([1, 3], device)),
        })
    }

    /// 入力の標準化に使う平均と幅を設定します。幅が 0 に近い列は 1 にします。
    pub fn with_input_normalization(mut self, mean: [f32; 3], scale: [f32; 3]) -> Self {
        let device = self.input_mean.device();
        let scale = scale.map(|s| if s.is_finite() && s > 1e-8 { s } else { 1.0 });
        self.input_mean = constant(Tensor::<B, 1>::from_floats(mean, &device).reshape([1, 3]));
        self.input_scale = constant(Tensor::<B, 1>::from_floats(scale, &device).reshape([1, 3]));
        self
    }

    /// 各層の幅。入力 3 から出力 4 まで。
    pub fn layer_widths(&self) -> Vec<usize> {
        let mut widths = Vec::with_capacity(self.linears.len() + 1);
        if let Some(first) = self.linears.first() {
            widths.push(first.weight.dims()[0]);
        }
        widths.extend(self.linears.iter().map(|linear| linear.weight.dims()[1]));
        widths
    }

    /// 座標 `[n, 3]` から `[n, 4]` への順伝播を実行します。
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = self.standardize(input);
        let (last, hidden) = self.split_layers();
        for linear in hidden {
            x = linear.forward(x);
            x = self.activation.forward(x);
        }
        last.forward(x)
    }

    /// データブランチ: 同じ重みで (c, u, v, p) を評価します。
    pub fn evaluate(
        &self,
        t: Tensor<B, 2>,
        x: Tensor<B, 2>,
        y: Tensor<B, 2>,
    ) -> Result<FlowFields<B>> {
        let input = columns_to_input(t, x, y)?;
        let output = self.forward(input);
        let [n, _] = output.dims();
        let take = |k: usize| output.clone().slice([0..n, k..k + 1]);
        Ok(FlowFields {
            c: take(0),
            u: take(1),
            v: take(2),
            p: take(3),
        })
    }

    /// 方程式ブランチ: 同じ重みで出力と入力に関する偏微分を評価します。
    pub fn evaluate_with_derivatives(
        &self,
        t: Tensor<B, 2>,
        x: Tensor<B, 2>,
        y: Tensor<B, 2>,
    ) -> Result<FlowJet<B>> {
        let input = columns_to_input(t, x, y)?;
        let mut jet = Jet::seed(self.standardize(input), self.input_scale.val());
        let (last, hidden) = self.split_layers();
        for linear in hidden {
            jet = jet.linear(linear).tanh(&self.activation);
        }
        Ok(FlowJet::from_output(&jet.linear(last)))
    }

    fn standardize(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        (input - self.input_mean.val()) / self.input_scale.val()
    }

    fn split_layers(&self) -> (&Linear<B>, &[Linear<B>]) {
        // validate_layers により少なくとも 1 層ある
        self.linears
            .split_last()
            .expect("FlowNet always holds at least one layer")
    }
}

fn constant<B: Backend>(tensor: Tensor<B, 2>) -> Param<Tensor<B, 2>> {
    Param::from_tensor(tensor).set_require_grad(false)
}

/// 3 本の `[n, 1]` 列を `[n, 3]` にまとめます。長さや形が揃っていなければエラー。
fn columns_to_input<B: Backend>(
    t: Tensor<B, 2>,
    x: Tensor<B, 2>,
    y: Tensor<B, 2>,
) -> Result<Tensor<B, 2>> {
    let (dt, dx, dy) = (t.dims(), x.dims(), y.dims());
    if dt[1] != 1 || dx[1] != 1 || dy[1] != 1 {
        return Err(PinnError::ShapeMismatch(format!(
            "t, x, y は列ベクトルである必要があります: {dt:?}, {dx:?}, {dy:?}"
        )));
    }
    if dt[0] != dx[0] || dt[0] != dy[0] {
        return Err(PinnError::ShapeMismatch(format!(
            "t, x, y の長さが違います: {}, {}, {}",
            dt[0], dx[0], dy[0]
        )));
    }
    Ok(Tensor::cat(vec![t, x, y], 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f64>;

    fn column(values: &[f64]) -> Tensor<TestBackend, 2> {
        Tensor::from_data(
            TensorData::new(values.to_vec(), [values.len(), 1]),
            &Default::default(),
        )
    }

    fn values(tensor: Tensor<TestBackend, 2>) -> Vec<f64> {
        tensor.into_data().convert::<f64>().to_vec::<f64>().unwrap()
    }

    fn network() -> FlowNet<TestBackend> {
        FlowNet::new(&[3, 6, 6, 4], &Default::default())
            .unwrap()
            .with_input_normalization([0.5, 1.0, -0.5], [0.3, 2.0, 1.5])
    }

    #[test]
    fn rejects_invalid_layer_widths() {
        let device = Default::default();
        assert!(matches!(
            FlowNet::<TestBackend>::new(&[2, 8, 4], &device),
            Err(PinnError::Configuration(_))
        ));
        assert!(matches!(
            FlowNet::<TestBackend>::new(&[3, 8, 5], &device),
            Err(PinnError::Configuration(_))
        ));
    }

    #[test]
    fn reports_layer_widths() {
        assert_eq!(network().layer_widths(), vec![3, 6, 6, 4]);
    }

    #[test]
    fn evaluate_rejects_mismatched_lengths() {
        let net = network();
        let result = net.evaluate(column(&[0.0, 1.0]), column(&[0.0]), column(&[0.0, 1.0]));
        assert!(matches!(result, Err(PinnError::ShapeMismatch(_))));
    }

    #[test]
    fn evaluate_returns_one_column_per_field() {
        let net = network();
        let fields = net
            .evaluate(column(&[0.0, 0.5, 1.0]), column(&[1.0, 2.0, 3.0]), column(&[0.0; 3]))
            .unwrap();
        for field in [fields.c, fields.u, fields.v, fields.p] {
            assert_eq!(field.dims(), [3, 1]);
        }
    }

    #[test]
    fn both_branches_share_the_same_weights() {
        let net = network();
        let (t, x, y) = (&[0.1, 0.7], &[1.3, -0.2], &[0.4, 0.9]);
        let fields = net.evaluate(column(t), column(x), column(y)).unwrap();
        let jet = net
            .evaluate_with_derivatives(column(t), column(x), column(y))
            .unwrap();
        for (a, b) in values(fields.p).iter().zip(values(jet.p.value)) {
            assert_abs_diff_eq!(*a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn derivatives_match_central_differences() {
        let net = network();
        let (t0, x0, y0) = (0.3, 0.8, -0.4);
        let jet = net
            .evaluate_with_derivatives(column(&[t0]), column(&[x0]), column(&[y0]))
            .unwrap();

        let u_at = |t: f64, x: f64, y: f64| {
            values(net.evaluate(column(&[t]), column(&[x]), column(&[y])).unwrap().u)[0]
        };
        let h = 1e-4;
        let u_t = (u_at(t0 + h, x0, y0) - u_at(t0 - h, x0, y0)) / (2.0 * h);
        let u_x = (u_at(t0, x0 + h, y0) - u_at(t0, x0 - h, y0)) / (2.0 * h);
        let u_y = (u_at(t0, x0, y0 + h) - u_at(t0, x0, y0 - h)) / (2.0 * h);

        let h2 = 1e-3;
        let centre = u_at(t0, x0, y0);
        let u_xx = (u_at(t0, x0 + h2, y0) - 2.0 * centre + u_at(t0, x0 - h2, y0)) / (h2 * h2);
        let u_yy = (u_at(t0, x0, y0 + h2) - 2.0 * centre + u_at(t0, x0, y0 - h2)) / (h2 * h2);

        assert_abs_diff_eq!(values(jet.u.t)[0], u_t, epsilon = 1e-6);
        assert_abs_diff_eq!(values(jet.u.x)[0], u_x, epsilon = 1e-6);
        assert_abs_diff_eq!(values(jet.u.y)[0], u_y, epsilon = 1e-6);
        assert_abs_diff_eq!(values(jet.u.xx)[0], u_xx, epsilon = 1e-4);
        assert_abs_diff_eq!(values(jet.u.yy)[0], u_yy, epsilon = 1e-4);
    }
}
