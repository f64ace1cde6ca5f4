use approx::assert_abs_diff_eq;
use cnn_infer::layer::{flatten, relu, softmax, Conv2d, MaxPool2d};
use cnn_infer::{Error, ExecutionMode, Layer, Tensor};

fn run(layer: &mut Layer, input: Tensor) -> Tensor {
    layer.set_input(input);
    layer.forward(ExecutionMode::Sequential).unwrap();
    layer.output().unwrap().clone()
}

#[test]
fn test_conv2d_all_ones_example() {
    let mut layer = Layer::conv2d(1, 1, 2, 1, 0).unwrap();
    layer
        .set_parameters(Tensor::filled([1, 1, 2, 2], 1.0), Tensor::new(1, 1, 1, 1))
        .unwrap();

    let out = run(&mut layer, Tensor::filled([1, 1, 3, 3], 1.0));

    assert_eq!(out.shape(), [1, 1, 2, 2]);
    assert_eq!(out.data(), &[4.0, 4.0, 4.0, 4.0]);
}

#[test]
fn test_conv2d_output_shape_rule() {
    for &(in_h, in_w, k, s, p) in &[
        (28, 28, 5, 1, 2),
        (28, 28, 3, 2, 0),
        (7, 9, 3, 2, 1),
        (10, 4, 4, 3, 0),
        (5, 5, 5, 1, 0),
        (32, 17, 7, 4, 3),
    ] {
        let conv = Conv2d::new(3, 8, k, s, p).unwrap();
        let shape = conv.output_shape([2, 3, in_h, in_w]).unwrap();
        assert_eq!(shape, [2, 8, (in_h + 2 * p - k) / s + 1, (in_w + 2 * p - k) / s + 1]);
    }
}

#[test]
fn test_conv2d_input_channel_mismatch() {
    let mut layer = Layer::conv2d(3, 4, 3, 1, 1).unwrap();
    layer.randomize(1).unwrap();
    layer.set_input(Tensor::new(1, 1, 8, 8));

    let err = layer.forward(ExecutionMode::Sequential).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch(_)));
}

#[test]
fn test_zero_stride_is_configuration_error() {
    assert!(matches!(Layer::conv2d(1, 1, 3, 0, 0), Err(Error::Configuration(_))));
    assert!(matches!(Layer::max_pool2d(2, 0, 0), Err(Error::Configuration(_))));
    assert!(matches!(Layer::linear(0, 3), Err(Error::Configuration(_))));
}

#[test]
fn test_max_pool_example() {
    let mut layer = Layer::max_pool2d(2, 2, 0).unwrap();
    let out = run(&mut layer, Tensor::from_vec([1, 1, 2, 2], vec![1.0, 3.0, 2.0, 4.0]).unwrap());

    assert_eq!(out.shape(), [1, 1, 1, 1]);
    assert_eq!(out.data(), &[4.0]);
}

#[test]
fn test_max_pool_all_negative() {
    let pool = MaxPool2d::new(3, 1, 0).unwrap();
    let input = Tensor::from_fn([2, 3, 3, 3], ExecutionMode::Sequential, |n, c, h, w| {
        -1.0 - (n + c + h + w) as f32
    });
    let out = pool.forward(&input, ExecutionMode::Sequential);

    assert_eq!(out.shape(), [2, 3, 1, 1]);
    assert_eq!(out.data(), &[-1.0, -2.0, -3.0, -2.0, -3.0, -4.0]);
}

#[test]
fn test_relu_is_idempotent() {
    let input = Tensor::random([2, 3, 4, 5], 9);
    let once = relu::forward(&input, ExecutionMode::Sequential);
    let twice = relu::forward(&once, ExecutionMode::Sequential);

    assert_eq!(once, twice);
    assert!(once.data().iter().all(|&v| v >= 0.0));
}

#[test]
fn test_softmax_is_a_distribution() {
    let input = Tensor::random([1, 1, 10, 1], 5);
    let out = softmax::forward(&input, ExecutionMode::Sequential).unwrap();

    assert_eq!(out.shape(), [1, 1, 10, 1]);
    assert!(out.data().iter().all(|&p| p >= 0.0));
    let total: f64 = out.data().iter().map(|&p| f64::from(p)).sum();
    assert_abs_diff_eq!(total, 1.0, epsilon = 1e-6);
}

#[test]
fn test_softmax_shift_invariance() {
    let values = vec![0.5, -1.25, 2.0, 0.0, 3.75];
    let shifted: Vec<f32> = values.iter().map(|v| v + 16.0).collect();

    let a = softmax::forward(&Tensor::from_vec([1, 1, 5, 1], values).unwrap(), ExecutionMode::Sequential).unwrap();
    let b = softmax::forward(&Tensor::from_vec([1, 1, 5, 1], shifted).unwrap(), ExecutionMode::Sequential).unwrap();

    for (x, y) in a.data().iter().zip(b.data()) {
        assert_abs_diff_eq!(*x, *y, epsilon = 1e-6);
    }
}

#[test]
fn test_softmax_known_values() {
    let input = Tensor::from_vec([1, 1, 2, 1], vec![0.0, 2.0f32.ln()]).unwrap();
    let out = softmax::forward(&input, ExecutionMode::Sequential).unwrap();

    // exp(0) : exp(ln 2) = 1 : 2
    assert_abs_diff_eq!(out.data()[0], 1.0 / 3.0, epsilon = 1e-6);
    assert_abs_diff_eq!(out.data()[1], 2.0 / 3.0, epsilon = 1e-6);
}

#[test]
fn test_flatten_roundtrip() {
    let input = Tensor::random([2, 3, 4, 5], 11);
    let flat = flatten::forward(&input).unwrap();

    assert_eq!(flat.shape(), [1, 1, 120, 1]);
    assert_eq!(flat.len(), input.len());

    let restored = flat.reshape(input.shape()).unwrap();
    let bits = |t: &Tensor| t.data().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&restored), bits(&input));
}

#[test]
fn test_linear_is_a_dot_product() {
    let mut layer = Layer::linear(4, 2).unwrap();
    layer
        .set_parameters(
            Tensor::from_vec([2, 4, 1, 1], vec![1.0, 2.0, 3.0, 4.0, -1.0, 0.0, 1.0, 0.0]).unwrap(),
            Tensor::from_vec([1, 2, 1, 1], vec![0.5, 0.0]).unwrap(),
        )
        .unwrap();

    let out = run(&mut layer, Tensor::from_vec([1, 1, 4, 1], vec![1.0, 1.0, 1.0, 1.0]).unwrap());

    assert_eq!(out.shape(), [1, 2, 1, 1]);
    assert_eq!(out.data(), &[10.5, 0.0]);
}

#[test]
fn test_parallel_matches_sequential() {
    let mut seq = Layer::conv2d(3, 5, 3, 2, 1).unwrap();
    seq.randomize(3).unwrap();
    let mut par = seq.clone();
    let input = Tensor::random([2, 3, 17, 13], 4);

    seq.set_input(input.clone());
    seq.forward(ExecutionMode::Sequential).unwrap();
    par.set_input(input);
    par.forward(ExecutionMode::Parallel).unwrap();

    assert_eq!(seq.output(), par.output());
}
