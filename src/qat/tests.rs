//! Tests for the QAT wrapper

use super::*;
use crate::error::Error;
use crate::observer::{FixedQParamsObserver, QParams};
use crate::quant::learnable::PerTensorFakeQuantize;
use crate::quant::range::{QuantDtype, QuantRange};
use approx::assert_abs_diff_eq;
use ndarray::{arr1, arr2, ArrayD};
use std::collections::BTreeMap;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

fn scenario_input() -> ArrayD<f32> {
    arr1(&[0.0f32, 0.4, 0.6, 1.0]).into_dyn()
}

/// Per-tensor module on [0, 3] whose observer always proposes (0.5, 0).
fn per_tensor_module(mode: FakeQuantMode) -> LearnableFakeQuantize {
    let config = LearnableFakeQuantConfig::new()
        .with_range(0, 3)
        .with_qparams(1.0, 2.0)
        .with_mode(mode);
    let observer = FixedQParamsObserver::per_tensor(0.5, 0.0, QuantDtype::QUInt8);
    LearnableFakeQuantize::new(config, Box::new(observer)).unwrap()
}

fn per_channel_module(mode: FakeQuantMode) -> LearnableFakeQuantize {
    let config = LearnableFakeQuantConfig::new()
        .with_range(0, 3)
        .with_channel_len(2)
        .with_mode(mode);
    let observer =
        FixedQParamsObserver::per_channel(vec![0.5, 2.0], vec![0.0, 1.0], 0, QuantDtype::QUInt8)
            .unwrap();
    LearnableFakeQuantize::new(config, Box::new(observer)).unwrap()
}

// ========================================================================
// CONSTRUCTION
// ========================================================================

#[test]
fn test_default_module() {
    let observer = FixedQParamsObserver::per_tensor(0.1, 0.0, QuantDtype::QUInt8);
    let fq = LearnableFakeQuantize::new(LearnableFakeQuantConfig::default(), Box::new(observer))
        .unwrap();
    assert_eq!(fq.scale().as_slice().unwrap(), &[1.0]);
    assert_eq!(fq.zero_point().as_slice().unwrap(), &[0.0]);
    assert_eq!(fq.range(), QuantRange::new(0, 255).unwrap());
    assert_eq!(fq.bitwidth(), 8);
    assert_eq!(fq.mode(), FakeQuantMode::StaticEstimate);
    assert!(!fq.is_learning());
}

#[test]
fn test_per_channel_parameters_replicated() {
    let fq = per_channel_module(FakeQuantMode::Learning);
    assert_eq!(fq.scale().as_slice().unwrap(), &[1.0, 1.0]);
    assert_eq!(fq.zero_point().len(), 2);
    assert_eq!(fq.qscheme().channel_axis(), Some(0));
    assert_eq!(fq.bitwidth(), 2);
}

#[test]
fn test_rejects_inverted_range() {
    let config = LearnableFakeQuantConfig::new().with_range(5, 5);
    let observer = FixedQParamsObserver::per_tensor(1.0, 0.0, QuantDtype::QUInt8);
    let err = LearnableFakeQuantize::new(config, Box::new(observer)).unwrap_err();
    assert!(matches!(err, Error::InvalidQuantRange { qmin: 5, qmax: 5 }));
}

#[test]
fn test_rejects_zero_channel_len() {
    let config = LearnableFakeQuantConfig::new().with_channel_len(0);
    let observer =
        FixedQParamsObserver::per_channel(vec![1.0], vec![0.0], 0, QuantDtype::QUInt8).unwrap();
    let err = LearnableFakeQuantize::new(config, Box::new(observer)).unwrap_err();
    assert!(matches!(err, Error::InvalidChannelLen(0)));
}

#[test]
fn test_rejects_range_outside_dtype() {
    let config = LearnableFakeQuantConfig::new().with_range(-1, 255);
    let observer = FixedQParamsObserver::per_tensor(1.0, 0.0, QuantDtype::QUInt8);
    let err = LearnableFakeQuantize::new(config, Box::new(observer)).unwrap_err();
    assert!(matches!(err, Error::QuantRangeOutOfBounds { qmin: -1, .. }));

    let config = LearnableFakeQuantConfig::new().with_range(-128, 127);
    let observer = FixedQParamsObserver::per_tensor(1.0, 0.0, QuantDtype::QInt8);
    assert!(LearnableFakeQuantize::new(config, Box::new(observer)).is_ok());
}

#[test]
fn test_rejects_channel_len_scheme_disagreement() {
    let config = LearnableFakeQuantConfig::new().with_channel_len(4);
    let observer = FixedQParamsObserver::per_tensor(1.0, 0.0, QuantDtype::QUInt8);
    let err = LearnableFakeQuantize::new(config, Box::new(observer)).unwrap_err();
    assert!(matches!(err, Error::SchemeMismatch(_)));

    let config = LearnableFakeQuantConfig::new();
    let observer =
        FixedQParamsObserver::per_channel(vec![1.0, 1.0], vec![0.0, 0.0], 0, QuantDtype::QUInt8)
            .unwrap();
    let err = LearnableFakeQuantize::new(config, Box::new(observer)).unwrap_err();
    assert!(matches!(err, Error::SchemeMismatch(_)));
}

#[test]
fn test_rejects_non_positive_initial_scale() {
    let config = LearnableFakeQuantConfig::new().with_qparams(0.0, 0.0);
    let err = config.validate().unwrap_err();
    assert!(err.is_config_error());
}

// ========================================================================
// MODES
// ========================================================================

#[test]
fn test_mode_transitions() {
    let mut fq = per_tensor_module(FakeQuantMode::Disabled);
    fq.enable_param_learning();
    assert_eq!(fq.mode(), FakeQuantMode::Learning);
    assert!(fq.is_learning());
    fq.enable_static_observation();
    assert_eq!(fq.mode(), FakeQuantMode::StaticObservation);
    fq.enable_static_estimate().disable();
    assert_eq!(fq.mode(), FakeQuantMode::Disabled);
    assert!(!fq.is_learning());
}

#[test]
fn test_static_estimate_copies_and_quantizes() {
    let mut fq = per_tensor_module(FakeQuantMode::StaticEstimate);
    let out = fq.forward(&scenario_input()).unwrap();

    assert_eq!(fq.scale().as_slice().unwrap(), &[0.5]);
    assert_eq!(fq.zero_point().as_slice().unwrap(), &[0.0]);
    assert!(matches!(out, FakeQuantOutput::Quantized(_)));
    assert_eq!(out.output().as_slice().unwrap(), &[0.0, 0.5, 0.5, 1.0]);
    assert!(out.into_call().is_none());
}

#[test]
fn test_static_observation_copies_but_passes_through() {
    let mut fq = per_tensor_module(FakeQuantMode::StaticObservation);
    let x = scenario_input();
    let out = fq.forward(&x).unwrap();

    assert_eq!(fq.scale().as_slice().unwrap(), &[0.5]);
    assert!(matches!(out, FakeQuantOutput::Passthrough(_)));
    assert_eq!(out.into_output(), x);
}

#[test]
fn test_disabled_keeps_parameters_and_passes_through() {
    let mut fq = per_tensor_module(FakeQuantMode::Disabled);
    let x = scenario_input();
    let out = fq.forward(&x).unwrap();

    assert_eq!(fq.scale().as_slice().unwrap(), &[1.0]);
    assert_eq!(fq.zero_point().as_slice().unwrap(), &[2.0]);
    assert_eq!(out.output(), &x);
}

#[test]
fn test_learning_uses_own_parameters() {
    let mut fq = per_tensor_module(FakeQuantMode::Learning);
    {
        let params = fq.parameters_mut();
        params.scale[0] = 0.5;
        params.zero_point[0] = 0.2;
    }
    let x = scenario_input();
    let out = fq.forward(&x).unwrap();

    // The observer's (0.5, 0) is not copied in learning mode
    assert_eq!(fq.zero_point().as_slice().unwrap(), &[0.2]);
    assert_eq!(out.output().as_slice().unwrap(), &[0.0, 0.5, 0.5, 1.0]);

    let call = out.into_call().unwrap();
    assert_eq!(call.channel_axis(), None);
    let grads = call.backward(&ArrayD::ones(x.raw_dim())).unwrap();
    assert_eq!(grads.grad_input.as_slice().unwrap(), &[1.0, 1.0, 1.0, 1.0]);
    assert_abs_diff_eq!(grads.grad_zero_point[0], -0.5, epsilon = 1e-6);
}

#[test]
fn test_learning_with_element_count_grad_scaling() {
    let mut fq = per_tensor_module(FakeQuantMode::Learning);
    fq.set_grad_scaling(GradScaling::ElementCount);
    fq.parameters_mut().scale[0] = 0.5;
    fq.parameters_mut().zero_point[0] = 0.0;

    let x = scenario_input();
    let grads = fq
        .forward(&x)
        .unwrap()
        .into_call()
        .unwrap()
        .backward(&ArrayD::ones(x.raw_dim()))
        .unwrap();

    let factor = 1.0 / (4.0f32 * 3.0).sqrt();
    assert_abs_diff_eq!(grads.grad_zero_point[0], -0.5 * factor, epsilon = 1e-6);

    let direct = PerTensorFakeQuantize::new(fq.range(), factor)
        .forward(&x, 0.5, 0.0)
        .backward(&ArrayD::ones(x.raw_dim()))
        .unwrap();
    assert_eq!(grads.grad_input, direct.grad_input);
    assert_abs_diff_eq!(grads.grad_scale[0], direct.grad_scale[0], epsilon = 1e-6);
    assert_abs_diff_eq!(grads.grad_zero_point[0], direct.grad_zero_point[0], epsilon = 1e-6);
}

#[test]
fn test_per_channel_static_estimate() {
    let mut fq = per_channel_module(FakeQuantMode::StaticEstimate);
    let x = arr2(&[[0.0f32, 0.4, 0.6], [0.0, 2.0, 9.0]]).into_dyn();
    let out = fq.forward(&x).unwrap();

    assert_eq!(fq.scale().as_slice().unwrap(), &[0.5, 2.0]);
    // row 1: codes 1, 2, 6 -> clamp 3; (q - 1) * 2
    assert_eq!(out.output().as_slice().unwrap(), &[0.0, 0.5, 0.5, 0.0, 2.0, 4.0]);
}

#[test]
fn test_per_channel_learning_returns_channel_call() {
    let mut fq = per_channel_module(FakeQuantMode::Learning);
    let x = arr2(&[[0.0f32, 0.4], [1.0, 2.0]]).into_dyn();
    let call = fq.forward(&x).unwrap().into_call().unwrap();
    assert_eq!(call.channel_axis(), Some(0));

    let grads = call.backward(&ArrayD::ones(x.raw_dim())).unwrap();
    assert_eq!(grads.grad_scale.len(), 2);
    assert_eq!(grads.grad_zero_point.len(), 2);
}

#[test]
fn test_per_channel_forward_rejects_wrong_channel_count() {
    let mut fq = per_channel_module(FakeQuantMode::StaticEstimate);
    let x = ArrayD::<f32>::zeros(ndarray::IxDyn(&[3, 2]));
    let err = fq.forward(&x).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { what: "scale", .. }));
}

#[test]
fn test_set_qparams_broadcast_and_mismatch() {
    let mut fq = per_channel_module(FakeQuantMode::Disabled);
    fq.set_qparams(&QParams::per_tensor(0.25, 1.0)).unwrap();
    assert_eq!(fq.scale().as_slice().unwrap(), &[0.25, 0.25]);
    assert_eq!(fq.zero_point().as_slice().unwrap(), &[1.0, 1.0]);

    let three = QParams {
        scale: arr1(&[1.0, 1.0, 1.0]),
        zero_point: arr1(&[0.0, 0.0, 0.0]),
    };
    let err = fq.set_qparams(&three).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { what: "scale", .. }));
    assert_eq!(fq.scale().as_slice().unwrap(), &[0.25, 0.25]);
}

#[test]
fn test_calculate_qparams_delegates() {
    let fq = per_tensor_module(FakeQuantMode::Disabled);
    assert_eq!(fq.calculate_qparams(), QParams::per_tensor(0.5, 0.0));
    fq.log_quant_params();
    assert!(format!("{fq:?}").contains("LearnableFakeQuantize"));
}

// ========================================================================
// PERSISTENCE
// ========================================================================

#[test]
fn test_state_dict_keys() {
    let fq = per_channel_module(FakeQuantMode::Learning);
    let state = fq.state_dict("layer1.act.");
    let keys: Vec<_> = state.keys().cloned().collect();
    assert_eq!(keys, vec!["layer1.act.scale", "layer1.act.zero_point"]);
    assert_eq!(state["layer1.act.scale"], vec![1.0, 1.0]);
}

#[test]
fn test_state_dict_round_trip() {
    let mut src = per_channel_module(FakeQuantMode::Learning);
    src.parameters_mut().scale.assign(&arr1(&[0.3, 0.7]));
    src.parameters_mut().zero_point.assign(&arr1(&[1.4, 2.0]));
    let state = src.state_dict("fq.");

    let mut dst = per_channel_module(FakeQuantMode::Learning);
    let missing = dst.load_state_dict(&state, "fq.", true).unwrap();
    assert!(missing.is_empty());
    assert_eq!(dst.scale(), src.scale());
    assert_eq!(dst.zero_point(), src.zero_point());
}

#[test]
fn test_load_state_dict_missing_keys() {
    let mut fq = per_tensor_module(FakeQuantMode::Learning);
    let mut state = BTreeMap::new();
    state.insert("scale".to_string(), vec![0.125]);

    let err = fq.load_state_dict(&state, "", true).unwrap_err();
    assert!(matches!(err, Error::MissingStateKeys(ref keys) if keys == &["zero_point".to_string()]));
    assert_eq!(fq.scale().as_slice().unwrap(), &[1.0]);

    let missing = fq.load_state_dict(&state, "", false).unwrap();
    assert_eq!(missing, vec!["zero_point".to_string()]);
    assert_eq!(fq.scale().as_slice().unwrap(), &[0.125]);
    assert_eq!(fq.zero_point().as_slice().unwrap(), &[2.0]);
}

#[test]
fn test_load_state_dict_length_mismatch() {
    let mut fq = per_channel_module(FakeQuantMode::Learning);
    let mut state = BTreeMap::new();
    state.insert("scale".to_string(), vec![0.5]);
    state.insert("zero_point".to_string(), vec![0.0, 0.0]);

    let err = fq.load_state_dict(&state, "", false).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { what: "scale", .. }));
}

#[test]
fn test_save_load_qparams_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("qparams.json");

    let mut src = per_channel_module(FakeQuantMode::Learning);
    src.parameters_mut().scale.assign(&arr1(&[0.05, 0.5]));
    src.save_qparams(&path).unwrap();

    let mut dst = per_channel_module(FakeQuantMode::Learning);
    dst.load_qparams(&path).unwrap();
    assert_eq!(dst.qparam_state(), src.qparam_state());

    let mut per_tensor = per_tensor_module(FakeQuantMode::Learning);
    let err = per_tensor.load_qparams(&path).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
}

#[test]
fn test_load_qparams_errors() {
    let dir = TempDir::new().unwrap();
    let mut fq = per_tensor_module(FakeQuantMode::Learning);

    let err = fq.load_qparams(dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));

    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, "{ not json").unwrap();
    let err = fq.load_qparams(&bad).unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
}

// ========================================================================
// YAML CONFIG
// ========================================================================

#[test]
fn test_yaml_full_config() {
    let yaml = r#"
quant_min: 0
quant_max: 15
scale: 0.1
zero_point: 2.0
channel_len: 16
grad_scaling: element_count
mode: learning
"#;
    let config = LearnableFakeQuantConfig::from_yaml_str(yaml).unwrap();
    assert_eq!(config.quant_max, 15);
    assert_eq!(config.channel_len, Some(16));
    assert_eq!(config.grad_scaling, GradScaling::ElementCount);
    assert_eq!(config.mode, FakeQuantMode::Learning);
    assert_eq!(config.range().unwrap().bitwidth(), 4);
}

#[test]
fn test_yaml_defaults() {
    let config = LearnableFakeQuantConfig::from_yaml_str("quant_max: 127").unwrap();
    assert_eq!(config.quant_min, 0);
    assert_eq!(config.quant_max, 127);
    assert_eq!(config.scale, 1.0);
    assert_eq!(config.channel_len, None);
    assert_eq!(config.mode, FakeQuantMode::StaticEstimate);
    assert_eq!(config.grad_scaling, GradScaling::Disabled);
}

#[test]
fn test_yaml_rejects_unknown_field_and_bad_range() {
    let err = LearnableFakeQuantConfig::from_yaml_str("quant_bits: 8").unwrap_err();
    assert!(matches!(err, Error::Config(_)));

    let err = LearnableFakeQuantConfig::from_yaml_str("quant_min: 10\nquant_max: 3").unwrap_err();
    assert!(matches!(err, Error::InvalidQuantRange { qmin: 10, qmax: 3 }));
}

#[test]
fn test_yaml_file_round_trip() {
    let config = LearnableFakeQuantConfig::new()
        .with_range(-8, 7)
        .with_qparams(0.02, 0.0)
        .with_grad_scaling(GradScaling::Fixed(0.5))
        .with_mode(FakeQuantMode::Learning);

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(config.to_yaml().unwrap().as_bytes()).unwrap();
    file.flush().unwrap();

    let loaded = LearnableFakeQuantConfig::from_yaml_file(file.path()).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_yaml_file_missing() {
    let err = LearnableFakeQuantConfig::from_yaml_file("/nonexistent/fq.yaml").unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg.contains("Failed to read config file")));
}
