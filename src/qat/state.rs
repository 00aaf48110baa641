//! Persistence of the learnable parameters.
//!
//! Only scale and zero point are saved; mode, observer and configuration are
//! rebuilt by the caller.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::fake_quant::LearnableFakeQuantize;
use crate::error::{Error, Result};

const SCALE_KEY: &str = "scale";
const ZERO_POINT_KEY: &str = "zero_point";

/// Serialized form of the learnable parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QParamState {
    pub scale: Vec<f32>,
    pub zero_point: Vec<f32>,
}

impl LearnableFakeQuantize {
    /// Parameters keyed by `{prefix}scale` and `{prefix}zero_point`.
    pub fn state_dict(&self, prefix: &str) -> BTreeMap<String, Vec<f32>> {
        let mut state = BTreeMap::new();
        state.insert(format!("{prefix}{SCALE_KEY}"), self.scale().to_vec());
        state.insert(format!("{prefix}{ZERO_POINT_KEY}"), self.zero_point().to_vec());
        state
    }

    /// Load parameters saved by [`state_dict`](Self::state_dict).
    ///
    /// Returns the keys that were not found. With `strict` a missing key is
    /// an error instead. Nothing is modified unless every present entry has
    /// the module's channel count.
    pub fn load_state_dict(
        &mut self,
        state: &BTreeMap<String, Vec<f32>>,
        prefix: &str,
        strict: bool,
    ) -> Result<Vec<String>> {
        let len = self.scale().len();
        let mut missing = Vec::new();
        let mut loaded = [None, None];

        for (slot, name) in loaded.iter_mut().zip([SCALE_KEY, ZERO_POINT_KEY]) {
            let key = format!("{prefix}{name}");
            match state.get(&key) {
                Some(values) if values.len() == len => *slot = Some(Array1::from_vec(values.clone())),
                Some(values) => return Err(Error::shape_mismatch(name, &[len], &[values.len()])),
                None => missing.push(key),
            }
        }

        if strict && !missing.is_empty() {
            return Err(Error::MissingStateKeys(missing));
        }

        let [scale, zero_point] = loaded;
        let scale = scale.unwrap_or_else(|| self.scale().clone());
        let zero_point = zero_point.unwrap_or_else(|| self.zero_point().clone());
        self.replace_params(scale, zero_point);

        tracing::debug!(prefix, missing = ?missing, "loaded fake quantize state");
        Ok(missing)
    }

    /// Snapshot of the parameters.
    pub fn qparam_state(&self) -> QParamState {
        QParamState {
            scale: self.scale().to_vec(),
            zero_point: self.zero_point().to_vec(),
        }
    }

    /// Write the parameters to `path` as JSON.
    pub fn save_qparams<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.qparam_state())?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Read parameters written by [`save_qparams`](Self::save_qparams).
    pub fn load_qparams<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let json = fs::read_to_string(path)?;
        let state: QParamState = serde_json::from_str(&json)?;

        let len = self.scale().len();
        if state.scale.len() != len {
            return Err(Error::shape_mismatch("scale", &[len], &[state.scale.len()]));
        }
        if state.zero_point.len() != len {
            return Err(Error::shape_mismatch("zero_point", &[len], &[state.zero_point.len()]));
        }

        self.replace_params(Array1::from_vec(state.scale), Array1::from_vec(state.zero_point));
        Ok(())
    }
}
