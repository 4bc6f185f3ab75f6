//! Feature extraction transforms

use super::Transform;
use crate::frame::Frame;
use crate::{Error, Result};
use serde_json::{json, Value};

/// Left-join every further input onto the first by index.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinFeatures;

impl Transform for JoinFeatures {
    fn name(&self) -> &'static str {
        "JoinFeatures"
    }

    fn params(&self) -> Value {
        json!({})
    }

    fn apply(&self, inputs: &[&Frame]) -> Result<Vec<Frame>> {
        let Some((first, rest)) = inputs.split_first() else {
            return Err(Error::InvalidInput("JoinFeatures needs at least one input".to_string()));
        };
        let joined = rest
            .iter()
            .try_fold((*first).clone(), |joined, frame| joined.join(frame))?;
        Ok(vec![joined])
    }
}
