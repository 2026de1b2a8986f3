use crate::error::Result;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Clone, Deserialize, Debug)]
pub struct RawAnimationFile {
    pub format_version: Option<String>,

    #[serde(default)]
    pub animations: HashMap<String, RawAnimationData>,
}

impl RawAnimationFile {
    pub fn parse(raw_bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw_bytes)?)
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct RawAnimationData {
    #[serde(rename = "loop")]
    #[serde(default)]
    pub looping: bool,

    pub animation_length: Option<f32>,

    #[serde(default)]
    pub bones: HashMap<String, RawBoneChannels>,
}

#[derive(Clone, Deserialize, Debug)]
pub struct RawBoneChannels {
    pub position: Option<RawChannelValue>,

    pub rotation: Option<RawChannelValue>,

    pub scale: Option<RawChannelValue>,
}

/// The three channel shapes of the animation format: one value broadcast to
/// all axes, three independent per-axis values, or a time-keyed table.
#[derive(Clone, Deserialize, Debug)]
#[serde(untagged)]
pub enum RawChannelValue {
    Uniform(RawChannelScalar),
    PerAxis([RawChannelScalar; 3]),
    Keyed(HashMap<String, RawKeyframe>),
}

/// A single channel component: a literal number or a formula string handed
/// to the host's numeric evaluator.
#[derive(Clone, Deserialize, Debug)]
#[serde(untagged)]
pub enum RawChannelScalar {
    Number(f32),
    Formula(String),
}

/// A keyed-table entry: a bare vector, or the `{"post": …}` form used for
/// step discontinuities. `post` is the effective value either way.
#[derive(Clone, Deserialize, Debug)]
#[serde(untagged)]
pub enum RawKeyframe {
    Vector([RawChannelScalar; 3]),
    Post { post: [RawChannelScalar; 3] },
}
