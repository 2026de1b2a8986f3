pub mod bone;
pub mod cube;

use crate::error::Result;
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct RawGeometryFile {
    pub format_version: Option<String>,

    #[serde(rename = "minecraft:geometry")]
    #[serde(default)]
    pub geometries: Vec<RawGeometryData>,
}

impl RawGeometryFile {
    pub fn parse(raw_bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw_bytes)?)
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct RawGeometryData {
    pub description: RawGeometryDescription,

    #[serde(default)]
    pub bones: Vec<bone::RawBoneData>,
}

#[derive(Clone, Deserialize, Debug)]
pub struct RawGeometryDescription {
    pub identifier: String,

    pub texture_width: Option<u32>,

    pub texture_height: Option<u32>,

    pub visible_bounds_width: Option<f32>,

    pub visible_bounds_height: Option<f32>,

    pub visible_bounds_offset: Option<[f32; 3]>,
}
