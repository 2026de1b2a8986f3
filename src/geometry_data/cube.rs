use serde::Deserialize;
use std::collections::HashMap;

/// Per-cube `mirror`, `rotation`, `pivot` and `inflate` stay optional:
/// whether a field was written at all decides how the bone-level value is
/// inherited, so a plain default would lose information.
#[derive(Clone, Deserialize, Debug)]
pub struct RawCubeData {
    pub origin: Option<[f32; 3]>,

    pub size: Option<[f32; 3]>,

    pub uv: Option<RawCubeUv>,

    pub rotation: Option<[f32; 3]>,

    pub pivot: Option<[f32; 3]>,

    pub mirror: Option<bool>,

    pub inflate: Option<f32>,
}

/// Either the single box-unwrap start coordinate or an explicit per-face map
/// keyed by west/east/down/up/north/south.
#[derive(Clone, Deserialize, Debug)]
#[serde(untagged)]
pub enum RawCubeUv {
    BoxStart([f32; 2]),
    PerFace(HashMap<String, RawFaceUv>),
}

#[derive(Clone, Deserialize, Debug)]
pub struct RawFaceUv {
    #[serde(default)]
    pub uv: [f32; 2],

    #[serde(default)]
    pub uv_size: [f32; 2],
}
