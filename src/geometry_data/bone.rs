use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct RawBoneData {
    pub name: String,

    pub parent: Option<String>,

    pub pivot: Option<[f32; 3]>,

    pub rotation: Option<[f32; 3]>,

    #[serde(default)]
    pub mirror: bool,

    pub inflate: Option<f32>,

    #[serde(default)]
    pub cubes: Vec<super::cube::RawCubeData>,
}
