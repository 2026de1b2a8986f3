use crate::animation_data::{
    RawAnimationData, RawChannelScalar, RawChannelValue, RawKeyframe,
};
use crate::error::{ModelError, Result};
use crate::geometry_data::bone::RawBoneData;
use crate::geometry_data::cube::{RawCubeData, RawCubeUv};
use crate::geometry_data::{RawGeometryData, RawGeometryFile};
use crate::shared_types::{bedrock_rotation, opt_vec3, vec3};
use indextree::Arena;
use log::{debug, warn};
use nalgebra::{Matrix4, Translation3, UnitQuaternion, Vector3};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Inward UV nudge, in texels, applied at the zero edge of each face axis so
/// texture filtering never samples the adjacent atlas region. Tuned for
/// nearest-neighbour sampling; adjust for a different sampling pipeline.
pub const UV_BLEED_MARGIN: f32 = 0.001;

struct CubeFace {
    name: &'static str,
    /// Box-unwrap anchor, in multiples of the face extents.
    base_uv: [u8; 2],
    normal: [f32; 3],
    /// Whether the horizontal/vertical UV extent of this face comes from the
    /// cube's depth rather than its width/height.
    u_from_depth: bool,
    v_from_depth: bool,
    /// Corner position offsets (x in half-widths, y/z in full extents) and
    /// the face-local UV corner each one maps to.
    corners: [([f32; 3], [f32; 2]); 4],
}

const CUBE_FACES: [CubeFace; 6] = [
    CubeFace {
        name: "west",
        base_uv: [2, 1],
        normal: [-1.0, 0.0, 0.0],
        u_from_depth: true,
        v_from_depth: false,
        corners: [
            ([-0.5, 1.0, 0.0], [0.0, 1.0]),
            ([-0.5, 0.0, 0.0], [0.0, 0.0]),
            ([-0.5, 1.0, 1.0], [1.0, 1.0]),
            ([-0.5, 0.0, 1.0], [1.0, 0.0]),
        ],
    },
    CubeFace {
        name: "east",
        base_uv: [0, 1],
        normal: [1.0, 0.0, 0.0],
        u_from_depth: true,
        v_from_depth: false,
        corners: [
            ([0.5, 1.0, 1.0], [0.0, 1.0]),
            ([0.5, 0.0, 1.0], [0.0, 0.0]),
            ([0.5, 1.0, 0.0], [1.0, 1.0]),
            ([0.5, 0.0, 0.0], [1.0, 0.0]),
        ],
    },
    CubeFace {
        name: "down",
        base_uv: [2, 0],
        normal: [0.0, -1.0, 0.0],
        u_from_depth: false,
        v_from_depth: true,
        corners: [
            ([0.5, 0.0, 1.0], [0.0, 1.0]),
            ([-0.5, 0.0, 1.0], [1.0, 1.0]),
            ([0.5, 0.0, 0.0], [0.0, 0.0]),
            ([-0.5, 0.0, 0.0], [1.0, 0.0]),
        ],
    },
    CubeFace {
        name: "up",
        base_uv: [1, 0],
        normal: [0.0, 1.0, 0.0],
        u_from_depth: false,
        v_from_depth: true,
        corners: [
            ([-0.5, 1.0, 1.0], [1.0, 1.0]),
            ([0.5, 1.0, 1.0], [0.0, 1.0]),
            ([-0.5, 1.0, 0.0], [1.0, 0.0]),
            ([0.5, 1.0, 0.0], [0.0, 0.0]),
        ],
    },
    CubeFace {
        name: "north",
        base_uv: [1, 1],
        normal: [0.0, 0.0, -1.0],
        u_from_depth: false,
        v_from_depth: false,
        corners: [
            ([-0.5, 0.0, 0.0], [1.0, 0.0]),
            ([0.5, 0.0, 0.0], [0.0, 0.0]),
            ([-0.5, 1.0, 0.0], [1.0, 1.0]),
            ([0.5, 1.0, 0.0], [0.0, 1.0]),
        ],
    },
    CubeFace {
        name: "south",
        base_uv: [3, 1],
        normal: [0.0, 0.0, 1.0],
        u_from_depth: false,
        v_from_depth: false,
        corners: [
            ([-0.5, 0.0, 1.0], [0.0, 0.0]),
            ([0.5, 0.0, 1.0], [1.0, 0.0]),
            ([-0.5, 1.0, 1.0], [0.0, 1.0]),
            ([0.5, 1.0, 1.0], [1.0, 1.0]),
        ],
    },
];

/// Pixel dimensions of the bound texture image. Only the size is read here;
/// decoding pixels for sampling is the renderer's business.
#[derive(Copy, Clone, Debug)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
}

impl TextureInfo {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn from_image_bytes(raw_bytes: &[u8]) -> Result<Self> {
        use image::GenericImageView;
        let img = image::load_from_memory(raw_bytes)?;
        let (width, height) = img.dimensions();
        Ok(Self { width, height })
    }
}

/// Flat vertex/index buffers for one cube: four unshared vertices and six
/// indices per emitted face, so every face keeps its own UV seam.
#[derive(Clone, Debug, Default)]
pub struct CubeMesh {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub uvs: Vec<f32>,
    pub indices: Vec<u16>,
}

impl CubeMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }
}

/// One cube of a bone: mesh buffers plus the local transform decomposition
/// (an offset node, an optional rotation about the cube pivot, the inflate
/// compensation scale, and the inner mesh offset used in the rotated form).
#[derive(Clone, Debug)]
pub struct CubeNode {
    pub name: String,
    pub mesh: CubeMesh,
    pub offset: Vector3<f32>,
    pub rotation: Option<UnitQuaternion<f32>>,
    pub scale: Vector3<f32>,
    pub mesh_offset: Vector3<f32>,
}

impl CubeNode {
    pub fn build(
        cube: &RawCubeData,
        bone: &RawBoneData,
        cube_index: usize,
        texture_size: [f32; 2],
        discrepancy: [f32; 2],
    ) -> Self {
        let size = cube.size.unwrap_or([0.0; 3]);
        let (width, height, depth) = (size[0], size[1], size[2]);
        let origin = opt_vec3(cube.origin);
        // A cube with its own rotation (or an explicit mirror) opts out of
        // the bone-level mirror.
        let mirror = if cube.mirror.is_none() && cube.rotation.is_none() {
            bone.mirror
        } else {
            cube.mirror.unwrap_or(false)
        };
        let inflate = cube.inflate.or(bone.inflate).unwrap_or(0.0);

        let [tex_w, tex_h] = texture_size;
        let [disc_w, disc_h] = discrepancy;
        let mut mesh = CubeMesh::default();

        for face in CUBE_FACES.iter() {
            let (uv_start, face_u, face_v, base_u, base_v, u_div, v_div) = match &cube.uv {
                Some(RawCubeUv::PerFace(map)) => {
                    let entry = match map.get(face.name) {
                        Some(entry) => entry,
                        None => {
                            // Authors omit faces on purpose to build open boxes.
                            debug!("cube face `{}` has no uv entry, omitted", face.name);
                            continue;
                        }
                    };
                    (
                        [entry.uv[0] * disc_w, entry.uv[1] * disc_h],
                        (entry.uv_size[0] * disc_w).floor(),
                        (entry.uv_size[1] * disc_h).floor(),
                        0.0,
                        0.0,
                        tex_w * disc_w,
                        tex_h * disc_h,
                    )
                }
                box_start => {
                    let start = match box_start {
                        Some(RawCubeUv::BoxStart(start)) => *start,
                        _ => [0.0, 0.0],
                    };
                    let [bu, bv] = face.base_uv;
                    let base_u = ((bu > 0) as u8 + (bu > 2) as u8) as f32 * depth.floor()
                        + ((bu > 1) as u8) as f32 * width.floor();
                    let base_v = bv as f32 * depth.floor();
                    let face_u = if face.u_from_depth { depth.floor() } else { width.floor() };
                    let face_v = if face.v_from_depth { depth.floor() } else { height.floor() };
                    (start, face_u, face_v, base_u, base_v, tex_w, tex_h)
                }
            };

            let first_vertex = mesh.vertex_count() as u16;
            for &(pos, corner_uv) in face.corners.iter() {
                let [ox, oy, oz] = pos;
                let x = (if mirror { -ox } else { ox }) * width;
                mesh.positions.extend_from_slice(&[x, oy * height, oz * depth]);
                mesh.normals.extend_from_slice(&face.normal);
                let [cu, cv] = corner_uv;
                let u_nudge = if cu == 0.0 { UV_BLEED_MARGIN } else { -UV_BLEED_MARGIN };
                let v_nudge = if cv == 0.0 { -UV_BLEED_MARGIN } else { UV_BLEED_MARGIN };
                let u = (uv_start[0] + base_u + cu * face_u + u_nudge) / u_div;
                let v = 1.0 - (uv_start[1] + base_v + face_v - cv * face_v + v_nudge) / v_div;
                mesh.uvs.extend_from_slice(&[u, v]);
            }
            mesh.indices.extend_from_slice(&[
                first_vertex,
                first_vertex + 1,
                first_vertex + 2,
                first_vertex + 2,
                first_vertex + 1,
                first_vertex + 3,
            ]);
        }

        let calculated_width = inflate * 2.0 + width;
        let (offset, rotation, mesh_offset) = match cube.rotation {
            Some(rotation) => {
                let pivot = cube.pivot.or(bone.pivot).unwrap_or([
                    calculated_width / 2.0,
                    height / 2.0,
                    depth / 2.0,
                ]);
                (
                    Vector3::new(-pivot[0], pivot[1], pivot[2]),
                    Some(bedrock_rotation(vec3(rotation))),
                    Vector3::new(
                        -origin.x - calculated_width / 2.0 + pivot[0] + inflate,
                        origin.y - pivot[1] - inflate,
                        origin.z - pivot[2] - inflate,
                    ),
                )
            }
            None => (
                Vector3::new(
                    -origin.x - calculated_width / 2.0 + inflate,
                    origin.y - inflate,
                    origin.z - inflate,
                ),
                None,
                Vector3::zeros(),
            ),
        };
        // Vertices span the uninflated extents; the node scale grows the cube
        // symmetrically about its center while outer faces stay aligned with
        // neighbouring cubes.
        let scale = if inflate != 0.0 {
            Vector3::new(
                if width != 0.0 { 1.0 + inflate / (width / 2.0) } else { 1.0 },
                if height != 0.0 { 1.0 + inflate / (height / 2.0) } else { 1.0 },
                if depth != 0.0 { 1.0 + inflate / (depth / 2.0) } else { 1.0 },
            )
        } else {
            Vector3::new(1.0, 1.0, 1.0)
        };

        Self {
            name: format!("#bone.{}#cube.{}", bone.name, cube_index),
            mesh,
            offset,
            rotation,
            scale,
            mesh_offset,
        }
    }

    pub fn local_matrix(&self) -> Matrix4<f32> {
        let mut matrix = Translation3::from(self.offset).to_homogeneous();
        if let Some(rotation) = &self.rotation {
            matrix *= rotation.to_homogeneous();
        }
        matrix *= Matrix4::new_nonuniform_scaling(&self.scale);
        matrix * Translation3::from(self.mesh_offset).to_homogeneous()
    }
}

/// Local transform of a bone's pivot node.
#[derive(Copy, Clone, Debug)]
pub struct NodeTransform {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3<f32>,
}

impl NodeTransform {
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn to_homogeneous(&self) -> Matrix4<f32> {
        Translation3::from(self.position).to_homogeneous()
            * self.rotation.to_homogeneous()
            * Matrix4::new_nonuniform_scaling(&self.scale)
    }
}

#[derive(Debug)]
pub struct BoneNode {
    pub name: String,
    parent_id: Option<usize>,
    /// Captured once at assembly; ticking always restarts from here, so
    /// animation never drifts the hierarchy.
    pub rest: NodeTransform,
    /// Counter-translation between the pivot node and its contents; children
    /// attach inside it so the parent pivot is not applied twice.
    inner_offset: Vector3<f32>,
    pub transform: NodeTransform,
    pub cubes: Vec<CubeNode>,
}

impl BoneNode {
    pub fn parent_id(&self) -> Option<usize> {
        self.parent_id
    }
}

/// Receives the assembled node tree, one cube at a time with its world
/// transform. The core never rasterizes, lights or samples textures.
pub trait DrawSurface {
    fn submit_triangles(&mut self, name: &str, transform: &Matrix4<f32>, mesh: &CubeMesh);
}

/// Injected capability for animation channels written as formula strings.
/// Only numeric literals are guaranteed to resolve inside this crate.
pub trait NumericEvaluator {
    fn evaluate_numeric(&self, expr: &str) -> Option<f32>;
}

pub struct LiteralEvaluator;

impl NumericEvaluator for LiteralEvaluator {
    fn evaluate_numeric(&self, expr: &str) -> Option<f32> {
        expr.trim().parse::<f32>().ok()
    }
}

#[derive(Clone, Debug)]
pub enum ChannelScalar {
    Literal(f32),
    Formula(String),
}

impl ChannelScalar {
    fn from_raw(raw: &RawChannelScalar) -> Self {
        match raw {
            RawChannelScalar::Number(value) => ChannelScalar::Literal(*value),
            RawChannelScalar::Formula(expr) => ChannelScalar::Formula(expr.clone()),
        }
    }

    fn resolve(&self, evaluator: &dyn NumericEvaluator) -> f32 {
        match self {
            ChannelScalar::Literal(value) => *value,
            ChannelScalar::Formula(expr) => match evaluator.evaluate_numeric(expr) {
                Some(value) => value,
                None => {
                    warn!("channel formula `{}` did not evaluate, using 0", expr);
                    0.0
                }
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct Keyframe {
    pub time: f32,
    pub value: [ChannelScalar; 3],
}

impl Keyframe {
    fn resolve(&self, evaluator: &dyn NumericEvaluator) -> Vector3<f32> {
        Vector3::new(
            self.value[0].resolve(evaluator),
            self.value[1].resolve(evaluator),
            self.value[2].resolve(evaluator),
        )
    }
}

/// A compiled animation channel: one of the three channel shapes, with keyed
/// tables sorted ascending by timestamp once at compile time.
#[derive(Clone, Debug)]
pub enum ChannelTrack {
    Uniform(ChannelScalar),
    PerAxis([ChannelScalar; 3]),
    Keyed(Vec<Keyframe>),
}

impl ChannelTrack {
    pub fn compile(raw: &RawChannelValue) -> Option<Self> {
        match raw {
            RawChannelValue::Uniform(scalar) => {
                Some(ChannelTrack::Uniform(ChannelScalar::from_raw(scalar)))
            }
            RawChannelValue::PerAxis(axes) => Some(ChannelTrack::PerAxis([
                ChannelScalar::from_raw(&axes[0]),
                ChannelScalar::from_raw(&axes[1]),
                ChannelScalar::from_raw(&axes[2]),
            ])),
            RawChannelValue::Keyed(table) => {
                let mut frames: Vec<Keyframe> = table
                    .iter()
                    .filter_map(|(time, keyframe)| {
                        let time = match time.parse::<f32>() {
                            Ok(time) => time,
                            Err(_) => {
                                warn!("non-numeric keyframe timestamp `{}` skipped", time);
                                return None;
                            }
                        };
                        let value = match keyframe {
                            RawKeyframe::Vector(value) => value,
                            RawKeyframe::Post { post } => post,
                        };
                        Some(Keyframe {
                            time,
                            value: [
                                ChannelScalar::from_raw(&value[0]),
                                ChannelScalar::from_raw(&value[1]),
                                ChannelScalar::from_raw(&value[2]),
                            ],
                        })
                    })
                    .collect();
                if frames.is_empty() {
                    return None;
                }
                frames.sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap_or(Ordering::Equal));
                Some(ChannelTrack::Keyed(frames))
            }
        }
    }

    /// Value of the channel at `time`, linearly interpolating between the two
    /// surrounding keyframes of a keyed table. At or past the last keyframe
    /// (and exactly at the first) the keyframe value is returned unchanged.
    pub fn evaluate(&self, time: f32, evaluator: &dyn NumericEvaluator) -> Vector3<f32> {
        match self {
            ChannelTrack::Uniform(scalar) => {
                let value = scalar.resolve(evaluator);
                Vector3::new(value, value, value)
            }
            ChannelTrack::PerAxis(axes) => Vector3::new(
                axes[0].resolve(evaluator),
                axes[1].resolve(evaluator),
                axes[2].resolve(evaluator),
            ),
            ChannelTrack::Keyed(frames) => {
                let i = frames
                    .iter()
                    .position(|frame| frame.time > time)
                    .unwrap_or(frames.len());
                let prev = i.saturating_sub(1);
                let next = i.min(frames.len() - 1);
                let start = frames[prev].resolve(evaluator);
                if prev == next {
                    return start;
                }
                let time_delta = frames[next].time - frames[prev].time;
                if time_delta <= 0.0 {
                    return start;
                }
                let end = frames[next].resolve(evaluator);
                let progress = (time - frames[prev].time) / time_delta;
                start + (end - start) * progress
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct BoneTracks {
    pub bone_name: String,
    pub position: Option<ChannelTrack>,
    pub rotation: Option<ChannelTrack>,
    pub scale: Option<ChannelTrack>,
}

#[derive(Clone, Debug)]
pub struct CompiledAnimation {
    pub length: Option<f32>,
    pub looping: bool,
    pub bone_tracks: Vec<BoneTracks>,
}

impl CompiledAnimation {
    pub fn compile(raw: &RawAnimationData) -> Self {
        let mut bone_tracks: Vec<BoneTracks> = raw
            .bones
            .iter()
            .map(|(bone_name, channels)| BoneTracks {
                bone_name: bone_name.clone(),
                position: channels.position.as_ref().and_then(ChannelTrack::compile),
                rotation: channels.rotation.as_ref().and_then(ChannelTrack::compile),
                scale: channels.scale.as_ref().and_then(ChannelTrack::compile),
            })
            .collect();
        bone_tracks.sort_by(|a, b| a.bone_name.cmp(&b.bone_name));
        Self {
            length: raw.animation_length,
            looping: raw.looping,
            bone_tracks,
        }
    }
}

/// One registered, independently playable animation.
#[derive(Debug)]
pub struct AnimationInstance {
    name: String,
    animation: CompiledAnimation,
    is_running: bool,
    current_time: f32,
}

impl AnimationInstance {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn current_time(&self) -> f32 {
        self.current_time
    }

    /// Starts (or restarts) the timeline from zero. A paused instance does
    /// not remember its progress; playing always begins a fresh run.
    fn play(&mut self) {
        self.is_running = true;
        self.current_time = 0.0;
    }

    fn pause(&mut self) {
        self.is_running = false;
    }

    /// Re-anchors the timeline without touching the running flag; used when a
    /// loop-enabled animation runs past its declared length.
    fn rewind(&mut self) {
        self.current_time = 0.0;
    }
}

/// Owns the set of registered animations over one hierarchy. Instances are
/// kept in registration order; that order is the composition order when
/// several run at once.
#[derive(Debug, Default)]
pub struct Animator {
    instances: Vec<AnimationInstance>,
}

impl Animator {
    pub fn new() -> Self {
        Self {
            instances: Vec::new(),
        }
    }

    /// Registers an animation under a name, replacing any instance already
    /// registered under it (the replacement starts out stopped).
    pub fn add_animation(&mut self, name: &str, data: &RawAnimationData) {
        let animation = CompiledAnimation::compile(data);
        match self.instances.iter_mut().find(|it| it.name == name) {
            Some(existing) => {
                existing.animation = animation;
                existing.is_running = false;
                existing.current_time = 0.0;
            }
            None => self.instances.push(AnimationInstance {
                name: name.to_string(),
                animation,
                is_running: false,
                current_time: 0.0,
            }),
        }
    }

    pub fn play(&mut self, name: &str) {
        if let Some(instance) = self.instances.iter_mut().find(|it| it.name == name) {
            instance.play();
        }
    }

    pub fn pause(&mut self, name: &str) {
        if let Some(instance) = self.instances.iter_mut().find(|it| it.name == name) {
            instance.pause();
        }
    }

    pub fn pause_all(&mut self) {
        for instance in self.instances.iter_mut() {
            instance.pause();
        }
    }

    /// Jumps a registered instance to an arbitrary point on its timeline.
    pub fn seek(&mut self, name: &str, time: f32) {
        if let Some(instance) = self.instances.iter_mut().find(|it| it.name == name) {
            instance.current_time = time;
        }
    }

    pub fn instance(&self, name: &str) -> Option<&AnimationInstance> {
        self.instances.iter().find(|it| it.name == name)
    }

    pub fn instances(&self) -> &[AnimationInstance] {
        &self.instances
    }

    /// Whether any instance is running, so hosts can skip tick work.
    pub fn should_tick(&self) -> bool {
        self.instances.iter().any(|it| it.is_running)
    }
}

/// An assembled model: the bone arena, the name lookup used for animation
/// targeting, cached world matrices and the animator that drives them.
#[derive(Debug)]
pub struct RuntimeModel {
    identifier: String,
    bones: Vec<BoneNode>,
    bone_lookup: HashMap<String, usize>,
    bone_tree: Arena<usize>,
    tree_handles: Vec<indextree::NodeId>,
    roots: Vec<usize>,
    outer_matrices: Vec<Matrix4<f32>>,
    inner_matrices: Vec<Matrix4<f32>>,
    animator: Animator,
}

impl RuntimeModel {
    /// Builds the full hierarchy for one geometry. Without texture metrics
    /// the declared texture size (default 32) is used with a discrepancy
    /// factor of 1.
    pub fn assemble(geometry: &RawGeometryData, texture: Option<&TextureInfo>) -> Result<Self> {
        let description = &geometry.description;
        let texture_size = [
            description
                .texture_width
                .map(|it| it as f32)
                .or_else(|| texture.map(|it| it.width as f32))
                .unwrap_or(32.0),
            description
                .texture_height
                .map(|it| it as f32)
                .or_else(|| texture.map(|it| it.height as f32))
                .unwrap_or(32.0),
        ];
        // Legacy content declares a smaller grid than the bound image and
        // relies on the integer multiple between the two.
        let discrepancy = match texture {
            Some(texture) => [
                texture.width as f32 / texture_size[0],
                texture.height as f32 / texture_size[1],
            ],
            None => [1.0, 1.0],
        };

        let mut bones = Vec::with_capacity(geometry.bones.len());
        let mut bone_lookup = HashMap::new();
        for bone_data in geometry.bones.iter() {
            if bone_lookup.contains_key(&bone_data.name) {
                return Err(ModelError::DuplicateBoneName(bone_data.name.clone()));
            }
            let cubes = bone_data
                .cubes
                .iter()
                .enumerate()
                .map(|(i, cube)| CubeNode::build(cube, bone_data, i, texture_size, discrepancy))
                .collect();
            let (position, inner_offset) = match bone_data.pivot {
                Some([px, py, pz]) => (Vector3::new(-px, py, pz), Vector3::new(px, -py, -pz)),
                None => (Vector3::zeros(), Vector3::zeros()),
            };
            let rotation = bone_data
                .rotation
                .map(|degrees| bedrock_rotation(vec3(degrees)))
                .unwrap_or_else(UnitQuaternion::identity);
            let rest = NodeTransform {
                position,
                rotation,
                scale: Vector3::new(1.0, 1.0, 1.0),
            };
            bone_lookup.insert(bone_data.name.clone(), bones.len());
            bones.push(BoneNode {
                name: bone_data.name.clone(),
                parent_id: None,
                rest,
                inner_offset,
                transform: rest,
                cubes,
            });
        }

        let mut bone_tree = Arena::new();
        let mut tree_handles = Vec::with_capacity(bones.len());
        for i in 0..bones.len() {
            tree_handles.push(bone_tree.new_node(i));
        }
        let mut roots = Vec::new();
        for (i, bone_data) in geometry.bones.iter().enumerate() {
            match &bone_data.parent {
                Some(parent) => {
                    let parent_id = match bone_lookup.get(parent) {
                        Some(&parent_id) if parent_id != i => parent_id,
                        _ => {
                            return Err(ModelError::UnresolvedParent {
                                bone: bone_data.name.clone(),
                                parent: parent.clone(),
                            });
                        }
                    };
                    bones[i].parent_id = Some(parent_id);
                    tree_handles[parent_id].append(tree_handles[i], &mut bone_tree);
                }
                None => roots.push(i),
            }
        }
        debug!(
            "assembled geometry `{}`: {} bones, {} roots",
            description.identifier,
            bones.len(),
            roots.len()
        );

        let bone_count = bones.len();
        let mut model = Self {
            identifier: description.identifier.clone(),
            bones,
            bone_lookup,
            bone_tree,
            tree_handles,
            roots,
            outer_matrices: vec![Matrix4::identity(); bone_count],
            inner_matrices: vec![Matrix4::identity(); bone_count],
            animator: Animator::new(),
        };
        model.update_matrices();
        Ok(model)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn bones(&self) -> &[BoneNode] {
        &self.bones
    }

    pub fn bone(&self, bone_id: usize) -> &BoneNode {
        &self.bones[bone_id]
    }

    /// Indices of the parentless bones, in declaration order.
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn get_bone_by_name(&self, bone_name: &str) -> Option<usize> {
        self.bone_lookup.get(bone_name).map(|&it| it)
    }

    /// World matrix of a bone's pivot node as of the last tick.
    pub fn bone_world_matrix(&self, bone_id: usize) -> &Matrix4<f32> {
        &self.outer_matrices[bone_id]
    }

    pub fn animator(&self) -> &Animator {
        &self.animator
    }

    pub fn animator_mut(&mut self) -> &mut Animator {
        &mut self.animator
    }

    /// Advances every running animation by `dt` seconds and recomposes bone
    /// transforms: rest pose first, then each running instance in
    /// registration order adds its position delta (X negated), pre-multiplies
    /// its rotation delta and multiplies its scale. Channels naming bones
    /// this hierarchy does not have are skipped.
    pub fn update_animation(&mut self, dt: f32) {
        self.update_animation_ex(dt, &LiteralEvaluator);
    }

    pub fn update_animation_ex(&mut self, dt: f32, evaluator: &dyn NumericEvaluator) {
        for bone in self.bones.iter_mut() {
            bone.transform = bone.rest;
        }
        {
            let bones = &mut self.bones;
            let bone_lookup = &self.bone_lookup;
            for instance in self.animator.instances.iter_mut() {
                if !instance.is_running {
                    continue;
                }
                instance.current_time += dt;
                let time = instance.current_time;
                for tracks in instance.animation.bone_tracks.iter() {
                    let bone_id = match bone_lookup.get(&tracks.bone_name) {
                        Some(&bone_id) => bone_id,
                        None => continue,
                    };
                    let bone = &mut bones[bone_id];
                    if let Some(track) = &tracks.position {
                        let value = track.evaluate(time, evaluator);
                        bone.transform.position += Vector3::new(-value.x, value.y, value.z);
                    }
                    if let Some(track) = &tracks.rotation {
                        let value = track.evaluate(time, evaluator);
                        bone.transform.rotation = bedrock_rotation(value) * bone.transform.rotation;
                    }
                    if let Some(track) = &tracks.scale {
                        let value = track.evaluate(time, evaluator);
                        bone.transform.scale.component_mul_assign(&value);
                    }
                }
                if let Some(length) = instance.animation.length {
                    if instance.current_time > length {
                        if instance.animation.looping {
                            instance.rewind();
                        } else {
                            instance.pause();
                        }
                    }
                }
            }
        }
        self.update_matrices();
    }

    /// Recomputes world matrices root-down. A bone's children hang off its
    /// inner node, so the pivot translation is applied exactly once.
    pub fn update_matrices(&mut self) {
        for &root in self.roots.iter() {
            for node_id in self.tree_handles[root].descendants(&self.bone_tree) {
                let bone_id = match self.bone_tree.get(node_id) {
                    Some(node) => *node.get(),
                    None => continue,
                };
                let parent_matrix = match self.bones[bone_id].parent_id {
                    Some(parent_id) => self.inner_matrices[parent_id],
                    None => Matrix4::identity(),
                };
                let outer = parent_matrix * self.bones[bone_id].transform.to_homogeneous();
                self.outer_matrices[bone_id] = outer;
                self.inner_matrices[bone_id] =
                    outer * Translation3::from(self.bones[bone_id].inner_offset).to_homogeneous();
            }
        }
    }

    /// Walks the hierarchy and submits every cube with its world transform.
    pub fn draw(&self, surface: &mut dyn DrawSurface) {
        for &root in self.roots.iter() {
            for node_id in self.tree_handles[root].descendants(&self.bone_tree) {
                let bone_id = match self.bone_tree.get(node_id) {
                    Some(node) => *node.get(),
                    None => continue,
                };
                let bone = &self.bones[bone_id];
                for cube in bone.cubes.iter() {
                    let world = self.inner_matrices[bone_id] * cube.local_matrix();
                    surface.submit_triangles(&cube.name, &world, &cube.mesh);
                }
            }
        }
    }
}

/// A parsed geometry document: load once, then assemble any geometry it
/// contains by identifier.
pub struct BedrockModelData {
    format_version: Option<String>,
    geometries: Vec<RawGeometryData>,
}

impl BedrockModelData {
    pub fn load(geometry_file_bytes: &[u8]) -> Result<Self> {
        let raw = RawGeometryFile::parse(geometry_file_bytes)?;
        debug!("loaded geometry document with {} geometries", raw.geometries.len());
        Ok(Self {
            format_version: raw.format_version,
            geometries: raw.geometries,
        })
    }

    pub fn format_version(&self) -> Option<&str> {
        self.format_version.as_deref()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> + '_ {
        self.geometries
            .iter()
            .map(|it| it.description.identifier.as_str())
    }

    pub fn assemble_model(
        &self,
        identifier: &str,
        texture: Option<&TextureInfo>,
    ) -> Result<RuntimeModel> {
        let geometry = self
            .geometries
            .iter()
            .find(|it| it.description.identifier == identifier)
            .ok_or_else(|| ModelError::UnknownGeometry(identifier.to_string()))?;
        RuntimeModel::assemble(geometry, texture)
    }
}
