use nalgebra::{UnitQuaternion, Vector3};

/// Rotation convention shared by bone rest poses, per-cube rotations and
/// animation deltas: Z-Y-X application order with the X and Y angles negated
/// (left-handed content, angles in degrees).
pub fn bedrock_rotation(degrees: Vector3<f32>) -> UnitQuaternion<f32> {
    UnitQuaternion::from_euler_angles(
        (-degrees.x).to_radians(),
        (-degrees.y).to_radians(),
        degrees.z.to_radians(),
    )
}

pub fn vec3(raw: [f32; 3]) -> Vector3<f32> {
    Vector3::new(raw[0], raw[1], raw[2])
}

pub fn opt_vec3(raw: Option<[f32; 3]>) -> Vector3<f32> {
    raw.map(vec3).unwrap_or_else(Vector3::zeros)
}
