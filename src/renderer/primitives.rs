use super::vertex::{v, Vertex};
use std::f32::consts::PI;

/// Unit UV sphere. `segments` around the equator, `rings` pole to pole.
pub fn sphere_mesh(segments: u32, rings: u32) -> (Vec<Vertex>, Vec<u32>) {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut vertices = Vec::with_capacity(((rings + 1) * (segments + 1)) as usize);
    let mut indices = Vec::with_capacity((rings * segments * 6) as usize);

    for ring in 0..=rings {
        let phi = PI * ring as f32 / rings as f32;
        let y = phi.cos();
        let ring_radius = phi.sin();

        for segment in 0..=segments {
            let theta = 2.0 * PI * segment as f32 / segments as f32;
            let x = ring_radius * theta.cos();
            let z = ring_radius * theta.sin();

            let u = segment as f32 / segments as f32;
            let tex_v = ring as f32 / rings as f32;

            // Position doubles as the normal on a unit sphere
            vertices.push(v([x, y, z], [u, tex_v], [x, y, z]));
        }
    }

    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;

            indices.push(current);
            indices.push(current + 1);
            indices.push(next);

            indices.push(current + 1);
            indices.push(next + 1);
            indices.push(next);
        }
    }

    (vertices, indices)
}

/// Unit quad in the XZ plane facing +Y.
pub fn plane_mesh() -> (Vec<Vertex>, Vec<u32>) {
    let n = [0.0, 1.0, 0.0];
    let verts = vec![
        v([-0.5, 0.0, 0.5], [0.0, 0.0], n),
        v([0.5, 0.0, 0.5], [1.0, 0.0], n),
        v([0.5, 0.0, -0.5], [1.0, 1.0], n),
        v([-0.5, 0.0, -0.5], [0.0, 1.0], n),
    ];
    (verts, vec![0, 1, 2, 0, 2, 3])
}

pub fn cube_mesh() -> (Vec<Vertex>, Vec<u32>) {
    // (normal, u axis, v axis) per face; corners wind counter-clockwise seen from outside
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];

    let mut verts = Vec::with_capacity(24);
    for (n, u, w) in faces {
        for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            let pos = [
                0.5 * n[0] + su * u[0] + sv * w[0],
                0.5 * n[1] + su * u[1] + sv * w[1],
                0.5 * n[2] + su * u[2] + sv * w[2],
            ];
            verts.push(v(pos, [su + 0.5, 0.5 - sv], n));
        }
    }

    let idx = (0..6u32)
        .flat_map(|f| {
            let o = f * 4;
            [o, o + 1, o + 2, o, o + 2, o + 3]
        })
        .collect::<Vec<_>>();

    (verts, idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn cube_counts_look_right() {
        let (v, i) = cube_mesh();
        assert_eq!(v.len(), 24);
        assert_eq!(i.len(), 36);
    }

    #[test]
    fn cube_faces_wind_outward() {
        let (v, i) = cube_mesh();
        for tri in i.chunks(3) {
            let a = Vec3::from(v[tri[0] as usize].pos);
            let b = Vec3::from(v[tri[1] as usize].pos);
            let c = Vec3::from(v[tri[2] as usize].pos);
            let n = Vec3::from(v[tri[0] as usize].normal);
            assert!((b - a).cross(c - a).dot(n) > 0.0);
        }
    }

    #[test]
    fn sphere_vertices_lie_on_unit_sphere() {
        let (v, i) = sphere_mesh(16, 16);
        assert_eq!(v.len(), 17 * 17);
        assert_eq!(i.len(), 16 * 16 * 6);
        for vertex in &v {
            assert!((Vec3::from(vertex.pos).length() - 1.0).abs() < 1e-5);
        }
    }
}
