use std::rc::Rc;

use bytemuck::{Pod, Zeroable};

/// One interleaved vertex: position followed by normal.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct VertexNormal {
    pub point: [f32; 3],
    pub normal: [f32; 3],
}

impl VertexNormal {
    pub const fn new(point: [f32; 3], normal: [f32; 3]) -> Self {
        Self { point, normal }
    }
}

/// Indexed triangle geometry with interleaved position/normal vertices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleData {
    points: Vec<VertexNormal>,
    triangles: Vec<[u16; 3]>,
}

impl TriangleData {
    pub fn new(points: Vec<VertexNormal>, triangles: Vec<[u16; 3]>) -> Self {
        Self { points, triangles }
    }

    /// Builds geometry from bare positions; normals start zeroed.
    pub fn from_positions(positions: &[[f32; 3]], triangles: Vec<[u16; 3]>) -> Self {
        let points = positions
            .iter()
            .map(|&p| VertexNormal::new(p, [0.0; 3]))
            .collect();
        Self { points, triangles }
    }

    pub fn points(&self) -> &[VertexNormal] {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut [VertexNormal] {
        &mut self.points
    }

    pub fn triangles(&self) -> &[[u16; 3]] {
        &self.triangles
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The vertex array as raw bytes, as handed to attribute pointers.
    pub fn points_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.points)
    }

    /// Triangle indices flattened to a `u16` index stream.
    pub fn indices(&self) -> &[u16] {
        bytemuck::cast_slice(&self.triangles)
    }

    /// Recomputes per-vertex normals as the area-weighted average of the
    /// adjacent face normals. Triangles referencing missing vertices are skipped.
    pub fn compute_normals(&mut self) {
        let mut sums = vec![[0.0f32; 3]; self.points.len()];

        for tri in &self.triangles {
            let [a, b, c] = tri.map(usize::from);
            let (Some(pa), Some(pb), Some(pc)) =
                (self.points.get(a), self.points.get(b), self.points.get(c))
            else {
                continue;
            };
            // Unnormalized cross product: length is twice the triangle area.
            let n = cross(sub(pb.point, pa.point), sub(pc.point, pa.point));
            for i in [a, b, c] {
                for k in 0..3 {
                    sums[i][k] += n[k];
                }
            }
        }

        for (vertex, sum) in self.points.iter_mut().zip(sums) {
            vertex.normal = normalize(sum);
        }
    }

    /// Axis-aligned bounds as `(min, max)`, `None` for empty geometry.
    pub fn bounds(&self) -> Option<([f32; 3], [f32; 3])> {
        let first = self.points.first()?.point;
        Some(self.points.iter().fold((first, first), |(lo, hi), v| {
            (
                [lo[0].min(v.point[0]), lo[1].min(v.point[1]), lo[2].min(v.point[2])],
                [hi[0].max(v.point[0]), hi[1].max(v.point[1]), hi[2].max(v.point[2])],
            )
        }))
    }
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len <= f32::EPSILON {
        [0.0; 3]
    } else {
        [v[0] / len, v[1] / len, v[2] / len]
    }
}

/// Geometry source for a draw.
#[derive(Debug, Clone, Default)]
pub struct Mapper {
    data: Rc<TriangleData>,
}

impl Mapper {
    pub fn new(data: Rc<TriangleData>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &TriangleData {
        &self.data
    }

    pub fn set_data(&mut self, data: Rc<TriangleData>) {
        self.data = data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> TriangleData {
        TriangleData::from_positions(
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn vertex_is_24_bytes_with_normal_at_12() {
        assert_eq!(std::mem::size_of::<VertexNormal>(), 24);
        assert_eq!(std::mem::offset_of!(VertexNormal, normal), 12);
    }

    #[test]
    fn flat_quad_normals_point_up_z() {
        let mut data = quad();
        data.compute_normals();
        for v in data.points() {
            assert_eq!(v.normal, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn unreferenced_vertex_keeps_zero_normal() {
        let mut data = TriangleData::from_positions(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [5.0, 5.0, 5.0]],
            vec![[0, 1, 2], [0, 1, 9]],
        );
        data.compute_normals();
        assert_eq!(data.points()[3].normal, [0.0; 3]);
        assert_eq!(data.points()[0].normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn bounds_cover_all_points() {
        assert_eq!(quad().bounds(), Some(([0.0, 0.0, 0.0], [1.0, 1.0, 0.0])));
        assert_eq!(TriangleData::default().bounds(), None);
    }

    #[test]
    fn byte_views_match_counts() {
        let data = quad();
        assert_eq!(data.points_bytes().len(), 4 * 24);
        assert_eq!(data.indices(), &[0, 1, 2, 0, 2, 3]);
    }
}
