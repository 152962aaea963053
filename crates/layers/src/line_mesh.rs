//! Polylines to indexed, thickness-extruded triangle meshes.
//!
//! Each input vertex emits a fixed pattern depending on its neighbours:
//!
//! ```text
//!   start   ──►  flat cap stub + half of the first segment
//!   interior ──► quad for the incoming segment + miter (or capped) join
//!   end     ──►  quad for the last segment + flat cap stub
//!   isolated ──► point quad
//! ```
//!
//! Every emitted vertex carries a UV in a local frame, `u` along the line and
//! `v` across it, so the fragment stage can antialias edges and caps.
//!
//! Output goes into caller-owned [`MeshBuffers`], sized for the worst case of
//! [`MAX_VERTICES_PER_POINT`] vertices and [`MAX_TRIANGLES_PER_POINT`]
//! triangles per input vertex. Writes past that capacity panic on the slice
//! bounds check; no other overflow handling is done.

use std::borrow::Cow;

use foundation::math::Vec3;

pub const MAX_VERTICES_PER_POINT: usize = 7;
pub const MAX_TRIANGLES_PER_POINT: usize = 5;

/// Below this length the summed edge normals are treated as a reversal.
pub const MITER_DEGENERACY_EPSILON: f64 = 0.05;

/// `dot(from_prev, to_next)` under this marks a sharp corner.
pub const SHARP_CORNER_DOT: f64 = -0.7;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CornerKind {
    Straight,
    Sharp,
}

impl CornerKind {
    pub fn classify(from_prev: Vec3, to_next: Vec3) -> Self {
        if from_prev.dot(to_next) < SHARP_CORNER_DOT {
            CornerKind::Sharp
        } else {
            CornerKind::Straight
        }
    }
}

/// Fixed-capacity index/vertex/uv storage reused across generations.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MeshBuffers {
    pub indices: Vec<u32>,
    /// xyz triples.
    pub vertices: Vec<f32>,
    /// uv pairs.
    pub uvs: Vec<f32>,
}

impl MeshBuffers {
    pub fn with_capacity_for(point_count: usize) -> Self {
        Self {
            indices: vec![0; point_count * MAX_TRIANGLES_PER_POINT * 3],
            vertices: vec![0.0; point_count * MAX_VERTICES_PER_POINT * 3],
            uvs: vec![0.0; point_count * MAX_VERTICES_PER_POINT * 2],
        }
    }

    pub fn for_linestrings<L: AsRef<[Vec3]>>(linestrings: &[L]) -> Self {
        Self::with_capacity_for(linestrings.iter().map(|l| l.as_ref().len()).sum())
    }

    pub fn point_capacity(&self) -> usize {
        self.indices.len() / (MAX_TRIANGLES_PER_POINT * 3)
    }
}

/// Fill level of [`MeshBuffers`], in elements (not vertices).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct MeshCursor {
    pub indices: usize,
    pub vertices: usize,
    pub uvs: usize,
}

impl MeshCursor {
    pub fn vertex_count(&self) -> usize {
        self.vertices / 3
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct JoinCounts {
    pub mitered: usize,
    pub capped: usize,
    pub sharp_corners: usize,
    pub line_caps: usize,
    pub points: usize,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct MeshOutput {
    pub num_indices: u32,
    pub cursor: MeshCursor,
    pub joins: JoinCounts,
}

/// Tessellate `linestrings` into `buffers`.
///
/// `view_point` orients the extrusion plane; pass the origin to face each
/// vertex outwards from the globe center. `thickness` is the full line width
/// in world units.
pub fn linestrings_to_mesh<L: AsRef<[Vec3]>>(
    linestrings: &[L],
    view_point: Vec3,
    thickness: f64,
    buffers: &mut MeshBuffers,
) -> MeshOutput {
    let mut writer = MeshWriter {
        buffers,
        cursor: MeshCursor::default(),
    };
    let mut joins = JoinCounts::default();
    let half = thickness / 2.0;

    for line in linestrings {
        tessellate_line(&mut writer, &mut joins, line.as_ref(), view_point, half);
    }

    MeshOutput {
        num_indices: writer.cursor.indices as u32,
        cursor: writer.cursor,
        joins,
    }
}

fn tessellate_line(
    w: &mut MeshWriter<'_>,
    joins: &mut JoinCounts,
    points: &[Vec3],
    view_point: Vec3,
    half: f64,
) {
    // Coincident neighbours have no direction to extrude along.
    let points: Cow<'_, [Vec3]> = if points.windows(2).any(|pair| pair[0].approx_eq(pair[1])) {
        let mut unique = points.to_vec();
        unique.dedup_by(|a, b| a.approx_eq(*b));
        Cow::Owned(unique)
    } else {
        Cow::Borrowed(points)
    };

    let face_from_view = !view_point.approx_eq(Vec3::ZERO);
    let mut last_to_next: Option<Vec3> = None;

    for (i, &current) in points.iter().enumerate() {
        let face = if face_from_view {
            view_point.normalize()
        } else {
            current.normalize()
        };
        let prev = i.checked_sub(1).map(|j| points[j]);
        let next = points.get(i + 1).copied();

        match (prev, next) {
            (Some(prev), Some(next)) => {
                let from_prev = last_to_next.unwrap_or_else(|| (current - prev).normalize());
                let to_next = (next - current).normalize();
                last_to_next = Some(to_next);
                if CornerKind::classify(from_prev, to_next) == CornerKind::Sharp {
                    joins.sharp_corners += 1;
                }
                interior_join(w, joins, current, from_prev, to_next, face, half);
            }
            (None, Some(next)) => {
                let to_next = (next - current).normalize();
                last_to_next = Some(to_next);
                start_cap(w, current, to_next, face, half);
                joins.line_caps += 1;
            }
            (Some(prev), None) => {
                let from_prev = last_to_next.unwrap_or_else(|| (current - prev).normalize());
                end_cap(w, current, from_prev, face, half);
                joins.line_caps += 1;
            }
            (None, None) => {
                point_quad(w, current, face, half);
                joins.points += 1;
            }
        }
    }
}

fn interior_join(
    w: &mut MeshWriter<'_>,
    joins: &mut JoinCounts,
    current: Vec3,
    from_prev: Vec3,
    to_next: Vec3,
    face: Vec3,
    half: f64,
) {
    let prev_normal = from_prev.cross(face);
    let next_normal = to_next.cross(face);
    let prev_scaled = prev_normal * half;
    let next_scaled = next_normal * half;
    let primary_side_out = from_prev.dot(next_normal) > 0.0;

    // Quad closing the incoming segment onto the previous vertex's last pair.
    w.indices(&[0, 1, -1, 0, -1, -2]);

    let normal_sum = prev_normal + next_normal;
    let sum_len = normal_sum.length();
    if sum_len < MITER_DEGENERACY_EPSILON {
        capped_join(
            w,
            current,
            (from_prev, to_next),
            (prev_normal, next_normal),
            half,
            primary_side_out,
        );
        joins.capped += 1;
        return;
    }

    let miter_dir = normal_sum / sum_len;
    let miter_normal = miter_dir.cross(face);
    let mut miter_length = 1.0 / prev_normal.dot(miter_dir);
    if !primary_side_out {
        miter_length = -miter_length;
    }
    let outer_miter = miter_dir * miter_length;

    let u_prev = prev_normal.dot(miter_dir);
    let v_prev = prev_normal.dot(miter_normal);
    let u_next = next_normal.dot(miter_dir);
    let v_next = next_normal.dot(miter_normal);

    if primary_side_out {
        w.indices(&[2, 0, 3, 2, 3, 4]);
    } else {
        w.indices(&[2, 3, 1, 2, 5, 3]);
    }
    w.vertices(&[
        current + prev_scaled,
        current - prev_scaled,
        current,
        current + outer_miter * half,
        current + next_scaled,
        current - next_scaled,
    ]);
    w.uvs(&[
        [u_prev, v_prev],
        [-u_prev, -v_prev],
        [0.0, 0.0],
        [outer_miter.dot(miter_dir), outer_miter.dot(miter_normal)],
        [u_next, v_next],
        [-u_next, -v_next],
    ]);
    joins.mitered += 1;
}

/// Join for a near reversal: each segment gets its own square extension and
/// a three triangle fan bridges them.
fn capped_join(
    w: &mut MeshWriter<'_>,
    current: Vec3,
    (from_prev, to_next): (Vec3, Vec3),
    (prev_normal, next_normal): (Vec3, Vec3),
    half: f64,
    primary_side_out: bool,
) {
    let prev_scaled = prev_normal * half;
    let next_scaled = next_normal * half;
    let ext_from_prev = from_prev * half + prev_scaled;
    let ext_from_next = to_next * -half + next_scaled;

    if primary_side_out {
        w.indices(&[0, 5, 2, 0, 4, 5, 0, 3, 4]);
    } else {
        w.indices(&[2, 6, 1, 1, 6, 3, 1, 3, 4]);
    }
    w.vertices(&[
        current + prev_scaled,
        current - prev_scaled,
        current,
        current + ext_from_prev,
        current + ext_from_next,
        current + next_scaled,
        current - next_scaled,
    ]);

    let u_next = next_normal.dot(from_prev);
    let v_next = -next_normal.dot(prev_normal);
    w.uvs(&[
        [0.0, -1.0],
        [0.0, 1.0],
        [0.0, 0.0],
        [1.0, -1.0],
        [
            ext_from_next.dot(from_prev) / half,
            -ext_from_next.dot(prev_normal) / half,
        ],
        [u_next, v_next],
        [-u_next, -v_next],
    ]);
}

fn start_cap(w: &mut MeshWriter<'_>, current: Vec3, to_next: Vec3, face: Vec3, half: f64) {
    let next_scaled = to_next.cross(face) * half;
    let extended = current + to_next * -half;

    w.indices(&[0, 3, 1, 0, 2, 3]);
    w.vertices(&[
        extended + next_scaled,
        extended - next_scaled,
        current + next_scaled,
        current - next_scaled,
    ]);
    w.uvs(&[[1.0, -1.0], [-1.0, -1.0], [1.0, 0.0], [-1.0, 0.0]]);
}

fn end_cap(w: &mut MeshWriter<'_>, current: Vec3, from_prev: Vec3, face: Vec3, half: f64) {
    let prev_scaled = from_prev.cross(face) * half;
    let extended = current + from_prev * half;

    w.indices(&[0, -1, -2, 0, 1, -1, 0, 3, 1, 0, 2, 3]);
    w.vertices(&[
        current + prev_scaled,
        current - prev_scaled,
        extended + prev_scaled,
        extended - prev_scaled,
    ]);
    w.uvs(&[[1.0, 0.0], [-1.0, 0.0], [1.0, 1.0], [-1.0, 1.0]]);
}

fn point_quad(w: &mut MeshWriter<'_>, current: Vec3, face: Vec3, half: f64) {
    let axis = Vec3::new(0.0, half, 0.0);
    let radius_a = face.cross(axis);
    let radius_b = face.cross(radius_a);
    let e1 = current + radius_a;
    let e2 = current - radius_a;

    w.indices(&[0, 3, 2, 0, 1, 3]);
    w.vertices(&[e1 + radius_b, e2 + radius_b, e1 - radius_b, e2 - radius_b]);
    w.uvs(&[[1.0, 1.0], [-1.0, 1.0], [1.0, -1.0], [-1.0, -1.0]]);
}

struct MeshWriter<'a> {
    buffers: &'a mut MeshBuffers,
    cursor: MeshCursor,
}

impl MeshWriter<'_> {
    /// Indices relative to the first vertex this step will write.
    fn indices(&mut self, offsets: &[i64]) {
        let base = self.cursor.vertex_count() as i64;
        let out = &mut self.buffers.indices[self.cursor.indices..self.cursor.indices + offsets.len()];
        for (slot, offset) in out.iter_mut().zip(offsets) {
            *slot = (base + offset) as u32;
        }
        self.cursor.indices += offsets.len();
    }

    fn vertices(&mut self, vertices: &[Vec3]) {
        for v in vertices {
            self.buffers.vertices[self.cursor.vertices..self.cursor.vertices + 3]
                .copy_from_slice(&v.to_f32_array());
            self.cursor.vertices += 3;
        }
    }

    fn uvs(&mut self, uvs: &[[f64; 2]]) {
        for [u, v] in uvs {
            self.buffers.uvs[self.cursor.uvs..self.cursor.uvs + 2]
                .copy_from_slice(&[*u as f32, *v as f32]);
            self.cursor.uvs += 2;
        }
    }
}
