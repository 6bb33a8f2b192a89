//! Synthetic garments with known geometry.
//!
//! The torso is a rectangular tube with its hem at `y = 0` and its neckline
//! at `y = TORSO_HEIGHT`, front facing `+z`. Vertex columns run through the
//! centre of the front and back panels and through the middle of both side
//! panels, so the side cut follows mesh edges and every keypoint sits on a
//! vertex. Unrolled, the front is `2 * (TORSO_HALF_WIDTH + TORSO_HALF_DEPTH)`
//! wide and carries exactly half the template's base bust.
//!
//! The skirt is the same tube, taller, with a hip line. The shirt is a
//! T-shaped slab of the torso's depth: a body as wide as the torso and a
//! straight sleeve on either side, open at hem, neck and both cuffs.

use std::collections::BTreeMap;

use nalgebra::Point3;

use crate::input::{GarmentInput, GarmentType, Keypoint, MeshInput};

pub const TORSO_HALF_WIDTH: f64 = 15.0;
pub const TORSO_HALF_DEPTH: f64 = 8.5;
pub const TORSO_HEIGHT: f64 = 40.0;
pub const TORSO_BUST_HEIGHT: f64 = 28.0;

const TORSO_ROWS: [f64; 6] = [0.0, 10.0, 20.0, TORSO_BUST_HEIGHT, 34.0, TORSO_HEIGHT];

pub const SKIRT_HEIGHT: f64 = 60.0;
pub const SKIRT_HIP_HEIGHT: f64 = 40.0;

const SKIRT_ROWS: [f64; 6] = [0.0, 15.0, 30.0, SKIRT_HIP_HEIGHT, 50.0, SKIRT_HEIGHT];

pub const SHIRT_SLEEVE_LENGTH: f64 = 20.0;
pub const SHIRT_ARMPIT_HEIGHT: f64 = 30.0;
pub const SHIRT_NECK_HALF_WIDTH: f64 = 6.0;

const SHIRT_COLUMNS: [f64; 13] = {
    let (w, l, n) = (TORSO_HALF_WIDTH, SHIRT_SLEEVE_LENGTH, SHIRT_NECK_HALF_WIDTH);
    [
        -(w + l),
        -(w + l / 2.0),
        -w,
        -(w + n) / 2.0,
        -n,
        -n / 2.0,
        0.0,
        n / 2.0,
        n,
        (w + n) / 2.0,
        w,
        w + l / 2.0,
        w + l,
    ]
};
const SHIRT_ROWS: [f64; 7] = [0.0, 10.0, 17.0, 24.0, SHIRT_ARMPIT_HEIGHT, 35.0, TORSO_HEIGHT];

// Column and row indices of the shirt's outline corners.
const CUFF_LEFT: usize = 0;
const ARM_LEFT: usize = 2;
const NECK_LEFT: usize = 4;
const CENTER: usize = 6;
const NECK_RIGHT: usize = 8;
const ARM_RIGHT: usize = 10;
const CUFF_RIGHT: usize = 12;
const HEM: usize = 0;
const WAIST: usize = 1;
const BUST: usize = 3;
const ARMPIT: usize = 4;
const TOP: usize = 6;

/// Horizontal ring of the tube, walked so that quads face outward.
fn torso_ring() -> Vec<(f64, f64)> {
    let (w, d) = (TORSO_HALF_WIDTH, TORSO_HALF_DEPTH);
    let front = [-w, -2.0 * w / 3.0, -w / 3.0, 0.0, w / 3.0, 2.0 * w / 3.0];
    let side = [d, d / 2.0, 0.0, -d / 2.0];

    let mut ring = Vec::with_capacity(2 * (front.len() + side.len()));
    ring.extend(front.iter().map(|&x| (x, d)));
    ring.extend(side.iter().map(|&z| (w, z)));
    ring.extend(front.iter().map(|&x| (-x, -d)));
    ring.extend(side.iter().map(|&z| (-w, -z)));
    ring
}

/// Triangulated tube through `rows`, open at both ends, wound outward.
fn tube_mesh(rows: &[f64]) -> MeshInput {
    let ring = torso_ring();
    let n = ring.len() as u32;

    let vertices = rows
        .iter()
        .flat_map(|&y| ring.iter().map(move |&(x, z)| [x, y, z]))
        .collect();

    let mut faces = Vec::new();
    for row in 0..(rows.len() as u32 - 1) {
        for i in 0..n {
            let j = (i + 1) % n;
            let a = row * n + i;
            let b = row * n + j;
            let c = (row + 1) * n + j;
            let d = (row + 1) * n + i;
            // Diagonal first, so the leading edge of every face is interior.
            faces.push(vec![c, a, b]);
            faces.push(vec![c, d, a]);
        }
    }

    MeshInput { vertices, faces }
}

fn keypoints(named: impl IntoIterator<Item = (&'static str, Point3<f64>)>) -> Vec<Keypoint> {
    named
        .into_iter()
        .map(|(name, position)| Keypoint::new(name, position, 1.0))
        .collect()
}

/// Triangulated torso tube, open at hem and neckline, wound outward.
pub fn torso_mesh() -> MeshInput {
    tube_mesh(&TORSO_ROWS)
}

/// Keypoints of the torso template, all at full confidence.
pub fn torso_keypoints() -> Vec<Keypoint> {
    let (w, d, h) = (TORSO_HALF_WIDTH, TORSO_HALF_DEPTH, TORSO_HEIGHT);
    keypoints([
        ("center_front", Point3::new(0.0, h, d)),
        ("bust_point", Point3::new(0.0, TORSO_BUST_HEIGHT, d)),
        ("center_back", Point3::new(0.0, h, -d)),
        ("side_left_top", Point3::new(-w, h, 0.0)),
        ("side_left_bottom", Point3::new(-w, 0.0, 0.0)),
        ("side_right_top", Point3::new(w, h, 0.0)),
        ("side_right_bottom", Point3::new(w, 0.0, 0.0)),
    ])
}

/// The torso as handed over by reconstruction.
pub fn torso_input() -> GarmentInput {
    GarmentInput::new(torso_mesh(), GarmentType::Torso, torso_keypoints())
}

/// Straight skirt tube, hem at `y = 0`, waist at `y = SKIRT_HEIGHT`.
pub fn skirt_mesh() -> MeshInput {
    tube_mesh(&SKIRT_ROWS)
}

pub fn skirt_keypoints() -> Vec<Keypoint> {
    let (w, d, h) = (TORSO_HALF_WIDTH, TORSO_HALF_DEPTH, SKIRT_HEIGHT);
    keypoints([
        ("waist_front", Point3::new(0.0, h, d)),
        ("hip_front", Point3::new(0.0, SKIRT_HIP_HEIGHT, d)),
        ("waist_back", Point3::new(0.0, h, -d)),
        ("hip_back", Point3::new(0.0, SKIRT_HIP_HEIGHT, -d)),
        ("waist_left", Point3::new(-w, h, 0.0)),
        ("waist_right", Point3::new(w, h, 0.0)),
        ("hem_left", Point3::new(-w, 0.0, 0.0)),
        ("hem_right", Point3::new(w, 0.0, 0.0)),
    ])
}

pub fn skirt_input() -> GarmentInput {
    GarmentInput::new(skirt_mesh(), GarmentType::Skirt, skirt_keypoints())
}

/// Whether grid cell `(i, j)` lies inside the shirt's T outline.
fn shirt_cell(i: usize, j: usize) -> bool {
    (ARM_LEFT..ARM_RIGHT).contains(&i) || j >= ARMPIT
}

/// Shirt slab vertices keyed by column, row and depth layer.
#[derive(Default)]
struct SlabBuilder {
    index: BTreeMap<(usize, usize, usize), u32>,
    vertices: Vec<[f64; 3]>,
    faces: Vec<Vec<u32>>,
}

impl SlabBuilder {
    /// Layer 0 is the front face, 1 the middle of the walls, 2 the back.
    fn vertex(&mut self, i: usize, j: usize, layer: usize) -> u32 {
        let z = TORSO_HALF_DEPTH * (1.0 - layer as f64);
        let vertices = &mut self.vertices;
        *self.index.entry((i, j, layer)).or_insert_with(|| {
            vertices.push([SHIRT_COLUMNS[i], SHIRT_ROWS[j], z]);
            vertices.len() as u32 - 1
        })
    }

    /// Counter-clockwise quad, seen from outside.
    fn quad(&mut self, [a, b, c, d]: [u32; 4]) {
        self.faces.push(vec![c, a, b]);
        self.faces.push(vec![c, d, a]);
    }
}

/// Triangulated T-shirt slab, wound outward.
pub fn shirt_mesh() -> MeshInput {
    let mut slab = SlabBuilder::default();

    for j in 0..TOP {
        for i in 0..CUFF_RIGHT {
            if !shirt_cell(i, j) {
                continue;
            }
            let front = [(i, j), (i + 1, j), (i + 1, j + 1), (i, j + 1)].map(|(i, j)| slab.vertex(i, j, 0));
            slab.quad(front);
            let back = [(i, j), (i, j + 1), (i + 1, j + 1), (i + 1, j)].map(|(i, j)| slab.vertex(i, j, 2));
            slab.quad(back);
        }
    }

    // Closed stretches of the outline, counter-clockwise seen from the front.
    let walls: [Vec<(usize, usize)>; 4] = [
        (HEM..=ARMPIT)
            .map(|j| (ARM_RIGHT, j))
            .chain((ARM_RIGHT + 1..=CUFF_RIGHT).map(|i| (i, ARMPIT)))
            .collect(),
        (NECK_RIGHT..=CUFF_RIGHT).rev().map(|i| (i, TOP)).collect(),
        (CUFF_LEFT..=NECK_LEFT).rev().map(|i| (i, TOP)).collect(),
        (CUFF_LEFT..=ARM_LEFT)
            .map(|i| (i, ARMPIT))
            .chain((HEM..ARMPIT).rev().map(|j| (ARM_LEFT, j)))
            .collect(),
    ];
    for wall in &walls {
        for pair in wall.windows(2) {
            let ((pi, pj), (qi, qj)) = (pair[0], pair[1]);
            for (lo, hi) in [(1, 0), (2, 1)] {
                let quad = [
                    slab.vertex(pi, pj, lo),
                    slab.vertex(qi, qj, lo),
                    slab.vertex(qi, qj, hi),
                    slab.vertex(pi, pj, hi),
                ];
                slab.quad(quad);
            }
        }
    }

    MeshInput {
        vertices: slab.vertices,
        faces: slab.faces,
    }
}

pub fn shirt_keypoints() -> Vec<Keypoint> {
    let d = TORSO_HALF_DEPTH;
    let at = |i: usize, j: usize, z: f64| Point3::new(SHIRT_COLUMNS[i], SHIRT_ROWS[j], z);
    keypoints([
        ("neck_front", at(CENTER, TOP, d)),
        ("neck_back", at(CENTER, TOP, -d)),
        ("neck_left", at(NECK_LEFT, TOP, 0.0)),
        ("neck_right", at(NECK_RIGHT, TOP, 0.0)),
        ("shoulder_left", at(ARM_LEFT, TOP, 0.0)),
        ("shoulder_right", at(ARM_RIGHT, TOP, 0.0)),
        ("bust_point", at(CENTER, BUST, d)),
        ("waist_front", at(CENTER, WAIST, d)),
        ("waist_back", at(CENTER, WAIST, -d)),
        ("armpit_left", at(ARM_LEFT, ARMPIT, 0.0)),
        ("armpit_right", at(ARM_RIGHT, ARMPIT, 0.0)),
        ("hem_left", at(ARM_LEFT, HEM, 0.0)),
        ("hem_right", at(ARM_RIGHT, HEM, 0.0)),
        ("cuff_left_under", at(CUFF_LEFT, ARMPIT, 0.0)),
        ("cuff_left_over", at(CUFF_LEFT, TOP, 0.0)),
        ("cuff_right_under", at(CUFF_RIGHT, ARMPIT, 0.0)),
        ("cuff_right_over", at(CUFF_RIGHT, TOP, 0.0)),
    ])
}

pub fn shirt_input() -> GarmentInput {
    GarmentInput::new(shirt_mesh(), GarmentType::Shirt, shirt_keypoints())
}

#[cfg(test)]
pub use fixtures::*;

#[cfg(test)]
mod fixtures {
    use std::collections::BTreeMap;
    use std::f64::consts::PI;
    use std::sync::Arc;

    use nalgebra::{Point3, Vector3};
    use pattern_mesh::Mesh;

    use super::torso_input;
    use crate::config::PatternConfig;
    use crate::context::PieceContext;
    use crate::error::FlattenError;
    use crate::flatten::{flatten, FlattenedPatch};
    use crate::ingest::{ingest, IngestedGarment};
    use crate::measurement::MeasurementVector;
    use crate::segment::{segment, Patch, PatchId, SegmentedPiece};
    use crate::session::Interrupt;
    use crate::template::{GarmentTemplate, TemplateLibrary};

    /// Flat grid of `nx` by `ny` squares in the `z = 0` plane, facing `+z`.
    pub fn planar_patch(nx: u32, ny: u32, spacing: f64) -> Patch {
        let stride = nx + 1;
        let positions = (0..=ny).flat_map(|j| {
            (0..=nx).map(move |i| Point3::new(i as f64 * spacing, j as f64 * spacing, 0.0))
        });
        let mut faces = Vec::new();
        for j in 0..ny {
            for i in 0..nx {
                let a = j * stride + i;
                let (b, c, d) = (a + 1, a + stride + 1, a + stride);
                faces.push([a, b, c]);
                faces.push([a, c, d]);
            }
        }
        let count = stride * (ny + 1);
        Patch::new(
            PatchId(0),
            "panel",
            Mesh::from_parts(positions, faces),
            (0..count).collect(),
            Vector3::y(),
        )
        .expect("grid is a disc")
    }

    /// Spherical cap around the `+z` pole, 70 degrees down, wound outward.
    pub fn hemisphere_patch(radius: f64, rings: u32, segments: u32) -> Patch {
        let max_polar = 70f64.to_radians();
        let mut positions = vec![Point3::new(0.0, 0.0, radius)];
        for k in 1..=rings {
            let theta = max_polar * k as f64 / rings as f64;
            for s in 0..segments {
                let phi = 2.0 * PI * s as f64 / segments as f64;
                positions.push(Point3::new(
                    radius * theta.sin() * phi.cos(),
                    radius * theta.sin() * phi.sin(),
                    radius * theta.cos(),
                ));
            }
        }

        let ring = |k: u32, s: u32| 1 + (k - 1) * segments + s % segments;
        let mut faces = Vec::new();
        for s in 0..segments {
            faces.push([0, ring(1, s), ring(1, s + 1)]);
        }
        for k in 1..rings {
            for s in 0..segments {
                let (a, d) = (ring(k, s), ring(k, s + 1));
                let (b, c) = (ring(k + 1, s), ring(k + 1, s + 1));
                faces.push([a, b, c]);
                faces.push([a, c, d]);
            }
        }

        let count = positions.len() as u32;
        Patch::new(
            PatchId(0),
            "cap",
            Mesh::from_parts(positions, faces),
            (0..count).collect(),
            Vector3::y(),
        )
        .expect("cap is a disc")
    }

    fn torso_garment() -> IngestedGarment {
        let library = TemplateLibrary::builtin().expect("builtin templates parse");
        ingest(&torso_input(), &library, &PatternConfig::default()).expect("torso ingests")
    }

    /// Segmented torso piece.
    pub fn torso_patch(name: &str) -> Arc<Patch> {
        segment(&torso_garment())
            .into_iter()
            .find(|p| p.piece_name == name)
            .and_then(|p| p.result.ok())
            .expect("torso piece segments")
    }

    /// Segmented torso with the values the post-flattening stages need.
    pub struct TorsoFixture {
        garment: IngestedGarment,
        pieces: Vec<SegmentedPiece>,
        patch_ids: BTreeMap<String, PatchId>,
        reference: MeasurementVector,
        config: PatternConfig,
    }

    impl TorsoFixture {
        pub fn new() -> Self {
            let garment = torso_garment();
            let pieces = segment(&garment);
            let patch_ids = pieces
                .iter()
                .filter(|p| p.result.is_ok())
                .map(|p| (p.piece_name.clone(), p.id))
                .collect();
            let reference = garment.reference_measurements.clone();
            Self {
                garment,
                pieces,
                patch_ids,
                reference,
                config: PatternConfig::default(),
            }
        }

        /// Body measurements applied over the template base.
        pub fn with_reference(mut self, measurements: MeasurementVector) -> Self {
            self.reference = self
                .garment
                .template
                .base_measurements
                .overridden_by(&measurements);
            self
        }

        pub fn with_config(mut self, config: PatternConfig) -> Self {
            self.config = config;
            self
        }

        pub fn template(&self) -> &GarmentTemplate {
            &self.garment.template
        }

        pub fn patch(&self, name: &str) -> Arc<Patch> {
            self.pieces
                .iter()
                .find(|p| p.piece_name == name)
                .and_then(|p| p.result.clone().ok())
                .expect("torso piece segments")
        }

        pub fn flatten(&self, name: &str) -> Result<FlattenedPatch, FlattenError> {
            flatten(self.patch(name), &self.config, &Interrupt::never())
        }

        pub fn context(&self, name: &str) -> Option<PieceContext<'_>> {
            Some(PieceContext {
                template: &self.garment.template,
                piece: self.garment.template.piece(name)?,
                reference: &self.reference,
                patch_ids: &self.patch_ids,
                config: &self.config,
            })
        }
    }
}
