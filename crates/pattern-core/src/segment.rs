//! Template-driven cutting of the garment into pattern pieces.

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::{PI, TAU};
use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use pattern_mesh::{edge_key, BoundaryLoop, Mesh};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::GeometryError;
use crate::ingest::IngestedGarment;
use crate::template::{CutPlane, PieceSpec};

/// Stable identifier of a pattern piece within one session.
///
/// Ids follow the template's piece order, so the same template always
/// numbers its pieces the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchId(pub u32);

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One connected chart of the garment surface.
///
/// Vertices are local to the patch; vertices on a cut are duplicated into
/// every patch that touches the cut.
#[derive(Debug, Clone)]
pub struct Patch {
    pub id: PatchId,
    pub piece_name: String,
    /// Local vertices and faces.
    pub mesh: Mesh,
    /// Garment vertex index of every local vertex.
    pub source_vertices: Vec<u32>,
    /// Boundary loops, outer boundary first.
    pub loops: Vec<BoundaryLoop>,
    /// Keypoint name to nearest local vertex.
    pub landmarks: BTreeMap<String, u32>,
    /// Local vertices held fixed while flattening.
    pub anchors: Vec<u32>,
    /// Unit up axis of the garment frame.
    pub up: Vector3<f64>,
}

impl Patch {
    /// Wrap a local mesh, checking it is a single chart with closed,
    /// unpinched boundaries.
    pub fn new(
        id: PatchId,
        piece_name: impl Into<String>,
        mesh: Mesh,
        source_vertices: Vec<u32>,
        up: Vector3<f64>,
    ) -> Result<Self, GeometryError> {
        let piece_name = piece_name.into();
        let non_manifold = |details: String| GeometryError::NonManifoldPatch {
            piece: piece_name.clone(),
            details,
        };

        if mesh.is_empty() {
            return Err(non_manifold("no faces in region".into()));
        }

        let adjacency = mesh.adjacency();
        if !adjacency.is_manifold() {
            return Err(non_manifold(format!(
                "{} non-manifold edges",
                adjacency.non_manifold_edge_count()
            )));
        }
        let components = adjacency.component_count(&mesh.faces);
        if components != 1 {
            return Err(non_manifold(format!("{components} disconnected components")));
        }

        let loops = mesh
            .boundary_loops()
            .map_err(|e| non_manifold(e.to_string()))?;
        if loops.is_empty() {
            return Err(non_manifold("closed surface has no boundary".into()));
        }

        let anchors = loops
            .first()
            .and_then(|l| l.vertices.first())
            .map(|&v| vec![v])
            .unwrap_or_default();

        Ok(Self {
            id,
            piece_name,
            mesh,
            source_vertices,
            loops,
            landmarks: BTreeMap::new(),
            anchors,
            up,
        })
    }

    /// Attach named landmarks and pick anchors among them.
    ///
    /// Each landmark snaps to the nearest local vertex. Anchors fall back to
    /// the first outer boundary vertex when none of the names resolve.
    pub fn with_landmarks<'a>(
        mut self,
        landmarks: impl IntoIterator<Item = (&'a str, Point3<f64>)>,
        anchor_names: &[String],
    ) -> Self {
        for (name, position) in landmarks {
            if let Some(vertex) = self.nearest_vertex(&position) {
                self.landmarks.insert(name.to_string(), vertex);
            }
        }

        let mut anchors: Vec<u32> = anchor_names
            .iter()
            .filter_map(|name| self.landmarks.get(name).copied())
            .collect();
        anchors.sort_unstable();
        anchors.dedup();
        if !anchors.is_empty() {
            self.anchors = anchors;
        }
        self
    }

    /// Local vertex closest to `p`; the lowest index wins ties.
    pub fn nearest_vertex(&self, p: &Point3<f64>) -> Option<u32> {
        let mut best: Option<(f64, u32)> = None;
        for (idx, vertex) in self.mesh.vertices.iter().enumerate() {
            let d = (vertex.position - p).norm_squared();
            if best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, idx as u32));
            }
        }
        best.map(|(_, idx)| idx)
    }

    pub fn vertex_count(&self) -> usize {
        self.mesh.vertex_count()
    }

    /// Unique edges, sorted.
    pub fn edges(&self) -> Vec<(u32, u32)> {
        let mut edges: BTreeSet<(u32, u32)> = BTreeSet::new();
        for &[a, b, c] in &self.mesh.faces {
            edges.insert(edge_key(a, b));
            edges.insert(edge_key(b, c));
            edges.insert(edge_key(c, a));
        }
        edges.into_iter().collect()
    }

    /// Mean 3D edge length.
    pub fn mean_edge_length(&self) -> f64 {
        let edges = self.edges();
        if edges.is_empty() {
            return 0.0;
        }
        let total: f64 = edges
            .iter()
            .map(|&(a, b)| (self.mesh.position(a) - self.mesh.position(b)).norm())
            .sum();
        total / edges.len() as f64
    }

    pub fn is_boundary_vertex(&self, vertex: u32) -> bool {
        self.loops.iter().any(|l| l.vertices.contains(&vertex))
    }

    /// Discrete Gaussian curvature per vertex.
    ///
    /// Interior vertices: `2π − Σθ`; boundary vertices: `π − Σθ`, the
    /// geodesic turning of the boundary.
    pub fn angle_defects(&self) -> Vec<f64> {
        let mut angle_sum = vec![0.0; self.mesh.vertex_count()];
        for (face, tri) in self.mesh.faces.iter().zip(self.mesh.triangles()) {
            for (corner, &v) in face.iter().enumerate() {
                angle_sum[v as usize] += tri.angle_at(corner);
            }
        }

        let boundary: BTreeSet<u32> = self
            .loops
            .iter()
            .flat_map(|l| l.vertices.iter().copied())
            .collect();

        angle_sum
            .iter()
            .enumerate()
            .map(|(v, sum)| {
                if boundary.contains(&(v as u32)) {
                    PI - sum
                } else {
                    TAU - sum
                }
            })
            .collect()
    }
}

/// Outcome of cutting one template piece.
#[derive(Debug, Clone)]
pub struct SegmentedPiece {
    pub id: PatchId,
    pub piece_name: String,
    pub result: Result<Arc<Patch>, GeometryError>,
}

/// Cut the garment into one patch per template piece, in template order.
///
/// Failures are per piece: a degenerate cut or a piece whose region is not
/// a single manifold chart is reported in its slot and does not affect the
/// other pieces.
pub fn segment(garment: &IngestedGarment) -> Vec<SegmentedPiece> {
    let template = &garment.template;
    let mesh = garment.mesh.as_ref();
    let up = template.up_axis();

    // Step 1: Resolve cut planes from keypoints
    let planes: BTreeMap<&str, Option<CutPlane>> = template
        .cuts
        .iter()
        .map(|(name, cut)| {
            let plane = cut.resolve(&up, |kp| garment.keypoint_position(kp));
            if plane.is_none() {
                warn!("Cut '{}' does not resolve to a plane", name);
            }
            (name.as_str(), plane)
        })
        .collect();

    // Step 2: Assign each face to the first piece that accepts its centroid
    let mut piece_faces: Vec<Vec<[u32; 3]>> = vec![Vec::new(); template.pieces.len()];
    let mut unassigned = 0usize;
    for (face, tri) in mesh.faces.iter().zip(mesh.triangles()) {
        let centroid = tri.centroid();
        let owner = template
            .pieces
            .iter()
            .position(|piece| accepts(piece, &planes, &centroid));
        match owner {
            Some(idx) => piece_faces[idx].push(*face),
            None => unassigned += 1,
        }
    }
    if unassigned > 0 {
        debug!("{} faces fall outside every piece", unassigned);
    }

    // Step 3: Build an independent patch per piece
    let pieces: Vec<SegmentedPiece> = template
        .pieces
        .iter()
        .zip(piece_faces)
        .enumerate()
        .map(|(idx, (piece, faces))| {
            let id = PatchId(idx as u32);
            let result = build_patch(id, piece, &planes, mesh, &faces, garment, up).map(Arc::new);
            if let Err(e) = &result {
                warn!("Piece '{}' failed segmentation: {}", piece.name, e);
            }
            SegmentedPiece {
                id,
                piece_name: piece.name.clone(),
                result,
            }
        })
        .collect();

    info!(
        "Segmented {} into {} pieces ({} ok)",
        template.name,
        pieces.len(),
        pieces.iter().filter(|p| p.result.is_ok()).count()
    );

    pieces
}

fn accepts(piece: &PieceSpec, planes: &BTreeMap<&str, Option<CutPlane>>, p: &Point3<f64>) -> bool {
    piece.regions.iter().all(|rule| {
        planes
            .get(rule.cut.as_str())
            .copied()
            .flatten()
            .is_some_and(|plane| rule.side.accepts(plane.signed_distance(p)))
    })
}

fn build_patch(
    id: PatchId,
    piece: &PieceSpec,
    planes: &BTreeMap<&str, Option<CutPlane>>,
    mesh: &Mesh,
    faces: &[[u32; 3]],
    garment: &IngestedGarment,
    up: Vector3<f64>,
) -> Result<Patch, GeometryError> {
    if let Some(rule) = piece
        .regions
        .iter()
        .find(|rule| planes.get(rule.cut.as_str()).copied().flatten().is_none())
    {
        return Err(GeometryError::DegenerateCut {
            piece: piece.name.clone(),
            cut: rule.cut.clone(),
        });
    }

    let (local, source_vertices) = reindex(mesh, faces);
    let patch = Patch::new(id, piece.name.as_str(), local, source_vertices, up)?;

    let names = garment.template.piece_keypoints(piece);
    let landmarks = names
        .iter()
        .filter_map(|name| garment.keypoint_position(name).map(|p| (name.as_str(), p)));
    let patch = patch.with_landmarks(landmarks, &piece.anchors);

    debug!(
        "Patch '{}': {} vertices, {} faces, {} loops, {} landmarks",
        patch.piece_name,
        patch.mesh.vertex_count(),
        patch.mesh.face_count(),
        patch.loops.len(),
        patch.landmarks.len()
    );

    Ok(patch)
}

/// Copy `faces` into a fresh mesh, numbering vertices in first-use order.
fn reindex(mesh: &Mesh, faces: &[[u32; 3]]) -> (Mesh, Vec<u32>) {
    let mut remap: HashMap<u32, u32> = HashMap::new();
    let mut source = Vec::new();
    let mut local_faces = Vec::with_capacity(faces.len());

    for face in faces {
        let mut local = [0u32; 3];
        for (slot, &v) in local.iter_mut().zip(face) {
            *slot = *remap.entry(v).or_insert_with(|| {
                source.push(v);
                (source.len() - 1) as u32
            });
        }
        local_faces.push(local);
    }

    let local = Mesh::from_parts(source.iter().map(|&v| mesh.position(v)), local_faces);
    (local, source)
}
