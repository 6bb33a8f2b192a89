//! Validation and normalization of the incoming garment.

use std::collections::BTreeMap;
use std::sync::Arc;

use nalgebra::{Point3, Vector3};
use pattern_mesh::{
    fix_winding_order, log_validation, remove_degenerate_triangles,
    remove_unreferenced_vertices, validate_mesh, Mesh,
};
use tracing::{debug, info, warn};

use crate::config::PatternConfig;
use crate::error::InputError;
use crate::input::{GarmentInput, GarmentType, Keypoint, MeshInput};
use crate::measurement::MeasurementVector;
use crate::template::{GarmentTemplate, TemplateLibrary};

/// Faces below this area are dropped as degenerate.
pub const DEGENERATE_AREA: f64 = 1e-12;

/// A validated, read-only garment ready for segmentation.
#[derive(Debug, Clone)]
pub struct IngestedGarment {
    pub garment_type: GarmentType,
    pub mesh: Arc<Mesh>,
    /// Best keypoint per name.
    pub keypoints: BTreeMap<String, Keypoint>,
    pub template: Arc<GarmentTemplate>,
    /// Template base body with the wearer's measurements applied.
    pub reference_measurements: MeasurementVector,
}

impl IngestedGarment {
    pub fn keypoint_position(&self, name: &str) -> Option<Point3<f64>> {
        self.keypoints.get(name).map(|k| k.position)
    }
}

/// Validate and normalize a garment.
///
/// Rejects the input before any geometry stage runs when the garment type
/// has no template, a body measurement is not positive, the surface is
/// malformed or non-manifold, or a template keypoint group is incomplete.
pub fn ingest(
    input: &GarmentInput,
    library: &TemplateLibrary,
    config: &PatternConfig,
) -> Result<IngestedGarment, InputError> {
    let template = library.template_for(input.garment_type)?;
    debug!(
        "Garment type {} uses template '{}'",
        input.garment_type, template.name
    );

    if let Some((dimension, value)) = input.measurements.as_ref().and_then(|m| m.first_invalid()) {
        return Err(InputError::InvalidMeasurement {
            dimension: dimension.to_string(),
            value,
        });
    }

    let mut mesh = triangulate(&input.mesh)?;

    let report = validate_mesh(&mesh, DEGENERATE_AREA);
    log_validation(&report);
    if !report.is_well_formed() {
        return Err(InputError::MalformedMesh {
            details: format!(
                "{} vertices, {} faces, {} out-of-range faces, {} faces with repeated indices",
                report.vertex_count,
                report.face_count,
                report.out_of_range_faces,
                report.repeated_index_faces
            ),
        });
    }
    if !report.is_manifold() {
        return Err(InputError::MalformedMesh {
            details: format!("{} non-manifold edges", report.non_manifold_edge_count),
        });
    }

    remove_degenerate_triangles(&mut mesh, DEGENERATE_AREA);
    remove_unreferenced_vertices(&mut mesh);
    if mesh.is_empty() {
        return Err(InputError::MalformedMesh {
            details: "no faces left after removing degenerate triangles".into(),
        });
    }
    fix_winding_order(&mut mesh);
    orient_outward(&mut mesh);

    let keypoints = collect_keypoints(&input.keypoints);
    check_keypoint_groups(&template, &keypoints, config.min_keypoint_confidence)?;

    let reference_measurements = match &input.measurements {
        Some(body) => template.base_measurements.overridden_by(body),
        None => template.base_measurements.clone(),
    };

    info!(
        "Ingested {}: {} vertices, {} faces, {} keypoints",
        input.garment_type,
        mesh.vertex_count(),
        mesh.face_count(),
        keypoints.len()
    );

    Ok(IngestedGarment {
        garment_type: input.garment_type,
        mesh: Arc::new(mesh),
        keypoints,
        template,
        reference_measurements,
    })
}

/// Fan-triangulate polygon faces.
pub(crate) fn triangulate(input: &MeshInput) -> Result<Mesh, InputError> {
    if input.vertices.is_empty() || input.faces.is_empty() {
        return Err(InputError::MalformedMesh {
            details: "mesh has no vertices or faces".into(),
        });
    }
    if let Some(v) = input.vertices.iter().find(|v| v.iter().any(|c| !c.is_finite())) {
        return Err(InputError::MalformedMesh {
            details: format!("non-finite vertex {v:?}"),
        });
    }

    let mut faces = Vec::with_capacity(input.faces.len());
    for (idx, polygon) in input.faces.iter().enumerate() {
        if polygon.len() < 3 {
            return Err(InputError::MalformedMesh {
                details: format!("face {idx} has {} vertices", polygon.len()),
            });
        }
        for k in 1..polygon.len() - 1 {
            faces.push([polygon[0], polygon[k], polygon[k + 1]]);
        }
    }

    Ok(Mesh::from_parts(
        input.vertices.iter().map(|&[x, y, z]| Point3::new(x, y, z)),
        faces,
    ))
}

/// Flip components whose faces point towards the surface centre.
fn orient_outward(mesh: &mut Mesh) {
    let Some((min, max)) = mesh.bounds() else {
        return;
    };
    let center = nalgebra::center(&min, &max);

    let adjacency = mesh.adjacency();
    let mut component = vec![usize::MAX; mesh.faces.len()];
    let mut outwardness: Vec<f64> = Vec::new();
    for seed in 0..mesh.faces.len() {
        if component[seed] != usize::MAX {
            continue;
        }
        let id = outwardness.len();
        outwardness.push(0.0);
        component[seed] = id;
        let mut stack = vec![seed as u32];
        while let Some(face) = stack.pop() {
            for next in adjacency.face_neighbors(&mesh.faces, face) {
                if component[next as usize] == usize::MAX {
                    component[next as usize] = id;
                    stack.push(next);
                }
            }
        }
    }

    for (tri, &id) in mesh.triangles().zip(&component) {
        let n: Vector3<f64> = tri.normal_unnormalized();
        outwardness[id] += n.dot(&(tri.centroid() - center));
    }

    let mut flipped = 0;
    for (face, &id) in mesh.faces.iter_mut().zip(&component) {
        if outwardness[id] < 0.0 {
            face.swap(1, 2);
            flipped += 1;
        }
    }
    if flipped > 0 {
        debug!("Flipped {} inward-facing faces", flipped);
    }
}

/// Keep the most confident keypoint per name; drop non-finite ones.
fn collect_keypoints(keypoints: &[Keypoint]) -> BTreeMap<String, Keypoint> {
    let mut best: BTreeMap<String, Keypoint> = BTreeMap::new();
    for kp in keypoints {
        if !kp.confidence.is_finite() || kp.position.iter().any(|c| !c.is_finite()) {
            warn!("Ignoring keypoint '{}' with non-finite values", kp.name);
            continue;
        }
        match best.get(&kp.name) {
            Some(existing) if existing.confidence >= kp.confidence => {}
            _ => {
                best.insert(kp.name.clone(), kp.clone());
            }
        }
    }
    best
}

fn check_keypoint_groups(
    template: &GarmentTemplate,
    keypoints: &BTreeMap<String, Keypoint>,
    min_confidence: f64,
) -> Result<(), InputError> {
    for (group, names) in &template.keypoint_groups {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| {
                keypoints
                    .get(name.as_str())
                    .map_or(true, |kp| kp.confidence < min_confidence)
            })
            .cloned()
            .collect();
        if !missing.is_empty() {
            warn!("Keypoint group '{}' incomplete: {:?}", group, missing);
            return Err(InputError::InsufficientData {
                group: group.clone(),
                missing,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;

    fn library() -> Arc<TemplateLibrary> {
        TemplateLibrary::builtin().unwrap()
    }

    #[test]
    fn test_torso_ingests() {
        let input = synthetic::torso_input();
        let garment = ingest(&input, &library(), &PatternConfig::default()).unwrap();

        assert_eq!(garment.template.name, "torso");
        assert_eq!(garment.mesh.face_count(), input.mesh.faces.len());
        assert_eq!(garment.reference_measurements.get(crate::Dimension::Bust), Some(94.0));
    }

    #[test]
    fn test_quads_are_fan_triangulated() {
        let mesh = triangulate(&MeshInput {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0], [-0.5, 0.5, 0.0]],
            faces: vec![vec![0, 1, 2, 3, 4]],
        })
        .unwrap();
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 2, 3], [0, 3, 4]]);
    }

    #[test]
    fn test_out_of_range_index_is_malformed() {
        let mut input = synthetic::torso_input();
        input.mesh.faces.push(vec![0, 1, 100_000]);
        let err = ingest(&input, &library(), &PatternConfig::default()).unwrap_err();
        assert!(matches!(err, InputError::MalformedMesh { .. }));
    }

    #[test]
    fn test_non_manifold_is_malformed() {
        let mut input = synthetic::torso_input();
        let first = input.mesh.faces[0].clone();
        input.mesh.vertices.push([0.0, 100.0, 100.0]);
        let extra = (input.mesh.vertices.len() - 1) as u32;
        // Third face on the first edge.
        input.mesh.faces.push(vec![first[0], first[1], extra]);
        let err = ingest(&input, &library(), &PatternConfig::default()).unwrap_err();
        assert!(err.to_string().contains("non-manifold"));
    }

    #[test]
    fn test_low_confidence_keypoint_is_missing() {
        let mut input = synthetic::torso_input();
        for kp in &mut input.keypoints {
            if kp.name == "center_back" {
                kp.confidence = 0.2;
            }
        }
        let err = ingest(&input, &library(), &PatternConfig::default()).unwrap_err();
        match err {
            InputError::InsufficientData { group, missing } => {
                assert_eq!(group, "back_view");
                assert_eq!(missing, vec!["center_back".to_string()]);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_duplicate_keypoints_keep_best() {
        let kps = vec![
            Keypoint::new("a", Point3::new(0.0, 0.0, 0.0), 0.4),
            Keypoint::new("a", Point3::new(1.0, 0.0, 0.0), 0.9),
            Keypoint::new("a", Point3::new(2.0, 0.0, 0.0), 0.6),
        ];
        let best = collect_keypoints(&kps);
        assert_eq!(best["a"].position.x, 1.0);
    }

    #[test]
    fn test_unknown_template_rejected() {
        let mut input = synthetic::torso_input();
        input.garment_type = GarmentType::Jacket;
        let err = ingest(&input, &library(), &PatternConfig::default()).unwrap_err();
        assert!(matches!(err, InputError::UnknownTemplate { .. }));
    }

    #[test]
    fn test_inward_tube_is_flipped_outward() {
        let mut input = synthetic::torso_input();
        for face in &mut input.mesh.faces {
            face.swap(1, 2);
        }
        let garment = ingest(&input, &library(), &PatternConfig::default()).unwrap();
        let reference = ingest(&synthetic::torso_input(), &library(), &PatternConfig::default()).unwrap();
        assert_eq!(garment.mesh.faces, reference.mesh.faces);
    }

    #[test]
    fn test_body_measurements_override_base() {
        let input = synthetic::torso_input()
            .with_measurements(MeasurementVector::new().with(crate::Dimension::Waist, 70.0));
        let garment = ingest(&input, &library(), &PatternConfig::default()).unwrap();
        assert_eq!(garment.reference_measurements.get(crate::Dimension::Waist), Some(70.0));
        assert_eq!(garment.reference_measurements.get(crate::Dimension::Bust), Some(94.0));
    }

    #[test]
    fn test_non_positive_body_measurement_is_rejected() {
        for bad in [-94.0, 0.0, f64::NAN] {
            let input = synthetic::torso_input()
                .with_measurements(MeasurementVector::new().with(crate::Dimension::Bust, bad));
            let err = ingest(&input, &library(), &PatternConfig::default()).unwrap_err();
            match err {
                InputError::InvalidMeasurement { dimension, .. } => assert_eq!(dimension, "bust"),
                other => panic!("unexpected error {other}"),
            }
        }
    }
}
