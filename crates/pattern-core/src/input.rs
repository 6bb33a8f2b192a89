//! The garment document handed over by the reconstruction stage.

use std::fmt;
use std::path::Path;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::measurement::MeasurementVector;

/// Garment type tag assigned by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GarmentType {
    Shirt,
    TShirt,
    Blouse,
    Dress,
    Skirt,
    Pants,
    Jeans,
    Jacket,
    Coat,
    Sweater,
    Torso,
}

impl GarmentType {
    pub const ALL: [GarmentType; 11] = [
        GarmentType::Shirt,
        GarmentType::TShirt,
        GarmentType::Blouse,
        GarmentType::Dress,
        GarmentType::Skirt,
        GarmentType::Pants,
        GarmentType::Jeans,
        GarmentType::Jacket,
        GarmentType::Coat,
        GarmentType::Sweater,
        GarmentType::Torso,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GarmentType::Shirt => "shirt",
            GarmentType::TShirt => "t-shirt",
            GarmentType::Blouse => "blouse",
            GarmentType::Dress => "dress",
            GarmentType::Skirt => "skirt",
            GarmentType::Pants => "pants",
            GarmentType::Jeans => "jeans",
            GarmentType::Jacket => "jacket",
            GarmentType::Coat => "coat",
            GarmentType::Sweater => "sweater",
            GarmentType::Torso => "torso",
        }
    }
}

impl fmt::Display for GarmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GarmentType {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GarmentType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| InputError::UnknownTemplate {
                garment_type: s.to_string(),
            })
    }
}

/// A named landmark detected on the garment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub name: String,
    pub position: Point3<f64>,
    pub confidence: f64,
}

impl Keypoint {
    pub fn new(name: impl Into<String>, position: Point3<f64>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            position,
            confidence,
        }
    }
}

/// Raw surface as delivered: faces may be any polygon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshInput {
    pub vertices: Vec<[f64; 3]>,
    pub faces: Vec<Vec<u32>>,
}

impl MeshInput {
    /// Wrap an already triangulated surface.
    pub fn from_mesh(mesh: &pattern_mesh::Mesh) -> Self {
        Self {
            vertices: mesh
                .vertices
                .iter()
                .map(|v| [v.position.x, v.position.y, v.position.z])
                .collect(),
            faces: mesh.faces.iter().map(|f| f.to_vec()).collect(),
        }
    }
}

/// Everything one session needs from upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GarmentInput {
    pub mesh: MeshInput,
    pub garment_type: GarmentType,
    #[serde(default)]
    pub keypoints: Vec<Keypoint>,
    /// Measurements of the wearer; they replace the template's base body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurements: Option<MeasurementVector>,
}

impl GarmentInput {
    pub fn new(mesh: MeshInput, garment_type: GarmentType, keypoints: Vec<Keypoint>) -> Self {
        Self {
            mesh,
            garment_type,
            keypoints,
            measurements: None,
        }
    }

    pub fn with_measurements(mut self, measurements: MeasurementVector) -> Self {
        self.measurements = Some(measurements);
        self
    }

    /// Decode a garment document from JSON.
    pub fn from_json(json: &str) -> Result<Self, InputError> {
        serde_json::from_str(json).map_err(|e| InputError::InvalidDocument {
            details: e.to_string(),
        })
    }

    /// Read a garment document from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, InputError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| InputError::InvalidDocument {
            details: format!("{}: {e}", path.display()),
        })?;
        Self::from_json(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document() {
        let input = GarmentInput::from_json(
            r#"{
                "mesh": { "vertices": [[0,0,0],[1,0,0],[1,1,0],[0,1,0]], "faces": [[0,1,2,3]] },
                "garment_type": "t-shirt",
                "keypoints": [{ "name": "neck_front", "position": [0.5, 1.0, 0.0], "confidence": 0.9 }],
                "measurements": { "bust": 96.0 }
            }"#,
        )
        .unwrap();

        assert_eq!(input.garment_type, GarmentType::TShirt);
        assert_eq!(input.mesh.faces[0].len(), 4);
        assert_eq!(input.keypoints[0].position, Point3::new(0.5, 1.0, 0.0));
        assert!(input.measurements.is_some());
    }

    #[test]
    fn test_unknown_tag_is_invalid_document() {
        let err = GarmentInput::from_json(
            r#"{ "mesh": { "vertices": [], "faces": [] }, "garment_type": "poncho" }"#,
        )
        .unwrap_err();
        assert!(matches!(err, InputError::InvalidDocument { .. }));
    }

    #[test]
    fn test_garment_type_parses_from_tag() {
        assert_eq!("t-shirt".parse::<GarmentType>().unwrap(), GarmentType::TShirt);
        assert_eq!("Jeans".parse::<GarmentType>().unwrap(), GarmentType::Jeans);
        assert!(matches!(
            "poncho".parse::<GarmentType>(),
            Err(InputError::UnknownTemplate { .. })
        ));
    }

    #[test]
    fn test_garment_type_display_matches_serde() {
        for tag in [GarmentType::TShirt, GarmentType::Jeans, GarmentType::Torso] {
            let json = serde_json::to_string(&tag).unwrap();
            assert_eq!(json, format!("\"{tag}\""));
        }
    }
}
