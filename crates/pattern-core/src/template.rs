//! Declarative garment topology tables.
//!
//! A template tells the pipeline, for one family of garment types, which
//! keypoints must be present, where to cut, what each resulting piece is
//! called, how it is graded, where darts may go and which edges are sewn
//! together. Templates are data: the built-in library is a TOML document
//! compiled into the crate, and callers may load their own.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{InputError, TemplateError};
use crate::input::GarmentType;
use crate::measurement::{Dimension, MeasurementVector};

const BUILTIN_TOML: &str = include_str!("../templates/builtin.toml");

static BUILTIN: OnceLock<Result<Arc<TemplateLibrary>, TemplateError>> = OnceLock::new();

/// How a cut plane is placed from keypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CutSpec {
    /// Plane through two keypoints containing the up axis.
    Vertical { from: String, to: String },
    /// Plane through a keypoint with the up axis as normal.
    Horizontal { at: String },
    /// Plane through a keypoint, normal pointing from one keypoint to another.
    Plane {
        through: String,
        normal_from: String,
        normal_to: String,
    },
}

impl CutSpec {
    /// Keypoints this cut is built from.
    pub fn keypoints(&self) -> Vec<&str> {
        match self {
            CutSpec::Vertical { from, to } => vec![from.as_str(), to.as_str()],
            CutSpec::Horizontal { at } => vec![at.as_str()],
            CutSpec::Plane {
                through,
                normal_from,
                normal_to,
            } => vec![through.as_str(), normal_from.as_str(), normal_to.as_str()],
        }
    }

    /// Build the plane; `None` when a keypoint is missing or the keypoints
    /// do not span a plane.
    pub fn resolve(
        &self,
        up: &Vector3<f64>,
        lookup: impl Fn(&str) -> Option<Point3<f64>>,
    ) -> Option<CutPlane> {
        let (point, normal) = match self {
            CutSpec::Vertical { from, to } => {
                let a = lookup(from)?;
                let b = lookup(to)?;
                (a, (b - a).cross(up))
            }
            CutSpec::Horizontal { at } => (lookup(at)?, *up),
            CutSpec::Plane {
                through,
                normal_from,
                normal_to,
            } => (lookup(through)?, lookup(normal_to)? - lookup(normal_from)?),
        };
        let len = normal.norm();
        (len > 1e-9).then(|| CutPlane {
            point,
            normal: normal / len,
        })
    }
}

/// A resolved oriented cut plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutPlane {
    pub point: Point3<f64>,
    pub normal: Vector3<f64>,
}

impl CutPlane {
    #[inline]
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        (p - self.point).dot(&self.normal)
    }
}

/// Which side of a cut a piece lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Signed distance strictly positive.
    Positive,
    /// Signed distance zero or negative.
    Negative,
}

impl Side {
    #[inline]
    pub fn accepts(&self, signed_distance: f64) -> bool {
        match self {
            Side::Positive => signed_distance > 0.0,
            Side::Negative => signed_distance <= 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRule {
    pub cut: String,
    pub side: Side,
}

/// Horizontal grading line: below/above it the piece widens by the
/// dimension's factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlLine {
    pub at: String,
    pub dimension: Dimension,
}

/// Direction a dart's legs open towards from its apex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DartOpening {
    #[default]
    Down,
    Up,
}

/// A horizontal level where the flattened width is compared against the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossSection {
    pub name: String,
    pub at: String,
    #[serde(default)]
    pub offset: f64,
    pub dimension: Dimension,
    /// Fraction of the body circumference this piece covers.
    pub share: f64,
    #[serde(default)]
    pub opens: DartOpening,
    #[serde(default)]
    pub apex_candidates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSpec {
    #[serde(default = "default_fabric")]
    pub fabric: String,
    #[serde(default = "default_cut_quantity")]
    pub cut_quantity: u32,
}

impl Default for LabelSpec {
    fn default() -> Self {
        Self {
            fabric: default_fabric(),
            cut_quantity: default_cut_quantity(),
        }
    }
}

fn default_fabric() -> String {
    "main".to_string()
}

fn default_cut_quantity() -> u32 {
    1
}

fn default_up() -> Vector3<f64> {
    Vector3::y()
}

/// One pattern piece of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieceSpec {
    pub name: String,
    pub regions: Vec<RegionRule>,
    #[serde(default)]
    pub anchors: Vec<String>,
    /// Extra keypoints to track on this piece.
    #[serde(default)]
    pub landmarks: Vec<String>,
    /// Grain direction in degrees from the piece's vertical, clockwise.
    #[serde(default)]
    pub grain_angle_deg: f64,
    #[serde(default)]
    pub control_lines: Vec<ControlLine>,
    #[serde(default)]
    pub length_dimension: Option<Dimension>,
    #[serde(default)]
    pub cross_sections: Vec<CrossSection>,
    #[serde(default)]
    pub label: LabelSpec,
}

/// One piece's edge of a seam, running from `from` to `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeamSide {
    pub piece: String,
    pub from: String,
    pub to: String,
    /// Keypoint the edge passes through; without one the edge is the
    /// shorter way round the outline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
}

/// Two piece edges sewn together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeamSpec {
    pub name: String,
    #[serde(default)]
    pub notches: Vec<f64>,
    pub a: SeamSide,
    pub b: SeamSide,
}

impl SeamSpec {
    /// Notch fractions in ascending order.
    pub fn notch_fractions(&self) -> Vec<f64> {
        let mut fractions = self.notches.clone();
        fractions.sort_by(f64::total_cmp);
        fractions
    }

    /// This piece's side and the opposite side, if the seam touches `piece`.
    pub fn sides_for(&self, piece: &str) -> Option<(&SeamSide, &SeamSide)> {
        if self.a.piece == piece {
            Some((&self.a, &self.b))
        } else if self.b.piece == piece {
            Some((&self.b, &self.a))
        } else {
            None
        }
    }
}

/// Topology table for a family of garment types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GarmentTemplate {
    pub name: String,
    pub garment_types: Vec<GarmentType>,
    #[serde(default = "default_up")]
    pub up: Vector3<f64>,
    pub keypoint_groups: BTreeMap<String, Vec<String>>,
    pub cuts: BTreeMap<String, CutSpec>,
    pub pieces: Vec<PieceSpec>,
    #[serde(default)]
    pub seams: Vec<SeamSpec>,
    pub base_measurements: MeasurementVector,
}

impl GarmentTemplate {
    pub fn piece(&self, name: &str) -> Option<&PieceSpec> {
        self.pieces.iter().find(|p| p.name == name)
    }

    /// Unit up axis.
    pub fn up_axis(&self) -> Vector3<f64> {
        self.up.normalize()
    }

    /// Every keypoint named by a group.
    pub fn required_keypoints(&self) -> BTreeSet<&str> {
        self.keypoint_groups
            .values()
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// Seams touching `piece`, as (seam, own side, other side).
    pub fn seams_for<'a>(
        &'a self,
        piece: &'a str,
    ) -> impl Iterator<Item = (&'a SeamSpec, &'a SeamSide, &'a SeamSide)> + 'a {
        self.seams
            .iter()
            .filter_map(move |s| s.sides_for(piece).map(|(own, other)| (s, own, other)))
    }

    /// Keypoints that must be located on `piece`'s patch.
    pub fn piece_keypoints(&self, piece: &PieceSpec) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = BTreeSet::new();
        names.extend(piece.anchors.iter().cloned());
        names.extend(piece.landmarks.iter().cloned());
        names.extend(piece.control_lines.iter().map(|c| c.at.clone()));
        for section in &piece.cross_sections {
            names.insert(section.at.clone());
            names.extend(section.apex_candidates.iter().cloned());
        }
        for (_, own, _) in self.seams_for(&piece.name) {
            names.insert(own.from.clone());
            names.insert(own.to.clone());
            names.extend(own.via.iter().cloned());
        }
        names
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), TemplateError> {
        let invalid = |details: String| TemplateError::Invalid {
            template: self.name.clone(),
            details,
        };

        if self.garment_types.is_empty() {
            return Err(invalid("no garment types".into()));
        }
        if !(self.up.norm() > 1e-9) {
            return Err(invalid("up axis is zero".into()));
        }

        let known = self.required_keypoints();
        let check_kp = |name: &str, context: &str| {
            if known.contains(name) {
                Ok(())
            } else {
                Err(invalid(format!(
                    "{context} references keypoint '{name}' outside every keypoint group"
                )))
            }
        };
        let check_dim = |dim: Dimension, context: &str| match self.base_measurements.get(dim) {
            Some(v) if v > 0.0 && v.is_finite() => Ok(()),
            _ => Err(invalid(format!(
                "{context} uses dimension '{dim}' without a positive base measurement"
            ))),
        };

        for (name, cut) in &self.cuts {
            for kp in cut.keypoints() {
                check_kp(kp, &format!("cut '{name}'"))?;
            }
        }

        if self.pieces.is_empty() {
            return Err(invalid("no pieces".into()));
        }
        let mut piece_names = BTreeSet::new();
        for piece in &self.pieces {
            let ctx = format!("piece '{}'", piece.name);
            if !piece_names.insert(piece.name.as_str()) {
                return Err(invalid(format!("duplicate {ctx}")));
            }
            if piece.regions.is_empty() {
                return Err(invalid(format!("{ctx} has no region rules")));
            }
            for rule in &piece.regions {
                if !self.cuts.contains_key(&rule.cut) {
                    return Err(invalid(format!("{ctx} uses unknown cut '{}'", rule.cut)));
                }
            }
            for kp in piece.anchors.iter().chain(&piece.landmarks) {
                check_kp(kp, &ctx)?;
            }
            for line in &piece.control_lines {
                check_kp(&line.at, &ctx)?;
                check_dim(line.dimension, &ctx)?;
            }
            if let Some(dim) = piece.length_dimension {
                check_dim(dim, &ctx)?;
            }
            if !piece.grain_angle_deg.is_finite() {
                return Err(invalid(format!("{ctx} has a non-finite grain angle")));
            }
            for section in &piece.cross_sections {
                let sctx = format!("{ctx} section '{}'", section.name);
                check_kp(&section.at, &sctx)?;
                for kp in &section.apex_candidates {
                    check_kp(kp, &sctx)?;
                }
                check_dim(section.dimension, &sctx)?;
                if !(section.share > 0.0 && section.share <= 1.0) {
                    return Err(invalid(format!("{sctx} share must be in (0, 1]")));
                }
                if !section.offset.is_finite() {
                    return Err(invalid(format!("{sctx} offset is not finite")));
                }
            }
        }

        for seam in &self.seams {
            let ctx = format!("seam '{}'", seam.name);
            for side in [&seam.a, &seam.b] {
                if !piece_names.contains(side.piece.as_str()) {
                    return Err(invalid(format!("{ctx} joins unknown piece '{}'", side.piece)));
                }
                check_kp(&side.from, &ctx)?;
                check_kp(&side.to, &ctx)?;
                if let Some(via) = &side.via {
                    check_kp(via, &ctx)?;
                }
            }
            if seam.a.piece == seam.b.piece {
                return Err(invalid(format!("{ctx} joins a piece to itself")));
            }
            if let Some(f) = seam.notches.iter().find(|f| !(**f > 0.0 && **f < 1.0)) {
                return Err(invalid(format!("{ctx} notch fraction {f} outside (0, 1)")));
            }
        }

        Ok(())
    }
}

#[derive(Deserialize)]
struct LibraryDocument {
    #[serde(rename = "template", default)]
    templates: Vec<GarmentTemplate>,
}

/// Read-only registry of templates keyed by garment type.
#[derive(Debug)]
pub struct TemplateLibrary {
    templates: Vec<Arc<GarmentTemplate>>,
    by_type: HashMap<GarmentType, usize>,
}

impl TemplateLibrary {
    /// Build a library from templates, validating each.
    pub fn new(templates: Vec<GarmentTemplate>) -> Result<Self, TemplateError> {
        let mut by_type = HashMap::new();
        for (idx, template) in templates.iter().enumerate() {
            template.validate()?;
            for &garment_type in &template.garment_types {
                if by_type.insert(garment_type, idx).is_some() {
                    return Err(TemplateError::DuplicateGarmentType {
                        garment_type: garment_type.to_string(),
                    });
                }
            }
        }

        debug!("Template library: {} templates", templates.len());

        Ok(Self {
            templates: templates.into_iter().map(Arc::new).collect(),
            by_type,
        })
    }

    /// Parse a library from TOML (`[[template]]` entries).
    pub fn from_toml(toml_str: &str) -> Result<Self, TemplateError> {
        let doc: LibraryDocument = toml::from_str(toml_str).map_err(|e| TemplateError::Parse {
            details: e.to_string(),
        })?;
        Self::new(doc.templates)
    }

    /// Load a library from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| TemplateError::Io {
            path: path.to_path_buf(),
            details: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// The built-in library, parsed once per process.
    pub fn builtin() -> Result<Arc<TemplateLibrary>, TemplateError> {
        BUILTIN
            .get_or_init(|| Self::from_toml(BUILTIN_TOML).map(Arc::new))
            .clone()
    }

    /// Template registered for a garment type.
    pub fn template_for(&self, garment_type: GarmentType) -> Result<Arc<GarmentTemplate>, InputError> {
        self.by_type
            .get(&garment_type)
            .map(|&idx| Arc::clone(&self.templates[idx]))
            .ok_or_else(|| InputError::UnknownTemplate {
                garment_type: garment_type.to_string(),
            })
    }

    pub fn templates(&self) -> impl Iterator<Item = &GarmentTemplate> {
        self.templates.iter().map(|t| t.as_ref())
    }

    /// Garment types with a registered topology, sorted.
    pub fn garment_types(&self) -> Vec<GarmentType> {
        let mut types: Vec<GarmentType> = self.by_type.keys().copied().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(extra: &str) -> String {
        format!(
            r#"
            [[template]]
            name = "panel"
            garment_types = ["skirt"]

            [template.keypoint_groups]
            front_view = ["a", "b"]

            [template.cuts.split]
            kind = "vertical"
            from = "a"
            to = "b"

            [template.base_measurements]
            waist = 70.0

            [[template.pieces]]
            name = "front"
            regions = [{{ cut = "split", side = "positive" }}]
            {extra}
            "#
        )
    }

    #[test]
    fn test_builtin_library_parses() {
        let library = TemplateLibrary::builtin().expect("builtin templates are valid");
        let shirt = library.template_for(GarmentType::TShirt).unwrap();
        assert_eq!(shirt.name, "shirt");
        assert!(shirt.required_keypoints().contains("neck_front"));
        assert_eq!(library.template_for(GarmentType::Jeans).unwrap().name, "pants");
        assert_eq!(library.template_for(GarmentType::Torso).unwrap().pieces.len(), 2);
    }

    #[test]
    fn test_shirt_and_pants_panels_are_joined_on_every_edge() {
        let library = TemplateLibrary::builtin().unwrap();

        let pants = library.template_for(GarmentType::Pants).unwrap();
        let names: BTreeSet<&str> = pants.seams.iter().map(|s| s.name.as_str()).collect();
        for seam in ["outseam_left", "outseam_right", "inseam_left", "inseam_right", "front_rise", "back_rise"] {
            assert!(names.contains(seam), "pants lack {seam}");
        }

        // Each sleeve half meets the bodice, its twin below the arm and above it.
        let shirt = library.template_for(GarmentType::Shirt).unwrap();
        for piece in ["sleeve_left_front", "sleeve_left_back", "sleeve_right_front", "sleeve_right_back"] {
            let joined: Vec<&str> = shirt.seams_for(piece).map(|(s, _, _)| s.name.as_str()).collect();
            assert_eq!(joined.len(), 3, "{piece}: {joined:?}");
            assert!(joined[0].starts_with("armhole_"));
        }
        let back: Vec<&str> = shirt.seams_for("back").map(|(s, _, _)| s.name.as_str()).collect();
        assert!(back.contains(&"armhole_back_left") && back.contains(&"armhole_back_right"));
    }

    #[test]
    fn test_builtin_is_shared() {
        let a = TemplateLibrary::builtin().unwrap();
        let b = TemplateLibrary::builtin().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_unregistered_type_is_unknown_template() {
        let library = TemplateLibrary::builtin().unwrap();
        for tag in [GarmentType::Jacket, GarmentType::Coat, GarmentType::Sweater] {
            assert!(matches!(
                library.template_for(tag),
                Err(InputError::UnknownTemplate { .. })
            ));
        }
        assert!(!library.garment_types().contains(&GarmentType::Coat));
    }

    #[test]
    fn test_vertical_cut_normal() {
        let cut = CutSpec::Vertical {
            from: "l".into(),
            to: "r".into(),
        };
        let plane = cut
            .resolve(&Vector3::y(), |name| match name {
                "l" => Some(Point3::new(-10.0, 0.0, 0.0)),
                "r" => Some(Point3::new(10.0, 0.0, 0.0)),
                _ => None,
            })
            .unwrap();
        assert!((plane.normal - Vector3::z()).norm() < 1e-12);
        assert!(plane.signed_distance(&Point3::new(0.0, 5.0, 3.0)) > 0.0);
        assert!(Side::Negative.accepts(0.0));
        assert!(!Side::Positive.accepts(0.0));
    }

    #[test]
    fn test_degenerate_cut_does_not_resolve() {
        let cut = CutSpec::Vertical {
            from: "a".into(),
            to: "b".into(),
        };
        // Both keypoints on the same vertical line.
        let plane = cut.resolve(&Vector3::y(), |name| match name {
            "a" => Some(Point3::new(1.0, 0.0, 0.0)),
            _ => Some(Point3::new(1.0, 5.0, 0.0)),
        });
        assert!(plane.is_none());
    }

    #[test]
    fn test_minimal_template_is_valid() {
        let library = TemplateLibrary::from_toml(&minimal("")).unwrap();
        let template = library.template_for(GarmentType::Skirt).unwrap();
        assert_eq!(template.up, Vector3::y());
        assert_eq!(template.pieces[0].label, LabelSpec::default());
    }

    #[test]
    fn test_unknown_keypoint_is_rejected() {
        let err = TemplateLibrary::from_toml(&minimal(r#"anchors = ["nowhere"]"#)).unwrap_err();
        assert!(matches!(err, TemplateError::Invalid { .. }));
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_missing_base_dimension_is_rejected() {
        let err = TemplateLibrary::from_toml(&minimal(
            r#"control_lines = [{ at = "a", dimension = "bust" }]"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("bust"));
    }

    #[test]
    fn test_duplicate_garment_type() {
        let doc = format!("{}\n{}", minimal(""), minimal(""));
        assert!(matches!(
            TemplateLibrary::from_toml(&doc),
            Err(TemplateError::DuplicateGarmentType { .. })
        ));
    }

    #[test]
    fn test_seam_sides_and_notch_order() {
        let library = TemplateLibrary::builtin().unwrap();
        let torso = library.template_for(GarmentType::Torso).unwrap();
        let front = torso.piece("front").unwrap();

        let seams: Vec<_> = torso
            .seams_for("front")
            .map(|(s, _, other)| (s.name.as_str(), other.piece.as_str()))
            .collect();
        assert_eq!(seams, vec![("side_left", "back"), ("side_right", "back")]);
        assert!(torso.piece_keypoints(front).contains("side_left_top"));

        let seam = SeamSpec {
            name: "x".into(),
            notches: vec![0.75, 0.25],
            a: torso.seams[0].a.clone(),
            b: torso.seams[0].b.clone(),
        };
        assert_eq!(seam.notch_fractions(), vec![0.25, 0.75]);
    }
}
