//! Per-piece view of the template and configuration shared by the
//! post-flattening stages.

use std::collections::BTreeMap;

use crate::config::PatternConfig;
use crate::measurement::MeasurementVector;
use crate::segment::PatchId;
use crate::template::{GarmentTemplate, PieceSpec};

#[derive(Debug, Clone, Copy)]
pub struct PieceContext<'a> {
    pub template: &'a GarmentTemplate,
    pub piece: &'a PieceSpec,
    /// Body the piece is fitted to.
    pub reference: &'a MeasurementVector,
    /// Ids of every piece that produced a patch.
    pub patch_ids: &'a BTreeMap<String, PatchId>,
    pub config: &'a PatternConfig,
}

impl<'a> PieceContext<'a> {
    pub fn piece_name(&self) -> &'a str {
        &self.piece.name
    }

    pub fn patch_id(&self, piece: &str) -> Option<PatchId> {
        self.patch_ids.get(piece).copied()
    }
}
