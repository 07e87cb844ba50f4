//! Redistribution options.

use crate::algs::communicator::CommTag;
use crate::mesh_error::MeshError;
use serde::{Deserialize, Serialize};

/// Largest tag every MPI implementation accepts (`MPI_TAG_UB` >= 32767).
pub const MAX_TAG: u16 = 32767;

/// First fan-in tag, relative to `tag_base`.
const FAN_IN_OFFSET: u16 = 8;

/// Which redistribution engine to run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// All-to-all when the transport reports native collectives, fan-in otherwise.
    #[default]
    Auto,
    /// Pairwise exchange with every rank over raw byte buffers.
    AllToAll,
    /// Per-owner XOR-tree reduction moving whole meshes.
    FanIn,
}

impl Strategy {
    /// Concrete engine for a transport with or without native collectives.
    pub fn resolve(self, native_collectives: bool) -> Strategy {
        match self {
            Strategy::Auto if native_collectives => Strategy::AllToAll,
            Strategy::Auto => Strategy::FanIn,
            other => other,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedistributeConfig {
    /// Also ship cells that merely overlap a region, duplicating them on
    /// every rank whose regions they touch.
    pub include_all_intersecting_cells: bool,
    /// Point array holding globally unique ids used to merge shared points.
    pub global_id_array_name: Option<String>,
    /// Clip the result to the box formed by the rank's own regions.
    pub clip_cells_to_region: bool,
    /// Keep the decomposition for the next call on an unchanged dataset.
    pub retain_partition_state: bool,
    pub strategy: Strategy,
    /// Number of k-d regions; defaults to the number of ranks.
    pub number_of_regions: Option<usize>,
    /// First message tag; see the `*_tag` helpers for the layout.
    pub tag_base: CommTag,
}

impl Default for RedistributeConfig {
    fn default() -> Self {
        Self {
            include_all_intersecting_cells: false,
            global_id_array_name: None,
            clip_cells_to_region: false,
            retain_partition_state: false,
            strategy: Strategy::Auto,
            number_of_regions: None,
            tag_base: CommTag::default(),
        }
    }
}

impl RedistributeConfig {
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.global_id_array_name.as_deref() == Some("") {
            return Err(MeshError::Config(
                "global id array name must not be empty".into(),
            ));
        }
        let needed = self.tag_base.as_u16() as u32 + FAN_IN_OFFSET as u32 + 2;
        if needed > MAX_TAG as u32 {
            return Err(MeshError::Config(format!(
                "tag base {:#x} leaves no room below {MAX_TAG:#x}",
                self.tag_base.as_u16()
            )));
        }
        Ok(())
    }

    pub fn global_id(&self) -> Option<&str> {
        self.global_id_array_name.as_deref()
    }

    /// Partition oracle record gather (uses two tags).
    pub fn oracle_tag(&self) -> CommTag {
        self.tag_base
    }

    /// Agreement on reusing a retained partition (uses two tags).
    pub fn reuse_tag(&self) -> CommTag {
        self.tag_base.offset(2)
    }

    /// All-to-all size records.
    pub fn size_tag(&self) -> CommTag {
        self.tag_base.offset(4)
    }

    /// All-to-all payloads.
    pub fn payload_tag(&self) -> CommTag {
        self.tag_base.offset(5)
    }

    /// Number of distinct tag triples available to fan-ins.
    pub fn fan_in_slots(&self) -> usize {
        let first = self.tag_base.as_u16() as usize + FAN_IN_OFFSET as usize;
        ((MAX_TAG as usize + 1).saturating_sub(first) / 3).max(1)
    }

    /// Counts, acknowledgement and mesh tags of the fan-in rooted at `root`.
    ///
    /// Roots share a triple when there are more ranks than
    /// [`fan_in_slots`](Self::fan_in_slots). Every rank walks the roots in the
    /// same order and messages on one (peer, tag) pair are not overtaken, so
    /// a shared triple still matches each message to its own root.
    pub fn fan_in_tags(&self, root: usize) -> [CommTag; 3] {
        let slot = (root % self.fan_in_slots()) as u16;
        let base = self.tag_base.offset(FAN_IN_OFFSET + 3 * slot);
        [base, base.offset(1), base.offset(2)]
    }
}
