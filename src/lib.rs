// Clippy allows for the whole crate
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

//! tigbuild: greedy unitig and contig construction from read overlaps.
//!
//! Given a store of sequencing-read lengths and a store of pairwise read
//! overlaps, this library builds contigs: it caches and symmetrizes the
//! overlaps under a memory budget, picks one best edge per read end,
//! threads reads into greedy tigs, then refines the layouts through
//! position optimization, orphan and bubble merging, repeat splitting,
//! and classification, finally emitting per-read placements for a
//! downstream consensus stage.
//!
//! # Pipeline
//!
//! ```rust,no_run
//! use tigbuild::prelude::*;
//!
//! let ri = ReadInfo::from_store("asm.seqStore", 0, u32::MAX).unwrap();
//! let cache = OverlapCache::load("asm.ovlStore", None, &ri, &CacheParams {
//!     max_erate: 0.1,
//!     min_overlap: 500,
//!     min_olap_percent: 0.0,
//!     mem_limit: u64::MAX,
//!     genome_size: 5_000_000,
//! }).unwrap();
//! let og = BestOverlapGraph::build(&ri, &cache, &BestGraphParams::default());
//!
//! let mut tigs = TigVector::new(ri.num_reads());
//! let mut cg = ChunkGraph::build(&ri, &og);
//! populate_unitigs(&ri, &og, &mut cg, &mut tigs);
//! ```

pub mod best_graph;
pub mod chunk_graph;
pub mod error;
pub mod intervals;
pub mod overlap;
pub mod overlap_cache;
pub mod parallel;
pub mod phases;
pub mod place_read;
pub mod read_info;
pub mod stores;
pub mod tig;

// Re-export commonly used types
pub use best_graph::{BestGraphParams, BestOverlapGraph, CovGapType, LopsidedMode};
pub use chunk_graph::ChunkGraph;
pub use error::{AsmError, Result};
pub use overlap::Overlap;
pub use overlap_cache::{CacheParams, OverlapCache};
pub use place_read::{place_read_using_overlaps, PlaceMode, Placement};
pub use read_info::ReadInfo;
pub use tig::{PlacedRead, TigVector, Unitig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::best_graph::{BestGraphParams, BestOverlapGraph, CovGapType, LopsidedMode};
    pub use crate::chunk_graph::ChunkGraph;
    pub use crate::error::{AsmError, Result};
    pub use crate::overlap_cache::{CacheParams, OverlapCache};
    pub use crate::phases::{
        classify_unassembled, find_circular_contigs, mark_repeat_reads, merge_orphans,
        place_unplaced_using_all_overlaps, populate_unitigs, promote_to_singleton,
        set_parent_and_hang, split_discontinuous, write_tigs, RepeatParams, UnassembledParams,
    };
    pub use crate::place_read::{place_read_using_overlaps, PlaceMode, Placement};
    pub use crate::read_info::ReadInfo;
    pub use crate::tig::{PlacedRead, TigVector, Unitig};
}
