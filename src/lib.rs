//! # Dynamic GBWT: construction of graph BWT indexes
//!
//! This is a Rust implementation of the dynamic (construction-side) [GBWT](https://github.com/jltsiren/gbwt).
//! It is based on the [Simple-SDS](https://github.com/jltsiren/simple-sds) library.
//!
//! The GBWT is a run-length encoded FM-index storing a collection of paths in a graph
//! as sequences of node identifiers. The dynamic index in this crate supports incremental
//! construction: sequences are inserted in batches, with every sequence in a batch advancing
//! one position per iteration, and the index is a valid multi-string BWT over the inserted
//! sequences after each batch. A finished index can be compressed into a static [`GBWT`]
//! and written to disk, and a static index can be merged back into a dynamic one.
//!
//! # References
//!
//! Jouni Sirén, Erik Garrison, Adam M. Novak, Benedict Paten, and Richard Durbin: **Haplotype-aware graph indexes**.\
//! Bioinformatics 36(2):400-407, 2020.
//! DOI: [10.1093/bioinformatics/btz575](https://doi.org/10.1093/bioinformatics/btz575)
//!
//! # Notes
//!
//! * See [Simple-SDS](https://github.com/jltsiren/simple-sds) for assumptions on the environment.
//! * Construction is batched and not in-place: a batch of sequences is buffered in memory
//!   and inserted by a background worker while the caller fills the next buffer.

pub mod build;
pub mod bwt;
pub mod dynamic;
pub mod gbwt;
pub mod headers;
pub mod record;
pub mod support;

//-----------------------------------------------------------------------------

pub use crate::build::GBWTBuilder;
pub use crate::dynamic::{DynamicGBWT, SearchState};
pub use crate::gbwt::GBWT;
pub use crate::record::DynamicRecord;
pub use crate::support::Verbosity;

//-----------------------------------------------------------------------------

/// Node identifier `0` is used for technical purposes and does not exist in the graph.
///
/// Every inserted sequence ends with the endmarker, and the record at index 0 stores
/// the first node of each sequence. Incoming edges to the endmarker are not maintained,
/// which means that searching with the endmarker as a prefix does not work.
pub const ENDMARKER: usize = 0;

/// File extension for serialized indexes.
pub const EXTENSION: &str = ".gbwt";

//-----------------------------------------------------------------------------
