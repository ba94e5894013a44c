//! Mutable node records for the dynamic GBWT.
//!
//! Each node of the effective alphabet has a [`DynamicRecord`] storing the outgoing
//! edges, the run-length encoded record body, the incoming edges, and the sampled
//! sequence identifiers. The insertion algorithm rewrites a record by streaming its
//! old body through a [`RunMerger`] while placing the new symbols.
//!
//! A record body stores local ranks: run `(rank, len)` means `len` consecutive
//! occurrences of the outgoing edge of the given rank. The `offset` field of an
//! outgoing edge is the position in the successor's record where this record's
//! contributions begin; during construction the field is only valid between
//! [`rebuild`](crate::build) steps.

use crate::ENDMARKER;


//-----------------------------------------------------------------------------

/// A mutable BWT record for a single node.
///
/// # Examples
///
/// ```
/// use gbwt_dynamic::DynamicGBWT;
///
/// let mut index = DynamicGBWT::new();
/// index.insert(&[3, 4, 4, 0]);
/// // Node 4 occurs twice, continuing once to node 4 and once to the endmarker.
/// assert_eq!(index.count(4), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DynamicRecord {
    pub(crate) body: Vec<(usize, usize)>,
    pub(crate) body_size: usize,
    pub(crate) outgoing: Vec<(usize, usize)>,
    pub(crate) incoming: Vec<(usize, usize)>,
    pub(crate) ids: Vec<(usize, usize)>,
}

impl DynamicRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        DynamicRecord::default()
    }

    /// Returns the length of the record body.
    ///
    /// This is the number of occurrences of the node in the indexed sequences.
    #[inline]
    pub fn len(&self) -> usize {
        self.body_size
    }

    /// Returns `true` if the record is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of runs in the record body.
    #[inline]
    pub fn runs(&self) -> usize {
        self.body.len()
    }

    /// Returns the number of sampled positions in the record.
    #[inline]
    pub fn samples(&self) -> usize {
        self.ids.len()
    }

    /// Returns the number of outgoing edges.
    #[inline]
    pub fn outdegree(&self) -> usize {
        self.outgoing.len()
    }

    /// Returns the number of incoming edges.
    ///
    /// Always `0` for the endmarker record.
    #[inline]
    pub fn indegree(&self) -> usize {
        self.incoming.len()
    }

    /// Returns the successor node of the outgoing edge of the given rank.
    ///
    /// # Panics
    ///
    /// May panic if `outrank >= self.outdegree()`.
    #[inline]
    pub fn successor(&self, outrank: usize) -> usize {
        self.outgoing[outrank].0
    }

    /// Returns the stored offset of the outgoing edge of the given rank.
    ///
    /// The offset is the position in the successor's record where this record's
    /// contributions begin.
    ///
    /// # Panics
    ///
    /// May panic if `outrank >= self.outdegree()`.
    #[inline]
    pub fn offset(&self, outrank: usize) -> usize {
        self.outgoing[outrank].1
    }

    /// Returns the rank of the outgoing edge to the given node, or [`None`] if there is no such edge.
    ///
    /// Outgoing edges are unsorted during construction, so this is a linear scan.
    pub fn edge_to(&self, node: usize) -> Option<usize> {
        self.outgoing.iter().position(|edge| edge.0 == node)
    }

    /// Adds one occurrence of the given predecessor to the incoming edges.
    ///
    /// The incoming edges stay sorted by predecessor node identifier.
    pub(crate) fn increment(&mut self, from: usize) {
        let inrank = self.incoming.partition_point(|edge| edge.0 < from);
        if inrank < self.incoming.len() && self.incoming[inrank].0 == from {
            self.incoming[inrank].1 += 1;
        } else {
            self.incoming.insert(inrank, (from, 1));
        }
    }

    /// Registers `count` occurrences of the given predecessor.
    ///
    /// Used when rebuilding incoming edges after loading a serialized index.
    pub(crate) fn add_incoming(&mut self, edge: (usize, usize)) {
        let inrank = self.incoming.partition_point(|e| e.0 < edge.0);
        if inrank < self.incoming.len() && self.incoming[inrank].0 == edge.0 {
            self.incoming[inrank].1 += edge.1;
        } else {
            self.incoming.insert(inrank, edge);
        }
    }

    /// Sorts the outgoing edges by successor node and remaps the body ranks accordingly.
    ///
    /// This is destructive of rank identities and must only be called between batches.
    pub(crate) fn recode(&mut self) {
        if self.outgoing.windows(2).all(|pair| pair[0].0 < pair[1].0) {
            return;
        }
        let mut order: Vec<usize> = (0..self.outdegree()).collect();
        order.sort_unstable_by_key(|&outrank| self.outgoing[outrank].0);
        let mut rank_map: Vec<usize> = vec![0; self.outdegree()];
        for (new_rank, &old_rank) in order.iter().enumerate() {
            rank_map[old_rank] = new_rank;
        }
        self.outgoing = order.iter().map(|&outrank| self.outgoing[outrank]).collect();
        for run in self.body.iter_mut() {
            run.0 = rank_map[run.0];
        }
    }

    /// Follows the sequence at the given offset and returns the next position.
    ///
    /// The return value is a pair (successor node, offset in successor).
    /// Returns [`None`] if the sequence ends or the offset does not exist.
    /// The result is only meaningful when edge offsets are valid, which is the case
    /// whenever no batch insertion is in progress.
    pub fn lf(&self, i: usize) -> Option<(usize, usize)> {
        if i >= self.len() {
            return None;
        }
        let (pos, _) = self.run_lf(i);
        if pos.0 == ENDMARKER {
            None
        } else {
            Some(pos)
        }
    }

    // LF at offset `i`, also returning the inclusive end offset of the enclosing run.
    // For offsets in the same run, LF values are consecutive, which lets `locate`
    // reuse one result for a group of adjacent positions.
    //
    // Assumes `i < self.len()`. The result for an endmarker run names the endmarker
    // as the successor; the offset component is meaningless in that case.
    pub(crate) fn run_lf(&self, i: usize) -> ((usize, usize), usize) {
        let mut counts: Vec<usize> = vec![0; self.outdegree()];
        let mut offset = 0;
        for &(rank, len) in self.body.iter() {
            if offset + len > i {
                let result = self.outgoing[rank].1 + counts[rank] + (i - offset);
                return ((self.outgoing[rank].0, result), offset + len - 1);
            }
            counts[rank] += len;
            offset += len;
        }
        panic!("DynamicRecord: LF at offset {} in a record of length {}", i, self.len());
    }

    // LF to the given successor: the number of positions in the body prefix of
    // length `i` that continue to `to`, plus the stored edge offset. Counts the
    // whole body if `i` is past the end. Returns `None` if there is no edge to `to`.
    pub(crate) fn partial_lf(&self, i: usize, to: usize) -> Option<usize> {
        let outrank = self.edge_to(to)?;
        let mut result = self.outgoing[outrank].1;
        let mut offset = 0;
        for &(rank, len) in self.body.iter() {
            if offset >= i {
                break;
            }
            if rank == outrank {
                result += len.min(i - offset);
            }
            offset += len;
        }
        Some(result)
    }

    /// Returns the sampled sequence identifier at the given offset, or [`None`] if
    /// the position is not sampled.
    pub fn sample_at(&self, i: usize) -> Option<usize> {
        for &(offset, id) in self.ids.iter() {
            if offset == i {
                return Some(id);
            }
            if offset > i {
                break;
            }
        }
        None
    }
}

//-----------------------------------------------------------------------------

/// A streaming builder for a record body.
///
/// The merger accumulates runs, coalescing adjacent runs with equal ranks, and
/// maintains per-rank occurrence counts for the body built so far. A record rewrite
/// streams the old body through the merger, interleaving the inserted symbols.
///
/// # Examples
///
/// ```
/// use gbwt_dynamic::record::RunMerger;
///
/// let mut merger = RunMerger::new(2);
/// merger.insert(0);
/// merger.insert_run((0, 2));
/// merger.insert(1);
/// assert_eq!(merger.len(), 4);
/// assert_eq!(merger.count(0), 3);
/// let (body, len) = merger.into_body();
/// assert_eq!(body, vec![(0, 3), (1, 1)]);
/// assert_eq!(len, 4);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RunMerger {
    total_size: usize,
    runs: Vec<(usize, usize)>,
    accumulator: (usize, usize),
    counts: Vec<usize>,
}

impl RunMerger {
    /// Creates a new merger for a record with the given outdegree.
    pub fn new(outdegree: usize) -> Self {
        RunMerger {
            total_size: 0,
            runs: Vec::new(),
            accumulator: (0, 0),
            counts: vec![0; outdegree],
        }
    }

    /// Returns the length of the body built so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.total_size
    }

    /// Returns `true` if the merger is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of occurrences of the given rank in the body built so far.
    ///
    /// # Panics
    ///
    /// May panic if `rank` is not a valid rank.
    #[inline]
    pub fn count(&self, rank: usize) -> usize {
        self.counts[rank]
    }

    /// Extends the per-rank counts after a new outgoing edge has been added to the record.
    pub fn add_edge(&mut self) {
        self.counts.push(0);
    }

    /// Appends one occurrence of the given rank.
    pub fn insert(&mut self, rank: usize) {
        self.insert_run((rank, 1));
    }

    /// Appends a run, coalescing it with the previous run if the ranks match.
    ///
    /// Does nothing if the run is empty.
    pub fn insert_run(&mut self, run: (usize, usize)) {
        if run.1 == 0 {
            return;
        }
        self.total_size += run.1;
        self.counts[run.0] += run.1;
        if run.0 == self.accumulator.0 && self.accumulator.1 > 0 {
            self.accumulator.1 += run.1;
        } else {
            self.flush();
            self.accumulator = run;
        }
    }

    /// Finalizes the run in progress.
    pub fn flush(&mut self) {
        if self.accumulator.1 > 0 {
            self.runs.push(self.accumulator);
            self.accumulator = (0, 0);
        }
    }

    /// Flushes the merger and returns the merged body with its length.
    pub fn into_body(mut self) -> (Vec<(usize, usize)>, usize) {
        self.flush();
        (self.runs, self.total_size)
    }
}

//-----------------------------------------------------------------------------
