//! The dynamic GBWT index.
//!
//! [`DynamicGBWT`] stores one mutable record per node of the effective alphabet and
//! supports inserting new sequences at any time. Between insertions the index is a
//! valid multi-string BWT: [`DynamicGBWT::lf`] follows sequences forward, and
//! [`DynamicGBWT::locate`] / [`DynamicGBWT::try_locate`] map positions back to
//! sequence identifiers using the sampled positions maintained by construction.
//!
//! # Examples
//!
//! ```
//! use gbwt_dynamic::{DynamicGBWT, SearchState};
//!
//! let mut index = DynamicGBWT::new();
//! index.insert(&[3, 5, 7, 0]);
//! index.insert(&[3, 6, 7, 0]);
//!
//! assert_eq!(index.sequences(), 2);
//! assert_eq!(index.len(), 8);
//!
//! // Both sequences pass through node 7.
//! let state = SearchState { node: 7, range: 0..index.count(7) };
//! assert_eq!(index.locate(&state), vec![0, 1]);
//! ```

use crate::build;
use crate::bwt::{BWT, BWTBuilder, DASamples};
use crate::gbwt::GBWT;
use crate::headers::{Header, GBWTPayload};
use crate::record::DynamicRecord;
use crate::support::Verbosity;
use crate::ENDMARKER;

use simple_sds::serialize::Serialize;

use std::io::{Error, ErrorKind};
use std::iter::FusedIterator;
use std::ops::Range;
use std::time::Instant;
use std::io;

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// The dynamic GBWT index.
///
/// The index stores a collection of sequences of node identifiers as a multi-string
/// BWT. Node identifiers are positive; `0` is the endmarker terminating every
/// sequence. The record for node `v` is stored at index `v - offset`, where the
/// alphabet offset adapts to the smallest node identifier in the input, and the
/// endmarker record is always at index 0.
///
/// Sequences receive identifiers in insertion order, starting from 0.
/// See the module-level documentation for an example.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicGBWT {
    pub(crate) header: Header<GBWTPayload>,
    pub(crate) bwt: Vec<DynamicRecord>,
}

/// Index statistics.
impl DynamicGBWT {
    /// Creates an empty index.
    pub fn new() -> Self {
        DynamicGBWT::default()
    }

    /// Returns the total length of the sequences in the index, including the endmarkers.
    #[inline]
    pub fn len(&self) -> usize {
        self.header.payload().size
    }

    /// Returns `true` if the index is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of sequences in the index.
    #[inline]
    pub fn sequences(&self) -> usize {
        self.header.payload().sequences
    }

    /// Returns the size of the alphabet.
    #[inline]
    pub fn alphabet_size(&self) -> usize {
        self.header.payload().alphabet_size
    }

    /// Returns the alphabet offset: node identifiers in `1..offset + 1` are not in use.
    #[inline]
    pub fn alphabet_offset(&self) -> usize {
        self.header.payload().offset
    }

    /// Returns the size of the effective alphabet.
    ///
    /// This is the number of records in the index, including the endmarker record.
    #[inline]
    pub fn effective_size(&self) -> usize {
        self.alphabet_size() - self.alphabet_offset()
    }

    /// Returns the smallest node identifier in the effective alphabet.
    #[inline]
    pub fn first_node(&self) -> usize {
        self.alphabet_offset() + 1
    }

    /// Returns `true` if node identifier `id` is in the effective alphabet.
    #[inline]
    pub fn has_node(&self, id: usize) -> bool {
        id > self.alphabet_offset() && id < self.alphabet_size()
    }

    /// Returns `true` if the index is bidirectional.
    ///
    /// A bidirectional index stores every sequence in both orientations.
    #[inline]
    pub fn is_bidirectional(&self) -> bool {
        self.header.is_set(GBWTPayload::FLAG_BIDIRECTIONAL)
    }

    /// Returns the number of occurrences of the given node.
    pub fn count(&self, node: usize) -> usize {
        if self.effective_size() == 0 {
            return 0;
        }
        if node == ENDMARKER {
            return self.bwt[0].len();
        }
        if !self.has_node(node) {
            return 0;
        }
        self.record(node).len()
    }

    /// Returns the total number of runs in the record bodies.
    pub fn runs(&self) -> usize {
        self.bwt.iter().map(|record| record.runs()).sum()
    }

    /// Returns the total number of sampled positions.
    pub fn samples(&self) -> usize {
        self.bwt.iter().map(|record| record.samples()).sum()
    }

    // Maps a node identifier to a record index. Because node identifiers in
    // `1..offset + 1` are not in use, the records are shifted by the offset.
    #[inline]
    pub(crate) fn record_index(&self, node: usize) -> usize {
        if node == ENDMARKER { node } else { node - self.alphabet_offset() }
    }

    #[inline]
    pub(crate) fn record(&self, node: usize) -> &DynamicRecord {
        &self.bwt[self.record_index(node)]
    }

    #[inline]
    pub(crate) fn record_mut(&mut self, node: usize) -> &mut DynamicRecord {
        let index = self.record_index(node);
        &mut self.bwt[index]
    }
}

impl Default for DynamicGBWT {
    fn default() -> Self {
        DynamicGBWT {
            header: Header::new(),
            bwt: Vec::new(),
        }
    }
}

//-----------------------------------------------------------------------------

/// Construction.
impl DynamicGBWT {
    /// The interval between sampled positions on each sequence.
    ///
    /// Every `SAMPLE_INTERVAL`th insertion step samples the sequence identifier, and
    /// the endmarker position of every sequence is always sampled.
    pub const SAMPLE_INTERVAL: usize = 1024;

    /// Inserts the sequences in the text into the index as a single batch.
    ///
    /// The text must be a concatenation of sequences, each terminated by an
    /// endmarker. The new sequences receive identifiers starting from
    /// [`DynamicGBWT::sequences`].
    ///
    /// # Panics
    ///
    /// Panics if the text is non-empty and does not end with an endmarker.
    pub fn insert(&mut self, text: &[usize]) {
        if text.is_empty() {
            if Verbosity::level() >= Verbosity::Full {
                eprintln!("DynamicGBWT::insert(): The input text is empty");
            }
            return;
        }
        build::insert_batch(self, text);
        self.recode();
    }

    /// Inserts the sequences in the text into the index in multiple batches.
    ///
    /// This is the streaming entry point: a batch of at most `batch_size` symbols is
    /// inserted by a background worker while the next batch is buffered. If
    /// `batch_size` is 0, the entire text becomes a single batch. With
    /// `both_orientations`, every sequence is also inserted in reverse orientation,
    /// with the node identifiers mapped through [`crate::support::flip_node`],
    /// and the index becomes bidirectional.
    ///
    /// Sequences longer than the batch size are skipped with a warning.
    pub fn insert_in_batches(&mut self, text: &[usize], batch_size: usize, both_orientations: bool) {
        let start = Instant::now();
        if text.is_empty() {
            if Verbosity::level() >= Verbosity::Full {
                eprintln!("DynamicGBWT::insert_in_batches(): The input text is empty");
            }
            return;
        }
        let batch_size = if batch_size == 0 { text.len() } else { batch_size };
        let old_sequences = self.sequences();

        let mut builder = build::GBWTBuilder::with_index(std::mem::take(self), batch_size);
        let mut sequence: Vec<usize> = Vec::new();
        for &node in text.iter() {
            if node == ENDMARKER {
                builder.insert(&sequence, both_orientations);
                sequence.clear();
            } else {
                sequence.push(node);
            }
        }
        if !sequence.is_empty() {
            builder.insert(&sequence, both_orientations);
        }
        *self = builder.finish();

        if Verbosity::level() >= Verbosity::Basic {
            eprintln!("DynamicGBWT::insert_in_batches(): Inserted {} sequences of total length {} in {:.3} seconds",
                self.sequences() - old_sequences, text.len(), start.elapsed().as_secs_f64());
        }
    }

    /// Merges the sequences from a static index into this index.
    ///
    /// The sequences are inserted in batches of at most `batch_size` sequences, in
    /// the order of their identifiers in the source. If `batch_size` is 0, all
    /// sequences form a single batch.
    pub fn merge(&mut self, source: &GBWT, batch_size: usize) {
        let start = Instant::now();
        if source.is_empty() {
            if Verbosity::level() >= Verbosity::Full {
                eprintln!("DynamicGBWT::merge(): The source index is empty");
            }
            return;
        }
        build::merge(self, source, batch_size);
        if Verbosity::level() >= Verbosity::Basic {
            eprintln!("DynamicGBWT::merge(): Inserted {} sequences of total length {} in {:.3} seconds",
                source.sequences(), source.len(), start.elapsed().as_secs_f64());
        }
    }

    /// Merges the sequences from another dynamic index into this index.
    ///
    /// See [`DynamicGBWT::merge`].
    pub fn merge_dynamic(&mut self, source: &DynamicGBWT, batch_size: usize) {
        let start = Instant::now();
        if source.is_empty() {
            if Verbosity::level() >= Verbosity::Full {
                eprintln!("DynamicGBWT::merge_dynamic(): The source index is empty");
            }
            return;
        }
        build::merge(self, source, batch_size);
        if Verbosity::level() >= Verbosity::Basic {
            eprintln!("DynamicGBWT::merge_dynamic(): Inserted {} sequences of total length {} in {:.3} seconds",
                source.sequences(), source.len(), start.elapsed().as_secs_f64());
        }
    }

    /// Grows the index to cover the alphabet range `new_offset..new_sigma`.
    ///
    /// The index never shrinks: a request to increase the offset or decrease the
    /// alphabet size is clamped to the current values. Existing records are shifted
    /// by the change in offset, with the endmarker record staying at index 0.
    ///
    /// # Panics
    ///
    /// Panics if the clamped offset is nonzero and not less than the clamped
    /// alphabet size.
    pub(crate) fn resize(&mut self, new_offset: usize, new_sigma: usize) {
        // Do not set the new offset if we already have a smaller real offset or
        // the new offset is not a real one.
        let mut new_offset = new_offset;
        let mut new_sigma = new_sigma;
        if (self.alphabet_size() > 1 && new_offset > self.alphabet_offset()) || new_sigma <= 1 {
            new_offset = self.alphabet_offset();
        }
        if self.alphabet_size() > new_sigma {
            new_sigma = self.alphabet_size();
        }
        if new_offset > 0 && new_offset >= new_sigma {
            panic!("DynamicGBWT::resize(): Cannot set offset {} with alphabet size {}", new_offset, new_sigma);
        }

        if new_offset != self.alphabet_offset() || new_sigma != self.alphabet_size() {
            if Verbosity::level() >= Verbosity::Full {
                if new_offset != self.alphabet_offset() {
                    eprintln!("DynamicGBWT::resize(): Changing alphabet offset to {}", new_offset);
                }
                if new_sigma != self.alphabet_size() {
                    eprintln!("DynamicGBWT::resize(): Increasing alphabet size to {}", new_sigma);
                }
            }

            let mut new_bwt: Vec<DynamicRecord> = vec![DynamicRecord::new(); new_sigma - new_offset];
            if self.effective_size() > 0 {
                new_bwt[0] = std::mem::take(&mut self.bwt[0]);
            }
            for comp in 1..self.effective_size() {
                let shifted = comp + self.alphabet_offset() - new_offset;
                new_bwt[shifted] = std::mem::take(&mut self.bwt[comp]);
            }
            self.bwt = new_bwt;
            self.header.payload_mut().offset = new_offset;
            self.header.payload_mut().alphabet_size = new_sigma;
        }
    }

    /// Sorts the outgoing edges of every record and remaps the record bodies.
    ///
    /// Called at the end of every insertion so that the index can be compressed
    /// and serialized.
    pub(crate) fn recode(&mut self) {
        if Verbosity::level() >= Verbosity::Full {
            eprintln!("DynamicGBWT::recode(): Sorting the outgoing edges");
        }
        for record in self.bwt.iter_mut() {
            record.recode();
        }
    }
}

//-----------------------------------------------------------------------------

/// Queries.
impl DynamicGBWT {
    /// Follows the sequence at offset `i` in the record of `node` and returns the
    /// next position.
    ///
    /// The return value is a pair (successor node, offset in successor).
    /// Returns [`None`] if the sequence ends or the position does not exist.
    /// `node` may be the endmarker, in which case the result is the first position
    /// of sequence `i`.
    pub fn lf(&self, node: usize, i: usize) -> Option<(usize, usize)> {
        if self.effective_size() == 0 || (node != ENDMARKER && !self.has_node(node)) {
            return None;
        }
        self.record(node).lf(i)
    }

    /// Follows all sequences in the record of `node` that continue to node `to` and
    /// returns the offset of position `i` in the record of `to`.
    ///
    /// Returns [`None`] if there is no edge from `node` to `to`.
    pub fn lf_to(&self, node: usize, i: usize, to: usize) -> Option<usize> {
        if self.effective_size() == 0 || (node != ENDMARKER && !self.has_node(node)) {
            return None;
        }
        self.record(node).partial_lf(i, to)
    }

    /// Returns the first position of sequence `id`, or [`None`] if no such sequence exists.
    ///
    /// The return value is a pair (node identifier, offset in node).
    pub fn start(&self, id: usize) -> Option<(usize, usize)> {
        self.lf(ENDMARKER, id)
    }

    /// Follows the sequence forward and returns the next position, or [`None`] if
    /// the sequence ends.
    ///
    /// The argument and the return value are pairs (node identifier, offset in node).
    pub fn forward(&self, pos: (usize, usize)) -> Option<(usize, usize)> {
        if pos.0 == ENDMARKER {
            return None;
        }
        self.lf(pos.0, pos.1)
    }

    /// Returns an iterator over sequence `id`.
    ///
    /// The iterator will be empty if no such sequence exists.
    pub fn sequence(&self, id: usize) -> SequenceIter {
        SequenceIter {
            parent: self,
            next: self.start(id),
        }
    }

    /// Returns the sequence identifier at offset `i` in the record of `node`, or
    /// [`None`] if the position is not sampled.
    pub fn try_locate(&self, node: usize, i: usize) -> Option<usize> {
        if self.effective_size() == 0 || (node != ENDMARKER && !self.has_node(node)) {
            return None;
        }
        self.record(node).sample_at(i)
    }

    /// Returns `true` if the search state is a valid offset range in a valid record.
    pub fn contains(&self, state: &SearchState) -> bool {
        self.has_node(state.node) && !state.is_empty() && state.range.end <= self.count(state.node)
    }

    /// Returns the identifiers of all sequences with an occurrence in the given
    /// search state, in sorted order without duplicates.
    ///
    /// Every position is followed forward with LF until it coincides with a sampled
    /// position. Because the endmarker position of every sequence is sampled, this
    /// always terminates.
    pub fn locate(&self, state: &SearchState) -> Vec<usize> {
        let mut result: Vec<usize> = Vec::new();
        if !self.contains(state) {
            return result;
        }

        // BWT positions for each offset in the range.
        let mut positions: Vec<(usize, usize)> = state.range.clone().map(|offset| (state.node, offset)).collect();

        // Continue with LF until a sample has been found for every position.
        while !positions.is_empty() {
            let mut tail = 0;
            let mut curr = usize::MAX;
            let mut record: &DynamicRecord = &self.bwt[0];
            let mut sample_rank = 0;
            // LF result for the run covering offsets `lf_start..=lf_end`.
            let mut lf_start = 0;
            let mut lf_end = 0;
            let mut lf_result = (0, 0);
            for i in 0..positions.len() {
                let (node, offset) = positions[i];
                if node != curr {
                    curr = node;
                    record = self.record(curr);
                    sample_rank = record.ids.partition_point(|sample| sample.0 < offset);
                    lf_start = offset;
                    let (lf, run_end) = record.run_lf(offset);
                    lf_result = lf;
                    lf_end = run_end;
                }
                while sample_rank < record.ids.len() && record.ids[sample_rank].0 < offset {
                    sample_rank += 1;
                }
                if sample_rank < record.ids.len() && record.ids[sample_rank].0 == offset {
                    result.push(record.ids[sample_rank].1);
                } else {
                    if offset > lf_end {
                        lf_start = offset;
                        let (lf, run_end) = record.run_lf(offset);
                        lf_result = lf;
                        lf_end = run_end;
                    }
                    positions[tail] = (lf_result.0, lf_result.1 + (offset - lf_start));
                    tail += 1;
                }
            }
            positions.truncate(tail);
            build::sort_pairs(&mut positions);
        }

        result.sort_unstable();
        result.dedup();
        result
    }
}

//-----------------------------------------------------------------------------

impl Serialize for DynamicGBWT {
    fn serialize_header<T: io::Write>(&self, writer: &mut T) -> io::Result<()> {
        self.header.serialize(writer)
    }

    fn serialize_body<T: io::Write>(&self, writer: &mut T) -> io::Result<()> {
        let mut builder = BWTBuilder::new();
        for record in self.bwt.iter() {
            builder.append_record(record);
        }
        let bwt = BWT::from(builder);
        bwt.serialize(writer)?;

        let samples = DASamples::from(self.bwt.as_slice());
        samples.serialize(writer)?;

        Ok(())
    }

    fn load<T: io::Read>(reader: &mut T) -> io::Result<Self> {
        let header = Header::<GBWTPayload>::load(reader)?;
        if let Err(msg) = header.validate() {
            return Err(Error::new(ErrorKind::InvalidData, msg));
        }
        let offset = header.payload().offset;
        if offset > header.payload().alphabet_size {
            return Err(Error::new(ErrorKind::InvalidData, "DynamicGBWT: Alphabet offset past the alphabet size"));
        }
        let effective = header.payload().alphabet_size - offset;

        // Decompress the records.
        let bwt = BWT::load(reader)?;
        if bwt.len() != effective {
            return Err(Error::new(ErrorKind::InvalidData, "DynamicGBWT: Invalid number of records"));
        }
        let mut records: Vec<DynamicRecord> = vec![DynamicRecord::new(); effective];
        for comp in 0..effective {
            if let Some(record) = bwt.record(comp) {
                let current = &mut records[comp];
                current.outgoing = record.edges().to_vec();
                for run in record.runs() {
                    current.body.push(run);
                    current.body_size += run.1;
                }
            }
        }
        let total_size: usize = records.iter().map(|record| record.len()).sum();
        if total_size != header.payload().size {
            return Err(Error::new(ErrorKind::InvalidData, "DynamicGBWT: Invalid total length"));
        }

        // Assign the samples to the records.
        let samples = DASamples::load(reader)?;
        let mut sample_iter = samples.iter().peekable();
        let mut start = 0;
        for record in records.iter_mut() {
            let limit = start + record.len();
            while let Some(&(pos, id)) = sample_iter.peek() {
                if pos >= limit {
                    break;
                }
                record.ids.push((pos - start, id));
                sample_iter.next();
            }
            start = limit;
        }
        if sample_iter.next().is_some() {
            return Err(Error::new(ErrorKind::InvalidData, "DynamicGBWT: Sample position past the end of the BWT"));
        }

        // Rebuild the incoming edges.
        for comp in 0..effective {
            let node = if comp == 0 { ENDMARKER } else { comp + offset };
            let mut counts: Vec<usize> = vec![0; records[comp].outdegree()];
            for &(rank, len) in records[comp].body.iter() {
                counts[rank] += len;
            }
            let edges: Vec<(usize, usize)> = records[comp].outgoing.iter()
                .map(|edge| edge.0)
                .zip(counts)
                .collect();
            for (successor, count) in edges {
                if successor != ENDMARKER {
                    records[successor - offset].add_incoming((node, count));
                }
            }
        }

        Ok(DynamicGBWT {
            header,
            bwt: records,
        })
    }

    fn size_in_elements(&self) -> usize {
        let mut builder = BWTBuilder::new();
        for record in self.bwt.iter() {
            builder.append_record(record);
        }
        let bwt = BWT::from(builder);
        let samples = DASamples::from(self.bwt.as_slice());
        self.header.size_in_elements() + bwt.size_in_elements() + samples.size_in_elements()
    }
}

//-----------------------------------------------------------------------------

/// A state of unidirectional search in the index.
///
/// The state consists of a node identifier and an offset range in the record of
/// that node. This is equivalent to a BWT range in a normal FM-index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchState {
    /// Node identifier.
    pub node: usize,
    /// Offset range in the record of the node.
    pub range: Range<usize>,
}

impl SearchState {
    /// Returns the number of positions in the state.
    #[inline]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// Returns `true` if the offset range is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

//-----------------------------------------------------------------------------

/// An iterator over a sequence in the index.
///
/// The type of `Item` is [`usize`].
///
/// # Examples
///
/// ```
/// use gbwt_dynamic::DynamicGBWT;
///
/// let mut index = DynamicGBWT::new();
/// index.insert(&[4, 8, 6, 0]);
///
/// let path: Vec<usize> = index.sequence(0).collect();
/// assert_eq!(path, vec![4, 8, 6]);
/// ```
#[derive(Clone, Debug)]
pub struct SequenceIter<'a> {
    parent: &'a DynamicGBWT,
    // The next position.
    next: Option<(usize, usize)>,
}

impl<'a> Iterator for SequenceIter<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let pos = self.next?;
        self.next = self.parent.forward(pos);
        Some(pos.0)
    }
}

impl<'a> FusedIterator for SequenceIter<'a> {}

//-----------------------------------------------------------------------------
