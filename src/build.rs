//! The batched insertion algorithm and the double-buffered builder.
//!
//! A batch of sequences is inserted by advancing every sequence one position per
//! iteration. Each iteration rewrites the records at the current positions, placing
//! the next node of each sequence at its final offset, then recomputes the outgoing
//! edge offsets that convert local ranks into positions in the successor records.
//! A node touched by the batch is rewritten at most once per iteration.
//!
//! The insertion source can be a plain integer text, a static [`GBWT`], or another
//! [`DynamicGBWT`]. Only two primitives depend on the source: computing the source
//! offset at the next position and reading the node after that. Both are
//! monomorphized over the source type.
//!
//! [`GBWTBuilder`] runs the insertion in a background worker: the caller appends
//! sequences to one buffer while the worker inserts the other. The worker owns the
//! index while it runs; ownership returns to the builder when the buffers are
//! swapped.

use crate::dynamic::DynamicGBWT;
use crate::gbwt::GBWT;
use crate::headers::GBWTPayload;
use crate::record::RunMerger;
use crate::support::{self, Verbosity};
use crate::ENDMARKER;

use rayon::prelude::*;

use std::thread::JoinHandle;
use std::time::Instant;
use std::{mem, thread};

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

// Sorting falls back to a sequential sort below this length.
const PARALLEL_SORT_THRESHOLD: usize = 1024;

// Sorts (node, offset) pairs, in parallel if there are enough of them.
pub(crate) fn sort_pairs(values: &mut Vec<(usize, usize)>) {
    if values.len() >= PARALLEL_SORT_THRESHOLD {
        values.par_sort_unstable();
    } else {
        values.sort_unstable();
    }
}

//-----------------------------------------------------------------------------

// A sequence being inserted into the index.
//
// `curr` is the node at the current position and `next` the node to be inserted
// after it. `offset` is the position the inserted node will occupy in the record
// of `curr`; between iterations it temporarily stores the rank of the sequence
// among the sequences continuing from `curr` to `next`. `pos` is a source-specific
// cursor: an index into the text, or a record offset in a source index.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Sequence {
    pub(crate) id: usize,
    pub(crate) curr: usize,
    pub(crate) next: usize,
    pub(crate) offset: usize,
    pub(crate) pos: usize,
}

impl Sequence {
    // A new sequence starting at offset `start` in the text.
    fn from_text(text: &[usize], start: usize, id: usize) -> Self {
        Sequence {
            id,
            curr: ENDMARKER,
            next: text[start],
            offset: id,
            pos: start,
        }
    }

    // A new sequence whose first node is `node`, at offset `source_id` in the
    // endmarker record of a source index.
    fn from_index(node: usize, id: usize, source_id: usize) -> Self {
        Sequence {
            id,
            curr: ENDMARKER,
            next: node,
            offset: id,
            pos: source_id,
        }
    }

    // Sorting by this key now is equivalent to sorting by `(curr, offset)` in the
    // next iteration.
    #[inline]
    fn key(&self) -> (usize, usize, usize) {
        (self.next, self.curr, self.offset)
    }
}

//-----------------------------------------------------------------------------

// Source-specific primitives of the insertion algorithm. The sequences are sorted
// by `curr` when `next_position` is called and by `next` when `advance_position`
// is called, so the index-based sources can walk each record once per group.
pub(crate) trait Source {
    // Computes the new source cursor for each sequence: the offset the sequence
    // will have in the source record of its `next` node.
    fn next_position(&self, seqs: &mut [Sequence]);

    // Moves each sequence one step forward: `curr` becomes `next`, and `next`
    // becomes the node at the new cursor position.
    fn advance_position(&self, seqs: &mut [Sequence]);
}

// A plain integer text with embedded endmarkers.
pub(crate) struct Text<'a>(pub(crate) &'a [usize]);

impl<'a> Source for Text<'a> {
    fn next_position(&self, seqs: &mut [Sequence]) {
        for seq in seqs.iter_mut() {
            seq.pos += 1;
        }
    }

    fn advance_position(&self, seqs: &mut [Sequence]) {
        for seq in seqs.iter_mut() {
            seq.curr = seq.next;
            seq.next = self.0[seq.pos];
        }
    }
}

impl Source for GBWT {
    fn next_position(&self, seqs: &mut [Sequence]) {
        let mut i = 0;
        while i < seqs.len() {
            let curr = seqs[i].curr;
            let record = self.record(curr).unwrap();
            // Edge offsets plus the number of occurrences of each rank seen so far.
            let mut result: Vec<(usize, usize)> = record.edges().to_vec();
            let mut iter = record.runs();
            let (mut rank, len) = iter.next().unwrap();
            let mut record_offset = len;
            result[rank].1 += len;
            while i < seqs.len() && seqs[i].curr == curr {
                while record_offset <= seqs[i].pos {
                    let (r, len) = iter.next().unwrap();
                    rank = r;
                    record_offset += len;
                    result[r].1 += len;
                }
                seqs[i].pos = result[rank].1 - (record_offset - seqs[i].pos);
                i += 1;
            }
        }
    }

    fn advance_position(&self, seqs: &mut [Sequence]) {
        let mut i = 0;
        while i < seqs.len() {
            let curr = seqs[i].next;
            let record = self.record(curr).unwrap();
            let mut iter = record.runs();
            let (mut rank, len) = iter.next().unwrap();
            let mut record_offset = len;
            while i < seqs.len() && seqs[i].next == curr {
                seqs[i].curr = curr;
                while record_offset <= seqs[i].pos {
                    let (r, len) = iter.next().unwrap();
                    rank = r;
                    record_offset += len;
                }
                seqs[i].next = record.successor(rank);
                i += 1;
            }
        }
    }
}

impl Source for DynamicGBWT {
    fn next_position(&self, seqs: &mut [Sequence]) {
        let mut i = 0;
        while i < seqs.len() {
            let curr = seqs[i].curr;
            let record = self.record(curr);
            let mut result: Vec<(usize, usize)> = record.outgoing.clone();
            let mut iter = record.body.iter();
            let &(mut rank, len) = iter.next().unwrap();
            let mut record_offset = len;
            result[rank].1 += len;
            while i < seqs.len() && seqs[i].curr == curr {
                while record_offset <= seqs[i].pos {
                    let &(r, len) = iter.next().unwrap();
                    rank = r;
                    record_offset += len;
                    result[r].1 += len;
                }
                seqs[i].pos = result[rank].1 - (record_offset - seqs[i].pos);
                i += 1;
            }
        }
    }

    fn advance_position(&self, seqs: &mut [Sequence]) {
        let mut i = 0;
        while i < seqs.len() {
            let curr = seqs[i].next;
            let record = self.record(curr);
            let mut iter = record.body.iter();
            let &(mut rank, len) = iter.next().unwrap();
            let mut record_offset = len;
            while i < seqs.len() && seqs[i].next == curr {
                seqs[i].curr = curr;
                while record_offset <= seqs[i].pos {
                    let &(r, len) = iter.next().unwrap();
                    rank = r;
                    record_offset += len;
                }
                seqs[i].next = record.successor(rank);
                i += 1;
            }
        }
    }
}

//-----------------------------------------------------------------------------

// Processes ranges of sequences sharing the same `curr` node:
// - adds the outgoing edge `(curr, next)` if it does not exist;
// - samples `(offset, id)` if the iteration is a multiple of the sample interval
//   or the sequence ends here;
// - inserts the `next` node at position `offset` in the record body;
// - sets `offset` to the rank of the sequence among the occurrences of `next`;
// - counts the occurrence in the incoming edges of `next`.
//
// Incoming edges to the endmarker are not maintained, because the endmarker record
// can be large and searching with the endmarker does not work in a multi-string BWT.
fn update_records(index: &mut DynamicGBWT, seqs: &mut [Sequence], iteration: usize) {
    let mut i = 0;
    while i < seqs.len() {
        let curr = seqs[i].curr;
        let mut occurrences: Vec<usize> = Vec::new();
        {
            let current = index.record_mut(curr);
            let mut old_body = mem::take(&mut current.body);
            let old_ids = mem::take(&mut current.ids);
            let mut new_body = RunMerger::new(current.outdegree());
            let mut new_ids: Vec<(usize, usize)> = Vec::with_capacity(old_ids.len());
            let mut run_index = 0;
            let mut sample_index = 0;
            let mut insert_count = 0;
            while i < seqs.len() && seqs[i].curr == curr {
                let next = seqs[i].next;
                let outrank = match current.edge_to(next) {
                    Some(outrank) => outrank,
                    None => {
                        // Add the edge (curr, next).
                        current.outgoing.push((next, 0));
                        new_body.add_edge();
                        current.outdegree() - 1
                    },
                };
                // Copy old runs until the insertion position, splitting the last
                // one if necessary.
                while new_body.len() < seqs[i].offset {
                    let gap = seqs[i].offset - new_body.len();
                    let run = &mut old_body[run_index];
                    if run.1 <= gap {
                        new_body.insert_run(*run);
                        run_index += 1;
                    } else {
                        new_body.insert_run((run.0, gap));
                        run.1 -= gap;
                    }
                }
                // Copy old samples preceding the insertion position.
                while sample_index < old_ids.len() && old_ids[sample_index].0 + insert_count < seqs[i].offset {
                    new_ids.push((old_ids[sample_index].0 + insert_count, old_ids[sample_index].1));
                    sample_index += 1;
                }
                if iteration % DynamicGBWT::SAMPLE_INTERVAL == 0 || next == ENDMARKER {
                    new_ids.push((seqs[i].offset, seqs[i].id));
                }
                seqs[i].offset = new_body.count(outrank); // rank(next) within the record
                new_body.insert(outrank);
                insert_count += 1;
                if next != ENDMARKER {
                    occurrences.push(next);
                }
                i += 1;
            }
            // The rest of the old body and the old samples.
            for run in old_body[run_index..].iter() {
                new_body.insert_run(*run);
            }
            for sample in old_ids[sample_index..].iter() {
                new_ids.push((sample.0 + insert_count, sample.1));
            }
            let (body, body_size) = new_body.into_body();
            current.body = body;
            current.body_size = body_size;
            current.ids = new_ids;
        }
        for next in occurrences {
            index.record_mut(next).increment(curr);
        }
    }
    index.header.payload_mut().size += seqs.len();
}

// Sorts the sequences for the next iteration and removes the ones that have
// reached the endmarker. The comparator is a total order, because offsets are
// unique within each `(next, curr)` group.
fn sort_sequences(seqs: &mut Vec<Sequence>) {
    if seqs.len() >= PARALLEL_SORT_THRESHOLD {
        seqs.par_sort_unstable_by_key(Sequence::key);
    } else {
        seqs.sort_unstable_by_key(Sequence::key);
    }
    let head = seqs.iter().position(|seq| seq.next != ENDMARKER).unwrap_or(seqs.len());
    if head > 0 {
        seqs.drain(..head);
    }
}

// Rebuilds the edge offsets in the outgoing edges to each `next` node. The offsets
// are valid after the insertions in the next iteration. Then adds the rebuilt
// offsets to the sequence offsets, which have been rank(next) within the current
// record until now.
fn rebuild_offsets(index: &mut DynamicGBWT, seqs: &mut [Sequence]) {
    let mut next = index.alphabet_size();
    for i in 0..seqs.len() {
        if seqs[i].next == next {
            continue;
        }
        next = seqs[i].next;
        let incoming = index.record(next).incoming.clone();
        let mut offset = 0;
        for (predecessor, count) in incoming {
            let record = index.record_mut(predecessor);
            let outrank = record.edge_to(next).unwrap();
            record.outgoing[outrank].1 = offset;
            offset += count;
        }
    }

    for seq in seqs.iter_mut() {
        let current = index.record(seq.curr);
        seq.offset += current.offset(current.edge_to(seq.next).unwrap());
    }
}

// Inserts the sequences from the source into the index. Maintains the invariant
// that the sequences are sorted by `(curr, offset)` at the start of each iteration.
// Returns the number of iterations.
fn insert<S: Source>(index: &mut DynamicGBWT, mut seqs: Vec<Sequence>, source: &S) -> usize {
    let mut iterations = 0;
    loop {
        iterations += 1;
        update_records(index, &mut seqs, iterations);
        source.next_position(&mut seqs);
        sort_sequences(&mut seqs);
        if seqs.is_empty() {
            return iterations;
        }
        rebuild_offsets(index, &mut seqs);
        source.advance_position(&mut seqs);
    }
}

//-----------------------------------------------------------------------------

// Inserts a batch of sequences from a text with embedded endmarkers. The new
// sequences receive identifiers starting from `index.sequences()`.
pub(crate) fn insert_batch(index: &mut DynamicGBWT, text: &[usize]) {
    let start = Instant::now();
    if text.is_empty() {
        return;
    }
    assert!(*text.last().unwrap() == ENDMARKER, "insert_batch(): The text must end with an endmarker");

    // Find the start of each sequence and initialize the sequences at the
    // endmarker node. Grow the alphabet if necessary.
    let start_id = index.sequences();
    let mut min_node = if index.is_empty() { usize::MAX } else { index.alphabet_offset() + 1 };
    let mut max_node = if index.is_empty() { 0 } else { index.alphabet_size() - 1 };
    let mut seqs: Vec<Sequence> = Vec::new();
    let mut seq_start = true;
    for (i, &node) in text.iter().enumerate() {
        if seq_start {
            seqs.push(Sequence::from_text(text, i, index.sequences()));
            index.header.payload_mut().sequences += 1;
            seq_start = false;
        }
        if node == ENDMARKER {
            seq_start = true;
        } else {
            min_node = min_node.min(node);
        }
        max_node = max_node.max(node);
    }
    if Verbosity::level() >= Verbosity::Extended {
        eprintln!("insert_batch(): Inserting sequences {} to {}", start_id, start_id + seqs.len() - 1);
    }
    if max_node == 0 {
        min_node = 1; // No real nodes, setting offset to 0.
    }
    index.resize(min_node - 1, max_node + 1);

    let iterations = insert(index, seqs, &Text(text));
    if Verbosity::level() >= Verbosity::Extended {
        eprintln!("insert_batch(): {} iterations in {:.3} seconds", iterations, start.elapsed().as_secs_f64());
    }
}

//-----------------------------------------------------------------------------

// Statistics and sequence enumeration a merge source must provide on top of the
// insertion primitives.
pub(crate) trait IndexSource: Source {
    fn sequences(&self) -> usize;
    fn alphabet_offset(&self) -> usize;
    fn alphabet_size(&self) -> usize;

    // The runs of the endmarker record as (successor node, length) pairs.
    fn endmarker_runs(&self) -> Vec<(usize, usize)>;
}

impl IndexSource for GBWT {
    fn sequences(&self) -> usize {
        self.sequences()
    }

    fn alphabet_offset(&self) -> usize {
        self.alphabet_offset()
    }

    fn alphabet_size(&self) -> usize {
        self.alphabet_size()
    }

    fn endmarker_runs(&self) -> Vec<(usize, usize)> {
        match self.record(ENDMARKER) {
            Some(record) => record.runs().map(|(rank, len)| (record.successor(rank), len)).collect(),
            None => Vec::new(),
        }
    }
}

impl IndexSource for DynamicGBWT {
    fn sequences(&self) -> usize {
        self.sequences()
    }

    fn alphabet_offset(&self) -> usize {
        self.alphabet_offset()
    }

    fn alphabet_size(&self) -> usize {
        self.alphabet_size()
    }

    fn endmarker_runs(&self) -> Vec<(usize, usize)> {
        if self.effective_size() == 0 {
            return Vec::new();
        }
        let record = self.record(ENDMARKER);
        record.body.iter().map(|&(rank, len)| (record.successor(rank), len)).collect()
    }
}

// Merges the sequences from the source index into this index in batches of at
// most `batch_size` sequences.
pub(crate) fn merge<S: IndexSource>(index: &mut DynamicGBWT, source: &S, batch_size: usize) {
    let batch_size = if batch_size == 0 { source.sequences() } else { batch_size };
    index.resize(source.alphabet_offset(), source.alphabet_size());

    // Walk the endmarker record of the source to enumerate the sequences.
    let endmarker = source.endmarker_runs();
    let mut run_iter = endmarker.iter();
    let mut run: (usize, usize) = (ENDMARKER, 0);
    let mut source_id = 0;
    while source_id < source.sequences() {
        let batch_start = Instant::now();
        let limit = (source_id + batch_size).min(source.sequences());
        let mut seqs: Vec<Sequence> = Vec::with_capacity(limit - source_id);
        while source_id < limit {
            if run.1 == 0 {
                run = *run_iter.next().unwrap();
            } else {
                seqs.push(Sequence::from_index(run.0, index.sequences(), source_id));
                index.header.payload_mut().sequences += 1;
                source_id += 1;
                run.1 -= 1;
            }
        }
        if Verbosity::level() >= Verbosity::Extended {
            eprintln!("merge(): Inserting sequences {} to {}", source_id - seqs.len(), source_id - 1);
        }
        let iterations = insert(index, seqs, source);
        if Verbosity::level() >= Verbosity::Extended {
            eprintln!("merge(): {} iterations in {:.3} seconds", iterations, batch_start.elapsed().as_secs_f64());
        }
    }

    index.recode();
}

//-----------------------------------------------------------------------------

/// A double-buffered construction interface.
///
/// The builder appends sequences to an input buffer. When a sequence does not fit,
/// the buffers are swapped and a background worker inserts the full buffer into the
/// index while the caller keeps appending. At most one worker is in flight, and the
/// worker has exclusive ownership of the index until the next buffer swap.
///
/// # Examples
///
/// ```
/// use gbwt_dynamic::GBWTBuilder;
///
/// let mut builder = GBWTBuilder::new(1024);
/// builder.insert(&[3, 5, 7], false);
/// builder.insert(&[3, 6, 7], false);
/// let index = builder.finish();
///
/// assert_eq!(index.sequences(), 2);
/// assert_eq!(index.len(), 8);
/// ```
pub struct GBWTBuilder {
    index: Option<DynamicGBWT>,
    input_buffer: Vec<usize>,
    construction_buffer: Vec<usize>,
    buffer_size: usize,
    inserted_sequences: usize,
    batch_sequences: usize,
    bidirectional: bool,
    worker: Option<JoinHandle<(DynamicGBWT, Vec<usize>)>>,
}

impl GBWTBuilder {
    /// Creates a builder for a new index with the given buffer size in nodes.
    pub fn new(buffer_size: usize) -> Self {
        Self::with_index(DynamicGBWT::new(), buffer_size)
    }

    /// Creates a builder that continues the construction of an existing index.
    pub fn with_index(index: DynamicGBWT, buffer_size: usize) -> Self {
        GBWTBuilder {
            index: Some(index),
            input_buffer: Vec::with_capacity(buffer_size),
            construction_buffer: Vec::with_capacity(buffer_size),
            buffer_size,
            inserted_sequences: 0,
            batch_sequences: 0,
            bidirectional: false,
            worker: None,
        }
    }

    /// Returns the number of sequences passed to the insertion algorithm so far.
    ///
    /// This does not include the sequences still waiting in the input buffer.
    #[inline]
    pub fn sequences(&self) -> usize {
        self.inserted_sequences
    }

    /// Appends a sequence to the input buffer, flushing the buffer first if the
    /// sequence does not fit.
    ///
    /// The sequence must not contain endmarkers. With `both_orientations`, the
    /// reverse orientation is also appended, with the node identifiers mapped
    /// through [`support::flip_node`], and the final index becomes bidirectional.
    /// A sequence longer than the buffer is skipped with a warning.
    pub fn insert(&mut self, sequence: &[usize], both_orientations: bool) {
        let mut required = sequence.len() + 1;
        if both_orientations {
            required *= 2;
        }
        if required > self.buffer_size {
            eprintln!("GBWTBuilder::insert(): Sequence is too long for the buffer, skipping");
            return;
        }

        if self.input_buffer.len() + required > self.buffer_size {
            self.flush();
        }

        // Forward orientation.
        self.input_buffer.extend_from_slice(sequence);
        self.input_buffer.push(ENDMARKER);
        self.batch_sequences += 1;

        // Reverse orientation.
        if both_orientations {
            self.bidirectional = true;
            self.input_buffer.extend(sequence.iter().rev().map(|&node| support::flip_node(node)));
            self.input_buffer.push(ENDMARKER);
            self.batch_sequences += 1;
        }
    }

    /// Hands the buffered sequences to a background worker.
    ///
    /// Waits for the previous worker to finish first. The caller does not have
    /// access to the index again until the next [`GBWTBuilder::flush`] or
    /// [`GBWTBuilder::finish`].
    pub fn flush(&mut self) {
        self.join();

        // The previous construction buffer is empty after the join.
        mem::swap(&mut self.input_buffer, &mut self.construction_buffer);

        if !self.construction_buffer.is_empty() {
            let mut index = self.index.take().unwrap();
            let buffer = mem::take(&mut self.construction_buffer);
            self.worker = Some(thread::spawn(move || {
                insert_batch(&mut index, &buffer);
                (index, buffer)
            }));
            self.inserted_sequences += self.batch_sequences;
            self.batch_sequences = 0;
        }
    }

    /// Finishes the construction and returns the index.
    ///
    /// Flushes the remaining sequences, waits for the worker, and sorts the
    /// outgoing edges so that the index can be compressed and serialized.
    pub fn finish(mut self) -> DynamicGBWT {
        self.flush();
        self.join();
        let mut index = self.index.take().unwrap();
        if self.bidirectional {
            index.header.set(GBWTPayload::FLAG_BIDIRECTIONAL);
        }
        index.recode();
        index
    }

    // Waits for the worker and takes the index and the buffer back.
    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            let (index, mut buffer) = worker.join().unwrap();
            buffer.clear();
            self.index = Some(index);
            self.construction_buffer = buffer;
        }
    }
}

impl Drop for GBWTBuilder {
    fn drop(&mut self) {
        // Wait for the construction thread to finish.
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

//-----------------------------------------------------------------------------
