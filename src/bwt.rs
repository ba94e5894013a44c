//! The BWT stored as an array of compressed node records, and the compressed
//! document array samples stored next to it.
//!
//! This is the on-disk form of the index. Each record is encoded as the outdegree,
//! the outgoing edges with gap-coded successors, and the run-length encoded body.
//! A sparse bitvector over the concatenated encoding marks where each record starts,
//! so the end of a record is the start of the next one.
//!
//! # Examples
//!
//! ```
//! use gbwt_dynamic::bwt::{BWT, BWTBuilder};
//!
//! let mut builder = BWTBuilder::new();
//! builder.append(&[(3, 0)], &[(0, 2)]);
//! builder.append(&[(0, 0), (5, 0)], &[(1, 1), (0, 1)]);
//! builder.append(&[(0, 1)], &[(0, 1)]);
//!
//! let bwt = BWT::from(builder);
//! assert_eq!(bwt.len(), 3);
//!
//! let record = bwt.record(1).unwrap();
//! assert_eq!(record.outdegree(), 2);
//! assert_eq!(record.successor(1), 5);
//! assert_eq!(record.len(), 2);
//! assert_eq!(record.lf(0), Some((5, 0)));
//! assert_eq!(record.lf(1), None); // The sequence ends here.
//! ```

use crate::record::DynamicRecord;
use crate::support::{ByteCodeIter, RLE, RLEIter};

use simple_sds::int_vector::IntVector;
use simple_sds::ops::{Vector, Access, Push, BitVec, Select};
use simple_sds::serialize::Serialize;
use simple_sds::sparse_vector::{SparseVector, SparseBuilder};
use simple_sds::bits;

use std::convert::TryFrom;
use std::io::{Error, ErrorKind};
use std::{cmp, io};

use crate::ENDMARKER;


//-----------------------------------------------------------------------------

/// The BWT encoded as a vector of bytes.
///
/// The encoding consists of `self.len()` concatenated node records.
/// Record identifiers are characters in the effective alphabet `0..self.len()`;
/// the record for node `v > 0` is at index `v - offset`. There may be empty
/// records that do not correspond to any node in the graph.
/// See the module-level documentation for an example.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BWT {
    index: SparseVector,
    data: Vec<u8>,
}

impl BWT {
    /// Returns the number of records in the BWT.
    #[inline]
    pub fn len(&self) -> usize {
        self.index.count_ones()
    }

    /// Returns `true` if the BWT is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the `i`th record, or [`None`] if the record is empty or does not exist.
    pub fn record(&self, i: usize) -> Option<Record> {
        if i >= self.len() {
            return None;
        }
        let mut iter = self.index.select_iter(i);
        let (_, start) = iter.next().unwrap();
        let limit = if i + 1 < self.len() { iter.next().unwrap().1 } else { self.data.len() };
        Record::new(i, &self.data[start..limit])
    }
}

impl Serialize for BWT {
    fn serialize_header<T: io::Write>(&self, _: &mut T) -> io::Result<()> {
        Ok(())
    }

    fn serialize_body<T: io::Write>(&self, writer: &mut T) -> io::Result<()> {
        self.index.serialize(writer)?;
        self.data.serialize(writer)?;
        Ok(())
    }

    fn load<T: io::Read>(reader: &mut T) -> io::Result<Self> {
        let index = SparseVector::load(reader)?;
        let data = Vec::<u8>::load(reader)?;
        if index.len() != data.len() {
            return Err(Error::new(ErrorKind::InvalidData, "BWT: Index / data length mismatch"));
        }
        Ok(BWT {
            index,
            data,
        })
    }

    fn size_in_elements(&self) -> usize {
        self.index.size_in_elements() + self.data.size_in_elements()
    }
}

impl From<BWTBuilder> for BWT {
    fn from(source: BWTBuilder) -> Self {
        let mut builder = SparseBuilder::new(source.encoder.len(), source.offsets.len()).unwrap();
        for offset in source.offsets.iter() {
            unsafe { builder.set_unchecked(*offset); }
        }
        BWT {
            index: SparseVector::try_from(builder).unwrap(),
            data: Vec::<u8>::from(source.encoder),
        }
    }
}

//-----------------------------------------------------------------------------

/// A structure for building the BWT by appending node records.
///
/// Dynamic records are appended when a finished index is compressed or serialized.
/// See the module-level documentation for an example.
#[derive(Clone, Debug, Default)]
pub struct BWTBuilder {
    offsets: Vec<usize>,
    encoder: RLE,
}

impl BWTBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        BWTBuilder::default()
    }

    /// Returns the number of records.
    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns `true` if the builder is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a new record to the BWT.
    ///
    /// Each edge is a pair (successor node, offset in successor), and the edges
    /// must be sorted by node. Each run is a pair `(rank, len)`, with
    /// `rank < edges.len()` and `len > 0`.
    pub fn append(&mut self, edges: &[(usize, usize)], runs: &[(usize, usize)]) {
        self.offsets.push(self.encoder.len());
        self.encoder.write_int(edges.len());
        let mut prev = 0;
        for (node, offset) in edges {
            self.encoder.write_int(*node - prev);
            self.encoder.write_int(*offset);
            prev = *node;
        }
        self.encoder.set_sigma(edges.len());
        for (rank, len) in runs {
            self.encoder.write(*rank, *len);
        }
    }

    /// Appends a dynamic record to the BWT.
    ///
    /// The outgoing edges must be sorted by node, which is the case after
    /// the record has been recoded.
    pub fn append_record(&mut self, record: &DynamicRecord) {
        self.append(&record.outgoing, &record.body);
    }
}

//-----------------------------------------------------------------------------

/// A partially decompressed node record.
///
/// The edges are decompressed eagerly and the body lazily.
/// See the module-level documentation for an example.
#[derive(Clone, Debug)]
pub struct Record<'a> {
    id: usize,
    edges: Vec<(usize, usize)>,
    bwt: &'a [u8],
}

impl<'a> Record<'a> {
    /// Returns a record corresponding to the byte slice, or [`None`] if the record would be empty.
    pub fn new(id: usize, bytes: &'a [u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }

        let mut iter = ByteCodeIter::new(bytes);
        let sigma = iter.next().unwrap();
        if sigma == 0 {
            return None;
        }

        let mut edges: Vec<(usize, usize)> = Vec::with_capacity(sigma);
        let mut prev = 0;
        for _ in 0..sigma {
            let node = iter.next().unwrap() + prev;
            prev = node;
            let offset = iter.next().unwrap();
            edges.push((node, offset));
        }

        Some(Record {
            id,
            edges,
            bwt: &bytes[iter.offset()..],
        })
    }

    /// Returns the identifier of the record.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Returns the outdegree of the node.
    #[inline]
    pub fn outdegree(&self) -> usize {
        self.edges.len()
    }

    /// Returns the outgoing edges as (successor node, offset in successor) pairs.
    #[inline]
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Returns the successor node of rank `i`.
    ///
    /// # Panics
    ///
    /// May panic if `i >= self.outdegree()`.
    #[inline]
    pub fn successor(&self, i: usize) -> usize {
        self.edges[i].0
    }

    /// Returns the stored offset of the outgoing edge of rank `i`.
    ///
    /// # Panics
    ///
    /// May panic if `i >= self.outdegree()`.
    #[inline]
    pub fn offset(&self, i: usize) -> usize {
        self.edges[i].1
    }

    /// Returns an iterator over the runs in the record body.
    pub fn runs(&self) -> RLEIter<'a> {
        RLEIter::with_sigma(self.bwt, self.edges.len())
    }

    /// Returns the length of the record body.
    ///
    /// This requires iterating over the run-length encoded body.
    pub fn len(&self) -> usize {
        self.runs().map(|(_, len)| len).sum()
    }

    /// Decompresses the record as a vector of (successor node, offset in successor) pairs.
    pub fn decompress(&self) -> Vec<(usize, usize)> {
        let mut edges = self.edges.clone();
        let mut result: Vec<(usize, usize)> = Vec::new();
        for (rank, len) in self.runs() {
            for _ in 0..len {
                result.push(edges[rank]);
                edges[rank].1 += 1;
            }
        }
        result
    }

    /// Follows the sequence at offset `i` and returns (successor node, offset in successor).
    ///
    /// Returns [`None`] if the sequence ends or offset `i` does not exist.
    pub fn lf(&self, i: usize) -> Option<(usize, usize)> {
        let mut edges = self.edges.clone();
        let mut offset = 0;
        for (rank, len) in self.runs() {
            if offset + len > i {
                if self.successor(rank) == ENDMARKER {
                    return None;
                } else {
                    edges[rank].1 += i - offset;
                    return Some(edges[rank]);
                }
            }
            edges[rank].1 += len;
            offset += len;
        }
        None
    }
}

//-----------------------------------------------------------------------------

/// Compressed document array samples.
///
/// The samples mark positions in the concatenation of all record bodies, in record
/// order, with the sampled sequence identifiers stored in the same order. Iteration
/// yields (position, sequence id) pairs; the caller maps positions back to records
/// by walking the records in order and keeping track of the running body offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DASamples {
    positions: SparseVector,
    ids: IntVector,
}

impl DASamples {
    /// Returns the number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.count_ones()
    }

    /// Returns `true` if there are no samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over (position, sequence id) pairs in position order.
    ///
    /// Positions are offsets in the concatenation of all record bodies.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.positions.one_iter().map(move |(rank, pos)| (pos, self.ids.get(rank) as usize))
    }
}

impl From<&[DynamicRecord]> for DASamples {
    fn from(records: &[DynamicRecord]) -> Self {
        let total_size: usize = records.iter().map(|record| record.len()).sum();
        let count: usize = records.iter().map(|record| record.samples()).sum();
        let max_id: usize = records.iter()
            .flat_map(|record| record.ids.iter().map(|sample| sample.1))
            .max().unwrap_or(0);

        let mut builder = SparseBuilder::new(total_size, count).unwrap();
        let mut ids = IntVector::with_capacity(count, bits::bit_len(cmp::max(max_id, 1) as u64)).unwrap();
        let mut start = 0;
        for record in records.iter() {
            for &(offset, id) in record.ids.iter() {
                unsafe { builder.set_unchecked(start + offset); }
                ids.push(id as u64);
            }
            start += record.len();
        }

        DASamples {
            positions: SparseVector::try_from(builder).unwrap(),
            ids,
        }
    }
}

impl Serialize for DASamples {
    fn serialize_header<T: io::Write>(&self, _: &mut T) -> io::Result<()> {
        Ok(())
    }

    fn serialize_body<T: io::Write>(&self, writer: &mut T) -> io::Result<()> {
        self.positions.serialize(writer)?;
        self.ids.serialize(writer)?;
        Ok(())
    }

    fn load<T: io::Read>(reader: &mut T) -> io::Result<Self> {
        let positions = SparseVector::load(reader)?;
        let ids = IntVector::load(reader)?;
        if positions.count_ones() != ids.len() {
            return Err(Error::new(ErrorKind::InvalidData, "DASamples: Position / identifier count mismatch"));
        }
        Ok(DASamples {
            positions,
            ids,
        })
    }

    fn size_in_elements(&self) -> usize {
        self.positions.size_in_elements() + self.ids.size_in_elements()
    }
}

//-----------------------------------------------------------------------------
