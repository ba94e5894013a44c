//! The static GBWT index.
//!
//! [`GBWT`] is the compressed, immutable form of the index. It is produced by
//! compressing a finished [`DynamicGBWT`] and shares the serialization format with
//! it, so either type can load a file written by the other. The static index
//! supports sequence navigation and serves as a source for
//! [`DynamicGBWT::merge`](crate::DynamicGBWT::merge).
//!
//! # Examples
//!
//! ```
//! use gbwt_dynamic::{DynamicGBWT, GBWT};
//!
//! let mut dynamic = DynamicGBWT::new();
//! dynamic.insert(&[2, 4, 5, 0]);
//! let index = GBWT::from(&dynamic);
//!
//! assert_eq!(index.sequences(), 1);
//! assert_eq!(index.len(), 4);
//! let path: Vec<usize> = index.sequence(0).collect();
//! assert_eq!(path, vec![2, 4, 5]);
//! ```

use crate::bwt::{BWT, BWTBuilder, DASamples, Record};
use crate::dynamic::DynamicGBWT;
use crate::headers::{Header, GBWTPayload};
use crate::ENDMARKER;

use simple_sds::serialize::Serialize;

use std::io::{Error, ErrorKind};
use std::iter::FusedIterator;
use std::io;

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// The static GBWT index.
///
/// The records are stored in compressed form and decompressed on access.
/// The endmarker record is decompressed eagerly, because it is accessed for every
/// sequence and compresses poorly.
/// See the module-level documentation for an example.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GBWT {
    header: Header<GBWTPayload>,
    bwt: BWT,
    samples: DASamples,
    endmarker: Vec<(usize, usize)>,
}

/// Index statistics.
impl GBWT {
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
    #[inline]
    pub fn is_bidirectional(&self) -> bool {
        self.header.is_set(GBWTPayload::FLAG_BIDIRECTIONAL)
    }

    /// Returns the number of sampled positions in the index.
    #[inline]
    pub fn samples(&self) -> usize {
        self.samples.len()
    }

    /// Returns the record for the given node, or [`None`] if the record is empty
    /// or the node does not exist. The endmarker record is a valid argument.
    pub fn record(&self, node: usize) -> Option<Record> {
        if node != ENDMARKER && !self.has_node(node) {
            return None;
        }
        let comp = if node == ENDMARKER { node } else { node - self.alphabet_offset() };
        self.bwt.record(comp)
    }
}

//-----------------------------------------------------------------------------

/// Sequence navigation.
impl GBWT {
    /// Returns the first position of sequence `id`, or [`None`] if no such sequence exists.
    ///
    /// The return value is a pair (node identifier, offset in node).
    pub fn start(&self, id: usize) -> Option<(usize, usize)> {
        if id < self.endmarker.len() {
            Some(self.endmarker[id])
        } else {
            None
        }
    }

    /// Follows the sequence forward and returns the next position, or [`None`] if
    /// the sequence ends.
    ///
    /// The argument and the return value are pairs (node identifier, offset in node).
    pub fn forward(&self, pos: (usize, usize)) -> Option<(usize, usize)> {
        // This also catches the endmarker.
        if pos.0 < self.first_node() {
            return None;
        }
        if let Some(record) = self.record(pos.0) {
            return record.lf(pos.1);
        }
        None
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
}

//-----------------------------------------------------------------------------

impl From<&DynamicGBWT> for GBWT {
    fn from(source: &DynamicGBWT) -> Self {
        let mut builder = BWTBuilder::new();
        for record in source.bwt.iter() {
            builder.append_record(record);
        }
        let bwt = BWT::from(builder);
        let samples = DASamples::from(source.bwt.as_slice());
        let endmarker = if bwt.is_empty() {
            Vec::new()
        } else {
            bwt.record(ENDMARKER).map_or(Vec::new(), |record| record.decompress())
        };
        GBWT {
            header: source.header,
            bwt,
            samples,
            endmarker,
        }
    }
}

impl Serialize for GBWT {
    fn serialize_header<T: io::Write>(&self, writer: &mut T) -> io::Result<()> {
        self.header.serialize(writer)
    }

    fn serialize_body<T: io::Write>(&self, writer: &mut T) -> io::Result<()> {
        self.bwt.serialize(writer)?;
        self.samples.serialize(writer)?;
        Ok(())
    }

    fn load<T: io::Read>(reader: &mut T) -> io::Result<Self> {
        let header = Header::<GBWTPayload>::load(reader)?;
        if let Err(msg) = header.validate() {
            return Err(Error::new(ErrorKind::InvalidData, msg));
        }

        if header.payload().offset > header.payload().alphabet_size {
            return Err(Error::new(ErrorKind::InvalidData, "GBWT: Alphabet offset past the alphabet size"));
        }
        let bwt = BWT::load(reader)?;
        if bwt.len() != header.payload().alphabet_size - header.payload().offset {
            return Err(Error::new(ErrorKind::InvalidData, "GBWT: Invalid number of records"));
        }
        let samples = DASamples::load(reader)?;

        // Decompress the endmarker, as the record can be poorly compressible.
        let endmarker = if bwt.is_empty() {
            Vec::new()
        } else {
            bwt.record(ENDMARKER).map_or(Vec::new(), |record| record.decompress())
        };

        Ok(GBWT {
            header,
            bwt,
            samples,
            endmarker,
        })
    }

    fn size_in_elements(&self) -> usize {
        self.header.size_in_elements() + self.bwt.size_in_elements() + self.samples.size_in_elements()
    }
}

//-----------------------------------------------------------------------------

/// An iterator over a sequence in the static index.
///
/// The type of `Item` is [`usize`].
/// See the module-level documentation for an example.
#[derive(Clone, Debug)]
pub struct SequenceIter<'a> {
    parent: &'a GBWT,
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
