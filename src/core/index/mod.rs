// Copyright 2019 Zhizhesihai (Beijing) Technology Limited.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::core::doc::Term;
use crate::core::search::Payload;
use crate::core::util::DocId;
use crate::error::Result;

/// A cursor over the positional postings of one term in one segment:
/// documents in increasing order, and within the current document the
/// term's positions in increasing order, each optionally carrying a
/// payload.
///
/// This is the boundary to the postings codec; implementations are
/// supplied by the owning segment reader.
pub trait TermPositions: Send {
    /// Moves to the next document containing the term. Returns `false`
    /// when the posting list is exhausted.
    fn next(&mut self) -> Result<bool>;

    /// Moves to the first document whose id is `>= target`. Returns
    /// `false` when no such document exists. Behavior is undefined for a
    /// target behind the current document.
    fn skip_to(&mut self, target: DocId) -> Result<bool>;

    /// The current document id.
    fn doc(&self) -> DocId;

    /// Number of occurrences of the term in the current document.
    fn freq(&self) -> i32;

    /// Returns the next position of the term within the current document.
    /// Must not be called more than `freq()` times per document.
    fn next_position(&mut self) -> Result<i32>;

    /// Length in bytes of the payload at the current position.
    fn payload_length(&self) -> i32;

    /// Returns the payload stored at the current position. May be called
    /// at most once per position, and only when `is_payload_available()`.
    fn payload(&mut self) -> Result<Payload>;

    /// Whether the current position carries a payload.
    fn is_payload_available(&self) -> bool;

    /// Upper bound of the number of documents this cursor may visit.
    fn cost(&self) -> usize;
}

/// Read access to one index segment: positional postings per term and the
/// per-field norm bytes written at index time.
pub trait LeafReader {
    type Postings: TermPositions;

    /// Returns a positions cursor for `term`, or `None` when the segment
    /// has no postings for it.
    fn term_positions(&self, term: &Term) -> Result<Option<Self::Postings>>;

    /// The per-document norm bytes of `field`, indexed by doc id.
    fn norms(&self, field: &str) -> Option<&[u8]>;

    /// One greater than the largest document id in this segment.
    fn max_doc(&self) -> DocId;
}
