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

pub mod payloads;
pub mod spans;

mod explanation;

pub use self::explanation::*;

mod searcher;

pub use self::searcher::*;

mod similarity;

pub use self::similarity::*;

use crate::core::util::DocId;
use crate::error::Result;

/// Bytes stored alongside a term occurrence, usable as a scoring signal.
pub type Payload = Vec<u8>;

/// When returned by `next()`, `advance(DocId)` and `doc_id()` it means
/// there are no more docs in the iterator.
pub const NO_MORE_DOCS: DocId = i32::MAX;

/// This trait defines methods to iterate over a set of non-decreasing doc
/// ids. `NO_MORE_DOCS` is used as the exhaustion sentinel, so
/// implementations must treat `i32::MAX` as an invalid document id.
pub trait DocIterator: Send {
    /// Returns the following:
    ///
    /// * `-1` if `next()` or `advance(DocId)` were not called yet.
    /// * `NO_MORE_DOCS` if the iterator has exhausted.
    /// * Otherwise it should return the doc ID it is currently on.
    fn doc_id(&self) -> DocId;

    /// Advances to the next document in the set and returns the doc it is
    /// currently on, or `NO_MORE_DOCS` if there are no more docs in the
    /// set.
    ///
    /// *NOTE:* after the iterator has exhausted you should not call this
    /// method, as it may result in unpredicted behavior.
    fn next(&mut self) -> Result<DocId>;

    /// Advances to the first document beyond the current whose number is
    /// greater than or equal to _target_, and returns that document
    /// number; `NO_MORE_DOCS` when _target_ is beyond the last document.
    ///
    /// The behavior of this method is *undefined* when called with
    /// `target <= current`, or after the iterator has exhausted.
    fn advance(&mut self, target: DocId) -> Result<DocId>;

    /// Slow (linear) implementation of `advance` relying on `next()` to
    /// advance beyond the target position.
    fn slow_advance(&mut self, target: DocId) -> Result<DocId> {
        debug_assert!(self.doc_id() < target);
        let mut doc = self.doc_id();
        while doc < target {
            doc = self.next()?;
        }
        Ok(doc)
    }

    /// Returns the estimated cost of this `DocIterator`.
    ///
    /// This is generally an upper bound of the number of documents this
    /// iterator might match, but may be a rough heuristic, hardcoded
    /// value, or otherwise completely inaccurate.
    fn cost(&self) -> usize;
}

/// Common interface of the per-segment scoring cursors handed to the
/// top-level collector: a doc iterator that can also report the score of
/// the document it is positioned on.
pub trait Scorer: DocIterator {
    /// Score the current document. Only legal when the iterator is
    /// positioned.
    fn score(&mut self) -> Result<f32>;
}

#[cfg(test)]
pub mod tests {
    use super::searcher::Searcher;
    use super::similarity::{DefaultSimilarity, Similarity};
    use super::spans::Spans;
    use super::{Payload, NO_MORE_DOCS};
    use crate::core::doc::Term;
    use crate::core::index::{LeafReader, TermPositions};
    use crate::core::util::{DocId, SmallFloat};
    use crate::error::{ErrorKind, Result};

    use std::collections::HashMap;
    use std::sync::Arc;

    /// Postings of one term in one document.
    #[derive(Clone)]
    pub struct MockPosting {
        pub doc: DocId,
        pub positions: Vec<i32>,
        pub payloads: Vec<Option<Payload>>,
    }

    /// In-memory `TermPositions` over a prebuilt posting list.
    pub struct MockTermPositions {
        postings: Vec<MockPosting>,
        offset: i32,
        pos_offset: usize,
    }

    impl MockTermPositions {
        pub fn new(postings: Vec<MockPosting>) -> Self {
            MockTermPositions {
                postings,
                offset: -1,
                pos_offset: 0,
            }
        }

        fn current(&self) -> &MockPosting {
            &self.postings[self.offset as usize]
        }
    }

    impl TermPositions for MockTermPositions {
        fn next(&mut self) -> Result<bool> {
            self.offset += 1;
            self.pos_offset = 0;
            Ok((self.offset as usize) < self.postings.len())
        }

        fn skip_to(&mut self, target: DocId) -> Result<bool> {
            loop {
                if self.offset >= 0 {
                    if (self.offset as usize) >= self.postings.len() {
                        return Ok(false);
                    }
                    if self.current().doc >= target {
                        return Ok(true);
                    }
                }
                if !self.next()? {
                    return Ok(false);
                }
            }
        }

        fn doc(&self) -> DocId {
            if self.offset < 0 {
                -1
            } else if (self.offset as usize) >= self.postings.len() {
                NO_MORE_DOCS
            } else {
                self.current().doc
            }
        }

        fn freq(&self) -> i32 {
            self.current().positions.len() as i32
        }

        fn next_position(&mut self) -> Result<i32> {
            let pos = self.current().positions[self.pos_offset];
            self.pos_offset += 1;
            Ok(pos)
        }

        fn payload_length(&self) -> i32 {
            self.current().payloads[self.pos_offset - 1]
                .as_ref()
                .map_or(0, |p| p.len() as i32)
        }

        fn payload(&mut self) -> Result<Payload> {
            match self.current().payloads[self.pos_offset - 1] {
                Some(ref p) => Ok(p.clone()),
                None => bail!(ErrorKind::IllegalState(
                    "no payload at current position".into()
                )),
            }
        }

        fn is_payload_available(&self) -> bool {
            self.pos_offset > 0 && self.current().payloads[self.pos_offset - 1].is_some()
        }

        fn cost(&self) -> usize {
            self.postings.len()
        }
    }

    /// A single-segment in-memory index, acting as both the segment reader
    /// and the term-statistics searcher.
    pub struct MockIndex {
        field: String,
        postings: HashMap<Term, Vec<MockPosting>>,
        norms: HashMap<String, Vec<u8>>,
        max_doc: DocId,
        similarity: Arc<dyn Similarity>,
    }

    impl MockIndex {
        pub fn new(field: &str) -> Self {
            MockIndex {
                field: field.to_string(),
                postings: HashMap::new(),
                norms: HashMap::new(),
                max_doc: 0,
                similarity: Arc::new(DefaultSimilarity::default()),
            }
        }

        pub fn set_similarity(&mut self, similarity: Arc<dyn Similarity>) {
            self.similarity = similarity;
        }

        /// Adds a document, one whitespace-separated token per position.
        pub fn add_doc(&mut self, text: &str) {
            let tokens: Vec<(&str, Option<&[u8]>)> =
                text.split_whitespace().map(|t| (t, None)).collect();
            self.add_doc_with_payloads(&tokens);
        }

        pub fn add_doc_with_payloads(&mut self, tokens: &[(&str, Option<&[u8]>)]) {
            let doc = self.max_doc;
            self.max_doc += 1;
            for (pos, (token, payload)) in tokens.iter().enumerate() {
                let term = Term::new(self.field.clone(), token.as_bytes().to_vec());
                let list = self.postings.entry(term).or_insert_with(Vec::new);
                if list.last().map(|p| p.doc) != Some(doc) {
                    list.push(MockPosting {
                        doc,
                        positions: vec![],
                        payloads: vec![],
                    });
                }
                let posting = list.last_mut().unwrap();
                posting.positions.push(pos as i32);
                posting.payloads.push(payload.map(|p| p.to_vec()));
            }
            self.norms
                .entry(self.field.clone())
                .or_insert_with(Vec::new)
                .push(SmallFloat::float_to_byte315(1.0));
        }

        pub fn term(&self, text: &str) -> Term {
            Term::new(self.field.clone(), text.as_bytes().to_vec())
        }
    }

    impl LeafReader for MockIndex {
        type Postings = MockTermPositions;

        fn term_positions(&self, term: &Term) -> Result<Option<MockTermPositions>> {
            Ok(self
                .postings
                .get(term)
                .cloned()
                .map(MockTermPositions::new))
        }

        fn norms(&self, field: &str) -> Option<&[u8]> {
            self.norms.get(field).map(|n| n.as_slice())
        }

        fn max_doc(&self) -> DocId {
            self.max_doc
        }
    }

    impl Searcher for MockIndex {
        fn doc_freq(&self, term: &Term) -> Result<i32> {
            Ok(self.postings.get(term).map_or(0, |p| p.len() as i32))
        }

        fn max_doc(&self) -> i32 {
            self.max_doc
        }

        fn similarity(&self) -> Arc<dyn Similarity> {
            Arc::clone(&self.similarity)
        }
    }

    pub fn mock_index(docs: &[&str]) -> MockIndex {
        let mut index = MockIndex::new("field");
        for doc in docs {
            index.add_doc(doc);
        }
        index
    }

    /// Drains a spans cursor into `(doc, start, end)` tuples.
    pub fn collect_spans<S: Spans>(spans: &mut S) -> Vec<(DocId, i32, i32)> {
        let mut out = Vec::new();
        while spans.next().unwrap() {
            out.push((spans.doc(), spans.start(), spans.end()));
        }
        out
    }
}
