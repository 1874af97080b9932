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
use crate::core::index::{LeafReader, TermPositions};
use crate::core::search::spans::{SpanQuery, Spans, SpansEnum};
use crate::core::search::{Payload, NO_MORE_DOCS};
use crate::core::util::DocId;
use crate::error::Result;

use std::fmt;

/// Matches spans containing a single term; the leaf of every span query
/// tree.
#[derive(Clone, Debug)]
pub struct SpanTermQuery {
    pub term: Term,
    boost: f32,
}

impl SpanTermQuery {
    pub fn new(term: Term) -> Self {
        SpanTermQuery { term, boost: 1.0 }
    }

    pub fn with_boost(term: Term, boost: f32) -> Self {
        SpanTermQuery { term, boost }
    }

    pub fn get_spans<R: LeafReader>(&self, reader: &R) -> Result<Option<SpansEnum<R::Postings>>> {
        Ok(reader
            .term_positions(&self.term)?
            .map(|positions| SpansEnum::Term(TermSpans::new(positions, self.term.clone()))))
    }
}

impl SpanQuery for SpanTermQuery {
    fn field(&self) -> &str {
        self.term.field()
    }

    fn boost(&self) -> f32 {
        self.boost
    }

    fn extract_terms(&self, terms: &mut Vec<Term>) {
        terms.push(self.term.clone());
    }
}

impl fmt::Display for SpanTermQuery {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.term)?;
        if (self.boost - 1.0).abs() > f32::EPSILON {
            write!(f, "^{}", self.boost)?;
        }
        Ok(())
    }
}

/// Single-position spans over a term's positional postings. Each occurrence
/// covers exactly one position: `[position, position + 1)`.
pub struct TermSpans<T: TermPositions> {
    positions: T,
    term: Term,
    doc: DocId,
    freq: i32,
    count: i32,
    position: i32,
}

impl<T: TermPositions> TermSpans<T> {
    pub fn new(positions: T, term: Term) -> Self {
        TermSpans {
            positions,
            term,
            doc: -1,
            freq: 0,
            count: 0,
            position: -1,
        }
    }

    pub fn term(&self) -> &Term {
        &self.term
    }

    fn set_doc(&mut self) {
        self.doc = self.positions.doc();
        self.freq = self.positions.freq();
        self.count = 0;
    }
}

impl<T: TermPositions> Spans for TermSpans<T> {
    fn next(&mut self) -> Result<bool> {
        if self.count == self.freq {
            if !self.positions.next()? {
                self.doc = NO_MORE_DOCS;
                return Ok(false);
            }
            self.set_doc();
        }
        self.position = self.positions.next_position()?;
        self.count += 1;
        Ok(true)
    }

    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        if !self.positions.skip_to(target)? {
            self.doc = NO_MORE_DOCS;
            return Ok(false);
        }
        self.set_doc();
        self.position = self.positions.next_position()?;
        self.count = 1;
        Ok(true)
    }

    fn doc(&self) -> DocId {
        self.doc
    }

    fn start(&self) -> i32 {
        self.position
    }

    fn end(&self) -> i32 {
        self.position + 1
    }

    fn payload(&mut self) -> Result<Vec<Payload>> {
        Ok(vec![self.positions.payload()?])
    }

    fn is_payload_available(&self) -> bool {
        self.positions.is_payload_available()
    }

    fn cost(&self) -> usize {
        self.positions.cost()
    }
}
