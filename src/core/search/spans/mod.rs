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

mod span_near;

pub use self::span_near::*;

mod span_term;

pub use self::span_term::*;

mod span_weight;

pub use self::span_weight::*;

use crate::core::doc::Term;
use crate::core::index::{LeafReader, TermPositions};
use crate::core::search::payloads::PayloadNearQuery;
use crate::core::search::Payload;
use crate::core::util::DocId;
use crate::error::Result;

use std::fmt;

/// Enumerates match occurrences of one query clause as `(doc, start, end)`
/// windows, `end` exclusive. Occurrences come in non-decreasing
/// `(doc, start, end)` order: documents ascending, and within one document
/// by increasing start and then increasing end. Zero-length windows
/// (`start == end`) are legal.
///
/// A cursor starts unpositioned; the first `next()` moves to the first
/// occurrence. Once `next()` or `skip_to()` has returned `false` the
/// cursor is exhausted for good.
pub trait Spans: Send {
    /// Moves to the next match occurrence, returning `false` when there
    /// are no more.
    fn next(&mut self) -> Result<bool>;

    /// Moves to the first occurrence in a document whose id is
    /// `>= target`, returning `false` when no such occurrence exists.
    /// Behavior is undefined for a target at or behind the current
    /// document of a positioned cursor.
    fn skip_to(&mut self, target: DocId) -> Result<bool>;

    /// Document of the current occurrence.
    fn doc(&self) -> DocId;

    /// First position of the current occurrence.
    fn start(&self) -> i32;

    /// Position one past the last covered by the current occurrence.
    fn end(&self) -> i32;

    /// Payloads carried by the current occurrence. May be called at most
    /// once per occurrence, before the next advance.
    fn payload(&mut self) -> Result<Vec<Payload>>;

    /// Whether the current occurrence carries any payload.
    fn is_payload_available(&self) -> bool;

    /// Upper bound of the number of documents with occurrences.
    fn cost(&self) -> usize;
}

/// The concrete cursor shapes produced by span queries, dispatched
/// statically. Composite matchers nest arbitrarily through their
/// sub-cursors.
pub enum SpansEnum<T: TermPositions> {
    Term(TermSpans<T>),
    NearOrdered(NearSpansOrdered<T>),
    NearUnordered(Box<NearSpansUnordered<T>>),
}

impl<T: TermPositions> Spans for SpansEnum<T> {
    fn next(&mut self) -> Result<bool> {
        match self {
            SpansEnum::Term(s) => s.next(),
            SpansEnum::NearOrdered(s) => s.next(),
            SpansEnum::NearUnordered(s) => s.next(),
        }
    }

    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        match self {
            SpansEnum::Term(s) => s.skip_to(target),
            SpansEnum::NearOrdered(s) => s.skip_to(target),
            SpansEnum::NearUnordered(s) => s.skip_to(target),
        }
    }

    fn doc(&self) -> DocId {
        match self {
            SpansEnum::Term(s) => s.doc(),
            SpansEnum::NearOrdered(s) => s.doc(),
            SpansEnum::NearUnordered(s) => s.doc(),
        }
    }

    fn start(&self) -> i32 {
        match self {
            SpansEnum::Term(s) => s.start(),
            SpansEnum::NearOrdered(s) => s.start(),
            SpansEnum::NearUnordered(s) => s.start(),
        }
    }

    fn end(&self) -> i32 {
        match self {
            SpansEnum::Term(s) => s.end(),
            SpansEnum::NearOrdered(s) => s.end(),
            SpansEnum::NearUnordered(s) => s.end(),
        }
    }

    fn payload(&mut self) -> Result<Vec<Payload>> {
        match self {
            SpansEnum::Term(s) => s.payload(),
            SpansEnum::NearOrdered(s) => s.payload(),
            SpansEnum::NearUnordered(s) => s.payload(),
        }
    }

    fn is_payload_available(&self) -> bool {
        match self {
            SpansEnum::Term(s) => s.is_payload_available(),
            SpansEnum::NearOrdered(s) => s.is_payload_available(),
            SpansEnum::NearUnordered(s) => s.is_payload_available(),
        }
    }

    fn cost(&self) -> usize {
        match self {
            SpansEnum::Term(s) => s.cost(),
            SpansEnum::NearOrdered(s) => s.cost(),
            SpansEnum::NearUnordered(s) => s.cost(),
        }
    }
}

/// Base contract of span-producing queries.
pub trait SpanQuery: fmt::Display {
    /// The name of the field matched by this query.
    fn field(&self) -> &str;

    /// The query's score multiplier.
    fn boost(&self) -> f32;

    /// Collects all terms this query transitively matches against.
    fn extract_terms(&self, terms: &mut Vec<Term>);
}

/// A span query clause: a term leaf or a nested proximity query.
#[derive(Clone)]
pub enum SpanQueryEnum {
    Term(SpanTermQuery),
    Near(SpanNearQuery),
    PayloadNear(PayloadNearQuery),
}

impl SpanQueryEnum {
    /// Builds the match cursor of this query over one segment, or `None`
    /// when a required term has no postings there.
    pub fn get_spans<R: LeafReader>(
        &self,
        reader: &R,
        collect_payloads: bool,
    ) -> Result<Option<SpansEnum<R::Postings>>> {
        match self {
            SpanQueryEnum::Term(q) => q.get_spans(reader),
            SpanQueryEnum::Near(q) => q.get_spans(reader, collect_payloads),
            SpanQueryEnum::PayloadNear(q) => q.get_spans(reader),
        }
    }
}

impl SpanQuery for SpanQueryEnum {
    fn field(&self) -> &str {
        match self {
            SpanQueryEnum::Term(q) => q.field(),
            SpanQueryEnum::Near(q) => q.field(),
            SpanQueryEnum::PayloadNear(q) => q.field(),
        }
    }

    fn boost(&self) -> f32 {
        match self {
            SpanQueryEnum::Term(q) => q.boost(),
            SpanQueryEnum::Near(q) => q.boost(),
            SpanQueryEnum::PayloadNear(q) => q.boost(),
        }
    }

    fn extract_terms(&self, terms: &mut Vec<Term>) {
        match self {
            SpanQueryEnum::Term(q) => q.extract_terms(terms),
            SpanQueryEnum::Near(q) => q.extract_terms(terms),
            SpanQueryEnum::PayloadNear(q) => q.extract_terms(terms),
        }
    }
}

impl fmt::Display for SpanQueryEnum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SpanQueryEnum::Term(q) => write!(f, "{}", q),
            SpanQueryEnum::Near(q) => write!(f, "{}", q),
            SpanQueryEnum::PayloadNear(q) => write!(f, "{}", q),
        }
    }
}
