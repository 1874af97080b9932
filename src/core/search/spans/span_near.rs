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

use crate::core::index::{LeafReader, TermPositions};
use crate::core::search::searcher::Searcher;
use crate::core::search::spans::{SpanQuery, SpanQueryEnum, SpanWeight, Spans, SpansEnum};
use crate::core::search::Payload;
use crate::core::util::DocId;
use crate::error::{ErrorKind, Result};

use crate::core::doc::Term;
use std::fmt;

pub struct SpanNearQueryBuilder {
    field: String,
    ordered: bool,
    clauses: Vec<SpanQueryEnum>,
    slop: i32,
}

impl SpanNearQueryBuilder {
    pub fn new(field: String, ordered: bool) -> Self {
        SpanNearQueryBuilder {
            field,
            ordered,
            clauses: vec![],
            slop: 0,
        }
    }

    pub fn add_clause(mut self, clause: SpanQueryEnum) -> Result<Self> {
        if clause.field() != self.field {
            bail!(ErrorKind::IllegalArgument(format!(
                "clause field is '{}' not equal with field '{}'",
                clause.field(),
                &self.field
            )));
        }
        self.clauses.push(clause);
        Ok(self)
    }

    pub fn slop(mut self, slop: i32) -> Self {
        self.slop = slop;
        self
    }

    pub fn build(self) -> Result<SpanNearQuery> {
        SpanNearQuery::new(self.clauses, self.slop, self.ordered)
    }
}

/// Matches spans which occur near one another: every clause must match
/// within the same document, within `slop` total positions of looseness,
/// and when `in_order` is set, in strict left-to-right order.
#[derive(Clone)]
pub struct SpanNearQuery {
    clauses: Vec<SpanQueryEnum>,
    slop: i32,
    in_order: bool,
    field: String,
    boost: f32,
}

impl SpanNearQuery {
    pub fn new(clauses: Vec<SpanQueryEnum>, slop: i32, in_order: bool) -> Result<Self> {
        if clauses.is_empty() {
            bail!(ErrorKind::IllegalArgument(
                "clauses must not be empty!".into()
            ));
        }
        if slop < 0 {
            bail!(ErrorKind::IllegalArgument(format!(
                "slop must not be negative: {}",
                slop
            )));
        }
        for window in clauses.windows(2) {
            if window[0].field() != window[1].field() {
                bail!(ErrorKind::IllegalArgument(
                    "Clauses must have same field.".into()
                ));
            }
        }
        let field = clauses[0].field().to_string();
        Ok(SpanNearQuery {
            clauses,
            slop,
            in_order,
            field,
            boost: 1.0,
        })
    }

    pub fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    pub fn slop(&self) -> i32 {
        self.slop
    }

    pub fn clauses(&self) -> &[SpanQueryEnum] {
        &self.clauses
    }

    pub fn create_weight(&self, searcher: &dyn Searcher) -> Result<SpanWeight> {
        SpanWeight::new(SpanQueryEnum::Near(self.clone()), searcher)
    }

    /// Builds this query's matcher over one segment. Every clause is
    /// required, so a clause without postings means no matches at all.
    pub fn get_spans<R: LeafReader>(
        &self,
        reader: &R,
        collect_payloads: bool,
    ) -> Result<Option<SpansEnum<R::Postings>>> {
        let mut sub_spans = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            match clause.get_spans(reader, collect_payloads)? {
                Some(spans) => sub_spans.push(spans),
                None => return Ok(None),
            }
        }
        let spans = if self.in_order {
            SpansEnum::NearOrdered(NearSpansOrdered::new(
                self.slop,
                sub_spans,
                collect_payloads,
            )?)
        } else {
            SpansEnum::NearUnordered(Box::new(NearSpansUnordered::new(self.slop, sub_spans)?))
        };
        Ok(Some(spans))
    }
}

impl SpanQuery for SpanNearQuery {
    fn field(&self) -> &str {
        &self.field
    }

    fn boost(&self) -> f32 {
        self.boost
    }

    fn extract_terms(&self, terms: &mut Vec<Term>) {
        for clause in &self.clauses {
            clause.extract_terms(terms);
        }
    }
}

impl fmt::Display for SpanNearQuery {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let clauses = self
            .clauses
            .iter()
            .map(|c| format!("{}", c))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "spanNear([{}], {}, {})", clauses, self.slop, self.in_order)?;
        if (self.boost - 1.0).abs() > f32::EPSILON {
            write!(f, "^{}", self.boost)?;
        }
        Ok(())
    }
}

/// A matcher over the ordered sub-spans of a `SpanNearQuery`: the clauses
/// must appear strictly left to right, non-overlapping, and the sum of the
/// gaps between adjacent clause spans must not exceed the slop.
///
/// Successive matches are enumerated leftmost-first: among the candidate
/// position assignments for a document, the one whose clause positions are
/// lexicographically least is reported, and the first clause is advanced
/// past it before the next match is formed.
pub struct NearSpansOrdered<T: TermPositions> {
    sub_spans: Vec<SpansEnum<T>>,
    // clause indexes, reordered by current doc while converging
    by_doc: Vec<usize>,
    allowed_slop: i32,
    collect_payloads: bool,
    first_time: bool,
    more: bool,
    // all sub-spans are positioned in the same doc and candidates remain
    in_same_doc: bool,
    match_doc: DocId,
    match_start: i32,
    match_end: i32,
    match_payload: Vec<Payload>,
    cost: usize,
}

impl<T: TermPositions> NearSpansOrdered<T> {
    pub fn new(
        allowed_slop: i32,
        sub_spans: Vec<SpansEnum<T>>,
        collect_payloads: bool,
    ) -> Result<Self> {
        if sub_spans.is_empty() {
            bail!(ErrorKind::IllegalArgument(
                "at least one sub span is required!".into()
            ));
        }
        let by_doc = (0..sub_spans.len()).collect();
        let cost = sub_spans.iter().map(Spans::cost).min().unwrap();
        Ok(NearSpansOrdered {
            sub_spans,
            by_doc,
            allowed_slop,
            collect_payloads,
            first_time: true,
            more: false,
            in_same_doc: false,
            match_doc: -1,
            match_start: -1,
            match_end: -1,
            match_payload: vec![],
            cost,
        })
    }

    pub fn sub_spans_mut(&mut self) -> &mut [SpansEnum<T>] {
        &mut self.sub_spans
    }

    /// Whether `(start1, end1)` is before `(start2, end2)` in the
    /// within-document candidate order: ascending start, then ascending
    /// end. Two spans in this relation never overlap going left to right.
    fn doc_spans_ordered(start1: i32, end1: i32, start2: i32, end2: i32) -> bool {
        if start1 == start2 {
            end1 < end2
        } else {
            start1 < start2
        }
    }

    fn pair_ordered(&self, prev: usize, next: usize) -> bool {
        debug_assert_eq!(self.sub_spans[prev].doc(), self.sub_spans[next].doc());
        Self::doc_spans_ordered(
            self.sub_spans[prev].start(),
            self.sub_spans[prev].end(),
            self.sub_spans[next].start(),
            self.sub_spans[next].end(),
        )
    }

    /// Advances the lagging sub-spans until all are positioned within one
    /// document, or any of them exhausts.
    fn to_same_doc(&mut self) -> Result<bool> {
        {
            let NearSpansOrdered {
                ref mut by_doc,
                ref sub_spans,
                ..
            } = *self;
            by_doc.sort_by_key(|&i| sub_spans[i].doc());
        }
        let len = self.by_doc.len();
        let mut first_index = 0;
        let mut max_doc = self.sub_spans[self.by_doc[len - 1]].doc();
        while self.sub_spans[self.by_doc[first_index]].doc() != max_doc {
            let idx = self.by_doc[first_index];
            if !self.sub_spans[idx].skip_to(max_doc)? {
                self.more = false;
                self.in_same_doc = false;
                return Ok(false);
            }
            max_doc = self.sub_spans[idx].doc();
            first_index += 1;
            if first_index == len {
                first_index = 0;
            }
        }
        debug_assert!(self.sub_spans.iter().all(|s| s.doc() == max_doc));
        self.in_same_doc = true;
        Ok(true)
    }

    /// Orders the sub-spans within the current document by advancing each
    /// one after the first as little as necessary. Returns `false` when at
    /// least one sub-span left the document or exhausted instead.
    fn stretch_to_order(&mut self) -> Result<bool> {
        self.match_doc = self.sub_spans[0].doc();
        let mut i = 1;
        while self.in_same_doc && i < self.sub_spans.len() {
            while !self.pair_ordered(i - 1, i) {
                if !self.sub_spans[i].next()? {
                    self.in_same_doc = false;
                    self.more = false;
                    break;
                } else if self.match_doc != self.sub_spans[i].doc() {
                    self.in_same_doc = false;
                    break;
                }
            }
            i += 1;
        }
        Ok(self.in_same_doc)
    }

    /// Walks the ordered sub-spans right to left, advancing each one as
    /// far as possible while it still precedes its successor. This settles
    /// on the candidate with the smallest total gap, accumulates that gap
    /// into the match slop, and leaves the first sub-span advanced past
    /// the match. Only non-overlapping adjacent spans contribute to the
    /// slop.
    fn shrink_to_after_shortest_match(&mut self) -> Result<bool> {
        let last = self.sub_spans.len() - 1;
        self.match_start = self.sub_spans[last].start();
        self.match_end = self.sub_spans[last].end();
        let mut possible_match_payloads: Vec<Payload> = Vec::new();
        if self.collect_payloads && self.sub_spans[last].is_payload_available() {
            let payload = self.sub_spans[last].payload()?;
            possible_match_payloads.extend(payload);
        }

        let mut match_slop = 0;
        let mut last_start = self.match_start;
        let mut last_end = self.match_end;
        for i in (0..last).rev() {
            let mut possible_payload: Option<Vec<Payload>> = None;
            if self.collect_payloads && self.sub_spans[i].is_payload_available() {
                possible_payload = Some(self.sub_spans[i].payload()?);
            }
            let mut prev_start = self.sub_spans[i].start();
            let mut prev_end = self.sub_spans[i].end();
            loop {
                if !self.sub_spans[i].next()? {
                    self.in_same_doc = false;
                    self.more = false;
                    break;
                } else if self.match_doc != self.sub_spans[i].doc() {
                    // the remaining sub-spans still hold the last match
                    // in this document
                    self.in_same_doc = false;
                    break;
                } else {
                    let pp_start = self.sub_spans[i].start();
                    let pp_end = self.sub_spans[i].end();
                    if !Self::doc_spans_ordered(pp_start, pp_end, last_start, last_end) {
                        break;
                    }
                    prev_start = pp_start;
                    prev_end = pp_end;
                    if self.collect_payloads && self.sub_spans[i].is_payload_available() {
                        possible_payload = Some(self.sub_spans[i].payload()?);
                    }
                }
            }
            if let Some(payload) = possible_payload {
                possible_match_payloads.extend(payload);
            }
            debug_assert!(prev_start <= self.match_start);
            if self.match_start > prev_end {
                match_slop += self.match_start - prev_end;
            }
            // do not bail out on a slop overflow here: the first sub-span
            // must end up advanced past the match either way
            self.match_start = prev_start;
            last_start = prev_start;
            last_end = prev_end;
        }
        if last == 0 {
            // a single clause has no predecessor walk to advance it past
            // the match, so move it along here
            if !self.sub_spans[0].next()? {
                self.in_same_doc = false;
                self.more = false;
            } else if self.match_doc != self.sub_spans[0].doc() {
                self.in_same_doc = false;
            }
        }
        let matched = match_slop <= self.allowed_slop;
        if matched && !possible_match_payloads.is_empty() {
            self.match_payload.extend(possible_match_payloads);
        }
        Ok(matched)
    }

    fn advance_after_ordered(&mut self) -> Result<bool> {
        while self.more && (self.in_same_doc || self.to_same_doc()?) {
            if self.stretch_to_order()? && self.shrink_to_after_shortest_match()? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<T: TermPositions> Spans for NearSpansOrdered<T> {
    fn next(&mut self) -> Result<bool> {
        if self.first_time {
            self.first_time = false;
            for spans in &mut self.sub_spans {
                if !spans.next()? {
                    self.more = false;
                    return Ok(false);
                }
            }
            self.more = true;
        }
        if self.collect_payloads {
            self.match_payload.clear();
        }
        self.advance_after_ordered()
    }

    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        if self.first_time {
            self.first_time = false;
            for spans in &mut self.sub_spans {
                if !spans.skip_to(target)? {
                    self.more = false;
                    return Ok(false);
                }
            }
            self.more = true;
        } else if self.more && self.sub_spans[0].doc() < target {
            if self.sub_spans[0].skip_to(target)? {
                self.in_same_doc = false;
            } else {
                self.more = false;
                return Ok(false);
            }
        }
        if self.collect_payloads {
            self.match_payload.clear();
        }
        self.advance_after_ordered()
    }

    fn doc(&self) -> DocId {
        self.match_doc
    }

    fn start(&self) -> i32 {
        self.match_start
    }

    fn end(&self) -> i32 {
        self.match_end
    }

    fn payload(&mut self) -> Result<Vec<Payload>> {
        Ok(self.match_payload.clone())
    }

    fn is_payload_available(&self) -> bool {
        !self.match_payload.is_empty()
    }

    fn cost(&self) -> usize {
        self.cost
    }
}

/// One clause of an unordered matcher: the clause's spans, its current
/// span length, and the link to the next cell of the doc-ordered list.
struct SpansCell<T: TermPositions> {
    spans: SpansEnum<T>,
    next: Option<usize>,
    length: i32,
}

/// Min-heap of cell indexes ordered by the cells' current
/// `(doc, start, end)`. The cell arena is passed into every operation so
/// the heap itself stays a plain index vector.
struct CellQueue {
    heap: Vec<usize>,
}

impl CellQueue {
    fn with_capacity(capacity: usize) -> Self {
        CellQueue {
            heap: Vec::with_capacity(capacity),
        }
    }

    fn clear(&mut self) {
        self.heap.clear();
    }

    fn top(&self) -> usize {
        self.heap[0]
    }

    fn push<T: TermPositions>(&mut self, cell: usize, cells: &[SpansCell<T>]) {
        self.heap.push(cell);
        let mut i = self.heap.len() - 1;
        while i > 0 {
            let parent = (i - 1) / 2;
            if Self::less_than(self.heap[i], self.heap[parent], cells) {
                self.heap.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn pop<T: TermPositions>(&mut self, cells: &[SpansCell<T>]) -> Option<usize> {
        if self.heap.is_empty() {
            return None;
        }
        let top = self.heap.swap_remove(0);
        if !self.heap.is_empty() {
            self.sift_down(0, cells);
        }
        Some(top)
    }

    /// Restores the heap property after the top cell advanced.
    fn update_top<T: TermPositions>(&mut self, cells: &[SpansCell<T>]) {
        self.sift_down(0, cells);
    }

    fn sift_down<T: TermPositions>(&mut self, mut i: usize, cells: &[SpansCell<T>]) {
        loop {
            let left = 2 * i + 1;
            let right = left + 1;
            let mut smallest = i;
            if left < self.heap.len() && Self::less_than(self.heap[left], self.heap[smallest], cells)
            {
                smallest = left;
            }
            if right < self.heap.len()
                && Self::less_than(self.heap[right], self.heap[smallest], cells)
            {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.heap.swap(i, smallest);
            i = smallest;
        }
    }

    fn less_than<T: TermPositions>(a: usize, b: usize, cells: &[SpansCell<T>]) -> bool {
        let sa = &cells[a].spans;
        let sb = &cells[b].spans;
        if sa.doc() == sb.doc() {
            if sa.start() == sb.start() {
                sa.end() < sb.end()
            } else {
                sa.start() < sb.start()
            }
        } else {
            sa.doc() < sb.doc()
        }
    }
}

/// A matcher over the unordered sub-spans of a `SpanNearQuery`: all
/// clauses must match within one document, in any order, and the matched
/// window satisfies `max_end - min_start - total_span_length <= slop`.
///
/// The cells live in an arena and are threaded through two mirrored views:
/// a singly linked list ordered by document only, used to bulk-advance the
/// most-lagging clause while converging on a common document, and a
/// priority queue ordered by `(doc, start, end)`, used for minimum lookup
/// once converged. The list and the queue are rebuilt from one another at
/// the transitions and are never left partially diverged across a public
/// call.
pub struct NearSpansUnordered<T: TermPositions> {
    cells: Vec<SpansCell<T>>,
    first: Option<usize>,
    last: Option<usize>,
    queue: CellQueue,
    // cell holding the greatest (doc, end) seen since the last rebuild
    max_cell: Option<usize>,
    // running sum of the cells' current span lengths
    total_length: i32,
    allowed_slop: i32,
    more: bool,
    first_time: bool,
    cost: usize,
}

impl<T: TermPositions> NearSpansUnordered<T> {
    pub fn new(allowed_slop: i32, sub_spans: Vec<SpansEnum<T>>) -> Result<Self> {
        if sub_spans.is_empty() {
            bail!(ErrorKind::IllegalArgument(
                "at least one sub span is required!".into()
            ));
        }
        let cost = sub_spans.iter().map(Spans::cost).min().unwrap();
        let capacity = sub_spans.len();
        let cells = sub_spans
            .into_iter()
            .map(|spans| SpansCell {
                spans,
                next: None,
                length: -1,
            })
            .collect();
        Ok(NearSpansUnordered {
            cells,
            first: None,
            last: None,
            queue: CellQueue::with_capacity(capacity),
            max_cell: None,
            total_length: 0,
            allowed_slop,
            more: true,
            first_time: true,
            cost,
        })
    }

    pub fn sub_spans_mut<'a>(&'a mut self) -> impl Iterator<Item = &'a mut SpansEnum<T>> + 'a {
        self.cells.iter_mut().map(|cell| &mut cell.spans)
    }

    fn min(&self) -> usize {
        self.queue.top()
    }

    /// Updates the length bookkeeping and the max cell after cell `idx`
    /// advanced; latches the exhaustion flag when the advance failed.
    fn adjust(&mut self, idx: usize, condition: bool) {
        if self.cells[idx].length != -1 {
            self.total_length -= self.cells[idx].length;
        }
        if condition {
            let length = self.cells[idx].spans.end() - self.cells[idx].spans.start();
            self.cells[idx].length = length;
            self.total_length += length;
            let exceeds_max = match self.max_cell {
                None => true,
                Some(max) => {
                    let doc = self.cells[idx].spans.doc();
                    let max_doc = self.cells[max].spans.doc();
                    doc > max_doc
                        || (doc == max_doc
                            && self.cells[idx].spans.end() > self.cells[max].spans.end())
                }
            };
            if exceeds_max {
                self.max_cell = Some(idx);
            }
        }
        self.more = condition;
    }

    fn cell_next(&mut self, idx: usize) -> Result<bool> {
        let condition = self.cells[idx].spans.next()?;
        self.adjust(idx, condition);
        Ok(condition)
    }

    fn cell_skip_to(&mut self, idx: usize, target: DocId) -> Result<bool> {
        let condition = self.cells[idx].spans.skip_to(target)?;
        self.adjust(idx, condition);
        Ok(condition)
    }

    fn add_to_list(&mut self, idx: usize) {
        if let Some(last) = self.last {
            self.cells[last].next = Some(idx);
        } else {
            self.first = Some(idx);
        }
        self.last = Some(idx);
        self.cells[idx].next = None;
    }

    /// Rotates the head of the list to its tail after the head caught up
    /// with the tail's document.
    fn first_to_last(&mut self) {
        let first = self.first.unwrap();
        let last = self.last.unwrap();
        self.cells[last].next = Some(first);
        self.last = Some(first);
        self.first = self.cells[first].next;
        self.cells[first].next = None;
    }

    fn queue_to_list(&mut self) {
        self.first = None;
        self.last = None;
        while let Some(idx) = self.queue.pop(&self.cells) {
            self.add_to_list(idx);
        }
    }

    fn list_to_queue(&mut self) {
        self.queue.clear();
        let mut cell = self.first;
        while let Some(idx) = cell {
            cell = self.cells[idx].next;
            self.queue.push(idx, &self.cells);
        }
    }

    fn init_list(&mut self, advance: bool) -> Result<()> {
        self.first = None;
        self.last = None;
        for idx in 0..self.cells.len() {
            if !self.more {
                break;
            }
            if advance {
                self.cell_next(idx)?;
            }
            if self.more {
                self.add_to_list(idx);
            }
        }
        Ok(())
    }

    fn head_lags_tail(&self) -> bool {
        match (self.first, self.last) {
            (Some(first), Some(last)) => {
                self.cells[first].spans.doc() < self.cells[last].spans.doc()
            }
            _ => false,
        }
    }

    fn at_match(&self) -> bool {
        let min = self.min();
        let max = self.max_cell.unwrap();
        self.cells[min].spans.doc() == self.cells[max].spans.doc()
            && self.cells[max].spans.end() - self.cells[min].spans.start() - self.total_length
                <= self.allowed_slop
    }
}

impl<T: TermPositions> Spans for NearSpansUnordered<T> {
    fn next(&mut self) -> Result<bool> {
        if self.first_time {
            self.init_list(true)?;
            if self.more {
                self.list_to_queue();
            }
            self.first_time = false;
        } else if self.more {
            let min = self.min();
            if self.cell_next(min)? {
                self.queue.update_top(&self.cells);
            } else {
                self.more = false;
            }
        }

        while self.more {
            let mut queue_stale = false;
            let min = self.min();
            let max = self.max_cell.unwrap();
            if self.cells[min].spans.doc() != self.cells[max].spans.doc() {
                self.queue_to_list();
                queue_stale = true;
            }
            // skip to doc with all clauses
            while self.more && self.head_lags_tail() {
                let head = self.first.unwrap();
                let target = self.cells[self.last.unwrap()].spans.doc();
                self.cell_skip_to(head, target)?;
                self.first_to_last();
                queue_stale = true;
            }
            if !self.more {
                return Ok(false);
            }
            if queue_stale {
                self.list_to_queue();
            }
            if self.at_match() {
                return Ok(true);
            }
            let min = self.min();
            if self.cell_next(min)? {
                self.queue.update_top(&self.cells);
            } else {
                self.more = false;
            }
        }
        Ok(false)
    }

    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        if self.first_time {
            self.init_list(false)?;
            let mut cell = self.first;
            while self.more && cell.is_some() {
                let idx = cell.unwrap();
                self.cell_skip_to(idx, target)?;
                cell = self.cells[idx].next;
            }
            if self.more {
                self.list_to_queue();
            }
            self.first_time = false;
        } else {
            while self.more && self.cells[self.min()].spans.doc() < target {
                let min = self.min();
                if self.cell_skip_to(min, target)? {
                    self.queue.update_top(&self.cells);
                } else {
                    self.more = false;
                }
            }
        }
        Ok(self.more && (self.at_match() || self.next()?))
    }

    fn doc(&self) -> DocId {
        self.cells[self.min()].spans.doc()
    }

    fn start(&self) -> i32 {
        self.cells[self.min()].spans.start()
    }

    fn end(&self) -> i32 {
        self.cells[self.max_cell.unwrap()].spans.end()
    }

    fn payload(&mut self) -> Result<Vec<Payload>> {
        let mut result = Vec::new();
        let mut cell = self.first;
        while let Some(idx) = cell {
            if self.cells[idx].spans.is_payload_available() {
                let payload = self.cells[idx].spans.payload()?;
                result.extend(payload);
            }
            cell = self.cells[idx].next;
        }
        Ok(result)
    }

    fn is_payload_available(&self) -> bool {
        let mut cell = Some(self.min());
        while let Some(idx) = cell {
            if self.cells[idx].spans.is_payload_available() {
                return true;
            }
            cell = self.cells[idx].next;
        }
        false
    }

    fn cost(&self) -> usize {
        self.cost
    }
}
