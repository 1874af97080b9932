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
use crate::core::search::payloads::{AveragePayloadFunction, PayloadFunction};
use crate::core::search::searcher::Searcher;
use crate::core::search::similarity::SimScorer;
use crate::core::search::spans::{
    NearSpansOrdered, NearSpansUnordered, SpanQuery, SpanQueryEnum, SpanWeight, Spans, SpansEnum,
};
use crate::core::search::{DocIterator, Explanation, Payload, Scorer, NO_MORE_DOCS};
use crate::core::util::DocId;
use crate::error::{ErrorKind, Result};

use std::fmt;
use std::sync::Arc;

/// A near query whose scoring additionally folds the payloads stored at
/// the matched positions into the document score. Matching is identical
/// to `SpanNearQuery` with the same clauses, slop and order flag; the
/// payloads of each match, including those of arbitrarily deeply nested
/// sub-matches, are combined by the query's `PayloadFunction`.
#[derive(Clone)]
pub struct PayloadNearQuery {
    clauses: Vec<SpanQueryEnum>,
    slop: i32,
    in_order: bool,
    field: String,
    boost: f32,
    function: Arc<dyn PayloadFunction>,
}

impl PayloadNearQuery {
    /// Builds the query with the averaging payload function.
    pub fn new(clauses: Vec<SpanQueryEnum>, slop: i32, in_order: bool) -> Result<Self> {
        Self::with_function(
            clauses,
            slop,
            in_order,
            Arc::new(AveragePayloadFunction::default()),
        )
    }

    pub fn with_function(
        clauses: Vec<SpanQueryEnum>,
        slop: i32,
        in_order: bool,
        function: Arc<dyn PayloadFunction>,
    ) -> Result<Self> {
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
        Ok(PayloadNearQuery {
            clauses,
            slop,
            in_order,
            field,
            boost: 1.0,
            function,
        })
    }

    pub fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    pub fn create_weight(&self, searcher: &dyn Searcher) -> Result<PayloadNearSpanWeight> {
        PayloadNearSpanWeight::new(self, searcher)
    }

    /// Same matcher selection as the plain near query, with payload
    /// collection always enabled.
    pub fn get_spans<R: LeafReader>(
        &self,
        reader: &R,
    ) -> Result<Option<SpansEnum<R::Postings>>> {
        let mut sub_spans = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            match clause.get_spans(reader, true)? {
                Some(spans) => sub_spans.push(spans),
                None => return Ok(None),
            }
        }
        let spans = if self.in_order {
            SpansEnum::NearOrdered(NearSpansOrdered::new(self.slop, sub_spans, true)?)
        } else {
            SpansEnum::NearUnordered(Box::new(NearSpansUnordered::new(self.slop, sub_spans)?))
        };
        Ok(Some(spans))
    }
}

impl SpanQuery for PayloadNearQuery {
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

impl fmt::Display for PayloadNearQuery {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let clauses = self
            .clauses
            .iter()
            .map(|c| format!("{}", c))
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "payloadNear([{}], {}, {})",
            clauses, self.slop, self.in_order
        )?;
        if (self.boost - 1.0).abs() > f32::EPSILON {
            write!(f, "^{}", self.boost)?;
        }
        Ok(())
    }
}

/// The weight of a `PayloadNearQuery`: the ordinary span weight
/// arithmetic, with scorers that harvest payloads.
pub struct PayloadNearSpanWeight {
    weight: SpanWeight,
    function: Arc<dyn PayloadFunction>,
    field: String,
}

impl PayloadNearSpanWeight {
    pub fn new(query: &PayloadNearQuery, searcher: &dyn Searcher) -> Result<Self> {
        let function = Arc::clone(&query.function);
        let field = query.field.clone();
        let weight = SpanWeight::new(SpanQueryEnum::PayloadNear(query.clone()), searcher)?;
        Ok(PayloadNearSpanWeight {
            weight,
            function,
            field,
        })
    }

    pub fn get_value(&self) -> f32 {
        self.weight.get_value()
    }

    pub fn sum_of_squared_weights(&mut self) -> f32 {
        self.weight.sum_of_squared_weights()
    }

    pub fn normalize(&mut self, query_norm: f32) {
        self.weight.normalize(query_norm)
    }

    pub fn scorer<'a, R: LeafReader>(
        &self,
        reader: &'a R,
    ) -> Result<Option<PayloadNearSpanScorer<'a, R::Postings>>> {
        match self.weight.query().get_spans(reader, true)? {
            Some(spans) => {
                let sim_scorer = self
                    .weight
                    .similarity()
                    .sim_scorer(self.weight.get_value(), reader.norms(&self.field));
                Ok(Some(PayloadNearSpanScorer::new(
                    spans,
                    sim_scorer,
                    Arc::clone(&self.function),
                    self.field.clone(),
                )?))
            }
            None => Ok(None),
        }
    }

    /// Product of the span-weight explanation and the payload function's
    /// own breakdown.
    pub fn explain<R: LeafReader>(&self, reader: &R, doc: DocId) -> Result<Explanation> {
        if let Some(mut scorer) = self.scorer(reader)? {
            if scorer.advance(doc)? == doc {
                let span_expl = self.weight.explain(reader, doc)?;
                let payload_expl = self.function.explain(
                    doc,
                    &self.field,
                    scorer.payloads_seen(),
                    scorer.payload_score(),
                );
                let value = span_expl.value() * payload_expl.value();
                return Ok(Explanation::new(
                    true,
                    value,
                    "PayloadNearQuery, product of:".to_string(),
                    vec![span_expl, payload_expl],
                ));
            }
        }
        Ok(Explanation::new(
            false,
            0.0,
            "no matching term".to_string(),
            vec![],
        ))
    }
}

/// Gathers `(payloads, start, end)` of the current match from a matcher
/// and every nested sub-matcher below it, to arbitrary depth. Leaf term
/// cursors contribute through their enclosing matcher's own payload.
fn collect_payloads<T: TermPositions>(
    spans: &mut SpansEnum<T>,
    collected: &mut Vec<(Vec<Payload>, i32, i32)>,
) -> Result<()> {
    match spans {
        SpansEnum::Term(_) => {}
        SpansEnum::NearOrdered(near) => {
            if near.is_payload_available() {
                let start = near.start();
                let end = near.end();
                let payload = near.payload()?;
                collected.push((payload, start, end));
            }
            for sub in near.sub_spans_mut() {
                collect_payloads(sub, collected)?;
            }
        }
        SpansEnum::NearUnordered(near) => {
            if near.is_payload_available() {
                let start = near.start();
                let end = near.end();
                let payload = near.payload()?;
                collected.push((payload, start, end));
            }
            for sub in near.sub_spans_mut() {
                collect_payloads(sub, collected)?;
            }
        }
    }
    Ok(())
}

/// A span scorer that additionally folds every payload discovered on the
/// current document's matches through the query's payload function.
pub struct PayloadNearSpanScorer<'a, T: TermPositions> {
    spans: SpansEnum<T>,
    sim_scorer: Box<dyn SimScorer + 'a>,
    function: Arc<dyn PayloadFunction>,
    field: String,
    more: bool,
    doc: DocId,
    freq: f32,
    payloads_seen: i32,
    payload_score: f32,
}

impl<'a, T: TermPositions> PayloadNearSpanScorer<'a, T> {
    fn new(
        mut spans: SpansEnum<T>,
        sim_scorer: Box<dyn SimScorer + 'a>,
        function: Arc<dyn PayloadFunction>,
        field: String,
    ) -> Result<Self> {
        let more = spans.next()?;
        let doc = if more { -1 } else { NO_MORE_DOCS };
        Ok(PayloadNearSpanScorer {
            spans,
            sim_scorer,
            function,
            field,
            more,
            doc,
            freq: 0.0,
            payloads_seen: 0,
            payload_score: 0.0,
        })
    }

    pub fn freq(&self) -> f32 {
        self.freq
    }

    pub fn payloads_seen(&self) -> i32 {
        self.payloads_seen
    }

    pub fn payload_score(&self) -> f32 {
        self.payload_score
    }

    /// Consumes the current document's matches, accumulating the sloppy
    /// frequency and folding every discovered payload, then leaves the
    /// matcher parked on the first match of the next document.
    fn set_freq_current_doc(&mut self) -> Result<bool> {
        if !self.more {
            return Ok(false);
        }
        self.doc = self.spans.doc();
        self.freq = 0.0;
        self.payloads_seen = 0;
        self.payload_score = 0.0;
        loop {
            let match_length = self.spans.end() - self.spans.start();
            self.freq += self.sim_scorer.compute_slop_factor(match_length);

            let mut collected = Vec::new();
            collect_payloads(&mut self.spans, &mut collected)?;
            for (payloads, start, end) in collected {
                for payload in payloads {
                    let factor = self
                        .sim_scorer
                        .compute_payload_factor(self.doc, start, end, &payload);
                    self.payload_score = self.function.current_score(
                        self.doc,
                        &self.field,
                        start,
                        end,
                        self.payloads_seen,
                        self.payload_score,
                        factor,
                    );
                    self.payloads_seen += 1;
                }
            }

            self.more = self.spans.next()?;
            if !self.more || self.doc != self.spans.doc() {
                break;
            }
        }
        Ok(true)
    }
}

impl<'a, T: TermPositions> DocIterator for PayloadNearSpanScorer<'a, T> {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next(&mut self) -> Result<DocId> {
        if !self.set_freq_current_doc()? {
            self.doc = NO_MORE_DOCS;
        }
        Ok(self.doc)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        if !self.more {
            self.doc = NO_MORE_DOCS;
            return Ok(self.doc);
        }
        if self.spans.doc() < target {
            self.more = self.spans.skip_to(target)?;
        }
        if !self.set_freq_current_doc()? {
            self.doc = NO_MORE_DOCS;
        }
        Ok(self.doc)
    }

    fn cost(&self) -> usize {
        self.spans.cost()
    }
}

impl<'a, T: TermPositions> Scorer for PayloadNearSpanScorer<'a, T> {
    fn score(&mut self) -> Result<f32> {
        let base = self.sim_scorer.score(self.doc, self.freq);
        Ok(base
            * self
                .function
                .doc_score(self.doc, &self.field, self.payloads_seen, self.payload_score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::search::similarity::{DefaultSimilarity, Similarity};
    use crate::core::search::spans::{SpanNearQuery, SpanTermQuery};
    use crate::core::search::tests::*;

    /// Reads the payload factor from the first payload byte, scaled by
    /// ten, so tests can pick exact factors.
    struct ByteFactorSimilarity {
        inner: DefaultSimilarity,
    }

    impl ByteFactorSimilarity {
        fn new() -> Self {
            ByteFactorSimilarity {
                inner: DefaultSimilarity::default(),
            }
        }
    }

    impl Similarity for ByteFactorSimilarity {
        fn idf(&self, doc_freq: i32, max_doc: i32) -> f32 {
            self.inner.idf(doc_freq, max_doc)
        }

        fn query_norm(&self, sum_of_squared_weights: f32) -> f32 {
            self.inner.query_norm(sum_of_squared_weights)
        }

        fn tf(&self, freq: f32) -> f32 {
            self.inner.tf(freq)
        }

        fn sim_scorer<'a>(&self, value: f32, norms: Option<&'a [u8]>) -> Box<dyn SimScorer + 'a> {
            Box::new(ByteFactorSimScorer {
                inner: self.inner.sim_scorer(value, norms),
            })
        }
    }

    struct ByteFactorSimScorer<'a> {
        inner: Box<dyn SimScorer + 'a>,
    }

    impl<'a> SimScorer for ByteFactorSimScorer<'a> {
        fn score(&self, doc: DocId, freq: f32) -> f32 {
            self.inner.score(doc, freq)
        }

        fn compute_slop_factor(&self, distance: i32) -> f32 {
            self.inner.compute_slop_factor(distance)
        }

        fn compute_payload_factor(
            &self,
            _doc: DocId,
            _start: i32,
            _end: i32,
            payload: &[u8],
        ) -> f32 {
            f32::from(payload[0]) / 10.0
        }
    }

    fn term_clause(index: &MockIndex, text: &str) -> SpanQueryEnum {
        SpanQueryEnum::Term(SpanTermQuery::new(index.term(text)))
    }

    fn payload_weight(index: &MockIndex, query: &PayloadNearQuery) -> PayloadNearSpanWeight {
        let mut weight = query.create_weight(index).unwrap();
        weight.sum_of_squared_weights();
        weight.normalize(1.0);
        weight
    }

    #[test]
    fn test_payload_averaging_multiplier() {
        let mut index = MockIndex::new("field");
        index.set_similarity(Arc::new(ByteFactorSimilarity::new()));
        // payload factors 0.5 and 1.0 under the averaging function
        index.add_doc_with_payloads(&[("w1", Some(&[5u8])), ("w2", Some(&[10u8]))]);

        let query = PayloadNearQuery::new(
            vec![term_clause(&index, "w1"), term_clause(&index, "w2")],
            0,
            true,
        )
        .unwrap();
        let weight = payload_weight(&index, &query);
        let mut scorer = weight.scorer(&index).unwrap().unwrap();

        assert_eq!(scorer.next().unwrap(), 0);
        assert_eq!(scorer.payloads_seen(), 2);
        assert!((scorer.payload_score() - 1.5).abs() < 1e-6);

        // base span score times the averaged payload multiplier
        let base = scorer.freq().sqrt() * weight.get_value();
        assert!((scorer.score().unwrap() - base * 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_missing_payloads_leave_score_unchanged() {
        let mut index = MockIndex::new("field");
        index.set_similarity(Arc::new(ByteFactorSimilarity::new()));
        index.add_doc("w1 w2");

        let query = PayloadNearQuery::new(
            vec![term_clause(&index, "w1"), term_clause(&index, "w2")],
            0,
            true,
        )
        .unwrap();
        let weight = payload_weight(&index, &query);
        let mut scorer = weight.scorer(&index).unwrap().unwrap();

        assert_eq!(scorer.next().unwrap(), 0);
        assert_eq!(scorer.payloads_seen(), 0);
        let base = scorer.freq().sqrt() * weight.get_value();
        assert!((scorer.score().unwrap() - base).abs() < 1e-6);
    }

    #[test]
    fn test_unordered_payload_matches() {
        let mut index = MockIndex::new("field");
        index.set_similarity(Arc::new(ByteFactorSimilarity::new()));
        // clauses match in reverse order; payloads are still harvested
        index.add_doc_with_payloads(&[("w2", Some(&[2u8])), ("w1", Some(&[8u8]))]);

        let query = PayloadNearQuery::new(
            vec![term_clause(&index, "w1"), term_clause(&index, "w2")],
            0,
            false,
        )
        .unwrap();
        let weight = payload_weight(&index, &query);
        let mut scorer = weight.scorer(&index).unwrap().unwrap();

        assert_eq!(scorer.next().unwrap(), 0);
        assert_eq!(scorer.payloads_seen(), 2);
        // average of 0.2 and 0.8
        let multiplier = weight.function.doc_score(
            0,
            "field",
            scorer.payloads_seen(),
            scorer.payload_score(),
        );
        assert!((multiplier - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_nested_matchers_are_harvested_recursively() {
        let mut index = MockIndex::new("field");
        index.set_similarity(Arc::new(ByteFactorSimilarity::new()));
        index.add_doc_with_payloads(&[
            ("w1", Some(&[2u8])),
            ("w2", Some(&[4u8])),
            ("w3", Some(&[6u8])),
        ]);

        let inner = SpanNearQuery::new(
            vec![term_clause(&index, "w1"), term_clause(&index, "w2")],
            0,
            true,
        )
        .unwrap();
        let query = PayloadNearQuery::new(
            vec![SpanQueryEnum::Near(inner), term_clause(&index, "w3")],
            0,
            true,
        )
        .unwrap();
        let weight = payload_weight(&index, &query);
        let mut scorer = weight.scorer(&index).unwrap().unwrap();

        assert_eq!(scorer.next().unwrap(), 0);
        // the outer match carries all three payloads, and the nested
        // matcher's own pair is folded again while recursing
        assert_eq!(scorer.payloads_seen(), 5);
        let expected_sum = 0.6 + 0.4 + 0.2 + 0.4 + 0.2;
        assert!((scorer.payload_score() - expected_sum).abs() < 1e-6);
    }

    #[test]
    fn test_explain_is_product_of_span_and_payload_parts() {
        let mut index = MockIndex::new("field");
        index.set_similarity(Arc::new(ByteFactorSimilarity::new()));
        index.add_doc_with_payloads(&[("w1", Some(&[5u8])), ("w2", Some(&[10u8]))]);

        let mut query = PayloadNearQuery::new(
            vec![term_clause(&index, "w1"), term_clause(&index, "w2")],
            0,
            true,
        )
        .unwrap();
        // keep the query-weight node so the explained span value carries
        // every factor of the scored value
        query.set_boost(2.0);
        let weight = payload_weight(&index, &query);

        let explanation = weight.explain(&index, 0).unwrap();
        assert!(explanation.is_match());
        assert_eq!(explanation.description(), "PayloadNearQuery, product of:");
        assert_eq!(explanation.details().len(), 2);
        assert_eq!(
            explanation.details()[1].description(),
            "AveragePayloadFunction.docScore()"
        );
        let product = explanation.details()[0].value() * explanation.details()[1].value();
        assert!((explanation.value() - product).abs() < 1e-6);

        let mut scorer = weight.scorer(&index).unwrap().unwrap();
        assert_eq!(scorer.next().unwrap(), 0);
        assert!((explanation.value() - scorer.score().unwrap()).abs() < 1e-6);
    }

    #[test]
    fn test_explain_reports_non_match() {
        let index = mock_index(&["w1 w2", "w2 w1"]);
        let query = PayloadNearQuery::new(
            vec![term_clause(&index, "w1"), term_clause(&index, "w2")],
            0,
            true,
        )
        .unwrap();
        let weight = payload_weight(&index, &query);

        let explanation = weight.explain(&index, 1).unwrap();
        assert!(!explanation.is_match());
        assert_eq!(explanation.value(), 0.0);
    }
}
