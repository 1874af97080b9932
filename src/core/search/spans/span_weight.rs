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
use crate::core::search::searcher::Searcher;
use crate::core::search::similarity::{SimScorer, Similarity};
use crate::core::search::spans::{SpanQuery, SpanQueryEnum, Spans, SpansEnum};
use crate::core::search::{DocIterator, Explanation, Scorer, NO_MORE_DOCS};
use crate::core::util::DocId;
use crate::error::Result;

use std::fmt;
use std::sync::Arc;

/// Scoring coefficients of one span query for one search invocation:
/// the query boost, the idf over the query's terms, and the normalization
/// applied by the enclosing query.
///
/// A weight is built once per search, then taken through
/// `sum_of_squared_weights` and `normalize`; after normalization it is
/// immutable and may be shared read-only across the threads evaluating
/// individual segments.
pub struct SpanWeight {
    query: SpanQueryEnum,
    similarity: Arc<dyn Similarity>,
    idf: f32,
    idf_exp: String,
    boost: f32,
    query_norm: f32,
    query_weight: f32,
    value: f32,
}

impl SpanWeight {
    pub fn new(query: SpanQueryEnum, searcher: &dyn Searcher) -> Result<SpanWeight> {
        let similarity = searcher.similarity();
        let mut terms: Vec<Term> = Vec::new();
        query.extract_terms(&mut terms);
        let (idf, idf_exp) = similarity.idf_explain(&terms, searcher)?;
        let boost = query.boost();
        Ok(SpanWeight {
            query,
            similarity,
            idf,
            idf_exp,
            boost,
            query_norm: 1.0,
            query_weight: 0.0,
            value: 0.0,
        })
    }

    pub fn query(&self) -> &SpanQueryEnum {
        &self.query
    }

    pub fn similarity(&self) -> &Arc<dyn Similarity> {
        &self.similarity
    }

    pub fn idf(&self) -> f32 {
        self.idf
    }

    /// The per-document multiplicative coefficient,
    /// `boost * idf * query_norm * idf` once normalized.
    pub fn get_value(&self) -> f32 {
        self.value
    }

    /// First step of the normalization handshake with the enclosing
    /// query: fixes `query_weight = idf * boost` and returns its square.
    pub fn sum_of_squared_weights(&mut self) -> f32 {
        self.query_weight = self.idf * self.boost;
        self.query_weight * self.query_weight
    }

    /// Applies the cross-clause normalization factor computed by the
    /// enclosing query. The weight must not be mutated afterwards.
    pub fn normalize(&mut self, query_norm: f32) {
        self.query_norm = query_norm;
        self.query_weight *= query_norm;
        self.value = self.query_weight * self.idf;
    }

    /// Builds a fresh matcher over `reader` and binds it with this
    /// weight's value and the segment's norm bytes into a scorer. `None`
    /// when a required term has no postings in the segment.
    pub fn scorer<'a, R: LeafReader>(
        &self,
        reader: &'a R,
    ) -> Result<Option<SpanScorer<'a, R::Postings>>> {
        match self.query.get_spans(reader, false)? {
            Some(spans) => {
                let sim_scorer = self
                    .similarity
                    .sim_scorer(self.value, reader.norms(self.query.field()));
                Ok(Some(SpanScorer::new(spans, sim_scorer)?))
            }
            None => {
                debug!("no postings for '{}' in this segment", self.query);
                Ok(None)
            }
        }
    }

    /// Deterministic score breakdown for `doc`. Builds its own scorer, so
    /// repeated calls are independent; a document without a match yields a
    /// structured non-match instead of an error.
    pub fn explain<R: LeafReader>(&self, reader: &R, doc: DocId) -> Result<Explanation> {
        let phrase_freq = match self.scorer(reader)? {
            Some(mut scorer) => {
                if scorer.advance(doc)? == doc {
                    scorer.freq()
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        if phrase_freq <= 0.0 {
            return Ok(Explanation::new(
                false,
                0.0,
                "no matching term".to_string(),
                vec![],
            ));
        }

        let field = self.query.field();
        let idf_expl = Explanation::new(
            true,
            self.idf,
            format!("idf({}:{})", field, self.idf_exp),
            vec![],
        );

        let tf_value = self.similarity.tf(phrase_freq);
        let tf_expl = Explanation::new(
            true,
            tf_value,
            format!("tf(phraseFreq={})", phrase_freq),
            vec![],
        );
        let field_norm = reader
            .norms(field)
            .map_or(1.0, |norms| self.similarity.decode_norm(norms[doc as usize]));
        let field_norm_expl = Explanation::new(
            true,
            field_norm,
            format!("fieldNorm(field={}, doc={})", field, doc),
            vec![],
        );
        let field_value = tf_value * self.idf * field_norm;
        let field_expl = Explanation::new(
            true,
            field_value,
            format!("fieldWeight({} in {}), product of:", self.query, doc),
            vec![tf_expl, idf_expl.clone(), field_norm_expl],
        );

        // with a neutral boost the query-weight node adds nothing; the
        // field subtree is the whole story and compatibility requires
        // returning exactly it
        if self.boost == 1.0 {
            return Ok(field_expl);
        }

        let mut query_details = vec![Explanation::new(
            true,
            self.boost,
            "boost".to_string(),
            vec![],
        )];
        query_details.push(idf_expl);
        query_details.push(Explanation::new(
            true,
            self.query_norm,
            "queryNorm".to_string(),
            vec![],
        ));
        let query_expl = Explanation::new(
            true,
            self.boost * self.idf * self.query_norm,
            format!("queryWeight({}), product of:", self.query),
            query_details,
        );

        let value = query_expl.value() * field_expl.value();
        Ok(Explanation::new(
            true,
            value,
            format!("weight({} in {}), product of:", self.query, doc),
            vec![query_expl, field_expl],
        ))
    }
}

impl fmt::Display for SpanWeight {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "weight({})", self.query)
    }
}

/// A scorer over a span matcher: accumulates the slop-adjusted frequency
/// of each document's matches and turns it into a score through the bound
/// similarity scorer.
pub struct SpanScorer<'a, T: TermPositions> {
    spans: SpansEnum<T>,
    sim_scorer: Box<dyn SimScorer + 'a>,
    more: bool,
    doc: DocId,
    // accumulated sloppy freq of the current doc
    freq: f32,
}

impl<'a, T: TermPositions> SpanScorer<'a, T> {
    pub fn new(mut spans: SpansEnum<T>, sim_scorer: Box<dyn SimScorer + 'a>) -> Result<Self> {
        let more = spans.next()?;
        let doc = if more { -1 } else { NO_MORE_DOCS };
        Ok(SpanScorer {
            spans,
            sim_scorer,
            more,
            doc,
            freq: 0.0,
        })
    }

    pub fn freq(&self) -> f32 {
        self.freq
    }

    /// Accumulates the slop factors of every match in the current
    /// document, leaving the matcher parked on the first match of the
    /// next document.
    fn set_freq_current_doc(&mut self) -> Result<bool> {
        if !self.more {
            return Ok(false);
        }
        self.doc = self.spans.doc();
        self.freq = 0.0;
        loop {
            let match_length = self.spans.end() - self.spans.start();
            self.freq += self.sim_scorer.compute_slop_factor(match_length);
            self.more = self.spans.next()?;
            if !self.more || self.doc != self.spans.doc() {
                break;
            }
        }
        Ok(true)
    }
}

impl<'a, T: TermPositions> DocIterator for SpanScorer<'a, T> {
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

impl<'a, T: TermPositions> Scorer for SpanScorer<'a, T> {
    fn score(&mut self) -> Result<f32> {
        Ok(self.sim_scorer.score(self.doc, self.freq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::search::spans::{SpanNearQuery, SpanTermQuery};
    use crate::core::search::tests::*;

    fn near_weight(
        index: &MockIndex,
        terms: &[&str],
        slop: i32,
        boost: f32,
        query_norm: f32,
    ) -> SpanWeight {
        let clauses = terms
            .iter()
            .map(|t| SpanQueryEnum::Term(SpanTermQuery::new(index.term(t))))
            .collect();
        let mut query = SpanNearQuery::new(clauses, slop, true).unwrap();
        query.set_boost(boost);
        let mut weight = SpanWeight::new(SpanQueryEnum::Near(query), index).unwrap();
        weight.sum_of_squared_weights();
        weight.normalize(query_norm);
        weight
    }

    #[test]
    fn test_weight_round_trip() {
        let index = mock_index(&["w1 w2", "w2 w1", "w1 x w2"]);
        let clauses = vec![
            SpanQueryEnum::Term(SpanTermQuery::new(index.term("w1"))),
            SpanQueryEnum::Term(SpanTermQuery::new(index.term("w2"))),
        ];
        let mut query = SpanNearQuery::new(clauses, 0, true).unwrap();
        query.set_boost(2.0);
        let mut weight = SpanWeight::new(SpanQueryEnum::Near(query), &index).unwrap();
        let idf = weight.idf();

        let sum = weight.sum_of_squared_weights();
        assert!((sum - (idf * 2.0) * (idf * 2.0)).abs() < 1e-6);

        weight.normalize(0.5);
        assert!((weight.get_value() - 2.0 * idf * 0.5 * idf).abs() < 1e-6);
    }

    #[test]
    fn test_scorer_accumulates_slop_adjusted_freq() {
        // doc 0 holds one exact match and one one-gap match
        let index = mock_index(&["w1 w2 w1 x w2", "w2"]);
        let weight = near_weight(&index, &["w1", "w2"], 1, 1.0, 1.0);
        let mut scorer = weight.scorer(&index).unwrap().unwrap();

        assert_eq!(scorer.next().unwrap(), 0);
        // slop factors over the match widths: 1/(2+1) for [0,2) and
        // 1/(3+1) for [2,5)
        let freq = 1.0f32 / 3.0 + 1.0 / 4.0;
        assert!((scorer.freq() - freq).abs() < 1e-6);

        let expected = freq.sqrt() * weight.get_value();
        assert!((scorer.score().unwrap() - expected).abs() < 1e-6);

        assert_eq!(scorer.next().unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_scorer_advance() {
        let index = mock_index(&["w1 w2", "x", "w1 w2", "w1 w2"]);
        let weight = near_weight(&index, &["w1", "w2"], 0, 1.0, 1.0);
        let mut scorer = weight.scorer(&index).unwrap().unwrap();

        assert_eq!(scorer.advance(2).unwrap(), 2);
        assert_eq!(scorer.doc_id(), 2);
        assert_eq!(scorer.next().unwrap(), 3);
        assert_eq!(scorer.advance(4).unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_missing_term_yields_no_scorer() {
        let index = mock_index(&["w1 w2"]);
        let weight = near_weight(&index, &["w1", "missing"], 0, 1.0, 1.0);
        assert!(weight.scorer(&index).unwrap().is_none());
    }

    fn explanations_equal(a: &Explanation, b: &Explanation) -> bool {
        a.is_match() == b.is_match()
            && (a.value() - b.value()).abs() < 1e-9
            && a.description() == b.description()
            && a.details().len() == b.details().len()
            && a.details()
                .iter()
                .zip(b.details())
                .all(|(x, y)| explanations_equal(x, y))
    }

    #[test]
    fn test_explain_is_idempotent() {
        let index = mock_index(&["w1 w2", "w2 w1", "w1 w2 w2"]);
        let weight = near_weight(&index, &["w1", "w2"], 1, 2.0, 0.5);

        let first = weight.explain(&index, 0).unwrap();
        let second = weight.explain(&index, 0).unwrap();
        assert!(first.is_match());
        assert!(explanations_equal(&first, &second));
    }

    #[test]
    fn test_explain_collapses_for_neutral_boost() {
        let index = mock_index(&["w1 w2"]);
        let weight = near_weight(&index, &["w1", "w2"], 0, 1.0, 1.0);

        let explanation = weight.explain(&index, 0).unwrap();
        assert!(explanation.is_match());
        // exactly the field-weight subtree, no enclosing query-weight node
        assert_eq!(
            explanation.description(),
            "fieldWeight(spanNear([field:w1, field:w2], 0, true) in 0), product of:"
        );
        assert_eq!(explanation.details().len(), 3);
        assert!(explanation.details()[0]
            .description()
            .starts_with("tf(phraseFreq="));
        assert_eq!(
            explanation.details()[2].description(),
            "fieldNorm(field=field, doc=0)"
        );
    }

    #[test]
    fn test_explain_with_boost_keeps_both_subtrees() {
        let index = mock_index(&["w1 w2"]);
        let weight = near_weight(&index, &["w1", "w2"], 0, 2.0, 0.5);

        let explanation = weight.explain(&index, 0).unwrap();
        assert!(explanation.is_match());
        assert_eq!(
            explanation.description(),
            "weight(spanNear([field:w1, field:w2], 0, true)^2 in 0), product of:"
        );
        assert_eq!(explanation.details().len(), 2);
        let query_expl = &explanation.details()[0];
        assert!(query_expl
            .description()
            .starts_with("queryWeight(spanNear("));
        assert_eq!(query_expl.details()[0].description(), "boost");
        assert_eq!(query_expl.details()[2].description(), "queryNorm");
        let product = query_expl.value() * explanation.details()[1].value();
        assert!((explanation.value() - product).abs() < 1e-6);
    }

    #[test]
    fn test_explain_reports_non_match() {
        let index = mock_index(&["w1 w2", "w2 x w1"]);
        let weight = near_weight(&index, &["w1", "w2"], 0, 1.0, 1.0);

        let explanation = weight.explain(&index, 1).unwrap();
        assert!(!explanation.is_match());
        assert_eq!(explanation.value(), 0.0);
        assert_eq!(explanation.description(), "no matching term");
    }

    #[test]
    fn test_explain_value_matches_scorer_score() {
        // a non-neutral boost keeps the query-weight node, so the
        // explained value carries every factor of the scored value
        let index = mock_index(&["w1 w2 x w1 w2"]);
        let weight = near_weight(&index, &["w1", "w2"], 2, 2.0, 0.5);

        let mut scorer = weight.scorer(&index).unwrap().unwrap();
        assert_eq!(scorer.next().unwrap(), 0);
        let score = scorer.score().unwrap();

        let explanation = weight.explain(&index, 0).unwrap();
        assert!((explanation.value() - score).abs() < 1e-6);
    }
}
