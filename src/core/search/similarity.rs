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
use crate::core::search::searcher::Searcher;
use crate::core::util::{DocId, SmallFloat};
use crate::error::Result;

use std::fmt::Write;

lazy_static! {
    static ref NORM_TABLE: [f32; 256] = {
        let mut table = [0f32; 256];
        for (i, norm) in table.iter_mut().enumerate() {
            *norm = SmallFloat::byte315_to_float(i as u8);
        }
        table
    };
}

/// The pluggable scoring model: term-rarity weighting at search setup
/// time, and per-segment factors (term frequency saturation, slop decay,
/// payload scoring, length normalization) at evaluation time.
///
/// Implementations are shared read-only across segment threads.
pub trait Similarity: Send + Sync {
    /// Term-rarity weight of a term occurring in `doc_freq` of `max_doc`
    /// documents.
    fn idf(&self, doc_freq: i32, max_doc: i32) -> f32;

    /// Sums `idf` over `terms` and renders the per-term statistics text
    /// used by `explain`.
    fn idf_explain(&self, terms: &[Term], searcher: &dyn Searcher) -> Result<(f32, String)> {
        let max_doc = searcher.max_doc();
        let mut idf = 0.0f32;
        let mut explain = String::new();
        for term in terms {
            let doc_freq = searcher.doc_freq(term)?;
            idf += self.idf(doc_freq, max_doc);
            write!(explain, " {}={}", term.text()?, doc_freq)?;
        }
        Ok((idf, explain))
    }

    /// Normalization factor making scores of different queries comparable,
    /// given the sum of the squared weights of the query's clauses.
    fn query_norm(&self, sum_of_squared_weights: f32) -> f32;

    /// Term-frequency saturation applied to the accumulated (sloppy)
    /// frequency of a document.
    fn tf(&self, freq: f32) -> f32;

    /// Decodes one norm byte into a length-normalization factor.
    fn decode_norm(&self, norm: u8) -> f32 {
        NORM_TABLE[norm as usize]
    }

    /// Binds the normalized query weight and a segment's norm bytes into a
    /// per-segment scoring function.
    fn sim_scorer<'a>(&self, value: f32, norms: Option<&'a [u8]>) -> Box<dyn SimScorer + 'a>;
}

/// Per-segment scoring function for "sloppy" positional queries.
/// Frequencies are floating-point values: an approximate within-document
/// frequency adjusted for sloppiness by `compute_slop_factor`.
pub trait SimScorer: Send {
    /// Score a single document given its accumulated sloppy frequency.
    fn score(&self, doc: DocId, freq: f32) -> f32;

    /// Computes the amount a match contributes to the sloppy frequency,
    /// based on its positional width.
    fn compute_slop_factor(&self, distance: i32) -> f32;

    /// Calculates a scoring factor from the payload bytes found at a match
    /// position.
    fn compute_payload_factor(&self, doc: DocId, start: i32, end: i32, payload: &[u8]) -> f32;
}

/// The classic vector-space model: logarithmic idf, square-root tf,
/// reciprocal slop decay, byte-encoded length norms and neutral payloads.
#[derive(Default)]
pub struct DefaultSimilarity;

impl DefaultSimilarity {
    /// Encodes a length-normalization factor the way the index writer
    /// does, so tests and in-memory segments can produce norm bytes.
    pub fn encode_norm(norm: f32) -> u8 {
        SmallFloat::float_to_byte315(norm)
    }
}

impl Similarity for DefaultSimilarity {
    fn idf(&self, doc_freq: i32, max_doc: i32) -> f32 {
        ((f64::from(max_doc) / (f64::from(doc_freq) + 1.0)).ln() + 1.0) as f32
    }

    fn query_norm(&self, sum_of_squared_weights: f32) -> f32 {
        1.0 / sum_of_squared_weights.sqrt()
    }

    fn tf(&self, freq: f32) -> f32 {
        freq.sqrt()
    }

    fn sim_scorer<'a>(&self, value: f32, norms: Option<&'a [u8]>) -> Box<dyn SimScorer + 'a> {
        Box::new(DefaultSimScorer { value, norms })
    }
}

struct DefaultSimScorer<'a> {
    value: f32,
    norms: Option<&'a [u8]>,
}

impl<'a> SimScorer for DefaultSimScorer<'a> {
    fn score(&self, doc: DocId, freq: f32) -> f32 {
        let raw = freq.sqrt() * self.value;
        match self.norms {
            Some(norms) => raw * NORM_TABLE[norms[doc as usize] as usize],
            None => raw,
        }
    }

    fn compute_slop_factor(&self, distance: i32) -> f32 {
        1.0 / (distance as f32 + 1.0)
    }

    fn compute_payload_factor(&self, _doc: DocId, _start: i32, _end: i32, _payload: &[u8]) -> f32 {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idf() {
        let sim = DefaultSimilarity::default();
        // ln(100 / (9 + 1)) + 1
        let idf = sim.idf(9, 100);
        assert!((idf - (10f32.ln() + 1.0)).abs() < 1e-6);
        // a term in every document still gets a positive weight
        assert!(sim.idf(100, 100) > 0.0);
    }

    #[test]
    fn test_query_norm() {
        let sim = DefaultSimilarity::default();
        assert!((sim.query_norm(4.0) - 0.5).abs() < 1e-6);
        assert!((sim.query_norm(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_slop_factor_decays() {
        let sim = DefaultSimilarity::default();
        let scorer = sim.sim_scorer(1.0, None);
        assert!((scorer.compute_slop_factor(0) - 1.0).abs() < 1e-6);
        assert!((scorer.compute_slop_factor(1) - 0.5).abs() < 1e-6);
        assert!(scorer.compute_slop_factor(3) < scorer.compute_slop_factor(2));
    }

    #[test]
    fn test_norm_decode_round_trip() {
        let sim = DefaultSimilarity::default();
        assert_eq!(sim.decode_norm(DefaultSimilarity::encode_norm(1.0)), 1.0);
        assert_eq!(sim.decode_norm(0), 0.0);
    }

    #[test]
    fn test_score_applies_value_and_norm() {
        let sim = DefaultSimilarity::default();
        let norms = vec![DefaultSimilarity::encode_norm(1.0); 4];
        let scorer = sim.sim_scorer(2.0, Some(&norms));
        // tf(4) * value * norm = 2 * 2 * 1
        assert!((scorer.score(1, 4.0) - 4.0).abs() < 1e-6);
    }
}
