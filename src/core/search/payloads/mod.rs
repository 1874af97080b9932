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

mod payload_near_query;

pub use self::payload_near_query::*;

use crate::core::search::Explanation;
use crate::core::util::DocId;

/// Folds the payload factors discovered at match positions into one
/// per-document score multiplier. Implementations carry no per-document
/// state; the running `(payloads seen, aggregate)` pair is threaded
/// through `current_score` by the scorer.
pub trait PayloadFunction: Send + Sync {
    /// Folds one payload occurrence into the running aggregate.
    #[allow(clippy::too_many_arguments)]
    fn current_score(
        &self,
        doc_id: DocId,
        field: &str,
        start: i32,
        end: i32,
        num_payloads_seen: i32,
        current_score: f32,
        current_payload_score: f32,
    ) -> f32;

    /// Final per-document multiplier for the folded aggregate.
    fn doc_score(&self, doc_id: DocId, field: &str, num_payloads_seen: i32, payload_score: f32)
        -> f32;

    fn explain(
        &self,
        doc_id: DocId,
        field: &str,
        num_payloads_seen: i32,
        payload_score: f32,
    ) -> Explanation {
        Explanation::new(
            true,
            self.doc_score(doc_id, field, num_payloads_seen, payload_score),
            "payloadFunction.docScore()".to_string(),
            vec![],
        )
    }
}

/// Averages the payload factors of all occurrences seen on a document.
/// A document whose matches carried no payloads keeps the neutral
/// multiplier 1, so positional matches are never zeroed out by the mere
/// absence of payloads.
#[derive(Default)]
pub struct AveragePayloadFunction;

impl PayloadFunction for AveragePayloadFunction {
    fn current_score(
        &self,
        _doc_id: DocId,
        _field: &str,
        _start: i32,
        _end: i32,
        _num_payloads_seen: i32,
        current_score: f32,
        current_payload_score: f32,
    ) -> f32 {
        current_score + current_payload_score
    }

    fn doc_score(
        &self,
        _doc_id: DocId,
        _field: &str,
        num_payloads_seen: i32,
        payload_score: f32,
    ) -> f32 {
        if num_payloads_seen > 0 {
            payload_score / num_payloads_seen as f32
        } else {
            1.0
        }
    }

    fn explain(
        &self,
        doc_id: DocId,
        field: &str,
        num_payloads_seen: i32,
        payload_score: f32,
    ) -> Explanation {
        Explanation::new(
            true,
            self.doc_score(doc_id, field, num_payloads_seen, payload_score),
            "AveragePayloadFunction.docScore()".to_string(),
            vec![],
        )
    }
}

/// Keeps the smallest payload factor seen on a document.
#[derive(Default)]
pub struct MinPayloadFunction;

impl PayloadFunction for MinPayloadFunction {
    fn current_score(
        &self,
        _doc_id: DocId,
        _field: &str,
        _start: i32,
        _end: i32,
        num_payloads_seen: i32,
        current_score: f32,
        current_payload_score: f32,
    ) -> f32 {
        if num_payloads_seen == 0 {
            current_payload_score
        } else {
            current_payload_score.min(current_score)
        }
    }

    fn doc_score(
        &self,
        _doc_id: DocId,
        _field: &str,
        num_payloads_seen: i32,
        payload_score: f32,
    ) -> f32 {
        if num_payloads_seen > 0 {
            payload_score
        } else {
            1.0
        }
    }

    fn explain(
        &self,
        doc_id: DocId,
        field: &str,
        num_payloads_seen: i32,
        payload_score: f32,
    ) -> Explanation {
        Explanation::new(
            true,
            self.doc_score(doc_id, field, num_payloads_seen, payload_score),
            "MinPayloadFunction.docScore()".to_string(),
            vec![],
        )
    }
}

/// Keeps the largest payload factor seen on a document.
#[derive(Default)]
pub struct MaxPayloadFunction;

impl PayloadFunction for MaxPayloadFunction {
    fn current_score(
        &self,
        _doc_id: DocId,
        _field: &str,
        _start: i32,
        _end: i32,
        num_payloads_seen: i32,
        current_score: f32,
        current_payload_score: f32,
    ) -> f32 {
        if num_payloads_seen == 0 {
            current_payload_score
        } else {
            current_payload_score.max(current_score)
        }
    }

    fn doc_score(
        &self,
        _doc_id: DocId,
        _field: &str,
        num_payloads_seen: i32,
        payload_score: f32,
    ) -> f32 {
        if num_payloads_seen > 0 {
            payload_score
        } else {
            1.0
        }
    }

    fn explain(
        &self,
        doc_id: DocId,
        field: &str,
        num_payloads_seen: i32,
        payload_score: f32,
    ) -> Explanation {
        Explanation::new(
            true,
            self.doc_score(doc_id, field, num_payloads_seen, payload_score),
            "MaxPayloadFunction.docScore()".to_string(),
            vec![],
        )
    }
}
