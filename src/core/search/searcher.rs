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
use crate::core::search::similarity::Similarity;
use crate::error::Result;

use std::sync::Arc;

/// Collection-wide term statistics, supplied by the searcher that drives
/// query evaluation. One searcher instance spans all segments of a search;
/// weights are built against it once and then shared read-only.
pub trait Searcher {
    /// Number of documents containing `term` across the collection.
    fn doc_freq(&self, term: &Term) -> Result<i32>;

    /// Total number of documents in the collection.
    fn max_doc(&self) -> i32;

    /// The similarity model used to weight and score queries.
    fn similarity(&self) -> Arc<dyn Similarity>;
}
