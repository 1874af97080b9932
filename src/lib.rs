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

//! Positional span-query matching and scoring.
//!
//! This crate evaluates proximity-constrained queries ("these terms must
//! co-occur, in order or not, within N positions of each other") directly
//! over per-term position streams, and layers payload-aware relevance
//! scoring on top. Postings, term statistics, norms and the similarity
//! model are supplied by the caller through the traits in
//! `core::index` and `core::search`.

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod core;
pub mod error;
