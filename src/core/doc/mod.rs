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

use crate::error::Result;

use std::cmp::Ordering;
use std::fmt;

/// A Term represents a word from text, the unit of search. It is composed
/// of the text of the word and the name of the field the text occurred in.
///
/// Terms may also represent things other than words from text fields, such
/// as dates, email addresses or urls.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Term {
    pub field: String,
    pub bytes: Vec<u8>,
}

impl Term {
    pub fn new(field: String, bytes: Vec<u8>) -> Term {
        Term { field, bytes }
    }

    /// Returns the field of this term. The field indicates the part of a
    /// document which this term came from.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Returns the text of this term, assuming it holds utf-8 bytes.
    pub fn text(&self) -> Result<String> {
        Ok(String::from_utf8(self.bytes.clone())?)
    }
}

impl PartialOrd for Term {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Term {
    fn cmp(&self, other: &Self) -> Ordering {
        self.field
            .cmp(&other.field)
            .then_with(|| self.bytes.cmp(&other.bytes))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.field,
            String::from_utf8_lossy(&self.bytes)
        )
    }
}
