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

use std::fmt;

/// Describes the score computation for a document: a value, a description
/// of how it was computed, and the sub-explanations it was computed from.
#[derive(Clone, Serialize, Deserialize)]
pub struct Explanation {
    is_match: bool,
    value: f32,
    description: String,
    details: Vec<Explanation>,
}

impl Explanation {
    /// A non-match is always reported with value 0, whatever value the
    /// caller supplied.
    pub fn new(
        is_match: bool,
        value: f32,
        description: String,
        details: Vec<Explanation>,
    ) -> Explanation {
        Explanation {
            is_match,
            value: if is_match { value } else { 0.0f32 },
            description,
            details,
        }
    }

    pub fn is_match(&self) -> bool {
        self.is_match
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn details(&self) -> &[Explanation] {
        &self.details
    }

    pub fn summary(&self) -> String {
        format!("{} = {}", self.value, self.description)
    }

    fn fmt_depth(&self, f: &mut fmt::Formatter, depth: usize) -> fmt::Result {
        for _ in 0..depth {
            f.write_str("  ")?;
        }
        writeln!(f, "{}", self.summary())?;
        for detail in &self.details {
            detail.fmt_depth(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.fmt_depth(f, 0)
    }
}
