// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Apdex satisfaction bucket of a single transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApdexBucket {
    Satisfying,
    Tolerating,
    Frustrating,
}

impl ApdexBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Satisfying => "S",
            Self::Tolerating => "T",
            Self::Frustrating => "F",
        }
    }
}

impl fmt::Display for ApdexBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier for a threshold `T`: satisfying up to `T`, tolerating up to
/// `4T`, frustrating beyond.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Apdex {
    satisfying_threshold_seconds: f64,
    tolerating_threshold_seconds: f64,
}

impl Apdex {
    #[must_use]
    pub fn new(apdex_t: f64) -> Self {
        Self {
            satisfying_threshold_seconds: apdex_t,
            tolerating_threshold_seconds: 4.0 * apdex_t,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.satisfying_threshold_seconds
    }

    pub fn classify(&self, duration_seconds: f64) -> ApdexBucket {
        if duration_seconds <= self.satisfying_threshold_seconds {
            ApdexBucket::Satisfying
        } else if duration_seconds <= self.tolerating_threshold_seconds {
            ApdexBucket::Tolerating
        } else {
            // Also reached by NaN, which compares false against both thresholds.
            ApdexBucket::Frustrating
        }
    }
}
