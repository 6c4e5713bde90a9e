use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt::Display;

/// Wire value used for an undefined similarity.
pub const UNDEFINED_SENTINEL: f64 = -1.0;

/// Outcome of correlating two answer vectors. `Undefined` means at least one
/// side has no variance, so no correlation can be computed; it is not the
/// same thing as zero correlation.
#[derive(Copy, Clone, Debug)]
pub enum Similarity {
    Undefined,
    Value(f64),
}

impl Similarity {
    pub fn value(&self) -> Option<f64> {
        match self {
            Similarity::Undefined => None,
            Similarity::Value(v) => Some(*v),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Similarity::Undefined)
    }

    fn as_sentinel(&self) -> f64 {
        self.value().unwrap_or(UNDEFINED_SENTINEL)
    }
}

impl PartialOrd for Similarity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Similarity {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Similarity::Undefined, Similarity::Undefined) => Ordering::Equal,
            (Similarity::Undefined, Similarity::Value(_)) => Ordering::Less,
            (Similarity::Value(_), Similarity::Undefined) => Ordering::Greater,
            (Similarity::Value(a), Similarity::Value(b)) => a.total_cmp(b),
        }
    }
}

impl PartialEq for Similarity {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Similarity {}

impl Serialize for Similarity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_sentinel())
    }
}

impl Display for Similarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Similarity::Undefined => write!(f, "undefined"),
            Similarity::Value(v) => write!(f, "{:.4}", v),
        }
    }
}

/// Magnitude of the Pearson correlation between the paired observations.
///
/// Pairs must be co-indexed: `pairs[i]` holds both respondents' answers to the
/// same question. A single pair, an empty input, or a constant side all have
/// zero variance and give `Similarity::Undefined`.
pub fn pearson_similarity(pairs: &[(f64, f64)]) -> Similarity {
    let Some(&(x0, y0)) = pairs.first() else {
        return Similarity::Undefined;
    };
    // the mean of repeated non-representable floats is off by an ulp, so a
    // constant side has to be caught before the deviations are summed
    if pairs.iter().all(|(x, _)| *x == x0) || pairs.iter().all(|(_, y)| *y == y0) {
        return Similarity::Undefined;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut numerator = 0.0_f64;
    let mut var_x = 0.0_f64;
    let mut var_y = 0.0_f64;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        numerator = dx.mul_add(dy, numerator);
        var_x = dx.mul_add(dx, var_x);
        var_y = dy.mul_add(dy, var_y);
    }

    let denominator = (var_x * var_y).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return Similarity::Undefined;
    }

    // rounding can push |r| a hair past 1
    Similarity::Value((numerator / denominator).abs().min(1.0))
}
