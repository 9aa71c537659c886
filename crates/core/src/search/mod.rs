//! Binary search over an ordered sequence driven by an async comparator.
//!
//! Each probe is awaited before the next midpoint is chosen, so at most one
//! comparison is in flight at any time. The comparator answers with a
//! [`Probe`] instead of a boolean: it can point the search left or right,
//! report an exact match, or declare the probed item unusable, which stops
//! the search with [`SearchOutcome::Inconclusive`].

use std::future::Future;

use thiserror::Error;

/// Errors raised before the search starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    /// The supplied upper bound does not index into the sequence.
    #[error("invalid search bounds: high index {high} is out of range for {len} items")]
    HighOutOfRange { high: usize, len: usize },

    /// An index does not fit the signed two's-complement encoding.
    #[error("index {index} cannot be encoded as a signed search result")]
    IndexOverflow { index: String },
}

/// Answer of a single comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// The wanted position sorts before the probed item.
    Before,
    /// The wanted position sorts after the probed item.
    After,
    /// The probed item is the one being looked for.
    Match,
    /// The probed item cannot be evaluated; stop searching.
    Unusable,
}

impl Probe {
    /// Map a signed comparison value: positive searches right, negative
    /// searches left, zero matches and NaN is unusable.
    pub fn from_sign(value: f64) -> Self {
        if value.is_nan() {
            Self::Unusable
        } else if value > 0.0 {
            Self::After
        } else if value < 0.0 {
            Self::Before
        } else {
            Self::Match
        }
    }
}

/// Result of a completed search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The comparator matched the item at this index.
    Found(usize),
    /// No item matched; this is where the wanted item would be inserted.
    Missing { insert_at: usize },
    /// The comparator declared a probed item unusable.
    Inconclusive,
}

impl SearchOutcome {
    /// Two's-complement encoding: `i` for a match, `-(i) - 1` for an
    /// insertion point, `None` when the search was inconclusive.
    pub fn to_signed(self) -> Result<Option<i64>, SearchError> {
        let overflow = |index: usize| SearchError::IndexOverflow {
            index: index.to_string(),
        };
        match self {
            Self::Found(index) => i64::try_from(index)
                .map(Some)
                .map_err(|_| overflow(index)),
            Self::Missing { insert_at } => i64::try_from(insert_at)
                .map(|i| Some(-i - 1))
                .map_err(|_| overflow(insert_at)),
            Self::Inconclusive => Ok(None),
        }
    }

    /// Decode the two's-complement convention produced by [`to_signed`](Self::to_signed).
    pub fn from_signed(value: i64) -> Result<Self, SearchError> {
        let overflow = || SearchError::IndexOverflow {
            index: value.to_string(),
        };
        if value >= 0 {
            usize::try_from(value)
                .map(Self::Found)
                .map_err(|_| overflow())
        } else {
            // -(value + 1) cannot overflow for any negative i64.
            usize::try_from(-(value + 1))
                .map(|insert_at| Self::Missing { insert_at })
                .map_err(|_| overflow())
        }
    }
}

/// Inclusive index bounds for a search.
///
/// `high: None` means the last index of the sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchRange {
    pub low: usize,
    pub high: Option<usize>,
}

impl SearchRange {
    /// Search the whole sequence.
    pub fn full() -> Self {
        Self::default()
    }

    /// Search `[low, high]`, both inclusive.
    pub fn new(low: usize, high: usize) -> Self {
        Self {
            low,
            high: Some(high),
        }
    }
}

/// Binary search `items` within `range` using an async comparator.
///
/// `on_range(low, high)` fires at the top of every iteration, before the
/// comparator is invoked for that iteration's midpoint. When the range is
/// empty from the start (for example an empty slice, or `low > high`) the
/// comparator is never called and the result is `Missing { insert_at: low }`.
///
/// Comparator errors abort the search and are returned as-is.
pub async fn binary_search_async<'a, T, F, Fut, P, E>(
    items: &'a [T],
    range: SearchRange,
    mut compare: F,
    mut on_range: P,
) -> Result<SearchOutcome, E>
where
    F: FnMut(&'a T) -> Fut,
    Fut: Future<Output = Result<Probe, E>>,
    P: FnMut(usize, usize),
    E: From<SearchError>,
{
    let mut low = range.low;
    // `None` when the slice is empty.
    let Some(high) = range.high.or_else(|| items.len().checked_sub(1)) else {
        return Ok(SearchOutcome::Missing { insert_at: low });
    };
    if low > high {
        return Ok(SearchOutcome::Missing { insert_at: low });
    }
    if high >= items.len() {
        return Err(SearchError::HighOutOfRange {
            high,
            len: items.len(),
        }
        .into());
    }

    // Exclusive upper bound; `high < len` so this cannot overflow.
    let mut end = high + 1;
    while low < end {
        on_range(low, end - 1);

        let mid = low + (end - 1 - low) / 2;
        match compare(&items[mid]).await? {
            Probe::After => low = mid + 1,
            Probe::Before => end = mid,
            Probe::Match => return Ok(SearchOutcome::Found(mid)),
            Probe::Unusable => return Ok(SearchOutcome::Inconclusive),
        }
    }

    Ok(SearchOutcome::Missing { insert_at: low })
}
