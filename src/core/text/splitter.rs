//! Budget-aware text splitting.
//!
//! The splitter turns a stream of text fragments into chunks whose UTF-8 length
//! never exceeds a byte budget. Each cut is placed at the coarsest boundary that
//! works: sentence boundaries first, then word boundaries, then grapheme
//! clusters, never finer than the granularity the caller asked for. When the text
//! is already XML-escaped, cuts are moved so that no `&...;` reference is split.
//!
//! # Example
//!
//! ```rust
//! use edge_speech::core::text::{Granularity, SmartSplit, SplitOptions};
//!
//! let options = SplitOptions::new(16)
//!     .unwrap()
//!     .with_granularity(Granularity::Word);
//! let chunks: Vec<String> = SmartSplit::new(["Hello there. ", "General Kenobi."], options)
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(chunks, vec!["Hello there. ", "General Kenobi."]);
//! ```

use futures::{Stream, StreamExt};
use thiserror::Error;
use tracing::{debug, trace};

use super::segment::{Granularity, segment};
use super::truncated_entity_start;

/// Largest integer a budget may take (2^53 - 1).
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

// =============================================================================
// Error Types
// =============================================================================

/// Errors produced while splitting text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SplitError {
    /// The budget is zero, negative or too large.
    #[error("Invalid byte budget {0}: must be a positive integer no larger than 2^53 - 1")]
    InvalidBudget(i128),

    /// A single unit at the finest allowed granularity does not fit.
    #[error("Byte budget {budget} is too small for {granularity} granularity")]
    BudgetTooSmall {
        budget: usize,
        granularity: Granularity,
    },

    /// Moving the cut in front of an entity reference would produce an empty chunk.
    #[error(
        "Byte budget {budget} is too small or the text contains invalid XML escaped entities"
    )]
    UnsplittableEntity { budget: usize },

    /// The input ended inside an entity reference.
    #[error("The text contains a truncated XML escaped entity")]
    TruncatedEntity,
}

/// Result type for splitting operations.
pub type SplitResult<T> = Result<T, SplitError>;

// =============================================================================
// Configuration
// =============================================================================

/// Maximum UTF-8 size of one chunk. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteBudget(usize);

impl ByteBudget {
    pub fn new(bytes: usize) -> SplitResult<Self> {
        if bytes == 0 || bytes as u64 > MAX_SAFE_INTEGER {
            return Err(SplitError::InvalidBudget(bytes as i128));
        }
        Ok(Self(bytes))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl TryFrom<i64> for ByteBudget {
    type Error = SplitError;

    fn try_from(value: i64) -> SplitResult<Self> {
        let bytes = usize::try_from(value).map_err(|_| SplitError::InvalidBudget(value as i128))?;
        Self::new(bytes)
    }
}

impl TryFrom<u64> for ByteBudget {
    type Error = SplitError;

    fn try_from(value: u64) -> SplitResult<Self> {
        let bytes = usize::try_from(value).map_err(|_| SplitError::InvalidBudget(value as i128))?;
        Self::new(bytes)
    }
}

/// Splitter configuration. There are no hidden defaults besides the ones set by
/// [`SplitOptions::new`]: grapheme granularity, no locales, unescaped text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOptions {
    pub budget: ByteBudget,
    pub granularity: Granularity,
    pub locales: Vec<String>,
    pub is_escaped: bool,
}

impl SplitOptions {
    /// Creates options for `max_byte_length`, failing with
    /// [`SplitError::InvalidBudget`] when it is zero or too large.
    pub fn new(max_byte_length: usize) -> SplitResult<Self> {
        Ok(Self::with_budget(ByteBudget::new(max_byte_length)?))
    }

    pub fn with_budget(budget: ByteBudget) -> Self {
        Self {
            budget,
            granularity: Granularity::default(),
            locales: Vec::new(),
            is_escaped: false,
        }
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_locales<I, S>(mut self, locales: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locales = locales.into_iter().map(Into::into).collect();
        self
    }

    pub fn escaped(mut self, is_escaped: bool) -> Self {
        self.is_escaped = is_escaped;
        self
    }
}

// =============================================================================
// Splitter
// =============================================================================

/// Incremental splitting state.
///
/// Text is appended with [`push`](Self::push) and drained with
/// [`next_chunk`](Self::next_chunk) until it returns `Ok(None)`, meaning the
/// pending text is shorter than the budget and more input is needed. Once input
/// is exhausted, [`finish`](Self::finish) returns whatever is left.
#[derive(Debug)]
pub struct Splitter {
    options: SplitOptions,
    ladder: Vec<Granularity>,
    buffer: String,
    /// Start of the text not yet emitted.
    start: usize,
}

impl Splitter {
    pub fn new(options: SplitOptions) -> Self {
        let ladder = options.granularity.ladder();
        Self {
            options,
            ladder,
            buffer: String::new(),
            start: 0,
        }
    }

    pub fn options(&self) -> &SplitOptions {
        &self.options
    }

    /// Number of bytes waiting for a split decision.
    pub fn pending_len(&self) -> usize {
        self.buffer.len() - self.start
    }

    /// Appends a fragment of input.
    pub fn push(&mut self, fragment: &str) {
        if self.start > 0 {
            self.buffer.drain(..self.start);
            self.start = 0;
        }
        self.buffer.push_str(fragment);
    }

    /// Emits the next complete chunk, if the pending text reaches the budget.
    pub fn next_chunk(&mut self) -> SplitResult<Option<String>> {
        let budget = self.options.budget.get();
        if self.pending_len() < budget {
            return Ok(None);
        }
        let pending = &self.buffer[self.start..];
        let split_at = self.find_split(pending)?;
        let chunk = pending[..split_at].to_string();
        self.start += split_at;
        trace!(
            chunk_bytes = chunk.len(),
            pending_bytes = self.pending_len(),
            "Emitting chunk"
        );
        Ok(Some(chunk))
    }

    /// Returns the trailing chunk once input is exhausted.
    pub fn finish(&mut self) -> SplitResult<Option<String>> {
        let rest = self.buffer.split_off(self.start);
        self.buffer.clear();
        self.start = 0;
        if rest.is_empty() {
            return Ok(None);
        }
        if self.options.is_escaped && truncated_entity_start(&rest).is_some() {
            return Err(SplitError::TruncatedEntity);
        }
        Ok(Some(rest))
    }

    /// Finds the cut for `pending`, whose length is at least the budget.
    fn find_split(&self, pending: &str) -> SplitResult<usize> {
        let budget = self.options.budget.get();
        let finest = self.options.granularity;

        'granularity: for &granularity in &self.ladder {
            let mut total = 0usize;
            for (offset, piece) in segment(pending, granularity, &self.options.locales) {
                let next = total + piece.len();
                if next == budget {
                    return self.commit(pending, offset + piece.len());
                }
                if next > budget {
                    if total > 0 {
                        return self.commit(pending, offset);
                    }
                    if granularity == finest {
                        return Err(SplitError::BudgetTooSmall {
                            budget,
                            granularity,
                        });
                    }
                    debug!(
                        %granularity,
                        segment_bytes = piece.len(),
                        budget,
                        "Segment exceeds budget, retrying at a finer granularity"
                    );
                    continue 'granularity;
                }
                total = next;
            }
        }

        // Segments cover the whole pending text, which is at least `budget`
        // long, so one of the returns above always fires.
        Err(SplitError::BudgetTooSmall {
            budget,
            granularity: finest,
        })
    }

    /// Applies the entity rule to a candidate cut.
    fn commit(&self, pending: &str, split_at: usize) -> SplitResult<usize> {
        if !self.options.is_escaped {
            return Ok(split_at);
        }
        let split_at = truncated_entity_start(&pending[..split_at]).unwrap_or(split_at);
        if split_at == 0 {
            return Err(SplitError::UnsplittableEntity {
                budget: self.options.budget.get(),
            });
        }
        Ok(split_at)
    }
}

// =============================================================================
// Iterator and Stream adapters
// =============================================================================

/// Lazy splitting over an iterator of fragments.
///
/// The iterator yields `Err` at most once and then ends. It cannot be restarted.
pub struct SmartSplit<I> {
    input: I,
    splitter: Splitter,
    done: bool,
}

impl<I: Iterator> SmartSplit<I> {
    pub fn new<T>(input: T, options: SplitOptions) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        Self {
            input: input.into_iter(),
            splitter: Splitter::new(options),
            done: false,
        }
    }
}

impl<I> Iterator for SmartSplit<I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    type Item = SplitResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.splitter.next_chunk() {
                Ok(Some(chunk)) => return Some(Ok(chunk)),
                Ok(None) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
            match self.input.next() {
                Some(fragment) => self.splitter.push(fragment.as_ref()),
                None => {
                    self.done = true;
                    return self.splitter.finish().transpose();
                }
            }
        }
    }
}

/// Lazy splitting over an async stream of fragments.
///
/// Chunks are produced as soon as enough input has arrived; the stream ends after
/// the first error.
pub fn split_stream<S>(input: S, options: SplitOptions) -> impl Stream<Item = SplitResult<String>>
where
    S: Stream,
    S::Item: AsRef<str>,
{
    async_stream::stream! {
        let mut splitter = Splitter::new(options);
        futures::pin_mut!(input);
        while let Some(fragment) = input.next().await {
            splitter.push(fragment.as_ref());
            loop {
                match splitter.next_chunk() {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }
        if let Some(last) = splitter.finish().transpose() {
            yield last;
        }
    }
}
