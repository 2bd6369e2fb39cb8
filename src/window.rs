//! Persistence window accumulator.
//!
//! The window is one contiguous allocation shaped as `persistence_size` rows of
//! `window_size` samples. Incoming buffers are copied row by row; a row may span
//! several buffers. Once the last row is filled the window is complete and
//! refuses writes until it is reset.

use crate::buffer::Sample;
use crate::error::AllocationError;

/// Per-buffer read position. Reset for every buffer popped from the queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BufferCursor {
    /// Next sample to read from the buffer.
    pub col: usize,
    /// Trigger bitmap word the locator resumes from.
    pub trigger_word: usize,
}

/// Result of a single accumulate call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyOutcome {
    pub copied: usize,
    pub row_completed: bool,
    /// True only on the call that filled the last row.
    pub window_completed: bool,
}

pub struct WindowAccumulator {
    window: Box<[Sample]>,
    window_size: usize,
    persistence_size: usize,
    row: usize,
    col: usize,
}

impl WindowAccumulator {
    pub fn new(window_size: usize, persistence_size: usize) -> Result<Self, AllocationError> {
        Ok(Self {
            window: allocate_window(window_size, persistence_size)?,
            window_size,
            persistence_size,
            row: 0,
            col: 0,
        })
    }

    /// Replace the window with a zeroed one of the new shape and rewind the cursors.
    /// On failure the current window and cursors are untouched.
    pub fn reset(
        &mut self,
        window_size: usize,
        persistence_size: usize,
    ) -> Result<(), AllocationError> {
        let fresh = allocate_window(window_size, persistence_size)?;
        self.window = fresh;
        self.window_size = window_size;
        self.persistence_size = persistence_size;
        self.row = 0;
        self.col = 0;
        Ok(())
    }

    /// Zero the window in place and rewind, keeping the current shape.
    pub fn clear(&mut self) {
        self.window.fill(0);
        self.row = 0;
        self.col = 0;
    }

    /// Copy from `samples[cursor.col..]` into the current row.
    ///
    /// The copy is bounded by both the row's remaining space and the buffer's
    /// remaining samples, whichever is smaller.
    pub fn accumulate(&mut self, samples: &[Sample], cursor: &mut BufferCursor) -> CopyOutcome {
        if self.is_complete() || cursor.col >= samples.len() {
            return CopyOutcome::default();
        }

        let count = (self.window_size - self.col).min(samples.len() - cursor.col);
        let dst = self.row * self.window_size + self.col;
        self.window[dst..dst + count].copy_from_slice(&samples[cursor.col..cursor.col + count]);

        cursor.col += count;
        self.col += count;

        let mut outcome = CopyOutcome {
            copied: count,
            ..CopyOutcome::default()
        };
        if self.col == self.window_size {
            self.col = 0;
            self.row += 1;
            outcome.row_completed = true;
            outcome.window_completed = self.is_complete();
        }
        outcome
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.row == self.persistence_size
    }

    /// Current row being filled (equals `persistence_size` when complete).
    pub fn row(&self) -> usize {
        self.row
    }

    /// Next column to be written in the current row.
    pub fn col(&self) -> usize {
        self.col
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn persistence_size(&self) -> usize {
        self.persistence_size
    }

    pub fn window(&self) -> &[Sample] {
        &self.window
    }

    /// One row of the window.
    pub fn row_samples(&self, row: usize) -> Option<&[Sample]> {
        if row >= self.persistence_size {
            return None;
        }
        let start = row * self.window_size;
        Some(&self.window[start..start + self.window_size])
    }

    /// Samples copied into the window since the last reset.
    pub fn filled(&self) -> usize {
        self.row * self.window_size + self.col
    }
}

fn allocate_window(
    window_size: usize,
    persistence_size: usize,
) -> Result<Box<[Sample]>, AllocationError> {
    if window_size == 0 || persistence_size == 0 {
        return Err(AllocationError::Empty {
            window_size,
            persistence_size,
        });
    }
    let samples = window_size
        .checked_mul(persistence_size)
        .ok_or(AllocationError::Overflow {
            window_size,
            persistence_size,
        })?;

    let mut window: Vec<Sample> = Vec::new();
    window
        .try_reserve_exact(samples)
        .map_err(|_| AllocationError::OutOfMemory { samples })?;
    window.resize(samples, 0);
    Ok(window.into_boxed_slice())
}
