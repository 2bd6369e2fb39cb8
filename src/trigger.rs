//! Trigger locator: bit-level scan of a buffer's trigger bitmap.
//! Multiple marks in one word resolve to the lowest-order bit (earliest sample).

use crate::buffer::TRIGGER_WORD_BITS;

/// Outcome of a trigger scan. `NotFound` is distinct from a trigger at offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSearch {
    Found(usize),
    NotFound,
}

impl TriggerSearch {
    pub fn offset(self) -> Option<usize> {
        match self {
            TriggerSearch::Found(offset) => Some(offset),
            TriggerSearch::NotFound => None,
        }
    }
}

/// Find the first trigger in `bitmap` starting at word `*word_cursor`.
///
/// `limit` is the buffer length in samples; marks at or beyond it are ignored.
/// On success the cursor is left on the word holding the trigger, otherwise
/// it is moved past the end of the bitmap.
#[inline]
pub fn locate_trigger(bitmap: &[u64], limit: usize, word_cursor: &mut usize) -> TriggerSearch {
    locate_trigger_from(bitmap, limit, word_cursor, *word_cursor * TRIGGER_WORD_BITS)
}

/// Like [`locate_trigger`], but ignores marks before sample `from_sample`.
pub fn locate_trigger_from(
    bitmap: &[u64],
    limit: usize,
    word_cursor: &mut usize,
    from_sample: usize,
) -> TriggerSearch {
    let start_word = (*word_cursor).max(from_sample / TRIGGER_WORD_BITS);

    for word_index in start_word..bitmap.len() {
        let mut word = bitmap[word_index];
        if word_index == from_sample / TRIGGER_WORD_BITS {
            word &= u64::MAX << (from_sample % TRIGGER_WORD_BITS);
        }
        if word == 0 {
            continue;
        }
        let offset = word_index * TRIGGER_WORD_BITS + word.trailing_zeros() as usize;
        if offset >= limit {
            break;
        }
        *word_cursor = word_index;
        return TriggerSearch::Found(offset);
    }

    *word_cursor = bitmap.len();
    TriggerSearch::NotFound
}
