//! Acquisition sample buffer: fixed-length raw samples plus a trigger bitmap.
//! Bit `i` of word `w` marks a trigger at sample `w * 64 + i`.

/// One raw ADC sample.
pub type Sample = i8;

/// Bits per trigger bitmap word.
pub const TRIGGER_WORD_BITS: usize = 64;

/// Number of bitmap words needed to cover `len` samples.
#[inline]
pub fn trigger_words_for(len: usize) -> usize {
    len.div_ceil(TRIGGER_WORD_BITS)
}

/// Fixed-capacity sample buffer. Pre-allocated by the pool, never grows.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Box<[Sample]>,
    trigger: Box<[u64]>,
}

impl SampleBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            samples: vec![0; len].into_boxed_slice(),
            trigger: vec![0u64; trigger_words_for(len)].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    #[inline]
    pub fn samples_mut(&mut self) -> &mut [Sample] {
        &mut self.samples
    }

    #[inline]
    pub fn trigger_words(&self) -> &[u64] {
        &self.trigger
    }

    /// Mark a trigger at `index`. Out-of-range indices are ignored.
    pub fn mark_trigger(&mut self, index: usize) {
        if index < self.samples.len() {
            self.trigger[index / TRIGGER_WORD_BITS] |= 1u64 << (index % TRIGGER_WORD_BITS);
        }
    }

    pub fn clear_triggers(&mut self) {
        self.trigger.fill(0);
    }
}
