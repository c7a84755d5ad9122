use std::collections::VecDeque;

/// Default minimum advance between analysis windows, in samples.
pub const DEFAULT_MIN_STEP: usize = 512;

/// Hop size for a window of `window` samples: the minimum step, kept within `1..=window`.
pub fn hop_size(window: usize, min_step: usize) -> usize {
    min_step.clamp(1, window.max(1))
}

/// Sliding-window sample buffer for one channel.
///
/// Samples are appended as they arrive; every time at least `window` samples
/// are buffered, the first `window` are handed out and `hop` samples are
/// discarded from the front.
#[derive(Debug, Clone)]
pub struct SpectrumAccumulator {
    buffer: VecDeque<i32>,
    window: usize,
    hop: usize,
}

impl SpectrumAccumulator {
    pub fn new(window: usize, hop: usize) -> Self {
        let window = window.max(1);
        Self {
            buffer: VecDeque::with_capacity(window * 2),
            window,
            hop: hop.clamp(1, window),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn push(&mut self, samples: &[i32]) {
        self.buffer.extend(samples.iter().copied());
    }

    /// Take the next ready window, if any.
    pub fn next_window(&mut self) -> Option<Vec<i32>> {
        if self.buffer.len() < self.window {
            return None;
        }
        let window: Vec<i32> = self.buffer.iter().take(self.window).copied().collect();
        self.buffer.drain(..self.hop);
        Some(window)
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn expected_windows(total: usize, window: usize, hop: usize) -> usize {
        if total < window {
            0
        } else {
            (total - window) / hop + 1
        }
    }

    #[test]
    fn test_hop_size_is_clamped() {
        assert_eq!(hop_size(8192, 512), 512);
        assert_eq!(hop_size(256, 512), 256);
        assert_eq!(hop_size(1024, 0), 1);
    }

    #[test]
    fn test_single_read_can_yield_multiple_windows() {
        let mut acc = SpectrumAccumulator::new(4, 2);
        acc.push(&[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(acc.next_window(), Some(vec![0, 1, 2, 3]));
        assert_eq!(acc.next_window(), Some(vec![2, 3, 4, 5]));
        assert_eq!(acc.next_window(), Some(vec![4, 5, 6, 7]));
        assert_eq!(acc.next_window(), None);
        assert_eq!(acc.buffered(), 2);
    }

    #[test]
    fn test_waits_for_full_window() {
        let mut acc = SpectrumAccumulator::new(8, 4);
        acc.push(&[1, 2, 3]);
        assert!(acc.next_window().is_none());
        assert_eq!(acc.buffered(), 3);
    }

    proptest! {
        #[test]
        fn prop_window_count_and_alignment(
            window in 1usize..64,
            hop_seed in 1usize..64,
            chunks in proptest::collection::vec(0usize..50, 0..20),
        ) {
            let hop = hop_seed.min(window);
            let mut acc = SpectrumAccumulator::new(window, hop);
            let mut fed = 0usize;
            let mut windows = Vec::new();
            for len in chunks {
                let chunk: Vec<i32> = (fed..fed + len).map(|i| i as i32).collect();
                fed += len;
                acc.push(&chunk);
                while let Some(w) = acc.next_window() {
                    windows.push(w);
                }
            }

            prop_assert_eq!(windows.len(), expected_windows(fed, window, hop));
            for (k, w) in windows.iter().enumerate() {
                prop_assert_eq!(w.len(), window);
                prop_assert_eq!(w[0] as usize, k * hop);
            }
        }

        #[test]
        fn prop_chunking_does_not_change_windows(
            samples in proptest::collection::vec(any::<i32>(), 0..200),
            split in 0usize..200,
        ) {
            let collect = |parts: &[&[i32]]| {
                let mut acc = SpectrumAccumulator::new(16, 5);
                let mut out = Vec::new();
                for part in parts {
                    acc.push(part);
                    while let Some(w) = acc.next_window() {
                        out.push(w);
                    }
                }
                out
            };
            let split = split.min(samples.len());
            let (a, b) = samples.split_at(split);
            prop_assert_eq!(collect(&[samples.as_slice()]), collect(&[a, b]));
        }
    }
}
