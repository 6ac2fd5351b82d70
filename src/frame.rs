//! Per-frame clipping (spec §4.10, §9 "Per-frame clipping"). Many resources
//! have a `count` that is 1 or N (the swapchain image count); every
//! command-recording function that touches per-frame data goes through
//! this one helper instead of an open-coded conditional at the call site,
//! per spec §9's explicit design note. Not present in the teacher, which
//! never needed more than a single frame in flight.

/// `iclip = count == 1 ? 0 : min(frame, count - 1)`.
#[inline]
pub fn clip(frame: u32, count: u32) -> u32 {
    if count <= 1 {
        0
    } else {
        frame.min(count - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_one_always_clips_to_zero() {
        for frame in 0..8 {
            assert_eq!(clip(frame, 1), 0);
        }
    }

    #[test]
    fn count_n_passes_through_in_range() {
        for frame in 0..3 {
            assert_eq!(clip(frame, 3), frame);
        }
    }

    #[test]
    fn out_of_range_frame_clamps_to_last() {
        assert_eq!(clip(7, 3), 2);
    }
}
