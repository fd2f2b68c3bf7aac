use tracing::{debug, trace};

use super::VcduHeader;
use crate::prelude::*;

/// Corrects pairs of frames that were recorded in swapped order.
///
/// Two frames are held at a time and the one with the lower frame counter goes out
/// first. A counter of 0 is taken to be a wrap, so the other frame goes first. Both held
/// frames are released, first slot first, when the input ends.
///
/// Frames must be at least a VCDU header long; a shorter frame ends the input.
pub struct SwapFixer<I, T> {
    frames: I,
    slots: [Option<(u32, T)>; 2],
    exhausted: bool,
    failed: bool,
}

impl<I, T> SwapFixer<I, T>
where
    I: Iterator<Item = T>,
    T: AsRef<[u8]>,
{
    pub fn new(frames: I) -> Self {
        Self {
            frames,
            slots: [None, None],
            exhausted: false,
            failed: false,
        }
    }

    /// Read the next frame into a free slot. Returns false at the end of input.
    fn fill(&mut self) -> Result<bool> {
        let Some(slot) = self.slots.iter_mut().find(|s| s.is_none()) else {
            return Err(Error::NoFreeFrameBuffers);
        };
        let Some(frame) = self.frames.next() else {
            return Ok(false);
        };
        let Some(header) = VcduHeader::decode(frame.as_ref()) else {
            debug!(len = frame.as_ref().len(), "frame too short for a header, ending input");
            return Ok(false);
        };
        *slot = Some((header.counter, frame));
        Ok(true)
    }

    /// Index of the slot to release when both are full.
    fn choose(fc1: u32, fc2: u32) -> usize {
        if fc1 == 0 {
            1
        } else if fc2 == 0 || fc1 < fc2 {
            0
        } else {
            1
        }
    }
}

impl<I, T> Iterator for SwapFixer<I, T>
where
    I: Iterator<Item = T>,
    T: AsRef<[u8]>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if !self.exhausted {
                match self.fill() {
                    Ok(true) => {}
                    Ok(false) => self.exhausted = true,
                    Err(err) => {
                        self.failed = true;
                        return Some(Err(err));
                    }
                }
            }

            if self.exhausted {
                return self.slots[0]
                    .take()
                    .or_else(|| self.slots[1].take())
                    .map(|(_, frame)| Ok(frame));
            }

            if let [Some((fc1, _)), Some((fc2, _))] = &self.slots {
                let idx = Self::choose(*fc1, *fc2);
                if idx == 1 && *fc1 != 0 {
                    trace!(fc1, fc2, "swapped frames");
                }
                return self.slots[idx].take().map(|(_, frame)| Ok(frame));
            }
        }
    }
}

/// Reorder pairwise swapped frames. See [SwapFixer].
///
/// # Example
/// ```
/// use ccsds_telemetry::framing::fix_swapped_frames;
///
/// let frame = |counter: u8| vec![0x40, 0x01, 0x00, 0x00, counter, 0x00, 0x00, 0x00];
/// let frames = vec![frame(1), frame(3), frame(2), frame(4)];
///
/// let counters: Vec<u8> = fix_swapped_frames(frames)
///     .map(|f| f.unwrap()[4])
///     .collect();
///
/// assert_eq!(counters, vec![1, 2, 3, 4]);
/// ```
pub fn fix_swapped_frames<I, T>(frames: I) -> SwapFixer<I::IntoIter, T>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    SwapFixer::new(frames.into_iter())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::framing::frame_counter;

    fn frame(counter: u32) -> Vec<u8> {
        let mut dat = vec![0x40, 0x01, 0, 0, 0, 0, 0, 0];
        dat[2..5].copy_from_slice(&counter.to_be_bytes()[1..]);
        dat
    }

    fn counters(input: &[u32]) -> Vec<u32> {
        fix_swapped_frames(input.iter().map(|c| frame(*c)))
            .map(|f| frame_counter(&f.unwrap()))
            .collect()
    }

    #[test_case(&[1, 2, 3, 4], &[1, 2, 3, 4]; "in order")]
    #[test_case(&[2, 1, 3, 4], &[1, 2, 3, 4]; "first pair swapped")]
    #[test_case(&[1, 3, 2, 4], &[1, 2, 3, 4]; "middle pair swapped")]
    #[test_case(&[0, 0xffffff], &[0xffffff, 0]; "swapped across wrap")]
    #[test_case(&[0xffffff, 0], &[0xffffff, 0]; "in order across wrap")]
    #[test_case(&[7], &[7]; "single frame")]
    #[test_case(&[], &[]; "empty")]
    fn reorders(input: &[u32], expected: &[u32]) {
        assert_eq!(counters(input), expected);
    }

    #[test]
    fn short_frame_ends_input() {
        let frames = vec![frame(1), vec![0u8; 3], frame(2)];
        let got: Vec<Vec<u8>> = fix_swapped_frames(frames).map(Result::unwrap).collect();
        assert_eq!(got, vec![frame(1)]);
    }

    #[test]
    fn no_free_slots() {
        let mut fixer = fix_swapped_frames(vec![frame(1)]);
        fixer.slots = [Some((5, frame(5))), Some((6, frame(6)))];
        fixer.exhausted = false;

        assert!(matches!(fixer.fill(), Err(Error::NoFreeFrameBuffers)));
    }
}
