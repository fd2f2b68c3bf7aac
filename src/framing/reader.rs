use std::io::{ErrorKind, Read};
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use typed_builder::TypedBuilder;

use super::FrameGeometry;
use crate::prelude::*;

/// Layout of a file or stream of wrapped frames.
///
/// Each record is `header_length` bytes of wrapper (usually the 4 byte sync marker),
/// followed by the frame, followed by `footer_length` bytes.
#[derive(TypedBuilder, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FrameSourceConfig {
    #[builder(default = 4)]
    pub header_length: usize,
    #[builder(default = 0)]
    pub footer_length: usize,
    /// Bytes to skip once, before the first record.
    #[builder(default = 0)]
    pub skip_initial_bytes: usize,
    #[builder(default = FrameGeometry::DEFAULT_FRAME_LENGTH)]
    pub frame_length: usize,
    /// Capacity of the channel used by [spawn_frame_reader].
    #[builder(default = 100)]
    pub buffer_size: usize,
}

impl Default for FrameSourceConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl FrameSourceConfig {
    fn record_length(&self) -> usize {
        self.header_length + self.frame_length + self.footer_length
    }
}

struct FrameReaderIter<R> {
    reader: R,
    config: FrameSourceConfig,
    record: Vec<u8>,
    skipped: bool,
    done: bool,
}

impl<R> FrameReaderIter<R>
where
    R: Read,
{
    fn skip_initial(&mut self) -> std::io::Result<()> {
        let n = self.config.skip_initial_bytes as u64;
        let got = std::io::copy(&mut (&mut self.reader).take(n), &mut std::io::sink())?;
        if got < n {
            return Err(ErrorKind::UnexpectedEof.into());
        }
        Ok(())
    }
}

impl<R> Iterator for FrameReaderIter<R>
where
    R: Read,
{
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut zult = Ok(());
        if !self.skipped {
            self.skipped = true;
            zult = self.skip_initial();
        }
        if zult.is_ok() {
            zult = self.reader.read_exact(&mut self.record);
        }
        match zult {
            Ok(()) => {
                let start = self.config.header_length;
                Some(Ok(self.record[start..start + self.config.frame_length].to_vec()))
            }
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                trace!("end of frame stream");
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err.into()))
            }
        }
    }
}

/// Return an iterator of frames read from a stream of wrapped frames, with the wrapper
/// header and footer removed.
///
/// A trailing partial record ends the stream cleanly.
///
/// # Example
/// ```
/// use ccsds_telemetry::framing::{read_frames, FrameSourceConfig};
///
/// let config = FrameSourceConfig::builder().frame_length(10).build();
/// let dat: Vec<u8> = (0..30).collect();
///
/// let frames: Vec<Vec<u8>> = read_frames(&dat[..], config).map(Result::unwrap).collect();
///
/// assert_eq!(frames.len(), 2);
/// assert_eq!(frames[1][0], 18);
/// ```
pub fn read_frames<R>(reader: R, config: FrameSourceConfig) -> impl Iterator<Item = Result<Vec<u8>>>
where
    R: Read,
{
    FrameReaderIter {
        reader,
        record: vec![0u8; config.record_length()],
        config,
        skipped: false,
        done: false,
    }
}

/// Read frames on a background thread, handing them over through a bounded channel of
/// `config.buffer_size` frames.
///
/// The thread exits at the end of the stream, on the first read error (which is passed
/// along), or when the returned iterator is dropped.
///
/// # Errors
/// [Error::Io] if the thread cannot be spawned.
pub fn spawn_frame_reader<R>(
    reader: R,
    config: FrameSourceConfig,
) -> Result<impl Iterator<Item = Result<Vec<u8>>>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = crossbeam::channel::bounded(config.buffer_size);

    thread::Builder::new()
        .name("framing::reader".into())
        .spawn(move || {
            for zult in read_frames(reader, config) {
                if tx.send(zult).is_err() {
                    debug!("frame receiver dropped");
                    break;
                }
            }
            debug!("framing::reader thread exit");
        })?;

    Ok(rx.into_iter())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn records(count: u8, config: &FrameSourceConfig) -> Vec<u8> {
        let mut dat = Vec::new();
        for i in 0..count {
            dat.extend_from_slice(&[0x1a, 0xcf, 0xfc, 0x1d][..config.header_length]);
            dat.extend(std::iter::repeat(i).take(config.frame_length));
            dat.extend(std::iter::repeat(0xee).take(config.footer_length));
        }
        dat
    }

    #[test]
    fn strips_wrapper() {
        let config = FrameSourceConfig::builder()
            .frame_length(16)
            .footer_length(2)
            .build();
        let dat = records(3, &config);

        let frames: Vec<Vec<u8>> = read_frames(&dat[..], config)
            .map(Result::unwrap)
            .collect();

        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame, &vec![i as u8; 16]);
        }
    }

    #[test]
    fn skips_initial_bytes_and_partial_tail() {
        let config = FrameSourceConfig::builder()
            .frame_length(8)
            .header_length(0)
            .skip_initial_bytes(3)
            .build();
        let mut dat = vec![0xff; 3];
        dat.extend(records(2, &config));
        dat.extend_from_slice(&[1, 2, 3]);

        let frames: Vec<Vec<u8>> = read_frames(&dat[..], config)
            .map(Result::unwrap)
            .collect();

        assert_eq!(frames, vec![vec![0u8; 8], vec![1u8; 8]]);
    }

    #[test]
    fn input_shorter_than_skip() {
        let config = FrameSourceConfig::builder().skip_initial_bytes(100).build();
        assert_eq!(read_frames(&[0u8; 10][..], config).count(), 0);
    }

    #[test]
    fn background_reader() {
        let config = FrameSourceConfig::builder()
            .frame_length(32)
            .buffer_size(1)
            .build();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&records(5, &config)).unwrap();
        let reader = std::fs::File::open(file.path()).unwrap();

        let frames: Vec<Vec<u8>> = spawn_frame_reader(reader, config)
            .unwrap()
            .map(Result::unwrap)
            .collect();

        assert_eq!(frames.len(), 5);
        assert_eq!(frames[4], vec![4u8; 32]);
    }
}
