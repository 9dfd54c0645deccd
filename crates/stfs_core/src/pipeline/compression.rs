//! zstd compression stage.

use super::{Compressor, FinishWrite, StageReader, StageWriter};
use crate::config::CompressionLevel;
use crate::error::{CoreError, CoreResult};
use std::io::{self, BufReader, Read, Write};

/// Compresses content with zstd.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    /// Creates a compressor for the given level.
    #[must_use]
    pub const fn new(level: CompressionLevel) -> Self {
        Self {
            level: level.zstd_level(),
        }
    }

    /// Returns the zstd level.
    #[must_use]
    pub const fn level(&self) -> i32 {
        self.level
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new(CompressionLevel::default())
    }
}

impl Compressor for ZstdCompressor {
    fn suffix(&self) -> &str {
        ".zst"
    }

    fn compress<'a>(&self, sink: StageWriter<'a>) -> CoreResult<StageWriter<'a>> {
        let encoder = zstd::Encoder::new(sink, self.level)
            .map_err(|e| CoreError::compression(format!("zstd encoder: {e}")))?;
        Ok(Box::new(ZstdWriter { encoder }))
    }

    fn decompress<'a>(&self, source: StageReader<'a>) -> CoreResult<StageReader<'a>> {
        let decoder = zstd::Decoder::new(source)
            .map_err(|e| CoreError::compression(format!("zstd decoder: {e}")))?;
        Ok(Box::new(ZstdReader { decoder }))
    }
}

struct ZstdWriter<'a> {
    encoder: zstd::Encoder<'static, StageWriter<'a>>,
}

impl Write for ZstdWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

impl FinishWrite for ZstdWriter<'_> {
    fn finish(self: Box<Self>) -> CoreResult<()> {
        let inner = self.encoder.finish().map_err(CoreError::from_io)?;
        inner.finish()
    }
}

struct ZstdReader<'a> {
    decoder: zstd::Decoder<'static, BufReader<StageReader<'a>>>,
}

impl Read for ZstdReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decoder.read(buf).map_err(|err| {
            // Errors of inner stages pass through; zstd's own become
            // compression errors.
            if err.get_ref().is_some_and(|inner| inner.is::<CoreError>()) {
                err
            } else {
                CoreError::compression(format!("zstd: {err}")).into_io()
            }
        })
    }
}
