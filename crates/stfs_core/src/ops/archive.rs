//! Writing entries through the pipeline.

use super::source::ContentSource;
use crate::error::CoreResult;
use crate::log::LogWriter;
use crate::pipeline::Pipeline;
use std::io;
use stfs_codec::LogEntry;
use stfs_storage::LogPosition;

/// Appends one entry, with its content if it carries any.
///
/// Content is streamed through the pipeline twice: first into a sink to
/// learn the payload size and signature for the header, then onto the
/// medium. A regular file without a content source is archived empty.
///
/// # Errors
///
/// Returns [`CoreError::SourceChanged`](crate::CoreError::SourceChanged) if
/// the content changed between both passes; the entry is then complete on
/// the medium but its content is unusable. Returns source, pipeline and
/// medium errors.
pub(crate) fn append_entry(
    writer: &mut LogWriter<'_>,
    pipeline: &Pipeline,
    entry: &LogEntry,
    content: Option<&dyn ContentSource>,
) -> CoreResult<LogPosition> {
    let empty: &dyn ContentSource = &EMPTY;
    let content = content.unwrap_or(empty);

    let entry = if entry.has_content() {
        let stats = pipeline.transform(&mut *content.open()?, &mut io::sink())?;
        entry.map_header(|header| pipeline.describe_content(header, &stats))
    } else {
        entry.map_header(|header| {
            let mut header = header.clone();
            header.size = 0;
            header
        })
    };

    let wire = pipeline.suffixes().apply_to(&entry).to_wire();
    let position = writer.append_header(&pipeline.seal_header(&wire)?)?;

    if entry.has_content() {
        let expected = wire.header.size;
        let mut payload = writer.payload(expected);
        let streamed = content
            .open()
            .map_err(Into::into)
            .and_then(|mut source| pipeline.transform(&mut *source, &mut payload));
        // The payload is filled up even if streaming failed, keeping the
        // entries after this one reachable.
        let finished = payload.finish(entry.name());
        streamed?;
        finished?;
    }
    Ok(position)
}

static EMPTY: &[u8] = &[];
