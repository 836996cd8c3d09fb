//! Embedding detections into image metadata.
//!
//! After routing, both the original and the annotated image carry the
//! detection list as pretty-printed JSON in their comment field, where
//! external tools can read it back:
//!
//! | Format | Container                                         |
//! |--------|---------------------------------------------------|
//! | JPEG   | one `COM` segment, after the `APPn` segments      |
//! | PNG    | one `tEXt` chunk with keyword `Comment`, before `IEND` |
//!
//! Existing comments are replaced, so writing twice leaves one comment.

use bytes::Bytes;
use camino::Utf8Path;
use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::png::{Png, PngChunk};

use ag_core::Detection;

use crate::error::MetadataError;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8];
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

const MARKER_COM: u8 = 0xFE;
const MARKER_APP0: u8 = 0xE0;
const MARKER_APP15: u8 = 0xEF;

/// Largest payload a single JPEG segment can hold.
const MAX_SEGMENT_PAYLOAD: usize = u16::MAX as usize - 2;

const CHUNK_TEXT: [u8; 4] = *b"tEXt";
const CHUNK_END: [u8; 4] = *b"IEND";
const COMMENT_KEYWORD: &[u8] = b"Comment\0";

/// Writes a text payload into an image's metadata.
pub trait MetadataWriter: Send + Sync {
    /// Replaces the comment stored in the image at `path` with `payload`.
    fn write_comment(&self, path: &Utf8Path, payload: &str) -> Result<(), MetadataError>;
}

/// Serializes detections the way they are persisted.
///
/// # Errors
///
/// Returns [`MetadataError::Serialize`] if serialization fails.
pub fn detections_payload(detections: &[Detection]) -> Result<String, MetadataError> {
    Ok(serde_json::to_string_pretty(detections)?)
}

/// [`MetadataWriter`] for JPEG and PNG comment fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCommentWriter;

impl MetadataWriter for ImageCommentWriter {
    fn write_comment(&self, path: &Utf8Path, payload: &str) -> Result<(), MetadataError> {
        let raw = std::fs::read(path).map_err(|source| MetadataError::io(path, source))?;

        let encoded = match ImageKind::sniff(&raw) {
            Some(ImageKind::Jpeg) => {
                if payload.len() > MAX_SEGMENT_PAYLOAD {
                    return Err(MetadataError::codec(path, "comment exceeds one JPEG segment"));
                }
                let mut jpeg = Jpeg::from_bytes(Bytes::from(raw))
                    .map_err(|e| MetadataError::codec(path, e.to_string()))?;
                set_jpeg_comment(&mut jpeg, payload);
                encode(path, |out| jpeg.encoder().write_to(out))?
            }
            Some(ImageKind::Png) => {
                let mut png = Png::from_bytes(Bytes::from(raw))
                    .map_err(|e| MetadataError::codec(path, e.to_string()))?;
                set_png_comment(&mut png, payload);
                encode(path, |out| png.encoder().write_to(out))?
            }
            None => return Err(MetadataError::Unsupported(path.to_owned())),
        };

        std::fs::write(path, encoded).map_err(|source| MetadataError::io(path, source))?;
        tracing::trace!(path = %path, bytes = payload.len(), "Wrote metadata comment");
        Ok(())
    }
}

/// Reads the comment written by [`ImageCommentWriter`], if any.
///
/// # Errors
///
/// Returns an error if the file can't be read or parsed.
pub fn read_comment(path: &Utf8Path) -> Result<Option<String>, MetadataError> {
    let raw = std::fs::read(path).map_err(|source| MetadataError::io(path, source))?;

    let comment = match ImageKind::sniff(&raw) {
        Some(ImageKind::Jpeg) => {
            let jpeg = Jpeg::from_bytes(Bytes::from(raw))
                .map_err(|e| MetadataError::codec(path, e.to_string()))?;
            jpeg.segments()
                .iter()
                .find(|segment| segment.marker() == MARKER_COM)
                .map(|segment| segment.contents().to_vec())
        }
        Some(ImageKind::Png) => {
            let png = Png::from_bytes(Bytes::from(raw))
                .map_err(|e| MetadataError::codec(path, e.to_string()))?;
            png.chunks()
                .iter()
                .find(|chunk| is_comment_chunk(chunk))
                .map(|chunk| chunk.contents()[COMMENT_KEYWORD.len()..].to_vec())
        }
        None => return Err(MetadataError::Unsupported(path.to_owned())),
    };

    comment
        .map(|bytes| {
            String::from_utf8(bytes).map_err(|e| MetadataError::codec(path, e.to_string()))
        })
        .transpose()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    fn sniff(raw: &[u8]) -> Option<Self> {
        if raw.starts_with(JPEG_MAGIC) {
            Some(Self::Jpeg)
        } else if raw.starts_with(PNG_MAGIC) {
            Some(Self::Png)
        } else {
            None
        }
    }
}

fn set_jpeg_comment(jpeg: &mut Jpeg, payload: &str) {
    let segments = jpeg.segments_mut();
    segments.retain(|segment| segment.marker() != MARKER_COM);

    let position = segments
        .iter()
        .position(|segment| !(MARKER_APP0..=MARKER_APP15).contains(&segment.marker()))
        .unwrap_or(segments.len());
    let comment = JpegSegment::new_with_contents(MARKER_COM, Bytes::copy_from_slice(payload.as_bytes()));
    segments.insert(position, comment);
}

fn set_png_comment(png: &mut Png, payload: &str) {
    let chunks = png.chunks_mut();
    chunks.retain(|chunk| !is_comment_chunk(chunk));

    let mut contents = Vec::with_capacity(COMMENT_KEYWORD.len() + payload.len());
    contents.extend_from_slice(COMMENT_KEYWORD);
    contents.extend_from_slice(payload.as_bytes());

    let position = chunks
        .iter()
        .position(|chunk| chunk.kind() == CHUNK_END)
        .unwrap_or(chunks.len());
    chunks.insert(position, PngChunk::new(CHUNK_TEXT, Bytes::from(contents)));
}

fn is_comment_chunk(chunk: &PngChunk) -> bool {
    chunk.kind() == CHUNK_TEXT && chunk.contents().starts_with(COMMENT_KEYWORD)
}

fn encode(
    path: &Utf8Path,
    write: impl FnOnce(&mut Vec<u8>) -> std::io::Result<u64>,
) -> Result<Vec<u8>, MetadataError> {
    let mut out = Vec::new();
    write(&mut out).map_err(|source| MetadataError::io(path, source))?;
    Ok(out)
}
