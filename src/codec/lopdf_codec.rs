use std::io::Read;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use lopdf::{Document, Object, Stream};

use super::{content, images, ImageStats, PdfCodec};

/// [`PdfCodec`] backed by `lopdf`, `image` and `flate2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfCodec;

impl PdfCodec for LopdfCodec {
    type Document = Document;

    fn open(&self, bytes: &[u8]) -> Result<Document> {
        let start = Instant::now();
        let mut doc = Document::load_mem(bytes).context("Failed to load PDF")?;
        debug!(
            "Loaded PDF with {} pages in {:.2?}",
            doc.get_pages().len(),
            start.elapsed()
        );

        if doc.is_encrypted() {
            debug!("PDF is encrypted. Attempting to decrypt with empty password...");
            if let Err(e) = doc.decrypt(b"") {
                // Images may still be readable, the image stage skips what it can't decode.
                warn!("Failed to decrypt with empty password: {:?}", e);
            }
        }
        Ok(doc)
    }

    fn requantize_images(&self, doc: &mut Document, quality: u8) -> Result<ImageStats> {
        if !(1..=100).contains(&quality) {
            return Err(anyhow!("JPEG quality must be 1-100, got {}", quality));
        }
        images::requantize_all(doc, quality)
    }

    fn recompress_content_streams(&self, doc: &mut Document, level: u32) -> Result<usize> {
        if level > 9 {
            return Err(anyhow!("compression level must be 0-9, got {}", level));
        }
        content::recompress_pages(doc, level)
    }

    fn write(&self, mut doc: Document) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).context("Failed to save PDF")?;
        Ok(buffer)
    }
}

/// Filter names of a stream, in decode order. `None` when the `/Filter`
/// entry has a shape this codec does not handle.
pub(super) fn stream_filters(stream: &Stream) -> Option<Vec<Vec<u8>>> {
    match stream.dict.get(b"Filter") {
        Err(_) => Some(Vec::new()),
        Ok(Object::Name(name)) => Some(vec![name.clone()]),
        Ok(Object::Array(arr)) => arr
            .iter()
            .map(|o| match o {
                Object::Name(name) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        Ok(_) => None,
    }
}

/// Decoded bytes of an unfiltered or Flate-encoded stream.
pub(super) fn decode_flate_or_raw(stream: &Stream) -> Result<Vec<u8>> {
    let filters = stream_filters(stream).ok_or_else(|| anyhow!("unsupported /Filter entry"))?;
    match filters.as_slice() {
        [] => Ok(stream.content.clone()),
        [name] if name.as_slice() == b"FlateDecode" => match stream.decompressed_content() {
            Ok(c) => Ok(c),
            Err(e) => {
                debug!("lopdf could not inflate stream ({:?}), trying zlib directly", e);
                let mut decoder = flate2::read::ZlibDecoder::new(&stream.content[..]);
                let mut buffer = Vec::new();
                decoder
                    .read_to_end(&mut buffer)
                    .context("Manual zlib failed")?;
                Ok(buffer)
            }
        },
        other => Err(anyhow!(
            "unsupported filter chain {:?}",
            other
                .iter()
                .map(|n| String::from_utf8_lossy(n).into_owned())
                .collect::<Vec<_>>()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use std::io::Write;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn raw_stream_is_returned_as_is() {
        let stream = Stream::new(lopdf::Dictionary::new(), b"0 0 m 10 10 l S".to_vec());
        assert_eq!(decode_flate_or_raw(&stream).unwrap(), b"0 0 m 10 10 l S");
    }

    #[test]
    fn flate_stream_in_array_form_is_inflated() {
        let stream = Stream::new(
            dictionary! { "Filter" => vec![Object::Name(b"FlateDecode".to_vec())] },
            zlib(b"BT /F1 12 Tf ET"),
        );
        assert_eq!(decode_flate_or_raw(&stream).unwrap(), b"BT /F1 12 Tf ET");
    }

    #[test]
    fn other_filters_are_rejected() {
        let stream = Stream::new(
            dictionary! { "Filter" => "LZWDecode" },
            b"whatever".to_vec(),
        );
        assert!(decode_flate_or_raw(&stream).is_err());
    }

    #[test]
    fn garbage_is_not_a_pdf() {
        assert!(LopdfCodec.open(b"definitely not a pdf").is_err());
    }
}
