//! Content-stream recompression stage.

use std::collections::BTreeSet;
use std::io::Write;

use anyhow::{Context, Result};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{debug, info};
use lopdf::{Document, Object, ObjectId};
use rayon::prelude::*;

use super::lopdf_codec::decode_flate_or_raw;

fn deflate(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Recompress the content streams of every page at `level`.
///
/// Streams shared between pages are handled once. Streams with filters other
/// than Flate are left as they are.
pub(super) fn recompress_pages(doc: &mut Document, level: u32) -> Result<usize> {
    let stream_ids: BTreeSet<ObjectId> = doc
        .get_pages()
        .values()
        .flat_map(|page_id| doc.get_page_contents(*page_id))
        .collect();

    let decoded: Vec<(ObjectId, Vec<u8>)> = stream_ids
        .into_iter()
        .filter_map(|id| match doc.objects.get(&id) {
            Some(Object::Stream(stream)) => match decode_flate_or_raw(stream) {
                Ok(content) => Some((id, content)),
                Err(e) => {
                    debug!("Content stream {}: left unchanged ({:#})", id.0, e);
                    None
                }
            },
            _ => None,
        })
        .collect();

    // zlib is the CPU-heavy part, run it across pages in parallel.
    let encoded: Vec<(ObjectId, Vec<u8>)> = decoded
        .into_par_iter()
        .map(|(id, content)| {
            deflate(&content, level)
                .with_context(|| format!("Failed to deflate content stream {}", id.0))
                .map(|buf| (id, buf))
        })
        .collect::<Result<_>>()?;

    let count = encoded.len();
    for (id, buffer) in encoded {
        if let Some(Object::Stream(stream)) = doc.objects.get_mut(&id) {
            stream
                .dict
                .set("Length", Object::Integer(buffer.len() as i64));
            stream.content = buffer;
            stream
                .dict
                .set("Filter", Object::Name(b"FlateDecode".to_vec()));
            stream.dict.remove(b"DecodeParms");
        }
    }
    info!("Recompressed {} content streams at level {}", count, level);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use lopdf::{dictionary, Stream};
    use std::io::Read;

    fn inflate(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        ZlibDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    /// Two pages sharing one content stream plus a page with its own.
    fn two_page_doc(content: &[u8]) -> (Document, ObjectId, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let shared = doc.add_object(Stream::new(lopdf::Dictionary::new(), content.to_vec()));
        let own = doc.add_object(Stream::new(lopdf::Dictionary::new(), content.to_vec()));
        let page_a = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => shared,
        });
        let page_b = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => vec![Object::Reference(shared), Object::Reference(own)],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_a), Object::Reference(page_b)],
                "Count" => Object::Integer(2),
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        (doc, shared, own)
    }

    #[test]
    fn shared_streams_are_compressed_once() {
        let content = b"0 0 m 100 100 l S\n".repeat(200);
        let (mut doc, shared, own) = two_page_doc(&content);

        let count = recompress_pages(&mut doc, 9).unwrap();
        assert_eq!(count, 2);

        for id in [shared, own] {
            let stream = doc.get_object(id).unwrap().as_stream().unwrap();
            assert_eq!(
                stream.dict.get(b"Filter").unwrap().as_name().unwrap(),
                b"FlateDecode"
            );
            assert!(stream.content.len() < content.len());
            assert_eq!(inflate(&stream.content), content);
        }
    }

    #[test]
    fn higher_level_is_not_larger() {
        let content: Vec<u8> = (0..4000u32)
            .flat_map(|i| format!("{} {} m {} {} l S\n", i % 97, i % 13, i % 31, i % 7).into_bytes())
            .collect();
        let (mut fast, fast_id, _) = two_page_doc(&content);
        let (mut best, best_id, _) = two_page_doc(&content);

        recompress_pages(&mut fast, 0).unwrap();
        recompress_pages(&mut best, 9).unwrap();

        let fast_len = fast.get_object(fast_id).unwrap().as_stream().unwrap().content.len();
        let best_len = best.get_object(best_id).unwrap().as_stream().unwrap().content.len();
        assert!(best_len < fast_len);
    }
}
