//! Image requantization stage.

use std::collections::HashSet;

use anyhow::{anyhow, bail, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, GenericImageView};
use log::{debug, info};
use lopdf::{Document, Object, ObjectId, Stream};

use super::lopdf_codec::{decode_flate_or_raw, stream_filters};
use super::ImageStats;

fn is_image(stream: &Stream) -> bool {
    matches!(
        stream.dict.get(b"Subtype").and_then(|o| o.as_name()),
        Ok(name) if name == b"Image"
    )
}

/// Objects referenced as `/SMask` or `/Mask` of some image. They belong to
/// their parent and are never re-encoded on their own.
fn mask_ids(doc: &Document) -> HashSet<ObjectId> {
    let mut masks = HashSet::new();
    for object in doc.objects.values() {
        if let Object::Stream(stream) = object {
            if !is_image(stream) {
                continue;
            }
            for key in [&b"SMask"[..], &b"Mask"[..]] {
                if let Ok(Object::Reference(id)) = stream.dict.get(key) {
                    masks.insert(*id);
                }
            }
        }
    }
    masks
}

pub(super) fn requantize_all(doc: &mut Document, quality: u8) -> Result<ImageStats> {
    let masks = mask_ids(doc);
    let image_ids: Vec<ObjectId> = doc
        .objects
        .iter()
        .filter_map(|(id, object)| match object {
            Object::Stream(stream) if is_image(stream) && !masks.contains(id) => Some(*id),
            _ => None,
        })
        .collect();

    let mut stats = ImageStats::default();
    for object_id in image_ids {
        match requantize_image(doc, object_id, quality) {
            Ok(Some(actions)) => {
                debug!("Image {}: {}", object_id.0, actions);
                stats.requantized += 1;
            }
            Ok(None) => {
                debug!("Image {}: re-encoding not smaller, kept", object_id.0);
                stats.skipped += 1;
            }
            Err(e) => {
                debug!("Image {}: left unchanged ({:#})", object_id.0, e);
                stats.skipped += 1;
            }
        }
    }
    info!(
        "Requantized {} images at quality {} ({} skipped)",
        stats.requantized, quality, stats.skipped
    );
    Ok(stats)
}

/// Number of colour components for a `/ColorSpace` entry.
fn color_components(doc: &Document, color_space: Option<&Object>) -> Result<u8> {
    match color_space {
        None => bail!("missing /ColorSpace"),
        Some(Object::Reference(id)) => {
            let resolved = doc.get_object(*id).context("dangling /ColorSpace reference")?;
            color_components(doc, Some(resolved))
        }
        Some(Object::Name(name)) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" => Ok(1),
            b"DeviceRGB" | b"CalRGB" => Ok(3),
            b"DeviceCMYK" => Ok(4),
            other => bail!("unsupported colour space {}", String::from_utf8_lossy(other)),
        },
        Some(Object::Array(arr)) => match arr.first() {
            Some(Object::Name(family)) if family == b"ICCBased" => {
                let profile = match arr.get(1) {
                    Some(Object::Reference(id)) => doc.get_object(*id)?,
                    _ => bail!("ICCBased without profile stream"),
                };
                let n = match profile {
                    Object::Stream(s) => s.dict.get(b"N").and_then(|o| o.as_i64()).ok(),
                    _ => None,
                };
                match n {
                    Some(1) => Ok(1),
                    Some(3) => Ok(3),
                    Some(4) => Ok(4),
                    other => bail!("ICCBased profile with N={:?}", other),
                }
            }
            Some(Object::Name(family)) if family == b"CalRGB" => Ok(3),
            Some(Object::Name(family)) if family == b"CalGray" => Ok(1),
            _ => bail!("unsupported colour space array"),
        },
        Some(_) => bail!("malformed /ColorSpace"),
    }
}

fn cmyk_to_rgb(content: &[u8]) -> Vec<u8> {
    content
        .chunks_exact(4)
        .flat_map(|cmyk| {
            let c = cmyk[0] as f32 / 255.0;
            let m = cmyk[1] as f32 / 255.0;
            let y = cmyk[2] as f32 / 255.0;
            let k = cmyk[3] as f32 / 255.0;

            let r = (1.0 - c) * (1.0 - k);
            let g = (1.0 - m) * (1.0 - k);
            let b = (1.0 - y) * (1.0 - k);

            [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8]
        })
        .collect()
}

fn raw_to_image(width: u32, height: u32, components: u8, mut content: Vec<u8>) -> Result<DynamicImage> {
    let expected = width as usize * height as usize * components as usize;
    if content.len() < expected {
        bail!(
            "sample data too short: {} bytes for {}x{}x{}",
            content.len(),
            width,
            height,
            components
        );
    }
    content.truncate(expected);

    let img = match components {
        1 => DynamicImage::ImageLuma8(
            image::GrayImage::from_raw(width, height, content).ok_or(anyhow!("Failed Gray"))?,
        ),
        3 => DynamicImage::ImageRgb8(
            image::RgbImage::from_raw(width, height, content).ok_or(anyhow!("Failed RGB"))?,
        ),
        4 => DynamicImage::ImageRgb8(
            image::RgbImage::from_raw(width, height, cmyk_to_rgb(&content))
                .ok_or(anyhow!("Failed CMYK->RGB"))?,
        ),
        _ => bail!("Unsupported components {}", components),
    };
    Ok(img)
}

/// Baseline JPEG for `img`; the flag tells whether it was written as gray.
fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<(Vec<u8>, bool)> {
    let (w, h) = img.dimensions();
    let gray = matches!(
        img.color(),
        ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16
    );

    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    if gray {
        let luma = img.to_luma8();
        encoder.encode(luma.as_raw(), w, h, ColorType::L8.into())?;
    } else {
        let rgb = img.to_rgb8();
        encoder.encode(rgb.as_raw(), w, h, ColorType::Rgb8.into())?;
    }
    Ok((buffer, gray))
}

/// Re-encode one image XObject as JPEG.
///
/// Returns `Ok(None)` when the new encoding is not smaller than the stored
/// one, in which case the object is left alone. Soft masks keep pointing at
/// the same object since dimensions never change.
fn requantize_image(doc: &mut Document, object_id: ObjectId, quality: u8) -> Result<Option<String>> {
    let mut actions = Vec::new();

    let (encoded, gray, width, height) = {
        let stream = match doc.objects.get(&object_id) {
            Some(Object::Stream(s)) => s,
            _ => bail!("Object not a stream"),
        };
        let dict = &stream.dict;

        if matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
            bail!("stencil mask");
        }
        if dict.has(b"Decode") {
            bail!("custom /Decode array");
        }

        let width = dict.get(b"Width").and_then(|o| o.as_i64()).unwrap_or(0);
        let height = dict.get(b"Height").and_then(|o| o.as_i64()).unwrap_or(0);
        if width <= 0 || height <= 0 {
            bail!("missing dimensions");
        }
        let (width, height) = (width as u32, height as u32);

        let filters = stream_filters(stream).ok_or_else(|| anyhow!("unsupported /Filter entry"))?;
        let is_jpeg = matches!(filters.as_slice(), [name] if name.as_slice() == b"DCTDecode");

        let img = if is_jpeg {
            actions.push("was JPEG".to_string());
            if color_components(doc, dict.get(b"ColorSpace").ok()).ok() == Some(4) {
                bail!("CMYK JPEG");
            }
            image::load_from_memory(&stream.content).context("Failed to load image from memory")?
        } else {
            let bits = dict.get(b"BitsPerComponent").and_then(|o| o.as_i64()).unwrap_or(8);
            if bits != 8 {
                bail!("{} bits per component", bits);
            }
            let components = color_components(doc, dict.get(b"ColorSpace").ok())?;
            if components == 4 {
                actions.push("CMYK->RGB".to_string());
            }
            raw_to_image(width, height, components, decode_flate_or_raw(stream)?)?
        };

        if img.dimensions() != (width, height) {
            bail!(
                "decoded {}x{} but dictionary says {}x{}",
                img.width(),
                img.height(),
                width,
                height
            );
        }

        let (encoded, gray) = encode_jpeg(&img, quality)?;
        if encoded.len() >= stream.content.len() {
            return Ok(None);
        }
        actions.push(format!(
            "re-encode: JPEG(q={}) {} -> {} bytes",
            quality,
            stream.content.len(),
            encoded.len()
        ));
        (encoded, gray, width, height)
    };

    if let Some(Object::Stream(stream)) = doc.objects.get_mut(&object_id) {
        stream
            .dict
            .set("Length", Object::Integer(encoded.len() as i64));
        stream.content = encoded;
        stream
            .dict
            .set("Filter", Object::Name(b"DCTDecode".to_vec()));
        stream.dict.set("Width", Object::Integer(width as i64));
        stream.dict.set("Height", Object::Integer(height as i64));
        let color_space: &[u8] = if gray { b"DeviceGray" } else { b"DeviceRGB" };
        stream
            .dict
            .set("ColorSpace", Object::Name(color_space.to_vec()));
        stream.dict.set("BitsPerComponent", Object::Integer(8));
        stream.dict.remove(b"DecodeParms");
    }

    Ok(Some(actions.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Dictionary};

    fn image_dict(width: i64, height: i64, color_space: &str) -> Dictionary {
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => Object::Integer(width),
            "Height" => Object::Integer(height),
            "ColorSpace" => color_space,
            "BitsPerComponent" => Object::Integer(8),
        }
    }

    fn gradient_rgb(width: u32, height: u32) -> Vec<u8> {
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push((x * 4) as u8);
                pixels.push((y * 4) as u8);
                pixels.push(128);
            }
        }
        pixels
    }

    #[test]
    fn raw_rgb_image_becomes_jpeg_and_mask_is_untouched() {
        let mut doc = Document::with_version("1.5");
        let mask_content = vec![200u8; 64 * 64];
        let mask_id = doc.add_object(Stream::new(
            image_dict(64, 64, "DeviceGray"),
            mask_content.clone(),
        ));
        let mut dict = image_dict(64, 64, "DeviceRGB");
        dict.set("SMask", Object::Reference(mask_id));
        let image_id = doc.add_object(Stream::new(dict, gradient_rgb(64, 64)));

        let stats = requantize_all(&mut doc, 50).unwrap();
        assert_eq!(stats, ImageStats { requantized: 1, skipped: 0 });

        let image = doc.get_object(image_id).unwrap().as_stream().unwrap();
        assert_eq!(
            image.dict.get(b"Filter").unwrap().as_name().unwrap(),
            b"DCTDecode"
        );
        assert!(image.content.len() < 64 * 64 * 3);
        assert_eq!(image.dict.get(b"Width").unwrap().as_i64().unwrap(), 64);
        assert!(matches!(image.dict.get(b"SMask"), Ok(Object::Reference(id)) if *id == mask_id));

        let mask = doc.get_object(mask_id).unwrap().as_stream().unwrap();
        assert_eq!(mask.content, mask_content);
        assert!(mask.dict.get(b"Filter").is_err());
    }

    #[test]
    fn gray_image_stays_gray() {
        let mut doc = Document::with_version("1.5");
        let pixels: Vec<u8> = (0..64 * 64).map(|i| (i % 64) as u8 * 4).collect();
        let id = doc.add_object(Stream::new(image_dict(64, 64, "DeviceGray"), pixels));

        requantize_all(&mut doc, 75).unwrap();

        let image = doc.get_object(id).unwrap().as_stream().unwrap();
        assert_eq!(
            image.dict.get(b"ColorSpace").unwrap().as_name().unwrap(),
            b"DeviceGray"
        );
    }

    #[test]
    fn unsupported_images_are_skipped_not_fatal() {
        let mut doc = Document::with_version("1.5");
        let indexed = Object::Array(vec![
            Object::Name(b"Indexed".to_vec()),
            Object::Name(b"DeviceRGB".to_vec()),
            Object::Integer(1),
            Object::string_literal(vec![0u8, 0, 0, 255, 255, 255]),
        ]);
        let mut dict = image_dict(8, 8, "DeviceRGB");
        dict.set("ColorSpace", indexed);
        let id = doc.add_object(Stream::new(dict, vec![0u8; 64]));

        let stats = requantize_all(&mut doc, 50).unwrap();
        assert_eq!(stats, ImageStats { requantized: 0, skipped: 1 });
        let image = doc.get_object(id).unwrap().as_stream().unwrap();
        assert_eq!(image.content, vec![0u8; 64]);
    }

    #[test]
    fn cmyk_samples_convert_to_rgb() {
        assert_eq!(cmyk_to_rgb(&[0, 0, 0, 0, 0, 0, 0, 255]), vec![255, 255, 255, 0, 0, 0]);
    }
}
