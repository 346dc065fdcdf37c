//! Binds downloaded page images into a single PDF, one image per page.

use crate::{Error, Result};
use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, ImageDecoder, ImageFormat};
use log::debug;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Points per pixel, assuming 96 dpi source images.
const PT_PER_PX: f32 = 72.0 / 96.0;

/// Image data ready to embed as a PDF image XObject
struct EmbeddedImage {
    width: u32,
    height: u32,
    color_space: &'static str,
    stream: Stream,
}

/// Create a PDF at `output` (extension forced to `.pdf`) with one page per image.
///
/// Pages appear in the order of `images`.
pub fn create_pdf(images: &[PathBuf], output: &Path) -> Result<PathBuf> {
    if images.is_empty() {
        return Err(Error::EmptyDocument);
    }
    let output = output.with_extension("pdf");

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(images.len());

    for path in images {
        let bytes = std::fs::read(path)?;
        let image = embed(&bytes).map_err(|e| Error::ImageError(format!("{}: {}", path.display(), e)))?;
        debug!(
            "page {}: {}x{} {} from {}",
            kids.len() + 1,
            image.width,
            image.height,
            image.color_space,
            path.display()
        );
        let page_id = add_page(&mut doc, pages_id, image)?;
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    doc.save(&output)
        .map_err(|e| Error::PdfError(format!("Failed to write {}: {}", output.display(), e)))?;
    Ok(output)
}

fn add_page(doc: &mut Document, pages_id: ObjectId, image: EmbeddedImage) -> Result<ObjectId> {
    let w = image.width as f32 * PT_PER_PX;
    let h = image.height as f32 * PT_PER_PX;

    let image_id = doc.add_object(image.stream);
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![w.into(), 0_i64.into(), 0_i64.into(), h.into(), 0_i64.into(), 0_i64.into()],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content
        .encode()
        .map_err(|e| Error::PdfError(format!("Failed to encode page content: {}", e)))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0_i64.into(), 0_i64.into(), w.into(), h.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => image_id,
            },
        },
    }))
}

fn embed(bytes: &[u8]) -> std::result::Result<EmbeddedImage, String> {
    if image::guess_format(bytes).ok() == Some(ImageFormat::Jpeg) {
        if let Some(jpeg) = embed_jpeg(bytes)? {
            return Ok(jpeg);
        }
    }
    embed_decoded(bytes)
}

/// Pass baseline gray/RGB JPEG data through untouched.
fn embed_jpeg(bytes: &[u8]) -> std::result::Result<Option<EmbeddedImage>, String> {
    let decoder = JpegDecoder::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let (width, height) = decoder.dimensions();
    let color_space = match decoder.color_type() {
        ColorType::L8 => "DeviceGray",
        ColorType::Rgb8 => "DeviceRGB",
        _ => return Ok(None),
    };

    let mut stream = Stream::new(image_dict(width, height, color_space), bytes.to_vec());
    stream.dict.set("Filter", "DCTDecode");
    Ok(Some(EmbeddedImage {
        width,
        height,
        color_space,
        stream: stream.with_compression(false),
    }))
}

fn embed_decoded(bytes: &[u8]) -> std::result::Result<EmbeddedImage, String> {
    let rgb = image::load_from_memory(bytes).map_err(|e| e.to_string())?.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut stream = Stream::new(image_dict(width, height, "DeviceRGB"), rgb.into_raw());
    stream.compress().map_err(|e| e.to_string())?;
    Ok(EmbeddedImage {
        width,
        height,
        color_space: "DeviceRGB",
        stream,
    })
}

fn image_dict(width: u32, height: u32, color_space: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => Object::Name(color_space.as_bytes().to_vec()),
        "BitsPerComponent" => 8_i64,
    }
}
