//! Price list PDF access using lopdf and pdf-extract.

use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, Rgba};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::layout::{self, TextRun};
use super::{PageRenderer, PdfProcessor, Result};
use crate::error::PdfError;

/// US Letter, used when a page carries no usable MediaBox.
const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// PDF reader backed by lopdf, with pdf-extract for plain page text.
///
/// Pages render through the attached [`PageRenderer`]. Without one, or when
/// it fails, the page's embedded scan is resampled instead.
pub struct PdfExtractor {
    document: Option<Document>,
    raw_data: Vec<u8>,
    renderer: Option<Arc<dyn PageRenderer>>,
}

impl PdfExtractor {
    pub fn new() -> Self {
        Self {
            document: None,
            raw_data: Vec::new(),
            renderer: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Load a document from bytes in one step.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut extractor = Self::new();
        extractor.load(data)?;
        Ok(extractor)
    }

    fn document(&self) -> Result<&Document> {
        self.document
            .as_ref()
            .ok_or_else(|| PdfError::Parse("No document loaded".to_string()))
    }

    fn page_id(&self, page: u32) -> Result<ObjectId> {
        self.document()?
            .get_pages()
            .get(&page)
            .copied()
            .ok_or(PdfError::InvalidPage(page))
    }

    fn extract_all_images(&self) -> Vec<DynamicImage> {
        let Some(doc) = self.document.as_ref() else {
            return vec![];
        };

        let mut images = Vec::new();
        let mut seen: HashSet<ObjectId> = HashSet::new();
        for (id, object) in doc.objects.iter() {
            if !seen.insert(*id) {
                continue;
            }
            if let Some(img) = decode_image_object(doc, object) {
                images.push(img);
            }
        }

        debug!(images = images.len(), "scanned document objects for images");
        images
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Look up `key` on a page, walking up the page tree for inherited attributes.
fn inherited_attribute(doc: &Document, node_id: ObjectId, key: &[u8]) -> Option<Object> {
    let Ok(Object::Dictionary(dict)) = doc.get_object(node_id) else {
        return None;
    };

    if let Ok(value) = dict.get(key) {
        if let Ok((_, resolved)) = doc.dereference(value) {
            return Some(resolved.clone());
        }
    }

    match dict.get(b"Parent") {
        Ok(Object::Reference(parent_id)) => inherited_attribute(doc, *parent_id, key),
        _ => None,
    }
}

fn media_box_size(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let Some(Object::Array(items)) = inherited_attribute(doc, page_id, b"MediaBox") else {
        return DEFAULT_PAGE_SIZE;
    };

    let bounds: Vec<f32> = items
        .iter()
        .filter_map(|obj| match obj {
            Object::Integer(i) => Some(*i as f32),
            Object::Real(r) => Some(*r),
            _ => None,
        })
        .collect();

    match bounds.as_slice() {
        [x0, y0, x1, y1] if x1 > x0 && y1 > y0 => (x1 - x0, y1 - y0),
        _ => DEFAULT_PAGE_SIZE,
    }
}

fn decode_image_object(doc: &Document, obj: &Object) -> Option<DynamicImage> {
    let Object::Stream(stream) = obj else {
        return None;
    };
    let dict = &stream.dict;

    if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
        return None;
    }

    let width = dict.get(b"Width").ok()?.as_i64().ok()? as u32;
    let height = dict.get(b"Height").ok()?.as_i64().ok()? as u32;
    trace!(width, height, "image object");

    if let Ok(filter) = dict.get(b"Filter") {
        let filter_name = match filter {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            _ => None,
        };

        match filter_name {
            Some(b"DCTDecode") => {
                return image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg).ok();
            }
            Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
                trace!(filter = ?filter_name.map(String::from_utf8_lossy), "unsupported image filter");
                return None;
            }
            _ => {}
        }
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| match o {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            Object::Reference(r) => doc.get_object(*r).ok().and_then(|o| o.as_name().ok()),
            _ => None,
        })
        .unwrap_or(b"DeviceRGB");

    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);

    raw_to_image(&data, width, height, color_space, bits)
}

fn raw_to_image(data: &[u8], width: u32, height: u32, color_space: &[u8], bits: i64) -> Option<DynamicImage> {
    if bits != 8 {
        trace!(bits, "unsupported bits per component");
        return None;
    }

    let pixels = (width as usize) * (height as usize);
    let channels = match color_space {
        b"DeviceRGB" | b"RGB" => 3,
        b"DeviceGray" | b"G" => 1,
        _ => return None,
    };
    if data.len() < pixels * channels {
        trace!(len = data.len(), expected = pixels * channels, "image data too short");
        return None;
    }

    let mut rgba = Vec::with_capacity(pixels * 4);
    for px in data[..pixels * channels].chunks_exact(channels) {
        match px {
            [r, g, b] => rgba.extend_from_slice(&[*r, *g, *b, 255]),
            [gray] => rgba.extend_from_slice(&[*gray, *gray, *gray, 255]),
            _ => return None,
        }
    }

    ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, rgba).map(DynamicImage::ImageRgba8)
}

fn page_xobject_images(doc: &Document, page_id: ObjectId) -> Vec<DynamicImage> {
    let Some(Object::Dictionary(resources)) = inherited_attribute(doc, page_id, b"Resources") else {
        return vec![];
    };
    xobject_images(doc, &resources)
}

fn xobject_images(doc: &Document, resources: &Dictionary) -> Vec<DynamicImage> {
    let Ok(xobjects) = resources.get(b"XObject") else {
        return vec![];
    };
    let Ok((_, Object::Dictionary(xobj_dict))) = doc.dereference(xobjects) else {
        return vec![];
    };

    xobj_dict
        .iter()
        .filter_map(|(_, obj_ref)| doc.dereference(obj_ref).ok())
        .filter_map(|(_, obj)| decode_image_object(doc, obj))
        .collect()
}

impl PdfProcessor for PdfExtractor {
    fn load(&mut self, data: &[u8]) -> Result<()> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        // Empty-password encryption is common on exported price sheets.
        if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("decrypted PDF with empty password");

            let mut decrypted = Vec::new();
            doc.save_to(&mut decrypted)
                .map_err(|e| PdfError::Parse(format!("Failed to save decrypted PDF: {}", e)))?;
            self.raw_data = decrypted;
        } else {
            self.raw_data = data.to_vec();
        }

        let page_count = doc.get_pages().len();
        if page_count == 0 {
            return Err(PdfError::NoPages);
        }

        debug!(pages = page_count, "loaded PDF");
        self.document = Some(doc);
        Ok(())
    }

    fn page_count(&self) -> u32 {
        self.document
            .as_ref()
            .map(|doc| doc.get_pages().len() as u32)
            .unwrap_or(0)
    }

    fn extract_page_text(&self, page: u32) -> Result<String> {
        if page == 0 || page > self.page_count() {
            return Err(PdfError::InvalidPage(page));
        }
        let pages = pdf_extract::extract_text_from_mem_by_pages(&self.raw_data)
            .map_err(|e| PdfError::TextExtraction(e.to_string()))?;
        Ok(pages.into_iter().nth(page as usize - 1).unwrap_or_default())
    }

    fn text_runs(&self, page: u32) -> Result<Vec<TextRun>> {
        let doc = self.document()?;
        layout::page_runs(doc, self.page_id(page)?)
    }

    fn page_size(&self, page: u32) -> Result<(f32, f32)> {
        let doc = self.document()?;
        Ok(media_box_size(doc, self.page_id(page)?))
    }

    fn render_page(&self, page: u32, dpi: u32) -> Result<DynamicImage> {
        let (width_pt, height_pt) = self.page_size(page)?;

        if let Some(renderer) = self.renderer.as_ref() {
            match renderer.render(&self.raw_data, page, dpi) {
                Ok(image) => return Ok(image),
                Err(e) => warn!(page, error = %e, "page renderer failed, using embedded scan"),
            }
        }

        let mut images = self.extract_images(page)?;
        // The page scan is the largest image on it.
        images.sort_by_key(|img| std::cmp::Reverse(img.width() as u64 * img.height() as u64));
        let scan = images
            .into_iter()
            .next()
            .ok_or_else(|| PdfError::ImageExtraction(format!("page {} has no raster content and no renderer succeeded", page)))?;

        let target_w = (width_pt / 72.0 * dpi as f32).round().max(1.0) as u32;
        let target_h = (height_pt / 72.0 * dpi as f32).round().max(1.0) as u32;
        debug!(
            page,
            dpi,
            from = ?(scan.width(), scan.height()),
            to = ?(target_w, target_h),
            "resampling embedded scan"
        );

        if (scan.width(), scan.height()) == (target_w, target_h) {
            return Ok(scan);
        }
        Ok(scan.resize_exact(target_w, target_h, FilterType::Lanczos3))
    }

    fn extract_images(&self, page: u32) -> Result<Vec<DynamicImage>> {
        let doc = self.document()?;
        let page_id = self.page_id(page)?;

        let images = page_xobject_images(doc, page_id);
        if !images.is_empty() {
            debug!(page, images = images.len(), "extracted page images");
            return Ok(images);
        }

        // Some scanners attach images outside the page's resources. Fall back
        // to the document's images in object order, one per page.
        debug!(page, "no XObject images on page, scanning all objects");
        Ok(self
            .extract_all_images()
            .into_iter()
            .nth(page as usize - 1)
            .into_iter()
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Stream};
    use pretty_assertions::assert_eq;

    /// One-page document with a single line of Helvetica text.
    pub(crate) fn sample_pdf(media_box: Vec<Object>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), Object::Integer(10)]),
                Operation::new("Td", vec![Object::Integer(72), Object::Integer(700)]),
                Operation::new("Tj", vec![Object::string_literal("103387")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => media_box,
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_pdf_extractor_new() {
        let extractor = PdfExtractor::new();
        assert!(extractor.document.is_none());
        assert_eq!(extractor.page_count(), 0);
    }

    #[test]
    fn test_load_rejects_garbage() {
        assert!(PdfExtractor::from_bytes(b"not a pdf").is_err());
    }

    #[test]
    fn test_inherited_media_box_and_runs() {
        let media_box = vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(792),
            Object::Integer(612),
        ];
        let extractor = PdfExtractor::from_bytes(&sample_pdf(media_box)).unwrap();
        assert_eq!(extractor.page_count(), 1);
        assert_eq!(extractor.page_size(1).unwrap(), (792.0, 612.0));

        let runs = extractor.text_runs(1).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "103387");
        assert_eq!((runs[0].x, runs[0].y), (72.0, 700.0));

        assert!(matches!(extractor.text_runs(2), Err(PdfError::InvalidPage(2))));
    }

    struct Blank;

    impl PageRenderer for Blank {
        fn render(&self, pdf: &[u8], page: u32, dpi: u32) -> Result<DynamicImage> {
            assert!(pdf.starts_with(b"%PDF"));
            let side = 8 * dpi / 72;
            Ok(DynamicImage::ImageLuma8(image::GrayImage::from_pixel(side, side + page, image::Luma([255]))))
        }
    }

    struct Broken;

    impl PageRenderer for Broken {
        fn render(&self, _pdf: &[u8], _page: u32, _dpi: u32) -> Result<DynamicImage> {
            Err(PdfError::Render("exit status 1".to_string()))
        }
    }

    #[test]
    fn test_text_only_page_needs_a_renderer() {
        let bytes = sample_pdf(vec![]);
        let extractor = PdfExtractor::from_bytes(&bytes).unwrap();
        assert_eq!(extractor.page_size(1).unwrap(), DEFAULT_PAGE_SIZE);
        assert!(matches!(extractor.render_page(1, 400), Err(PdfError::ImageExtraction(_))));

        let rendered = PdfExtractor::from_bytes(&bytes).unwrap().with_renderer(Arc::new(Blank));
        let image = rendered.render_page(1, 144).unwrap();
        assert_eq!((image.width(), image.height()), (16, 17));
        assert!(matches!(rendered.render_page(2, 144), Err(PdfError::InvalidPage(2))));

        let broken = PdfExtractor::from_bytes(&bytes).unwrap().with_renderer(Arc::new(Broken));
        assert!(matches!(broken.render_page(1, 400), Err(PdfError::ImageExtraction(_))));
    }

    #[test]
    fn test_raw_gray_image() {
        let img = raw_to_image(&[0, 128, 255, 64], 2, 2, b"DeviceGray", 8).unwrap();
        assert_eq!((img.width(), img.height()), (2, 2));
        assert!(raw_to_image(&[0, 128], 2, 2, b"DeviceGray", 8).is_none());
        assert!(raw_to_image(&[0; 12], 2, 2, b"DeviceRGB", 16).is_none());
    }
}
