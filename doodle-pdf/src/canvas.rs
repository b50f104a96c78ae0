//! Page drawing surface
//!
//! A [`Canvas`] records content-stream operations for one page. Canvases
//! are turned into a standalone [`lopdf::Document`] with [`build_document`];
//! fonts are shared across the pages of that document.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};

use crate::error::PdfResult;
use crate::geometry::{PageFrame, Rect, fit_within};
use crate::palette::Rgb;
use crate::raster::RasterImage;
use crate::text::{Font, encode_win_ansi, text_width};

/// Horizontal text alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

fn real(v: f32) -> Object {
    Object::from(v)
}

fn name(n: &str) -> Object {
    Object::Name(n.as_bytes().to_vec())
}

/// One page's worth of drawing operations
#[derive(Debug)]
pub struct Canvas {
    frame: PageFrame,
    operations: Vec<Operation>,
    images: Vec<RasterImage>,
    alphas: Vec<f32>,
}

impl Canvas {
    pub fn new(frame: PageFrame) -> Self {
        Self {
            frame,
            operations: Vec::new(),
            images: Vec::new(),
            alphas: Vec::new(),
        }
    }

    pub fn frame(&self) -> PageFrame {
        self.frame
    }

    fn op(&mut self, operator: &str, operands: Vec<Object>) {
        self.operations.push(Operation::new(operator, operands));
    }

    fn set_fill(&mut self, color: Rgb) {
        self.op("rg", vec![real(color.r), real(color.g), real(color.b)]);
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Rgb) {
        self.op("q", vec![]);
        self.set_fill(color);
        self.op(
            "re",
            vec![real(rect.x), real(rect.y), real(rect.width), real(rect.height)],
        );
        self.op("f", vec![]);
        self.op("Q", vec![]);
    }

    /// Fill with constant alpha via an ExtGState
    pub fn fill_rect_translucent(&mut self, rect: Rect, color: Rgb, alpha: f32) {
        let idx = self.alphas.len();
        self.alphas.push(alpha.clamp(0.0, 1.0));
        self.op("q", vec![]);
        self.op("gs", vec![name(&format!("GS{idx}"))]);
        self.set_fill(color);
        self.op(
            "re",
            vec![real(rect.x), real(rect.y), real(rect.width), real(rect.height)],
        );
        self.op("f", vec![]);
        self.op("Q", vec![]);
    }

    /// Place `image` inside `region`, aspect preserved and centered.
    /// Returns the rectangle actually covered.
    pub fn draw_image(&mut self, image: RasterImage, region: Rect) -> Rect {
        let placed = fit_within(image.width, image.height, region);
        self.draw_image_at(image, placed);
        placed
    }

    fn draw_image_at(&mut self, image: RasterImage, placed: Rect) {
        let idx = self.images.len();
        self.images.push(image);
        self.op("q", vec![]);
        self.op(
            "cm",
            vec![
                real(placed.width),
                real(0.0),
                real(0.0),
                real(placed.height),
                real(placed.x),
                real(placed.y),
            ],
        );
        self.op("Do", vec![name(&format!("Im{idx}"))]);
        self.op("Q", vec![]);
    }

    /// Draw one line of text with its baseline at `y`.
    /// For [`Align::Center`], `x` is the center of the line.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_text(&mut self, text: &str, font: Font, size: f32, x: f32, y: f32, align: Align, color: Rgb) {
        if text.is_empty() {
            return;
        }
        let start_x = match align {
            Align::Left => x,
            Align::Center => x - text_width(text, font, size) / 2.0,
        };
        self.op("BT", vec![]);
        self.set_fill(color);
        self.op("Tf", vec![name(font.resource_name()), real(size)]);
        self.op("Td", vec![real(start_x), real(y)]);
        self.op(
            "Tj",
            vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
        );
        self.op("ET", vec![]);
    }

    /// Stack `lines` downward starting with the first baseline at `top_baseline`
    #[allow(clippy::too_many_arguments)]
    pub fn draw_lines(
        &mut self,
        lines: &[String],
        font: Font,
        size: f32,
        line_height: f32,
        x: f32,
        top_baseline: f32,
        align: Align,
        color: Rgb,
    ) {
        for (i, line) in lines.iter().enumerate() {
            let y = top_baseline - i as f32 * line_height;
            self.draw_text(line, font, size, x, y, align, color);
        }
    }
}

/// Build a document with one page per canvas, in order.
pub fn build_document(canvases: Vec<Canvas>) -> PdfResult<Document> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut fonts = Dictionary::new();
    for font in Font::ALL {
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.base_font(),
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(font.resource_name(), font_id);
    }
    let fonts_id = doc.add_object(fonts);

    let mut kids: Vec<Object> = Vec::with_capacity(canvases.len());
    for canvas in canvases {
        let page_id = add_page(&mut doc, canvas, pages_id, fonts_id)?;
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
    Ok(doc)
}

fn add_page(doc: &mut Document, canvas: Canvas, pages_id: ObjectId, fonts_id: ObjectId) -> PdfResult<ObjectId> {
    let Canvas {
        frame,
        operations,
        images,
        alphas,
    } = canvas;

    let mut xobjects = Dictionary::new();
    for (idx, image) in images.into_iter().enumerate() {
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            image.jpeg,
        )
        .with_compression(false);
        let image_id = doc.add_object(stream);
        xobjects.set(format!("Im{idx}"), image_id);
    }

    let mut states = Dictionary::new();
    for (idx, alpha) in alphas.into_iter().enumerate() {
        states.set(
            format!("GS{idx}"),
            dictionary! {
                "Type" => "ExtGState",
                "ca" => real(alpha),
                "CA" => real(alpha),
            },
        );
    }

    let content = Content { operations }.encode()?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));

    let media = frame.media();
    let trim = frame.trim();
    let mut page = dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![real(0.0), real(0.0), real(media.width), real(media.height)],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => fonts_id,
            "XObject" => xobjects,
            "ExtGState" => states,
        },
    };
    if frame.bleed > 0.0 {
        page.set(
            "TrimBox",
            vec![real(trim.x), real(trim.y), real(trim.right()), real(trim.top())],
        );
        page.set(
            "BleedBox",
            vec![real(0.0), real(0.0), real(media.width), real(media.height)],
        );
    }
    Ok(doc.add_object(page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::fixtures;

    #[test]
    fn test_single_page_document() {
        let mut canvas = Canvas::new(PageFrame::digital());
        canvas.fill_rect(Rect::new(0.0, 0.0, 612.0, 612.0), Rgb::WHITE);
        canvas.draw_text("Hello", Font::Bold, 24.0, 306.0, 300.0, Align::Center, Rgb::INK);
        let mut doc = build_document(vec![canvas]).unwrap();
        assert_eq!(doc.get_pages().len(), 1);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        let reloaded = Document::load_mem(&bytes).unwrap();
        assert_eq!(reloaded.get_pages().len(), 1);
    }

    #[test]
    fn test_multi_page_with_image_and_bleed() {
        let frame = PageFrame::print(&crate::geometry::PrintSpec::default());
        let mut first = Canvas::new(frame);
        let image = RasterImage::decode(&fixtures::png(30, 60)).unwrap();
        let placed = first.draw_image(image, frame.safe());
        assert!(frame.safe().contains(&placed));
        first.fill_rect_translucent(frame.safe(), Rgb::BLACK, 0.4);
        let second = Canvas::new(frame);

        let doc = build_document(vec![first, second]).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);

        let page_id = pages[&1];
        let page = doc.get_dictionary(page_id).unwrap();
        assert!(page.has(b"TrimBox"));
        let media = page.get(b"MediaBox").unwrap().as_array().unwrap();
        assert_eq!(media[2].as_float().unwrap(), 630.0);
    }
}
