//! Page compositor: lays out one logical page (or page pair) per call
//!
//! Every function returns a standalone document. A compositor call fails
//! only when an image cannot be decoded; empty optional text is fine and
//! a missing illustration renders a marked placeholder.

use lopdf::Document;
use shared::{BookContent, StoryPage};
use tracing::instrument;

use crate::canvas::{Align, Canvas, build_document};
use crate::error::PdfResult;
use crate::geometry::{PageFrame, PrintSpec, Rect, SAFE_MARGIN};
use crate::palette::{CoverColor, CoverStyle, Rgb, TextColor};
use crate::raster::RasterImage;
use crate::text::{Font, LEADING, fit_block, fit_line};

const PLACEHOLDER_LABEL: &str = "Illustration unavailable";
const IMPRINT: &str = "Made with Doodle";
const BAND_ALPHA: f32 = 0.55;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverSide {
    Front,
    Back,
}

/// Optional decorative art for covers
#[derive(Debug, Clone, Copy, Default)]
pub struct CoverArt<'a> {
    /// Generated hero illustration
    pub hero: Option<&'a [u8]>,
    /// The child's original drawing
    pub original: Option<&'a [u8]>,
}

/// How a story page is laid out in the interior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteriorLayout {
    /// Illustration above caption on one page
    Single,
    /// Illustration page followed by a text page
    Spread,
}

impl InteriorLayout {
    pub fn page_count(&self) -> usize {
        match self {
            Self::Single => 1,
            Self::Spread => 2,
        }
    }
}

// ============================================================================
// Covers
// ============================================================================

/// Front or back cover on a digital (no bleed) page
#[instrument(skip(content, art), fields(title = %content.title))]
pub fn compose_cover_page(
    content: &BookContent,
    cover_color_id: &str,
    text_color_id: &str,
    side: CoverSide,
    art: CoverArt<'_>,
) -> PdfResult<Document> {
    let style = CoverStyle::new(
        CoverColor::from_id_or_default(cover_color_id),
        TextColor::from_id_or_default(text_color_id),
    );
    let frame = PageFrame::digital();
    let mut canvas = Canvas::new(frame);
    match side {
        CoverSide::Front => draw_front_cover(&mut canvas, frame.media(), frame.trim(), style, content, art)?,
        CoverSide::Back => draw_back_cover(&mut canvas, frame.media(), frame.trim(), style, content, art, true)?,
    }
    build_document(vec![canvas])
}

/// Provider full-wrap cover: back panel, spine, front panel on one page
#[instrument(skip(content, art), fields(title = %content.title))]
pub fn compose_cover_wrap(
    content: &BookContent,
    cover_color_id: &str,
    text_color_id: &str,
    art: CoverArt<'_>,
    spec: &PrintSpec,
) -> PdfResult<Document> {
    let style = CoverStyle::new(
        CoverColor::from_id_or_default(cover_color_id),
        TextColor::from_id_or_default(text_color_id),
    );
    let frame = spec.cover_wrap();
    let mut canvas = Canvas::new(frame);

    let back = spec.wrap_back_panel();
    let front = spec.wrap_front_panel();
    let back_trim = Rect::new(spec.bleed, spec.bleed, spec.trim, spec.trim);
    let front_trim = Rect::new(front.x, spec.bleed, spec.trim, spec.trim);

    draw_back_cover(&mut canvas, back, back_trim, style, content, art, false)?;
    canvas.fill_rect(spec.wrap_spine(), style.background);
    draw_front_cover(&mut canvas, front, front_trim, style, content, art)?;

    build_document(vec![canvas])
}

/// `fill` is painted edge to edge; content stays inside `trim`'s safe area.
fn draw_front_cover(
    canvas: &mut Canvas,
    fill: Rect,
    trim: Rect,
    style: CoverStyle,
    content: &BookContent,
    art: CoverArt<'_>,
) -> PdfResult<()> {
    let safe = trim.inset(SAFE_MARGIN);
    canvas.fill_rect(fill, style.background);

    if let Some(bytes) = art.hero.or(art.original) {
        let region = safe.top_part(0.72);
        canvas.draw_image(RasterImage::decode(bytes)?, region);
    }

    let band = Rect::new(trim.x, safe.y, trim.width, safe.height * 0.24);
    canvas.fill_rect_translucent(band, style.band(), BAND_ALPHA);

    let title = fit_line(&content.title, Font::Bold, safe.width, 44.0, 14.0);
    canvas.draw_text(
        &title.text,
        Font::Bold,
        title.size,
        band.center_x(),
        band.y + band.height * 0.52,
        Align::Center,
        style.text,
    );

    let byline = content.byline();
    if !byline.is_empty() {
        let byline = fit_line(&format!("by {byline}"), Font::Regular, safe.width, 20.0, 9.0);
        canvas.draw_text(
            &byline.text,
            Font::Regular,
            byline.size,
            band.center_x(),
            band.y + band.height * 0.2,
            Align::Center,
            style.text,
        );
    }
    Ok(())
}

fn draw_back_cover(
    canvas: &mut Canvas,
    fill: Rect,
    trim: Rect,
    style: CoverStyle,
    content: &BookContent,
    art: CoverArt<'_>,
    with_dedication: bool,
) -> PdfResult<()> {
    let safe = trim.inset(SAFE_MARGIN);
    canvas.fill_rect(fill, style.background);

    if let Some(bytes) = art.original {
        let region = safe.top_part(0.45);
        let placed = canvas.draw_image(RasterImage::decode(bytes)?, region);
        canvas.draw_text(
            "The original drawing",
            Font::Regular,
            11.0,
            safe.center_x(),
            placed.y - 16.0,
            Align::Center,
            style.text,
        );
    }

    if with_dedication {
        if let Some(dedication) = content.dedication.as_deref().filter(|d| !d.trim().is_empty()) {
            let region = Rect::new(safe.x, safe.y + safe.height * 0.18, safe.width, safe.height * 0.28);
            draw_block_centered(canvas, dedication, Font::Regular, region, 16.0, 9.0, style.text);
        }
    }

    let credit = fit_line(
        &format!("Story and pictures by {}", content.byline()),
        Font::Regular,
        safe.width,
        13.0,
        8.0,
    );
    canvas.draw_text(
        &credit.text,
        Font::Regular,
        credit.size,
        safe.center_x(),
        safe.y + 22.0,
        Align::Center,
        style.text,
    );
    canvas.draw_text(IMPRINT, Font::Bold, 9.0, safe.center_x(), safe.y + 4.0, Align::Center, style.text);
    Ok(())
}

// ============================================================================
// Interior
// ============================================================================

/// One story page. `Single` yields one page, `Spread` an illustration page
/// followed by a text page. `first_folio` is the running number of the first page.
#[instrument(skip(page, image), fields(page_number = page.page_number))]
pub fn compose_interior_page(
    page: &StoryPage,
    image: Option<&[u8]>,
    layout: InteriorLayout,
    frame: PageFrame,
    first_folio: u32,
) -> PdfResult<Document> {
    let raster = image.map(RasterImage::decode).transpose()?;
    let safe = frame.safe();

    let canvases = match layout {
        InteriorLayout::Single => {
            let mut canvas = Canvas::new(frame);
            let art = Rect::new(safe.x, safe.y + safe.height * 0.3, safe.width, safe.height * 0.7);
            draw_illustration(&mut canvas, raster, art, page.page_number);
            let caption = safe.bottom_part(0.26);
            draw_block_centered(&mut canvas, &page.text, Font::Regular, caption, 18.0, 9.0, Rgb::INK);
            draw_folio(&mut canvas, first_folio);
            vec![canvas]
        }
        InteriorLayout::Spread => {
            let mut art_page = Canvas::new(frame);
            draw_illustration(&mut art_page, raster, safe, page.page_number);
            draw_folio(&mut art_page, first_folio);

            let mut text_page = Canvas::new(frame);
            let region = safe.inset(24.0);
            draw_block_centered(&mut text_page, &page.text, Font::Regular, region, 26.0, 11.0, Rgb::INK);
            draw_folio(&mut text_page, first_folio + 1);
            vec![art_page, text_page]
        }
    };
    build_document(canvases)
}

/// Book title and byline
pub fn compose_title_page(content: &BookContent, frame: PageFrame) -> PdfResult<Document> {
    let safe = frame.safe();
    let mut canvas = Canvas::new(frame);
    let title_region = Rect::new(safe.x, safe.center_y(), safe.width, safe.height * 0.3);
    draw_block_centered(&mut canvas, &content.title, Font::Bold, title_region, 40.0, 16.0, Rgb::INK);

    let byline = fit_line(&format!("by {}", content.byline()), Font::Regular, safe.width, 20.0, 9.0);
    canvas.draw_text(
        &byline.text,
        Font::Regular,
        byline.size,
        safe.center_x(),
        safe.center_y() - 36.0,
        Align::Center,
        Rgb::INK,
    );
    build_document(vec![canvas])
}

/// Dedication text; an empty dedication yields an empty page
pub fn compose_dedication_page(content: &BookContent, frame: PageFrame) -> PdfResult<Document> {
    let safe = frame.safe();
    let mut canvas = Canvas::new(frame);
    if let Some(text) = content.dedication.as_deref() {
        let region = Rect::new(safe.x, safe.y + safe.height * 0.3, safe.width, safe.height * 0.4);
        draw_block_centered(&mut canvas, text, Font::Regular, region, 20.0, 10.0, Rgb::INK);
    }
    build_document(vec![canvas])
}

/// Closing credits page
pub fn compose_colophon_page(content: &BookContent, frame: PageFrame) -> PdfResult<Document> {
    let safe = frame.safe();
    let mut canvas = Canvas::new(frame);
    let lines = [
        (fit_line(&content.title, Font::Bold, safe.width, 18.0, 9.0), Font::Bold),
        (
            fit_line(
                &format!("Story and pictures by {}", content.byline()),
                Font::Regular,
                safe.width,
                13.0,
                8.0,
            ),
            Font::Regular,
        ),
        (fit_line(IMPRINT, Font::Regular, safe.width, 11.0, 8.0), Font::Regular),
    ];
    let mut y = safe.y + safe.height * 0.3;
    for (line, font) in lines {
        canvas.draw_text(&line.text, font, line.size, safe.center_x(), y, Align::Center, Rgb::INK);
        y -= line.size * LEADING + 6.0;
    }
    build_document(vec![canvas])
}

pub fn compose_blank_page(frame: PageFrame) -> PdfResult<Document> {
    build_document(vec![Canvas::new(frame)])
}

// ============================================================================
// Helpers
// ============================================================================

fn draw_illustration(canvas: &mut Canvas, raster: Option<RasterImage>, region: Rect, page_number: u32) {
    match raster {
        Some(raster) => {
            canvas.draw_image(raster, region);
        }
        None => {
            tracing::warn!(page_number, "Story page has no illustration, drawing placeholder");
            canvas.fill_rect(region, Rgb::PLACEHOLDER);
            canvas.draw_text(
                PLACEHOLDER_LABEL,
                Font::Bold,
                16.0,
                region.center_x(),
                region.center_y(),
                Align::Center,
                Rgb::PLACEHOLDER_INK,
            );
        }
    }
}

/// Wrap `text` into `region`, lines centered and the block vertically centered
fn draw_block_centered(
    canvas: &mut Canvas,
    text: &str,
    font: Font,
    region: Rect,
    max_size: f32,
    min_size: f32,
    color: Rgb,
) {
    let block = fit_block(text, font, region.width, region.height, max_size, min_size);
    if block.lines.is_empty() {
        return;
    }
    let top = region.center_y() + block.height() / 2.0;
    let first_baseline = top - block.size;
    canvas.draw_lines(
        &block.lines,
        font,
        block.size,
        block.line_height(),
        region.center_x(),
        first_baseline,
        Align::Center,
        color,
    );
}

fn draw_folio(canvas: &mut Canvas, folio: u32) {
    let safe = canvas.frame().safe();
    canvas.draw_text(
        &folio.to_string(),
        Font::Regular,
        10.0,
        safe.center_x(),
        safe.y - 18.0,
        Align::Center,
        Rgb::INK,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PdfError;
    use crate::raster::fixtures;

    fn content() -> BookContent {
        BookContent {
            title: "The Dragon Who Painted the Sky".to_string(),
            artist_name: "Mia".to_string(),
            artist_age: Some("age 6".to_string()),
            dedication: Some("For Grandma".to_string()),
            hero_image_path: None,
            original_image_path: None,
            pages: vec![StoryPage {
                page_number: 1,
                text: "Once upon a time.".to_string(),
                image_path: Some("p1.png".to_string()),
            }],
        }
    }

    #[test]
    fn test_cover_pages_are_single_page() {
        let c = content();
        let png = fixtures::png(16, 16);
        let art = CoverArt {
            hero: Some(png.as_slice()),
            original: Some(png.as_slice()),
        };
        for side in [CoverSide::Front, CoverSide::Back] {
            let doc = compose_cover_page(&c, "coral", "navy", side, art).unwrap();
            assert_eq!(doc.get_pages().len(), 1);
        }
    }

    #[test]
    fn test_cover_without_art_or_text() {
        let mut c = content();
        c.title.clear();
        c.artist_name.clear();
        c.artist_age = None;
        c.dedication = None;
        let doc = compose_cover_page(&c, "", "", CoverSide::Front, CoverArt::default()).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_cover_with_corrupt_art_fails() {
        let c = content();
        let art = CoverArt {
            hero: Some(&b"garbage"[..]),
            original: None,
        };
        let err = compose_cover_page(&c, "sky", "white", CoverSide::Front, art).unwrap_err();
        assert!(matches!(err, PdfError::Image(_)));
    }

    #[test]
    fn test_interior_layouts() {
        let c = content();
        let png = fixtures::png(12, 8);
        let single =
            compose_interior_page(&c.pages[0], Some(png.as_slice()), InteriorLayout::Single, PageFrame::digital(), 1)
                .unwrap();
        assert_eq!(single.get_pages().len(), 1);

        let spec = PrintSpec::default();
        let spread =
            compose_interior_page(&c.pages[0], Some(png.as_slice()), InteriorLayout::Spread, PageFrame::print(&spec), 3)
                .unwrap();
        assert_eq!(spread.get_pages().len(), InteriorLayout::Spread.page_count());
    }

    #[test]
    fn test_missing_illustration_renders_placeholder() {
        let c = content();
        let doc =
            compose_interior_page(&c.pages[0], None, InteriorLayout::Single, PageFrame::digital(), 1).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_wrap_cover_dimensions() {
        let spec = PrintSpec::default();
        let doc = compose_cover_wrap(&content(), "mint", "charcoal", CoverArt::default(), &spec).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let page = doc.get_dictionary(pages[&1]).unwrap();
        let media = page.get(b"MediaBox").unwrap().as_array().unwrap();
        let width = media[2].as_float().unwrap();
        assert!((width - spec.cover_wrap().width).abs() < 0.01);
    }

    #[test]
    fn test_front_matter_pages() {
        let c = content();
        let frame = PageFrame::print(&PrintSpec::default());
        assert_eq!(compose_title_page(&c, frame).unwrap().get_pages().len(), 1);
        assert_eq!(compose_dedication_page(&c, frame).unwrap().get_pages().len(), 1);
        assert_eq!(compose_colophon_page(&c, frame).unwrap().get_pages().len(), 1);
        assert_eq!(compose_blank_page(frame).unwrap().get_pages().len(), 1);
    }
}
