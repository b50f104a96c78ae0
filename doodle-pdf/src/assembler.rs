//! Document assembler: one complete document per channel
//!
//! Sub-documents are generated one at a time, in output order, and merged
//! with [`merge_documents`]. Every result is re-parsed and its page count
//! checked before it is returned.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object, StringFormat};
use shared::{BookContent, Channel};
use tracing::instrument;

use crate::compositor::{
    CoverArt, CoverSide, InteriorLayout, compose_blank_page, compose_colophon_page,
    compose_cover_page, compose_cover_wrap, compose_dedication_page, compose_interior_page,
    compose_title_page,
};
use crate::error::{PdfError, PdfResult};
use crate::geometry::{PageFrame, PrintSpec};
use crate::merge::merge_documents;

/// Title, dedication and colophon pages of the print interior
const PRINT_FRONT_BACK_MATTER: usize = 3;

/// Raw image bytes resolved for one run
#[derive(Debug, Clone, Default)]
pub struct BookAssets {
    pub hero: Option<Vec<u8>>,
    pub original: Option<Vec<u8>>,
    /// Story page number → illustration bytes
    pub pages: BTreeMap<u32, Vec<u8>>,
}

impl BookAssets {
    pub fn cover_art(&self) -> CoverArt<'_> {
        CoverArt {
            hero: self.hero.as_deref(),
            original: self.original.as_deref(),
        }
    }

    pub fn page_image(&self, page_number: u32) -> Option<&[u8]> {
        self.pages.get(&page_number).map(Vec::as_slice)
    }
}

/// Per-order rendering choices
#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    pub cover_color_id: String,
    pub text_color_id: String,
    pub print: PrintSpec,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            cover_color_id: "sky".to_string(),
            text_color_id: "white".to_string(),
            print: PrintSpec::default(),
        }
    }
}

/// Serialized document plus the numbers used for verification and logging
#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

impl AssembledDocument {
    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Channel-specific output
#[derive(Debug, Clone)]
pub enum AssembledBook {
    /// Single merged ebook: front cover, interior, back cover
    Digital { book: AssembledDocument },
    /// Interior-only file plus the provider's full-wrap cover
    Physical {
        interior: AssembledDocument,
        cover: AssembledDocument,
    },
}

/// Page count of the digital ebook for `story_pages` story pages
pub fn digital_page_count(story_pages: usize) -> usize {
    story_pages + 2
}

/// Longest story the print interior can hold
pub fn max_print_story_pages(spec: &PrintSpec) -> usize {
    spec.interior_pages.saturating_sub(PRINT_FRONT_BACK_MATTER) / InteriorLayout::Spread.page_count()
}

/// Build every document the channel needs
pub fn assemble(
    channel: Channel,
    content: &BookContent,
    assets: &BookAssets,
    options: &AssemblyOptions,
) -> PdfResult<AssembledBook> {
    match channel {
        Channel::Digital => Ok(AssembledBook::Digital {
            book: assemble_digital(content, assets, options)?,
        }),
        Channel::Physical => {
            let interior = assemble_print_interior(content, assets, &options.print)?;
            let cover = assemble_print_cover(content, assets, options)?;
            Ok(AssembledBook::Physical { interior, cover })
        }
    }
}

/// Front cover, one page per story page, back cover
#[instrument(skip_all, fields(title = %content.title, pages = content.pages.len()))]
pub fn assemble_digital(
    content: &BookContent,
    assets: &BookAssets,
    options: &AssemblyOptions,
) -> PdfResult<AssembledDocument> {
    ensure_story_images(content, assets)?;
    let frame = PageFrame::digital();

    let mut parts = Vec::with_capacity(content.pages.len() + 2);
    parts.push(compose_cover_page(
        content,
        &options.cover_color_id,
        &options.text_color_id,
        CoverSide::Front,
        assets.cover_art(),
    )?);
    for page in &content.pages {
        parts.push(compose_interior_page(
            page,
            assets.page_image(page.page_number),
            InteriorLayout::Single,
            frame,
            page.page_number,
        )?);
    }
    parts.push(compose_cover_page(
        content,
        &options.cover_color_id,
        &options.text_color_id,
        CoverSide::Back,
        assets.cover_art(),
    )?);

    let doc = merge_documents(parts)?;
    let assembled = finalize(doc, content, digital_page_count(content.pages.len()))?;
    tracing::info!(
        page_count = assembled.page_count,
        byte_size = assembled.byte_size(),
        "Assembled digital book"
    );
    Ok(assembled)
}

/// Interior to the provider's exact page count: title, dedication, one
/// spread per story page, colophon, blank padding.
#[instrument(skip_all, fields(title = %content.title, pages = content.pages.len()))]
pub fn assemble_print_interior(
    content: &BookContent,
    assets: &BookAssets,
    spec: &PrintSpec,
) -> PdfResult<AssembledDocument> {
    let max = max_print_story_pages(spec);
    if content.pages.len() > max {
        return Err(PdfError::CapacityExceeded {
            pages: content.pages.len(),
            max,
        });
    }
    ensure_story_images(content, assets)?;
    let frame = PageFrame::print(spec);

    let mut parts = Vec::with_capacity(spec.interior_pages);
    parts.push(compose_title_page(content, frame)?);
    parts.push(compose_dedication_page(content, frame)?);

    let mut folio = 3;
    for page in &content.pages {
        parts.push(compose_interior_page(
            page,
            assets.page_image(page.page_number),
            InteriorLayout::Spread,
            frame,
            folio,
        )?);
        folio += InteriorLayout::Spread.page_count() as u32;
    }
    parts.push(compose_colophon_page(content, frame)?);

    let used = PRINT_FRONT_BACK_MATTER + content.pages.len() * InteriorLayout::Spread.page_count();
    for _ in used..spec.interior_pages {
        parts.push(compose_blank_page(frame)?);
    }

    let doc = merge_documents(parts)?;
    let assembled = finalize(doc, content, spec.interior_pages)?;
    tracing::info!(
        page_count = assembled.page_count,
        byte_size = assembled.byte_size(),
        padding = spec.interior_pages - used,
        "Assembled print interior"
    );
    Ok(assembled)
}

/// Single-page full-wrap cover with bleed and spine
#[instrument(skip_all, fields(title = %content.title))]
pub fn assemble_print_cover(
    content: &BookContent,
    assets: &BookAssets,
    options: &AssemblyOptions,
) -> PdfResult<AssembledDocument> {
    let doc = compose_cover_wrap(
        content,
        &options.cover_color_id,
        &options.text_color_id,
        assets.cover_art(),
        &options.print,
    )?;
    let assembled = finalize(doc, content, 1)?;
    tracing::info!(byte_size = assembled.byte_size(), "Assembled print cover");
    Ok(assembled)
}

/// Story page illustrations are mandatory; fail before rendering anything.
fn ensure_story_images(content: &BookContent, assets: &BookAssets) -> PdfResult<()> {
    if content.pages.is_empty() {
        return Err(PdfError::EmptyBook);
    }
    match content
        .pages
        .iter()
        .find(|page| assets.page_image(page.page_number).is_none())
    {
        Some(page) => Err(PdfError::MissingPageImage(page.page_number)),
        None => Ok(()),
    }
}

/// PDF text string: ASCII as-is, anything else UTF-16BE with BOM
fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::String(s.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn info_dictionary(content: &BookContent) -> Dictionary {
    let mut info = Dictionary::new();
    info.set("Title", text_string(&content.title));
    info.set("Author", text_string(&content.byline()));
    info.set("Creator", text_string("Doodle"));
    info.set(
        "Producer",
        text_string(concat!("doodle-pdf ", env!("CARGO_PKG_VERSION"))),
    );
    let now = chrono::Utc::now().format("D:%Y%m%d%H%M%SZ").to_string();
    info.set("CreationDate", text_string(&now));
    info
}

/// Attach metadata, serialize, and verify the page count of the bytes.
fn finalize(mut doc: Document, content: &BookContent, expected: usize) -> PdfResult<AssembledDocument> {
    let info_id = doc.add_object(info_dictionary(content));
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;

    let page_count = Document::load_mem(&bytes)?.get_pages().len();
    if page_count != expected {
        return Err(PdfError::PageCountMismatch {
            expected,
            actual: page_count,
        });
    }
    Ok(AssembledDocument { bytes, page_count })
}
