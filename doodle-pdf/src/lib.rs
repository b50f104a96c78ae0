//! # doodle-pdf
//!
//! Book document library - page layout and PDF assembly only.
//!
//! ## Scope
//!
//! This crate handles HOW a book becomes a document:
//! - Page geometry (trim, bleed, spine) and colour palettes
//! - Raster decode / downscale / JPEG re-encode for embedding
//! - Text fitting for the standard Helvetica faces (WinAnsi)
//! - Page composition (covers, story pages, front/back matter)
//! - Page-preserving merge and per-channel assembly
//!
//! Fetching images, storing artifacts and order bookkeeping stay in the
//! service (`doodle-cloud`). Nothing here performs I/O.
//!
//! ## Example
//!
//! ```ignore
//! use doodle_pdf::{AssemblyOptions, BookAssets, assemble_digital};
//!
//! let book = assemble_digital(&content, &assets, &AssemblyOptions::default())?;
//! assert_eq!(book.page_count, content.pages.len() + 2);
//! ```

mod assembler;
mod canvas;
mod compositor;
mod error;
mod geometry;
mod merge;
mod palette;
mod raster;
mod text;

// Re-exports
pub use assembler::{
    AssembledBook, AssembledDocument, AssemblyOptions, BookAssets, assemble, assemble_digital,
    assemble_print_cover, assemble_print_interior, digital_page_count, max_print_story_pages,
};
pub use canvas::{Align, Canvas, build_document};
pub use compositor::{
    CoverArt, CoverSide, InteriorLayout, compose_blank_page, compose_colophon_page,
    compose_cover_page, compose_cover_wrap, compose_dedication_page, compose_interior_page,
    compose_title_page,
};
pub use error::{PdfError, PdfResult};
pub use geometry::{BLEED, PageFrame, PrintSpec, Rect, TRIM_SIZE, fit_within};
pub use merge::merge_documents;
pub use palette::{CoverColor, CoverStyle, Rgb, TextColor};
pub use raster::RasterImage;
pub use text::{Font, fit_block, fit_line, sanitize};
