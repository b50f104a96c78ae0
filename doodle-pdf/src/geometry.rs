//! Page geometry in PDF points (1/72 inch)

pub const POINTS_PER_INCH: f32 = 72.0;

/// 8.5" square trim
pub const TRIM_SIZE: f32 = 8.5 * POINTS_PER_INCH;

/// 0.125" bleed on every edge of print pages
pub const BLEED: f32 = 0.125 * POINTS_PER_INCH;

/// Inner margin between trim edge and live content
pub const SAFE_MARGIN: f32 = 0.5 * POINTS_PER_INCH;

/// Target raster resolution
pub const PRINT_DPI: f32 = 300.0;

/// Axis-aligned rectangle, origin bottom-left (PDF user space)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Shrink by `d` on every side (clamped to zero size)
    pub fn inset(&self, d: f32) -> Self {
        Self {
            x: self.x + d,
            y: self.y + d,
            width: (self.width - 2.0 * d).max(0.0),
            height: (self.height - 2.0 * d).max(0.0),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn top(&self) -> f32 {
        self.y + self.height
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    /// Top `fraction` of this rect
    pub fn top_part(&self, fraction: f32) -> Self {
        let h = self.height * fraction;
        Self::new(self.x, self.top() - h, self.width, h)
    }

    /// Bottom `fraction` of this rect
    pub fn bottom_part(&self, fraction: f32) -> Self {
        Self::new(self.x, self.y, self.width, self.height * fraction)
    }

    pub fn contains(&self, other: &Rect) -> bool {
        const EPS: f32 = 0.01;
        other.x >= self.x - EPS
            && other.y >= self.y - EPS
            && other.right() <= self.right() + EPS
            && other.top() <= self.top() + EPS
    }
}

/// Scale an image of `img_w`×`img_h` pixels to fit `region`, preserving
/// aspect ratio, centered.
pub fn fit_within(img_w: u32, img_h: u32, region: Rect) -> Rect {
    if img_w == 0 || img_h == 0 {
        return Rect::new(region.center_x(), region.center_y(), 0.0, 0.0);
    }
    let scale = (region.width / img_w as f32).min(region.height / img_h as f32);
    let w = img_w as f32 * scale;
    let h = img_h as f32 * scale;
    Rect::new(
        region.x + (region.width - w) / 2.0,
        region.y + (region.height - h) / 2.0,
        w,
        h,
    )
}

/// Physical page: media box plus the bleed that surrounds the trim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFrame {
    pub width: f32,
    pub height: f32,
    pub bleed: f32,
}

impl PageFrame {
    /// Square screen page, no bleed
    pub fn digital() -> Self {
        Self {
            width: TRIM_SIZE,
            height: TRIM_SIZE,
            bleed: 0.0,
        }
    }

    /// Trim plus bleed on every edge
    pub fn print(spec: &PrintSpec) -> Self {
        Self {
            width: spec.trim + 2.0 * spec.bleed,
            height: spec.trim + 2.0 * spec.bleed,
            bleed: spec.bleed,
        }
    }

    pub fn media(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }

    pub fn trim(&self) -> Rect {
        self.media().inset(self.bleed)
    }

    /// Area guaranteed to survive trimming
    pub fn safe(&self) -> Rect {
        self.trim().inset(SAFE_MARGIN)
    }
}

/// Print provider's manufacturing contract
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrintSpec {
    /// Trim edge length (square book)
    pub trim: f32,
    pub bleed: f32,
    /// Exact interior page count the provider manufactures
    pub interior_pages: usize,
    /// Paper thickness: pages per inch of spine
    pub pages_per_inch: f32,
    /// Fixed spine allowance, inches
    pub spine_allowance_in: f32,
}

impl Default for PrintSpec {
    fn default() -> Self {
        Self {
            trim: TRIM_SIZE,
            bleed: BLEED,
            interior_pages: 32,
            pages_per_inch: 444.0,
            spine_allowance_in: 0.06,
        }
    }
}

impl PrintSpec {
    /// Spine width in points
    pub fn spine_width(&self) -> f32 {
        (self.interior_pages as f32 / self.pages_per_inch + self.spine_allowance_in)
            * POINTS_PER_INCH
    }

    /// Full-wrap cover: bleed + back + spine + front + bleed
    pub fn cover_wrap(&self) -> PageFrame {
        PageFrame {
            width: 2.0 * self.bleed + 2.0 * self.trim + self.spine_width(),
            height: 2.0 * self.bleed + self.trim,
            bleed: self.bleed,
        }
    }

    /// Back cover panel of the wrap, including the outer bleed
    pub fn wrap_back_panel(&self) -> Rect {
        Rect::new(0.0, 0.0, self.bleed + self.trim, 2.0 * self.bleed + self.trim)
    }

    pub fn wrap_spine(&self) -> Rect {
        Rect::new(
            self.bleed + self.trim,
            0.0,
            self.spine_width(),
            2.0 * self.bleed + self.trim,
        )
    }

    /// Front cover panel of the wrap, including the outer bleed
    pub fn wrap_front_panel(&self) -> Rect {
        let spine = self.wrap_spine();
        Rect::new(spine.right(), 0.0, self.trim + self.bleed, spine.height)
    }
}

/// Largest pixel edge worth embedding for a page of `points` width
pub fn max_raster_edge(points: f32) -> u32 {
    (points / POINTS_PER_INCH * PRINT_DPI).ceil() as u32
}
