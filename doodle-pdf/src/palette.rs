//! Cover and text colour palettes

/// RGB colour, components in 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const fn from_u8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
        }
    }

    pub const WHITE: Rgb = Rgb::from_u8(255, 255, 255);
    pub const BLACK: Rgb = Rgb::from_u8(0, 0, 0);
    pub const INK: Rgb = Rgb::from_u8(40, 40, 48);
    pub const PLACEHOLDER: Rgb = Rgb::from_u8(226, 226, 230);
    pub const PLACEHOLDER_INK: Rgb = Rgb::from_u8(120, 120, 128);

    /// Relative luminance, used to pick a contrasting band colour
    pub fn luminance(&self) -> f32 {
        0.2126 * self.r + 0.7152 * self.g + 0.0722 * self.b
    }
}

/// Cover background choices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoverColor {
    #[default]
    Sky,
    Sunshine,
    Coral,
    Mint,
    Lavender,
    Midnight,
}

impl CoverColor {
    pub const ALL: [CoverColor; 6] = [
        CoverColor::Sky,
        CoverColor::Sunshine,
        CoverColor::Coral,
        CoverColor::Mint,
        CoverColor::Lavender,
        CoverColor::Midnight,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Self::Sky => "sky",
            Self::Sunshine => "sunshine",
            Self::Coral => "coral",
            Self::Mint => "mint",
            Self::Lavender => "lavender",
            Self::Midnight => "midnight",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        let id = id.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|c| c.id() == id)
    }

    /// Unknown ids fall back to the default with a warning
    pub fn from_id_or_default(id: &str) -> Self {
        Self::from_id(id).unwrap_or_else(|| {
            tracing::warn!(cover_color_id = id, "Unknown cover colour, using default");
            Self::default()
        })
    }

    pub fn rgb(&self) -> Rgb {
        match self {
            Self::Sky => Rgb::from_u8(135, 196, 235),
            Self::Sunshine => Rgb::from_u8(255, 214, 92),
            Self::Coral => Rgb::from_u8(250, 128, 114),
            Self::Mint => Rgb::from_u8(152, 222, 190),
            Self::Lavender => Rgb::from_u8(190, 170, 230),
            Self::Midnight => Rgb::from_u8(30, 40, 80),
        }
    }
}

/// Cover text choices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextColor {
    #[default]
    White,
    Charcoal,
    Navy,
    Cream,
}

impl TextColor {
    pub const ALL: [TextColor; 4] = [
        TextColor::White,
        TextColor::Charcoal,
        TextColor::Navy,
        TextColor::Cream,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Charcoal => "charcoal",
            Self::Navy => "navy",
            Self::Cream => "cream",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        let id = id.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|c| c.id() == id)
    }

    pub fn from_id_or_default(id: &str) -> Self {
        Self::from_id(id).unwrap_or_else(|| {
            tracing::warn!(text_color_id = id, "Unknown text colour, using default");
            Self::default()
        })
    }

    pub fn rgb(&self) -> Rgb {
        match self {
            Self::White => Rgb::WHITE,
            Self::Charcoal => Rgb::from_u8(54, 54, 60),
            Self::Navy => Rgb::from_u8(24, 38, 92),
            Self::Cream => Rgb::from_u8(255, 246, 222),
        }
    }
}

/// Colours used to draw one cover
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverStyle {
    pub background: Rgb,
    pub text: Rgb,
}

impl CoverStyle {
    pub fn new(cover: CoverColor, text: TextColor) -> Self {
        Self {
            background: cover.rgb(),
            text: text.rgb(),
        }
    }

    /// Band behind the title: dark under light text, light under dark text
    pub fn band(&self) -> Rgb {
        if self.text.luminance() > 0.5 {
            Rgb::BLACK
        } else {
            Rgb::WHITE
        }
    }
}

impl Default for CoverStyle {
    fn default() -> Self {
        Self::new(CoverColor::default(), TextColor::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_id_is_case_insensitive() {
        assert_eq!(CoverColor::from_id("Coral"), Some(CoverColor::Coral));
        assert_eq!(TextColor::from_id(" navy "), Some(TextColor::Navy));
        assert_eq!(CoverColor::from_id("plaid"), None);
    }

    #[test]
    fn test_unknown_falls_back_to_default() {
        assert_eq!(CoverColor::from_id_or_default("plaid"), CoverColor::Sky);
        assert_eq!(TextColor::from_id_or_default(""), TextColor::White);
    }

    #[test]
    fn test_band_contrasts_with_text() {
        let light = CoverStyle::new(CoverColor::Sky, TextColor::White);
        assert_eq!(light.band(), Rgb::BLACK);
        let dark = CoverStyle::new(CoverColor::Sky, TextColor::Navy);
        assert_eq!(dark.band(), Rgb::WHITE);
    }
}
