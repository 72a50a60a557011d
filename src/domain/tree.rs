//! The document tree handed from the tree builder to the renderer.
//!
//! Pages carry a resolved size in points and a flat flow of blocks whose
//! styles have already been inherited from their containers.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    /// Parse `#rgb` or `#rrggbb`.
    pub fn parse_hex(input: &str) -> Option<Self> {
        let hex = input.strip_prefix('#')?;
        if !hex.is_ascii() {
            return None;
        }
        match hex.len() {
            3 => {
                let mut channels = hex.chars().map(|c| c.to_digit(16).map(|d| (d * 17) as u8));
                Some(Self {
                    r: channels.next()??,
                    g: channels.next()??,
                    b: channels.next()??,
                })
            }
            6 => Some(Self {
                r: u8::from_str_radix(&hex[0..2], 16).ok()?,
                g: u8::from_str_radix(&hex[2..4], 16).ok()?,
                b: u8::from_str_radix(&hex[4..6], 16).ok()?,
            }),
            _ => None,
        }
    }

    /// Channels scaled to the `0.0..=1.0` range used by PDF colour operators.
    pub fn as_unit(self) -> (f32, f32, f32) {
        (
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font_size: f32,
    /// Multiplier applied to `font_size` to obtain the baseline advance.
    pub line_height: f32,
    pub color: Rgb,
    pub bold: bool,
    pub margin_top: f32,
    pub margin_bottom: f32,
    /// Left offset accumulated from enclosing containers plus the block's own margin.
    pub indent: f32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            line_height: 1.2,
            color: Rgb::BLACK,
            bold: false,
            margin_top: 0.0,
            margin_bottom: 0.0,
            indent: 0.0,
        }
    }
}

impl TextStyle {
    pub fn leading(&self) -> f32 {
        self.font_size * self.line_height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Text { text: String, style: TextStyle },
    /// Vertical whitespace left by container margins and padding.
    Spacer { height: f32 },
    PageBreak,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageTree {
    pub width: f32,
    pub height: f32,
    /// Uniform inset from every page edge.
    pub margin: f32,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentTree {
    pub metadata: DocumentMetadata,
    pub pages: Vec<PageTree>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "portrait" => Some(Self::Portrait),
            "landscape" => Some(Self::Landscape),
            _ => None,
        }
    }

    /// Orient a `(width, height)` pair; landscape puts the long edge horizontally.
    pub fn apply(self, (width, height): (f32, f32)) -> (f32, f32) {
        let (short, long) = if width <= height {
            (width, height)
        } else {
            (height, width)
        };
        match self {
            Orientation::Portrait => (short, long),
            Orientation::Landscape => (long, short),
        }
    }
}

/// Standard sheet sizes in points, portrait orientation.
const STANDARD_SIZES: &[(&str, (f32, f32))] = &[
    ("A0", (2383.94, 3370.39)),
    ("A1", (1683.78, 2383.94)),
    ("A2", (1190.55, 1683.78)),
    ("A3", (841.89, 1190.55)),
    ("A4", (595.28, 841.89)),
    ("A5", (419.53, 595.28)),
    ("A6", (297.64, 419.53)),
    ("A7", (209.76, 297.64)),
    ("A8", (147.40, 209.76)),
    ("A9", (104.88, 147.40)),
    ("A10", (73.70, 104.88)),
    ("B0", (2834.65, 4008.19)),
    ("B1", (2004.09, 2834.65)),
    ("B2", (1417.32, 2004.09)),
    ("B3", (1000.63, 1417.32)),
    ("B4", (708.66, 1000.63)),
    ("B5", (498.90, 708.66)),
    ("B6", (354.33, 498.90)),
    ("B7", (249.45, 354.33)),
    ("B8", (175.75, 249.45)),
    ("B9", (124.72, 175.75)),
    ("B10", (87.87, 124.72)),
    ("LETTER", (612.0, 792.0)),
    ("LEGAL", (612.0, 1008.0)),
    ("TABLOID", (792.0, 1224.0)),
    ("EXECUTIVE", (521.86, 756.0)),
    ("FOLIO", (612.0, 936.0)),
    ("ID1", (153.0, 243.0)),
];

pub const DEFAULT_PAGE_SIZE: (f32, f32) = (595.28, 841.89);

/// Look up a named sheet size, ignoring case.
pub fn standard_page_size(name: &str) -> Option<(f32, f32)> {
    STANDARD_SIZES
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
        .map(|(_, size)| *size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_hex_colours() {
        assert_eq!(Rgb::parse_hex("#fff"), Some(Rgb { r: 255, g: 255, b: 255 }));
        assert_eq!(Rgb::parse_hex("#336699"), Some(Rgb { r: 0x33, g: 0x66, b: 0x99 }));
        assert_eq!(Rgb::parse_hex("336699"), None);
        assert_eq!(Rgb::parse_hex("#12"), None);
        assert_eq!(Rgb::parse_hex("#gggggg"), None);
    }

    #[test]
    fn page_sizes_are_case_insensitive() {
        assert_eq!(standard_page_size("letter"), Some((612.0, 792.0)));
        assert_eq!(standard_page_size("A4"), Some(DEFAULT_PAGE_SIZE));
        assert_eq!(standard_page_size("A11"), None);
    }

    #[test]
    fn landscape_swaps_to_long_edge_horizontal() {
        let letter = (612.0, 792.0);
        assert_eq!(Orientation::Landscape.apply(letter), (792.0, 612.0));
        assert_eq!(Orientation::Portrait.apply((792.0, 612.0)), letter);
    }
}
