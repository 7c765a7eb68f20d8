//! Text measurement for layout
//!
//! Layout asks for text metrics synchronously, in the middle of solving the
//! flex tree, so measurement must never wait on anything. Fonts are
//! therefore preloaded into a [`FontRegistry`] before layout is requested;
//! a text node naming any other font fails the whole layout.
//!
//! [`ShapedTextMeasurer`] shapes each word with rustybuzz against the font
//! bytes loaded at preload time. [`EstimatedTextMeasurer`] needs no glyph
//! data and stands in where none is available.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use fontdb::{Database, Family, Query};
use rustc_hash::FxHashMap;
use rustybuzz::UnicodeBuffer;

use crate::error::{FlexError, Result};
use crate::style::{WhiteSpace, DEFAULT_FONT_SIZE, DEFAULT_LINE_HEIGHT};

/// Font used when a text node names none; always available
pub const DEFAULT_FONT: &str = "default";

/// Average glyph advance of the estimating measurer, in ems
pub const DEFAULT_CHAR_WIDTH: f64 = 0.55;

/// Text of one node plus the properties that affect its size
#[derive(Clone, Debug, PartialEq)]
pub struct TextStyle {
    pub text: String,
    pub font: Option<String>,
    pub font_size: f64,
    pub line_height: f64,
    pub letter_spacing: f64,
    pub white_space: WhiteSpace,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            text: String::new(),
            font: None,
            font_size: DEFAULT_FONT_SIZE,
            line_height: DEFAULT_LINE_HEIGHT,
            letter_spacing: 0.0,
            white_space: WhiteSpace::Normal,
        }
    }
}

impl TextStyle {
    pub fn font_name(&self) -> &str {
        self.font.as_deref().unwrap_or(DEFAULT_FONT)
    }

    pub fn wraps(&self) -> bool {
        self.white_space == WhiteSpace::Normal
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TextMetrics {
    pub width: f64,
    pub height: f64,
}

/// Synchronous text measurement
pub trait TextMeasurer {
    /// Fail early if `font` cannot be measured
    fn ensure_font(&self, _font: &str) -> Result<()> {
        Ok(())
    }

    /// Size of `text` laid out no wider than `max_width` (when wrapping)
    fn measure(&self, text: &TextStyle, max_width: Option<f64>) -> Result<TextMetrics>;
}

/// Fonts found at fixed paths without scanning the system
const KNOWN_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Helvetica.ttc",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const FONT_EXTENSIONS: &[&str] = &["ttf", "otf", "ttc", "otc"];

/// A parsed font face and the bytes it was parsed from
pub struct FontFace {
    name: String,
    data: Arc<Vec<u8>>,
    face_index: u32,
    units_per_em: u16,
}

impl FontFace {
    /// Parse TTF/OTF data; `face_index` selects a face in a collection
    pub fn from_data(name: impl Into<String>, data: Vec<u8>, face_index: u32) -> Result<Self> {
        let name = name.into();
        let units_per_em = ttf_parser::Face::parse(&data, face_index)
            .map_err(|error| FlexError::InvalidFont {
                font: name.clone(),
                message: error.to_string(),
            })?
            .units_per_em();
        Ok(Self {
            name,
            data: Arc::new(data),
            face_index,
            units_per_em,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    /// Advance of `text` shaped at `font_size`
    pub fn advance(&self, text: &str, font_size: f64) -> f64 {
        let units = match rustybuzz::Face::from_slice(&self.data, self.face_index) {
            Some(face) => {
                let mut buffer = UnicodeBuffer::new();
                buffer.push_str(text);
                rustybuzz::shape(&face, &[], buffer)
                    .glyph_positions()
                    .iter()
                    .map(|position| i64::from(position.x_advance))
                    .sum()
            }
            None => self.unshaped_advance(text),
        };
        units as f64 * font_size / f64::from(self.units_per_em)
    }

    /// Sum of nominal glyph advances, without kerning or ligatures
    fn unshaped_advance(&self, text: &str) -> i64 {
        let Ok(face) = ttf_parser::Face::parse(&self.data, self.face_index) else {
            return 0;
        };
        let missing = self.units_per_em / 2;
        text.chars()
            .map(|c| {
                let advance = face
                    .glyph_index(c)
                    .and_then(|glyph| face.glyph_hor_advance(glyph))
                    .unwrap_or(missing);
                i64::from(advance)
            })
            .sum()
    }
}

impl std::fmt::Debug for FontFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontFace")
            .field("name", &self.name)
            .field("face_index", &self.face_index)
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}

/// Fonts available to the measurer
///
/// A font is loaded by family name (looked up with fontdb, scanning the
/// system fonts on the first miss) or by path to a font file. Families that
/// cannot be found fall back to the default face.
pub struct FontRegistry {
    db: Database,
    system_scanned: bool,
    /// `None` when no glyph data is available and widths are estimated
    faces: FxHashMap<String, Option<Arc<FontFace>>>,
}

impl Default for FontRegistry {
    fn default() -> Self {
        let mut db = Database::new();
        for path in KNOWN_FONT_PATHS {
            if Path::new(path).is_file() && db.load_font_file(path).is_err() {
                tracing::debug!(path, "known font file unreadable");
            }
        }

        let mut registry = Self {
            db,
            system_scanned: false,
            faces: FxHashMap::default(),
        };
        let default = registry.default_face().map(Arc::new);
        if default.is_none() {
            tracing::debug!("no default font face found; text widths are estimated");
        }
        registry.faces.insert(DEFAULT_FONT.to_string(), default);
        registry
    }
}

impl std::fmt::Debug for FontRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontRegistry")
            .field("loaded", &self.loaded())
            .field("system_scanned", &self.system_scanned)
            .finish()
    }
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a font by family name or file path
    ///
    /// Returns false if the font was already loaded.
    pub fn load(&mut self, font: &str) -> Result<bool> {
        if self.faces.contains_key(font) {
            return Ok(false);
        }

        let path = Path::new(font);
        let is_file_name = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| FONT_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str()));
        let face = if is_file_name {
            let data = std::fs::read(path).map_err(|error| FlexError::InvalidFont {
                font: font.to_string(),
                message: error.to_string(),
            })?;
            Some(Arc::new(FontFace::from_data(font, data, 0)?))
        } else if let Some(face) = self.find_family(font) {
            Some(Arc::new(face))
        } else {
            tracing::warn!(font, "font family not found, falling back to the default face");
            self.faces.get(DEFAULT_FONT).cloned().flatten()
        };

        self.faces.insert(font.to_string(), face);
        tracing::debug!(font, "font preloaded");
        Ok(true)
    }

    /// Register font bytes under `font`, replacing any earlier face
    pub fn load_data(&mut self, font: impl Into<String>, data: Vec<u8>) -> Result<()> {
        let font = font.into();
        let face = FontFace::from_data(font.clone(), data, 0)?;
        self.faces.insert(font, Some(Arc::new(face)));
        Ok(())
    }

    pub fn is_loaded(&self, font: &str) -> bool {
        self.faces.contains_key(font)
    }

    /// Glyph data of a loaded font, if any was found
    pub fn face(&self, font: &str) -> Option<&Arc<FontFace>> {
        self.faces.get(font).and_then(Option::as_ref)
    }

    /// Loaded font names, sorted
    pub fn loaded(&self) -> Vec<String> {
        let mut fonts: Vec<String> = self.faces.keys().cloned().collect();
        fonts.sort();
        fonts
    }

    fn face_by_id(&self, name: &str, id: fontdb::ID) -> Option<FontFace> {
        self.db
            .with_face_data(id, |data, index| FontFace::from_data(name, data.to_vec(), index))
            .and_then(|face| face.ok())
    }

    fn find_family(&mut self, family: &str) -> Option<FontFace> {
        let families = [Family::Name(family)];
        let query = Query {
            families: &families,
            ..Query::default()
        };
        let id = match self.db.query(&query) {
            Some(id) => id,
            None => {
                self.scan_system_fonts();
                self.db.query(&query)?
            }
        };
        self.face_by_id(family, id)
    }

    fn default_face(&self) -> Option<FontFace> {
        let query = Query {
            families: &[Family::SansSerif],
            ..Query::default()
        };
        let id = self
            .db
            .query(&query)
            .or_else(|| self.db.faces().next().map(|face| face.id))?;
        self.face_by_id(DEFAULT_FONT, id)
    }

    fn scan_system_fonts(&mut self) {
        if self.system_scanned {
            return;
        }
        self.db.load_system_fonts();
        self.system_scanned = true;
        tracing::debug!(faces = self.db.len(), "system fonts scanned");
    }
}

/// A [`FontRegistry`] shared between a worker's modules
#[derive(Clone, Debug, Default)]
pub struct FontStore(Arc<RwLock<FontRegistry>>);

impl FontStore {
    /// Load every font, stopping at the first that cannot be read; returns
    /// every loaded font name
    pub fn preload<I, S>(&self, fonts: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = self.0.write().unwrap_or_else(PoisonError::into_inner);
        for font in fonts {
            registry.load(font.as_ref())?;
        }
        Ok(registry.loaded())
    }

    pub fn read<R>(&self, f: impl FnOnce(&FontRegistry) -> R) -> R {
        let registry = self.0.read().unwrap_or_else(PoisonError::into_inner);
        f(&registry)
    }
}

/// Greedy line breaking at whitespace, shared by the measurers
fn break_lines(
    text: &TextStyle,
    max_width: Option<f64>,
    space: f64,
    word_width: impl Fn(&str) -> f64,
) -> TextMetrics {
    if text.text.is_empty() {
        return TextMetrics::default();
    }

    let mut widest: f64 = 0.0;
    let mut lines = 0usize;
    for paragraph in text.text.split('\n') {
        lines += 1;
        let mut line: Option<f64> = None;
        for word in paragraph.split_whitespace() {
            let width = word_width(word);
            let Some(current) = line else {
                line = Some(width);
                continue;
            };
            let extended = current + space + width;
            match max_width {
                Some(max) if text.wraps() && extended > max => {
                    widest = widest.max(current);
                    lines += 1;
                    line = Some(width);
                }
                _ => line = Some(extended),
            }
        }
        widest = widest.max(line.unwrap_or(0.0));
    }

    TextMetrics {
        width: widest,
        height: lines as f64 * text.font_size * text.line_height,
    }
}

/// Measures text from shaped glyph advances of the preloaded faces
///
/// Fonts without glyph data are measured like [`EstimatedTextMeasurer`].
#[derive(Clone, Copy, Debug)]
pub struct ShapedTextMeasurer<'a> {
    fonts: &'a FontRegistry,
}

impl<'a> ShapedTextMeasurer<'a> {
    pub fn new(fonts: &'a FontRegistry) -> Self {
        Self { fonts }
    }
}

impl TextMeasurer for ShapedTextMeasurer<'_> {
    fn ensure_font(&self, font: &str) -> Result<()> {
        if self.fonts.is_loaded(font) {
            Ok(())
        } else {
            Err(FlexError::FontNotLoaded(font.to_string()))
        }
    }

    fn measure(&self, text: &TextStyle, max_width: Option<f64>) -> Result<TextMetrics> {
        self.ensure_font(text.font_name())?;
        let Some(face) = self.fonts.face(text.font_name()) else {
            return EstimatedTextMeasurer::new(self.fonts).measure(text, max_width);
        };

        let spacing = text.font_size * text.letter_spacing;
        let word_width =
            |word: &str| face.advance(word, text.font_size) + spacing * word.chars().count() as f64;
        let space = word_width(" ");
        Ok(break_lines(text, max_width, space, word_width))
    }
}

/// Measures text from an average glyph advance
///
/// Good enough for layout of UI labels without glyph data: every character
/// advances `char_width` ems plus the letter spacing, and lines break
/// greedily at whitespace.
#[derive(Clone, Copy, Debug)]
pub struct EstimatedTextMeasurer<'a> {
    fonts: &'a FontRegistry,
    char_width: f64,
}

impl<'a> EstimatedTextMeasurer<'a> {
    pub fn new(fonts: &'a FontRegistry) -> Self {
        Self {
            fonts,
            char_width: DEFAULT_CHAR_WIDTH,
        }
    }

    pub fn with_char_width(mut self, char_width: f64) -> Self {
        self.char_width = char_width;
        self
    }
}

impl TextMeasurer for EstimatedTextMeasurer<'_> {
    fn ensure_font(&self, font: &str) -> Result<()> {
        if self.fonts.is_loaded(font) {
            Ok(())
        } else {
            Err(FlexError::FontNotLoaded(font.to_string()))
        }
    }

    fn measure(&self, text: &TextStyle, max_width: Option<f64>) -> Result<TextMetrics> {
        self.ensure_font(text.font_name())?;

        let advance = text.font_size * (self.char_width + text.letter_spacing);
        let word_width = |word: &str| word.chars().count() as f64 * advance;
        Ok(break_lines(text, max_width, advance, word_width))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str) -> TextStyle {
        TextStyle {
            text: content.to_string(),
            font_size: 10.0,
            line_height: 1.0,
            ..TextStyle::default()
        }
    }

    #[test]
    fn test_single_line() {
        let fonts = FontRegistry::new();
        let metrics = EstimatedTextMeasurer::new(&fonts).measure(&text("abcd"), None).unwrap();
        assert_eq!(metrics, TextMetrics { width: 22.0, height: 10.0 });
    }

    #[test]
    fn test_wraps_at_whitespace() {
        let fonts = FontRegistry::new();
        let measurer = EstimatedTextMeasurer::new(&fonts).with_char_width(1.0);
        // "aa bb cc": every word 20 wide, space 10
        let metrics = measurer.measure(&text("aa bb cc"), Some(50.0)).unwrap();
        assert_eq!(metrics, TextMetrics { width: 50.0, height: 20.0 });

        let narrow = measurer.measure(&text("aa bb cc"), Some(0.0)).unwrap();
        assert_eq!(narrow, TextMetrics { width: 20.0, height: 30.0 });
    }

    #[test]
    fn test_nowrap_ignores_max_width() {
        let fonts = FontRegistry::new();
        let measurer = EstimatedTextMeasurer::new(&fonts).with_char_width(1.0);
        let style = TextStyle {
            white_space: WhiteSpace::Nowrap,
            ..text("aa bb")
        };
        let metrics = measurer.measure(&style, Some(10.0)).unwrap();
        assert_eq!(metrics.height, 10.0);
        assert_eq!(metrics.width, 50.0);
    }

    #[test]
    fn test_explicit_newlines() {
        let fonts = FontRegistry::new();
        let metrics = EstimatedTextMeasurer::new(&fonts)
            .with_char_width(1.0)
            .measure(&text("a\nbbb"), None)
            .unwrap();
        assert_eq!(metrics, TextMetrics { width: 30.0, height: 20.0 });
    }

    #[test]
    fn test_unknown_font_fails() {
        let mut fonts = FontRegistry::new();
        let style = TextStyle {
            font: Some("Roboto".to_string()),
            ..text("hi")
        };
        assert_eq!(
            EstimatedTextMeasurer::new(&fonts).measure(&style, None),
            Err(FlexError::FontNotLoaded("Roboto".to_string()))
        );
        assert!(fonts.load("Roboto").unwrap());
        assert!(!fonts.load("Roboto").unwrap());
        assert!(EstimatedTextMeasurer::new(&fonts).measure(&style, None).is_ok());
    }

    #[test]
    fn test_font_store_is_shared() {
        let store = FontStore::default();
        let clone = store.clone();
        assert_eq!(
            clone.preload(["Inter"]).unwrap(),
            vec!["Inter".to_string(), DEFAULT_FONT.to_string()]
        );
        assert!(store.read(|fonts| fonts.is_loaded("Inter")));
    }

    fn system_font() -> Option<&'static str> {
        KNOWN_FONT_PATHS.iter().copied().find(|path| Path::new(path).is_file())
    }

    #[test]
    fn test_invalid_font_data_is_rejected() {
        let mut fonts = FontRegistry::new();
        let result = fonts.load_data("Broken", vec![0; 64]);
        assert!(matches!(result, Err(FlexError::InvalidFont { ref font, .. }) if font == "Broken"));
        assert!(!fonts.is_loaded("Broken"));
    }

    #[test]
    fn test_missing_font_file_is_an_error() {
        let mut fonts = FontRegistry::new();
        let missing = "/nonexistent/troika/Missing.ttf";
        assert!(matches!(fonts.load(missing), Err(FlexError::InvalidFont { .. })));
        assert!(!fonts.is_loaded(missing));

        let store = FontStore::default();
        assert!(store.preload([missing]).is_err());
    }

    #[test]
    fn test_unknown_family_falls_back_to_default_face() {
        let mut fonts = FontRegistry::new();
        assert!(fonts.load("No Such Family 7f3a").unwrap());
        assert_eq!(
            fonts.face("No Such Family 7f3a").map(|face| face.name().to_string()),
            fonts.face(DEFAULT_FONT).map(|face| face.name().to_string())
        );

        // Measurable either way
        let style = TextStyle {
            font: Some("No Such Family 7f3a".to_string()),
            ..text("hello")
        };
        let metrics = ShapedTextMeasurer::new(&fonts).measure(&style, None).unwrap();
        assert!(metrics.width > 0.0);
        assert_eq!(metrics.height, 10.0);
    }

    #[test]
    fn test_shaped_widths_follow_glyph_advances() {
        let Some(path) = system_font() else {
            // No font files on this machine
            return;
        };
        let mut fonts = FontRegistry::new();
        assert!(fonts.load(path).unwrap());
        assert!(fonts.face(path).is_some_and(|face| face.units_per_em() > 0));

        let measurer = ShapedTextMeasurer::new(&fonts);
        let style = |content: &str| TextStyle {
            font: Some(path.to_string()),
            ..text(content)
        };
        let narrow = measurer.measure(&style("iiii"), None).unwrap();
        let wide = measurer.measure(&style("MMMM"), None).unwrap();
        assert!(narrow.width > 0.0);
        assert!(narrow.width < wide.width, "{narrow:?} vs {wide:?}");

        // Two words wrap when the line cannot hold both
        let wrapped = measurer.measure(&style("MMMM MMMM"), Some(wide.width + 1.0)).unwrap();
        assert_eq!(wrapped.height, 20.0);
        assert!((wrapped.width - wide.width).abs() < 1e-9);

        // Letter spacing adds one em fraction per character
        let spaced = TextStyle {
            letter_spacing: 0.1,
            ..style("MMMM")
        };
        let spaced = measurer.measure(&spaced, None).unwrap();
        assert!((spaced.width - wide.width - 4.0).abs() < 1e-9);
    }
}
