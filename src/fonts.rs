use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::rc::Rc;
use std::slice::Iter;

use adobe_cmap_parser::{ByteMapping, CIDRange, CodeRange};
use encoding_rs::{Encoding, MACINTOSH, UTF_16BE, WINDOWS_1252};
use lopdf::{Dictionary, Document, Object};
use tracing::{debug, warn};

use crate::utils::*;

pub(crate) type CharCode = u32;

/// Glyph-space units per text-space unit for everything except Type3 fonts.
const GLYPH_UNITS: f64 = 1000.;

// Without embedded metrics tables, standard fonts get an average advance.
const DEFAULT_WIDTH: f64 = 500.;
const MONOSPACE_WIDTH: f64 = 600.;

pub(crate) trait PdfFont: Debug {
    /// Advance of `id` in text-space units (1/1000 em already applied).
    fn get_width(&self, id: CharCode) -> f64;
    fn next_char(&self, iter: &mut Iter<u8>) -> Option<(CharCode, u8)>;
    fn decode_char(&self, char: CharCode) -> String;
    fn get_font_name(&self) -> &str;
}

pub(crate) struct PdfFontIter<'a> {
    i: Iter<'a, u8>,
    font: &'a dyn PdfFont,
}

impl<'a> Iterator for PdfFontIter<'a> {
    type Item = (CharCode, u8);
    fn next(&mut self) -> Option<(CharCode, u8)> {
        self.font.next_char(&mut self.i)
    }
}

impl<'a> dyn PdfFont + 'a {
    pub(crate) fn char_codes(&'a self, chars: &'a [u8]) -> PdfFontIter<'a> {
        PdfFontIter {
            i: chars.iter(),
            font: self,
        }
    }

    pub(crate) fn decode(&self, chars: &[u8]) -> String {
        self.char_codes(chars)
            .map(|x| self.decode_char(x.0))
            .collect()
    }
}

pub(crate) fn make_font(doc: &Document, font: &Dictionary) -> Rc<dyn PdfFont> {
    let subtype = maybe_get_name_string(doc, font, b"Subtype").unwrap_or_default();
    debug!("MakeFont({})", subtype);
    if subtype == "Type0" {
        match PdfCIDFont::new(doc, font) {
            Some(cid_font) => return Rc::new(cid_font),
            None => warn!("malformed Type0 font, decoding as a simple font"),
        }
    }
    Rc::new(PdfSimpleFont::new(doc, font, subtype == "Type3"))
}

/// A font with no usable dictionary, used when `Tf` names a missing resource.
pub(crate) fn fallback_font() -> Rc<dyn PdfFont> {
    Rc::new(PdfSimpleFont {
        base_name: String::from("<missing>"),
        encoding: WINDOWS_1252,
        differences: HashMap::new(),
        unicode_map: None,
        widths: HashMap::new(),
        missing_width: DEFAULT_WIDTH / GLYPH_UNITS,
    })
}

pub(crate) struct PdfSimpleFont {
    base_name: String,
    encoding: &'static Encoding,
    differences: HashMap<CharCode, String>,
    unicode_map: Option<HashMap<CharCode, String>>,
    widths: HashMap<CharCode, f64>,
    missing_width: f64,
}

impl PdfSimpleFont {
    fn new(doc: &Document, font: &Dictionary, is_type3: bool) -> PdfSimpleFont {
        let base_name = maybe_get_name_string(doc, font, b"BaseFont")
            .or_else(|| maybe_get_name_string(doc, font, b"Name"))
            .unwrap_or_default();

        let mut encoding = WINDOWS_1252;
        let mut differences = HashMap::new();
        match maybe_get_obj(doc, font, b"Encoding") {
            Some(Object::Name(name)) => encoding = named_encoding(name),
            Some(Object::Dictionary(dict)) => {
                if let Some(base) = maybe_get_name(doc, dict, b"BaseEncoding") {
                    encoding = named_encoding(base);
                }
                if let Some(diffs) = maybe_get::<Vec<&Object>>(doc, dict, b"Differences") {
                    differences = parse_differences(&diffs);
                }
            }
            Some(other) => debug!("unexpected simple font encoding {:?}", other),
            None => {}
        }

        // Type3 glyph space is defined by FontMatrix rather than 1/1000 em.
        let font_matrix = if is_type3 {
            maybe_get::<Vec<f64>>(doc, font, b"FontMatrix").and_then(|m| m.first().copied())
        } else {
            None
        };
        let to_text_space = |w: f64| match font_matrix {
            Some(a) => w * a,
            None => w / GLYPH_UNITS,
        };

        let mut widths = HashMap::new();
        if let (Some(first_char), Some(list)) = (
            maybe_get::<i64>(doc, font, b"FirstChar"),
            maybe_get::<Vec<f64>>(doc, font, b"Widths"),
        ) {
            for (i, w) in list.into_iter().enumerate() {
                widths.insert((first_char + i as i64) as CharCode, to_text_space(w));
            }
        }

        let missing_width = maybe_get::<&Dictionary>(doc, font, b"FontDescriptor")
            .and_then(|desc| maybe_get::<f64>(doc, desc, b"MissingWidth"))
            .filter(|w| *w > 0.)
            .unwrap_or(if base_name.contains("Courier") {
                MONOSPACE_WIDTH
            } else {
                DEFAULT_WIDTH
            })
            / GLYPH_UNITS;

        debug!(
            "simple font {} encoding {} with {} widths and {} differences",
            base_name,
            encoding.name(),
            widths.len(),
            differences.len()
        );

        PdfSimpleFont {
            base_name,
            encoding,
            differences,
            unicode_map: get_unicode_map(doc, font),
            widths,
            missing_width,
        }
    }
}

impl PdfFont for PdfSimpleFont {
    fn get_width(&self, id: CharCode) -> f64 {
        self.widths.get(&id).copied().unwrap_or(self.missing_width)
    }

    fn next_char(&self, iter: &mut Iter<u8>) -> Option<(CharCode, u8)> {
        iter.next().map(|x| (*x as CharCode, 1))
    }

    fn decode_char(&self, char: CharCode) -> String {
        if let Some(s) = self.unicode_map.as_ref().and_then(|m| m.get(&char)) {
            return s.clone();
        }
        if let Some(s) = self.differences.get(&char) {
            return s.clone();
        }
        let byte = char as u8;
        if byte < 0x20 && byte != b'\t' {
            return String::new();
        }
        let bytes = [byte];
        let (s, _) = self.encoding.decode_without_bom_handling(&bytes);
        s.into_owned()
    }

    fn get_font_name(&self) -> &str {
        &self.base_name
    }
}

impl fmt::Debug for PdfSimpleFont {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PdfSimpleFont({})", self.base_name)
    }
}

pub(crate) struct PdfCIDFont {
    base_name: String,
    encoding: ByteMapping,
    to_unicode: Option<HashMap<CharCode, String>>,
    widths: HashMap<CharCode, f64>,
    default_width: f64,
}

impl PdfCIDFont {
    fn new(doc: &Document, font: &Dictionary) -> Option<PdfCIDFont> {
        let base_name = maybe_get_name_string(doc, font, b"BaseFont").unwrap_or_default();
        let descendants = maybe_get::<Vec<&Dictionary>>(doc, font, b"DescendantFonts")?;
        let ciddict = *descendants.first()?;

        let encoding = match maybe_get_obj(doc, font, b"Encoding") {
            Some(Object::Stream(stream)) => {
                match adobe_cmap_parser::get_byte_mapping(&get_contents(stream)) {
                    Ok(mapping) => mapping,
                    Err(e) => {
                        warn!("unparseable encoding CMap for {}: {:?}", base_name, e);
                        identity_mapping()
                    }
                }
            }
            Some(Object::Name(name)) => {
                if name != b"Identity-H" && name != b"Identity-V" {
                    warn!(
                        "unsupported CMap {} for {}, assuming two-byte identity",
                        String::from_utf8_lossy(name),
                        base_name
                    );
                }
                identity_mapping()
            }
            _ => identity_mapping(),
        };

        let default_width = maybe_get::<f64>(doc, ciddict, b"DW").unwrap_or(GLYPH_UNITS);
        let mut widths = HashMap::new();
        if let Some(w) = maybe_get::<Vec<&Object>>(doc, ciddict, b"W") {
            parse_cid_widths(doc, &w, &mut widths);
        }
        for width in widths.values_mut() {
            *width /= GLYPH_UNITS;
        }
        debug!("CID font {} with {} widths", base_name, widths.len());

        Some(PdfCIDFont {
            base_name,
            encoding,
            to_unicode: get_unicode_map(doc, font),
            widths,
            default_width: default_width / GLYPH_UNITS,
        })
    }
}

impl PdfFont for PdfCIDFont {
    fn get_width(&self, id: CharCode) -> f64 {
        self.widths.get(&id).copied().unwrap_or(self.default_width)
    }

    fn next_char(&self, iter: &mut Iter<u8>) -> Option<(CharCode, u8)> {
        let mut c = *iter.next()? as u32;
        let mut code = None;
        'outer: for width in 1..=4 {
            for range in &self.encoding.codespace {
                if c >= range.start && c <= range.end && range.width == width {
                    code = Some((c, width));
                    break 'outer;
                }
            }
            let next = *iter.next()?;
            c = (c << 8) | next as u32;
        }
        let code = code?;
        for range in &self.encoding.cid {
            if code.0 >= range.src_code_lo && code.0 <= range.src_code_hi {
                return Some((code.0 - range.src_code_lo + range.dst_CID_lo, code.1 as u8));
            }
        }
        None
    }

    fn decode_char(&self, char: CharCode) -> String {
        match self.to_unicode.as_ref().and_then(|x| x.get(&char)) {
            Some(s) if !s.contains('\0') => s.clone(),
            _ => {
                debug!("unmapped CID {} in {}", char, self.base_name);
                String::new()
            }
        }
    }

    fn get_font_name(&self) -> &str {
        &self.base_name
    }
}

impl fmt::Debug for PdfCIDFont {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PdfCIDFont({})", self.base_name)
    }
}

fn identity_mapping() -> ByteMapping {
    ByteMapping {
        codespace: vec![CodeRange {
            width: 2,
            start: 0,
            end: 0xffff,
        }],
        cid: vec![CIDRange {
            src_code_lo: 0,
            src_code_hi: 0xffff,
            dst_CID_lo: 0,
        }],
    }
}

fn named_encoding(name: &[u8]) -> &'static Encoding {
    match name {
        b"MacRomanEncoding" => MACINTOSH,
        b"WinAnsiEncoding" | b"StandardEncoding" => WINDOWS_1252,
        _ => {
            debug!(
                "encoding {} decoded as WinAnsi",
                String::from_utf8_lossy(name)
            );
            WINDOWS_1252
        }
    }
}

fn parse_differences(diffs: &[&Object]) -> HashMap<CharCode, String> {
    let mut table = HashMap::new();
    let mut code: Option<i64> = None;
    for o in diffs {
        match o {
            Object::Integer(i) => code = Some(*i),
            Object::Name(name) => {
                if let Some(c) = code {
                    if let Some(s) = glyph_name_to_unicode(&String::from_utf8_lossy(name)) {
                        table.insert(c as CharCode, s);
                    }
                    code = Some(c + 1);
                }
            }
            _ => debug!("unexpected Differences entry {:?}", o),
        }
    }
    table
}

fn parse_cid_widths(doc: &Document, w: &[&Object], widths: &mut HashMap<CharCode, f64>) {
    let mut i = 0;
    while i + 1 < w.len() {
        let Some(first) = w[i].as_i64().ok() else {
            debug!("malformed W entry {:?}", w[i]);
            return;
        };
        match maybe_deref(doc, w[i + 1]) {
            Some(Object::Array(list)) => {
                for (j, width) in list.iter().enumerate() {
                    if let Some(width) = as_num(width) {
                        widths.insert((first + j as i64) as CharCode, width);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Ok(last), Some(width)) = (last.as_i64(), w.get(i + 2).and_then(|o| as_num(o)))
                else {
                    debug!("malformed W range at {}", i);
                    return;
                };
                for id in first..=last {
                    widths.insert(id as CharCode, width);
                }
                i += 3;
            }
            None => return,
        }
    }
}

fn get_unicode_map(doc: &Document, font: &Dictionary) -> Option<HashMap<CharCode, String>> {
    let stream = match maybe_get_obj(doc, font, b"ToUnicode")? {
        Object::Stream(stream) => stream,
        other => {
            debug!("ignoring ToUnicode {:?}", other);
            return None;
        }
    };
    let cmap = match adobe_cmap_parser::get_unicode_map(&get_contents(stream)) {
        Ok(cmap) => cmap,
        Err(e) => {
            warn!("unparseable ToUnicode CMap: {:?}", e);
            return None;
        }
    };

    let mut unicode = HashMap::new();
    for (&k, v) in cmap.iter() {
        let (s, malformed) = UTF_16BE.decode_without_bom_handling(v);
        if malformed {
            continue;
        }
        unicode.insert(k, s.into_owned());
    }
    Some(unicode)
}

/// Map an Adobe glyph name to text. Covers `uniXXXX`/`uXXXX` names, single
/// character names, and the punctuation and ligatures common in contracts.
pub(crate) fn glyph_name_to_unicode(name: &str) -> Option<String> {
    let name = name.split('.').next().unwrap_or(name);
    if let Some(hex) = name.strip_prefix("uni").filter(|h| h.len() == 4) {
        return u32::from_str_radix(hex, 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from);
    }
    if let Some(hex) = name.strip_prefix('u').filter(|h| (4..=6).contains(&h.len())) {
        if let Some(c) = u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
            return Some(c.to_string());
        }
    }
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_alphabetic() {
            return Some(c.to_string());
        }
    }
    let s = match name {
        "space" | "nbspace" => " ",
        "exclam" => "!",
        "quotedbl" => "\"",
        "numbersign" => "#",
        "dollar" => "$",
        "percent" => "%",
        "ampersand" => "&",
        "quotesingle" => "'",
        "parenleft" => "(",
        "parenright" => ")",
        "asterisk" => "*",
        "plus" => "+",
        "comma" => ",",
        "hyphen" | "minus" => "-",
        "period" => ".",
        "slash" => "/",
        "zero" => "0",
        "one" => "1",
        "two" => "2",
        "three" => "3",
        "four" => "4",
        "five" => "5",
        "six" => "6",
        "seven" => "7",
        "eight" => "8",
        "nine" => "9",
        "colon" => ":",
        "semicolon" => ";",
        "less" => "<",
        "equal" => "=",
        "greater" => ">",
        "question" => "?",
        "at" => "@",
        "bracketleft" => "[",
        "backslash" => "\\",
        "bracketright" => "]",
        "underscore" => "_",
        "braceleft" => "{",
        "bar" => "|",
        "braceright" => "}",
        "quoteleft" => "\u{2018}",
        "quoteright" => "\u{2019}",
        "quotedblleft" => "\u{201c}",
        "quotedblright" => "\u{201d}",
        "endash" => "\u{2013}",
        "emdash" => "\u{2014}",
        "bullet" => "\u{2022}",
        "ellipsis" => "\u{2026}",
        "section" => "\u{a7}",
        "paragraph" => "\u{b6}",
        "copyright" => "\u{a9}",
        "registered" => "\u{ae}",
        "trademark" => "\u{2122}",
        "degree" => "\u{b0}",
        "cent" => "\u{a2}",
        "sterling" => "\u{a3}",
        "yen" => "\u{a5}",
        "Euro" => "\u{20ac}",
        "fi" => "fi",
        "fl" => "fl",
        "ff" => "ff",
        "ffi" => "ffi",
        "ffl" => "ffl",
        _ => return None,
    };
    Some(s.to_owned())
}
