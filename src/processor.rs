use std::collections::HashMap;
use std::rc::Rc;

use euclid::Transform2D;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, Stream};
use tracing::{debug, warn};

use crate::fonts::{PdfFont, fallback_font, make_font};
use crate::output::GlyphCollector;
use crate::types::Transform;
use crate::utils::*;

// Guards against Form XObjects that (directly or not) draw themselves.
const MAX_XOBJECT_DEPTH: usize = 8;

#[derive(Clone)]
pub(crate) struct TextState {
    pub(crate) font: Option<Rc<dyn PdfFont>>,
    pub(crate) font_size: f64,
    pub(crate) character_spacing: f64,
    pub(crate) word_spacing: f64,
    pub(crate) horizontal_scaling: f64,
    pub(crate) leading: f64,
    pub(crate) rise: f64,
    pub(crate) tm: Transform,
}

#[derive(Clone)]
pub(crate) struct GraphicsState {
    pub(crate) ctm: Transform,
    pub(crate) ts: TextState,
}

impl GraphicsState {
    fn new() -> GraphicsState {
        GraphicsState {
            ts: TextState {
                font: None,
                font_size: 0.,
                character_spacing: 0.,
                word_spacing: 0.,
                horizontal_scaling: 100. / 100.,
                leading: 0.,
                rise: 0.,
                tm: Transform2D::identity(),
            },
            ctm: Transform2D::identity(),
        }
    }
}

fn operands<const N: usize>(operands: &[Object]) -> Option<[f64; N]> {
    if operands.len() < N {
        return None;
    }
    let mut out = [0.; N];
    for (slot, o) in out.iter_mut().zip(operands) {
        *slot = as_num(o)?;
    }
    Some(out)
}

fn matrix(operands: &[Object]) -> Option<Transform> {
    let [a, b, c, d, e, f] = self::operands::<6>(operands)?;
    Some(Transform2D::new(a, b, c, d, e, f))
}

fn show_text(gs: &mut GraphicsState, s: &[u8], output: &mut GlyphCollector) {
    let ts = &mut gs.ts;
    let font = ts.font.clone().unwrap_or_else(fallback_font);
    debug!("show {:?} in {}", font.decode(s), font.get_font_name());

    for (c, length) in font.char_codes(s) {
        // 5.3.3 Text Space Details
        let tsm = Transform2D::new(ts.horizontal_scaling, 0., 0., 1.0, 0., ts.rise);
        // Trm = Tsm × Tm × CTM
        let trm = tsm.then(&ts.tm.then(&gs.ctm));

        let w0 = font.get_width(c);

        let mut spacing = ts.character_spacing;
        // "Word spacing is applied to every occurrence of the single-byte character code 32 in a
        //  string when using a simple font or a composite font that defines code 32 as a
        //  single-byte code. It does not apply to occurrences of the byte value 32 in
        //  multiple-byte codes."
        let is_space = c == 32 && length == 1;
        if is_space {
            spacing += ts.word_spacing
        }

        output.output_character(&trm, w0, ts.font_size, &font.decode_char(c));
        let tx = ts.horizontal_scaling * (w0 * ts.font_size + spacing);
        ts.tm = Transform2D::translation(tx, 0.).then(&ts.tm);
    }
}

/// Shift the text matrix by a `TJ` adjustment, in thousandths of an em.
fn adjust_text(ts: &mut TextState, adjustment: f64) {
    let tx = ts.horizontal_scaling * (-adjustment / 1000. * ts.font_size);
    ts.tm = Transform2D::translation(tx, 0.).then(&ts.tm);
}

fn next_line(ts: &mut TextState, tlm: &mut Transform, tx: f64, ty: f64) {
    *tlm = Transform2D::translation(tx, ty).then(tlm);
    ts.tm = *tlm;
}

/// Interprets page content streams and reports every shown character to a
/// [`GlyphCollector`].
pub(crate) struct Processor<'a> {
    doc: &'a Document,
    fonts: HashMap<Vec<u8>, Rc<dyn PdfFont>>,
}

impl<'a> Processor<'a> {
    pub(crate) fn new(doc: &'a Document) -> Processor<'a> {
        Processor {
            doc,
            fonts: HashMap::new(),
        }
    }

    pub(crate) fn process_page(
        &mut self,
        content: &[u8],
        resources: &'a Dictionary,
        output: &mut GlyphCollector,
        page_num: u32,
    ) {
        self.process_stream(content, resources, GraphicsState::new(), output, page_num, 0);
    }

    fn load_font(&mut self, resources: &'a Dictionary, name: &[u8]) -> Rc<dyn PdfFont> {
        let doc = self.doc;
        // Font names are only unique within one resource dictionary.
        let key = [format!("{:p}/", resources).as_bytes(), name].concat();
        self.fonts
            .entry(key)
            .or_insert_with(|| {
                match maybe_get::<&Dictionary>(doc, resources, b"Font")
                    .and_then(|fonts| maybe_get::<&Dictionary>(doc, fonts, name))
                {
                    Some(dict) => make_font(doc, dict),
                    None => {
                        warn!("font {} missing from resources", String::from_utf8_lossy(name));
                        fallback_font()
                    }
                }
            })
            .clone()
    }

    fn process_stream(
        &mut self,
        content: &[u8],
        resources: &'a Dictionary,
        mut gs: GraphicsState,
        output: &mut GlyphCollector,
        page_num: u32,
        depth: usize,
    ) {
        let content = match Content::decode(content) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    "Failed to decode content stream for page {}: {}. Skipping this content.",
                    page_num, e
                );
                return;
            }
        };
        let mut gs_stack = Vec::new();
        let mut tlm: Transform = Transform2D::identity();

        for operation in &content.operations {
            let ops = &operation.operands;
            match operation.operator.as_ref() {
                "BT" | "ET" => {
                    tlm = Transform2D::identity();
                    gs.ts.tm = tlm;
                }
                "cm" => {
                    if let Some(m) = matrix(ops) {
                        gs.ctm = m.then(&gs.ctm);
                    }
                }
                "Tc" => {
                    if let Some([v]) = operands::<1>(ops) {
                        gs.ts.character_spacing = v;
                    }
                }
                "Tw" => {
                    if let Some([v]) = operands::<1>(ops) {
                        gs.ts.word_spacing = v;
                    }
                }
                "Tz" => {
                    if let Some([v]) = operands::<1>(ops) {
                        gs.ts.horizontal_scaling = v / 100.;
                    }
                }
                "TL" => {
                    if let Some([v]) = operands::<1>(ops) {
                        gs.ts.leading = v;
                    }
                }
                "Ts" => {
                    if let Some([v]) = operands::<1>(ops) {
                        gs.ts.rise = v;
                    }
                }
                "Tf" => {
                    let (Some(name), Some(size)) = (
                        ops.first().and_then(|o| o.as_name().ok()),
                        ops.get(1).and_then(as_num),
                    ) else {
                        debug!("malformed Tf {:?}", operation);
                        continue;
                    };
                    gs.ts.font = Some(self.load_font(resources, name));
                    gs.ts.font_size = size;
                }
                "Tm" => {
                    if let Some(m) = matrix(ops) {
                        tlm = m;
                        gs.ts.tm = tlm;
                    }
                }
                "Td" => {
                    if let Some([tx, ty]) = operands::<2>(ops) {
                        next_line(&mut gs.ts, &mut tlm, tx, ty);
                    }
                }
                "TD" => {
                    if let Some([tx, ty]) = operands::<2>(ops) {
                        gs.ts.leading = -ty;
                        next_line(&mut gs.ts, &mut tlm, tx, ty);
                    }
                }
                "T*" => {
                    let leading = gs.ts.leading;
                    next_line(&mut gs.ts, &mut tlm, 0., -leading);
                }
                "Tj" => match ops.first() {
                    Some(Object::String(s, _)) => show_text(&mut gs, s, output),
                    _ => debug!("unexpected Tj operand {:?}", operation),
                },
                "'" => {
                    let leading = gs.ts.leading;
                    next_line(&mut gs.ts, &mut tlm, 0., -leading);
                    if let Some(Object::String(s, _)) = ops.first() {
                        show_text(&mut gs, s, output);
                    }
                }
                "\"" => {
                    if let Some([aw, ac]) = operands::<2>(ops) {
                        gs.ts.word_spacing = aw;
                        gs.ts.character_spacing = ac;
                    }
                    let leading = gs.ts.leading;
                    next_line(&mut gs.ts, &mut tlm, 0., -leading);
                    if let Some(Object::String(s, _)) = ops.get(2) {
                        show_text(&mut gs, s, output);
                    }
                }
                "TJ" => match ops.first() {
                    Some(Object::Array(array)) => {
                        for e in array {
                            match e {
                                Object::String(s, _) => show_text(&mut gs, s, output),
                                Object::Integer(_) | Object::Real(_) => {
                                    if let Some(adjustment) = as_num(e) {
                                        adjust_text(&mut gs.ts, adjustment);
                                    }
                                }
                                _ => debug!("kind of {:?}", e),
                            }
                        }
                    }
                    _ => debug!("unexpected TJ operand {:?}", operation),
                },
                "q" => {
                    gs_stack.push(gs.clone());
                }
                "Q" => {
                    if let Some(s) = gs_stack.pop() {
                        gs = s;
                    } else {
                        warn!("No state to pop");
                    }
                }
                "Do" => {
                    if depth >= MAX_XOBJECT_DEPTH {
                        warn!("XObject nesting too deep on page {}", page_num);
                        continue;
                    }
                    let Some(name) = ops.first().and_then(|o| o.as_name().ok()) else {
                        continue;
                    };
                    let Some(xf) = maybe_get::<&Dictionary>(self.doc, resources, b"XObject")
                        .and_then(|xobjects| maybe_get::<&Stream>(self.doc, xobjects, name))
                    else {
                        debug!("XObject {} not found", String::from_utf8_lossy(name));
                        continue;
                    };
                    if maybe_get_name(self.doc, &xf.dict, b"Subtype") != Some(b"Form".as_slice()) {
                        continue;
                    }
                    // A form is drawn with its own matrix and its own resources,
                    // inheriting the page's when it has none.
                    let mut form_gs = gs.clone();
                    if let Some(m) = maybe_get::<Vec<f64>>(self.doc, &xf.dict, b"Matrix")
                        .and_then(|m| <[f64; 6]>::try_from(m).ok())
                    {
                        let [a, b, c, d, e, f] = m;
                        form_gs.ctm = Transform2D::new(a, b, c, d, e, f).then(&gs.ctm);
                    }
                    let form_resources = maybe_get::<&Dictionary>(self.doc, &xf.dict, b"Resources")
                        .unwrap_or(resources);
                    let contents = get_contents(xf);
                    self.process_stream(
                        &contents,
                        form_resources,
                        form_gs,
                        output,
                        page_num,
                        depth + 1,
                    );
                }
                _ => {}
            }
        }
    }
}
