use lopdf::{Dictionary, Document, Object, Stream};

use crate::types::MediaBox;

pub(crate) fn maybe_deref<'a>(doc: &'a Document, o: &'a Object) -> Option<&'a Object> {
    match o {
        &Object::Reference(r) => doc.get_object(r).ok(),
        _ => Some(o),
    }
}

pub(crate) fn maybe_get_obj<'a>(
    doc: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    dict.get(key).ok().and_then(|o| maybe_deref(doc, o))
}

pub(crate) trait FromObj<'a>
where
    Self: std::marker::Sized,
{
    fn from_obj(doc: &'a Document, obj: &'a Object) -> Option<Self>;
}

impl<'a, T: FromObj<'a>> FromObj<'a> for Vec<T> {
    fn from_obj(doc: &'a Document, obj: &'a Object) -> Option<Self> {
        maybe_deref(doc, obj)?
            .as_array()
            .ok()?
            .iter()
            .map(|x| T::from_obj(doc, x))
            .collect()
    }
}

impl<'a> FromObj<'a> for f64 {
    fn from_obj(doc: &'a Document, obj: &'a Object) -> Option<Self> {
        as_num(maybe_deref(doc, obj)?)
    }
}

impl<'a> FromObj<'a> for i64 {
    fn from_obj(doc: &'a Document, obj: &'a Object) -> Option<Self> {
        match maybe_deref(doc, obj)? {
            &Object::Integer(i) => Some(i),
            _ => None,
        }
    }
}

impl<'a> FromObj<'a> for &'a Dictionary {
    fn from_obj(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
        maybe_deref(doc, obj)?.as_dict().ok()
    }
}

impl<'a> FromObj<'a> for &'a Stream {
    fn from_obj(doc: &'a Document, obj: &'a Object) -> Option<&'a Stream> {
        maybe_deref(doc, obj)?.as_stream().ok()
    }
}

impl<'a> FromObj<'a> for &'a Object {
    fn from_obj(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
        maybe_deref(doc, obj)
    }
}

pub(crate) fn maybe_get<'a, T: FromObj<'a>>(
    doc: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Option<T> {
    dict.get(key).ok().and_then(|o| T::from_obj(doc, o))
}

pub(crate) fn maybe_get_name<'a>(
    doc: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a [u8]> {
    maybe_get_obj(doc, dict, key).and_then(|n| n.as_name().ok())
}

pub(crate) fn maybe_get_name_string(
    doc: &Document,
    dict: &Dictionary,
    key: &[u8],
) -> Option<String> {
    maybe_get_name(doc, dict, key).map(|n| String::from_utf8_lossy(n).into_owned())
}

pub(crate) fn as_num(o: &Object) -> Option<f64> {
    match o {
        &Object::Integer(i) => Some(i as f64),
        &Object::Real(f) => Some(f.into()),
        _ => None,
    }
}

pub(crate) fn get_contents(contents: &Stream) -> Vec<u8> {
    if contents.filters().is_ok() {
        contents
            .decompressed_content()
            .unwrap_or_else(|_| contents.content.clone())
    } else {
        contents.content.clone()
    }
}

// Page trees deeper than this are treated as cyclic.
const MAX_TREE_DEPTH: usize = 32;

/// Look up a page attribute, walking up the page tree for inheritable keys.
pub(crate) fn get_inherited<'a, T: FromObj<'a>>(
    doc: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Option<T> {
    let mut node = dict;
    for _ in 0..MAX_TREE_DEPTH {
        if let Some(o) = maybe_get(doc, node, key) {
            return Some(o);
        }
        node = node
            .get(b"Parent")
            .and_then(|parent| parent.as_reference())
            .and_then(|id| doc.get_dictionary(id))
            .ok()?;
    }
    None
}

// US Letter, used when a page carries no usable MediaBox.
const DEFAULT_MEDIA_BOX: MediaBox = MediaBox {
    llx: 0.,
    lly: 0.,
    urx: 612.,
    ury: 792.,
};

pub(crate) fn page_media_box(doc: &Document, page_dict: &Dictionary) -> MediaBox {
    match get_inherited::<Vec<f64>>(doc, page_dict, b"MediaBox").as_deref() {
        Some(&[llx, lly, urx, ury]) => MediaBox { llx, lly, urx, ury },
        _ => DEFAULT_MEDIA_BOX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn inherited_media_box_is_found_on_parent() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::from(page_id)],
                "Count" => 1i64,
                "MediaBox" => vec![0.into(), 0.into(), 300.into(), 400.into()],
            }),
        );

        let page = doc.get_dictionary(page_id).unwrap();
        let media_box = page_media_box(&doc, page);
        assert_eq!(media_box.urx, 300.);
        assert_eq!(media_box.ury, 400.);
    }

    #[test]
    fn missing_media_box_falls_back_to_letter() {
        let doc = Document::with_version("1.5");
        let dict = Dictionary::new();
        let media_box = page_media_box(&doc, &dict);
        assert_eq!(media_box.size().width, 612.);
        assert_eq!(media_box.size().height, 792.);
    }

    #[test]
    fn numbers_convert_from_integers_and_reals() {
        assert_eq!(as_num(&Object::Integer(3)), Some(3.));
        assert_eq!(as_num(&Object::Real(1.5)), Some(1.5));
        assert_eq!(as_num(&Object::Null), None);
    }
}
