//! Page-preserving merge of sub-documents

use lopdf::{Document, Object, ObjectId, dictionary};

use crate::error::{PdfError, PdfResult};

fn dict_type(object: &Object) -> Option<&[u8]> {
    match object {
        Object::Dictionary(dict) => match dict.get(b"Type") {
            Ok(Object::Name(name)) => Some(name.as_slice()),
            _ => None,
        },
        _ => None,
    }
}

/// Copy every page of every document, in order, into one document.
///
/// Page objects and everything they reference are moved as-is (no
/// re-rendering). The result must contain exactly the sum of the input
/// page counts.
pub fn merge_documents(documents: Vec<Document>) -> PdfResult<Document> {
    let expected: usize = documents.iter().map(|d| d.get_pages().len()).sum();

    let mut merged = Document::with_version("1.5");
    let mut next_id = 1;
    let mut pages: Vec<(ObjectId, Object)> = Vec::with_capacity(expected);

    for mut doc in documents {
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        // get_pages is keyed by page number, so iteration is in page order
        for page_id in doc.get_pages().into_values() {
            let page = doc.get_object(page_id)?.clone();
            pages.push((page_id, page));
        }

        for (id, object) in doc.objects {
            match dict_type(&object) {
                Some(b"Catalog") | Some(b"Pages") | Some(b"Page") => {}
                _ => {
                    merged.objects.insert(id, object);
                }
            }
        }
    }

    merged.max_id = next_id;
    let pages_id = merged.new_object_id();

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for (id, page) in pages {
        if let Object::Dictionary(mut dict) = page {
            dict.set("Parent", pages_id);
            merged.objects.insert(id, Object::Dictionary(dict));
            kids.push(id.into());
        }
    }

    let count = kids.len() as i64;
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);

    let actual = merged.get_pages().len();
    if actual != expected {
        return Err(PdfError::PageCountMismatch { expected, actual });
    }
    Ok(merged)
}
