//! Local PDF page-cut utility backing C4's page-limiting policy.
//!
//! spec.md §4.4 requires that pages beyond the configured `max_pages` are
//! excluded from the bytes submitted to the structured parser — otherwise a
//! long document's reference list gets misread as first-class authors. This
//! crate owns that cut locally rather than relying on the parser service to
//! enforce it, since the service is treated as an opaque TEI-XML producer
//! (spec.md §1) with no guarantee it honors a page-limit parameter.

use lopdf::Document;

use crate::errors::ArchivistError;

/// Returns a new, standalone PDF containing only the first `max_pages`
/// pages of `pdf_bytes` (or the whole document, unchanged, if it already has
/// fewer pages than that).
pub fn cut_first_pages(pdf_bytes: &[u8], max_pages: u32) -> Result<Vec<u8>, ArchivistError> {
  let mut doc = Document::load_mem(pdf_bytes).map_err(|e| ArchivistError::PdfCut(e.to_string()))?;

  let pages = doc.get_pages();
  let max_pages = max_pages as usize;
  if pages.len() <= max_pages {
    return Ok(pdf_bytes.to_vec());
  }

  let to_remove: Vec<lopdf::ObjectId> =
    pages.into_iter().skip(max_pages).map(|(_, object_id)| object_id).collect();
  doc.delete_pages(&to_remove);

  let mut buffer = Vec::new();
  doc.save_to(&mut buffer).map_err(|e| ArchivistError::PdfCut(e.to_string()))?;
  Ok(buffer)
}

/// Counts pages without constructing a cut excerpt, used to decide whether a
/// retry at a larger page budget can possibly find more content.
pub fn page_count(pdf_bytes: &[u8]) -> Result<usize, ArchivistError> {
  let doc = Document::load_mem(pdf_bytes).map_err(|e| ArchivistError::PdfCut(e.to_string()))?;
  Ok(doc.get_pages().len())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn minimal_pdf_with_pages(n: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(lopdf::dictionary! {
      "Type" => "Font",
      "Subtype" => "Type1",
      "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(lopdf::dictionary! {
      "Font" => lopdf::dictionary! { "F1" => font_id },
    });
    let mut page_ids = Vec::new();
    for _ in 0..n {
      let content = doc.add_object(lopdf::Stream::new(lopdf::dictionary! {}, b"BT ET".to_vec()));
      let page_id = doc.add_object(lopdf::dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
      });
      page_ids.push(page_id.into());
    }
    doc.objects.insert(
      pages_id,
      lopdf::Object::Dictionary(lopdf::dictionary! {
        "Type" => "Pages",
        "Kids" => page_ids,
        "Count" => n as i64,
      }),
    );
    let catalog_id = doc.add_object(lopdf::dictionary! {
      "Type" => "Catalog",
      "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
  }

  #[test]
  fn leaves_documents_within_budget_untouched() {
    let bytes = minimal_pdf_with_pages(2);
    let cut = cut_first_pages(&bytes, 2).unwrap();
    assert_eq!(page_count(&cut).unwrap(), 2);
  }

  #[test]
  fn truncates_documents_over_budget() {
    let bytes = minimal_pdf_with_pages(6);
    assert_eq!(page_count(&bytes).unwrap(), 6);
    let cut = cut_first_pages(&bytes, 2).unwrap();
    assert_eq!(page_count(&cut).unwrap(), 2);
  }
}
