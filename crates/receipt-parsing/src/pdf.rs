use crate::error::ParsingError;

/// Minimum character count a text layer must clear before it is trusted;
/// below this, PDFs are assumed to be scans and routed to OCR instead.
/// Mirrors `original_source/backend/parsers/pdf_extractor.py`'s
/// `MIN_TEXT_LENGTH`.
pub const MIN_TEXT_LENGTH: usize = 80;

/// Renders a PDF's pages to PNG bytes, base64-encoded, for the vision
/// fallback. No bundled implementation ships here — every example repo in
/// the retrieval pack that touches PDFs stops at text extraction, so a
/// concrete renderer (pdfium, mupdf, ghostscript) is left pluggable rather
/// than invented.
pub trait PageRenderer: Send + Sync {
    fn render_to_png_base64(&self, pdf_bytes: &[u8], max_pages: usize) -> Result<Vec<String>, ParsingError>;
}

/// OCR fallback for PDFs whose text layer is too thin to trust. Left
/// pluggable for the same reason as `PageRenderer`: no OCR crate appears
/// anywhere in the retrieval pack to ground a concrete choice on.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, pdf_bytes: &[u8]) -> Result<String, ParsingError>;
}

/// Three-tier text extraction cascade, mirroring `pdf_extractor.py`'s
/// `extract_text` cascade (pdfplumber -> PyMuPDF -> OCR): try `pdf-extract`
/// first since it is the simplest pure-Rust path, fall back to walking
/// `lopdf`'s object graph directly for PDFs `pdf-extract` chokes on, and
/// only reach for OCR when both text tiers come up short.
pub fn extract_text(pdf_bytes: &[u8], ocr: Option<&dyn OcrEngine>) -> Result<String, ParsingError> {
    if let Ok(text) = pdf_extract::extract_text_from_mem(pdf_bytes) {
        if text.trim().chars().count() >= MIN_TEXT_LENGTH {
            return Ok(text);
        }
    }

    if let Ok(text) = extract_text_via_lopdf(pdf_bytes) {
        if text.trim().chars().count() >= MIN_TEXT_LENGTH {
            return Ok(text);
        }
    }

    match ocr {
        Some(engine) => engine.recognize(pdf_bytes),
        None => Err(ParsingError::Pdf(
            "text layer too short and no OCR engine is configured".to_string(),
        )),
    }
}

fn extract_text_via_lopdf(pdf_bytes: &[u8]) -> Result<String, ParsingError> {
    let document = lopdf::Document::load_mem(pdf_bytes)
        .map_err(|e| ParsingError::Pdf(format!("lopdf failed to parse document: {e}")))?;

    let mut text = String::new();
    for (page_num, _) in document.get_pages() {
        if let Ok(page_text) = document.extract_text(&[page_num]) {
            text.push_str(&page_text);
            text.push('\n');
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubOcr(&'static str);

    impl OcrEngine for StubOcr {
        fn recognize(&self, _pdf_bytes: &[u8]) -> Result<String, ParsingError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn falls_back_to_ocr_when_no_text_layer() {
        let garbage = b"%PDF-1.4 not a real document";
        let ocr = StubOcr("qabul qilindi 351 750.00 UZS");
        let result = extract_text(garbage, Some(&ocr));
        assert_eq!(result.unwrap(), "qabul qilindi 351 750.00 UZS");
    }

    #[test]
    fn errors_without_ocr_when_text_layer_absent() {
        let garbage = b"%PDF-1.4 not a real document";
        assert!(extract_text(garbage, None).is_err());
    }
}
