//! Document rendering.
//!
//! Rendering is a pure function of the invoice: no clock, no randomness, so
//! equal invoices always produce byte-identical documents.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use thiserror::Error;

use crate::invoice::Invoice;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("invoice needs {pages} pages, more than the limit of {max}")]
    PageLimit { pages: usize, max: usize },

    #[error("failed to encode document: {0}")]
    Encode(String),
}

/// Turns an invoice into a binary document.
pub trait DocumentRenderer: Send + Sync {
    /// MIME type of the produced bytes.
    fn content_type(&self) -> &'static str;

    fn render(&self, invoice: &Invoice) -> Result<Vec<u8>, RenderError>;
}

impl<R> DocumentRenderer for std::sync::Arc<R>
where
    R: DocumentRenderer + ?Sized,
{
    fn content_type(&self) -> &'static str {
        (**self).content_type()
    }

    fn render(&self, invoice: &Invoice) -> Result<Vec<u8>, RenderError> {
        (**self).render(invoice)
    }
}

// A4 in points.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 56;
const TITLE_SIZE: i64 = 18;
const BODY_SIZE: i64 = 11;
const LEADING: i64 = 16;

/// Single-font PDF renderer (A4, Helvetica), paginating long product lists.
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    max_pages: usize,
}

impl Default for PdfRenderer {
    fn default() -> Self {
        Self { max_pages: 50 }
    }
}

impl PdfRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    fn lines_per_page() -> usize {
        // Title block takes two lines on every page.
        ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize - 2
    }

    fn body_lines(invoice: &Invoice) -> Vec<String> {
        let date = if invoice.invoice_date.is_empty() {
            "-"
        } else {
            invoice.invoice_date.as_str()
        };

        let mut lines = vec![
            format!("Invoice ID:  {}", invoice.invoice_id),
            format!("Customer ID: {}", invoice.customer_id),
            format!("Date:        {date}"),
            String::new(),
            "Products:".to_string(),
        ];
        if invoice.product_list.is_empty() {
            lines.push("  (none)".to_string());
        }
        lines.extend(
            invoice
                .product_list
                .iter()
                .enumerate()
                .map(|(i, p)| format!("  {:>3}. {p}", i + 1)),
        );
        lines.push(String::new());
        lines.push(format!("Total:       {}", invoice.total_amount.display_major()));
        lines
    }

    fn page_content(
        title: &str,
        lines: &[String],
    ) -> Result<Vec<u8>, RenderError> {
        let mut ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), Object::Integer(TITLE_SIZE)]),
            Operation::new(
                "Td",
                vec![Object::Integer(MARGIN), Object::Integer(PAGE_HEIGHT - MARGIN)],
            ),
            Operation::new("Tj", vec![Object::string_literal(pdf_text(title))]),
            Operation::new("Tf", vec!["F1".into(), Object::Integer(BODY_SIZE)]),
            Operation::new("TL", vec![Object::Integer(LEADING)]),
            Operation::new("T*", vec![]),
        ];
        for line in lines {
            ops.push(Operation::new("T*", vec![]));
            ops.push(Operation::new("Tj", vec![Object::string_literal(pdf_text(line))]));
        }
        ops.push(Operation::new("ET", vec![]));

        Content { operations: ops }
            .encode()
            .map_err(|e| RenderError::Encode(e.to_string()))
    }
}

/// Restrict text to printable ASCII; the built-in font has no other glyphs.
fn pdf_text(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect()
}

impl DocumentRenderer for PdfRenderer {
    fn content_type(&self) -> &'static str {
        "application/pdf"
    }

    fn render(&self, invoice: &Invoice) -> Result<Vec<u8>, RenderError> {
        let lines = Self::body_lines(invoice);
        let chunks: Vec<&[String]> = lines.chunks(Self::lines_per_page()).collect();
        if chunks.len() > self.max_pages {
            return Err(RenderError::PageLimit {
                pages: chunks.len(),
                max: self.max_pages,
            });
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let total_pages = chunks.len();
        let mut kids = Vec::with_capacity(total_pages);
        for (i, chunk) in chunks.iter().enumerate() {
            let title = if total_pages > 1 {
                format!("INVOICE {}  (page {} of {})", invoice.invoice_id, i + 1, total_pages)
            } else {
                format!("INVOICE {}", invoice.invoice_id)
            };
            let content = Self::page_content(&title, chunk)?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(total_pages as i64),
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(PAGE_WIDTH),
                Object::Integer(PAGE_HEIGHT),
            ],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut buf = Vec::new();
        doc.save_to(&mut buf)
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoicer_core::{Amount, CustomerId, InvoiceId};
    use proptest::prelude::*;

    fn invoice(products: Vec<String>) -> Invoice {
        Invoice {
            invoice_id: InvoiceId::new("INV1").unwrap(),
            customer_id: CustomerId::new("CUST1").unwrap(),
            invoice_date: "2023-09-26".to_string(),
            product_list: products,
            total_amount: Amount::from_minor_units(42),
        }
    }

    #[test]
    fn renders_a_loadable_pdf() {
        let bytes = PdfRenderer::new().render(&invoice(vec!["Item1".into()])).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn long_product_lists_paginate() {
        let products = (0..200).map(|i| format!("Item{i}")).collect();
        let bytes = PdfRenderer::new().render(&invoice(products)).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() > 1);
    }

    #[test]
    fn page_limit_is_enforced() {
        let products = (0..200).map(|i| format!("Item{i}")).collect();
        let err = PdfRenderer::new()
            .with_max_pages(1)
            .render(&invoice(products))
            .unwrap_err();
        assert!(matches!(err, RenderError::PageLimit { max: 1, .. }));
    }

    #[test]
    fn non_ascii_text_is_replaced() {
        assert_eq!(pdf_text("Caf\u{e9}\n"), "Caf??");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 32,
            ..ProptestConfig::default()
        })]

        #[test]
        fn rendering_is_deterministic(
            products in prop::collection::vec("[A-Za-z0-9 ]{0,24}", 0..30),
            amount in any::<u32>(),
        ) {
            let mut inv = invoice(products);
            inv.total_amount = Amount::from_minor_units(amount as u64);
            let renderer = PdfRenderer::new();
            let a = renderer.render(&inv).unwrap();
            let b = renderer.render(&inv).unwrap();
            prop_assert!(!a.is_empty());
            prop_assert_eq!(a, b);
        }
    }
}
