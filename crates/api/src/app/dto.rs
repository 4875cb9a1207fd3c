use serde::{Deserialize, Serialize};

use invoicer_core::InvoiceId;

// -------------------------
// Query parameters
// -------------------------

#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    #[serde(rename = "customerId")]
    pub customer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(rename = "InvoiceID")]
    pub invoice_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ArtifactQuery {
    pub expires: Option<i64>,
    pub signature: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedQuery {
    pub count: Option<usize>,
}

// -------------------------
// Responses
// -------------------------

#[derive(Debug, Serialize)]
pub struct InvoiceCreated {
    #[serde(rename = "InvoiceID")]
    pub invoice_id: InvoiceId,
}

/// Non-empty, trimmed value of an optional query parameter.
pub fn required_param(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
