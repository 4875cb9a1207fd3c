use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use invoicer_core::{Amount, CustomerId, DomainError, InvoiceId};
use invoicer_events::{AttributeValue, Image};

/// Attribute names of an invoice record (also its JSON field names).
pub mod attributes {
    pub const INVOICE_ID: &str = "InvoiceID";
    pub const CUSTOMER_ID: &str = "CustomerID";
    pub const INVOICE_DATE: &str = "InvoiceDate";
    pub const PRODUCT_LIST: &str = "ProductList";
    pub const TOTAL_AMOUNT: &str = "TotalAmount";

    /// Attributes stored as `S`; only these can key a secondary index.
    pub const STRING_KEYS: [&str; 3] = [INVOICE_ID, CUSTOMER_ID, INVOICE_DATE];
}

/// Source-of-truth invoice record.
///
/// Created once by a client write and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(rename = "InvoiceID")]
    pub invoice_id: InvoiceId,
    #[serde(rename = "CustomerID")]
    pub customer_id: CustomerId,
    /// Free-form date string; may be empty.
    #[serde(rename = "InvoiceDate", default, deserialize_with = "null_as_default")]
    pub invoice_date: String,
    #[serde(rename = "ProductList", default, deserialize_with = "null_as_default")]
    pub product_list: Vec<String>,
    /// Total in minor currency units.
    #[serde(rename = "TotalAmount")]
    pub total_amount: Amount,
}

/// Explicit `null` reads the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Failure to turn a record image into an [`Invoice`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("missing attribute {0}")]
    MissingAttribute(&'static str),

    #[error("attribute {attribute} has type {found}, expected {expected}")]
    WrongType {
        attribute: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    Invalid(#[from] DomainError),
}

fn required<'a>(image: &'a Image, name: &'static str) -> Result<&'a AttributeValue, DecodeError> {
    image.get(name).ok_or(DecodeError::MissingAttribute(name))
}

fn string_attr<'a>(image: &'a Image, name: &'static str) -> Result<&'a str, DecodeError> {
    let value = required(image, name)?;
    value.as_str().ok_or(DecodeError::WrongType {
        attribute: name,
        expected: "S",
        found: value.type_tag(),
    })
}

impl Invoice {
    /// Decode the `NewImage` of a change event.
    ///
    /// `InvoiceDate` and `ProductList` are optional; `TotalAmount` must be a
    /// number attribute holding a whole, non-negative count of minor units.
    pub fn from_image(image: &Image) -> Result<Self, DecodeError> {
        let invoice_id = InvoiceId::new(string_attr(image, attributes::INVOICE_ID)?)?;
        let customer_id = CustomerId::new(string_attr(image, attributes::CUSTOMER_ID)?)?;

        let invoice_date = match image.get(attributes::INVOICE_DATE) {
            None | Some(AttributeValue::Null(_)) => String::new(),
            Some(_) => string_attr(image, attributes::INVOICE_DATE)?.to_string(),
        };

        let product_list = match image.get(attributes::PRODUCT_LIST) {
            None | Some(AttributeValue::Null(_)) => Vec::new(),
            Some(value) => {
                let items = value.as_list().ok_or(DecodeError::WrongType {
                    attribute: attributes::PRODUCT_LIST,
                    expected: "L",
                    found: value.type_tag(),
                })?;
                items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_string).ok_or(DecodeError::WrongType {
                            attribute: attributes::PRODUCT_LIST,
                            expected: "S",
                            found: item.type_tag(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        let amount_attr = required(image, attributes::TOTAL_AMOUNT)?;
        let raw_amount = amount_attr.as_number().ok_or(DecodeError::WrongType {
            attribute: attributes::TOTAL_AMOUNT,
            expected: "N",
            found: amount_attr.type_tag(),
        })?;
        let total_amount = Amount::parse(raw_amount)?;

        Ok(Self {
            invoice_id,
            customer_id,
            invoice_date,
            product_list,
            total_amount,
        })
    }

    /// Snapshot this invoice as a record image.
    pub fn to_image(&self) -> Image {
        Image::new()
            .with(attributes::INVOICE_ID, AttributeValue::string(self.invoice_id.as_str()))
            .with(attributes::CUSTOMER_ID, AttributeValue::string(self.customer_id.as_str()))
            .with(attributes::INVOICE_DATE, AttributeValue::string(self.invoice_date.clone()))
            .with(
                attributes::PRODUCT_LIST,
                AttributeValue::L(
                    self.product_list
                        .iter()
                        .map(|p| AttributeValue::string(p.clone()))
                        .collect(),
                ),
            )
            .with(
                attributes::TOTAL_AMOUNT,
                AttributeValue::number(self.total_amount.minor_units()),
            )
    }
}
