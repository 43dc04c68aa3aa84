//! Data Assembler: turns a consistent record snapshot into an immutable,
//! fully formatted rendering model.
//!
//! Every value the template will show is formatted here, locale-independent:
//! money with an explicit currency code and fixed two-decimal rendering,
//! dates as ISO strings. Issued invoices use their stored, frozen totals —
//! they are never recomputed at render time, so a historical artifact
//! survives later tax-rate changes.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::db::RecordStore;
use crate::error::PipelineError;
use crate::models::{ContentBlock, DocumentKind, DocumentStatus, InvoiceStatus, LineItem};

/// Watermark stamped on draft previews. Final artifacts carry none.
pub const DRAFT_WATERMARK: &str = "DRAFT";

/// One pre-formatted invoice line for the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineModel {
    pub description: String,
    pub quantity: String,
    pub unit_price: String,
    pub tax: String,
    pub amount: String,
}

/// Closed rendering model for invoices. Every field is a display string.
#[derive(Debug, Clone)]
pub struct InvoiceModel {
    pub invoice_number: String,
    pub issue_date: String,
    pub due_date: String,
    pub client_name: String,
    pub client_address: String,
    pub client_contact: String,
    pub currency: String,
    pub lines: Vec<LineModel>,
    pub subtotal: String,
    pub tax_total: String,
    pub total: String,
    pub watermark: String,
    pub template_version: String,
}

/// Closed rendering model for letterhead documents.
#[derive(Debug, Clone)]
pub struct LetterheadModel {
    pub title: String,
    pub reference: String,
    pub date: String,
    pub client_name: String,
    pub blocks: Vec<ContentBlock>,
    pub watermark: String,
    pub template_version: String,
}

/// One rendering model per document kind, so a template/model mismatch is a
/// typed fault rather than a blank page.
#[derive(Debug, Clone)]
pub enum RenderingModel {
    Invoice(InvoiceModel),
    Letterhead(LetterheadModel),
}

impl RenderingModel {
    pub fn kind(&self) -> DocumentKind {
        match self {
            RenderingModel::Invoice(_) => DocumentKind::Invoice,
            RenderingModel::Letterhead(_) => DocumentKind::Letterhead,
        }
    }

    pub fn template_version(&self) -> &str {
        match self {
            RenderingModel::Invoice(m) => &m.template_version,
            RenderingModel::Letterhead(m) => &m.template_version,
        }
    }

    pub fn is_preview(&self) -> bool {
        let watermark = match self {
            RenderingModel::Invoice(m) => &m.watermark,
            RenderingModel::Letterhead(m) => &m.watermark,
        };
        !watermark.is_empty()
    }

    /// Scalar placeholder values. Repeating regions (line rows, body
    /// blocks) are built by the renderer from the typed parts.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            RenderingModel::Invoice(m) => vec![
                ("invoice_number", m.invoice_number.clone()),
                ("issue_date", m.issue_date.clone()),
                ("due_date", m.due_date.clone()),
                ("client_name", m.client_name.clone()),
                ("client_address", m.client_address.clone()),
                ("client_contact", m.client_contact.clone()),
                ("currency", m.currency.clone()),
                ("subtotal", m.subtotal.clone()),
                ("tax_total", m.tax_total.clone()),
                ("total", m.total.clone()),
                ("watermark", m.watermark.clone()),
            ],
            RenderingModel::Letterhead(m) => vec![
                ("title", m.title.clone()),
                ("reference", m.reference.clone()),
                ("date", m.date.clone()),
                ("client_name", m.client_name.clone()),
                ("watermark", m.watermark.clone()),
            ],
        }
    }
}

/// Half-up rounding to cents. Banker's rounding would turn 12.345 into
/// 12.34, which is not what an invoice reader expects.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Fixed two-decimal money rendering with thousands grouping and an
/// explicit currency code; never the ambient locale.
pub fn format_money(currency: &str, amount: Decimal) -> String {
    let amount = round_money(amount);
    let negative = amount.is_sign_negative();
    let text = format!("{:.2}", amount.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let grouped = group_thousands(int_part);
    let sign = if negative { "-" } else { "" };
    format!("{currency} {sign}{grouped}.{frac_part}")
}

/// Quantities keep their stored scale, trailing zeros trimmed.
pub fn format_quantity(quantity: Decimal) -> String {
    quantity.normalize().to_string()
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let chars: Vec<char> = digits.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(*c);
    }
    out
}

fn line_model(currency: &str, item: &LineItem) -> LineModel {
    LineModel {
        description: item.description.clone(),
        quantity: format_quantity(item.quantity),
        unit_price: format_money(currency, item.unit_price),
        tax: format_money(currency, item.tax_amount()),
        amount: format_money(currency, item.net_amount()),
    }
}

fn client_contact(email: &str, phone: &str) -> String {
    format!("{email} / {phone}")
}

/// Assemble the final rendering model for a frozen invoice.
///
/// Fails with `InvalidState` for drafts: a financial artifact requires
/// issuance first. Drafts go through `assemble_invoice_preview`.
pub async fn assemble_invoice<S: RecordStore>(
    store: &S,
    invoice_id: i32,
) -> Result<RenderingModel, PipelineError> {
    let snapshot = store.invoice_snapshot(invoice_id).await?;
    let invoice = &snapshot.invoice;

    if invoice.status == InvoiceStatus::Draft {
        return Err(PipelineError::InvalidState(format!(
            "invoice #{invoice_id} is a draft; issue it or request a preview"
        )));
    }

    let number = invoice.number.clone().ok_or_else(|| {
        PipelineError::InvalidState(format!("issued invoice #{invoice_id} has no number"))
    })?;
    let template_version = invoice.template_version.clone().ok_or_else(|| {
        PipelineError::InvalidState(format!(
            "issued invoice #{invoice_id} has no bound template version"
        ))
    })?;

    let currency = invoice.currency.clone();
    Ok(RenderingModel::Invoice(InvoiceModel {
        invoice_number: number,
        issue_date: invoice.issue_date.format("%Y-%m-%d").to_string(),
        due_date: invoice.due_date.format("%Y-%m-%d").to_string(),
        client_name: snapshot.client.name.clone(),
        client_address: snapshot.client.address.clone().unwrap_or_default(),
        client_contact: client_contact(&snapshot.client.email, &snapshot.client.phone),
        lines: snapshot
            .line_items
            .iter()
            .map(|item| line_model(&currency, item))
            .collect(),
        // Frozen at issuance; not recomputed here.
        subtotal: format_money(&currency, invoice.subtotal),
        tax_total: format_money(&currency, invoice.tax_total),
        total: format_money(&currency, invoice.total),
        currency,
        watermark: String::new(),
        template_version,
    }))
}

/// Assemble a watermarked preview model for an invoice in any state.
///
/// The preview path never persists or distributes its artifact; totals for
/// drafts are computed on the fly since nothing is frozen yet.
pub async fn assemble_invoice_preview<S: RecordStore>(
    store: &S,
    invoice_id: i32,
    current_template_version: &str,
) -> Result<RenderingModel, PipelineError> {
    let snapshot = store.invoice_snapshot(invoice_id).await?;
    let invoice = &snapshot.invoice;
    let currency = invoice.currency.clone();

    let (subtotal, tax_total, total) = if invoice.status.is_frozen() {
        (invoice.subtotal, invoice.tax_total, invoice.total)
    } else {
        let subtotal: Decimal = snapshot.line_items.iter().map(LineItem::net_amount).sum();
        let tax_total: Decimal = snapshot.line_items.iter().map(LineItem::tax_amount).sum();
        let subtotal = round_money(subtotal);
        let tax_total = round_money(tax_total);
        (subtotal, tax_total, subtotal + tax_total)
    };

    let template_version = invoice
        .template_version
        .clone()
        .unwrap_or_else(|| current_template_version.to_string());

    Ok(RenderingModel::Invoice(InvoiceModel {
        invoice_number: invoice
            .number
            .clone()
            .unwrap_or_else(|| "(unassigned)".to_string()),
        issue_date: invoice.issue_date.format("%Y-%m-%d").to_string(),
        due_date: invoice.due_date.format("%Y-%m-%d").to_string(),
        client_name: snapshot.client.name.clone(),
        client_address: snapshot.client.address.clone().unwrap_or_default(),
        client_contact: client_contact(&snapshot.client.email, &snapshot.client.phone),
        lines: snapshot
            .line_items
            .iter()
            .map(|item| line_model(&currency, item))
            .collect(),
        subtotal: format_money(&currency, subtotal),
        tax_total: format_money(&currency, tax_total),
        total: format_money(&currency, total),
        currency,
        watermark: DRAFT_WATERMARK.to_string(),
        template_version,
    }))
}

/// Assemble the final rendering model for a finalized letterhead document.
pub async fn assemble_document<S: RecordStore>(
    store: &S,
    document_id: i32,
) -> Result<RenderingModel, PipelineError> {
    let snapshot = store.document_snapshot(document_id).await?;
    let document = &snapshot.document;

    if document.status == DocumentStatus::Draft {
        return Err(PipelineError::InvalidState(format!(
            "document #{document_id} is a draft; finalize it or request a preview"
        )));
    }
    let template_version = document.template_version.clone().ok_or_else(|| {
        PipelineError::InvalidState(format!(
            "finalized document #{document_id} has no bound template version"
        ))
    })?;

    Ok(RenderingModel::Letterhead(LetterheadModel {
        title: document.title.clone(),
        reference: document.reference.clone(),
        date: document.created_on.format("%Y-%m-%d").to_string(),
        client_name: snapshot.client.name.clone(),
        blocks: document.blocks.clone(),
        watermark: String::new(),
        template_version,
    }))
}

/// Watermarked preview of a letterhead document in any state.
pub async fn assemble_document_preview<S: RecordStore>(
    store: &S,
    document_id: i32,
    current_template_version: &str,
) -> Result<RenderingModel, PipelineError> {
    let snapshot = store.document_snapshot(document_id).await?;
    let document = &snapshot.document;

    Ok(RenderingModel::Letterhead(LetterheadModel {
        title: document.title.clone(),
        reference: document.reference.clone(),
        date: document.created_on.format("%Y-%m-%d").to_string(),
        client_name: snapshot.client.name.clone(),
        blocks: document.blocks.clone(),
        watermark: DRAFT_WATERMARK.to_string(),
        template_version: document
            .template_version
            .clone()
            .unwrap_or_else(|| current_template_version.to_string()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_is_fixed_precision_with_grouping() {
        assert_eq!(format_money("USD", Decimal::from(250)), "USD 250.00");
        assert_eq!(format_money("INR", Decimal::new(123456789, 2)), "INR 1,234,567.89");
        assert_eq!(format_money("EUR", Decimal::new(-95, 1)), "EUR -9.50");
        assert_eq!(format_money("USD", Decimal::new(12345, 3)), "USD 12.35");
    }

    #[test]
    fn midpoints_round_away_from_zero() {
        assert_eq!(round_money(Decimal::new(12345, 3)), Decimal::new(1235, 2));
        assert_eq!(round_money(Decimal::new(-12345, 3)), Decimal::new(-1235, 2));
    }

    #[test]
    fn quantities_trim_trailing_zeros() {
        assert_eq!(format_quantity(Decimal::new(2000, 3)), "2");
        assert_eq!(format_quantity(Decimal::new(25, 1)), "2.5");
    }
}
