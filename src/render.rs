//! Renderer: pure substitution of a closed model into a template bundle.
//!
//! No conditionals, no loops, no expressions in templates. Repeating
//! regions (invoice lines, letterhead body blocks) are built here in code
//! and substituted as pre-built markup. Every model value is HTML-escaped;
//! only renderer-built fragments and the embedded stylesheet go in raw.
//! Same model + same bundle always yields the same bytes.

use std::collections::HashMap;

use crate::assemble::{LineModel, RenderingModel};
use crate::error::PipelineError;
use crate::models::ContentBlock;
use crate::template::TemplateBundle;

/// Escape text for placement inside HTML element or attribute content.
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn line_rows(lines: &[LineModel], with_tax_column: bool) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str("    <tr>\n");
        out.push_str(&format!(
            "      <td class=\"desc\">{}</td>\n",
            escape_html(&line.description)
        ));
        out.push_str(&format!(
            "      <td class=\"num\">{}</td>\n",
            escape_html(&line.quantity)
        ));
        out.push_str(&format!(
            "      <td class=\"num\">{}</td>\n",
            escape_html(&line.unit_price)
        ));
        if with_tax_column {
            out.push_str(&format!(
                "      <td class=\"num\">{}</td>\n",
                escape_html(&line.tax)
            ));
        }
        out.push_str(&format!(
            "      <td class=\"num\">{}</td>\n",
            escape_html(&line.amount)
        ));
        out.push_str("    </tr>\n");
    }
    out
}

fn body_blocks(blocks: &[ContentBlock]) -> String {
    let mut out = String::new();
    for block in blocks {
        out.push_str(&format!("  <h2>{}</h2>\n", escape_html(&block.heading)));
        out.push_str(&format!("  <p>{}</p>\n", escape_html(&block.body)));
    }
    out
}

/// Substitute the model into the bundle's markup.
///
/// Any `{{placeholder}}` the model cannot satisfy aborts the render with
/// `IncompleteModel`; a partially filled document never reaches the
/// compiler.
pub fn render(bundle: &TemplateBundle, model: &RenderingModel) -> Result<String, PipelineError> {
    let mut values: HashMap<&str, String> = HashMap::new();
    for (name, value) in model.fields() {
        values.insert(name, escape_html(&value));
    }
    // Raw substitutions: built in code, never from model text directly.
    values.insert("print_styles", bundle.stylesheet.to_string());
    match model {
        RenderingModel::Invoice(m) => {
            let with_tax = bundle.markup.contains(">Tax</th>");
            values.insert("line_rows", line_rows(&m.lines, with_tax));
        }
        RenderingModel::Letterhead(m) => {
            values.insert("body_blocks", body_blocks(&m.blocks));
        }
    }

    let markup = bundle.markup;
    let mut out = String::with_capacity(markup.len());
    let mut rest = markup;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            PipelineError::IncompleteModel {
                placeholder: "unterminated placeholder".to_string(),
            }
        })?;
        let name = after[..end].trim();
        let value = values
            .get(name)
            .ok_or_else(|| PipelineError::IncompleteModel {
                placeholder: name.to_string(),
            })?;
        out.push_str(value);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::{InvoiceModel, LetterheadModel};
    use crate::models::DocumentKind;
    use crate::template;

    fn sample_invoice_model() -> RenderingModel {
        RenderingModel::Invoice(InvoiceModel {
            invoice_number: "2024-00042".to_string(),
            issue_date: "2024-03-01".to_string(),
            due_date: "2024-03-31".to_string(),
            client_name: "Mehta & Sons <Pvt>".to_string(),
            client_address: "14 Ridge Road, Pune".to_string(),
            client_contact: "accounts@mehta.example / +91 20 5550 1234".to_string(),
            currency: "INR".to_string(),
            lines: vec![LineModel {
                description: "Consulting".to_string(),
                quantity: "2".to_string(),
                unit_price: "INR 5,000.00".to_string(),
                tax: "INR 1,800.00".to_string(),
                amount: "INR 10,000.00".to_string(),
            }],
            subtotal: "INR 10,000.00".to_string(),
            tax_total: "INR 1,800.00".to_string(),
            total: "INR 11,800.00".to_string(),
            watermark: String::new(),
            template_version: "v3".to_string(),
        })
    }

    #[test]
    fn model_values_are_escaped() {
        let bundle = template::resolve(DocumentKind::Invoice, "v3").unwrap();
        let html = render(bundle, &sample_invoice_model()).unwrap();
        assert!(html.contains("Mehta &amp; Sons &lt;Pvt&gt;"));
        assert!(!html.contains("<Pvt>"));
    }

    #[test]
    fn rows_match_template_columns() {
        let model = sample_invoice_model();
        let v3 = render(template::resolve(DocumentKind::Invoice, "v3").unwrap(), &model).unwrap();
        assert!(v3.contains("INR 1,800.00"));

        let v1 = render(template::resolve(DocumentKind::Invoice, "v1").unwrap(), &model).unwrap();
        let row = v1.split("<tbody>").nth(1).unwrap();
        let row = row.split("</tbody>").next().unwrap();
        assert_eq!(row.matches("<td").count(), 4);
    }

    #[test]
    fn rendering_is_deterministic() {
        let bundle = template::resolve(DocumentKind::Invoice, "v3").unwrap();
        let model = sample_invoice_model();
        assert_eq!(
            render(bundle, &model).unwrap(),
            render(bundle, &model).unwrap()
        );
    }

    #[test]
    fn unresolved_placeholder_aborts() {
        let bundle = TemplateBundle {
            kind: DocumentKind::Invoice,
            version: "test",
            markup: "<p>{{no_such_field}}</p>",
            stylesheet: "",
        };
        let err = render(&bundle, &sample_invoice_model()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::IncompleteModel { ref placeholder } if placeholder == "no_such_field"
        ));
    }

    #[test]
    fn letterhead_blocks_render_in_order() {
        let bundle = template::resolve(DocumentKind::Letterhead, "v1").unwrap();
        let model = RenderingModel::Letterhead(LetterheadModel {
            title: "Engagement Letter".to_string(),
            reference: "ENG/2024/007".to_string(),
            date: "2024-04-02".to_string(),
            client_name: "Joshi Textiles".to_string(),
            blocks: vec![
                ContentBlock {
                    heading: "Scope".to_string(),
                    body: "Audit of FY 2023-24 accounts.".to_string(),
                },
                ContentBlock {
                    heading: "Fees".to_string(),
                    body: "As per schedule A.".to_string(),
                },
            ],
            watermark: String::new(),
            template_version: "v1".to_string(),
        });
        let html = render(bundle, &model).unwrap();
        let scope = html.find("Scope").unwrap();
        let fees = html.find("Fees").unwrap();
        assert!(scope < fees);
    }
}
