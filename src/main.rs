use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use docpress::compile::EngineCompiler;
use docpress::config;
use docpress::db::Database;
use docpress::mailer::Mailer;
use docpress::models::{Actor, Role};
use docpress::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "docpress", about = "Invoice and document generation pipeline")]
struct Cli {
    /// Acting user, recorded in the audit trail.
    #[arg(long, global = true, default_value = "cli")]
    actor: String,

    /// Role of the acting user: super_admin, operations or viewer.
    #[arg(long, global = true, default_value = "operations")]
    role: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Invoice,
    Letterhead,
}

#[derive(Subcommand)]
enum Command {
    /// Issue a draft invoice: assign its number and freeze totals.
    Issue { invoice_id: i32 },

    /// Void an issued invoice. Requires --confirm.
    Void {
        invoice_id: i32,
        #[arg(long)]
        confirm: bool,
    },

    /// Finalize a draft letterhead document.
    Finalize { document_id: i32 },

    /// Generate the final PDF artifact for a frozen record.
    Generate {
        record_id: i32,
        #[arg(long, value_enum, default_value = "invoice")]
        kind: Kind,
        /// Where to write the PDF.
        #[arg(long, default_value = "out.pdf")]
        out: String,
    },

    /// Render a watermarked draft preview. Never persisted.
    Preview {
        record_id: i32,
        #[arg(long, value_enum, default_value = "invoice")]
        kind: Kind,
        #[arg(long, default_value = "preview.pdf")]
        out: String,
    },

    /// Generate an invoice artifact and email it as an attachment.
    Send {
        invoice_id: i32,
        recipient: String,
        #[arg(long, default_value = "Your invoice")]
        subject: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let Some(role) = Role::parse(&cli.role) else {
        bail!("unknown role {:?}; expected super_admin, operations or viewer", cli.role);
    };
    let actor = Actor::new(&cli.actor, role);

    let config = config::init()?;
    let db = Database::new(&config).await?;
    db.run_migrations().await?;

    let compiler = Arc::new(EngineCompiler::new(&config));
    let pipeline = Pipeline::new(db, compiler);

    match cli.command {
        Command::Issue { invoice_id } => {
            let invoice = pipeline.issue_invoice(&actor, invoice_id).await?;
            println!(
                "issued invoice #{invoice_id} as {}",
                invoice.number.as_deref().unwrap_or("?")
            );
        }
        Command::Void {
            invoice_id,
            confirm,
        } => {
            let invoice = pipeline.void_invoice(&actor, invoice_id, confirm).await?;
            println!(
                "voided invoice {}",
                invoice.number.as_deref().unwrap_or("?")
            );
        }
        Command::Finalize { document_id } => {
            let document = pipeline.finalize_document(&actor, document_id).await?;
            println!("finalized document #{} ({})", document.id, document.title);
        }
        Command::Generate { record_id, kind, out } => {
            let generated = match kind {
                Kind::Invoice => pipeline.generate_invoice(&actor, record_id).await?,
                Kind::Letterhead => pipeline.generate_letterhead(&actor, record_id).await?,
            };
            tokio::fs::write(&out, &generated.pdf)
                .await
                .with_context(|| format!("writing {out}"))?;
            println!(
                "wrote {out} ({} bytes, sha256 {})",
                generated.receipt.byte_length,
                generated.receipt.short_checksum()
            );
        }
        Command::Preview { record_id, kind, out } => {
            let pdf = match kind {
                Kind::Invoice => pipeline.preview_invoice(&actor, record_id).await?,
                Kind::Letterhead => pipeline.preview_letterhead(&actor, record_id).await?,
            };
            tokio::fs::write(&out, &pdf)
                .await
                .with_context(|| format!("writing {out}"))?;
            println!("wrote draft preview {out} ({} bytes)", pdf.len());
        }
        Command::Send {
            invoice_id,
            recipient,
            subject,
        } => {
            let mailer = Mailer::from_config(&config)?;
            let generated = pipeline.generate_invoice(&actor, invoice_id).await?;
            let body = format!(
                "Please find the attached invoice.\n\nSHA-256: {}\n",
                generated.receipt.checksum
            );
            mailer
                .send_artifact(
                    &recipient,
                    &subject,
                    &body,
                    &generated.key,
                    &generated.receipt,
                    generated.pdf.clone(),
                )
                .await?;
            println!("sent invoice #{invoice_id} to {recipient}");
        }
    }

    Ok(())
}
