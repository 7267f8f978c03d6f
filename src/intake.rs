//! Attachment intake: copies spreadsheet attachments from matching messages
//! into per-sender folders of the object store.

use anyhow::{Context, Result};

use crate::{
    config::IntakeConfig,
    context::RunContext,
    store::{AttachmentRef, MessageFilter, MessageMetadata, MessageStore, ObjectStore, XLSX_MIME},
};

pub const SPREADSHEET_EXTENSIONS: &[&str] = &[".xls", ".xlsx", ".xlsm"];
const MAX_NAME_CHARS: usize = 100;
const MAX_STEM_CHARS: usize = 95;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntakeReport {
    pub messages_found: usize,
    pub messages_with_uploads: usize,
    pub attachments_uploaded: usize,
    pub failures: usize,
}

/// Replaces characters unsafe in file names and caps the length, keeping the
/// extension when the name has to be shortened.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect::<String>();
    if cleaned.chars().count() <= MAX_NAME_CHARS {
        return cleaned;
    }
    match cleaned.rsplit_once('.') {
        Some((stem, extension)) => {
            let stem = stem.chars().take(MAX_STEM_CHARS).collect::<String>();
            format!("{stem}.{extension}")
        }
        None => cleaned.chars().take(MAX_NAME_CHARS).collect(),
    }
}

/// The bare address from a `Name <addr>` sender header.
pub fn sender_address(sender: &str) -> &str {
    match sender.split_once('<') {
        Some((_, rest)) => match rest.split_once('>') {
            Some((address, _)) => address.trim(),
            None => sender.trim(),
        },
        None => sender.trim(),
    }
}

pub fn is_spreadsheet_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SPREADSHEET_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Searches for messages, then uploads every spreadsheet attachment. A
/// failing search or base folder is fatal; a failing message or attachment is
/// logged and counted.
pub fn run_intake(
    messages: &dyn MessageStore,
    objects: &dyn ObjectStore,
    config: &IntakeConfig,
    ctx: &mut RunContext,
) -> Result<IntakeReport> {
    ctx.info("Starting attachment intake");
    let filter = MessageFilter::new(
        &config.sender,
        &config.keywords,
        config.days_back,
        config.max_results,
    );
    ctx.info(format!("Searching messages: {}", filter.to_query()));
    let ids = messages
        .search_messages(&filter)
        .context("Searching messages")?;
    ctx.set_progress(0.25);
    let mut report = IntakeReport {
        messages_found: ids.len(),
        ..IntakeReport::default()
    };
    ctx.info(format!("Found {} matching message(s)", ids.len()));
    if ids.is_empty() {
        ctx.set_progress(1.0);
        return Ok(report);
    }

    let base_folder = objects
        .create_folder(&config.base_folder, &config.parent_folder)
        .with_context(|| format!("Creating base folder '{}'", config.base_folder))?;
    ctx.set_progress(0.5);

    let total = ids.len();
    for (idx, id) in ids.iter().enumerate() {
        match messages.get_message_metadata(id) {
            Ok(message) => {
                let subject = message.subject.chars().take(50).collect::<String>();
                ctx.info(format!("Processing message '{subject}' from {}", message.sender));
                let uploaded = upload_attachments(messages, objects, &message, &base_folder, ctx, &mut report);
                if uploaded > 0 {
                    report.messages_with_uploads += 1;
                    report.attachments_uploaded += uploaded;
                    ctx.info(format!("Uploaded {uploaded} attachment(s) from '{subject}'"));
                }
            }
            Err(err) => {
                report.failures += 1;
                ctx.error(format!("Failed to read message {id}: {err}"));
            }
        }
        ctx.set_progress(0.5 + (idx + 1) as f64 / total as f64 * 0.45);
    }

    ctx.set_progress(1.0);
    ctx.success(format!(
        "Intake completed: {} attachment(s) from {} message(s)",
        report.attachments_uploaded, report.messages_with_uploads
    ));
    Ok(report)
}

fn upload_attachments(
    messages: &dyn MessageStore,
    objects: &dyn ObjectStore,
    message: &MessageMetadata,
    base_folder: &str,
    ctx: &mut RunContext,
    report: &mut IntakeReport,
) -> usize {
    let mut uploaded = 0;
    for attachment in message
        .attachments
        .iter()
        .filter(|a| is_spreadsheet_name(&a.filename))
    {
        match upload_attachment(messages, objects, message, attachment, base_folder) {
            Ok(id) => {
                uploaded += 1;
                ctx.info(format!("Uploaded spreadsheet {} as {id}", attachment.filename));
            }
            Err(err) => {
                report.failures += 1;
                ctx.error(format!(
                    "Failed to process attachment {}: {err:#}",
                    attachment.filename
                ));
            }
        }
    }
    uploaded
}

fn upload_attachment(
    messages: &dyn MessageStore,
    objects: &dyn ObjectStore,
    message: &MessageMetadata,
    attachment: &AttachmentRef,
    base_folder: &str,
) -> Result<String> {
    let bytes = messages
        .get_message_attachment(&message.id, &attachment.id)
        .context("Downloading attachment")?;
    let sender_folder = sanitize_filename(sender_address(&message.sender));
    let folder = objects
        .create_folder(&sender_folder, base_folder)
        .with_context(|| format!("Creating sender folder '{sender_folder}'"))?;
    let name = format!("{}_{}", message.id, sanitize_filename(&attachment.filename));
    Ok(objects
        .upload_file(&name, &folder, &bytes, XLSX_MIME)
        .with_context(|| format!("Uploading {name}"))?)
}
