//! Turns fetched bytes into something the classifier can read.
//!
//! Office OpenXML documents are flattened to plain text; everything else is
//! passed through with a content type guessed from the key's extension.

use bytes::Bytes;
use std::path::Path;
use tracing::{debug, trace};

pub const TEXT_PLAIN: &str = "text/plain";
pub const OCTET_STREAM: &str = "application/octet-stream";

const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub bytes: Bytes,
    pub content_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OfficeFormat {
    Docx,
    Xlsx,
}

fn extension(key: &str) -> Option<String> {
    Path::new(key)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

pub fn guess_content_type(key: &str) -> &'static str {
    match extension(key).as_deref() {
        Some("doc") => "application/msword",
        Some("xls") => "application/vnd.ms-excel",
        Some("docx") => DOCX,
        Some("xlsx") => XLSX,
        Some("txt" | "json" | "jsonl") => TEXT_PLAIN,
        Some("html" | "htm") => "text/html",
        Some("csv") => "text/csv",
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        _ => OCTET_STREAM,
    }
}

fn office_format(key: &str) -> Option<OfficeFormat> {
    match extension(key).as_deref() {
        Some("docx") => Some(OfficeFormat::Docx),
        Some("xlsx") => Some(OfficeFormat::Xlsx),
        _ => None,
    }
}

/// Never fails: an office document that cannot be read is handed on as
/// opaque bytes.
pub fn normalize(key: &str, bytes: Bytes) -> Document {
    let Some(format) = office_format(key) else {
        return Document {
            bytes,
            content_type: guess_content_type(key).to_string(),
        };
    };

    let extracted = match format {
        OfficeFormat::Docx => docx_text(&bytes),
        OfficeFormat::Xlsx => xlsx_text(&bytes),
    };
    match extracted {
        Ok(text) => {
            trace!(key, chars = text.len(), "Converted office document to text");
            Document {
                bytes: Bytes::from(text),
                content_type: TEXT_PLAIN.to_string(),
            }
        }
        Err(e) => {
            debug!(key, error = %e, "Office extraction failed; sending raw bytes");
            Document {
                bytes,
                content_type: OCTET_STREAM.to_string(),
            }
        }
    }
}

#[cfg(feature = "office")]
fn docx_text(bytes: &[u8]) -> anyhow::Result<String> {
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;
    use std::io::Read;

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")?
        .read_to_string(&mut xml)?;

    let mut reader = Reader::from_str(&xml);
    let mut text = String::new();
    let mut in_run = false;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_run = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_run = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Event::Empty(e) if e.name().as_ref() == b"w:tab" => text.push('\t'),
            Event::Text(t) if in_run => text.push_str(&t.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text)
}

#[cfg(feature = "office")]
fn xlsx_text(bytes: &[u8]) -> anyhow::Result<String> {
    use calamine::{open_workbook_from_rs, DataType, Reader, Xlsx};

    let mut workbook: Xlsx<_> = open_workbook_from_rs(std::io::Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow::anyhow!("workbook has no worksheets"))??;

    let mut text = String::new();
    for row in range.rows() {
        for cell in row {
            if matches!(cell, DataType::Empty) {
                continue;
            }
            text.push_str(&cell.to_string());
            text.push(' ');
        }
        text.push('\n');
    }
    Ok(text)
}

#[cfg(not(feature = "office"))]
fn docx_text(_bytes: &[u8]) -> anyhow::Result<String> {
    anyhow::bail!("built without office support")
}

#[cfg(not(feature = "office"))]
fn xlsx_text(_bytes: &[u8]) -> anyhow::Result<String> {
    anyhow::bail!("built without office support")
}
