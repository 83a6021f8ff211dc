//! Renders a finished roster into downloadable artifacts.
//!
//! Every encoder preserves the result's order and writes one entry per user.

use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::{
    domain::{AggregationResult, ChatId, Counters, UserRecord},
    errors::Error,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Tabular,
    Structured,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::Tabular => "csv",
            ExportFormat::Structured => "json",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Text => "text/plain; charset=utf-8",
            ExportFormat::Tabular => "text/csv; charset=utf-8",
            ExportFormat::Structured => "application/json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" | "txt" => Ok(ExportFormat::Text),
            "tabular" | "csv" => Ok(ExportFormat::Tabular),
            "structured" | "json" => Ok(ExportFormat::Structured),
            other => Err(Error::Validation(format!("unknown export format: {other:?}"))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Text => "text",
            ExportFormat::Tabular => "tabular",
            ExportFormat::Structured => "structured",
        })
    }
}

/// Encoded bytes plus the metadata a transport needs to offer them as a download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

pub fn encode(result: &AggregationResult, format: ExportFormat) -> Result<Artifact> {
    let body = match format {
        ExportFormat::Text => render_text(&result.users).into_bytes(),
        ExportFormat::Tabular => render_csv(&result.users)?,
        ExportFormat::Structured => render_json(result)?,
    };
    Ok(Artifact {
        filename: filename_for(result.conversation_id, format),
        content_type: format.content_type(),
        body,
    })
}

pub fn filename_for(conversation_id: ChatId, format: ExportFormat) -> String {
    format!("users_{}.{}", conversation_id, format.extension())
}

/// `Name | @handle | ID: 1 | Tel: +1...`, one line per user; empty segments are omitted.
pub fn render_text(users: &[UserRecord]) -> String {
    let mut out = String::new();
    for u in users {
        let mut parts = vec![u.display_name.clone()];
        if let Some(h) = &u.handle {
            parts.push(format!("@{h}"));
        }
        parts.push(format!("ID: {}", u.id.0));
        if let Some(p) = &u.phone {
            parts.push(format!("Tel: {p}"));
        }
        out.push_str(&parts.join(" | "));
        out.push('\n');
    }
    out
}

const CSV_HEADER: [&str; 6] = ["id", "first_name", "last_name", "username", "phone", "source"];

pub fn render_csv(users: &[UserRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for u in users {
        writer.write_record([
            u.id.0.to_string(),
            u.first_name.clone(),
            u.last_name.clone(),
            u.handle.clone().unwrap_or_default(),
            u.phone.clone().unwrap_or_default(),
            u.provenance.as_str().to_string(),
        ])?;
    }

    writer.flush()?;
    writer.into_inner().map_err(|e| Error::Io(e.into_error()))
}

#[derive(Serialize)]
struct StructuredExport<'a> {
    conversation_id: ChatId,
    total: usize,
    counters: &'a Counters,
    users: &'a [UserRecord],
}

pub fn render_json(result: &AggregationResult) -> Result<Vec<u8>> {
    let doc = StructuredExport {
        conversation_id: result.conversation_id,
        total: result.total(),
        counters: &result.counters,
        users: &result.users,
    };
    let mut body = serde_json::to_vec_pretty(&doc)?;
    body.push(b'\n');
    Ok(body)
}
