//! PDF text extraction — bytes in, plain text out, or a reported failure.
//!
//! Stateless: a failed extraction never touches session state. The parser wants
//! a file path, so bytes land in a scoped temp file that is removed on every
//! exit path when the handle drops.

use std::io::Write;

use crate::errors::AppError;

/// Extracts the concatenated plain text of an uploaded PDF.
/// Fails with `UnreadablePdf` when parsing errors or no page yields text.
pub async fn extract_resume_text(bytes: Vec<u8>) -> Result<String, AppError> {
    // Parsing is CPU-bound and synchronous; keep it off the async runtime.
    let text = tokio::task::spawn_blocking(move || extract_blocking(&bytes))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("extraction task failed: {e}")))??;

    Ok(text)
}

fn extract_blocking(bytes: &[u8]) -> Result<String, AppError> {
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("could not create temp file: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("could not write temp file: {e}")))?;

    let text = pdf_extract::extract_text(tmp.path())
        .map_err(|e| AppError::UnreadablePdf(e.to_string()))?;

    let text = normalize_pages(&text);
    if text.is_empty() {
        return Err(AppError::UnreadablePdf(
            "no extractable text in any page".to_string(),
        ));
    }

    Ok(text)
}

/// Collapses the extractor's page breaks into single blank lines and trims
/// the result, so downstream prompts see `page\n\npage` regardless of how
/// many form feeds or blank runs the parser emitted.
fn normalize_pages(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0usize;

    for line in raw.lines() {
        let line = line.trim_end_matches('\u{c}');
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        blank_run = 0;
        out.push_str(line.trim_end());
    }

    out.trim().to_string()
}
