// frame.rs — Strips the data-URL transport envelope from a captured frame,
// leaving the raw base64 payload for outbound provider calls.

use crate::pipeline::AnalysisError;

/// Strip a `data:<mime>;base64,` prefix from a captured frame string.
///
/// Input without a `data:` prefix is assumed to already be the raw payload
/// and passes through unchanged. Empty input, or an envelope with no
/// embedded payload, is rejected.
pub fn strip_data_url(input: &str) -> Result<&str, AnalysisError> {
    if input.is_empty() {
        return Err(AnalysisError::InvalidImageData);
    }

    if !input.starts_with("data:") {
        return Ok(input);
    }

    let payload = input
        .split_once(";base64,")
        .map(|(_, payload)| payload)
        .ok_or(AnalysisError::InvalidImageData)?;

    if payload.is_empty() {
        return Err(AnalysisError::InvalidImageData);
    }

    Ok(payload)
}
