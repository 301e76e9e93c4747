//! Utility helpers used across the crate.
//!
//! Small convenience functions for HTTP metadata and filename resolution.
use crate::error::PlanningError;
use percent_encoding::percent_decode_str;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, HeaderMap};
use sanitize_filename::sanitize;
use url::Url;

/// What the preliminary request tells us about the remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub content_length: u64,
    /// Filename announced through `Content-Disposition`, already decoded.
    pub disposition_filename: Option<String>,
}

/// Issues the preliminary GET and reads the resource size and announced name.
///
/// The body is never read; dropping the response closes the transfer.
///
/// # Errors
///
/// Returns an error if:
/// * The network request fails or the server answers with an error status.
/// * The server does not provide a `Content-Length` header.
/// * The `Content-Length` header is not an integer.
pub async fn probe_resource(
    url: &str,
    client: &reqwest::Client,
) -> Result<ResourceInfo, PlanningError> {
    let response = client.get(url).send().await?.error_for_status()?;
    resource_info(response.headers())
}

fn resource_info(headers: &HeaderMap) -> Result<ResourceInfo, PlanningError> {
    let raw = headers
        .get(CONTENT_LENGTH)
        .ok_or(PlanningError::MissingContentLength)?;
    let value = String::from_utf8_lossy(raw.as_bytes()).to_string();
    let content_length = value
        .trim()
        .parse::<u64>()
        .map_err(|_| PlanningError::InvalidContentLength { value })?;

    let disposition_filename = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_disposition);

    Ok(ResourceInfo {
        content_length,
        disposition_filename,
    })
}

/// Extracts the filename parameter of a `Content-Disposition` header.
///
/// The RFC 5987 `filename*=charset''value` form wins over plain `filename=`.
/// Each value is percent-decoded exactly once.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let params = split_params(header);

    let extended = params.iter().find_map(|p| {
        let (key, value) = p.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename*") {
            return None;
        }
        let value = value.trim();
        let encoded = value.rsplit_once("''").map_or(value, |(_, v)| v);
        Some(percent_decode_str(encoded).decode_utf8_lossy().to_string())
    });

    let name = extended.or_else(|| {
        params.iter().find_map(|p| {
            let (key, value) = p.split_once('=')?;
            key.trim().eq_ignore_ascii_case("filename").then(|| {
                let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                percent_decode_str(value).decode_utf8_lossy().to_string()
            })
        })
    })?;

    let name = sanitize(name);
    (!name.is_empty()).then_some(name)
}

/// Splits header parameters on `;`, except inside double quotes.
fn split_params(header: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in header.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ';' if !quoted => {
                params.push(header[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(header[start..].trim());
    params
}

/// Extracts a clean filename from a URL.
///
/// 1. Parses the URL.
/// 2. Uses the `filename` query parameter when the link carries one,
///    otherwise the last segment of the path.
/// 3. URL-decodes it (converts %20 to space, etc.).
/// 4. Sanitizes it to remove characters invalid for the OS.
///
/// Returns `None` when nothing usable is left.
pub fn get_filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;

    let from_query = parsed
        .query_pairs()
        .find(|(key, _)| key == "filename")
        .map(|(_, value)| value.into_owned());

    let from_path = || {
        parsed
            .path_segments()
            .and_then(|mut s| s.next_back().map(str::to_string))
            .map(|s| percent_decode_str(&s).decode_utf8_lossy().to_string())
    };

    from_query
        .or_else(from_path)
        .map(sanitize)
        .filter(|s| !s.is_empty())
}

/// Shortens `filename` to at most `max_length` characters, keeping the extension.
///
/// Only the stem is cut. If the extension alone does not fit, the whole name is
/// cut to `max_length` instead.
pub fn truncate_filename(filename: &str, max_length: usize) -> String {
    if filename.chars().count() <= max_length {
        return filename.to_string();
    }

    let (stem, extension) = split_extension(filename);
    let extension_len = extension.chars().count();

    if extension_len >= max_length {
        return filename.chars().take(max_length).collect();
    }

    let mut truncated: String = stem.chars().take(max_length - extension_len).collect();
    truncated.push_str(extension);
    truncated
}

/// Splits `name` into stem and extension (with its dot). A leading dot, as in
/// `.bashrc`, does not start an extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => name.split_at(pos),
        _ => (name, ""),
    }
}

/// Picks the name the final file is saved under, before truncation.
pub fn resolve_filename(url: &str, info: &ResourceInfo) -> Option<String> {
    info.disposition_filename
        .clone()
        .or_else(|| get_filename_from_url(url))
}
