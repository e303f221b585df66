//! Upload endpoint reply parsing.

use serde::Deserialize;

use crate::error::{Error, Result};

/// A file accepted by the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedFile {
    /// Attachment id to reference in a subsequent message request.
    pub aid: String,
    /// Content type as detected or confirmed by the server.
    #[serde(rename = "ct", default)]
    pub content_type: String,
    /// Stored filename.
    #[serde(default)]
    pub filename: String,
    /// Size in bytes.
    #[serde(rename = "s", default)]
    pub size: u64,
}

/// Parses an `fmt=extended,raw` upload reply.
///
/// The reply is `<status>,'<request id>',<json array>`, for example
/// `200,'null',[{"aid":"a1:b2","ct":"image/png","filename":"x.png","s":12}]`.
///
/// # Errors
///
/// Returns `Error::Upload` for non-200 statuses and `Error::InvalidResponse`
/// when the reply is malformed.
pub fn parse_upload_reply(text: &str) -> Result<Vec<UploadedFile>> {
    let mut parts = text.trim().splitn(3, ',');

    let status: u16 = parts
        .next()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| Error::InvalidResponse(format!("bad upload status in {text:?}")))?;
    if status != 200 {
        return Err(Error::Upload(status));
    }

    // Request id, echoed back quoted. Unused.
    parts.next();

    let files = parts
        .next()
        .ok_or_else(|| Error::InvalidResponse("upload reply has no file list".into()))?;
    Ok(serde_json::from_str(files.trim())?)
}
