use serde::{Deserialize, Serialize};

use crate::geometry::Size;
use crate::order::PieceRef;
use crate::placement::PlacementData;

pub const PIECE_URL_PREFIX: &str = "/static/pieces/";
pub const REBUILT_RESULT_REF: &str = "/static/rebuilt/rebuilt.png";
pub const ARCHIVE_FILE_NAME: &str = "pieces.zip";
pub const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["png"];

pub fn piece_file_name(index: usize) -> String {
    format!("piece_{index:02}.png")
}

/// Cell number encoded in a `piece_N.png` name.
pub fn piece_number(file_name: &str) -> Option<usize> {
    file_name
        .strip_prefix("piece_")?
        .rsplit_once('.')
        .and_then(|(digits, _)| digits.parse().ok())
}

/// Content locator for a piece image. A cache token forces a fresh fetch
/// after the piece set changes under the same names.
pub fn piece_url(id: &PieceRef, cache_token: Option<&str>) -> String {
    match cache_token {
        Some(token) => format!("{PIECE_URL_PREFIX}{id}?v={token}"),
        None => format!("{PIECE_URL_PREFIX}{id}"),
    }
}

/// Identifier named by a locator or bare file name: the last path segment,
/// without any query string.
pub fn piece_ref_from_locator(locator: &str) -> PieceRef {
    let path = locator.split(['?', '#']).next().unwrap_or(locator);
    let name = path.rsplit('/').next().unwrap_or(path);
    PieceRef::new(name)
}

pub fn is_allowed_image(file_name: &str) -> bool {
    file_name.rsplit_once('.').is_some_and(|(_, ext)| {
        ALLOWED_IMAGE_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed))
    })
}

/// Uploaded source image. Pixels are opaque to the engine; the declared
/// size stands in for decoding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageUpload {
    pub file_name: String,
    pub image_size: Size,
    #[serde(default)]
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitRequest {
    pub image: ImageUpload,
    pub piece_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitResponse {
    pub pieces: Vec<PieceRef>,
    pub image_size: Size,
    pub runtime_secs: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShuffleResponse {
    pub pieces: Vec<PieceRef>,
    pub runtime_secs: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconstructRequest {
    pub order: Vec<PieceRef>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconstructResponse {
    pub result_ref: String,
    pub placement: PlacementData,
    pub runtime_secs: f64,
}

/// Previously downloaded piece archive, listed by entry name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchiveUpload {
    pub file_name: String,
    pub entries: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoadArchiveRequest {
    pub archive: ArchiveUpload,
    pub piece_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoadArchiveResponse {
    pub pieces: Vec<PieceRef>,
    pub runtime_secs: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadArchiveResponse {
    pub file_name: String,
    pub entries: Vec<PieceRef>,
}
