//! Reads a scanned image off disk and encodes it as a base64 data-URI
//! payload suitable for [`mediacat_llm::ContentPart::image`] (§6: "messages
//! carrying inline image data URIs").

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use camino::Utf8Path;
use mediacat_llm::ContentPart;

#[derive(Debug, thiserror::Error)]
pub enum ImageLoadError {
    #[error("failed to read image {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported image extension in {path}")]
    UnsupportedExtension { path: String },
}

fn media_type_for(path: &Utf8Path) -> Result<&'static str, ImageLoadError> {
    match path.extension().map(str::to_ascii_lowercase).as_deref() {
        Some("png") => Ok("image/png"),
        Some("jpg") | Some("jpeg") => Ok("image/jpeg"),
        _ => Err(ImageLoadError::UnsupportedExtension { path: path.to_string() }),
    }
}

/// Loads and base64-encodes the image at `path`, returning a ready-to-embed
/// [`ContentPart`].
pub fn load_image(path: &Utf8Path) -> Result<ContentPart, ImageLoadError> {
    let media_type = media_type_for(path)?;
    let bytes = std::fs::read(path.as_std_path()).map_err(|source| ImageLoadError::Read {
        path: path.to_string(),
        source,
    })?;
    let data = STANDARD.encode(bytes);
    Ok(ContentPart::image(media_type, data))
}
