use crate::{Error, Result, config::UploadLimits, inference::InputImage};
use std::path::Path;

/// Checks an upload against the MIME allow-list and the size limit.
pub fn validate_upload(image: &InputImage, limits: &UploadLimits) -> Result<()> {
    if image.bytes.is_empty() {
        return Err(Error::invalid_upload(format!(
            "{} is empty",
            image.file_name
        )));
    }

    let allowed = limits
        .allowed_mime_types
        .iter()
        .any(|mime| mime.eq_ignore_ascii_case(&image.mime_type));
    if !allowed {
        return Err(Error::invalid_upload(format!(
            "{} must be one of: {}",
            image.file_name,
            limits.allowed_mime_types.join(", ")
        )));
    }

    if image.size() > limits.max_file_size {
        return Err(Error::invalid_upload(format!(
            "{} exceeds the {}MB size limit",
            image.file_name,
            limits.max_file_size as f64 / (1024.0 * 1024.0)
        )));
    }

    Ok(())
}

pub fn content_type_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("glb") => "model/gltf-binary",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}
