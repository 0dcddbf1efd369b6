//! Content handling for multimodal models.

/// Image extensions recognised in bare URL content.
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Whether `content` is an http(s) URL whose path ends in an image extension.
///
/// Query strings and fragments are ignored when checking the extension.
pub fn is_image_url(content: &str) -> bool {
    let url = content.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return false;
    }
    if url.contains(char::is_whitespace) {
        return false;
    }
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}
