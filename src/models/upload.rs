//! The inbound upload payload.

use serde::Deserialize;

/// Body of `POST /upload`.
///
/// `file` carries the raw content as base64 text. The caller may declare the
/// file's type through `fileName` or `fileExtension`; neither is trusted as the
/// stored name, they only feed extension classification.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    /// Base64-encoded file content.
    pub file: String,

    /// Original filename as reported by the client (e.g. "invoice.pdf").
    #[serde(default)]
    pub file_name: Option<String>,

    /// Explicit extension, with or without the leading dot.
    #[serde(default)]
    pub file_extension: Option<String>,
}

impl UploadRequest {
    /// Extension the caller declared, if any.
    ///
    /// `fileExtension` wins over the suffix of `fileName`.
    pub fn declared_extension(&self) -> Option<&str> {
        if let Some(ext) = self.file_extension.as_deref() {
            let ext = ext.trim();
            if !ext.is_empty() {
                return Some(ext);
            }
        }

        let name = self.file_name.as_deref()?.trim();
        let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
        match base.rfind('.') {
            Some(pos) if pos + 1 < base.len() => Some(&base[pos..]),
            // "archive." or no dot at all: the caller declared a name without a type
            _ => Some(""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(file_name: Option<&str>, file_extension: Option<&str>) -> UploadRequest {
        UploadRequest {
            file: String::new(),
            file_name: file_name.map(str::to_string),
            file_extension: file_extension.map(str::to_string),
        }
    }

    #[test]
    fn explicit_extension_takes_precedence() {
        let req = request(Some("photo.png"), Some(".pdf"));
        assert_eq!(req.declared_extension(), Some(".pdf"));
    }

    #[test]
    fn extension_comes_from_last_suffix_of_file_name() {
        let req = request(Some("dir/archive.tar.PNG"), None);
        assert_eq!(req.declared_extension(), Some(".PNG"));
    }

    #[test]
    fn name_without_suffix_declares_empty_extension() {
        assert_eq!(request(Some("README"), None).declared_extension(), Some(""));
        assert_eq!(request(Some("trailing."), None).declared_extension(), Some(""));
    }

    #[test]
    fn nothing_declared() {
        assert_eq!(request(None, None).declared_extension(), None);
        assert_eq!(request(None, Some("  ")).declared_extension(), None);
    }
}
