pub mod chat;
pub mod conversations;
pub mod health;
pub mod session_attachments;
pub mod system_messages;
pub mod vector_files;
pub mod web_scraper;

/// Upload types accepted for extraction and indexing.
const ALLOWED_EXTENSIONS: &[&str] = &[
    "pdf", "txt", "md", "csv", "json", "html", "doc", "docx",
];

pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_allowlist() {
        assert!(allowed_file("report.pdf"));
        assert!(allowed_file("NOTES.TXT"));
        assert!(!allowed_file("binary.exe"));
        assert!(!allowed_file("no_extension"));
    }
}
