//! Input expansion and output naming.
//!
//! Batch inputs are a mix of files and directories. Directories are walked
//! recursively for `.pdf` files (case-insensitive); files are taken as-is
//! when they carry that extension and skipped with a warning otherwise.
//! Entries inside a directory are visited in sorted order so a batch always
//! runs in the same sequence. Symlinked files are collected; symlinked
//! directories below an input are not followed.

use crate::error::OcrError;
use std::fs::FileType;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension of documents accepted for upload.
pub const DOCUMENT_EXTENSION: &str = "pdf";

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// `true` when `path` ends in `.pdf`, ignoring case.
pub fn has_document_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
}

/// Files found while expanding batch inputs, plus inputs that could not be read.
#[derive(Debug, Default)]
pub struct CollectedInputs {
    pub files: Vec<PathBuf>,
    pub errors: Vec<(PathBuf, OcrError)>,
}

/// Expand files and directories into the list of documents to process.
pub fn collect_pdf_files(inputs: &[PathBuf]) -> CollectedInputs {
    let mut collected = CollectedInputs::default();
    for input in inputs {
        match std::fs::metadata(input) {
            Ok(meta) if meta.is_dir() => walk_dir(input, &mut collected),
            Ok(_) if has_document_extension(input) => collected.files.push(input.clone()),
            Ok(_) => warn!(path = %input.display(), "Skipping non-PDF input"),
            Err(e) => {
                warn!(path = %input.display(), "Cannot read input: {}", e);
                let err = if e.kind() == std::io::ErrorKind::NotFound {
                    OcrError::FileNotFound {
                        path: input.clone(),
                    }
                } else {
                    OcrError::io(input, e)
                };
                collected.errors.push((input.clone(), err));
            }
        }
    }
    debug!(
        files = collected.files.len(),
        errors = collected.errors.len(),
        "Collected inputs"
    );
    collected
}

fn walk_dir(dir: &Path, collected: &mut CollectedInputs) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), "Cannot read directory: {}", e);
            collected.errors.push((dir.to_path_buf(), OcrError::io(dir, e)));
            return;
        }
    };

    // `DirEntry::file_type` does not follow links, so a symlinked directory
    // is never descended into and a link back to an ancestor cannot loop.
    let mut children: Vec<(PathBuf, FileType)> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_type().ok().map(|kind| (e.path(), kind)))
        .collect();
    children.sort_by(|a, b| a.0.cmp(&b.0));

    for (path, kind) in children {
        if kind.is_dir() {
            walk_dir(&path, collected);
        } else if kind.is_symlink() && path.is_dir() {
            debug!(path = %path.display(), "Not following symlinked directory");
        } else if has_document_extension(&path) {
            collected.files.push(path);
        }
    }
}

/// Output directory name for item `index` of `total` file items.
///
/// Without a custom name the file stem is used. A custom name is used as-is
/// for a single file and suffixed `_<n>` (1-based) when several files share it.
pub fn item_output_name(path: &Path, custom: Option<&str>, index: usize, total: usize) -> String {
    match custom {
        Some(name) if total > 1 => format!("{name}_{}", index + 1),
        Some(name) => name.to_string(),
        None => file_stem(path),
    }
}

/// File name without its extension.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

/// Output directory name for a URL item.
pub fn url_output_name(custom: Option<&str>, unix_secs: u64) -> String {
    match custom {
        Some(name) => name.to_string(),
        None => format!("ocr-result-{unix_secs}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"%PDF-1.4").unwrap();
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn extension_is_case_insensitive() {
        assert!(has_document_extension(Path::new("a.pdf")));
        assert!(has_document_extension(Path::new("a.PDF")));
        assert!(has_document_extension(Path::new("dir/a.Pdf")));
        assert!(!has_document_extension(Path::new("a.txt")));
        assert!(!has_document_extension(Path::new("pdf")));
    }

    #[test]
    fn directories_are_walked_recursively() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("docs/b.pdf"));
        touch(&root.join("docs/a.PDF"));
        touch(&root.join("docs/nested/c.pdf"));
        touch(&root.join("docs/notes.txt"));
        touch(&root.join("single.pdf"));
        touch(&root.join("skip.docx"));

        let collected = collect_pdf_files(&[
            root.join("docs"),
            root.join("single.pdf"),
            root.join("skip.docx"),
        ]);

        assert!(collected.errors.is_empty());
        assert_eq!(
            collected.files,
            vec![
                root.join("docs/a.PDF"),
                root.join("docs/b.pdf"),
                root.join("docs/nested/c.pdf"),
                root.join("single.pdf"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_not_followed() {
        let tmp = tempfile::tempdir().unwrap();
        let scans = tmp.path().join("scans");
        touch(&scans.join("a.pdf"));
        touch(&tmp.path().join("elsewhere/b.pdf"));
        std::os::unix::fs::symlink(&scans, scans.join("loop")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("elsewhere"), scans.join("other")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("elsewhere/b.pdf"), scans.join("linked.pdf"))
            .unwrap();

        let collected = collect_pdf_files(std::slice::from_ref(&scans));

        assert!(collected.errors.is_empty());
        assert_eq!(
            collected.files,
            vec![scans.join("a.pdf"), scans.join("linked.pdf")]
        );
    }

    #[test]
    fn missing_input_is_recorded() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope.pdf");
        let collected = collect_pdf_files(std::slice::from_ref(&missing));
        assert!(collected.files.is_empty());
        assert_eq!(collected.errors.len(), 1);
        assert!(matches!(collected.errors[0].1, OcrError::FileNotFound { .. }));
    }

    #[test]
    fn output_names() {
        let p = Path::new("/in/report.final.pdf");
        assert_eq!(item_output_name(p, None, 0, 3), "report.final");
        assert_eq!(item_output_name(p, Some("batch"), 0, 1), "batch");
        assert_eq!(item_output_name(p, Some("batch"), 0, 3), "batch_1");
        assert_eq!(item_output_name(p, Some("batch"), 2, 3), "batch_3");
        assert_eq!(url_output_name(None, 1_700_000_000), "ocr-result-1700000000");
        assert_eq!(url_output_name(Some("web"), 1), "web");
    }
}
