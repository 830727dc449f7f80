//! Upload handling: validate a user-supplied file and stage it on disk.
//!
//! ## Why stage to a temp file?
//!
//! pdfium and calamine both want a file-system path, not a byte buffer.
//! Writing each upload to a `NamedTempFile` gives them one while ensuring
//! cleanup happens automatically when `StagedUpload` is dropped, on every
//! exit path of the request, even if the handler bails out early.
//!
//! Validation (extension allow-list, size ceiling) runs on the raw upload
//! before anything is written, so oversized or mistyped files never reach
//! the extractor.

use crate::error::PolicyLensError;
use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// The two upload slots of an analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadField {
    Policy,
    Demographic,
}

impl UploadField {
    /// Multipart form field name.
    pub fn form_name(&self) -> &'static str {
        match self {
            UploadField::Policy => "policy_file",
            UploadField::Demographic => "demographic_file",
        }
    }

    pub fn from_form_name(name: &str) -> Option<Self> {
        [UploadField::Policy, UploadField::Demographic]
            .into_iter()
            .find(|f| f.form_name() == name)
    }
}

impl fmt::Display for UploadField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadField::Policy => f.write_str("Policy file"),
            UploadField::Demographic => f.write_str("Demographic file"),
        }
    }
}

/// A fully-read upload that passed validation.
#[derive(Debug, Clone)]
pub struct Upload {
    pub field: UploadField,
    pub file_name: String,
    /// Lower-cased extension including the dot, e.g. `.pdf`.
    pub extension: String,
    pub bytes: Vec<u8>,
}

/// Lower-cased extension of a file name, including the leading dot.
pub fn file_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e.to_lowercase()))
}

/// Check a file name against an allow-list; returns the matched extension.
pub fn validate_extension(
    field: UploadField,
    file_name: &str,
    allowed: &[String],
) -> Result<String, PolicyLensError> {
    if file_name.trim().is_empty() {
        return Err(PolicyLensError::MissingUpload { field });
    }
    match file_extension(file_name) {
        Some(ext) if allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)) => Ok(ext),
        _ => Err(PolicyLensError::InvalidExtension {
            field,
            allowed: allowed.join(", "),
        }),
    }
}

/// Reject a payload longer than `limit` bytes.
pub fn check_size(field: UploadField, len: usize, limit: usize) -> Result<(), PolicyLensError> {
    if len > limit {
        return Err(PolicyLensError::FileTooLarge { field, limit });
    }
    Ok(())
}

/// An upload written to a temp file. The file is deleted on drop.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Write a validated upload to a temp file carrying its extension.
///
/// The suffix matters: calamine picks the workbook format from it.
pub fn stage(upload: &Upload) -> Result<StagedUpload, PolicyLensError> {
    let mut file = tempfile::Builder::new()
        .prefix("policylens-")
        .suffix(&upload.extension)
        .tempfile()
        .map_err(|e| PolicyLensError::Internal(format!("Failed to create temp file: {}", e)))?;

    file.write_all(&upload.bytes)
        .and_then(|_| file.flush())
        .map_err(|e| PolicyLensError::Internal(format!("Failed to write temp file: {}", e)))?;

    debug!(
        "Staged {} '{}' ({} bytes) at {}",
        upload.field,
        upload.file_name,
        upload.bytes.len(),
        file.path().display()
    );

    Ok(StagedUpload { file })
}

/// Validate a local file for the CLI: existence, extension and size.
pub fn resolve_local(
    field: UploadField,
    path: &Path,
    allowed: &[String],
    limit: usize,
) -> Result<PathBuf, PolicyLensError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(PolicyLensError::MissingUpload { field })?;
    validate_extension(field, name, allowed)?;

    let meta = std::fs::metadata(path).map_err(|e| {
        PolicyLensError::MalformedUpload(format!("{}: {}", path.display(), e))
    })?;
    check_size(field, meta.len() as usize, limit)?;

    Ok(path.to_path_buf())
}

/// Verify the `%PDF` magic bytes so callers get a meaningful error rather
/// than a pdfium failure. Files shorter than four bytes are left to pdfium.
pub fn check_pdf_magic(path: &Path) -> Result<(), PolicyLensError> {
    let mut f = std::fs::File::open(path).map_err(|e| PolicyLensError::CorruptPdf {
        detail: e.to_string(),
    })?;
    let mut magic = [0u8; 4];
    if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
        return Err(PolicyLensError::NotAPdf { magic });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("policy.PDF").as_deref(), Some(".pdf"));
        assert_eq!(file_extension("data.tar.xlsx").as_deref(), Some(".xlsx"));
        assert_eq!(file_extension("README"), None);
        assert_eq!(file_extension("trailing."), None);
    }

    #[test]
    fn test_validate_extension() {
        let allowed = exts(&[".csv", ".xlsx", ".xls"]);
        assert_eq!(
            validate_extension(UploadField::Demographic, "census.XLS", &allowed).unwrap(),
            ".xls"
        );
        let err = validate_extension(UploadField::Demographic, "census.json", &allowed)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Demographic file must be one of: .csv, .xlsx, .xls"
        );
    }

    #[test]
    fn test_empty_file_name_is_missing() {
        let err = validate_extension(UploadField::Policy, "", &exts(&[".pdf"])).unwrap_err();
        assert_eq!(err.to_string(), "Policy file is required");
    }

    #[test]
    fn test_check_size_boundary() {
        assert!(check_size(UploadField::Policy, 10, 10).is_ok());
        assert!(matches!(
            check_size(UploadField::Policy, 11, 10),
            Err(PolicyLensError::FileTooLarge { limit: 10, .. })
        ));
    }

    #[test]
    fn test_form_names() {
        assert_eq!(
            UploadField::from_form_name("policy_file"),
            Some(UploadField::Policy)
        );
        assert_eq!(UploadField::Demographic.form_name(), "demographic_file");
        assert_eq!(UploadField::from_form_name("other"), None);
    }

    #[test]
    fn test_staged_file_is_removed_on_drop() {
        let upload = Upload {
            field: UploadField::Demographic,
            file_name: "d.csv".into(),
            extension: ".csv".into(),
            bytes: b"a,b\n1,2\n".to_vec(),
        };
        let staged = stage(&upload).unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.to_string_lossy().ends_with(".csv"));
        assert_eq!(std::fs::read(&path).unwrap(), upload.bytes);
        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn test_pdf_magic() {
        let mut bad = tempfile::NamedTempFile::new().unwrap();
        bad.write_all(b"PK\x03\x04 not a pdf").unwrap();
        assert!(matches!(
            check_pdf_magic(bad.path()),
            Err(PolicyLensError::NotAPdf { .. })
        ));

        let mut good = tempfile::NamedTempFile::new().unwrap();
        good.write_all(b"%PDF-1.7\n").unwrap();
        assert!(check_pdf_magic(good.path()).is_ok());
    }

    #[test]
    fn test_resolve_local_checks_size() {
        let mut f = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        f.write_all(&[0u8; 64]).unwrap();
        let err = resolve_local(UploadField::Policy, f.path(), &exts(&[".pdf"]), 32).unwrap_err();
        assert!(matches!(err, PolicyLensError::FileTooLarge { .. }));
        assert!(resolve_local(UploadField::Policy, f.path(), &exts(&[".pdf"]), 64).is_ok());
    }
}
