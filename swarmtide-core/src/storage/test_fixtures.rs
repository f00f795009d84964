//! Test fixtures for storage testing.
//!
//! Provides standardized output-file setup for consistent testing across
//! storage and engine modules.

// Type alias for complex return type
type TempOutputFile = (tempfile::TempDir, std::path::PathBuf);

/// Creates a temporary directory and the output path inside it.
///
/// # Panics
///
/// Panics if temporary directory creation fails.
/// This is acceptable in test fixtures where failures indicate environment issues.
pub fn create_temp_output_file(name: &str) -> TempOutputFile {
    let temp_dir = tempfile::tempdir().unwrap();
    let output_path = temp_dir.path().join("downloads").join(name);
    std::fs::create_dir_all(temp_dir.path().join("downloads")).unwrap();

    (temp_dir, output_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_output_file() {
        let (_temp_dir, output_path) = create_temp_output_file("out.bin");

        assert!(output_path.parent().unwrap().is_dir());
        assert!(!output_path.exists());
    }
}
