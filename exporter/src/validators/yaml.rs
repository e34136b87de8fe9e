//! YAML-file validator name source.
//!
//! The file is a flat mapping from producer address to display name:
//!
//! ```yaml
//! 0x1e2e53c2451d4Ea6f1b3A21bE2B2fC3b4e5A6b7C: "Validator One"
//! 1f2e53c2451d4ea6f1b3a21be2b2fc3b4e5a6b7d: "Validator Two"
//! ```
//!
//! Keys are normalized on load, so case and the `0x` prefix do not matter.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{ValidatorError, ValidatorNameMap, ValidatorNameSource};
use crate::types::Address;

/// Validator names read from a YAML file on every load.
#[derive(Clone, Debug)]
pub struct YamlValidatorFile {
    path: PathBuf,
}

impl YamlValidatorFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses YAML text into a normalized map.
    fn parse(&self, text: &str) -> Result<ValidatorNameMap, ValidatorError> {
        if text.trim().is_empty() {
            return Ok(ValidatorNameMap::new());
        }
        let raw: Option<BTreeMap<String, String>> =
            serde_yaml::from_str(text).map_err(|source| ValidatorError::Parse {
                path: self.path.clone(),
                source,
            })?;

        Ok(raw
            .unwrap_or_default()
            .into_iter()
            .map(|(addr, name)| (Address::normalize(&addr), name))
            .collect())
    }
}

impl ValidatorNameSource for YamlValidatorFile {
    fn load(&self) -> Result<ValidatorNameMap, ValidatorError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| ValidatorError::Io {
            path: self.path.clone(),
            source,
        })?;
        let map = self.parse(&text)?;
        for (addr, name) in &map {
            tracing::debug!(address = %addr, name = %name, "loaded validator");
        }
        Ok(map)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_normalizes_addresses() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            "0xABCDEF0000000000000000000000000000000001: \"Alpha Staking\"\n\
             abcdef0000000000000000000000000000000002: Beta"
        )
        .unwrap();

        let source = YamlValidatorFile::new(file.path());
        let map = source.load().expect("load yaml");

        assert_eq!(map.len(), 2);
        assert_eq!(
            map.get(&Address::normalize("0xabcdef0000000000000000000000000000000001")),
            Some(&"Alpha Staking".to_string())
        );
        assert_eq!(
            map.get(&Address::normalize("0xABCDEF0000000000000000000000000000000002")),
            Some(&"Beta".to_string())
        );
    }

    #[test]
    fn empty_file_is_an_empty_map() {
        let file = tempfile::NamedTempFile::new().expect("create temp file");
        let map = YamlValidatorFile::new(file.path()).load().unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = YamlValidatorFile::new("/definitely/not/here.yaml")
            .load()
            .expect_err("missing file");
        assert!(matches!(err, ValidatorError::Io { .. }));
    }

    #[test]
    fn non_mapping_yaml_is_a_parse_error() {
        let source = YamlValidatorFile::new("inline.yaml");
        let err = source.parse("- just\n- a list\n").expect_err("list is not a map");
        assert!(matches!(err, ValidatorError::Parse { .. }));
    }
}
