use std::path::{Path, PathBuf};

/// Byte-level access to the files taxon keeps next to its indexes
/// (taxonomy TSV sources, config.yaml).
pub trait StorageManager: Send + Sync {
    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()>;
    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>>;
    fn exists(&self, ident: &str) -> bool;
    fn path_of(&self, ident: &str) -> PathBuf;

    fn read_to_string(&self, ident: &str) -> std::io::Result<String> {
        let bytes = self.read(ident)?;
        String::from_utf8(bytes).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{ident} is not valid utf8: {e}"),
            )
        })
    }
}

#[derive(Clone, Debug)]
pub struct BackendLocal {
    pub base_dir: PathBuf,
}

impl BackendLocal {
    pub fn new(storage_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;
        Ok(BackendLocal { base_dir: path })
    }
}

impl StorageManager for BackendLocal {
    fn path_of(&self, ident: &str) -> PathBuf {
        self.base_dir.join(ident)
    }

    fn exists(&self, ident: &str) -> bool {
        std::fs::metadata(self.path_of(ident)).is_ok()
    }

    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.path_of(ident))
    }

    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()> {
        let path = self.path_of(ident);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));

        std::fs::write(&temp_path, data)?;

        std::fs::rename(&temp_path, &path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BackendLocal::new(tmp.path().join("data")).unwrap();

        assert!(!store.exists("shopify.tsv"));
        store.write("shopify.tsv", b"category_id\tcategory_text\n").unwrap();
        assert!(store.exists("shopify.tsv"));
        assert_eq!(
            store.read_to_string("shopify.tsv").unwrap(),
            "category_id\tcategory_text\n"
        );
    }

    #[test]
    fn test_write_replaces_and_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BackendLocal::new(tmp.path()).unwrap();

        store.write("config.yaml", b"a: 1").unwrap();
        store.write("config.yaml", b"a: 2").unwrap();

        assert_eq!(store.read("config.yaml").unwrap(), b"a: 2");
        let names: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["config.yaml"]);
    }

    #[test]
    fn test_non_utf8_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BackendLocal::new(tmp.path()).unwrap();
        store.write("bad.tsv", &[0xff, 0xfe]).unwrap();

        let err = store.read_to_string("bad.tsv").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
