#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tablestat::data::{Dataset, DatasetColumn};
use tablestat::store::{Store, StoreConfig};
use tempfile::{TempDir, tempdir};

/// Scratch directory holding input files and a database; removed on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Database path inside a directory that does not exist yet.
    pub fn db_path(&self) -> PathBuf {
        self.temp_dir.path().join("db").join("tablestat.db")
    }

    pub fn open_store(&self) -> Store {
        Store::open(&StoreConfig::new(self.db_path())).expect("open store")
    }
}

pub fn column(name: &str, values: &[&str]) -> DatasetColumn {
    DatasetColumn::new(
        name,
        values
            .iter()
            .map(|v| (!v.is_empty()).then(|| v.to_string()))
            .collect(),
    )
}

/// `edad` 20/30/40 and `ciudad` A/B/A.
pub fn personas() -> Dataset {
    Dataset::new(vec![
        column("edad", &["20", "30", "40"]),
        column("ciudad", &["A", "B", "A"]),
    ])
}

pub const PERSONAS_CSV: &str = "edad,ciudad,fecha de alta\n20,A,05/01/2024\n30,B,17/02/2024 09:30\n40,A,\n";
