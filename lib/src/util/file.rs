use std::{
    collections::HashSet,
    fs::{DirBuilder, File},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use memmap2::{Mmap, MmapOptions};

/// Opens a memory mapped file.
pub fn map_file<P: AsRef<Path>>(path: P) -> Result<Mmap> {
    let file = File::open(&path)
        .with_context(|| format!("Failed to open file '{}'", path.as_ref().display()))?;
    let map = unsafe { MmapOptions::new().map(&file) }
        .with_context(|| format!("Failed to mmap file: '{}'", path.as_ref().display()))?;
    Ok(map)
}

/// Destination for extracted artifacts.
pub trait FileSaver {
    /// Persists `data` as `<name>.<extension>` under `category`, returning the final file name
    /// (which may differ from the requested one when names collide).
    fn save(&mut self, data: &[u8], category: &str, name: &str, extension: &str) -> Result<String>;
}

/// Picks `<name>.<ext>`, or `<name>_<n>.<ext>` for the first free `n`.
fn unique_name<F>(name: &str, extension: &str, mut taken: F) -> String
where F: FnMut(&str) -> bool {
    let mut file_name = format!("{name}.{extension}");
    let mut n = 1;
    while taken(&file_name) {
        file_name = format!("{name}_{n}.{extension}");
        n += 1;
    }
    file_name
}

/// Writes artifacts to `<root>/<category>/<name>.<extension>`.
pub struct DirFileSaver {
    root: PathBuf,
    written: HashSet<PathBuf>,
}

impl DirFileSaver {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into(), written: HashSet::new() }
    }
}

impl FileSaver for DirFileSaver {
    fn save(&mut self, data: &[u8], category: &str, name: &str, extension: &str) -> Result<String> {
        let dir = self.root.join(category);
        DirBuilder::new()
            .recursive(true)
            .create(&dir)
            .with_context(|| format!("Failed to create directory '{}'", dir.display()))?;
        let file_name = unique_name(name, extension, |file_name| {
            let path = dir.join(file_name);
            self.written.contains(&path) || path.exists()
        });
        let path = dir.join(&file_name);
        std::fs::write(&path, data)
            .with_context(|| format!("Failed to write file '{}'", path.display()))?;
        log::debug!("Wrote {}", path.display());
        self.written.insert(path);
        Ok(file_name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedFile {
    pub category: String,
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Keeps artifacts in memory, in save order.
#[derive(Clone, Debug, Default)]
pub struct MemoryFileSaver {
    pub files: Vec<SavedFile>,
}

impl MemoryFileSaver {
    pub fn find(&self, category: &str, file_name: &str) -> Option<&SavedFile> {
        self.files.iter().find(|f| f.category == category && f.file_name == file_name)
    }
}

impl FileSaver for MemoryFileSaver {
    fn save(&mut self, data: &[u8], category: &str, name: &str, extension: &str) -> Result<String> {
        let file_name =
            unique_name(name, extension, |file_name| self.find(category, file_name).is_some());
        self.files.push(SavedFile {
            category: category.to_string(),
            file_name: file_name.clone(),
            data: data.to_vec(),
        });
        Ok(file_name)
    }
}
