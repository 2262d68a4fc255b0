use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::mutants::ClassName;

/// Where the engine reads class bytes from.
///
/// `Ok(None)` means the class does not exist; `Err` is reserved for failures
/// to read one that does.
pub trait ByteSource: Send + Sync {
    fn fetch(&self, class: &ClassName) -> io::Result<Option<Vec<u8>>>;
}

impl<S: ByteSource + ?Sized> ByteSource for Arc<S> {
    fn fetch(&self, class: &ClassName) -> io::Result<Option<Vec<u8>>> {
        (**self).fetch(class)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &S {
    fn fetch(&self, class: &ClassName) -> io::Result<Option<Vec<u8>>> {
        (**self).fetch(class)
    }
}

/// Classes laid out below a root directory, `com/example/Foo` at
/// `<root>/com/example/Foo.class`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectorySource { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, class: &ClassName) -> PathBuf {
        self.root.join(format!("{}.class", class.as_internal_name()))
    }

    /// Every class below the root, sorted by name.
    pub fn list_classes(&self) -> io::Result<Vec<ClassName>> {
        let mut classes = Vec::new();
        walk(&self.root, &self.root, &mut classes)?;
        classes.sort();
        Ok(classes)
    }
}

fn walk(root: &Path, dir: &Path, classes: &mut Vec<ClassName>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk(root, &path, classes)?;
            continue;
        }
        if path.extension().is_some_and(|ext| ext == "class") {
            if let Ok(relative) = path.with_extension("").strip_prefix(root) {
                let parts: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                classes.push(ClassName::new(parts.join("/")));
            }
        }
    }
    Ok(())
}

impl ByteSource for DirectorySource {
    fn fetch(&self, class: &ClassName) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(class)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    classes: HashMap<ClassName, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        MemorySource::default()
    }

    pub fn with_class(mut self, name: impl Into<ClassName>, bytes: Vec<u8>) -> Self {
        self.insert(name, bytes);
        self
    }

    pub fn insert(&mut self, name: impl Into<ClassName>, bytes: Vec<u8>) {
        self.classes.insert(name.into(), bytes);
    }
}

impl ByteSource for MemorySource {
    fn fetch(&self, class: &ClassName) -> io::Result<Option<Vec<u8>>> {
        Ok(self.classes.get(class).cloned())
    }
}
