//! Function cache: the authoritative name -> compiled function mapping.
//!
//! Populated once at boot by walking the workspace directory tree, then
//! updated record-by-record on reload. Records are immutable and replaced
//! wholesale.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use nimbus_script::{CompileError, Program};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

/// One compiled function.
#[derive(Debug)]
pub struct FunctionRecord {
    /// Logical name: workspace-relative path without extension.
    pub name: String,
    /// Source text as read from disk.
    pub source: Arc<str>,
    /// Compiled program.
    pub program: Arc<Program>,
}

impl FunctionRecord {
    pub fn new(name: impl Into<String>, source: impl Into<Arc<str>>, program: Program) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            program: Arc::new(program),
        }
    }

    /// Compile `source` into a record named `name`.
    pub fn compile(name: &str, source: &str) -> std::result::Result<Self, CompileError> {
        let program = nimbus_script::compile(source, name)?;
        Ok(Self::new(name, source, program))
    }
}

/// Translates one source file into a program.
pub trait Compiler: Send + Sync {
    fn compile(&self, source: &str, name: &str) -> std::result::Result<Program, CompileError>;
}

/// The default compiler: `nimbus_script::compile`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptCompiler;

impl Compiler for ScriptCompiler {
    fn compile(&self, source: &str, name: &str) -> std::result::Result<Program, CompileError> {
        nimbus_script::compile(source, name)
    }
}

/// In-memory function cache keyed by logical name.
pub struct FunctionCache {
    root: PathBuf,
    extension: String,
    compiler: Box<dyn Compiler>,
    records: RwLock<FxHashMap<String, Arc<FunctionRecord>>>,
}

impl FunctionCache {
    /// Empty cache over `root` for files ending in `.{extension}`.
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self::with_compiler(root, extension, ScriptCompiler)
    }

    pub fn with_compiler(
        root: impl Into<PathBuf>,
        extension: impl Into<String>,
        compiler: impl Compiler + 'static,
    ) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            compiler: Box::new(compiler),
            records: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the workspace and compile every source file.
    ///
    /// Any failure leaves the cache untouched: the new mapping is built aside
    /// and swapped in only when every file compiled.
    pub fn load_workspace(&self) -> Result<usize> {
        if !self.root.is_dir() {
            return Err(Error::WorkspaceNotFound(self.root.clone()));
        }

        let mut loaded = FxHashMap::default();
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            let entries = fs::read_dir(&dir).map_err(|e| Error::io(&dir, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| Error::io(&dir, e))?;
                let path = entry.path();
                let file_type = entry.file_type().map_err(|e| Error::io(&path, e))?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file() {
                    if let Some(record) = self.compile_file(&path)? {
                        tracing::info!("Loaded function: {}", record.name);
                        loaded.insert(record.name.clone(), Arc::new(record));
                    }
                }
            }
        }

        let count = loaded.len();
        *self.records.write() = loaded;
        Ok(count)
    }

    /// Logical name of `path`, if it is a source file inside the workspace.
    pub fn name_for_path(&self, path: &Path) -> Option<String> {
        if path.extension()?.to_str()? != self.extension {
            return None;
        }
        let relative = path.strip_prefix(&self.root).ok()?.with_extension("");
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str()?),
                Component::CurDir => {}
                _ => return None,
            }
        }
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }

    /// Read and compile one file into a record. Non-source files yield `None`.
    pub fn compile_file(&self, path: &Path) -> Result<Option<FunctionRecord>> {
        let Some(name) = self.name_for_path(path) else {
            return Ok(None);
        };
        let source = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let program = self.compiler.compile(&source, &name)?;
        Ok(Some(FunctionRecord::new(name, source, program)))
    }

    /// Compile `path` and store the result, replacing any previous record.
    pub fn load_file(&self, path: &Path) -> Result<Option<Arc<FunctionRecord>>> {
        let Some(record) = self.compile_file(path)? else {
            return Ok(None);
        };
        let record = Arc::new(record);
        self.records
            .write()
            .insert(record.name.clone(), Arc::clone(&record));
        Ok(Some(record))
    }

    pub fn get(&self, name: &str) -> Option<Arc<FunctionRecord>> {
        self.records.read().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.records.read().contains_key(name)
    }

    /// All records, sorted by name.
    pub fn get_all(&self) -> Vec<Arc<FunctionRecord>> {
        let mut all: Vec<_> = self.records.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Sorted logical names.
    pub fn names(&self) -> Vec<String> {
        self.get_all().iter().map(|r| r.name.clone()).collect()
    }

    pub fn size(&self) -> usize {
        self.records.read().len()
    }

    /// Insert or replace a record under its own name.
    pub fn set(&self, record: FunctionRecord) -> Arc<FunctionRecord> {
        let record = Arc::new(record);
        self.records
            .write()
            .insert(record.name.clone(), Arc::clone(&record));
        record
    }

    pub fn delete(&self, name: &str) -> Option<Arc<FunctionRecord>> {
        self.records.write().remove(name)
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl std::fmt::Debug for FunctionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionCache")
            .field("root", &self.root)
            .field("extension", &self.extension)
            .field("size", &self.size())
            .finish()
    }
}
