//! Class path resolution and class loading.
//!
//! The class path resolves in the same priority order as `java`:
//! 1. `-classpath` / `-cp` on the command line
//! 2. the `CLASSPATH` environment variable
//! 3. the current directory
use std::collections::HashMap;
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, warn};

use crate::error::{ClassFormatError, RuntimeError};
use crate::jvm::{read_class_file, JVMParser};
use crate::program::ClassDefinition;

#[cfg(windows)]
const SEPARATOR: char = ';';
#[cfg(not(windows))]
const SEPARATOR: char = ':';

/// Ordered list of directories searched for class files.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassPath {
    entries: Vec<PathBuf>,
}

impl ClassPath {
    pub fn new(entries: Vec<PathBuf>) -> Self {
        Self { entries }
    }

    /// Split a class path string on the platform path separator, empty
    /// entries are dropped.
    pub fn parse(class_path: &str) -> Self {
        let entries = class_path
            .split(SEPARATOR)
            .filter(|entry| !entry.is_empty())
            .map(PathBuf::from)
            .collect();
        Self { entries }
    }

    /// Resolve the class path from the command line argument, falling back
    /// to `CLASSPATH` and then to the current directory.
    pub fn resolve(arg: Option<&str>) -> Self {
        let env_var = env::var("CLASSPATH").ok();
        Self::resolve_from(arg, env_var.as_deref())
    }

    fn resolve_from(arg: Option<&str>, env_var: Option<&str>) -> Self {
        if let Some(class_path) = arg {
            debug!("using class path from arguments: {class_path}");
            return Self::parse(class_path);
        }
        if let Some(class_path) = env_var.filter(|cp| !cp.is_empty()) {
            debug!("using CLASSPATH: {class_path}");
            return Self::parse(class_path);
        }
        debug!("using default class path: .");
        Self::parse(".")
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }
}

/// Convert `a.b.C` or `a/b/C` to the internal form `a/b/C`.
pub fn internal_name(name: &str) -> String {
    name.replace('.', "/")
}

/// Convert `a/b/C` or `a.b.C` to the binary form `a.b.C`.
pub fn binary_name(name: &str) -> String {
    name.replace('/', ".")
}

/// Source of class definitions. `Ok(None)` means the class does not exist
/// here, errors are reserved for classes that exist but can't be read.
pub trait ClassLoader {
    fn find_class(&self, name: &str) -> Result<Option<ClassDefinition>, ClassFormatError>;
}

/// Loads classes from `.class` files under the class path directories.
#[derive(Debug, Clone)]
pub struct ClassPathLoader {
    class_path: ClassPath,
}

impl ClassPathLoader {
    pub fn new(class_path: ClassPath) -> Self {
        for entry in class_path.entries() {
            if !entry.is_dir() {
                warn!("class path entry {} is not a directory", entry.display());
            }
        }
        Self { class_path }
    }

    fn try_load(entry: &Path, name: &str) -> io::Result<Vec<u8>> {
        read_class_file(&entry.join(format!("{name}.class")))
    }
}

impl ClassLoader for ClassPathLoader {
    fn find_class(&self, name: &str) -> Result<Option<ClassDefinition>, ClassFormatError> {
        for entry in self.class_path.entries() {
            match Self::try_load(entry, name) {
                Ok(bytes) => {
                    debug!("found {name} in {}", entry.display());
                    let class_file = JVMParser::parse(&bytes)?;
                    return ClassDefinition::from_class_file(&class_file).map(Some);
                }
                Err(err) => debug!("{name} not in {}: {err}", entry.display()),
            }
        }
        Ok(None)
    }
}

/// Classes defined in memory, keyed by internal name.
impl ClassLoader for HashMap<String, ClassDefinition> {
    fn find_class(&self, name: &str) -> Result<Option<ClassDefinition>, ClassFormatError> {
        Ok(self.get(name).cloned())
    }
}

/// Loads classes on demand and keeps every loaded class for the rest of the
/// run, so repeated loads of the same name return the same definition.
pub struct ClassProvider {
    loader: Box<dyn ClassLoader>,
    classes: HashMap<String, Rc<ClassDefinition>>,
}

impl ClassProvider {
    pub fn new(loader: impl ClassLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            classes: HashMap::new(),
        }
    }

    /// Returns the class called `name`, in either dotted or internal form.
    pub fn load(&mut self, name: &str) -> Result<Rc<ClassDefinition>, RuntimeError> {
        let name = internal_name(name);
        if let Some(class) = self.classes.get(&name) {
            debug!("class {name} already loaded");
            return Ok(Rc::clone(class));
        }
        let class = match self.loader.find_class(&name)? {
            Some(class) => Rc::new(class),
            None => return Err(RuntimeError::ClassNotFound(binary_name(&name))),
        };
        debug!("loaded class {name}");
        self.classes.insert(name, Rc::clone(&class));
        Ok(class)
    }

    /// Whether `name` has already been loaded.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.classes.contains_key(&internal_name(name))
    }
}
