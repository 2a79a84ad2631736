//! Purpose: Registry of value kinds ("atoms") and the plugin contract they implement.
//! Exports: `Atom`, `AtomId`, `AtomWidth`, `AtomHooks`, `AtomError`, `AtomDescriptor`,
//! `AtomRegistry`.
//! Role: Tells the catalog parser and the pool how wide each kind is and how to read it.
//! Invariants: Built-in ids are fixed; id 0 is `void`; unknown kinds get stable negative ids.
//! Invariants: The registry is owned by one pool; plugins register before the pool opens.
use std::fmt;

use crate::core::error::{Error, ErrorKind};
use crate::core::escape::EscapeError;
use crate::core::numeric::NumError;

pub mod builtin;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct AtomId(pub i32);

impl AtomId {
    pub const VOID: AtomId = AtomId(0);

    pub fn is_unknown(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AtomWidth {
    Fixed(u8),
    Var,
}

impl AtomWidth {
    pub fn is_var(self) -> bool {
        matches!(self, AtomWidth::Var)
    }

    pub fn fixed_bytes(self) -> Option<usize> {
        match self {
            AtomWidth::Fixed(bytes) => Some(usize::from(bytes)),
            AtomWidth::Var => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AtomError {
    Syntax { consumed: usize },
    Overflow { consumed: usize },
    NotUtf8 { at: usize },
    Length { expected: usize, actual: usize },
}

impl fmt::Display for AtomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomError::Syntax { consumed } => write!(f, "syntax error at byte {consumed}"),
            AtomError::Overflow { consumed } => {
                write!(f, "value out of range (token ends at byte {consumed})")
            }
            AtomError::NotUtf8 { at } => write!(f, "invalid UTF-8 at byte {at}"),
            AtomError::Length { expected, actual } => {
                write!(f, "expected {expected} value bytes, found {actual}")
            }
        }
    }
}

impl std::error::Error for AtomError {}

impl From<NumError> for AtomError {
    fn from(err: NumError) -> Self {
        match err {
            NumError::Syntax { consumed } => AtomError::Syntax { consumed },
            NumError::Overflow { consumed } => AtomError::Overflow { consumed },
            NumError::Length { expected, actual } => AtomError::Length { expected, actual },
        }
    }
}

impl From<EscapeError> for AtomError {
    fn from(err: EscapeError) -> Self {
        match err {
            EscapeError::NotUtf8 { at } => AtomError::NotUtf8 { at },
            EscapeError::BadHex { at } | EscapeError::EmbeddedNul { at } => {
                AtomError::Syntax { consumed: at }
            }
            EscapeError::Dangling | EscapeError::NotQuoted | EscapeError::Unterminated => {
                AtomError::Syntax { consumed: 0 }
            }
        }
    }
}

impl From<AtomError> for Error {
    fn from(err: AtomError) -> Self {
        let kind = match err {
            AtomError::Syntax { .. } => ErrorKind::Syntax,
            AtomError::Overflow { .. } => ErrorKind::Overflow,
            AtomError::NotUtf8 { .. } => ErrorKind::NotUtf8,
            AtomError::Length { .. } => ErrorKind::Corrupt,
        };
        Error::new(kind).with_message(err.to_string()).with_source(err)
    }
}

/// Optional side-effect hooks; any fix/unfix (or delete, when deleting) forces a full load.
#[derive(Clone, Copy, Debug, Default)]
pub struct AtomHooks {
    pub fix: Option<fn(&[u8])>,
    pub unfix: Option<fn(&[u8])>,
    pub delete: Option<fn(&[u8])>,
    pub element_length: Option<fn(&[u8]) -> usize>,
    pub allocate_heap: Option<fn(usize) -> Vec<u8>>,
}

/// Contract for value kinds, built in or supplied by a plugin.
pub trait Atom: Send + Sync {
    fn name(&self) -> &str;

    fn width(&self) -> AtomWidth;

    /// Name of the kind whose bytes this one reuses; `None` for storage roots.
    fn storage(&self) -> Option<&str> {
        None
    }

    fn nil(&self) -> &[u8];

    /// Parses one value from the front of `text`, returning its bytes and the text consumed.
    fn parse(&self, text: &str) -> Result<(Vec<u8>, usize), AtomError>;

    fn format(&self, bytes: &[u8]) -> Result<String, AtomError>;

    fn hooks(&self) -> AtomHooks {
        AtomHooks::default()
    }
}

pub struct AtomDescriptor {
    id: AtomId,
    storage: AtomId,
    atom: Box<dyn Atom>,
}

impl AtomDescriptor {
    pub fn id(&self) -> AtomId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.atom.name()
    }

    pub fn width(&self) -> AtomWidth {
        self.atom.width()
    }

    pub fn storage(&self) -> AtomId {
        self.storage
    }

    pub fn nil(&self) -> &[u8] {
        self.atom.nil()
    }

    pub fn is_nil(&self, bytes: &[u8]) -> bool {
        bytes == self.atom.nil()
    }

    pub fn hooks(&self) -> AtomHooks {
        self.atom.hooks()
    }

    pub fn parse(&self, text: &str) -> Result<(Vec<u8>, usize), AtomError> {
        self.atom.parse(text)
    }

    pub fn format(&self, bytes: &[u8]) -> Result<String, AtomError> {
        self.atom.format(bytes)
    }
}

impl fmt::Debug for AtomDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomDescriptor")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("width", &self.width())
            .field("storage", &self.storage)
            .finish()
    }
}

#[derive(Debug)]
pub struct AtomRegistry {
    atoms: Vec<AtomDescriptor>,
    unknown: Vec<String>,
}

impl AtomRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            atoms: Vec::new(),
            unknown: Vec::new(),
        };
        for atom in builtin::builtin_atoms() {
            let id = AtomId(registry.atoms.len() as i32);
            registry.atoms.push(AtomDescriptor {
                id,
                storage: id,
                atom,
            });
        }
        registry
    }

    /// Adds a plugin kind after the built-ins.
    pub fn register(&mut self, atom: Box<dyn Atom>) -> Result<AtomId, Error> {
        let name = atom.name();
        if self.find(name).is_some() {
            return Err(Error::new(ErrorKind::AlreadyExists)
                .with_message(format!("atom {name} is already registered")));
        }
        let id = AtomId(i32::try_from(self.atoms.len()).map_err(|_| {
            Error::new(ErrorKind::Capacity).with_message("atom table is full")
        })?);
        let storage = match atom.storage() {
            None => id,
            Some(storage_name) => {
                let storage = self
                    .find(storage_name)
                    .filter(|storage| !storage.is_unknown())
                    .ok_or_else(|| {
                        Error::new(ErrorKind::NotFound)
                            .with_message(format!("storage kind {storage_name} of {name} is not registered"))
                    })?;
                let storage_width = self.atoms[storage.0 as usize].width();
                if storage_width != atom.width() {
                    return Err(Error::new(ErrorKind::Usage).with_message(format!(
                        "atom {name} width {:?} does not match storage {storage_name} width {storage_width:?}",
                        atom.width()
                    )));
                }
                storage
            }
        };
        tracing::debug!(atom = name, id = id.0, storage = storage.0, "registered atom");
        self.atoms.push(AtomDescriptor { id, storage, atom });
        Ok(id)
    }

    pub fn find(&self, name: &str) -> Option<AtomId> {
        if let Some(desc) = self.atoms.iter().find(|desc| desc.name() == name) {
            return Some(desc.id);
        }
        self.unknown
            .iter()
            .position(|known| known == name)
            .map(unknown_id)
    }

    /// Resolves `name`, remembering it under a negative id when no kind by that name exists.
    pub fn lookup(&mut self, name: &str) -> AtomId {
        match self.find(name) {
            Some(id) => id,
            None => self.register_unknown(name),
        }
    }

    pub fn register_unknown(&mut self, name: &str) -> AtomId {
        if let Some(id) = self.find(name) {
            return id;
        }
        self.unknown.push(name.to_string());
        let id = unknown_id(self.unknown.len() - 1);
        tracing::warn!(atom = name, id = id.0, "kind not registered; loading it opaquely");
        id
    }

    pub fn name(&self, id: AtomId) -> Option<&str> {
        if id.is_unknown() {
            let index = usize::try_from(-(id.0 + 1)).ok()?;
            return self.unknown.get(index).map(String::as_str);
        }
        self.descriptor(id).map(AtomDescriptor::name)
    }

    pub fn descriptor(&self, id: AtomId) -> Option<&AtomDescriptor> {
        usize::try_from(id.0).ok().and_then(|index| self.atoms.get(index))
    }

    pub fn width(&self, id: AtomId) -> Option<AtomWidth> {
        self.descriptor(id).map(AtomDescriptor::width)
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn unknown_names(&self) -> &[String] {
        &self.unknown
    }

    /// True when following storage kinds from `kind` reaches `ancestor`.
    pub fn is_descendant(&self, kind: AtomId, ancestor: AtomId) -> bool {
        let mut current = kind;
        loop {
            if current == ancestor {
                return true;
            }
            let Some(desc) = self.descriptor(current) else {
                return false;
            };
            if desc.storage == current {
                return false;
            }
            current = desc.storage;
        }
    }

    /// Kinds with reference-counted payloads cannot be described from metadata alone.
    pub fn requires_full_load(&self, kind: AtomId, deleting: bool) -> bool {
        let Some(desc) = self.descriptor(kind) else {
            return false;
        };
        let hooks = desc.hooks();
        hooks.fix.is_some() || hooks.unfix.is_some() || (deleting && hooks.delete.is_some())
    }

    pub fn parse_value(&self, kind: AtomId, text: &str) -> Result<(Vec<u8>, usize), Error> {
        let desc = self.known(kind)?;
        Ok(desc.parse(text)?)
    }

    pub fn format_value(&self, kind: AtomId, bytes: &[u8]) -> Result<String, Error> {
        let desc = self.known(kind)?;
        Ok(desc.format(bytes)?)
    }

    fn known(&self, kind: AtomId) -> Result<&AtomDescriptor, Error> {
        self.descriptor(kind).ok_or_else(|| {
            let name = self.name(kind).unwrap_or("?");
            Error::new(ErrorKind::NotFound)
                .with_message(format!("kind {name} ({kind}) has no registered implementation"))
        })
    }
}

impl Default for AtomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_id(index: usize) -> AtomId {
    AtomId(-(index as i32) - 1)
}
