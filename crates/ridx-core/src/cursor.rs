//! Semantic cursor model

use std::collections::{BTreeSet, HashMap};

use crate::error::{IndexError, Result};
use crate::location::{FileId, Location};

/// The fixed set of semantic cursor kinds the engine understands.
/// Unknown kinds are a parse/decode failure, never a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CursorKind {
    Declaration = 0,
    Definition = 1,
    Reference = 2,
    MethodDeclaration = 3,
    MethodDefinition = 4,
    ClassDeclaration = 5,
    ClassDefinition = 6,
    EnumConstant = 7,
    MacroDefinition = 8,
    Constructor = 9,
    Destructor = 10,
}

impl CursorKind {
    pub fn from_u8(code: u8) -> Result<CursorKind> {
        Ok(match code {
            0 => CursorKind::Declaration,
            1 => CursorKind::Definition,
            2 => CursorKind::Reference,
            3 => CursorKind::MethodDeclaration,
            4 => CursorKind::MethodDefinition,
            5 => CursorKind::ClassDeclaration,
            6 => CursorKind::ClassDefinition,
            7 => CursorKind::EnumConstant,
            8 => CursorKind::MacroDefinition,
            9 => CursorKind::Constructor,
            10 => CursorKind::Destructor,
            other => return Err(IndexError::UnknownCursorKind(other)),
        })
    }

    /// Parse the token the external parser emits for a cursor event.
    pub fn parse(token: &str) -> Result<CursorKind> {
        Ok(match token {
            "decl" => CursorKind::Declaration,
            "def" => CursorKind::Definition,
            "ref" => CursorKind::Reference,
            "method-decl" => CursorKind::MethodDeclaration,
            "method-def" => CursorKind::MethodDefinition,
            "class-decl" => CursorKind::ClassDeclaration,
            "class-def" => CursorKind::ClassDefinition,
            "enum-constant" => CursorKind::EnumConstant,
            "macro-def" => CursorKind::MacroDefinition,
            "ctor" => CursorKind::Constructor,
            "dtor" => CursorKind::Destructor,
            other => {
                return Err(IndexError::InvalidLocation(format!(
                    "unknown cursor kind token `{other}`"
                )))
            }
        })
    }

    pub const fn is_declaration(self) -> bool {
        matches!(
            self,
            CursorKind::Declaration
                | CursorKind::MethodDeclaration
                | CursorKind::ClassDeclaration
        )
    }

    pub const fn is_definition(self) -> bool {
        matches!(
            self,
            CursorKind::Definition
                | CursorKind::MethodDefinition
                | CursorKind::ClassDefinition
                | CursorKind::Constructor
                | CursorKind::Destructor
                | CursorKind::MacroDefinition
        )
    }

    pub const fn is_reference(self) -> bool {
        matches!(self, CursorKind::Reference)
    }

    pub const fn is_class(self) -> bool {
        matches!(self, CursorKind::ClassDeclaration | CursorKind::ClassDefinition)
    }
}

/// Everything the index knows about one source position.
///
/// `targets` and `references` are value keys into the symbol store, never
/// owning pointers; the store owns every cursor, so the cross-file cycles
/// these sets form carry no ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorInfo {
    pub kind: CursorKind,
    /// Human-readable qualified name, e.g. `Foo::bar(int)`.
    pub symbol_name: String,
    /// Unified symbol resolution string; empty when the parser had none.
    pub usr: String,
    /// Byte offsets of the cursor's extent within its file.
    pub start: u32,
    pub end: u32,
    /// Locations this cursor refers to.
    pub targets: BTreeSet<Location>,
    /// Locations referring to this cursor (inverse of `targets`).
    pub references: BTreeSet<Location>,
    pub enclosing_class: Option<Location>,
    /// USRs of direct base classes, for class cursors.
    pub base_classes: BTreeSet<String>,
}

impl CursorInfo {
    pub fn new(kind: CursorKind) -> Self {
        CursorInfo {
            kind,
            symbol_name: String::new(),
            usr: String::new(),
            start: 0,
            end: 0,
            targets: BTreeSet::new(),
            references: BTreeSet::new(),
            enclosing_class: None,
            base_classes: BTreeSet::new(),
        }
    }
}

/// A compiler-suggested edit attached to a file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FixIt {
    pub start: u32,
    pub end: u32,
    pub text: String,
}

pub type FixItMap = HashMap<FileId, BTreeSet<FixIt>>;
