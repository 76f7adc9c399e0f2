//! Structural description of a mapped record type
//!
//! A record type describes itself once through a [`TypeDescriptor`]: its name,
//! an optional table rename, and one [`Field`] per property in declaration
//! order. Each field carries its [`SemanticType`] and the marker attributes
//! the definition builder understands (not-mapped, indexed, unique, max
//! length, required, read-only).

/// Default `NVARCHAR` length for string columns without a max-length attribute.
pub const DEFAULT_STRING_LENGTH: usize = 4096;

/// Semantic classification of a property, before SQL affinity is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticType {
    /// Character data.
    Text,
    /// Signed/unsigned integers of any width, bytes and chars.
    Integer,
    /// Fixed or floating point numbers.
    Decimal,
    Boolean,
    DateTime,
    /// Any other value type; stored with TEXT affinity.
    OtherValue,
    /// Raw byte sequences.
    Bytes,
    /// A nested object with no column affinity. Never mapped.
    Reference,
    /// A value type wrapped in `Option`.
    Nullable(Box<SemanticType>),
}

impl SemanticType {
    /// Wrap this type as nullable. Wrapping twice is a no-op.
    pub fn nullable(self) -> Self {
        match self {
            SemanticType::Nullable(_) => self,
            other => SemanticType::Nullable(Box::new(other)),
        }
    }
}

/// Maps a Rust type onto its [`SemanticType`].
///
/// Implemented for the primitive types, `String`, `Vec<u8>`, the `chrono`
/// date/time types and `Option<T>`. Record types can implement it for their
/// own value types (returning [`SemanticType::OtherValue`]) or nested objects
/// (returning [`SemanticType::Reference`]).
pub trait ColumnType {
    fn semantic_type() -> SemanticType;
}

macro_rules! column_type {
    ($semantic:ident => $($ty:ty),+ $(,)?) => {
        $(
            impl ColumnType for $ty {
                fn semantic_type() -> SemanticType {
                    SemanticType::$semantic
                }
            }
        )+
    };
}

column_type!(Text => String, &str, Box<str>);
column_type!(Integer => i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, char);
column_type!(Decimal => f32, f64);
column_type!(Boolean => bool);
column_type!(Bytes => Vec<u8>);
column_type!(
    DateTime => chrono::NaiveDate,
    chrono::NaiveDateTime,
    chrono::NaiveTime,
    chrono::DateTime<chrono::Utc>,
    chrono::DateTime<chrono::FixedOffset>,
    chrono::DateTime<chrono::Local>,
);

impl<T: ColumnType> ColumnType for Option<T> {
    fn semantic_type() -> SemanticType {
        T::semantic_type().nullable()
    }
}

/// One property of a record type together with its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub semantic_type: SemanticType,
    pub not_mapped: bool,
    pub indexed: bool,
    pub unique: bool,
    pub max_length: Option<usize>,
    pub required: bool,
    pub read_only: bool,
}

impl Field {
    /// Describe a property with an explicit semantic type.
    pub fn new(name: &'static str, semantic_type: SemanticType) -> Self {
        Self {
            name,
            semantic_type,
            not_mapped: false,
            indexed: false,
            unique: false,
            max_length: None,
            required: false,
            read_only: false,
        }
    }

    /// Describe a property whose semantic type follows from its Rust type.
    pub fn of<T: ColumnType>(name: &'static str) -> Self {
        Self::new(name, T::semantic_type())
    }

    /// Exclude the property from the table.
    pub fn not_mapped(mut self) -> Self {
        self.not_mapped = true;
        self
    }

    /// Request a non-unique index on the column.
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Request a unique index on the column.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Cap the length of a string column.
    pub fn max_length(mut self, length: usize) -> Self {
        self.max_length = Some(length);
        self
    }

    /// Make a string column NOT NULL.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the property as not writable; it is skipped like a computed
    /// property.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Static description of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub type_name: &'static str,
    pub table: Option<&'static str>,
    pub fields: Vec<Field>,
}

impl TypeDescriptor {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            table: None,
            fields: Vec::new(),
        }
    }

    /// Store the type under a table name other than the type name.
    pub fn table(mut self, name: &'static str) -> Self {
        self.table = Some(name);
        self
    }

    /// Append a field; declaration order is preserved.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// The table name: the rename if present, otherwise the bare type name.
    pub fn table_name(&self) -> &'static str {
        self.table.unwrap_or(self.type_name)
    }
}
