use crate::access::value::DataType;
use crate::error::{DbError, DbResult};
use std::fmt;

/// One column of a `TupleDesc`.
#[derive(Debug, Clone)]
pub struct TdItem {
    pub data_type: DataType,
    pub name: Option<String>,
}

/// Ordered column layout of a tuple. Defines the fixed slot width used by heap pages.
///
/// Equality compares the type sequence only; column names are ignored.
#[derive(Debug, Clone)]
pub struct TupleDesc {
    items: Vec<TdItem>,
}

impl TupleDesc {
    pub fn new(types: Vec<DataType>, names: Vec<Option<String>>) -> DbResult<Self> {
        if types.len() != names.len() {
            return Err(DbError::InvalidSchema(format!(
                "{} types but {} names",
                types.len(),
                names.len()
            )));
        }
        let items = types
            .into_iter()
            .zip(names)
            .map(|(data_type, name)| TdItem { data_type, name })
            .collect();
        Ok(Self { items })
    }

    /// Anonymous columns of the given types.
    pub fn from_types(types: Vec<DataType>) -> Self {
        let items = types
            .into_iter()
            .map(|data_type| TdItem {
                data_type,
                name: None,
            })
            .collect();
        Self { items }
    }

    /// Named columns, e.g. `[("id", DataType::Int32)]`.
    pub fn with_names(columns: Vec<(&str, DataType)>) -> Self {
        let items = columns
            .into_iter()
            .map(|(name, data_type)| TdItem {
                data_type,
                name: Some(name.to_string()),
            })
            .collect();
        Self { items }
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn field_type(&self, i: usize) -> Option<DataType> {
        self.items.get(i).map(|item| item.data_type)
    }

    pub fn field_name(&self, i: usize) -> Option<&str> {
        self.items.get(i).and_then(|item| item.name.as_deref())
    }

    /// Index of the first column called `name`.
    pub fn field_name_to_index(&self, name: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.name.as_deref() == Some(name))
    }

    pub fn types(&self) -> impl Iterator<Item = DataType> + '_ {
        self.items.iter().map(|item| item.data_type)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TdItem> {
        self.items.iter()
    }

    /// Width in bytes of one tuple with this layout.
    pub fn size(&self) -> usize {
        self.items.iter().map(|item| item.data_type.width()).sum()
    }

    /// Columns of `a` followed by the columns of `b`.
    pub fn merge(a: &TupleDesc, b: &TupleDesc) -> TupleDesc {
        let mut items = a.items.clone();
        items.extend(b.items.iter().cloned());
        TupleDesc { items }
    }
}

impl PartialEq for TupleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len() && self.types().eq(other.types())
    }
}

impl Eq for TupleDesc {}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<String> = self
            .items
            .iter()
            .map(|item| match &item.name {
                Some(name) => format!("{} {}", name, item.data_type),
                None => item.data_type.to_string(),
            })
            .collect();
        write!(f, "({})", columns.join(", "))
    }
}
