use crate::access::tuple_desc::TupleDesc;
use crate::access::value::Value;
use crate::error::{DbError, DbResult};
use crate::storage::page::PageId;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Storage location of a tuple: a page and a slot on that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> Ordering {
        // First compare by page, then by slot
        match self.page_id.cmp(&other.page_id) {
            Ordering::Equal => self.slot.cmp(&other.slot),
            other => other,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.page_id, self.slot)
    }
}

/// A row: values laid out by a `TupleDesc`, plus its location once stored.
#[derive(Debug, Clone)]
pub struct Tuple {
    desc: Arc<TupleDesc>,
    fields: Vec<Value>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(desc: Arc<TupleDesc>, fields: Vec<Value>) -> DbResult<Self> {
        Self::check_fields(&desc, &fields)?;
        Ok(Self {
            desc,
            fields,
            record_id: None,
        })
    }

    fn check_fields(desc: &TupleDesc, fields: &[Value]) -> DbResult<()> {
        let compatible = fields.len() == desc.num_fields()
            && fields
                .iter()
                .zip(desc.types())
                .all(|(value, data_type)| value.is_compatible_with(data_type));
        if compatible {
            Ok(())
        } else {
            Err(DbError::SchemaMismatch {
                expected: desc.to_string(),
                found: format!("{:?}", fields),
            })
        }
    }

    /// Decodes one slot's bytes.
    pub fn deserialize(desc: Arc<TupleDesc>, data: &[u8]) -> DbResult<Self> {
        let mut fields = Vec::with_capacity(desc.num_fields());
        let mut offset = 0;
        for data_type in desc.types() {
            let end = (offset + data_type.width()).min(data.len());
            fields.push(Value::deserialize(data_type, &data[offset..end])?);
            offset += data_type.width();
        }
        Ok(Self {
            desc,
            fields,
            record_id: None,
        })
    }

    /// Encodes to exactly `desc.size()` bytes.
    pub fn serialize(&self) -> DbResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.desc.size());
        for (value, data_type) in self.fields.iter().zip(self.desc.types()) {
            value.serialize_into(data_type, &mut buf)?;
        }
        Ok(buf)
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn field(&self, i: usize) -> Option<&Value> {
        self.fields.get(i)
    }

    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    pub fn set_field(&mut self, i: usize, value: Value) -> DbResult<()> {
        match self.desc.field_type(i) {
            Some(data_type) if value.is_compatible_with(data_type) => {
                self.fields[i] = value;
                Ok(())
            }
            _ => Err(DbError::SchemaMismatch {
                expected: self.desc.to_string(),
                found: format!("field {} = {:?}", i, value),
            }),
        }
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }
}

/// Tuples are equal when their values are; location is not part of identity.
impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for Tuple {}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.fields.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", values.join("\t"))
    }
}
