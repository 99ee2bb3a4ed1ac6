//! Registry of the tables a database knows about.
//!
//! Maps table ids to their files, layouts, names and primary keys. Tables are
//! registered directly with [`Catalog::add_table`] or in bulk from a schema
//! file with [`Catalog::load_schema`].

use crate::access::{DataType, DbFile, HeapFile, TupleDesc};
use crate::error::{DbError, DbResult};
use dashmap::DashMap;
use log::info;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

pub type TableId = u32;

#[derive(Clone)]
struct TableInfo {
    file: Arc<dyn DbFile>,
    name: String,
    primary_key: String,
}

#[derive(Default)]
pub struct Catalog {
    tables: DashMap<TableId, TableInfo>,
    names: DashMap<String, TableId>,
    // Keeps `tables` and `names` consistent while registering.
    registration: Mutex<()>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `file` as table `name`. An existing table with the same name
    /// or the same id is replaced.
    pub fn add_table(&self, file: Arc<dyn DbFile>, name: &str, primary_key: &str) -> DbResult<()> {
        if name.is_empty() {
            return Err(DbError::InvalidSchema("table name is empty".to_string()));
        }
        let table_id = file.id();

        let _registering = self.registration.lock();
        if let Some((_, previous)) = self.names.remove(name) {
            self.tables.remove(&previous);
        }
        if let Some((_, previous)) = self.tables.remove(&table_id) {
            self.names.remove(&previous.name);
        }

        self.names.insert(name.to_string(), table_id);
        self.tables.insert(
            table_id,
            TableInfo {
                file,
                name: name.to_string(),
                primary_key: primary_key.to_string(),
            },
        );
        Ok(())
    }

    pub fn table_id(&self, name: &str) -> DbResult<TableId> {
        self.names
            .get(name)
            .map(|entry| *entry.value())
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    fn info(&self, table_id: TableId) -> DbResult<TableInfo> {
        self.tables
            .get(&table_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DbError::TableNotFound(format!("id {}", table_id)))
    }

    pub fn database_file(&self, table_id: TableId) -> DbResult<Arc<dyn DbFile>> {
        Ok(self.info(table_id)?.file)
    }

    pub fn tuple_desc(&self, table_id: TableId) -> DbResult<Arc<TupleDesc>> {
        Ok(self.info(table_id)?.file.tuple_desc().clone())
    }

    pub fn table_name(&self, table_id: TableId) -> DbResult<String> {
        Ok(self.info(table_id)?.name)
    }

    /// Primary key column name; empty if the table has none.
    pub fn primary_key(&self, table_id: TableId) -> DbResult<String> {
        Ok(self.info(table_id)?.primary_key)
    }

    /// Ids of every registered table, in ascending order.
    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.tables.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn clear(&self) {
        let _registering = self.registration.lock();
        self.tables.clear();
        self.names.clear();
    }

    /// Registers every table described in a schema file.
    ///
    /// One table per line: `name (field type [pk], ...)` with types `int` or
    /// `string`. The data of table `name` lives in `name.dat` next to the
    /// schema file and is created empty if missing. Returns the ids of the
    /// loaded tables in file order.
    pub fn load_schema(&self, path: &Path, page_size: usize) -> DbResult<Vec<TableId>> {
        let contents = std::fs::read_to_string(path)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut loaded = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (name, desc, primary_key) = parse_table_line(line)?;
            let file = HeapFile::open(&dir.join(format!("{}.dat", name)), Arc::new(desc), page_size)?;
            let table_id = file.id();
            self.add_table(Arc::new(file), &name, &primary_key)?;
            info!("Added table {} with schema {}", name, self.tuple_desc(table_id)?);
            loaded.push(table_id);
        }
        Ok(loaded)
    }
}

fn parse_table_line(line: &str) -> DbResult<(String, TupleDesc, String)> {
    let invalid = |reason: &str| DbError::InvalidSchema(format!("{}: {}", reason, line));

    let open = line.find('(').ok_or_else(|| invalid("missing '('"))?;
    let close = line.rfind(')').ok_or_else(|| invalid("missing ')'"))?;
    if close < open {
        return Err(invalid("malformed field list"));
    }
    let name = line[..open].trim();
    if name.is_empty() {
        return Err(invalid("missing table name"));
    }

    let mut types = Vec::new();
    let mut names = Vec::new();
    let mut primary_key = String::new();
    for field in line[open + 1..close].split(',') {
        let parts: Vec<&str> = field.split_whitespace().collect();
        match parts.as_slice() {
            [field_name, type_name] => {
                types.push(DataType::from_name(type_name)?);
                names.push(Some(field_name.to_string()));
            }
            [field_name, type_name, annotation] if annotation.eq_ignore_ascii_case("pk") => {
                types.push(DataType::from_name(type_name)?);
                names.push(Some(field_name.to_string()));
                primary_key = field_name.to_string();
            }
            _ => return Err(invalid("expected 'name type [pk]'")),
        }
    }

    Ok((name.to_string(), TupleDesc::new(types, names)?, primary_key))
}
