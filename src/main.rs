//! heapstore - command line front end for heap files and transactions

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use heapstore::access::{DataType, DbFile, HeapFile, HeapFileEncoder, Op, Tuple, TupleDesc};
use heapstore::catalog::TableId;
use heapstore::observer::LoggingObserver;
use heapstore::storage::page::PageId;
use heapstore::{Database, DbConfig};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// heapstore - page-oriented heap storage with transactions
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Page size in bytes
    #[arg(long, default_value = "4096", global = true)]
    page_size: usize,

    /// Number of pages the buffer pool caches
    #[arg(long, default_value = "50", global = true)]
    pool_pages: usize,

    /// Write-ahead log file
    #[arg(short, long, default_value = "heapstore.log", global = true)]
    log: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a delimited text file into a heap file
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Comma separated column types, e.g. "int,string"
        #[arg(short, long)]
        types: String,
        /// Field separator of the input file
        #[arg(short, long, default_value = ",")]
        separator: char,
    },
    /// Print every tuple of a heap file
    Print {
        file: PathBuf,
        /// Comma separated column types, e.g. "int,string"
        #[arg(short, long)]
        types: String,
    },
    /// List the tables of a schema file
    Tables {
        #[arg(short = 'S', long)]
        schema: PathBuf,
    },
    /// Insert one row into a table
    Insert {
        #[arg(short = 'S', long)]
        schema: PathBuf,
        table: String,
        values: Vec<String>,
    },
    /// Print every row of a table
    Scan {
        #[arg(short = 'S', long)]
        schema: PathBuf,
        table: String,
    },
    /// Delete the rows of a table whose column equals a value
    Delete {
        #[arg(short = 'S', long)]
        schema: PathBuf,
        table: String,
        column: String,
        value: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = DbConfig::default()
        .with_page_size(args.page_size)
        .with_buffer_pool_pages(args.pool_pages)
        .with_log_path(&args.log);

    match args.command {
        Command::Convert {
            input,
            output,
            types,
            separator,
        } => {
            let desc = Arc::new(TupleDesc::from_types(parse_types(&types)?));
            let count =
                HeapFileEncoder::convert(&input, &output, desc, config.page_size, separator)
                    .with_context(|| format!("Failed to convert {}", input.display()))?;
            println!("{} tuples written to {}", count, output.display());
        }
        Command::Print { file, types } => {
            let desc = Arc::new(TupleDesc::from_types(parse_types(&types)?));
            print_file(&file, desc, config.page_size)?;
        }
        Command::Tables { schema } => {
            let db = open_database(config, &schema)?;
            for table_id in db.catalog().table_ids() {
                let desc = db.catalog().tuple_desc(table_id)?;
                println!("{} {}", db.catalog().table_name(table_id)?, desc);
            }
        }
        Command::Insert {
            schema,
            table,
            values,
        } => {
            let db = open_database(config, &schema)?;
            let table_id = table_id(&db, &table)?;
            let desc = db.catalog().tuple_desc(table_id)?;
            if values.len() != desc.num_fields() {
                bail!(
                    "Table {} has {} columns, {} values given",
                    table,
                    desc.num_fields(),
                    values.len()
                );
            }
            let fields = values
                .iter()
                .zip(desc.types())
                .map(|(text, data_type)| data_type.parse_value(text))
                .collect::<heapstore::DbResult<Vec<_>>>()
                .context("Failed to parse values")?;
            let mut tuple = Tuple::new(desc, fields)?;

            db.run(|txn| txn.insert_tuple(table_id, &mut tuple))
                .with_context(|| format!("Failed to insert into {}", table))?;
            println!("1 row inserted");
        }
        Command::Scan { schema, table } => {
            let db = open_database(config, &schema)?;
            let table_id = table_id(&db, &table)?;
            let rows = db
                .run(|txn| txn.scan(table_id))
                .with_context(|| format!("Failed to scan {}", table))?;
            for row in &rows {
                println!("{}", row);
            }
            println!("({} rows)", rows.len());
        }
        Command::Delete {
            schema,
            table,
            column,
            value,
        } => {
            let db = open_database(config, &schema)?;
            let table_id = table_id(&db, &table)?;
            let desc = db.catalog().tuple_desc(table_id)?;
            let index = desc
                .field_name_to_index(&column)
                .with_context(|| format!("Table {} has no column {}", table, column))?;
            let target = desc
                .field_type(index)
                .context("Column without a type")?
                .parse_value(&value)?;

            let deleted = db
                .run(|txn| {
                    let mut deleted = 0;
                    for mut row in txn.scan(table_id)? {
                        let matches = row
                            .field(index)
                            .map_or(false, |field| field.compare(Op::Equals, &target));
                        if matches {
                            txn.delete_tuple(&mut row)?;
                            deleted += 1;
                        }
                    }
                    Ok(deleted)
                })
                .with_context(|| format!("Failed to delete from {}", table))?;
            println!("{} rows deleted", deleted);
        }
    }

    Ok(())
}

/// Opens the database, registers the schema's tables and rolls back whatever
/// a previous run left unfinished.
fn open_database(config: DbConfig, schema: &Path) -> Result<Database> {
    let db = Database::open(config)
        .context("Failed to open database")?
        .with_observer(Arc::new(LoggingObserver));
    let tables = db
        .load_schema(schema)
        .with_context(|| format!("Failed to load schema {}", schema.display()))?;
    info!("Loaded {} tables from {}", tables.len(), schema.display());
    db.recover().context("Failed to recover")?;
    Ok(db)
}

fn table_id(db: &Database, name: &str) -> Result<TableId> {
    db.catalog()
        .table_id(name)
        .with_context(|| format!("Unknown table {}", name))
}

fn parse_types(types: &str) -> Result<Vec<DataType>> {
    types
        .split(',')
        .map(|name| {
            DataType::from_name(name.trim()).with_context(|| format!("Unknown type {}", name))
        })
        .collect()
}

/// Dumps a heap file page by page, without locking or caching.
fn print_file(path: &Path, desc: Arc<TupleDesc>, page_size: usize) -> Result<()> {
    let file = HeapFile::open_existing(path, desc, page_size)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut count = 0;
    for page_number in 0..file.num_pages()? {
        let page = file.read_page(PageId::new(file.id(), page_number))?;
        for tuple in page.tuples()? {
            println!("{}", tuple);
            count += 1;
        }
    }
    println!("({} tuples in {} pages)", count, file.num_pages()?);
    Ok(())
}
