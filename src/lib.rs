//! # tabload
//!
//! Streaming generation, conversion and bulk loading of large tabular
//! datasets with bounded memory.
//!
//! ## Features
//!
//! - **Windowed XLSX writer**: millions of rows with memory bounded by a row window
//! - **Streaming XLSX reader**: forward-only row cursor with size and inflation limits
//! - **Conversion**: spreadsheet to delimited text with a per-stage score offset
//! - **Bulk loading**: producer thread feeding a store's bulk-copy path, with a
//!   transactional row-upsert fallback
//!
//! ## Quick Start
//!
//! ### Generating and converting
//!
//! ```rust,no_run
//! use tabload::config::TabloadConfig;
//! use tabload::convert::convert;
//! use tabload::generate::DatasetGenerator;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TabloadConfig::default();
//! let mut generator = DatasetGenerator::new(config.generator.clone())?;
//! let xlsx = generator.generate(10_000, "students.xlsx")?;
//!
//! let summary = convert(&xlsx, "students.csv", &config.reader, &config.convert)?;
//! println!("{} rows", summary.rows);
//! # Ok(())
//! # }
//! ```
//!
//! ### Loading into PostgreSQL
//!
//! ```rust,no_run
//! # #[cfg(feature = "postgres")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::path::Path;
//! use tabload::bulk::BulkLoader;
//! use tabload::config::LoadConfig;
//! use tabload::store::PostgresStore;
//!
//! let config = LoadConfig::default();
//! let store = PostgresStore::new("postgres://localhost/school", config.table.clone());
//! let report = BulkLoader::new(store, config).upload(Path::new("students.csv"))?;
//! println!("{} rows via {:?}", report.rows, report.path);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "postgres"))]
//! # fn main() {}
//! ```

pub mod bulk;
pub mod codec;
pub mod config;
pub mod convert;
pub mod csv;
pub mod csv_writer;
pub mod error;
pub mod fast_writer;
pub mod generate;
pub mod logging;
pub mod output;
pub mod record;
pub mod store;
pub mod streaming_reader;
pub mod types;

pub use bulk::{BulkLoader, CancelFlag, LoadPath, LoadReport, UploadSource};
pub use codec::{Dialect, LineOutcome};
pub use config::TabloadConfig;
pub use convert::{convert, ConversionSummary};
pub use error::{Result, TableError};
pub use fast_writer::TableWriter;
pub use generate::DatasetGenerator;
pub use record::Record;
pub use streaming_reader::TableReader;
pub use types::{Cell, CellStyle, CellValue, Row};
