//! Synthetic student dataset generation

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{Days, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::config::GeneratorConfig;
use crate::error::{Result, TableError};
use crate::fast_writer::TableWriter;
use crate::record::{Record, HEADER};

/// Group labels assigned uniformly at random
pub const CLASSES: [&str; 5] = ["Class1", "Class2", "Class3", "Class4", "Class5"];

/// Inclusive score range of generated records
pub const SCORE_RANGE: std::ops::RangeInclusive<i32> = 55..=75;

/// Inclusive name length range of generated records
pub const NAME_LEN_RANGE: std::ops::RangeInclusive<usize> = 3..=8;

const FIRST_DOB: (i32, u32, u32) = (2000, 1, 1);
const LAST_DOB: (i32, u32, u32) = (2010, 12, 31);

/// Writes spreadsheets of random student records
pub struct DatasetGenerator<G: Rng = StdRng> {
    rng: G,
    config: GeneratorConfig,
    first_dob: NaiveDate,
    dob_span_days: u64,
}

impl DatasetGenerator<StdRng> {
    /// Generator seeded from the operating system
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Generator with a fixed seed, for reproducible datasets
    pub fn seeded(config: GeneratorConfig, seed: u64) -> Result<Self> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }
}

impl<G: Rng> DatasetGenerator<G> {
    /// Generator drawing from `rng`
    pub fn with_rng(config: GeneratorConfig, rng: G) -> Result<Self> {
        let (first, last) = match (date(FIRST_DOB), date(LAST_DOB)) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(TableError::Config("invalid date-of-birth range".into())),
        };
        let dob_span_days = (last - first).num_days() as u64 + 1;
        Ok(DatasetGenerator {
            rng,
            config,
            first_dob: first,
            dob_span_days,
        })
    }

    /// Write a header plus `count` random records to `destination`
    ///
    /// `count = 0` produces a header-only workbook.
    pub fn generate<P: AsRef<Path>>(&mut self, count: u64, destination: P) -> Result<PathBuf> {
        let started = Instant::now();
        let mut writer = TableWriter::create(destination, &HEADER, &self.config)?;

        for id in 1..=count {
            let record = self.record(id as i64);
            writer.append_row(record.to_cells())?;
        }

        let path = writer.close()?;
        info!(
            rows = count,
            path = %path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generated dataset"
        );
        Ok(path)
    }

    /// One random record with the given id
    pub fn record(&mut self, id: i64) -> Record {
        let first_name = self.name();
        let last_name = self.name();
        let offset = self.rng.random_range(0..self.dob_span_days);
        let date_of_birth = self
            .first_dob
            .checked_add_days(Days::new(offset))
            .unwrap_or(self.first_dob);
        let group_label = CLASSES.choose(&mut self.rng).unwrap_or(&CLASSES[0]).to_string();
        let score = self.rng.random_range(SCORE_RANGE);

        Record {
            id,
            first_name,
            last_name,
            date_of_birth,
            group_label,
            score,
        }
    }

    fn name(&mut self) -> String {
        let len = self.rng.random_range(NAME_LEN_RANGE);
        (0..len)
            .map(|_| char::from(b'A' + self.rng.random_range(0..26u8)))
            .collect()
    }
}

fn date((y, m, d): (i32, u32, u32)) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
}
