//! The record shape carried through every stage

use crate::types::CellValue;
use chrono::NaiveDate;

/// Column names of the header row/line, in wire order
pub const HEADER: [&str; FIELD_COUNT] = ["studentId", "firstName", "lastName", "dob", "class", "score"];

/// Number of fields in a record
pub const FIELD_COUNT: usize = 6;

/// One row of the dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Natural key, used for upserts
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    /// `Class1`..`Class5` when generated, free text otherwise
    pub group_label: String,
    pub score: i32,
}

impl Record {
    /// Apply a stage's score offset; `None` when the result overflows
    pub fn with_score_offset(mut self, offset: i32) -> Option<Self> {
        self.score = self.score.checked_add(offset)?;
        Some(self)
    }

    /// Render as typed cells in column order
    pub fn to_cells(&self) -> [CellValue; FIELD_COUNT] {
        [
            CellValue::Int(self.id),
            CellValue::String(self.first_name.clone()),
            CellValue::String(self.last_name.clone()),
            CellValue::String(self.date_of_birth.format("%Y-%m-%d").to_string()),
            CellValue::String(self.group_label.clone()),
            CellValue::Int(i64::from(self.score)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record {
            id: 1,
            first_name: "John".into(),
            last_name: "Doe".into(),
            date_of_birth: NaiveDate::from_ymd_opt(2005, 6, 15).unwrap(),
            group_label: "Class1".into(),
            score: 70,
        }
    }

    #[test]
    fn test_score_offset() {
        assert_eq!(sample().with_score_offset(5).unwrap().score, 75);
        let mut max = sample();
        max.score = i32::MAX;
        assert!(max.with_score_offset(1).is_none());
    }

    #[test]
    fn test_cells_in_column_order() {
        let cells = sample().to_cells();
        assert_eq!(cells[0], CellValue::Int(1));
        assert_eq!(cells[3], CellValue::String("2005-06-15".into()));
        assert_eq!(cells[5], CellValue::Int(70));
    }
}
