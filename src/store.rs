//! In-memory formula store backed by two CSV tables.
//!
//! ## Tables
//! - `finishes.csv`: one row per stain color, `color,formula,created,id,comments`
//! - `ingredients.csv`: one row per ingredient, `code,label,density,grams,cost,formula_id`
//!
//! Both tables are reloaded wholesale. Each loads independently: one
//! table's failure never rolls back the other's success, and a failed
//! load leaves that table's prior rows visible. Within a row, numeric
//! fields that fail to parse become zero and dates fall back to the
//! epoch sentinel; rows with too few fields are dropped outright.

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::csvio;

/// Finishes table file name, relative to the data directory.
pub const FINISHES_CSV: &str = "finishes.csv";
/// Ingredients table file name, relative to the data directory.
pub const INGREDIENTS_CSV: &str = "ingredients.csv";

const FINISH_MIN_FIELDS: usize = 4;
const INGREDIENT_MIN_FIELDS: usize = 6;

/// One stain color record. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Finish {
    pub color_name: String,
    pub formula_name: String,
    pub created: NaiveDateTime,
    /// Numeric key joining this finish to its ingredient rows.
    pub formula_id: i64,
    pub comments: String,
}

/// One formula ingredient row.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingredient {
    pub code: String,
    pub label: String,
    /// Mass/volume ratio. Values ≤ 0 are treated as 1.0 at use time.
    pub density: f64,
    /// As-formulated mass for one baseline batch.
    pub grams: f64,
    pub cost: f64,
    /// String-typed foreign key; compared against the finish's numeric id
    /// rendered as a string. No referential integrity is enforced.
    pub formula_id: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} contains no data rows")]
    Empty { path: PathBuf },
}

/// Per-table outcome of one reload. A table either reports how many rows
/// it now holds or why it kept its previous rows.
#[derive(Debug)]
pub struct LoadReport {
    pub finishes: Result<usize, StoreError>,
    pub ingredients: Result<usize, StoreError>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.finishes.is_ok() && self.ingredients.is_ok()
    }
}

/// The loaded dataset and the directory it came from.
pub struct FormulaStore {
    data_dir: PathBuf,
    finishes: Vec<Finish>,
    ingredients: Vec<Ingredient>,
}

impl FormulaStore {
    /// Creates an empty store reading from `data_dir`. Call [`reload`]
    /// to populate it.
    ///
    /// [`reload`]: FormulaStore::reload
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            finishes: Vec::new(),
            ingredients: Vec::new(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn finishes(&self) -> &[Finish] {
        &self.finishes
    }

    pub fn ingredients(&self) -> &[Ingredient] {
        &self.ingredients
    }

    /// Reloads both tables. Each table is parsed to completion before it
    /// replaces the in-memory rows, so readers never observe a half-loaded
    /// table; a failing table keeps its previous rows.
    pub fn reload(&mut self) -> LoadReport {
        let finishes = self.load_table(FINISHES_CSV, FINISH_MIN_FIELDS, parse_finish);
        let finishes = match finishes {
            Ok(rows) => {
                let count = rows.len();
                self.finishes = rows;
                tracing::info!("[Store] Loaded {} finish(es)", count);
                Ok(count)
            }
            Err(e) => {
                tracing::error!("[Store] Finishes table kept prior data: {}", e);
                Err(e)
            }
        };

        let ingredients = self.load_table(INGREDIENTS_CSV, INGREDIENT_MIN_FIELDS, parse_ingredient);
        let ingredients = match ingredients {
            Ok(rows) => {
                let count = rows.len();
                self.ingredients = rows;
                tracing::info!("[Store] Loaded {} ingredient(s)", count);
                Ok(count)
            }
            Err(e) => {
                tracing::error!("[Store] Ingredients table kept prior data: {}", e);
                Err(e)
            }
        };

        LoadReport {
            finishes,
            ingredients,
        }
    }

    fn load_table<T>(
        &self,
        file_name: &str,
        min_fields: usize,
        parse: fn(&[String]) -> T,
    ) -> Result<Vec<T>, StoreError> {
        let path = self.data_dir.join(file_name);
        let content = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        let records = csvio::parse_document(&content);
        if records.is_empty() {
            return Err(StoreError::Empty { path });
        }

        // First record is the header.
        let rows = records[1..]
            .iter()
            .filter(|fields| fields.len() >= min_fields)
            .map(|fields| parse(fields))
            .collect();
        Ok(rows)
    }

    /// Case-insensitive substring search over color and formula names.
    /// A blank term returns every finish.
    pub fn search(&self, term: &str) -> Vec<&Finish> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return self.finishes.iter().collect();
        }

        self.finishes
            .iter()
            .filter(|f| {
                f.color_name.to_lowercase().contains(&needle)
                    || f.formula_name.to_lowercase().contains(&needle)
            })
            .collect()
    }

    /// Ingredient rows belonging to `finish`, in source-file order.
    /// A formula with no rows yields an empty list.
    pub fn ingredients_for(&self, finish: &Finish) -> Vec<&Ingredient> {
        let key = finish.formula_id.to_string();
        self.ingredients
            .iter()
            .filter(|i| i.formula_id == key)
            .collect()
    }

    pub fn find_finish(&self, term: &str) -> Option<&Finish> {
        self.search(term).into_iter().next()
    }
}

fn parse_finish(fields: &[String]) -> Finish {
    Finish {
        color_name: fields[0].clone(),
        formula_name: fields[1].clone(),
        created: parse_datetime(&fields[2]),
        formula_id: fields[3].trim().parse().unwrap_or(0),
        comments: fields.get(4).cloned().unwrap_or_default(),
    }
}

fn parse_ingredient(fields: &[String]) -> Ingredient {
    Ingredient {
        code: fields[0].clone(),
        label: fields[1].clone(),
        density: fields[2].trim().parse().unwrap_or(0.0),
        grams: fields[3].trim().parse().unwrap_or(0.0),
        cost: fields[4].trim().parse().unwrap_or(0.0),
        formula_id: fields[5].trim().to_string(),
    }
}

/// Accepts the two timestamp shapes seen in exported tables; anything
/// else becomes the epoch sentinel.
fn parse_datetime(value: &str) -> NaiveDateTime {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or(NaiveDateTime::UNIX_EPOCH))
        })
        .unwrap_or(NaiveDateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tables(dir: &Path, finishes: &str, ingredients: &str) {
        let mut f = std::fs::File::create(dir.join(FINISHES_CSV)).unwrap();
        f.write_all(finishes.as_bytes()).unwrap();
        let mut i = std::fs::File::create(dir.join(INGREDIENTS_CSV)).unwrap();
        i.write_all(ingredients.as_bytes()).unwrap();
    }

    const FINISHES: &str = "\
color,formula,created,id,comments
Dark Walnut,DW-12,2023-04-01 10:30:00,12,\"rich, warm tone\"
Golden Oak,GO-7,2023-05-15 09:00:00,7,
Ebony,EB-3,not a date,3,legacy row
";

    const INGREDIENTS: &str = "\
code,label,density,grams,cost,formula_id
B1,Burnt Umber,1.20,120.0,4.10,12
B2,Raw Sienna,1.05,30.0,3.75,12
S9,Carrier Oil,0.92,850.0,1.20,12
X1,Jet Black,1.40,200.0,5.00,3
";

    fn loaded_store(dir: &Path) -> FormulaStore {
        write_tables(dir, FINISHES, INGREDIENTS);
        let mut store = FormulaStore::new(dir);
        let report = store.reload();
        assert!(report.is_complete());
        store
    }

    #[test]
    fn loads_both_tables() {
        let dir = tempfile::tempdir().unwrap();
        let store = loaded_store(dir.path());

        assert_eq!(store.finishes().len(), 3);
        assert_eq!(store.ingredients().len(), 4);

        let walnut = &store.finishes()[0];
        assert_eq!(walnut.color_name, "Dark Walnut");
        assert_eq!(walnut.formula_id, 12);
        assert_eq!(walnut.comments, "rich, warm tone");
    }

    #[test]
    fn unparseable_fields_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = loaded_store(dir.path());

        let ebony = &store.finishes()[2];
        assert_eq!(ebony.created, NaiveDateTime::UNIX_EPOCH);
    }

    #[test]
    fn short_rows_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(
            dir.path(),
            "color,formula,created,id,comments\nOak,O-1,2023-01-01 00:00:00,1,ok\nOak,O-2\n",
            "code,label,density,grams,cost,formula_id\nB1,Umber,1.0\n",
        );

        let mut store = FormulaStore::new(dir.path());
        let report = store.reload();
        assert!(report.is_complete());
        assert_eq!(store.finishes().len(), 1);
        assert_eq!(store.ingredients().len(), 0);
    }

    #[test]
    fn failed_table_keeps_prior_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = loaded_store(dir.path());

        std::fs::remove_file(dir.path().join(INGREDIENTS_CSV)).unwrap();
        let report = store.reload();

        assert!(report.finishes.is_ok());
        assert!(matches!(report.ingredients, Err(StoreError::Io { .. })));
        // ingredients from the previous load stay visible
        assert_eq!(store.ingredients().len(), 4);
    }

    #[test]
    fn search_is_case_insensitive_and_blank_returns_all() {
        let dir = tempfile::tempdir().unwrap();
        let store = loaded_store(dir.path());

        assert_eq!(store.search("walnut").len(), 1);
        assert_eq!(store.search("GO-7").len(), 1);
        assert_eq!(store.search("   ").len(), 3);
        assert!(store.search("mahogany").is_empty());
    }

    #[test]
    fn ingredients_join_on_stringified_id_in_source_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = loaded_store(dir.path());

        let walnut = store.find_finish("Dark Walnut").unwrap();
        let rows = store.ingredients_for(walnut);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].code, "B1");
        assert_eq!(rows[2].code, "S9");

        // id 7 has no rows: empty, not an error
        let oak = store.find_finish("Golden Oak").unwrap();
        assert!(store.ingredients_for(oak).is_empty());
    }
}
