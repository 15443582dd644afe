//! SQL result sets, addressed by `row:column`.
//!
//! A bare row number addresses a whole row, [`COLUMNS`] the column names and
//! [`ROW_COUNT`] the affected-row count of a data manipulation statement.

use super::query::Pair;
use super::{Codec, Msg};
use crate::error::{MessageError, Result};
use crate::ledger::Update;
use crate::value::{FieldValue, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// Address of the column name list.
pub const COLUMNS: &str = "columns";
/// Address of the affected row count.
pub const ROW_COUNT: &str = "row_count";

const WARNING: &str = "This is not representative of an actual wire protocol";

static ROW_COLUMN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+):(\d+)$").expect("valid regex"));
static ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid regex"));

/// Column names plus sparse rows of column-index to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    pub columns: Vec<String>,
    pub rows: Vec<BTreeMap<usize, Value>>,
    pub affected_row_count: Option<u64>,
}

impl Grid {
    fn row_mut(&mut self, row: usize) -> &mut BTreeMap<usize, Value> {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, BTreeMap::new);
        }
        &mut self.rows[row]
    }
}

#[derive(Serialize, Deserialize)]
struct Wire {
    #[serde(default, skip_deserializing)]
    warning: Option<String>,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<Pair<usize>>>,
    #[serde(default)]
    affected_row_count: Option<u64>,
}

enum Address {
    Columns,
    RowCount,
    Row(usize),
    Cell(usize, usize),
}

impl Address {
    fn parse(field: &str) -> Result<Self> {
        let index = |s: &str| {
            s.parse::<usize>().map_err(|e| {
                MessageError::invalid_field(ResultCodec::NAME, field, e.to_string())
            })
        };
        if field == COLUMNS {
            Ok(Address::Columns)
        } else if field == ROW_COUNT {
            Ok(Address::RowCount)
        } else if ROW.is_match(field) {
            Ok(Address::Row(index(field)?))
        } else if let Some(caps) = ROW_COLUMN.captures(field) {
            Ok(Address::Cell(index(&caps[1])?, index(&caps[2])?))
        } else {
            Err(MessageError::invalid_field(
                ResultCodec::NAME,
                field,
                "expected 'columns', 'row_count', 'row' or 'row:column'",
            ))
        }
    }
}

pub struct ResultCodec;

impl Codec for ResultCodec {
    type Repr = Grid;

    const NAME: &'static str = "result";

    fn empty() -> Grid {
        Grid::default()
    }

    fn parse(bytes: &[u8]) -> Result<Grid> {
        let wire: Wire =
            serde_json::from_slice(bytes).map_err(|e| MessageError::parse(Self::NAME, bytes, e))?;
        let rows = wire
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(Pair::into_entry)
                    .collect::<std::result::Result<BTreeMap<_, _>, _>>()
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| MessageError::parse(Self::NAME, bytes, e))?;
        Ok(Grid {
            columns: wire.columns,
            rows,
            affected_row_count: wire.affected_row_count,
        })
    }

    fn validate(field: &str, value: &FieldValue) -> Result<()> {
        match (Address::parse(field)?, value) {
            (_, FieldValue::Delete) => Ok(()),
            (Address::Columns, FieldValue::Value(Value::Text(_))) => Ok(()),
            (Address::Columns, FieldValue::Value(Value::List(names)))
                if names.iter().all(|n| matches!(n, Value::Text(_))) =>
            {
                Ok(())
            }
            (Address::RowCount, FieldValue::Value(v)) if v.is_scalar() => Ok(()),
            (Address::Row(row), FieldValue::Value(Value::List(values))) => {
                values.iter().enumerate().try_for_each(|(column, v)| {
                    super::require_scalar(
                        Self::NAME,
                        &format!("{row}:{column}"),
                        &FieldValue::Value(v.clone()),
                    )
                })
            }
            (Address::Cell(..), value) => super::require_scalar(Self::NAME, field, value),
            (_, other) => Err(MessageError::invalid_value(Self::NAME, field, other.kind())),
        }
    }

    fn apply(grid: &mut Grid, update: &Update) -> Result<()> {
        let value = update.value().and_then(FieldValue::as_value);
        match Address::parse(update.field())? {
            Address::Columns => {
                grid.columns = match value {
                    Some(Value::List(names)) => names.iter().map(Value::to_string).collect(),
                    Some(Value::Text(names)) => names.split(',').map(str::to_owned).collect(),
                    _ => Vec::new(),
                };
            }
            Address::RowCount => {
                grid.affected_row_count = value.and_then(|v| v.to_string().parse().ok());
            }
            Address::Row(row) => match value {
                Some(Value::List(values)) => {
                    let target = grid.row_mut(row);
                    target.clear();
                    target.extend(values.iter().cloned().enumerate());
                }
                _ => {
                    if row < grid.rows.len() {
                        grid.rows.remove(row);
                    }
                }
            },
            Address::Cell(row, column) => match value {
                Some(v) => {
                    grid.row_mut(row).insert(column, v.clone());
                }
                None => {
                    if let Some(target) = grid.rows.get_mut(row) {
                        target.remove(&column);
                    }
                }
            },
        }
        Ok(())
    }

    fn access(grid: &Grid, field: &str) -> Result<Option<Value>> {
        Ok(match Address::parse(field)? {
            Address::Columns => Some(Value::List(
                grid.columns.iter().map(Value::from).collect(),
            )),
            Address::RowCount => grid.affected_row_count.map(Value::from),
            Address::Row(row) => grid.rows.get(row).map(|values| {
                Value::List(
                    (0..grid.columns.len())
                        .map(|c| values.get(&c).cloned().unwrap_or_default())
                        .collect(),
                )
            }),
            Address::Cell(row, column) => grid
                .rows
                .get(row)
                .and_then(|values| values.get(&column))
                .cloned(),
        })
    }

    fn fields(grid: &Grid) -> BTreeSet<String> {
        let mut fields = BTreeSet::from([COLUMNS.to_owned()]);
        for (row, values) in grid.rows.iter().enumerate() {
            fields.extend(values.keys().map(|column| format!("{row}:{column}")));
        }
        fields
    }

    fn serialize(grid: &Grid) -> Result<Vec<u8>> {
        let rows = grid
            .rows
            .iter()
            .map(|row| row.iter().map(|(k, v)| Pair::new(*k, v)).collect::<Result<Vec<_>>>())
            .collect::<Result<Vec<_>>>()?;
        let wire = Wire {
            warning: Some(WARNING.to_owned()),
            columns: grid.columns.clone(),
            rows,
            affected_row_count: grid.affected_row_count,
        };
        serde_json::to_vec(&wire).map_err(|e| MessageError::serialization(format!("{grid:?}"), e))
    }

    fn render(grid: &Grid) -> Result<String> {
        if let Some(count) = grid.affected_row_count {
            return Ok(format!("{count} affected rows"));
        }
        let width = grid.columns.iter().map(|c| c.chars().count()).max().unwrap_or(0);
        let mut human = String::new();
        for (index, row) in grid.rows.iter().enumerate() {
            if index != 0 {
                human.push('\n');
            }
            let _ = write!(human, " --- Row {index} ---");
            for (column, name) in grid.columns.iter().enumerate() {
                let value = row.get(&column).unwrap_or(&Value::Null);
                let _ = write!(human, "\n {name:>width$} : {value}");
            }
        }
        Ok(human)
    }
}

impl Msg<ResultCodec> {
    /// An empty result with the given column names.
    pub fn with_columns<S: AsRef<str>>(columns: &[S]) -> Self {
        Self::literal(Grid {
            columns: columns.iter().map(|c| c.as_ref().to_owned()).collect(),
            ..Grid::default()
        })
    }

    /// Rows as column-name to value maps. Cells without a named column are dropped.
    pub fn rows(&self) -> Result<Vec<BTreeMap<String, Value>>> {
        let grid = self.data()?;
        Ok(grid
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter_map(|(c, v)| grid.columns.get(*c).map(|name| (name.clone(), v.clone())))
                    .collect()
            })
            .collect())
    }

    /// The affected row count, or `None` if this is not the result of a data
    /// manipulation statement.
    pub fn affected_row_count(&self) -> Result<Option<u64>> {
        Ok(self.data()?.affected_row_count)
    }
}
