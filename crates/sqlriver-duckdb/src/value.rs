//! DuckDB value → document scalar mapping

use chrono::NaiveDate;
use duckdb::Row;
use duckdb::types::{TimeUnit, Value};
use sqlriver_core::{FieldValue, RowListener, SourceError};

/// Result column that supplies the row identifier instead of a field.
pub const ID_COLUMN: &str = "_id";

/// Days from 0001-01-01 (CE) to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Emit one field event per column (in column order) and exactly one
/// identifier event.
pub fn emit_row(
    row: &Row<'_>,
    columns: &[String],
    listener: &mut dyn RowListener,
) -> Result<(), SourceError> {
    let mut id = None;
    for (i, name) in columns.iter().enumerate() {
        let value: Value = row.get(i).map_err(|e| SourceError::Fetch(Box::new(e)))?;
        let mapped = map_value(name, value)?;
        if name == ID_COLUMN {
            id = mapped.to_id();
        } else {
            listener.field(name, mapped);
        }
    }
    listener.id(id);
    Ok(())
}

pub fn map_value(column: &str, value: Value) -> Result<FieldValue, SourceError> {
    let unsupported = |type_name: &str| SourceError::UnsupportedType {
        column: column.to_string(),
        type_name: type_name.to_string(),
    };

    let mapped = match value {
        Value::Null => FieldValue::Null,
        Value::Boolean(b) => FieldValue::Bool(b),
        Value::TinyInt(v) => FieldValue::Int(v.into()),
        Value::SmallInt(v) => FieldValue::Int(v.into()),
        Value::Int(v) => FieldValue::Int(v),
        Value::UTinyInt(v) => FieldValue::Int(v.into()),
        Value::USmallInt(v) => FieldValue::Int(v.into()),
        Value::BigInt(v) => FieldValue::Long(v),
        Value::UInt(v) => FieldValue::Long(v.into()),
        Value::UBigInt(v) => {
            FieldValue::Long(i64::try_from(v).map_err(|_| unsupported("UBIGINT"))?)
        }
        Value::HugeInt(v) => {
            FieldValue::Long(i64::try_from(v).map_err(|_| unsupported("HUGEINT"))?)
        }
        Value::Float(v) => FieldValue::Float(v),
        Value::Double(v) => FieldValue::Double(v),
        Value::Decimal(d) => FieldValue::Double(
            d.to_string()
                .parse::<f64>()
                .map_err(|_| unsupported("DECIMAL"))?,
        ),
        Value::Text(s) => FieldValue::String(s),
        Value::Enum(s) => FieldValue::String(s),
        Value::Date32(days) => {
            FieldValue::String(format_date(days).ok_or_else(|| unsupported("DATE"))?)
        }
        Value::Timestamp(unit, v) => FieldValue::Long(epoch_millis(unit, v)),
        other => return Err(unsupported(type_name(&other))),
    };
    Ok(mapped)
}

/// `YYYY-MM-DD` for a day count relative to 1970-01-01.
fn format_date(days: i32) -> Option<String> {
    let date = NaiveDate::from_num_days_from_ce_opt(UNIX_EPOCH_DAYS_FROM_CE.checked_add(days)?)?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn epoch_millis(unit: TimeUnit, v: i64) -> i64 {
    match unit {
        TimeUnit::Second => v.saturating_mul(1_000),
        TimeUnit::Millisecond => v,
        TimeUnit::Microsecond => v.div_euclid(1_000),
        TimeUnit::Nanosecond => v.div_euclid(1_000_000),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Blob(_) => "BLOB",
        Value::Time64(..) => "TIME",
        Value::Interval { .. } => "INTERVAL",
        Value::List(_) => "LIST",
        Value::Array(_) => "ARRAY",
        Value::Struct(_) => "STRUCT",
        Value::Map(_) => "MAP",
        Value::Union(_) => "UNION",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_widen_by_size() {
        assert_eq!(map_value("c", Value::TinyInt(-3)).unwrap(), FieldValue::Int(-3));
        assert_eq!(map_value("c", Value::SmallInt(300)).unwrap(), FieldValue::Int(300));
        assert_eq!(map_value("c", Value::UInt(u32::MAX)).unwrap(), FieldValue::Long(4_294_967_295));
        assert_eq!(map_value("c", Value::BigInt(1 << 40)).unwrap(), FieldValue::Long(1 << 40));
    }

    #[test]
    fn oversized_unsigned_is_unsupported() {
        assert!(matches!(
            map_value("big", Value::UBigInt(u64::MAX)),
            Err(SourceError::UnsupportedType { type_name, .. }) if type_name == "UBIGINT"
        ));
        assert_eq!(map_value("c", Value::UBigInt(42)).unwrap(), FieldValue::Long(42));
    }

    #[test]
    fn null_is_explicit() {
        assert_eq!(map_value("c", Value::Null).unwrap(), FieldValue::Null);
    }

    #[test]
    fn dates_render_iso() {
        assert_eq!(format_date(0).as_deref(), Some("1970-01-01"));
        assert_eq!(format_date(19_723).as_deref(), Some("2024-01-01"));
        assert_eq!(format_date(-1).as_deref(), Some("1969-12-31"));
    }

    #[test]
    fn timestamps_become_epoch_millis() {
        assert_eq!(epoch_millis(TimeUnit::Second, 2), 2_000);
        assert_eq!(epoch_millis(TimeUnit::Microsecond, 1_704_067_200_123_456), 1_704_067_200_123);
        assert_eq!(epoch_millis(TimeUnit::Nanosecond, -1), -1);
    }

    #[test]
    fn blob_is_unsupported() {
        let err = map_value("payload", Value::Blob(vec![1, 2])).unwrap_err();
        assert_eq!(err.to_string(), "column [payload] has unsupported type BLOB");
    }
}
