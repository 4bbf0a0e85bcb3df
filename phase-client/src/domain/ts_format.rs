//! Fixed `YYYY-MM-DD HH:MM:SS` timestamp text form.
//!
//! Zero-padded and lexicographically sortable, no zone suffix. Every output
//! path (REST bodies, CSV staging, query filters) renders timestamps through
//! this module, and it doubles as a serde `with`-module for row structs.

use serde::{Deserialize, Deserializer, Serializer};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::PrimitiveDateTime;

pub const FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

const FORMAT_T: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

pub fn format(ts: PrimitiveDateTime) -> String {
    ts.format(FORMAT)
        .expect("formatting a naive datetime into a string cannot fail")
}

pub fn parse(s: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    PrimitiveDateTime::parse(s, FORMAT)
}

/// Parse the fixed form, falling back to the `T`-separated variant.
pub fn parse_flexible(s: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    PrimitiveDateTime::parse(s, FORMAT).or_else(|_| PrimitiveDateTime::parse(s, FORMAT_T))
}

pub fn serialize<S>(ts: &PrimitiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(*ts))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<PrimitiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse(&s).map_err(serde::de::Error::custom)
}
