// Copyright (c) 2021 mysql-native contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::io;
use std::io::Write as StdWrite;

use byteorder::LittleEndian as LE;
use byteorder::WriteBytesExt;

use crate::consts::{ColumnFlags, ColumnType};
use crate::io::{Read, Write};
use crate::packet::Column;

/// One row of a result set.
pub type Row = Vec<Value>;

/// A single result-set cell.
#[derive(Clone, PartialEq, PartialOrd, Debug)]
pub enum Value {
    NULL,
    Bytes(Vec<u8>),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// year, month, day, hour, minutes, seconds, micro seconds
    Date(u16, u8, u8, u8, u8, u8, u32),
    /// is negative, days, hours, minutes, seconds, micro seconds
    Time(bool, u32, u8, u8, u8, u32),
}

impl Value {
    /// Renders the value as an SQL literal, escaping with the backslash
    /// regime.
    pub fn into_str(&self) -> String {
        match *self {
            Value::NULL => "NULL".to_owned(),
            Value::Bytes(ref x) => match std::str::from_utf8(x) {
                Ok(s) => format!("'{}'", escape_string(s)),
                Err(_) => {
                    let mut s = "0x".to_owned();
                    for c in x.iter() {
                        s.push_str(&format!("{:02X}", *c));
                    }
                    s
                }
            },
            Value::Int(x) => format!("{}", x),
            Value::UInt(x) => format!("{}", x),
            Value::Float(x) => format!("{}", x),
            Value::Date(y, m, d, 0, 0, 0, 0) => format!("'{:04}-{:02}-{:02}'", y, m, d),
            Value::Date(y, m, d, h, i, s, 0) => format!(
                "'{:04}-{:02}-{:02} {:02}:{:02}:{:02}'",
                y, m, d, h, i, s
            ),
            Value::Date(y, m, d, h, i, s, u) => format!(
                "'{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}'",
                y, m, d, h, i, s, u
            ),
            Value::Time(neg, d, h, i, s, 0) => {
                let sign = if neg { "-" } else { "" };
                format!("'{}{:03}:{:02}:{:02}'", sign, d * 24 + h as u32, i, s)
            }
            Value::Time(neg, d, h, i, s, u) => {
                let sign = if neg { "-" } else { "" };
                format!(
                    "'{}{:03}:{:02}:{:02}.{:06}'",
                    sign,
                    d * 24 + h as u32,
                    i,
                    s,
                    u
                )
            }
        }
    }

    /// Decodes a text-protocol row payload.
    pub fn from_payload(pld: &[u8], columns_count: usize) -> io::Result<Vec<Value>> {
        let mut output = Vec::with_capacity(columns_count);
        let mut reader = &pld[..];
        loop {
            if reader.is_empty() {
                break;
            } else if reader[0] == 0xfb {
                reader = &reader[1..];
                output.push(Value::NULL);
            } else {
                output.push(Value::Bytes(reader.read_lenenc_bytes()?));
            }
        }
        Ok(output)
    }

    /// Decodes a binary-protocol row payload.
    pub fn from_bin_payload(pld: &[u8], columns: &[Column]) -> io::Result<Vec<Value>> {
        // the null bitmap of a row is offset by two bits
        let bit_offset = 2;
        let bitmap_len = (columns.len() + 7 + bit_offset) / 8;
        if pld.len() < 1 + bitmap_len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "binary row is shorter than its null bitmap",
            ));
        }
        let mut values = Vec::with_capacity(columns.len());
        let bitmap = &pld[1..1 + bitmap_len];
        let mut reader = &pld[1 + bitmap_len..];
        for (i, column) in columns.iter().enumerate() {
            if bitmap[(i + bit_offset) / 8] & (1 << ((i + bit_offset) % 8)) == 0 {
                values.push(reader.read_bin_value(
                    column.column_type,
                    column.flags.contains(ColumnFlags::UNSIGNED_FLAG),
                )?);
            } else {
                values.push(Value::NULL);
            }
        }
        Ok(values)
    }
}

/// Escapes special characters the standard MySQL way.
pub fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\x00' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\x1a' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out
}

/// Escapes by doubling quote characters, for sessions with
/// `NO_BACKSLASH_ESCAPES` set.
pub fn escape_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\'' => out.push_str("''"),
            '"' => out.push_str("\"\""),
            '`' => out.push_str("``"),
            c => out.push(c),
        }
    }
    out
}

/// A value bound to a statement parameter: the wire type it is declared as
/// plus the payload.
#[derive(Clone, PartialEq, Debug)]
pub struct Param {
    pub(crate) typ: ColumnType,
    pub(crate) unsigned: bool,
    pub(crate) value: Value,
}

impl Param {
    fn new(typ: ColumnType, unsigned: bool, value: Value) -> Param {
        Param {
            typ,
            unsigned,
            value,
        }
    }

    /// An explicit SQL NULL. Equivalent to leaving the parameter unbound.
    pub fn null() -> Param {
        Param::new(ColumnType::MYSQL_TYPE_NULL, false, Value::NULL)
    }

    /// Escape hatch: ship `bytes` length-encoded, declared as `typ`.
    pub fn raw(typ: ColumnType, bytes: Vec<u8>) -> Param {
        Param::new(typ, false, Value::Bytes(bytes))
    }

    pub fn date(year: u16, month: u8, day: u8) -> Param {
        Param::new(
            ColumnType::MYSQL_TYPE_DATE,
            false,
            Value::Date(year, month, day, 0, 0, 0, 0),
        )
    }

    pub fn datetime(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        micros: u32,
    ) -> Param {
        Param::new(
            ColumnType::MYSQL_TYPE_DATETIME,
            false,
            Value::Date(year, month, day, hour, minute, second, micros),
        )
    }

    pub fn timestamp(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        micros: u32,
    ) -> Param {
        Param::new(
            ColumnType::MYSQL_TYPE_TIMESTAMP,
            false,
            Value::Date(year, month, day, hour, minute, second, micros),
        )
    }

    pub fn time(
        is_negative: bool,
        days: u32,
        hours: u8,
        minutes: u8,
        seconds: u8,
        micros: u32,
    ) -> Param {
        Param::new(
            ColumnType::MYSQL_TYPE_TIME,
            false,
            Value::Time(is_negative, days, hours, minutes, seconds, micros),
        )
    }

    pub fn is_null(&self) -> bool {
        self.typ == ColumnType::MYSQL_TYPE_NULL || self.value == Value::NULL
    }

    fn int_value(&self) -> io::Result<u64> {
        match self.value {
            Value::Int(x) => Ok(x as u64),
            Value::UInt(x) => Ok(x),
            _ => Err(type_mismatch()),
        }
    }

    /// Encodes the value the way the declared type dictates.
    pub(crate) fn to_bin(&self) -> io::Result<Vec<u8>> {
        let mut writer = Vec::with_capacity(16);
        match self.typ {
            ColumnType::MYSQL_TYPE_NULL => (),
            ColumnType::MYSQL_TYPE_TINY => {
                writer.write_u8(self.int_value()? as u8)?;
            }
            ColumnType::MYSQL_TYPE_SHORT | ColumnType::MYSQL_TYPE_YEAR => {
                writer.write_u16::<LE>(self.int_value()? as u16)?;
            }
            ColumnType::MYSQL_TYPE_LONG | ColumnType::MYSQL_TYPE_INT24 => {
                writer.write_u32::<LE>(self.int_value()? as u32)?;
            }
            ColumnType::MYSQL_TYPE_LONGLONG => {
                writer.write_u64::<LE>(self.int_value()?)?;
            }
            ColumnType::MYSQL_TYPE_FLOAT => match self.value {
                Value::Float(x) => writer.write_f32::<LE>(x as f32)?,
                _ => return Err(type_mismatch()),
            },
            ColumnType::MYSQL_TYPE_DOUBLE => match self.value {
                Value::Float(x) => writer.write_f64::<LE>(x)?,
                _ => return Err(type_mismatch()),
            },
            ColumnType::MYSQL_TYPE_DATE
            | ColumnType::MYSQL_TYPE_DATETIME
            | ColumnType::MYSQL_TYPE_TIMESTAMP => match self.value {
                Value::Date(0u16, 0u8, 0u8, 0u8, 0u8, 0u8, 0u32) => writer.write_u8(0u8)?,
                Value::Date(y, m, d, 0u8, 0u8, 0u8, 0u32) => {
                    writer.write_u8(4u8)?;
                    writer.write_u16::<LE>(y)?;
                    writer.write_u8(m)?;
                    writer.write_u8(d)?;
                }
                Value::Date(y, m, d, h, i, s, 0u32) => {
                    writer.write_u8(7u8)?;
                    writer.write_u16::<LE>(y)?;
                    writer.write_u8(m)?;
                    writer.write_u8(d)?;
                    writer.write_u8(h)?;
                    writer.write_u8(i)?;
                    writer.write_u8(s)?;
                }
                Value::Date(y, m, d, h, i, s, u) => {
                    writer.write_u8(11u8)?;
                    writer.write_u16::<LE>(y)?;
                    writer.write_u8(m)?;
                    writer.write_u8(d)?;
                    writer.write_u8(h)?;
                    writer.write_u8(i)?;
                    writer.write_u8(s)?;
                    writer.write_u32::<LE>(u)?;
                }
                _ => return Err(type_mismatch()),
            },
            ColumnType::MYSQL_TYPE_TIME => match self.value {
                Value::Time(_, 0u32, 0u8, 0u8, 0u8, 0u32) => writer.write_u8(0u8)?,
                Value::Time(neg, d, h, m, s, 0u32) => {
                    writer.write_u8(8u8)?;
                    writer.write_u8(if neg { 1u8 } else { 0u8 })?;
                    writer.write_u32::<LE>(d)?;
                    writer.write_u8(h)?;
                    writer.write_u8(m)?;
                    writer.write_u8(s)?;
                }
                Value::Time(neg, d, h, m, s, u) => {
                    writer.write_u8(12u8)?;
                    writer.write_u8(if neg { 1u8 } else { 0u8 })?;
                    writer.write_u32::<LE>(d)?;
                    writer.write_u8(h)?;
                    writer.write_u8(m)?;
                    writer.write_u8(s)?;
                    writer.write_u32::<LE>(u)?;
                }
                _ => return Err(type_mismatch()),
            },
            _ => match self.value {
                Value::Bytes(ref b) => writer.write_lenenc_bytes(b)?,
                _ => return Err(type_mismatch()),
            },
        }
        Ok(writer)
    }

    /// Builds the EXECUTE value block: the null bitmap, the packed non-null
    /// values and the indexes of values too large for the packet budget
    /// (to be shipped through SEND_LONG_DATA instead).
    ///
    /// Slots marked in `long_sent` keep a zero null bit and contribute no
    /// value bytes.
    pub(crate) fn to_bin_payload(
        slots: &[Option<Param>],
        long_sent: &[bool],
        max_pkt_size: usize,
    ) -> io::Result<(Vec<u8>, Vec<u8>, Vec<u16>)> {
        let bitmap_len = (slots.len() + 7) / 8;
        let mut bitmap = vec![0u8; bitmap_len];
        let mut writer = Vec::new();
        let mut large_ids = Vec::new();
        let cap = max_pkt_size.saturating_sub(bitmap_len + slots.len() * 8);
        let mut written = 0usize;
        for (i, slot) in slots.iter().enumerate() {
            if long_sent[i] {
                continue;
            }
            match slot {
                Some(param) if !param.is_null() => {
                    let val = param.to_bin()?;
                    if written + val.len() < cap {
                        written += val.len();
                        writer.write_all(&val)?;
                    } else {
                        large_ids.push(i as u16);
                    }
                }
                _ => bitmap[i / 8] |= 1 << (i % 8),
            }
        }
        Ok((bitmap, writer, large_ids))
    }

    /// The `(type, flags)` pair of the EXECUTE parameter type block.
    pub(crate) fn type_pair(slot: &Option<Param>, long_sent: bool) -> [u8; 2] {
        match slot {
            Some(param) => [param.typ as u8, if param.unsigned { 0x80 } else { 0 }],
            None if long_sent => [ColumnType::MYSQL_TYPE_LONG_BLOB as u8, 0],
            None => [ColumnType::MYSQL_TYPE_NULL as u8, 0],
        }
    }
}

fn type_mismatch() -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        "parameter value does not match its declared type",
    )
}

/// Conversion of application values into statement parameters.
pub trait ToParam {
    fn to_param(&self) -> Param;
}

impl<'a, T: ToParam + ?Sized> ToParam for &'a T {
    fn to_param(&self) -> Param {
        (**self).to_param()
    }
}

impl ToParam for Param {
    fn to_param(&self) -> Param {
        self.clone()
    }
}

impl<T: ToParam> ToParam for Option<T> {
    fn to_param(&self) -> Param {
        match self {
            Some(x) => x.to_param(),
            None => Param::null(),
        }
    }
}

macro_rules! to_param_int_impl {
    ($t:ty, $typ:expr, $unsigned:expr, $via:ident) => {
        impl ToParam for $t {
            fn to_param(&self) -> Param {
                Param::new($typ, $unsigned, Value::$via(*self as _))
            }
        }
    };
}

to_param_int_impl!(i8, ColumnType::MYSQL_TYPE_TINY, false, Int);
to_param_int_impl!(u8, ColumnType::MYSQL_TYPE_TINY, true, UInt);
to_param_int_impl!(i16, ColumnType::MYSQL_TYPE_SHORT, false, Int);
to_param_int_impl!(u16, ColumnType::MYSQL_TYPE_SHORT, true, UInt);
to_param_int_impl!(i32, ColumnType::MYSQL_TYPE_LONG, false, Int);
to_param_int_impl!(u32, ColumnType::MYSQL_TYPE_LONG, true, UInt);
to_param_int_impl!(i64, ColumnType::MYSQL_TYPE_LONGLONG, false, Int);
to_param_int_impl!(u64, ColumnType::MYSQL_TYPE_LONGLONG, true, UInt);
to_param_int_impl!(isize, ColumnType::MYSQL_TYPE_LONGLONG, false, Int);
to_param_int_impl!(usize, ColumnType::MYSQL_TYPE_LONGLONG, true, UInt);

impl ToParam for bool {
    fn to_param(&self) -> Param {
        Param::new(
            ColumnType::MYSQL_TYPE_TINY,
            false,
            Value::Int(*self as i64),
        )
    }
}

impl ToParam for f32 {
    fn to_param(&self) -> Param {
        Param::new(
            ColumnType::MYSQL_TYPE_FLOAT,
            false,
            Value::Float(*self as f64),
        )
    }
}

impl ToParam for f64 {
    fn to_param(&self) -> Param {
        Param::new(ColumnType::MYSQL_TYPE_DOUBLE, false, Value::Float(*self))
    }
}

impl ToParam for [u8] {
    fn to_param(&self) -> Param {
        Param::new(
            ColumnType::MYSQL_TYPE_VAR_STRING,
            false,
            Value::Bytes(self.to_vec()),
        )
    }
}

impl ToParam for Vec<u8> {
    fn to_param(&self) -> Param {
        Param::new(
            ColumnType::MYSQL_TYPE_VAR_STRING,
            false,
            Value::Bytes(self.clone()),
        )
    }
}

impl ToParam for str {
    fn to_param(&self) -> Param {
        Param::new(
            ColumnType::MYSQL_TYPE_STRING,
            false,
            Value::Bytes(self.as_bytes().to_vec()),
        )
    }
}

impl ToParam for String {
    fn to_param(&self) -> Param {
        Param::new(
            ColumnType::MYSQL_TYPE_STRING,
            false,
            Value::Bytes(self.as_bytes().to_vec()),
        )
    }
}

impl ToParam for Value {
    fn to_param(&self) -> Param {
        match *self {
            Value::NULL => Param::null(),
            Value::Bytes(ref x) => Param::new(
                ColumnType::MYSQL_TYPE_VAR_STRING,
                false,
                Value::Bytes(x.clone()),
            ),
            Value::Int(x) => Param::new(ColumnType::MYSQL_TYPE_LONGLONG, false, Value::Int(x)),
            Value::UInt(x) => Param::new(ColumnType::MYSQL_TYPE_LONGLONG, true, Value::UInt(x)),
            Value::Float(x) => Param::new(ColumnType::MYSQL_TYPE_DOUBLE, false, Value::Float(x)),
            Value::Date(..) => {
                Param::new(ColumnType::MYSQL_TYPE_DATETIME, false, self.clone())
            }
            Value::Time(..) => Param::new(ColumnType::MYSQL_TYPE_TIME, false, self.clone()),
        }
    }
}

/// Positional parameters of a statement execution.
#[derive(Clone, PartialEq, Debug)]
pub enum Params {
    Empty,
    Positional(Vec<Param>),
}

impl From<()> for Params {
    fn from(_: ()) -> Params {
        Params::Empty
    }
}

impl From<Vec<Param>> for Params {
    fn from(params: Vec<Param>) -> Params {
        Params::Positional(params)
    }
}

impl<'a> From<&'a [&'a dyn ToParam]> for Params {
    fn from(params: &'a [&'a dyn ToParam]) -> Params {
        Params::Positional(params.iter().map(|x| x.to_param()).collect())
    }
}

macro_rules! into_params_impl {
    ($([$A:ident, $a:ident]),*) => (
        impl<$($A: ToParam,)*> From<($($A,)*)> for Params {
            fn from(($($a,)*): ($($A,)*)) -> Params {
                Params::Positional(vec![$($a.to_param(),)*])
            }
        }
    );
}

into_params_impl!([A, a]);
into_params_impl!([A, a], [B, b]);
into_params_impl!([A, a], [B, b], [C, c]);
into_params_impl!([A, a], [B, b], [C, c], [D, d]);
into_params_impl!([A, a], [B, b], [C, c], [D, d], [E, e]);
into_params_impl!([A, a], [B, b], [C, c], [D, d], [E, e], [F, f]);
into_params_impl!([A, a], [B, b], [C, c], [D, d], [E, e], [F, f], [G, g]);
into_params_impl!([A, a], [B, b], [C, c], [D, d], [E, e], [F, f], [G, g], [H, h]);
into_params_impl!(
    [A, a],
    [B, b],
    [C, c],
    [D, d],
    [E, e],
    [F, f],
    [G, g],
    [H, h],
    [I, i]
);
into_params_impl!(
    [A, a],
    [B, b],
    [C, c],
    [D, d],
    [E, e],
    [F, f],
    [G, g],
    [H, h],
    [I, i],
    [J, j]
);
into_params_impl!(
    [A, a],
    [B, b],
    [C, c],
    [D, d],
    [E, e],
    [F, f],
    [G, g],
    [H, h],
    [I, i],
    [J, j],
    [K, k]
);
into_params_impl!(
    [A, a],
    [B, b],
    [C, c],
    [D, d],
    [E, e],
    [F, f],
    [G, g],
    [H, h],
    [I, i],
    [J, j],
    [K, k],
    [L, l]
);

#[cfg(test)]
mod test {
    use super::{escape_quotes, escape_string, Param, Params, ToParam, Value};
    use crate::consts::{ColumnFlags, ColumnType};
    use crate::packet::Column;

    fn column_of_type(column_type: ColumnType, flags: ColumnFlags) -> Column {
        Column {
            catalog: b"def".to_vec(),
            schema: Vec::new(),
            table: Vec::new(),
            org_table: Vec::new(),
            name: Vec::new(),
            org_name: Vec::new(),
            character_set: 63,
            column_length: 0,
            column_type,
            flags,
            decimals: 0,
        }
    }

    #[test]
    fn should_render_values_as_sql_literals() {
        assert_eq!(Value::NULL.into_str(), "NULL");
        assert_eq!(Value::Bytes(b"hello".to_vec()).into_str(), "'hello'");
        assert_eq!(
            Value::Bytes(b"h'e'l'l'o".to_vec()).into_str(),
            "'h\\'e\\'l\\'l\\'o'"
        );
        assert_eq!(
            Value::Bytes(vec![0, 1, 2, 3, 4, 255]).into_str(),
            "0x0001020304FF"
        );
        assert_eq!(Value::Int(-65536).into_str(), "-65536");
        assert_eq!(Value::UInt(4294967296).into_str(), "4294967296");
        assert_eq!(Value::Float(686.868).into_str(), "686.868");
        assert_eq!(Value::Date(2014, 2, 20, 0, 0, 0, 0).into_str(), "'2014-02-20'");
        assert_eq!(
            Value::Date(2014, 2, 20, 22, 0, 0, 1).into_str(),
            "'2014-02-20 22:00:00.000001'"
        );
        assert_eq!(Value::Time(true, 34, 3, 2, 1, 0).into_str(), "'-819:02:01'");
    }

    #[test]
    fn should_escape_by_doubling_quotes() {
        assert_eq!(escape_quotes(r#"it's a "test" `x`"#), r#"it''s a ""test"" ``x``"#);
        assert_eq!(escape_quotes("back\\slash"), "back\\slash");
        assert_eq!(escape_string("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn should_decode_text_row() {
        let payload = b"\x011\xfb\x02hi";
        let row = Value::from_payload(payload, 3).unwrap();
        assert_eq!(
            row,
            vec![
                Value::Bytes(b"1".to_vec()),
                Value::NULL,
                Value::Bytes(b"hi".to_vec()),
            ]
        );
    }

    #[test]
    fn should_decode_binary_row() {
        let columns = vec![
            column_of_type(ColumnType::MYSQL_TYPE_LONGLONG, ColumnFlags::empty()),
            column_of_type(ColumnType::MYSQL_TYPE_VAR_STRING, ColumnFlags::empty()),
            column_of_type(ColumnType::MYSQL_TYPE_FLOAT, ColumnFlags::empty()),
        ];
        // header, bitmap (third column null -> bit 4), i64 7, "ab"
        let payload = [
            0x00, 0x10, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, b'a', b'b',
        ];
        let row = Value::from_bin_payload(&payload, &columns).unwrap();
        assert_eq!(
            row,
            vec![
                Value::Int(7),
                Value::Bytes(b"ab".to_vec()),
                Value::NULL,
            ]
        );
    }

    #[test]
    fn should_encode_params_with_declared_width() {
        assert_eq!((-1i8).to_param().to_bin().unwrap(), vec![0xff]);
        assert_eq!(300u16.to_param().to_bin().unwrap(), vec![0x2c, 0x01]);
        assert_eq!(
            3i64.to_param().to_bin().unwrap(),
            vec![3, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(1.0f32.to_param().to_bin().unwrap(), vec![0, 0, 0x80, 0x3f]);
        assert_eq!("ab".to_param().to_bin().unwrap(), vec![2, b'a', b'b']);
        assert_eq!(
            Param::date(2014, 5, 5).to_bin().unwrap(),
            vec![4, 0xde, 0x07, 5, 5]
        );
        assert_eq!(
            Param::time(false, 0, 0, 0, 0, 0).to_bin().unwrap(),
            vec![0]
        );
    }

    #[test]
    fn should_build_null_bitmap_and_values() {
        let slots = vec![
            Some(3i64.to_param()),
            None,
            Some(Param::null()),
            Some(4i64.to_param()),
        ];
        let long_sent = vec![false; 4];
        let (bitmap, values, large_ids) =
            Param::to_bin_payload(&slots, &long_sent, 1024).unwrap();
        assert_eq!(bitmap, vec![0b0000_0110]);
        assert_eq!(values.len(), 16);
        assert!(large_ids.is_empty());
    }

    #[test]
    fn should_spill_large_values_to_long_data() {
        let slots = vec![
            Some(vec![0xaau8; 1024].to_param()),
            Some(7i32.to_param()),
        ];
        let long_sent = vec![false; 2];
        let (bitmap, values, large_ids) = Param::to_bin_payload(&slots, &long_sent, 64).unwrap();
        assert_eq!(bitmap, vec![0]);
        assert_eq!(values, vec![7, 0, 0, 0]);
        assert_eq!(large_ids, vec![0]);
    }

    #[test]
    fn long_sent_slots_are_elided_but_not_null() {
        let slots: Vec<Option<Param>> = vec![None];
        let long_sent = vec![true];
        let (bitmap, values, large_ids) =
            Param::to_bin_payload(&slots, &long_sent, 1024).unwrap();
        assert_eq!(bitmap, vec![0]);
        assert!(values.is_empty());
        assert!(large_ids.is_empty());
        assert_eq!(
            Param::type_pair(&slots[0], true),
            [ColumnType::MYSQL_TYPE_LONG_BLOB as u8, 0]
        );
    }

    #[test]
    fn tuples_convert_into_positional_params() {
        let params: Params = (3i64, "abc", Option::<i32>::None).into();
        match params {
            Params::Positional(v) => {
                assert_eq!(v.len(), 3);
                assert_eq!(v[0].typ, ColumnType::MYSQL_TYPE_LONGLONG);
                assert_eq!(v[1].typ, ColumnType::MYSQL_TYPE_STRING);
                assert!(v[2].is_null());
            }
            other => panic!("expected positional params, got {:?}", other),
        }
    }
}
