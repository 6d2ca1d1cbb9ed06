//! Pre-flight walk over a value's serde representation.
//!
//! JSON writes `None`, `()` and non-finite floats all as `null`, so the
//! encoded bytes alone cannot tell an absence value from a lost float.
//! `JsonShape` serializes nowhere: it reports whether the value is an
//! absence and fails on any NaN or infinity, nested or not.

use serde::ser::{self, Serialize};

/// Returns `Ok(true)` when `value` is an absence value (`None`, `()`, a unit
/// struct, or `Some` of one of those).
///
/// # Errors
/// Fails when any float inside `value` is NaN or infinite, or when the
/// value's own `Serialize` impl fails.
pub(crate) fn is_absence<T: Serialize + ?Sized>(value: &T) -> Result<bool, serde_json::Error> {
    value.serialize(JsonShape)
}

struct JsonShape;

fn check_float(value: f64) -> Result<bool, serde_json::Error> {
    if value.is_finite() {
        Ok(false)
    } else {
        Err(<serde_json::Error as ser::Error>::custom(format!("{value} has no JSON representation")))
    }
}

impl ser::Serializer for JsonShape {
    type Ok = bool;
    type Error = serde_json::Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn serialize_i8(self, _: i8) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn serialize_i16(self, _: i16) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn serialize_i32(self, _: i32) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn serialize_i64(self, _: i64) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn serialize_i128(self, _: i128) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn serialize_u8(self, _: u8) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn serialize_u16(self, _: u16) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn serialize_u32(self, _: u32) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn serialize_u64(self, _: u64) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn serialize_u128(self, _: u128) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn serialize_f32(self, value: f32) -> Result<bool, Self::Error> {
        check_float(f64::from(value))
    }

    fn serialize_f64(self, value: f64) -> Result<bool, Self::Error> {
        check_float(value)
    }

    fn serialize_char(self, _: char) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn serialize_str(self, _: &str) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn serialize_bytes(self, _: &[u8]) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn serialize_none(self) -> Result<bool, Self::Error> {
        Ok(true)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<bool, Self::Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<bool, Self::Error> {
        Ok(true)
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<bool, Self::Error> {
        Ok(true)
    }

    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(self, _: &'static str, value: &T) -> Result<bool, Self::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Result<bool, Self::Error> {
        value.serialize(JsonShape).map(|_| false)
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_tuple_variant(self, _: &'static str, _: u32, _: &'static str, _: usize) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_struct_variant(self, _: &'static str, _: u32, _: &'static str, _: usize) -> Result<Self, Self::Error> {
        Ok(self)
    }
}

// Compound values are never absences; only their members need checking.

impl ser::SerializeSeq for JsonShape {
    type Ok = bool;
    type Error = serde_json::Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(JsonShape).map(drop)
    }

    fn end(self) -> Result<bool, Self::Error> {
        Ok(false)
    }
}

impl ser::SerializeTuple for JsonShape {
    type Ok = bool;
    type Error = serde_json::Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(JsonShape).map(drop)
    }

    fn end(self) -> Result<bool, Self::Error> {
        Ok(false)
    }
}

impl ser::SerializeTupleStruct for JsonShape {
    type Ok = bool;
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(JsonShape).map(drop)
    }

    fn end(self) -> Result<bool, Self::Error> {
        Ok(false)
    }
}

impl ser::SerializeTupleVariant for JsonShape {
    type Ok = bool;
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(JsonShape).map(drop)
    }

    fn end(self) -> Result<bool, Self::Error> {
        Ok(false)
    }
}

impl ser::SerializeMap for JsonShape {
    type Ok = bool;
    type Error = serde_json::Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), Self::Error> {
        key.serialize(JsonShape).map(drop)
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(JsonShape).map(drop)
    }

    fn end(self) -> Result<bool, Self::Error> {
        Ok(false)
    }
}

impl ser::SerializeStruct for JsonShape {
    type Ok = bool;
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, _: &'static str, value: &T) -> Result<(), Self::Error> {
        value.serialize(JsonShape).map(drop)
    }

    fn end(self) -> Result<bool, Self::Error> {
        Ok(false)
    }
}

impl ser::SerializeStructVariant for JsonShape {
    type Ok = bool;
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, _: &'static str, value: &T) -> Result<(), Self::Error> {
        value.serialize(JsonShape).map(drop)
    }

    fn end(self) -> Result<bool, Self::Error> {
        Ok(false)
    }
}
