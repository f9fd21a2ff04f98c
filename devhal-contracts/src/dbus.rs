// SPDX-License-Identifier: GPL-3.0-only

//! Conversion of D-Bus variants into [`PropValue`].

use std::collections::HashMap;

use devhal_types::{PropValue, PropertyMap};
use zbus::zvariant::{Array, OwnedValue, Value};

pub fn prop_value(value: &Value<'_>) -> PropValue {
    match value {
        Value::Bool(v) => PropValue::Bool(*v),
        Value::U8(v) => PropValue::Unsigned(u64::from(*v)),
        Value::U16(v) => PropValue::Unsigned(u64::from(*v)),
        Value::U32(v) => PropValue::Unsigned(u64::from(*v)),
        Value::U64(v) => PropValue::Unsigned(*v),
        Value::I16(v) => PropValue::Signed(i64::from(*v)),
        Value::I32(v) => PropValue::Signed(i64::from(*v)),
        Value::I64(v) => PropValue::Signed(*v),
        Value::F64(v) => PropValue::Double(*v),
        Value::Str(v) => PropValue::Str(v.to_string()),
        Value::ObjectPath(v) => PropValue::ObjectPath(v.to_string()),
        Value::Value(inner) => prop_value(inner),
        Value::Array(array) => array_value(array),
        _ => PropValue::Unsupported,
    }
}

fn array_value(array: &Array<'_>) -> PropValue {
    let items: Vec<&Value<'_>> = array.iter().collect();

    if !items.is_empty() && items.iter().all(|item| matches!(item, Value::U8(_))) {
        let bytes = items
            .iter()
            .filter_map(|item| match item {
                Value::U8(b) => Some(*b),
                _ => None,
            })
            .collect();
        return PropValue::Bytes(bytes);
    }

    PropValue::List(items.into_iter().map(prop_value).collect())
}

/// Converts a `GetAll` reply.
pub fn property_map(raw: HashMap<String, OwnedValue>) -> PropertyMap {
    raw.into_iter()
        .map(|(key, value)| (key, prop_value(&value)))
        .collect()
}
