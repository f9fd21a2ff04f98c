// SPDX-License-Identifier: GPL-3.0-only

//! Transport-independent property values.
//!
//! Backends convert D-Bus variants into [`PropValue`] at the bus boundary so the
//! adapters and their tests never handle `zvariant` types directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bytestring::{decode_c_string_bytes, decode_mount_points};

/// Property name -> value for one D-Bus interface.
pub type PropertyMap = BTreeMap<String, PropValue>;

/// Interface name -> properties for one remote object.
pub type ObjectProperties = BTreeMap<String, PropertyMap>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Double(f64),
    Str(String),
    ObjectPath(String),
    Bytes(Vec<u8>),
    List(Vec<PropValue>),
    Unsupported,
}

impl PropValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Unsigned(v) => Some(*v),
            Self::Signed(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_u64().and_then(|v| u32::try_from(v).ok())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Signed(v) => Some(*v),
            Self::Unsigned(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Unsigned(v) => Some(*v as f64),
            Self::Signed(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// String-ish view: plain strings, object paths and byte strings.
    pub fn as_str(&self) -> Option<String> {
        match self {
            Self::Str(v) | Self::ObjectPath(v) => Some(v.clone()),
            Self::Bytes(bytes) => Some(decode_c_string_bytes(bytes)),
            // an empty `ay` carries no element type to tell it apart from other arrays
            Self::List(items) if items.is_empty() => Some(String::new()),
            _ => None,
        }
    }

    /// Object path value; the D-Bus null path `/` and empty strings read as `None`.
    pub fn as_object_path(&self) -> Option<String> {
        match self {
            Self::ObjectPath(v) | Self::Str(v) if !v.is_empty() && v != "/" => Some(v.clone()),
            _ => None,
        }
    }

    /// Decodes an `aay` value such as `MountPoints`.
    pub fn as_bytestring_list(&self) -> Vec<String> {
        match self {
            Self::List(items) => decode_mount_points(items.iter().filter_map(|item| match item {
                Self::Bytes(bytes) => Some(bytes.as_slice()),
                Self::Str(s) => Some(s.as_bytes()),
                _ => None,
            })),
            _ => Vec::new(),
        }
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u32> for PropValue {
    fn from(value: u32) -> Self {
        Self::Unsigned(u64::from(value))
    }
}

impl From<u64> for PropValue {
    fn from(value: u64) -> Self {
        Self::Unsigned(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}
