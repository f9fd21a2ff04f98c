// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zbus::DBusError;

const UD2_ERROR_PREFIX: &str = "org.freedesktop.UDisks2.Error.";
const DBUS_ERROR_FAILED: &str = "org.freedesktop.DBus.Error.Failed";
const DBUS_ERROR_NO_REPLY: &str = "org.freedesktop.DBus.Error.NoReply";

/// Error taxonomy reported to device-interface callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HalErrorKind {
    UnauthorizedOperation,
    DeviceBusy,
    OperationFailed,
    UserCanceled,
    InvalidOption,
    MissingDriver,
}

impl HalErrorKind {
    pub fn code(self) -> u8 {
        match self {
            Self::UnauthorizedOperation => 1,
            Self::DeviceBusy => 2,
            Self::OperationFailed => 3,
            Self::UserCanceled => 4,
            Self::InvalidOption => 5,
            Self::MissingDriver => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct HalError {
    pub kind: HalErrorKind,
    pub message: String,
}

impl HalError {
    pub fn new(kind: HalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn user_canceled() -> Self {
        Self::new(HalErrorKind::UserCanceled, String::new())
    }
}

/// A failed remote call: the D-Bus error name plus its message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {message}")]
pub struct BusError {
    pub name: String,
    pub message: String,
}

impl BusError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(DBUS_ERROR_FAILED, message)
    }

    pub fn no_reply(message: impl Into<String>) -> Self {
        Self::new(DBUS_ERROR_NO_REPLY, message)
    }
}

impl From<zbus::Error> for BusError {
    fn from(err: zbus::Error) -> Self {
        match err {
            zbus::Error::MethodError(name, detail, _) => {
                Self::new(name.to_string(), detail.unwrap_or_default())
            }
            zbus::Error::FDO(fdo) => Self::new(
                fdo.name().to_string(),
                fdo.description().unwrap_or_default().to_string(),
            ),
            other => Self::failed(other.to_string()),
        }
    }
}

impl From<zbus::fdo::Error> for BusError {
    fn from(err: zbus::fdo::Error) -> Self {
        Self::new(
            err.name().to_string(),
            err.description().unwrap_or_default().to_string(),
        )
    }
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Passphrase prompt unavailable: {0}")]
    Unavailable(String),

    #[error("Passphrase prompt closed without a reply")]
    Closed,

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Maps a transport error name onto the error taxonomy and a readable message.
pub fn translate_bus_error(err: &BusError) -> HalError {
    let (kind, description) = match err.name.strip_prefix(UD2_ERROR_PREFIX) {
        Some("NotAuthorized") | Some("NotAuthorizedCanObtain") => (
            HalErrorKind::UnauthorizedOperation,
            "You are not authorized to perform this operation",
        ),
        Some("NotAuthorizedDismissed") => (
            HalErrorKind::UnauthorizedOperation,
            "The authentication dialog was dismissed",
        ),
        Some("DeviceBusy") => (HalErrorKind::DeviceBusy, "The device is currently busy"),
        Some("Failed") => (
            HalErrorKind::OperationFailed,
            "The requested operation has failed",
        ),
        Some("Cancelled") => (
            HalErrorKind::UserCanceled,
            "The requested operation has been canceled",
        ),
        Some("AlreadyCancelled") => (
            HalErrorKind::UserCanceled,
            "The operation has already been canceled",
        ),
        Some("OptionNotPermitted") => (
            HalErrorKind::InvalidOption,
            "An invalid or malformed option has been given",
        ),
        Some("NotSupported") | Some("UnknownFilesystem") => (
            HalErrorKind::MissingDriver,
            "The kernel driver for this filesystem type is not available",
        ),
        Some("AlreadyMounted") => (
            HalErrorKind::OperationFailed,
            "The device is already mounted",
        ),
        Some("NotMounted") => (HalErrorKind::OperationFailed, "The device is not mounted"),
        Some("MountedByOtherUser") => (
            HalErrorKind::UnauthorizedOperation,
            "The device is mounted by another user",
        ),
        Some("AlreadyUnmounting") => (
            HalErrorKind::DeviceBusy,
            "The device is already unmounting",
        ),
        Some("Timedout") => (HalErrorKind::OperationFailed, "The operation timed out"),
        Some("WouldWakeup") => (
            HalErrorKind::OperationFailed,
            "The operation would wake up a disk that is in a deep-sleep state",
        ),
        _ => match err.name.as_str() {
            "org.freedesktop.DBus.Error.AccessDenied" => (
                HalErrorKind::UnauthorizedOperation,
                "You are not authorized to perform this operation",
            ),
            DBUS_ERROR_NO_REPLY | "org.freedesktop.DBus.Error.Timeout" => {
                (HalErrorKind::OperationFailed, "The operation timed out")
            }
            _ => (
                HalErrorKind::OperationFailed,
                "An unspecified error has occurred",
            ),
        },
    };

    let message = if err.message.is_empty() {
        description.to_string()
    } else {
        format!("{description}: {}", err.message)
    };

    HalError::new(kind, message)
}
