// SPDX-License-Identifier: GPL-3.0-only

//! In-memory UPower and login1 stand-ins for adapter tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use devhal_contracts::BusError;
use devhal_types::{PropValue, PropertyMap};
use futures::StreamExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::{PowerSignal, SignalStream, SleepStream, UPowerBackend};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Properties(String),
    Refresh(String),
    Enumerate,
}

#[derive(Default)]
pub(crate) struct FakeUPower {
    devices: Mutex<BTreeMap<String, PropertyMap>>,
    calls: Mutex<Vec<Call>>,
    fail_properties: Mutex<bool>,
    fail_refresh: Mutex<bool>,
    signal_senders: Mutex<Vec<mpsc::UnboundedSender<PowerSignal>>>,
    sleep_senders: Mutex<Vec<mpsc::UnboundedSender<bool>>>,
}

/// A discharging lithium-ion laptop battery.
pub(crate) fn battery_props() -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert("Type".into(), 2u32.into());
    props.insert("Technology".into(), 1u32.into());
    props.insert("NativePath".into(), "BAT0".into());
    props.insert("Vendor".into(), "SMP".into());
    props.insert("IsPresent".into(), true.into());
    props.insert("IsRechargeable".into(), true.into());
    props.insert("Percentage".into(), 64.0.into());
    props.insert("State".into(), 2u32.into());
    props
}

fn receiver_stream<T: Send + 'static>(
    receiver: mpsc::UnboundedReceiver<T>,
) -> futures::stream::BoxStream<'static, T> {
    futures::stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|item| (item, receiver))
    })
    .boxed()
}

impl FakeUPower {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, path: &str, props: PropertyMap) -> Self {
        self.devices.lock().unwrap().insert(path.to_string(), props);
        self
    }

    pub fn set_prop(&self, path: &str, key: &str, value: PropValue) {
        self.devices
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    pub fn fail_properties(&self, fail: bool) {
        *self.fail_properties.lock().unwrap() = fail;
    }

    pub fn fail_refresh(&self, fail: bool) {
        *self.fail_refresh.lock().unwrap() = fail;
    }

    pub fn send_signal(&self, signal: PowerSignal) {
        for sender in self.signal_senders.lock().unwrap().iter() {
            let _ = sender.send(signal.clone());
        }
    }

    pub fn send_sleep(&self, active: bool) {
        for sender in self.sleep_senders.lock().unwrap().iter() {
            let _ = sender.send(active);
        }
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl UPowerBackend for FakeUPower {
    fn properties(&self, path: String) -> BoxFuture<'_, Result<PropertyMap, BusError>> {
        self.record(Call::Properties(path.clone()));
        Box::pin(async move {
            if *self.fail_properties.lock().unwrap() {
                return Err(BusError::no_reply("UPower did not answer"));
            }
            self.devices.lock().unwrap().get(&path).cloned().ok_or_else(|| {
                BusError::new(
                    "org.freedesktop.DBus.Error.UnknownObject",
                    format!("No such object path '{path}'"),
                )
            })
        })
    }

    fn refresh(&self, path: String) -> BoxFuture<'_, Result<(), BusError>> {
        self.record(Call::Refresh(path));
        Box::pin(async move {
            if *self.fail_refresh.lock().unwrap() {
                return Err(BusError::new(
                    "org.freedesktop.UPower.GeneralError",
                    "refresh not supported",
                ));
            }
            Ok(())
        })
    }

    fn enumerate(&self) -> BoxFuture<'_, Result<Vec<String>, BusError>> {
        self.record(Call::Enumerate);
        Box::pin(async move { Ok(self.devices.lock().unwrap().keys().cloned().collect()) })
    }

    fn signals(&self, _path: String) -> BoxFuture<'_, Result<SignalStream, BusError>> {
        Box::pin(async move {
            let (sender, receiver) = mpsc::unbounded_channel();
            self.signal_senders.lock().unwrap().push(sender);
            Ok(receiver_stream(receiver))
        })
    }

    fn sleep_signals(&self) -> BoxFuture<'_, Result<SleepStream, BusError>> {
        Box::pin(async move {
            let (sender, receiver) = mpsc::unbounded_channel();
            self.sleep_senders.lock().unwrap().push(sender);
            Ok(receiver_stream(receiver))
        })
    }
}
