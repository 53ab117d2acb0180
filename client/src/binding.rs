//! Reactive bindings
//!
//! A binding keeps the current value of one topic, or of one connection flag, ready to be read
//! synchronously from UI code. Reads never fail: an absent topic, or a value that cannot be read
//! as the binding's type, reads as the default given when the binding was created.

use crate::client::{NTClient, Shared, Subscription};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use proto::prelude::{integral, NTValue};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Rust types a topic value can be read as and written from
pub trait NtType: Clone + PartialEq + Send + Sync + 'static {
    fn from_nt(value: &NTValue) -> Option<Self>;

    fn into_nt(self) -> NTValue;
}

macro_rules! impl_nt_type {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
        impl NtType for $ty {
            fn from_nt(value: &NTValue) -> Option<Self> {
                match value {
                    NTValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }

            fn into_nt(self) -> NTValue {
                NTValue::$variant(self)
            }
        }
        )*
    };
}

impl_nt_type!(
    bool => Boolean,
    String => String,
    Vec<u8> => Raw,
    Vec<bool> => BooleanArray,
    Vec<i64> => IntArray,
    Vec<f32> => FloatArray,
    Vec<String> => StringArray,
);

impl NtType for f64 {
    fn from_nt(value: &NTValue) -> Option<Self> {
        match value {
            NTValue::Double(f) => Some(*f),
            NTValue::Float(f) => Some(f64::from(*f)),
            NTValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    fn into_nt(self) -> NTValue {
        NTValue::Double(self)
    }
}

impl NtType for f32 {
    fn from_nt(value: &NTValue) -> Option<Self> {
        match value {
            NTValue::Float(f) => Some(*f),
            NTValue::Double(f) => Some(*f as f32),
            NTValue::Int(i) => Some(*i as f32),
            _ => None,
        }
    }

    fn into_nt(self) -> NTValue {
        NTValue::Float(self)
    }
}

impl NtType for i64 {
    fn from_nt(value: &NTValue) -> Option<Self> {
        match value {
            NTValue::Int(i) => Some(*i),
            NTValue::Double(f) => integral(*f),
            NTValue::Float(f) => integral(f64::from(*f)),
            _ => None,
        }
    }

    fn into_nt(self) -> NTValue {
        NTValue::Int(self)
    }
}

impl NtType for Vec<f64> {
    fn from_nt(value: &NTValue) -> Option<Self> {
        match value {
            NTValue::DoubleArray(fs) => Some(fs.clone()),
            NTValue::FloatArray(fs) => Some(fs.iter().copied().map(f64::from).collect()),
            NTValue::IntArray(is) => Some(is.iter().map(|i| *i as f64).collect()),
            _ => None,
        }
    }

    fn into_nt(self) -> NTValue {
        NTValue::DoubleArray(self)
    }
}

impl NtType for NTValue {
    fn from_nt(value: &NTValue) -> Option<Self> {
        Some(value.clone())
    }

    fn into_nt(self) -> NTValue {
        self
    }
}

/// Writes one topic of a client, usable after the binding that created it is gone
pub struct Setter<T> {
    shared: Weak<Shared>,
    path: Arc<str>,
    _type: PhantomData<fn(T)>,
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Setter {
            shared: self.shared.clone(),
            path: self.path.clone(),
            _type: PhantomData,
        }
    }
}

impl<T: NtType> Setter<T> {
    pub fn set(&self, value: T) -> Result<()> {
        let shared = self.shared.upgrade().ok_or(Error::Closed)?;
        shared.set(&self.path, value.into_nt())
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// The live value of one topic
pub struct NtValue<T: NtType> {
    path: String,
    default: T,
    current: Arc<RwLock<Option<T>>>,
    setter: Setter<T>,
    _subscription: Subscription,
}

impl<T: NtType> NtValue<T> {
    /// The topic's value, or the default while it is absent or of another type
    pub fn get(&self) -> T {
        self.current
            .read()
            .clone()
            .unwrap_or_else(|| self.default.clone())
    }

    pub fn is_present(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn set(&self, value: T) -> Result<()> {
        self.setter.set(value)
    }

    pub fn setter(&self) -> Setter<T> {
        self.setter.clone()
    }

    pub fn pair(&self) -> (T, Setter<T>) {
        (self.get(), self.setter())
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

pub fn use_nt_value<T: NtType>(client: &NTClient, path: &str, default: T) -> NtValue<T> {
    use_nt_value_with(client, path, default, |_| {})
}

/// Like [`use_nt_value`], calling `on_change` with the new value each time the value read
/// through the binding changes
///
/// [`use_nt_value`]: ./fn.use_nt_value.html
pub fn use_nt_value_with<T, F>(
    client: &NTClient,
    path: &str,
    default: T,
    on_change: F,
) -> NtValue<T>
where
    T: NtType,
    F: Fn(&T) + Send + Sync + 'static,
{
    let current = Arc::new(RwLock::new(None::<T>));
    let cache = current.clone();
    let fallback = default.clone();

    let subscription = client.subscribe(path, move |_, value| {
        let next = value.and_then(T::from_nt);
        let changed = {
            let mut cached = cache.write();
            let before = cached.clone().unwrap_or_else(|| fallback.clone());
            *cached = next;
            let after = cached.clone().unwrap_or_else(|| fallback.clone());
            (before != after).then_some(after)
        };
        if let Some(value) = changed {
            on_change(&value);
        }
    });

    NtValue {
        path: path.to_string(),
        default,
        current,
        setter: Setter {
            shared: client.shared(),
            path: Arc::from(path),
            _type: PhantomData,
        },
        _subscription: subscription,
    }
}

/// A connection flag: the WebSocket or the robot behind it
pub struct NtFlag {
    value: Arc<AtomicBool>,
    _subscription: Subscription,
}

impl NtFlag {
    pub fn get(&self) -> bool {
        self.value.load(Ordering::SeqCst)
    }
}

fn flag_binding<F>(on_change: F) -> (Arc<AtomicBool>, impl Fn(bool) + Send + Sync + 'static)
where
    F: Fn(bool) + Send + Sync + 'static,
{
    let value = Arc::new(AtomicBool::new(false));
    let sink = value.clone();
    let callback = move |next: bool| {
        if sink.swap(next, Ordering::SeqCst) != next {
            on_change(next);
        }
    };
    (value, callback)
}

pub fn use_nt_connection(client: &NTClient) -> NtFlag {
    use_nt_connection_with(client, |_| {})
}

pub fn use_nt_connection_with<F>(client: &NTClient, on_change: F) -> NtFlag
where
    F: Fn(bool) + Send + Sync + 'static,
{
    let (value, callback) = flag_binding(on_change);
    NtFlag {
        value,
        _subscription: client.watch_connection(callback),
    }
}

pub fn use_robot_connection(client: &NTClient) -> NtFlag {
    use_robot_connection_with(client, |_| {})
}

pub fn use_robot_connection_with<F>(client: &NTClient, on_change: F) -> NtFlag
where
    F: Fn(bool) + Send + Sync + 'static,
{
    let (value, callback) = flag_binding(on_change);
    NtFlag {
        value,
        _subscription: client.watch_robot(callback),
    }
}
