use crate::error::{Error, Result};
use crate::ext::ValueExt;
use crate::text::DataType;
use serde::ser::SerializeSeq;
use serde::Serialize;

/// The id used by both peers for time synchronization updates
pub const TIMESYNC_ID: i64 = -1;

#[derive(Clone, PartialEq, Debug)]
pub enum NTValue {
    Boolean(bool),
    Double(f64),
    Int(i64),
    Float(f32),
    String(String),
    Raw(Vec<u8>),
    BooleanArray(Vec<bool>),
    DoubleArray(Vec<f64>),
    IntArray(Vec<i64>),
    FloatArray(Vec<f32>),
    StringArray(Vec<String>),
}

impl NTValue {
    /// The type a topic is published with when this value is the first one written to it
    pub fn data_type(&self) -> DataType {
        match self {
            NTValue::Boolean(_) => DataType::Boolean,
            NTValue::Double(_) => DataType::Double,
            NTValue::Int(_) => DataType::Int,
            NTValue::Float(_) => DataType::Float,
            NTValue::String(_) => DataType::String,
            NTValue::Raw(_) => DataType::Raw,
            NTValue::BooleanArray(_) => DataType::BooleanArray,
            NTValue::DoubleArray(_) => DataType::DoubleArray,
            NTValue::IntArray(_) => DataType::IntArray,
            NTValue::FloatArray(_) => DataType::FloatArray,
            NTValue::StringArray(_) => DataType::StringArray,
        }
    }

    pub fn type_index(&self) -> u8 {
        self.data_type().type_index()
    }

    /// Whether a topic of type `ty` can hold this value as-is
    pub fn fits(&self, ty: &DataType) -> bool {
        self.type_index() == ty.type_index()
    }

    /// Converts this value so it can be written to a topic of type `ty`
    ///
    /// Numbers convert between `double`, `float` and `int`; a double or float only becomes
    /// an int when it is integral. Returns `None` for any other mismatch.
    pub fn coerce_to(self, ty: &DataType) -> Option<NTValue> {
        if self.fits(ty) {
            return Some(self);
        }

        match (self, ty) {
            (NTValue::Int(i), DataType::Double) => Some(NTValue::Double(i as f64)),
            (NTValue::Int(i), DataType::Float) => Some(NTValue::Float(i as f32)),
            (NTValue::Float(f), DataType::Double) => Some(NTValue::Double(f64::from(f))),
            (NTValue::Double(f), DataType::Float) => Some(NTValue::Float(f as f32)),
            (NTValue::Double(f), DataType::Int) => integral(f).map(NTValue::Int),
            (NTValue::Float(f), DataType::Int) => integral(f64::from(f)).map(NTValue::Int),
            (NTValue::IntArray(is), DataType::DoubleArray) => Some(NTValue::DoubleArray(
                is.into_iter().map(|i| i as f64).collect(),
            )),
            (NTValue::FloatArray(fs), DataType::DoubleArray) => Some(NTValue::DoubleArray(
                fs.into_iter().map(f64::from).collect(),
            )),
            _ => None,
        }
    }
}

/// `f` as an int, when it is a whole number within the range of `i64`
pub fn integral(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

impl Serialize for NTValue {
    fn serialize<S>(&self, s: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            NTValue::Boolean(b) => s.serialize_bool(*b),
            NTValue::Double(f) => s.serialize_f64(*f),
            NTValue::Int(i) => s.serialize_i64(*i),
            NTValue::Float(f) => s.serialize_f32(*f),
            NTValue::String(st) => s.serialize_str(st),
            NTValue::Raw(bytes) => s.serialize_bytes(&bytes[..]),
            NTValue::BooleanArray(bs) => bs.serialize(s),
            NTValue::DoubleArray(fs) => fs.serialize(s),
            NTValue::IntArray(is) => is.serialize(s),
            NTValue::FloatArray(fs) => fs.serialize(s),
            NTValue::StringArray(ss) => ss.serialize(s),
        }
    }
}

/// A single value update, as found in a BINARY frame
///
/// The type index is not stored, it is derived from the value when encoding.
#[derive(Clone, PartialEq, Debug)]
pub struct NTBinaryMessage {
    /// Topic id when sent by the server, publisher id when sent by a client
    pub id: i64,
    /// Microseconds, in the server's time base
    pub timestamp: u64,
    pub value: NTValue,
}

impl Serialize for NTBinaryMessage {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(4))?;
        seq.serialize_element(&self.id)?;
        seq.serialize_element(&self.timestamp)?;
        seq.serialize_element(&self.value.type_index())?;
        seq.serialize_element(&self.value)?;
        seq.end()
    }
}

impl NTBinaryMessage {
    pub fn new(id: i64, timestamp: u64, value: NTValue) -> NTBinaryMessage {
        NTBinaryMessage {
            id,
            timestamp,
            value,
        }
    }

    /// Decodes every update packed in a binary frame
    ///
    /// Updates carrying a type index this crate does not know are skipped.
    pub fn from_slice(mut slice: &[u8]) -> Result<Vec<Self>> {
        let mut messages = Vec::new();
        while !slice.is_empty() {
            let value = rmpv::decode::read_value(&mut slice)?;
            if let Some(msg) = Self::from_value(value)? {
                messages.push(msg);
            }
        }

        Ok(messages)
    }

    fn from_value(value: rmpv::Value) -> Result<Option<Self>> {
        let values = match value {
            rmpv::Value::Array(values) if values.len() == 4 => values,
            val => {
                return Err(Error::InvalidMessage(format!(
                    "expected an array of 4 elements, got {}",
                    val
                )))
            }
        };

        let id = values[0]
            .as_i64()
            .ok_or_else(|| Error::InvalidMessage(format!("invalid id {}", values[0])))?;
        let timestamp = values[1]
            .as_u64()
            .ok_or_else(|| Error::InvalidMessage(format!("invalid timestamp {}", values[1])))?;
        let type_index = match values[2].as_u64() {
            Some(idx) if idx <= u64::from(u8::MAX) => idx as u8,
            _ => {
                return Err(Error::InvalidMessage(format!(
                    "invalid type index {}",
                    values[2]
                )))
            }
        };

        if DataType::from_type_index(type_index).is_none() {
            return Ok(None);
        }

        let value = values[3].to_nt_value(type_index).ok_or_else(|| {
            Error::InvalidMessage(format!(
                "value {} does not match type index {}",
                values[3], type_index
            ))
        })?;

        Ok(Some(Self {
            id,
            timestamp,
            value,
        }))
    }
}

impl DataType {
    /// The canonical type for a binary type index
    pub fn from_type_index(idx: u8) -> Option<DataType> {
        match idx {
            0 => Some(DataType::Boolean),
            1 => Some(DataType::Double),
            2 => Some(DataType::Int),
            3 => Some(DataType::Float),
            4 => Some(DataType::String),
            5 => Some(DataType::Raw),
            16 => Some(DataType::BooleanArray),
            17 => Some(DataType::DoubleArray),
            18 => Some(DataType::IntArray),
            19 => Some(DataType::FloatArray),
            20 => Some(DataType::StringArray),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::NTBinaryMessage;
    use crate::bin::NTValue;
    use crate::text::DataType;
    use proptest::prelude::*;

    #[test]
    fn test_single_message_stream() {
        let data = vec![
            0x94, // array(4)
            0x2A, // unsigned(42)
            0xCE, 0x49, 0x96, 0x02, 0xD2, // unsigned(1234567890)
            0x10, // type boolean[]
            0x93, // array(3)
            0xC3, // true
            0xC2, // false
            0xC3, // true
        ];

        let messages = NTBinaryMessage::from_slice(&data[..]).unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0],
            NTBinaryMessage {
                id: 42,
                timestamp: 1234567890,
                value: NTValue::BooleanArray(vec![true, false, true])
            }
        )
    }

    #[test]
    fn test_multi_message_stream() {
        let data = vec![
            // ITEM 1
            0x94, // array(4)
            0x2A, // unsigned(42)
            0xCE, 0x49, 0x96, 0x02, 0xD2, // unsigned(1234567890)
            0x10, // type boolean[]
            0x93, // array(3)
            0xC3, // true
            0xC2, // false
            0xC3, // true
            // ITEM 2
            0x94, // array(4)
            0x45, // unsigned(69)
            0x00, // unsigned(0)
            0x04, // type string
            0xA5, // str(5)
            0x48, 0x65, 0x6C, 0x6C, 0x6F, // Hello
            // ITEM 3
            0x94, // array(4)
            0xCD, 0x01, 0xA4, // unsigned(420)
            0xCD, 0x16, 0x2E, // unsigned(5678)
            0x12, // type int[]
            0x94, // array(4)
            0x01, // unsigned(1)
            0x02, // unsigned(2)
            0x03, // unsigned(3)
            0x04, // unsigned(4)
        ];

        let messages = NTBinaryMessage::from_slice(&data[..]).unwrap();

        assert_eq!(messages.len(), 3);

        assert_eq!(
            messages[0],
            NTBinaryMessage {
                id: 42,
                timestamp: 1234567890,
                value: NTValue::BooleanArray(vec![true, false, true])
            }
        );

        assert_eq!(
            messages[1],
            NTBinaryMessage {
                id: 69,
                timestamp: 0,
                value: NTValue::String("Hello".to_string())
            }
        );

        assert_eq!(
            messages[2],
            NTBinaryMessage {
                id: 420,
                timestamp: 5678,
                value: NTValue::IntArray(vec![1, 2, 3, 4])
            }
        );
    }

    #[test]
    fn test_empty_array() {
        let data = vec![
            0x94, // array(4)
            0x01, // unsigned(1)
            0x00, // unsigned(0)
            0x14, // type string[]
            0x90, // array(0)
        ];

        let messages = NTBinaryMessage::from_slice(&data[..]).unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0],
            NTBinaryMessage {
                id: 1,
                timestamp: 0,
                value: NTValue::StringArray(vec![])
            }
        )
    }

    #[test]
    fn test_unknown_type_index_is_skipped() {
        let data = vec![
            0x94, 0x01, 0x00, 0x30, 0xC0, // [1, 0, 48, nil]
            0x94, 0x02, 0x00, 0x00, 0xC3, // [2, 0, boolean, true]
        ];

        let messages = NTBinaryMessage::from_slice(&data[..]).unwrap();
        assert_eq!(messages, vec![NTBinaryMessage::new(2, 0, NTValue::Boolean(true))]);
    }

    #[test]
    fn test_malformed() {
        // value does not match its type index
        assert!(NTBinaryMessage::from_slice(&[0x94, 0x01, 0x00, 0x00, 0xA1, 0x61]).is_err());
        // not an array of four
        assert!(NTBinaryMessage::from_slice(&[0x92, 0x01, 0x00]).is_err());
        // truncated
        assert!(NTBinaryMessage::from_slice(&[0x94, 0x01]).is_err());
    }

    #[test]
    fn test_serialize() {
        let msg = NTBinaryMessage::new(1, 0, NTValue::DoubleArray(vec![]));

        let v = rmp_serde::to_vec(&msg).unwrap();

        assert_eq!(&v[..], &[0x94, 0x01, 0x00, 0x11, 0x90]);

        let msg = NTBinaryMessage::new(42, 1234, NTValue::Double(1.5));

        let v = rmp_serde::to_vec(&msg).unwrap();

        assert_eq!(&v[..5], &[0x94, 0x2A, 0xCD, 0x04, 0xD2]);
        assert_eq!(&v[5..], &[0x01, 0xCB, 0x3F, 0xF8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

        let msg = NTBinaryMessage::new(-1, 0, NTValue::Float(1.5));

        let v = rmp_serde::to_vec(&msg).unwrap();

        assert_eq!(&v[..], &[0x94, 0xFF, 0x00, 0x03, 0xCA, 0x3F, 0xC0, 0x00, 0x00]);
    }

    #[test]
    fn test_coerce() {
        assert_eq!(NTValue::Int(6).coerce_to(&DataType::Double), Some(NTValue::Double(6.0)));
        assert_eq!(NTValue::Double(6.0).coerce_to(&DataType::Int), Some(NTValue::Int(6)));
        assert_eq!(NTValue::Double(6.5).coerce_to(&DataType::Int), None);
        assert_eq!(
            NTValue::String("{}".to_string()).coerce_to(&DataType::Json),
            Some(NTValue::String("{}".to_string()))
        );
        assert_eq!(
            NTValue::Raw(vec![1]).coerce_to(&DataType::Other("struct:Pose2d".to_string())),
            Some(NTValue::Raw(vec![1]))
        );
        assert_eq!(NTValue::Boolean(true).coerce_to(&DataType::String), None);
    }

    fn any_value() -> impl Strategy<Value = NTValue> {
        prop_oneof![
            any::<bool>().prop_map(NTValue::Boolean),
            any::<f64>()
                .prop_filter("NaN never compares equal", |f| !f.is_nan())
                .prop_map(NTValue::Double),
            any::<i64>().prop_map(NTValue::Int),
            any::<f32>()
                .prop_filter("NaN never compares equal", |f| !f.is_nan())
                .prop_map(NTValue::Float),
            ".*".prop_map(NTValue::String),
            prop::collection::vec(any::<u8>(), 0..16).prop_map(NTValue::Raw),
            prop::collection::vec(any::<bool>(), 0..8).prop_map(NTValue::BooleanArray),
            prop::collection::vec(-1e12f64..1e12, 0..8).prop_map(NTValue::DoubleArray),
            prop::collection::vec(any::<i64>(), 0..8).prop_map(NTValue::IntArray),
            prop::collection::vec(-1e6f32..1e6, 0..8).prop_map(NTValue::FloatArray),
            prop::collection::vec(".{0,8}", 0..8).prop_map(NTValue::StringArray),
        ]
    }

    proptest! {
        #[test]
        fn every_value_type_survives_the_wire(id in -1i64..1 << 32, timestamp in any::<u64>(), value in any_value()) {
            let msg = NTBinaryMessage::new(id, timestamp, value);
            let encoded = rmp_serde::to_vec(&msg).unwrap();
            let decoded = NTBinaryMessage::from_slice(&encoded[..]).unwrap();
            prop_assert_eq!(decoded, vec![msg]);
        }
    }
}
