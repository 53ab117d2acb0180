use crate::bin::NTValue;
use rmpv::Value;

macro_rules! gen_array_funcs {
    ($($func_name:ident => ($conv:ident,$prim:ty)),+) => {
    $(
    fn $func_name(&self) -> Option<Vec<$prim>> {
        self.as_array()?.iter().map(|value| value.$conv()).collect()
    }
    )+
    }
}

/// Conversions from decoded MessagePack values into the shapes NT4 uses
///
/// MessagePack writers are free to pick the smallest encoding for a number,
/// so the numeric accessors accept any numeric representation.
pub trait ValueExt {
    fn as_double(&self) -> Option<f64>;
    fn as_float(&self) -> Option<f32>;
    fn as_text(&self) -> Option<String>;
    fn as_raw(&self) -> Option<Vec<u8>>;
    fn as_bool_array(&self) -> Option<Vec<bool>>;
    fn as_int_array(&self) -> Option<Vec<i64>>;
    fn as_double_array(&self) -> Option<Vec<f64>>;
    fn as_float_array(&self) -> Option<Vec<f32>>;
    fn as_text_array(&self) -> Option<Vec<String>>;

    /// Interprets this value as the payload of a binary update with the given type index
    fn to_nt_value(&self, type_index: u8) -> Option<NTValue>;
}

impl ValueExt for Value {
    gen_array_funcs!(
        as_bool_array => (as_bool,bool),
        as_int_array => (as_i64,i64),
        as_double_array => (as_double,f64),
        as_float_array => (as_float,f32),
        as_text_array => (as_text,String)
    );

    fn as_double(&self) -> Option<f64> {
        match self {
            Value::F64(f) => Some(*f),
            Value::F32(f) => Some(f64::from(*f)),
            Value::Integer(i) => i.as_i64().map(|i| i as f64),
            _ => None,
        }
    }

    fn as_float(&self) -> Option<f32> {
        match self {
            Value::F32(f) => Some(*f),
            Value::F64(f) => Some(*f as f32),
            Value::Integer(i) => i.as_i64().map(|i| i as f32),
            _ => None,
        }
    }

    fn as_text(&self) -> Option<String> {
        self.as_str().map(String::from)
    }

    fn as_raw(&self) -> Option<Vec<u8>> {
        match self {
            Value::Binary(bytes) => Some(bytes.clone()),
            _ => None,
        }
    }

    fn to_nt_value(&self, type_index: u8) -> Option<NTValue> {
        match type_index {
            0 => self.as_bool().map(NTValue::Boolean),
            1 => self.as_double().map(NTValue::Double),
            2 => self.as_i64().map(NTValue::Int),
            3 => self.as_float().map(NTValue::Float),
            4 => self.as_text().map(NTValue::String),
            5 => self.as_raw().map(NTValue::Raw),
            16 => self.as_bool_array().map(NTValue::BooleanArray),
            17 => self.as_double_array().map(NTValue::DoubleArray),
            18 => self.as_int_array().map(NTValue::IntArray),
            19 => self.as_float_array().map(NTValue::FloatArray),
            20 => self.as_text_array().map(NTValue::StringArray),
            _ => None,
        }
    }
}
