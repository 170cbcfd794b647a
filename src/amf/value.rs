//! AMF value types
//!
//! Objects keep their properties in wire order so that encoded command
//! responses are deterministic.

/// AMF0 value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AmfValue {
    /// Null (0x05)
    #[default]
    Null,
    /// Undefined (0x06)
    Undefined,
    /// Boolean (0x01)
    Boolean(bool),
    /// IEEE 754 double (0x00)
    Number(f64),
    /// UTF-8 string (0x02 / 0x0C)
    String(String),
    /// Anonymous object (0x03)
    Object(Vec<(String, AmfValue)>),
    /// Associative array (0x08), used by `onMetaData`
    EcmaArray(Vec<(String, AmfValue)>),
    /// Dense array (0x0A)
    Array(Vec<AmfValue>),
    /// Milliseconds since the Unix epoch (0x0B)
    Date(f64),
}

impl AmfValue {
    /// Build an object from `(key, value)` pairs
    pub fn object<K, V, I>(props: I) -> Self
    where
        K: Into<String>,
        V: Into<AmfValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        AmfValue::Object(
            props
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Properties of an object or ECMA array
    pub fn properties(&self) -> Option<&[(String, AmfValue)]> {
        match self {
            AmfValue::Object(props) | AmfValue::EcmaArray(props) => Some(props),
            _ => None,
        }
    }

    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, AmfValue::Null | AmfValue::Undefined)
    }

    /// Look up a property by name
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.properties()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }
}

impl From<bool> for AmfValue {
    fn from(v: bool) -> Self {
        AmfValue::Boolean(v)
    }
}

impl From<f64> for AmfValue {
    fn from(v: f64) -> Self {
        AmfValue::Number(v)
    }
}

impl From<u32> for AmfValue {
    fn from(v: u32) -> Self {
        AmfValue::Number(v as f64)
    }
}

impl From<String> for AmfValue {
    fn from(v: String) -> Self {
        AmfValue::String(v)
    }
}

impl From<&str> for AmfValue {
    fn from(v: &str) -> Self {
        AmfValue::String(v.to_string())
    }
}
