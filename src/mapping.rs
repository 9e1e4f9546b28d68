//! Binding between [`BencodeType`] trees and Rust types.
//!
//! Records declare which dict key each field binds to with [`bencode_record!`]; fields left out
//! of the table are neither read nor written. Missing keys leave a field at its default value,
//! while a present key holding the wrong kind of value is an error.

use std::collections::HashMap;

use bytes::Bytes;

use crate::decode::decode;
use crate::encode::encode;
use crate::error::{BencodeError, MappingError};
use crate::BencodeType;

/// Build a value of this type from a decoded bencode value
pub trait FromBencode: Sized {
    fn from_bencode(value: &BencodeType) -> Result<Self, MappingError>;
}

/// Convert a value of this type into a bencode value
pub trait ToBencode {
    fn to_bencode(&self) -> Result<BencodeType, MappingError>;

    /// Value stored under a record key, `None` when the key should be omitted
    fn to_field(&self) -> Result<Option<BencodeType>, MappingError> {
        self.to_bencode().map(Some)
    }
}

/// Decode `data` and bind the result onto `T`
pub fn from_bytes<T: FromBencode>(data: &[u8]) -> Result<T, BencodeError> {
    let value = decode(data)?;
    Ok(T::from_bencode(&value)?)
}

/// Canonical encoding of `value`
pub fn to_bytes<T: ToBencode + ?Sized>(value: &T) -> Result<Vec<u8>, MappingError> {
    Ok(encode(&value.to_bencode()?))
}

fn mismatch(expected: &'static str, found: &BencodeType) -> MappingError {
    MappingError::TypeMismatch {
        expected,
        found: found.kind(),
    }
}

/// Dict being bound onto a record
pub struct Fields<'a> {
    dict: &'a HashMap<Vec<u8>, BencodeType>,
}

impl<'a> Fields<'a> {
    pub fn new(value: &'a BencodeType) -> Result<Fields<'a>, MappingError> {
        match value {
            BencodeType::Dict(dict) => Ok(Fields { dict }),
            other => Err(mismatch("dict", other)),
        }
    }

    /// Overwrite `target` with the value under `key`, if there is one
    pub fn bind<T: FromBencode>(&self, key: &'static str, target: &mut T) -> Result<(), MappingError> {
        if let Some(value) = self.dict.get(key.as_bytes()) {
            *target = T::from_bencode(value).map_err(|e| e.in_field(key))?;
        }
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.dict.contains_key(key.as_bytes())
    }
}

/// Implement [`FromBencode`] and [`ToBencode`] for a record from a table of field/key pairs
///
/// The record must implement `Default`; unlisted fields are skipped in both directions.
///
/// ```
/// #[derive(Default)]
/// struct File {
///     length: u64,
///     path: Vec<String>,
///     cached: bool,
/// }
///
/// bittorrent_core::bencode_record!(File {
///     length => "length",
///     path => "path",
/// });
/// ```
#[macro_export]
macro_rules! bencode_record {
    ($record:ty { $($field:ident => $key:literal),+ $(,)? }) => {
        impl $crate::mapping::FromBencode for $record {
            fn from_bencode(
                value: &$crate::BencodeType,
            ) -> ::std::result::Result<Self, $crate::error::MappingError> {
                let fields = $crate::mapping::Fields::new(value)?;
                let mut record = <$record as ::std::default::Default>::default();
                $(fields.bind($key, &mut record.$field)?;)+
                Ok(record)
            }
        }

        impl $crate::mapping::ToBencode for $record {
            fn to_bencode(
                &self,
            ) -> ::std::result::Result<$crate::BencodeType, $crate::error::MappingError> {
                let mut dict = ::std::collections::HashMap::new();
                $(
                    let field = $crate::mapping::ToBencode::to_field(&self.$field)
                        .map_err(|e| e.in_field($key))?;
                    if let Some(value) = field {
                        dict.insert($key.as_bytes().to_vec(), value);
                    }
                )+
                Ok($crate::BencodeType::Dict(dict))
            }
        }
    };
}

macro_rules! signed_integers {
    ($($target:ty),+) => {
        $(
            impl FromBencode for $target {
                fn from_bencode(value: &BencodeType) -> Result<Self, MappingError> {
                    match value {
                        BencodeType::Integer(int) => <$target>::try_from(*int).map_err(|_| {
                            MappingError::Overflow { value: *int, target: stringify!($target) }
                        }),
                        other => Err(mismatch("integer", other)),
                    }
                }
            }

            impl ToBencode for $target {
                fn to_bencode(&self) -> Result<BencodeType, MappingError> {
                    Ok(BencodeType::Integer(i64::from(*self)))
                }
            }
        )+
    };
}

macro_rules! unsigned_integers {
    ($($target:ty),+) => {
        $(
            impl FromBencode for $target {
                fn from_bencode(value: &BencodeType) -> Result<Self, MappingError> {
                    match value {
                        BencodeType::Integer(int) if *int < 0 => Err(MappingError::Negative {
                            value: *int,
                            target: stringify!($target),
                        }),
                        BencodeType::Integer(int) => <$target>::try_from(*int).map_err(|_| {
                            MappingError::Overflow { value: *int, target: stringify!($target) }
                        }),
                        other => Err(mismatch("integer", other)),
                    }
                }
            }

            impl ToBencode for $target {
                fn to_bencode(&self) -> Result<BencodeType, MappingError> {
                    i64::try_from(*self).map(BencodeType::Integer).map_err(|_| {
                        MappingError::Overflow { value: i64::MAX, target: "i64" }
                    })
                }
            }
        )+
    };
}

signed_integers!(i8, i16, i32, i64);
unsigned_integers!(u8, u16, u32, u64, usize);

impl FromBencode for Bytes {
    fn from_bencode(value: &BencodeType) -> Result<Self, MappingError> {
        match value {
            BencodeType::ByteString(bytes) => Ok(Bytes::copy_from_slice(bytes)),
            other => Err(mismatch("byte string", other)),
        }
    }
}

impl ToBencode for Bytes {
    fn to_bencode(&self) -> Result<BencodeType, MappingError> {
        Ok(BencodeType::ByteString(self.to_vec()))
    }
}

impl FromBencode for String {
    fn from_bencode(value: &BencodeType) -> Result<Self, MappingError> {
        match value {
            BencodeType::ByteString(bytes) => {
                String::from_utf8(bytes.clone()).map_err(|_| MappingError::InvalidUtf8)
            }
            other => Err(mismatch("byte string", other)),
        }
    }
}

impl ToBencode for String {
    fn to_bencode(&self) -> Result<BencodeType, MappingError> {
        Ok(BencodeType::ByteString(self.as_bytes().to_vec()))
    }
}

impl<T: FromBencode> FromBencode for Vec<T> {
    fn from_bencode(value: &BencodeType) -> Result<Self, MappingError> {
        match value {
            BencodeType::List(items) => items.iter().map(T::from_bencode).collect(),
            other => Err(mismatch("list", other)),
        }
    }
}

impl<T: ToBencode> ToBencode for Vec<T> {
    fn to_bencode(&self) -> Result<BencodeType, MappingError> {
        self.iter()
            .map(T::to_bencode)
            .collect::<Result<_, _>>()
            .map(BencodeType::List)
    }
}

impl<T: FromBencode> FromBencode for HashMap<String, T> {
    fn from_bencode(value: &BencodeType) -> Result<Self, MappingError> {
        match value {
            BencodeType::Dict(dict) => dict
                .iter()
                .map(|(key, value)| {
                    let key = String::from_utf8(key.clone()).map_err(|_| MappingError::InvalidUtf8)?;
                    Ok((key, T::from_bencode(value)?))
                })
                .collect(),
            other => Err(mismatch("dict", other)),
        }
    }
}

impl<T: ToBencode> ToBencode for HashMap<String, T> {
    fn to_bencode(&self) -> Result<BencodeType, MappingError> {
        self.iter()
            .map(|(key, value)| Ok((key.as_bytes().to_vec(), value.to_bencode()?)))
            .collect::<Result<_, _>>()
            .map(BencodeType::Dict)
    }
}

impl FromBencode for BencodeType {
    fn from_bencode(value: &BencodeType) -> Result<Self, MappingError> {
        Ok(value.clone())
    }
}

impl ToBencode for BencodeType {
    fn to_bencode(&self) -> Result<BencodeType, MappingError> {
        Ok(self.clone())
    }
}

impl<T: FromBencode> FromBencode for Option<T> {
    fn from_bencode(value: &BencodeType) -> Result<Self, MappingError> {
        T::from_bencode(value).map(Some)
    }
}

impl<T: ToBencode> ToBencode for Option<T> {
    fn to_bencode(&self) -> Result<BencodeType, MappingError> {
        match self {
            Some(value) => value.to_bencode(),
            None => Err(MappingError::Absent),
        }
    }

    fn to_field(&self) -> Result<Option<BencodeType>, MappingError> {
        self.as_ref().map(T::to_bencode).transpose()
    }
}
