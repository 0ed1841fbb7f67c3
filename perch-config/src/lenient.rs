//! Field deserializers that accept either the native value or its text form.
//!
//! Environment overrides always arrive as strings (`PERCH__FETCH__COUNT=5`).
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, de};

#[derive(Deserialize)]
#[serde(untagged)]
enum NativeOrText<T> {
    Native(T),
    Text(String),
}

impl<T> NativeOrText<T>
where
    T: FromStr,
    T::Err: Display,
{
    fn into_value<E: de::Error>(self) -> Result<T, E> {
        match self {
            NativeOrText::Native(v) => Ok(v),
            NativeOrText::Text(s) => s
                .trim()
                .parse()
                .map_err(|e| E::custom(format!("invalid value {s:?}: {e}"))),
        }
    }
}

pub(crate) fn parse<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    NativeOrText::<T>::deserialize(deserializer)?.into_value()
}

pub(crate) fn parse_opt<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    Option::<NativeOrText<T>>::deserialize(deserializer)?
        .map(NativeOrText::into_value)
        .transpose()
}
