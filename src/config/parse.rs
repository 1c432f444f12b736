//! Coercion of raw property values into typed settings.
//!
//! Every parser returns `None` for a value it cannot coerce. Callers treat that
//! as "property absent" and fall through to the next source; a wrong type is
//! never an error.

use std::any::Any;
use std::str::FromStr;

use crate::config::properties::PropertyValue;

pub fn boolean(value: &PropertyValue) -> Option<bool> {
    match value {
        PropertyValue::Bool(b) => Some(*b),
        PropertyValue::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Integers in range for `T`, given as numbers or decimal strings.
pub fn integer<T: TryFrom<i64>>(value: &PropertyValue) -> Option<T> {
    let raw = match value {
        PropertyValue::Int(i) => *i,
        PropertyValue::Str(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    T::try_from(raw).ok()
}

pub fn string(value: &PropertyValue) -> Option<String> {
    match value {
        PropertyValue::Str(s) => Some(s.clone()),
        PropertyValue::Object(_) => value.downcast_ref::<String>().cloned(),
        _ => None,
    }
}

/// Values with a textual form, or an object of the target type itself.
pub fn parsed<T: FromStr + Clone + Any>(value: &PropertyValue) -> Option<T> {
    match value {
        PropertyValue::Str(s) => s.trim().parse().ok(),
        PropertyValue::Object(_) => value.downcast_ref::<T>().cloned(),
        _ => None,
    }
}

/// Objects of exactly type `T`.
pub fn object<T: Clone + Any>(value: &PropertyValue) -> Option<T> {
    value.downcast_ref::<T>().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Uri;

    #[test]
    fn integers_accept_numbers_and_strings() {
        assert_eq!(integer::<u32>(&PropertyValue::Int(250)), Some(250));
        assert_eq!(integer::<u32>(&PropertyValue::Str(" 300 ".into())), Some(300));
        assert_eq!(integer::<i64>(&PropertyValue::Str("-5".into())), Some(-5));
    }

    #[test]
    fn mismatched_values_read_as_absent() {
        assert_eq!(integer::<u32>(&PropertyValue::Int(-1)), None);
        assert_eq!(integer::<u32>(&PropertyValue::Str("fast".into())), None);
        assert_eq!(integer::<u32>(&PropertyValue::Bool(true)), None);
        assert_eq!(boolean(&PropertyValue::Int(1)), None);
        assert_eq!(boolean(&PropertyValue::Str("yes".into())), None);
        assert!(parsed::<Uri>(&PropertyValue::Null).is_none());
    }

    #[test]
    fn booleans_accept_strings() {
        assert_eq!(boolean(&PropertyValue::Str("TRUE".into())), Some(true));
        assert_eq!(boolean(&PropertyValue::Bool(false)), Some(false));
    }

    #[test]
    fn parsed_accepts_text_or_object() {
        let uri: Option<Uri> = parsed(&PropertyValue::Str("http://proxy:3128".into()));
        assert_eq!(uri.map(|u| u.port_u16()), Some(Some(3128)));

        let object = PropertyValue::Object(std::sync::Arc::new(Uri::from_static("http://p:1")));
        assert!(parsed::<Uri>(&object).is_some());
    }
}
