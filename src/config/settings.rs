//! Setting descriptor tables.
//!
//! Each setting is one [`Descriptor`] row: property key, parser, built-in default,
//! and accessors for its [`PropertyRef`] cell. Merge, default application,
//! raw-property resolution, equality and hashing all walk the table, so adding a
//! setting means adding a field and a row, nothing else.

use std::hash::{Hash, Hasher};

use crate::config::properties::{PropertySource, PropertyValue};
use crate::config::property_ref::PropertyRef;

/// Type-erased operations over one setting of the settings struct `C`.
pub trait Setting<C>: Sync {
    /// Unprefixed property key.
    fn key(&self) -> &'static str;

    /// Apply the built-in default if the cell is still unset.
    fn init(&self, target: &mut C);

    /// Copy the cell from `source` when it is set there.
    fn merge(&self, target: &mut C, source: &C);

    /// Store a raw property value. Returns false if it does not parse.
    fn resolve(&self, target: &mut C, value: &PropertyValue) -> bool;

    fn is_present(&self, settings: &C) -> bool;

    /// Setting-by-setting equality: same presence, same value.
    fn same(&self, a: &C, b: &C) -> bool;

    /// Feed the value, if any, into `state`. Must agree with [`Setting::same`].
    fn hash_value(&self, settings: &C, state: &mut dyn Hasher);
}

/// A row of a settings table.
pub struct Descriptor<C, T: 'static> {
    pub key: &'static str,
    pub default: fn() -> Option<T>,
    pub parse: fn(&PropertyValue) -> Option<T>,
    pub cell: fn(&C) -> &PropertyRef<T>,
    pub cell_mut: fn(&mut C) -> &mut PropertyRef<T>,
    pub eq: fn(&T, &T) -> bool,
    /// No-op for values compared by identity.
    pub hash: fn(&T, &mut dyn Hasher),
}

impl<C, T: Clone + 'static> Setting<C> for Descriptor<C, T> {
    fn key(&self) -> &'static str {
        self.key
    }

    fn init(&self, target: &mut C) {
        if let Some(default) = (self.default)() {
            (self.cell_mut)(target).if_empty_set(Some(default));
        }
    }

    fn merge(&self, target: &mut C, source: &C) {
        (self.cell_mut)(target).set_non_empty((self.cell)(source));
    }

    fn resolve(&self, target: &mut C, value: &PropertyValue) -> bool {
        match (self.parse)(value) {
            Some(parsed) => {
                (self.cell_mut)(target).set_value(parsed);
                true
            }
            None => false,
        }
    }

    fn is_present(&self, settings: &C) -> bool {
        (self.cell)(settings).is_present()
    }

    fn same(&self, a: &C, b: &C) -> bool {
        let (a, b) = ((self.cell)(a), (self.cell)(b));
        if a.is_present() != b.is_present() {
            return false;
        }
        match (a.get(), b.get()) {
            (None, None) => true,
            (Some(x), Some(y)) => (self.eq)(x, y),
            _ => false,
        }
    }

    fn hash_value(&self, settings: &C, state: &mut dyn Hasher) {
        if let Some(value) = (self.cell)(settings).get() {
            (self.hash)(value, state);
        }
    }
}

/// A static table of settings over `C`.
pub type SettingTable<C> = &'static [&'static dyn Setting<C>];

/// Declare a [`Descriptor`] for a field of a settings struct.
macro_rules! descriptor {
    ($owner:ty, $field:ident: $ty:ty, $key:expr, $parse:expr, default = $default:expr) => {
        $crate::config::settings::Descriptor::<$owner, $ty> {
            key: $key,
            default: || $default,
            parse: $parse,
            cell: |c| &c.$field,
            cell_mut: |c| &mut c.$field,
            eq: |a, b| a == b,
            hash: |value, mut state| ::std::hash::Hash::hash(value, &mut state),
        }
    };
    ($owner:ty, $field:ident: $ty:ty, $key:expr, $parse:expr, default = $default:expr, eq = $eq:expr) => {
        $crate::config::settings::Descriptor::<$owner, $ty> {
            key: $key,
            default: || $default,
            parse: $parse,
            cell: |c| &c.$field,
            cell_mut: |c| &mut c.$field,
            eq: $eq,
            hash: |_, _| {},
        }
    };
}

pub(crate) use descriptor;

pub(crate) fn init_all<C>(table: SettingTable<C>, target: &mut C) {
    for setting in table {
        setting.init(target);
    }
}

pub(crate) fn merge_all<C>(table: SettingTable<C>, target: &mut C, source: &C) {
    for setting in table {
        setting.merge(target, source);
    }
}

/// Resolve raw properties for every setting of the table.
///
/// The prefixed key is consulted before the plain key. A value that does not
/// parse is skipped and the next candidate is tried.
pub(crate) fn resolve_all<C>(
    table: SettingTable<C>,
    target: &mut C,
    source: &dyn PropertySource,
    prefix: &str,
) {
    for setting in table {
        let key = setting.key();
        let prefixed = (!prefix.is_empty()).then(|| format!("{}{}", prefix, key));
        let candidates = prefixed.as_deref().into_iter().chain(std::iter::once(key));

        for candidate in candidates {
            let Some(value) = source.property(candidate) else {
                continue;
            };
            if setting.resolve(target, value) {
                break;
            }
            tracing::debug!(key = candidate, value = %value, "Ignoring unparseable property");
        }
    }
}

pub(crate) fn same_all<C>(table: SettingTable<C>, a: &C, b: &C) -> bool {
    table.iter().all(|setting| setting.same(a, b))
}

/// Hash presence and value of every setting, consistently with [`same_all`].
pub(crate) fn hash_all<C, H: Hasher>(table: SettingTable<C>, settings: &C, state: &mut H) {
    for setting in table {
        setting.is_present(settings).hash(state);
        setting.hash_value(settings, state);
    }
}
