//! Macro for defining catalog identifier newtypes.
//!
//! Catalog identifiers are case-insensitive in the warehouse, so every
//! identifier is normalized to lowercase on construction and restricted to
//! `[a-z0-9_]`. That keeps map lookups stable regardless of how a catalog file
//! or a CLI argument spells the name, and it keeps names safe to splice into
//! quoted SQL identifiers.

/// Returns the normalized form of `raw`, or `None` when it is not a valid identifier.
pub(crate) fn normalize_identifier(raw: &str) -> Option<String> {
    let name = raw.trim().to_ascii_lowercase();
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    valid.then_some(name)
}

/// Define a lowercase, non-empty identifier newtype.
///
/// Generates the struct with `Debug, Clone, PartialEq, Eq, Hash, PartialOrd,
/// Ord, Serialize`, a validating `Deserialize`, `try_new()`, `as_str()`,
/// `Display`, `AsRef<str>`, `Deref<Target = str>`, `Borrow<str>`,
/// `FromStr` and `PartialEq<str>` / `PartialEq<&str>`.
macro_rules! define_identifier {
    (
        $(#[$meta:meta])*
        $vis:vis struct $Name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
        #[serde(transparent)]
        $vis struct $Name(String);

        impl<'de> serde::Deserialize<'de> for $Name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                $Name::try_new(&s).ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        concat!("invalid ", stringify!($Name), " '{}'"),
                        s
                    ))
                })
            }
        }

        impl $Name {
            /// Normalize and validate a name, returning `None` when it is empty
            /// or contains characters other than letters, digits and `_`.
            pub fn try_new(name: &str) -> Option<Self> {
                crate::identifier::normalize_identifier(name).map(Self)
            }

            /// Return the normalized name.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $Name {
            type Err = crate::error::CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $Name::try_new(s).ok_or_else(|| crate::error::CoreError::EmptyName {
                    context: format!(concat!(stringify!($Name), " '{}'"), s),
                })
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $Name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $Name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $Name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $Name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

pub(crate) use define_identifier;
