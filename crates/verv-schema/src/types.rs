//! Newtype wrappers for string identifiers, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl PartialEq<String> for $name {
            fn eq(&self, other: &String) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// A manifest entry as written, e.g. `requests` or `typing-extensions>=4`.
    PackageName
);

string_newtype!(
    /// A dotted module path as seen by the interpreter's import system.
    ModuleName
);

impl PackageName {
    /// Derive the module the installer is expected to make importable.
    ///
    /// Extras, version specifiers, environment markers and URL references are
    /// dropped and `-` becomes `_`. Plain names pass through unchanged.
    pub fn import_name(&self) -> ModuleName {
        let end = self
            .0
            .find(|c: char| {
                matches!(c, '[' | '=' | '<' | '>' | '~' | '!' | ';' | '@') || c.is_whitespace()
            })
            .unwrap_or(self.0.len());
        ModuleName::new(self.0[..end].replace('-', "_"))
    }
}

impl ModuleName {
    /// Path segments of the dotted module name, skipping empty pieces.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_name_is_its_own_import_name() {
        assert_eq!(PackageName::new("requests").import_name(), "requests");
        assert_eq!(PackageName::new("six").import_name(), "six");
    }

    #[test]
    fn import_name_strips_specifiers_and_extras() {
        assert_eq!(
            PackageName::new("typing-extensions>=4").import_name(),
            "typing_extensions"
        );
        assert_eq!(PackageName::new("uvicorn[standard]").import_name(), "uvicorn");
        assert_eq!(PackageName::new("numpy==1.26.4").import_name(), "numpy");
        assert_eq!(PackageName::new("attrs~=23.1").import_name(), "attrs");
        assert_eq!(
            PackageName::new("pywin32; sys_platform == 'win32'").import_name(),
            "pywin32"
        );
        assert_eq!(
            PackageName::new("pkg @ https://example.com/pkg.whl").import_name(),
            "pkg"
        );
    }

    #[test]
    fn module_segments_split_on_dots() {
        let m = PackageName::new("zope.interface").import_name();
        assert_eq!(m.segments().collect::<Vec<_>>(), vec!["zope", "interface"]);
    }

    #[test]
    fn package_name_serde_is_transparent() {
        let name = PackageName::new("numpy");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"numpy\"");
        let back: PackageName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }

    #[test]
    fn package_name_display_and_into_inner() {
        let name = PackageName::from("requests");
        assert_eq!(name.to_string(), "requests");
        assert_eq!(name.into_inner(), "requests");
    }
}
