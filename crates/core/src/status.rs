//! Small-integer enums persisted in `INTEGER` columns.
//!
//! Each variant's discriminant is the stored value, so the column can be
//! compared directly in SQL (`status = 1` is always "published").

use crate::error::CoreError;

/// Raw column type for every enum in this module.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($label:literal) {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Every variant, in discriminant order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Return the stored column value.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Human-readable name, used in error messages and logs.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl TryFrom<StatusId> for $name {
            type Error = CoreError;

            fn try_from(value: StatusId) -> Result<Self, Self::Error> {
                match value {
                    $( $val => Ok($name::$variant), )+
                    other => Err(CoreError::Runtime(format!(
                        "Unknown {} value {other}", $label
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_status_enum! {
    /// Version tag carried by every row of a versioned entity.
    Status ("status") {
        Draft = 0 => "draft",
        Published = 1 => "published",
        Archived = 2 => "archived",
    }
}

define_status_enum! {
    /// How a collection produces its items.
    CollectionType ("collection type") {
        Manual = 0 => "manual",
        Dynamic = 1 => "dynamic",
    }
}

define_status_enum! {
    /// Manual items are inserted; override items replace a query result slot.
    ItemType ("item type") {
        Manual = 0 => "manual",
        Override = 1 => "override",
    }
}

define_status_enum! {
    /// Visibility configuration of a collection item.
    ItemVisibility ("item visibility") {
        Visible = 0 => "visible",
        Hidden = 1 => "hidden",
        Scheduled = 2 => "scheduled",
    }
}
