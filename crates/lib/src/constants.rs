//! Constants used throughout the Tessera library.
//!
//! Default names of the tags and attributes the runtime reads from the shared
//! tree. All of them can be overridden through [`RuntimeConfig`](crate::RuntimeConfig).

/// Tag of elements that hold a fragment.
pub const FRAGMENT_TAG: &str = "x-fragment";

/// Attribute declaring a fragment's type id.
pub const TYPE_ATTRIBUTE: &str = "type";

/// Attribute holding the automation flag.
pub const AUTO_ATTRIBUTE: &str = "auto";

/// Attribute holding the class list.
pub const CLASS_ATTRIBUTE: &str = "class";

/// Tag of the auto-DOM companion element inserted after a fragment.
pub const COMPANION_TAG: &str = "x-auto-dom";

/// Attribute tagging a companion with the id of the fragment that owns it.
pub const FRAGMENT_ID_ATTRIBUTE: &str = "data-fragment-id";
