//! Fragment tests
//!
//! Events derived from observed edits, scoped writes, the auto-DOM companion
//! and the unload lifecycle, exercised through a registry over a real
//! document.

mod auto_dom;
mod lifecycle;
mod scoped_writes;
