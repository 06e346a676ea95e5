pub mod subtype_set;
pub mod typeinfo;
pub mod unresolved;
