mod component;
mod registry;
mod sparse;
mod zip;

pub(crate) use component::component_stores;
pub use component::{Component, Slot};
pub use registry::{Entity, Registry, RegistryError, System, SystemContext};
pub use sparse::SparseArray;
pub use zip::{IndexedZipper, IntoLanes, Lane, Zipper, indexed_zip, zip};
