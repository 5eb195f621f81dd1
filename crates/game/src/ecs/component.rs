use std::cell::RefCell;

use super::sparse::SparseArray;
use crate::components::Stores;

/// A registered component's storage slot. `None` until the type is registered.
pub type Slot<T> = Option<RefCell<SparseArray<T>>>;

/// Ties a component type to its field in the closed `Stores` table.
pub trait Component: Sized + Send + 'static {
    const NAME: &'static str;

    fn slot(stores: &Stores) -> &Slot<Self>;
    fn slot_mut(stores: &mut Stores) -> &mut Slot<Self>;
}

/// Declares the `Stores` table and the `Component` impl for every listed type.
macro_rules! component_stores {
    ($($field:ident: $ty:ty),+ $(,)?) => {
        #[derive(Default)]
        pub struct Stores {
            $($field: $crate::ecs::Slot<$ty>,)+
        }

        $(
            impl $crate::ecs::Component for $ty {
                const NAME: &'static str = stringify!($ty);

                #[inline]
                fn slot(stores: &Stores) -> &$crate::ecs::Slot<Self> {
                    &stores.$field
                }

                #[inline]
                fn slot_mut(stores: &mut Stores) -> &mut $crate::ecs::Slot<Self> {
                    &mut stores.$field
                }
            }
        )+
    };
}

pub(crate) use component_stores;
