//! Helper utils used in project.

mod event_emitter;
mod timers;

#[doc(inline)]
pub use self::{
    event_emitter::EventEmitter,
    timers::{Clock, ManualClock, SystemClock, TimerId, Timers},
};

/// Generates [`Debug`] implementation for a provided structure with name of
/// this structure.
///
/// Used for types holding trait objects of collaborators, which are not
/// [`Debug`] themselves.
///
/// # Example
///
/// ```
/// # use medea_call::impl_debug_by_struct_name;
/// struct Foo;
///
/// impl_debug_by_struct_name!(Foo);
///
/// assert_eq!(format!("{:?}", Foo), "Foo")
/// ```
///
/// [`Debug`]: std::fmt::Debug
#[macro_export]
macro_rules! impl_debug_by_struct_name {
    ($ty:ty) => {
        impl ::std::fmt::Debug for $ty {
            fn fmt(
                &self,
                f: &mut ::std::fmt::Formatter<'_>,
            ) -> ::std::result::Result<(), ::std::fmt::Error> {
                f.debug_struct(stringify!($ty)).finish()
            }
        }
    };
}
