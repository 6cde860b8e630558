//! Argument normalization utilities for request-store

use crate::types::FetchArgsBounds;

/// Trait for normalizing different argument formats passed to `subscribe`
///
/// This trait allows [`RequestStore::subscribe`](crate::store::RequestStore::subscribe)
/// to accept arguments in different formats:
/// - `()` for no arguments
/// - `(arg,)` for a single argument in a tuple (e.g., `("BTCUSDT",)`)
/// - `(a, b)` and `(a, b, c)` for ordered argument tuples
/// - Common primitive types directly (e.g., `42`, `"BTCUSDT".to_string()`)
/// - Custom types enabled with [`fetch_args!`](crate::fetch_args)
///
/// # Usage and Ambiguity
///
/// - A single-argument fetcher accepts its argument directly or as a one-element tuple.
/// - **Note:** Tuple syntax `(arg,)` has priority over direct syntax for types that implement both.
pub trait IntoFetchArgs {
    /// The target argument type after conversion
    type Args: FetchArgsBounds;

    /// Convert the input into the argument format expected by the fetcher
    fn into_args(self) -> Self::Args;
}

/// Sealed trait to control which types can be used directly as fetch arguments
///
/// This prevents conflicts between the blanket implementation and the tuple
/// implementations.
pub mod sealed {
    pub trait DirectArg {}

    impl DirectArg for u8 {}
    impl DirectArg for u16 {}
    impl DirectArg for u32 {}
    impl DirectArg for u64 {}
    impl DirectArg for usize {}
    impl DirectArg for i8 {}
    impl DirectArg for i16 {}
    impl DirectArg for i32 {}
    impl DirectArg for i64 {}
    impl DirectArg for isize {}
    impl DirectArg for bool {}
    impl DirectArg for char {}
    impl DirectArg for String {}
    impl DirectArg for &'static str {}
}

// No arguments: () -> ()
impl IntoFetchArgs for () {
    type Args = ();

    fn into_args(self) -> Self::Args {}
}

// Single argument in a tuple: (Arg,) -> Arg
impl<T> IntoFetchArgs for (T,)
where
    T: FetchArgsBounds,
{
    type Args = T;

    fn into_args(self) -> Self::Args {
        self.0
    }
}

impl<A, B> IntoFetchArgs for (A, B)
where
    A: FetchArgsBounds,
    B: FetchArgsBounds,
{
    type Args = (A, B);

    fn into_args(self) -> Self::Args {
        self
    }
}

impl<A, B, C> IntoFetchArgs for (A, B, C)
where
    A: FetchArgsBounds,
    B: FetchArgsBounds,
    C: FetchArgsBounds,
{
    type Args = (A, B, C);

    fn into_args(self) -> Self::Args {
        self
    }
}

// Direct arguments for any type opted in through the sealed trait
impl<T> IntoFetchArgs for T
where
    T: FetchArgsBounds + sealed::DirectArg,
{
    type Args = T;

    fn into_args(self) -> Self::Args {
        self
    }
}

/// Macro to enable a custom type to be passed directly as a fetch argument
///
/// # Example
///
/// ```rust,ignore
/// use request_store::fetch_args;
///
/// #[derive(Clone, Debug, serde::Serialize)]
/// struct Symbol(String);
///
/// fetch_args!(Symbol);
///
/// let sub = store.subscribe(last_price(), Symbol("BTCUSDT".into()))?;
/// ```
#[macro_export]
macro_rules! fetch_args {
    ($type:ty) => {
        impl $crate::param_utils::sealed::DirectArg for $type {}
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, serde::Serialize, PartialEq)]
    struct Symbol(String);
    crate::fetch_args!(Symbol);

    #[test]
    fn formats_normalize() {
        let () = ().into_args();
        assert_eq!(("BTCUSDT".to_string(),).into_args(), "BTCUSDT");
        assert_eq!(42u32.into_args(), 42);
        assert_eq!(("BTCUSDT", 5u32).into_args(), ("BTCUSDT", 5));
        assert_eq!(("a", 1u8, true).into_args(), ("a", 1, true));
        assert_eq!(
            Symbol("ETHUSDT".into()).into_args(),
            Symbol("ETHUSDT".into())
        );
    }
}
