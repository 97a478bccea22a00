//! Profiling support via Tracy.
//!
//! Instrumentation is enabled with the `profiling` Cargo feature. When the
//! feature is disabled (the default) every macro expands to nothing.
//!
//! ```ignore
//! use scenelink_core::{profile_function, profile_scope};
//!
//! fn calculate_transform() {
//!     profile_function!();
//!     {
//!         profile_scope!("inclusive_matrix");
//!         // ...
//!     }
//! }
//! ```
//!
//! Connect the Tracy UI (<https://github.com/wolfpld/tracy/releases>) to the
//! running process to inspect spans and plots.

#[cfg(feature = "profiling")]
pub use tracy_client::{self, Client, plot as tracy_plot, span};

/// Profiles the enclosing scope under the given name.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

/// Profiles the enclosing scope under the given name.
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Profiles the enclosing function.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_function {
    () => {
        let _profile_span = $crate::profiling::span!();
    };
}

/// Profiles the enclosing function.
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_function {
    () => {};
}

/// Plots a numeric value over time.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        $crate::profiling::tracy_plot!($name, $value as f64)
    };
}

/// Plots a numeric value over time.
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        let _ = $value;
    };
}

/// Returns `true` when built with Tracy instrumentation.
pub const fn is_enabled() -> bool {
    cfg!(feature = "profiling")
}
