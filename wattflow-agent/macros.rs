//! Declarative macros shared across the wattflow codebase

/// Define a fieldless enum whose variants carry a stable text label
///
/// # Example
/// ```
/// use wattflow::labeled_enum;
///
/// labeled_enum! {
///     pub enum Gauge {
///         Power => "power_watts",
///         Energy => "energy_joules",
///     }
/// }
///
/// assert_eq!(Gauge::Power.label(), "power_watts");
/// assert_eq!(Gauge::ALL.len(), 2);
/// assert_eq!(Gauge::Energy.to_string(), "energy_joules");
/// ```
///
/// Expands to:
/// - An enum with Debug, Clone, Copy, PartialEq, Eq, Hash derives
/// - A `label(&self) -> &'static str` method
/// - An `ALL` constant listing every variant in declaration order
/// - A `Display` impl printing the label
#[macro_export]
macro_rules! labeled_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $label:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant,)*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)*
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}
