//! String case conversion helpers.

use heck::{ToSnakeCase, ToUpperCamelCase};

/// Convert a snake_case identifier to UpperCamelCase.
pub fn snake_to_camel(name: &str) -> String {
    name.to_upper_camel_case()
}

/// Convert a CamelCase identifier to snake_case.
pub fn camel_to_snake(name: &str) -> String {
    name.to_snake_case()
}
